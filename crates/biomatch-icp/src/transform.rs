use serde::{Deserialize, Serialize};

use crate::error::TransformError;

/// Linear parts with a smaller absolute determinant are treated as singular.
const SINGULAR_DETERMINANT: f64 = 1e-12;

/// The class of transform fitted during registration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    /// Translation only.
    Translation,
    /// Rotation and translation.
    #[default]
    Rigid,
    /// Rotation, isotropic scale and translation.
    Similarity,
    /// General affine transform.
    Affine,
}

impl TransformKind {
    /// The minimum number of correspondences needed to fit this class of
    /// transform in `dim` dimensions.
    pub fn min_correspondences(self, dim: usize) -> usize {
        match self {
            TransformKind::Translation => 1,
            TransformKind::Rigid | TransformKind::Similarity => dim,
            TransformKind::Affine => dim + 1,
        }
    }
}

/// An affine transform `x -> A x + t` in `D` dimensions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform<const D: usize> {
    linear: [[f64; D]; D],
    translation: [f64; D],
}

impl<const D: usize> Default for AffineTransform<D> {
    fn default() -> Self {
        Self::identity()
    }
}

impl<const D: usize> AffineTransform<D> {
    /// Creates a transform from a row-major linear part and a translation.
    pub fn new(linear: [[f64; D]; D], translation: [f64; D]) -> Self {
        Self {
            linear,
            translation,
        }
    }

    /// The identity transform.
    pub fn identity() -> Self {
        let mut linear = [[0.0; D]; D];
        for (i, row) in linear.iter_mut().enumerate() {
            row[i] = 1.0;
        }
        Self::new(linear, [0.0; D])
    }

    /// A pure translation.
    pub fn from_translation(translation: [f64; D]) -> Self {
        Self {
            translation,
            ..Self::identity()
        }
    }

    /// A pure linear map.
    pub fn from_linear(linear: [[f64; D]; D]) -> Self {
        Self::new(linear, [0.0; D])
    }

    /// The row-major linear part.
    #[inline]
    pub fn linear(&self) -> &[[f64; D]; D] {
        &self.linear
    }

    /// The translation part.
    #[inline]
    pub fn translation(&self) -> &[f64; D] {
        &self.translation
    }

    /// Applies the transform to a point.
    #[inline]
    pub fn apply(&self, point: &[f64; D]) -> [f64; D] {
        std::array::from_fn(|r| {
            self.linear[r]
                .iter()
                .zip(point)
                .fold(self.translation[r], |acc, (a, x)| acc + a * x)
        })
    }

    /// Applies the transform to a set of points.
    ///
    /// PRECONDITION: `dst_points` has the same length as `src_points`.
    pub fn apply_into(&self, src_points: &[[f64; D]], dst_points: &mut [[f64; D]]) {
        debug_assert_eq!(src_points.len(), dst_points.len());
        for (dst, src) in dst_points.iter_mut().zip(src_points) {
            *dst = self.apply(src);
        }
    }

    /// Returns the transformed copy of a set of points.
    pub fn apply_all(&self, points: &[[f64; D]]) -> Vec<[f64; D]> {
        points.iter().map(|p| self.apply(p)).collect()
    }

    /// Composes two transforms, the result applies `first` and then `self`.
    pub fn compose(&self, first: &Self) -> Self {
        let linear = std::array::from_fn(|r| {
            std::array::from_fn(|c| (0..D).map(|k| self.linear[r][k] * first.linear[k][c]).sum())
        });
        Self::new(linear, self.apply(&first.translation))
    }

    /// The determinant of the linear part.
    pub fn determinant(&self) -> f64 {
        to_faer(&self.linear).determinant()
    }

    /// The inverse transform.
    pub fn inverse(&self) -> Result<Self, TransformError> {
        use faer::prelude::SpSolver;

        if self.determinant().abs() < SINGULAR_DETERMINANT {
            return Err(TransformError::Singular);
        }
        let inv = to_faer(&self.linear)
            .partial_piv_lu()
            .solve(faer::Mat::<f64>::identity(D, D));
        let linear: [[f64; D]; D] = std::array::from_fn(|r| std::array::from_fn(|c| inv.read(r, c)));
        let translation = std::array::from_fn(|r| {
            -(0..D)
                .map(|k| linear[r][k] * self.translation[k])
                .sum::<f64>()
        });

        let inverse = Self::new(linear, translation);
        if !inverse.is_finite() {
            return Err(TransformError::NonFinite);
        }
        Ok(inverse)
    }

    /// Whether every coefficient is finite.
    pub fn is_finite(&self) -> bool {
        self.linear.iter().flatten().all(|v| v.is_finite())
            && self.translation.iter().all(|v| v.is_finite())
    }

    /// The row-major `(D + 1) x (D + 1)` homogeneous matrix.
    pub fn to_homogeneous(&self) -> faer::Mat<f64> {
        faer::Mat::from_fn(D + 1, D + 1, |r, c| match (r < D, c < D) {
            (true, true) => self.linear[r][c],
            (true, false) => self.translation[r],
            (false, true) => 0.0,
            (false, false) => 1.0,
        })
    }
}

impl AffineTransform<2> {
    /// A rotation by `angle` radians about the origin followed by a translation.
    pub fn from_rotation(angle: f64, translation: [f64; 2]) -> Self {
        let (s, c) = angle.sin_cos();
        Self::new([[c, -s], [s, c]], translation)
    }

    /// The rotation angle of the linear part, in radians.
    pub fn rotation_angle(&self) -> f64 {
        self.linear[1][0].atan2(self.linear[0][0])
    }
}

impl AffineTransform<3> {
    /// A rotation of `angle` radians about `axis` followed by a translation.
    ///
    /// Example:
    ///
    /// ```
    /// use biomatch_icp::AffineTransform;
    ///
    /// let tr = AffineTransform::<3>::from_axis_angle(&[0.0, 0.0, 1.0], 0.0, [1.0, 2.0, 3.0]).unwrap();
    /// assert_eq!(tr.apply(&[0.0, 0.0, 0.0]), [1.0, 2.0, 3.0]);
    /// ```
    pub fn from_axis_angle(
        axis: &[f64; 3],
        angle: f64,
        translation: [f64; 3],
    ) -> Result<Self, TransformError> {
        let magnitude = (axis[0].powi(2) + axis[1].powi(2) + axis[2].powi(2)).sqrt();
        if magnitude < 1e-10 {
            return Err(TransformError::ZeroAxis);
        }
        let (x, y, z) = (axis[0] / magnitude, axis[1] / magnitude, axis[2] / magnitude);

        let (s, c) = angle.sin_cos();
        let t = 1.0 - c;

        let linear = [
            [c + x * x * t, x * y * t - z * s, x * z * t + y * s],
            [x * y * t + z * s, c + y * y * t, y * z * t - x * s],
            [x * z * t - y * s, y * z * t + x * s, c + z * z * t],
        ];
        Ok(Self::new(linear, translation))
    }
}

/// A registration transform of either dimension.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transform {
    /// A 2D transform.
    TwoD(AffineTransform<2>),
    /// A 3D transform.
    ThreeD(AffineTransform<3>),
}

impl Transform {
    /// The dimension of the transform.
    pub fn dim(&self) -> usize {
        match self {
            Transform::TwoD(_) => 2,
            Transform::ThreeD(_) => 3,
        }
    }

    /// The 2D transform, if this is one.
    pub fn as_2d(&self) -> Option<&AffineTransform<2>> {
        match self {
            Transform::TwoD(tr) => Some(tr),
            Transform::ThreeD(_) => None,
        }
    }

    /// The 3D transform, if this is one.
    pub fn as_3d(&self) -> Option<&AffineTransform<3>> {
        match self {
            Transform::ThreeD(tr) => Some(tr),
            Transform::TwoD(_) => None,
        }
    }
}

pub(crate) fn to_faer<const D: usize>(m: &[[f64; D]; D]) -> faer::Mat<f64> {
    faer::Mat::from_fn(D, D, |r, c| m[r][c])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_identity() {
        let tr = AffineTransform::<3>::identity();
        assert_eq!(tr.apply(&[1.0, -2.0, 3.0]), [1.0, -2.0, 3.0]);
        assert_relative_eq!(tr.determinant(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_compose_order() {
        let rot = AffineTransform::<2>::from_rotation(std::f64::consts::FRAC_PI_2, [0.0, 0.0]);
        let shift = AffineTransform::<2>::from_translation([1.0, 0.0]);

        // shift first, then rotate
        let p = rot.compose(&shift).apply(&[1.0, 0.0]);
        assert_relative_eq!(p[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(p[1], 2.0, epsilon = 1e-12);

        // rotate first, then shift
        let p = shift.compose(&rot).apply(&[1.0, 0.0]);
        assert_relative_eq!(p[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(p[1], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_inverse() -> Result<(), TransformError> {
        let tr = AffineTransform::<3>::from_axis_angle(&[1.0, 1.0, 0.0], 0.3, [1.0, 2.0, 3.0])?;
        let inv = tr.inverse()?;
        let p = [4.0, -5.0, 6.0];
        let q = inv.apply(&tr.apply(&p));
        for i in 0..3 {
            assert_relative_eq!(q[i], p[i], epsilon = 1e-9);
        }
        Ok(())
    }

    #[test]
    fn test_inverse_singular() {
        let tr = AffineTransform::<2>::from_linear([[1.0, 2.0], [2.0, 4.0]]);
        assert!(matches!(tr.inverse(), Err(TransformError::Singular)));
    }

    #[test]
    fn test_rotation_angle() {
        let tr = AffineTransform::<2>::from_rotation(0.25, [3.0, 4.0]);
        assert_relative_eq!(tr.rotation_angle(), 0.25, epsilon = 1e-12);
        assert_eq!(tr.translation(), &[3.0, 4.0]);
    }

    #[test]
    fn test_axis_angle() -> Result<(), TransformError> {
        let tr = AffineTransform::<3>::from_axis_angle(
            &[1.0, 0.0, 0.0],
            std::f64::consts::PI / 2.0,
            [0.0; 3],
        )?;
        let expected = [[1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]];
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(tr.linear()[i][j], expected[i][j], epsilon = 1e-12);
            }
        }
        assert!(matches!(
            AffineTransform::<3>::from_axis_angle(&[0.0; 3], 1.0, [0.0; 3]),
            Err(TransformError::ZeroAxis)
        ));
        Ok(())
    }

    #[test]
    fn test_to_homogeneous() {
        let tr = AffineTransform::<2>::from_translation([5.0, 6.0]);
        let m = tr.to_homogeneous();
        assert_eq!(m.nrows(), 3);
        assert_eq!(m.read(0, 2), 5.0);
        assert_eq!(m.read(1, 2), 6.0);
        assert_eq!(m.read(2, 2), 1.0);
        assert_eq!(m.read(2, 0), 0.0);
    }

    #[test]
    fn test_kind_min_correspondences() {
        assert_eq!(TransformKind::Translation.min_correspondences(3), 1);
        assert_eq!(TransformKind::Rigid.min_correspondences(2), 2);
        assert_eq!(TransformKind::Affine.min_correspondences(3), 4);
    }
}
