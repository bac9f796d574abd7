use faer::prelude::SpSolverLstsq;

use crate::error::TransformError;
use crate::ops::compute_centroid;
use crate::transform::{to_faer, AffineTransform, TransformKind};

/// Source point sets with a smaller spread are treated as degenerate.
const MIN_VARIANCE: f64 = 1e-12;

/// Least-squares estimation of a transform from point correspondences.
///
/// Implementations map every `source[i]` as close as possible to `target[i]`.
pub trait TransformFit<const D: usize> {
    /// Fits a transform of class `kind` mapping `source` onto `target`.
    fn fit(
        &self,
        kind: TransformKind,
        source: &[[f64; D]],
        target: &[[f64; D]],
    ) -> Result<AffineTransform<D>, TransformError>;
}

impl<const D: usize, T: TransformFit<D> + ?Sized> TransformFit<D> for &T {
    fn fit(
        &self,
        kind: TransformKind,
        source: &[[f64; D]],
        target: &[[f64; D]],
    ) -> Result<AffineTransform<D>, TransformError> {
        (**self).fit(kind, source, target)
    }
}

/// The default least-squares fit.
///
/// Translations use the centroid difference, rigid and similarity transforms
/// use the Umeyama SVD solution and affine transforms solve the centered
/// linear system with a QR decomposition.
#[derive(Debug, Clone, Copy, Default)]
pub struct LeastSquaresFit;

impl<const D: usize> TransformFit<D> for LeastSquaresFit {
    fn fit(
        &self,
        kind: TransformKind,
        source: &[[f64; D]],
        target: &[[f64; D]],
    ) -> Result<AffineTransform<D>, TransformError> {
        if source.len() != target.len() {
            return Err(TransformError::MismatchedLengths {
                source_len: source.len(),
                target_len: target.len(),
            });
        }

        let required = kind.min_correspondences(D);
        if source.len() < required {
            return Err(TransformError::InsufficientCorrespondences {
                required,
                actual: source.len(),
            });
        }

        // identity transformation is a special case
        if source == target {
            return Ok(AffineTransform::identity());
        }

        let transform = match kind {
            TransformKind::Translation => fit_translation(source, target),
            TransformKind::Rigid => fit_umeyama(source, target, false)?,
            TransformKind::Similarity => fit_umeyama(source, target, true)?,
            TransformKind::Affine => fit_affine(source, target)?,
        };

        if !transform.is_finite() {
            return Err(TransformError::NonFinite);
        }

        Ok(transform)
    }
}

fn fit_translation<const D: usize>(
    source: &[[f64; D]],
    target: &[[f64; D]],
) -> AffineTransform<D> {
    let src_centroid = compute_centroid(source);
    let dst_centroid = compute_centroid(target);
    AffineTransform::from_translation(std::array::from_fn(|i| dst_centroid[i] - src_centroid[i]))
}

fn fit_umeyama<const D: usize>(
    source: &[[f64; D]],
    target: &[[f64; D]],
    with_scale: bool,
) -> Result<AffineTransform<D>, TransformError> {
    let n = source.len() as f64;
    let src_centroid = compute_centroid(source);
    let dst_centroid = compute_centroid(target);

    // covariance H = 1/n Σ[(dst - dst_mean) * (src - src_mean)^T]
    let mut cov = [[0.0; D]; D];
    let mut src_variance = 0.0;
    for (p_src, p_dst) in source.iter().zip(target) {
        let src_centered: [f64; D] = std::array::from_fn(|i| p_src[i] - src_centroid[i]);
        let dst_centered: [f64; D] = std::array::from_fn(|i| p_dst[i] - dst_centroid[i]);
        for (r, row) in cov.iter_mut().enumerate() {
            for (c, v) in row.iter_mut().enumerate() {
                *v += dst_centered[r] * src_centered[c];
            }
        }
        src_variance += src_centered.iter().map(|v| v * v).sum::<f64>();
    }
    src_variance /= n;
    cov.iter_mut().flatten().for_each(|v| *v /= n);

    if src_variance < MIN_VARIANCE {
        return Err(TransformError::Singular);
    }

    let svd = to_faer(&cov).svd();
    let (u, v, s) = (svd.u(), svd.v(), svd.s_diagonal());

    // flip the weakest direction to avoid returning a reflection
    let mut sign = [1.0; D];
    if u.determinant() * v.determinant() < 0.0 {
        sign[D - 1] = -1.0;
    }

    // R = U * diag(sign) * V^T
    let rotation: [[f64; D]; D] = std::array::from_fn(|r| {
        std::array::from_fn(|c| (0..D).map(|k| u.read(r, k) * sign[k] * v.read(c, k)).sum())
    });

    let scale = if with_scale {
        (0..D).map(|k| s.read(k) * sign[k]).sum::<f64>() / src_variance
    } else {
        1.0
    };

    let linear: [[f64; D]; D] =
        std::array::from_fn(|r| std::array::from_fn(|c| scale * rotation[r][c]));
    let translation = std::array::from_fn(|r| {
        dst_centroid[r]
            - (0..D)
                .map(|k| linear[r][k] * src_centroid[k])
                .sum::<f64>()
    });

    Ok(AffineTransform::new(linear, translation))
}

fn fit_affine<const D: usize>(
    source: &[[f64; D]],
    target: &[[f64; D]],
) -> Result<AffineTransform<D>, TransformError> {
    let src_centroid = compute_centroid(source);
    let dst_centroid = compute_centroid(target);

    // solve (src - src_mean) * A^T = (dst - dst_mean)
    let mat_a = faer::Mat::<f64>::from_fn(source.len(), D, |r, c| source[r][c] - src_centroid[c]);
    let mat_b = faer::Mat::<f64>::from_fn(target.len(), D, |r, c| target[r][c] - dst_centroid[c]);

    let gram = mat_a.transpose() * mat_a.as_ref();
    let scale = (0..D).map(|k| gram.read(k, k)).fold(0.0, f64::max);
    if scale < MIN_VARIANCE || gram.determinant().abs() < MIN_VARIANCE * scale.powi(D as i32) {
        return Err(TransformError::Singular);
    }

    let params = mat_a.qr().solve_lstsq(mat_b);

    let linear: [[f64; D]; D] = std::array::from_fn(|r| std::array::from_fn(|c| params.read(c, r)));
    let translation = std::array::from_fn(|r| {
        dst_centroid[r]
            - (0..D)
                .map(|k| linear[r][k] * src_centroid[k])
                .sum::<f64>()
    });

    Ok(AffineTransform::new(linear, translation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn random_points<const D: usize>(num_points: usize, seed: u64) -> Vec<[f64; D]> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..num_points)
            .map(|_| std::array::from_fn(|_| rng.random_range(-10.0..10.0)))
            .collect()
    }

    fn assert_transform_eq<const D: usize>(a: &AffineTransform<D>, b: &AffineTransform<D>) {
        for r in 0..D {
            for c in 0..D {
                assert_relative_eq!(a.linear()[r][c], b.linear()[r][c], epsilon = 1e-9);
            }
            assert_relative_eq!(a.translation()[r], b.translation()[r], epsilon = 1e-9);
        }
    }

    #[test]
    fn test_fit_identity() -> Result<(), TransformError> {
        let points = random_points::<3>(10, 0);
        let tr = LeastSquaresFit.fit(TransformKind::Rigid, &points, &points)?;
        assert_eq!(tr, AffineTransform::identity());
        Ok(())
    }

    #[test]
    fn test_fit_translation() -> Result<(), TransformError> {
        let src = random_points::<2>(20, 1);
        let expected = AffineTransform::from_translation([1.5, -2.0]);
        let dst = expected.apply_all(&src);
        let tr = LeastSquaresFit.fit(TransformKind::Translation, &src, &dst)?;
        assert_transform_eq(&tr, &expected);
        Ok(())
    }

    #[test]
    fn test_fit_rigid_2d() -> Result<(), TransformError> {
        let src = random_points::<2>(30, 2);
        let expected = AffineTransform::<2>::from_rotation(0.7, [3.0, -1.0]);
        let dst = expected.apply_all(&src);
        let tr = LeastSquaresFit.fit(TransformKind::Rigid, &src, &dst)?;
        assert_transform_eq(&tr, &expected);
        assert_relative_eq!(tr.determinant(), 1.0, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn test_fit_rigid_3d() -> Result<(), TransformError> {
        let src = random_points::<3>(30, 3);
        let expected =
            AffineTransform::<3>::from_axis_angle(&[0.2, -1.0, 0.5], 1.1, [0.5, 2.0, -4.0])?;
        let dst = expected.apply_all(&src);
        let tr = LeastSquaresFit.fit(TransformKind::Rigid, &src, &dst)?;
        assert_transform_eq(&tr, &expected);
        Ok(())
    }

    #[test]
    fn test_fit_rigid_rejects_reflection() -> Result<(), TransformError> {
        let src = random_points::<2>(30, 4);
        let mirror = AffineTransform::<2>::from_linear([[-1.0, 0.0], [0.0, 1.0]]);
        let dst = mirror.apply_all(&src);
        let tr = LeastSquaresFit.fit(TransformKind::Rigid, &src, &dst)?;
        assert_relative_eq!(tr.determinant(), 1.0, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn test_fit_similarity() -> Result<(), TransformError> {
        let src = random_points::<3>(25, 5);
        let rot = AffineTransform::<3>::from_axis_angle(&[0.0, 0.0, 1.0], 0.4, [0.0; 3])?;
        let linear = std::array::from_fn(|r| std::array::from_fn(|c| 2.5 * rot.linear()[r][c]));
        let expected = AffineTransform::new(linear, [1.0, 1.0, -1.0]);
        let dst = expected.apply_all(&src);
        let tr = LeastSquaresFit.fit(TransformKind::Similarity, &src, &dst)?;
        assert_transform_eq(&tr, &expected);
        Ok(())
    }

    #[test]
    fn test_fit_affine() -> Result<(), TransformError> {
        let src = random_points::<2>(12, 6);
        let expected = AffineTransform::new([[1.2, 0.3], [-0.4, 0.8]], [5.0, -3.0]);
        let dst = expected.apply_all(&src);
        let tr = LeastSquaresFit.fit(TransformKind::Affine, &src, &dst)?;
        assert_transform_eq(&tr, &expected);
        Ok(())
    }

    #[test]
    fn test_fit_insufficient() {
        let src = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let dst = [[1.0, 0.0, 0.0], [2.0, 0.0, 0.0], [1.0, 1.0, 0.0]];
        let res = LeastSquaresFit.fit(TransformKind::Affine, &src, &dst);
        assert!(matches!(
            res,
            Err(TransformError::InsufficientCorrespondences {
                required: 4,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_fit_mismatched() {
        let src = [[0.0, 0.0], [1.0, 0.0]];
        let dst = [[0.0, 0.0]];
        let res = LeastSquaresFit.fit(TransformKind::Translation, &src, &dst);
        assert!(matches!(res, Err(TransformError::MismatchedLengths { .. })));
    }

    #[test]
    fn test_fit_degenerate() {
        let src = [[1.0, 1.0], [1.0, 1.0], [1.0, 1.0]];
        let dst = [[0.0, 0.0], [2.0, 0.0], [0.0, 2.0]];
        let res = LeastSquaresFit.fit(TransformKind::Rigid, &src, &dst);
        assert!(matches!(res, Err(TransformError::Singular)));

        let src = [[0.0, 0.0], [1.0, 1.0], [2.0, 2.0], [3.0, 3.0]];
        let dst = [[0.0, 0.0], [1.0, 0.0], [2.0, 1.0], [3.0, 3.0]];
        let res = LeastSquaresFit.fit(TransformKind::Affine, &src, &dst);
        assert!(matches!(res, Err(TransformError::Singular)));
    }
}
