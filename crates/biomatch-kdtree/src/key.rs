use std::cmp::Ordering;
use std::fmt::Debug;

mod private {
    pub trait Sealed {}

    impl Sealed for i32 {}
    impl Sealed for f64 {}
}

/// The primitive type of the keys stored in a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    /// Integer keys, compared exactly.
    Int,
    /// Double precision keys, compared within the tree tolerance.
    Double,
}

/// A scalar that can be used as one component of a tree key.
///
/// The trait is sealed: trees are available over `i32` and `f64` keys only.
pub trait KdKey: private::Sealed + Copy + Default + PartialOrd + Debug + Send + Sync + 'static {
    /// The key type tag of this scalar.
    const KEY_TYPE: KeyType;

    /// The lowest value, used as the lower bound of the root node.
    const LOWEST: Self;

    /// The highest value, used as the upper bound of the root node.
    const HIGHEST: Self;

    /// Converts the value to double precision for distance computations.
    fn to_f64(self) -> f64;

    /// Whether the value can be stored in a tree.
    fn is_finite(self) -> bool;

    /// Compares `self` against `other`, treating differences no larger than
    /// `tolerance` as equal. Integer keys ignore the tolerance.
    fn compare(self, other: Self, tolerance: f64) -> Ordering;

    /// Moves the value by `delta` on a tolerance-compared axis. Integer keys
    /// compare exactly and are returned unchanged.
    fn loosen(self, delta: f64) -> Self;
}

impl KdKey for i32 {
    const KEY_TYPE: KeyType = KeyType::Int;
    const LOWEST: Self = i32::MIN;
    const HIGHEST: Self = i32::MAX;

    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }

    #[inline]
    fn is_finite(self) -> bool {
        true
    }

    #[inline]
    fn compare(self, other: Self, _tolerance: f64) -> Ordering {
        self.cmp(&other)
    }

    #[inline]
    fn loosen(self, _delta: f64) -> Self {
        self
    }
}

impl KdKey for f64 {
    const KEY_TYPE: KeyType = KeyType::Double;
    const LOWEST: Self = f64::MIN;
    const HIGHEST: Self = f64::MAX;

    #[inline]
    fn to_f64(self) -> f64 {
        self
    }

    #[inline]
    fn is_finite(self) -> bool {
        f64::is_finite(self)
    }

    #[inline]
    fn compare(self, other: Self, tolerance: f64) -> Ordering {
        let diff = self - other;
        if diff.abs() > tolerance {
            if diff > 0.0 {
                Ordering::Greater
            } else {
                Ordering::Less
            }
        } else {
            Ordering::Equal
        }
    }

    #[inline]
    fn loosen(self, delta: f64) -> Self {
        self + delta
    }
}
