/// An error type for the kd-tree module.
#[derive(thiserror::Error, Debug)]
pub enum KdTreeError {
    /// The tree dimension must be at least one.
    #[error("Invalid tree dimension ({0}), must be at least 1")]
    InvalidDimension(usize),

    /// The key does not have one value per tree dimension.
    #[error("Key has {actual} values but the tree dimension is {expected}")]
    KeyDimensionMismatch {
        /// The tree dimension.
        expected: usize,
        /// The number of values in the given key.
        actual: usize,
    },

    /// A floating point key contained a NaN or infinite value.
    #[error("Key contains a non finite value")]
    NonFiniteKey,

    /// A search radius was negative or NaN.
    #[error("Invalid search radius ({0})")]
    InvalidRadius(f64),

    /// The node id does not refer to a live node of this tree.
    #[error("Node {0} is not a live node of the tree")]
    InvalidNode(usize),

    /// The node arena could not be grown.
    #[error("Failed to grow the node arena")]
    Allocation(#[from] std::collections::TryReserveError),

    /// The node arena was grown but still has no free slot.
    #[error("Node arena has no free slot")]
    ArenaExhausted,
}
