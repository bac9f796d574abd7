use biomatch_kdtree::KdTreeError;

/// Numerical errors raised by transform fitting and transform primitives.
#[derive(thiserror::Error, Debug)]
pub enum TransformError {
    /// The correspondence arrays differ in length.
    #[error("Mismatched correspondences: {source_len} source vs {target_len} target vertices")]
    MismatchedLengths {
        /// Number of source vertices.
        source_len: usize,
        /// Number of target vertices.
        target_len: usize,
    },

    /// Too few correspondences to determine the requested transform.
    #[error("Transform fit requires at least {required} correspondences, got {actual}")]
    InsufficientCorrespondences {
        /// Minimum number of correspondences of the transform class.
        required: usize,
        /// Number of correspondences given.
        actual: usize,
    },

    /// The linear part of the transform is singular or the correspondences
    /// are degenerate.
    #[error("Singular transform")]
    Singular,

    /// The fit produced NaN or infinite values.
    #[error("Transform contains non finite values")]
    NonFinite,

    /// A rotation axis of zero length was given.
    #[error("Cannot compute a rotation from a zero length axis")]
    ZeroAxis,
}

/// An error type for registration.
#[derive(thiserror::Error, Debug)]
pub enum IcpError {
    /// A vertex set has no vertices.
    #[error("The {0} vertex set is empty")]
    EmptyVertexSet(&'static str),

    /// The target and source vertex sets differ in dimension.
    #[error("Vertex dimension mismatch: target is {target_dim}D, source is {source_dim}D")]
    DimensionMismatch {
        /// Dimension of the target vertices.
        target_dim: usize,
        /// Dimension of the source vertices.
        source_dim: usize,
    },

    /// A registration parameter is out of range.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// A registration step was requested after the registration terminated.
    #[error("Registration has already terminated")]
    Terminated,

    /// Scratch buffers could not be allocated.
    #[error("Failed to allocate registration buffers")]
    Allocation(#[from] std::collections::TryReserveError),

    /// Error raised by the spatial index.
    #[error(transparent)]
    KdTree(#[from] KdTreeError),

    /// Error raised while fitting or manipulating a transform.
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// The vertex source failed to produce vertices.
    #[error("Failed to extract vertices: {0}")]
    VertexSource(String),

    /// Parameters could not be parsed.
    #[error("Invalid parameter file")]
    Config(#[from] serde_json::Error),

    /// Parameters could not be read.
    #[error("Failed to read parameter file")]
    Io(#[from] std::io::Error),
}
