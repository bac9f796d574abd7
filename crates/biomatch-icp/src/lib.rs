#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Error types for registration and transform fitting.
pub mod error;
pub use error::{IcpError, TransformError};

/// Least-squares transform estimation.
pub mod fit;
pub use fit::{LeastSquaresFit, TransformFit};

mod icp;
pub use icp::*;

mod ops;

mod params;
pub use params::*;

/// Affine transforms in 2D and 3D.
pub mod transform;
pub use transform::{AffineTransform, Transform, TransformKind};

mod vertices;
pub use vertices::*;
