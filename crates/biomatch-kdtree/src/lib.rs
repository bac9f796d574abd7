#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Error types for the kd-tree.
pub mod error;
pub use error::KdTreeError;

/// Key value types that can be stored in a tree.
pub mod key;
pub use key::{KdKey, KeyType};

mod node;
pub use node::{KdNode, NodeId};

mod tree;
pub use tree::*;
