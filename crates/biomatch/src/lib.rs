#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

#[doc(inline)]
pub use biomatch_kdtree as kdtree;

#[doc(inline)]
pub use biomatch_icp as icp;
