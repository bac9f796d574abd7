use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::IcpError;
use crate::transform::TransformKind;

/// Default mean matched distance below which a registration has converged.
pub const DEFAULT_DISTANCE_THRESHOLD: f64 = 1.0;

/// Parameters of an ICP registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IcpParams {
    /// The class of transform to fit.
    pub transform: TransformKind,
    /// Maximum number of iterations, `0` for no limit.
    pub max_iterations: u32,
    /// Convergence threshold on the mean matched distance and on its
    /// improvement between iterations, in vertex units.
    pub distance_threshold: f64,
    /// Seed of the permutation used to insert target vertices in the tree.
    pub shuffle_seed: u64,
    /// Duplicate tolerance of the target tree, negative for the tree default.
    pub tree_tolerance: f64,
}

impl Default for IcpParams {
    fn default() -> Self {
        Self {
            transform: TransformKind::default(),
            max_iterations: 0,
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
            shuffle_seed: 0,
            tree_tolerance: -1.0,
        }
    }
}

impl IcpParams {
    /// Create parameters for a transform class and iteration cap.
    pub fn new(transform: TransformKind, max_iterations: u32) -> Self {
        Self {
            transform,
            max_iterations,
            ..Default::default()
        }
    }

    /// Parse parameters from a JSON document, missing fields take their default.
    pub fn from_json_str(json: &str) -> Result<Self, IcpError> {
        let params: Self = serde_json::from_str(json)?;
        params.validate()?;
        Ok(params)
    }

    /// Read parameters from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, IcpError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Check that every parameter is within range.
    pub fn validate(&self) -> Result<(), IcpError> {
        if !self.distance_threshold.is_finite() || self.distance_threshold < 0.0 {
            return Err(IcpError::InvalidParameter(format!(
                "distance_threshold must be finite and non negative, got {}",
                self.distance_threshold
            )));
        }
        if !self.tree_tolerance.is_finite() {
            return Err(IcpError::InvalidParameter(format!(
                "tree_tolerance must be finite, got {}",
                self.tree_tolerance
            )));
        }
        Ok(())
    }
}
