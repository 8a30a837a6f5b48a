//! Lookup tuning knobs (extrapolation allowance, inverse convergence).

use serde::{Deserialize, Serialize};

/// Configuration carried by each table for its lookups.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "uniffi", derive(uniffi::Record))]
#[serde(default)]
pub struct LookupConfig {
    /// Distance, in index cells, beyond either end of an index vector that
    /// still counts as covered.
    pub extrapolation: f64,

    /// Relative residual at which the inverse iteration is accepted
    pub inverse_tolerance: f64,

    /// Iteration cap per candidate voxel in the inverse search
    pub max_iterations: u32,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            extrapolation: 0.5,
            inverse_tolerance: 1e-12,
            max_iterations: 32,
        }
    }
}

impl LookupConfig {
    /// Set the extrapolation allowance
    pub fn with_extrapolation(mut self, cells: f64) -> Self {
        self.extrapolation = cells.max(0.0);
        self
    }

    /// Set the inverse tolerance
    pub fn with_inverse_tolerance(mut self, tolerance: f64) -> Self {
        self.inverse_tolerance = tolerance;
        self
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON; missing keys take their defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
