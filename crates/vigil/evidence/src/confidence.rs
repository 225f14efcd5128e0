//! Score to confidence mapping.

use serde::{Deserialize, Serialize};

/// Maps an unbounded, non-negative score onto [0, 1].
///
/// Exactly one mapping is active per deployment. Both produce different
/// percentages for the same score, so the choice is explicit in config.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceMapping {
    /// `1 / (1 + exp(-steepness × (score - midpoint)))`
    Sigmoid { midpoint: f64, steepness: f64 },
    /// `min(1, score / score_max)`
    Linear { score_max: f64 },
}

impl Default for ConfidenceMapping {
    fn default() -> Self {
        ConfidenceMapping::Sigmoid {
            midpoint: 2.5,
            steepness: 1.5,
        }
    }
}

impl ConfidenceMapping {
    pub fn map(&self, score: f64) -> f64 {
        let score = if score.is_finite() { score.max(0.0) } else { 0.0 };
        match *self {
            ConfidenceMapping::Sigmoid {
                midpoint,
                steepness,
            } => 1.0 / (1.0 + (-steepness * (score - midpoint)).exp()),
            ConfidenceMapping::Linear { score_max } if score_max > 0.0 => {
                (score / score_max).min(1.0)
            }
            ConfidenceMapping::Linear { .. } => 0.0,
        }
    }
}
