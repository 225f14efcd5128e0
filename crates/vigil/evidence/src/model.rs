//! Contribution models.
//!
//! A model turns the priced terms of one signal into the amount added to an
//! entry point's score. The heuristic product is active by default; the
//! log-likelihood model is the hook for a sequential probability ratio test.

use serde::{Deserialize, Serialize};
use vigil_types::SignalType;

use crate::config::{ContributionModelKind, EvidenceConfig};

/// Terms priced for one signal.
#[derive(Debug, Clone, PartialEq)]
pub struct ContributionInputs<'a> {
    pub signal_type: &'a SignalType,
    pub base_weight: f64,
    pub effective_confidence: f64,
    pub mode_multiplier: f64,
    pub chain_bonus: f64,
    pub negative_penalty: f64,
}

/// Prices a signal into a score contribution.
pub trait ContributionModel: Send + Sync {
    fn name(&self) -> &'static str;

    fn contribution(&self, inputs: &ContributionInputs<'_>) -> f64;
}

/// `baseWeight × effectiveConfidence × modeMultiplier × chainBonus − penalty`.
#[derive(Debug, Clone, Default)]
pub struct HeuristicModel;

impl ContributionModel for HeuristicModel {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn contribution(&self, inputs: &ContributionInputs<'_>) -> f64 {
        inputs.base_weight
            * inputs.effective_confidence
            * inputs.mode_multiplier
            * inputs.chain_bonus
            - inputs.negative_penalty
    }
}

/// Detection probabilities for one signal type under each hypothesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LikelihoodRatio {
    pub signal_type: SignalType,
    /// P(signal | intrusion).
    pub p_true: f64,
    /// P(signal | benign).
    pub p_false: f64,
}

impl LikelihoodRatio {
    fn log_ratio(&self) -> Option<f64> {
        (self.p_true > 0.0 && self.p_false > 0.0).then(|| (self.p_true / self.p_false).ln())
    }
}

/// `ln(p_true / p_false) × effectiveConfidence × modeMultiplier × chainBonus − penalty`.
///
/// Signals without a usable ratio fall back to their base weight.
#[derive(Debug, Clone, Default)]
pub struct LogLikelihoodModel {
    ratios: Vec<LikelihoodRatio>,
}

impl LogLikelihoodModel {
    pub fn new(ratios: Vec<LikelihoodRatio>) -> Self {
        Self { ratios }
    }
}

impl ContributionModel for LogLikelihoodModel {
    fn name(&self) -> &'static str {
        "log_likelihood"
    }

    fn contribution(&self, inputs: &ContributionInputs<'_>) -> f64 {
        let weight = self
            .ratios
            .iter()
            .find(|r| &r.signal_type == inputs.signal_type)
            .and_then(LikelihoodRatio::log_ratio)
            .unwrap_or(inputs.base_weight);
        weight * inputs.effective_confidence * inputs.mode_multiplier * inputs.chain_bonus
            - inputs.negative_penalty
    }
}

/// Build the model selected in config.
pub fn build_model(config: &EvidenceConfig) -> Box<dyn ContributionModel> {
    match config.model {
        ContributionModelKind::Heuristic => Box::new(HeuristicModel),
        ContributionModelKind::LogLikelihood => {
            Box::new(LogLikelihoodModel::new(config.likelihoods.clone()))
        }
    }
}
