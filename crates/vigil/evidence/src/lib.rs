//! # vigil-evidence
//!
//! Per-entry-point evidence accumulation with exponential decay and
//! dual-threshold hysteresis.
//!
//! Each attributed signal is processed atomically for its entry point:
//!
//! 1. decay: `score ← score · exp(−Δt / τ)` (Δt clamped at zero)
//! 2. price: `baseWeight × effectiveConfidence × modeMultiplier × chainBonus − penalty`
//! 3. accumulate, floored at zero, and append an [`EvidenceEntry`] to the ledger
//! 4. evaluate forward transitions `IDLE → WATCH → PREALERT → ALARM`
//!
//! Clear-and-timeout runs in [`EvidenceAccumulator::sweep`] and lazily on the
//! next update.
//!
//! [`EvidenceEntry`]: vigil_types::EvidenceEntry

#![deny(unsafe_code)]

pub mod accumulator;
pub mod confidence;
pub mod config;
pub mod error;
pub mod model;
pub mod state;

pub use accumulator::{
    Attribution, EntryPointSnapshot, EvidenceAccumulator, EvidenceOutcome, EvidenceSweep,
    EvidenceUpdate, SignalContext, UnattributedReason,
};
pub use confidence::ConfidenceMapping;
pub use config::{
    BaseWeight, ContributionModelKind, EvidenceConfig, HealthMultipliers, LocationMultipliers,
    ModeMultipliers, ModeProfile, ModeProfiles, NegativeEvidencePenalties, Thresholds,
};
pub use error::{EvidenceError, EvidenceResult};
pub use model::{
    build_model, ContributionInputs, ContributionModel, HeuristicModel, LikelihoodRatio,
    LogLikelihoodModel,
};
pub use state::{EntryPointState, PhaseTransition, PricedSignal};
