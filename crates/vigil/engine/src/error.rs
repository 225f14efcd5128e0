//! Error types for the fusion engine.

use thiserror::Error;
use vigil_evidence::EvidenceError;
use vigil_rules::RuleError;
use vigil_tracker::TrackerError;
use vigil_types::{SecurityEventId, TopologyError};

/// Errors surfaced by [`crate::FusionEngine`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// The final security event write failed after all retries.
    #[error("persistence failed (retryable: {retryable}): {message}")]
    Persistence { retryable: bool, message: String },

    #[error("security event not found: {0}")]
    EventNotFound(SecurityEventId),

    #[error("security event already resolved: {0}")]
    AlreadyResolved(SecurityEventId),

    #[error("topology error: {0}")]
    Topology(#[from] TopologyError),

    #[error("tracker error: {0}")]
    Tracker(#[from] TrackerError),

    #[error("evidence error: {0}")]
    Evidence(#[from] EvidenceError),

    #[error("rule error: {0}")]
    Rules(#[from] RuleError),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl EngineError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Persistence { retryable: true, .. })
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        EngineError::Persistence {
            retryable: err.is_retryable(),
            message: err.to_string(),
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors from an [`crate::EventStore`].
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("record not found: {0}")]
    NotFound(SecurityEventId),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
