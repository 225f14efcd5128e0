//! Error types for evidence accumulation.

use thiserror::Error;
use vigil_types::{CircleId, EntryPointId};

/// Errors from the evidence accumulator.
#[derive(Debug, Error)]
pub enum EvidenceError {
    /// A previous writer panicked while holding the entry point's lock.
    #[error("evidence lock poisoned for {circle_id}/{entry_point_id}")]
    LockPoisoned {
        circle_id: CircleId,
        entry_point_id: EntryPointId,
    },

    /// The slot kept being retired by concurrent sweeps.
    #[error("entry point {0} kept being retired during update")]
    Contended(EntryPointId),

    #[error("invalid evidence configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for evidence operations.
pub type EvidenceResult<T> = Result<T, EvidenceError>;
