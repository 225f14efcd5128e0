//! Error types for the track manager.

use thiserror::Error;
use vigil_types::{CircleId, ZoneId};

/// Errors from track assignment.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// A previous writer panicked while holding the circle's lock.
    #[error("track state lock poisoned for {0}")]
    LockPoisoned(CircleId),

    /// The event's zone is registered to a different circle.
    #[error("{zone} does not belong to {circle}")]
    ZoneCircleMismatch { zone: ZoneId, circle: CircleId },
}

/// Result type for track operations.
pub type TrackerResult<T> = Result<T, TrackerError>;
