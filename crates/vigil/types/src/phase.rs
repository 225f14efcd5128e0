//! Entry point alert phase.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Hysteresis phase of one entry point.
///
/// `Idle` and `Resolved` share the lowest rank; the forward order is
/// `Idle < Watch < PreAlert < Alarm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryPointPhase {
    Idle,
    Watch,
    PreAlert,
    Alarm,
    Resolved,
}

impl EntryPointPhase {
    pub fn rank(&self) -> u8 {
        match self {
            EntryPointPhase::Idle | EntryPointPhase::Resolved => 0,
            EntryPointPhase::Watch => 1,
            EntryPointPhase::PreAlert => 2,
            EntryPointPhase::Alarm => 3,
        }
    }

    /// `PreAlert` or `Alarm`.
    pub fn is_alerting(&self) -> bool {
        self.rank() >= 2
    }
}

impl Default for EntryPointPhase {
    fn default() -> Self {
        EntryPointPhase::Idle
    }
}

impl fmt::Display for EntryPointPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryPointPhase::Idle => write!(f, "IDLE"),
            EntryPointPhase::Watch => write!(f, "WATCH"),
            EntryPointPhase::PreAlert => write!(f, "PREALERT"),
            EntryPointPhase::Alarm => write!(f, "ALARM"),
            EntryPointPhase::Resolved => write!(f, "RESOLVED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_order() {
        assert_eq!(EntryPointPhase::Idle.rank(), EntryPointPhase::Resolved.rank());
        assert!(EntryPointPhase::Watch.rank() < EntryPointPhase::PreAlert.rank());
        assert!(EntryPointPhase::PreAlert.rank() < EntryPointPhase::Alarm.rank());
        assert!(EntryPointPhase::Alarm.is_alerting());
        assert!(!EntryPointPhase::Watch.is_alerting());
    }
}
