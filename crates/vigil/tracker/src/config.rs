//! Track manager configuration.

use serde::{Deserialize, Serialize};

/// Clustering windows for the track manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Maximum distance between an event and a track's end time for the
    /// event to extend that track.
    #[serde(default = "default_track_gap")]
    pub track_gap_seconds: u64,

    /// Idle time after which a track is closed for good.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u64,

    /// How far behind its end time a track keeps raw events. Covers the
    /// widest rule window.
    #[serde(default = "default_event_retention")]
    pub event_retention_seconds: u64,

    /// Closed tracks retained per circle for lookups.
    #[serde(default = "default_closed_history")]
    pub closed_history: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            track_gap_seconds: default_track_gap(),
            idle_timeout_seconds: default_idle_timeout(),
            event_retention_seconds: default_event_retention(),
            closed_history: default_closed_history(),
        }
    }
}

fn default_track_gap() -> u64 {
    60
}

fn default_idle_timeout() -> u64 {
    300
}

fn default_event_retention() -> u64 {
    600
}

fn default_closed_history() -> usize {
    64
}
