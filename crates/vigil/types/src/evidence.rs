//! Evidence ledger entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{EntryPointId, SensorEventId, SensorId};
use crate::sensor::{SensorType, SignalType};

/// One scoring contribution, written once and never mutated.
///
/// Replaying a ledger: `score_before = previous.score_after * decay_factor`
/// and `score_after = max(0, score_before + contribution)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceEntry {
    pub timestamp: DateTime<Utc>,
    pub signal_id: SensorEventId,
    pub entry_point_id: EntryPointId,
    pub sensor_id: SensorId,
    pub sensor_type: SensorType,
    pub signal_type: SignalType,
    pub raw_confidence: f64,
    /// `raw_confidence × reliability × health multiplier`.
    pub effective_confidence: f64,
    pub base_weight: f64,
    pub mode_multiplier: f64,
    pub chain_bonus: f64,
    pub negative_penalty: f64,
    pub contribution: f64,
    /// `exp(-Δt / τ)` applied to the previous score before this entry.
    pub decay_factor: f64,
    /// Score after decay, before the contribution was added.
    pub score_before: f64,
    pub score_after: f64,
}

impl EvidenceEntry {
    /// Entries ordered by absolute contribution, largest first.
    pub fn top_contributors(entries: &[EvidenceEntry], n: usize) -> Vec<EvidenceEntry> {
        let mut sorted = entries.to_vec();
        sorted.sort_by(|a, b| {
            b.contribution
                .abs()
                .partial_cmp(&a.contribution.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        sorted.truncate(n);
        sorted
    }
}
