//! Evidence accumulator.
//!
//! One [`EntryPointState`] per (circle, entry point), each behind its own
//! mutex so decay-then-add is atomic per entry point while different entry
//! points update in parallel.

use std::sync::{Arc, Mutex, TryLockError};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use vigil_types::{
    CircleId, EntryPointId, EntryPointPhase, EvidenceEntry, HouseMode, LocationType,
    SensorEvent, SensorHealth, SiteTopology, ZoneId,
};

use crate::config::EvidenceConfig;
use crate::error::{EvidenceError, EvidenceResult};
use crate::model::{build_model, ContributionInputs, ContributionModel};
use crate::state::{EntryPointState, PhaseTransition, PricedSignal};

const SLOT_ATTEMPTS: usize = 3;

type SlotKey = (CircleId, EntryPointId);
type Slot = Arc<Mutex<EntryPointState>>;

/// Why a signal could not be attributed to an entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnattributedReason {
    /// Neither the signal nor its sensor names a known zone.
    UnknownZone,
    /// The zone is not part of any entry point.
    NoEntryPoint,
    /// The explicit entry point is not in the topology for this circle.
    UnknownEntryPoint(EntryPointId),
}

/// Topology facts resolved for one signal.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalContext {
    pub entry_points: Vec<EntryPointId>,
    pub zone_id: ZoneId,
    pub location: LocationType,
    pub reliability: f64,
    pub health: SensorHealth,
}

/// Result of attribution.
#[derive(Debug, Clone, PartialEq)]
pub enum Attribution {
    Attributed(SignalContext),
    Unattributed(UnattributedReason),
}

/// One entry point updated by one signal.
#[derive(Debug, Clone)]
pub struct EvidenceUpdate {
    pub circle_id: CircleId,
    pub entry_point_id: EntryPointId,
    pub entry: EvidenceEntry,
    pub phase: EntryPointPhase,
    pub score: f64,
    pub transitions: Vec<PhaseTransition>,
    /// Full ledger, captured when this update escalated into `PreAlert` or
    /// `Alarm`.
    pub alert_ledger: Option<Vec<EvidenceEntry>>,
}

impl EvidenceUpdate {
    pub fn escalated(&self) -> bool {
        self.transitions.iter().any(PhaseTransition::is_escalation)
    }
}

/// Result of applying one signal.
#[derive(Debug, Clone)]
pub enum EvidenceOutcome {
    Unattributed(UnattributedReason),
    Updated(Vec<EvidenceUpdate>),
}

/// Read-only view of an entry point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryPointSnapshot {
    pub circle_id: CircleId,
    pub entry_point_id: EntryPointId,
    pub phase: EntryPointPhase,
    pub score: f64,
    pub last_update_time: Option<DateTime<Utc>>,
    pub triggered_sensor_ids: Vec<vigil_types::SensorId>,
    pub ledger_len: usize,
}

/// Outcome of one clear-and-timeout sweep.
#[derive(Debug, Clone, Default)]
pub struct EvidenceSweep {
    pub cleared: Vec<PhaseTransition>,
    pub evicted: usize,
    pub skipped_busy: usize,
}

/// Maintains decaying per-entry-point scores.
pub struct EvidenceAccumulator {
    config: EvidenceConfig,
    model: Box<dyn ContributionModel>,
    states: DashMap<SlotKey, Slot>,
}

impl EvidenceAccumulator {
    pub fn new(config: EvidenceConfig) -> EvidenceResult<Self> {
        config.validate().map_err(EvidenceError::InvalidConfig)?;
        let model = build_model(&config);
        Ok(Self {
            config,
            model,
            states: DashMap::new(),
        })
    }

    pub fn with_defaults() -> Self {
        let config = EvidenceConfig::default();
        let model = build_model(&config);
        Self {
            config,
            model,
            states: DashMap::new(),
        }
    }

    pub fn config(&self) -> &EvidenceConfig {
        &self.config
    }

    pub fn model_name(&self) -> &'static str {
        self.model.name()
    }

    /// Live entry point states.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Mapped confidence in [0, 1] for a score.
    pub fn confidence(&self, score: f64) -> f64 {
        self.config.confidence_mapping.map(score)
    }

    /// Resolve the entry points a signal feeds.
    ///
    /// An explicit entry point wins; otherwise the zone mapping is used and a
    /// zone may feed several entry points.
    pub fn attribute(&self, event: &SensorEvent, topology: &SiteTopology) -> Attribution {
        let sensor = topology.sensor(&event.sensor_id);
        let zone = event
            .zone_id
            .as_ref()
            .or(sensor.map(|s| &s.zone_id))
            .and_then(|id| topology.zone(id));
        let Some(zone) = zone else {
            return Attribution::Unattributed(UnattributedReason::UnknownZone);
        };

        let entry_points = match &event.entry_point_id {
            Some(explicit) => match topology.entry_point(explicit) {
                Some(ep) if ep.circle_id == event.circle_id => vec![explicit.clone()],
                _ => {
                    return Attribution::Unattributed(UnattributedReason::UnknownEntryPoint(
                        explicit.clone(),
                    ))
                }
            },
            None => topology.entry_points_for_zone(&zone.id).to_vec(),
        };
        if entry_points.is_empty() {
            return Attribution::Unattributed(UnattributedReason::NoEntryPoint);
        }

        Attribution::Attributed(SignalContext {
            entry_points,
            zone_id: zone.id.clone(),
            location: zone.location,
            reliability: sensor.map(|s| s.reliability).unwrap_or(1.0),
            health: sensor.map(|s| s.health).unwrap_or_default(),
        })
    }

    /// Attribute a signal and update every entry point it feeds.
    pub fn apply(
        &self,
        event: &SensorEvent,
        topology: &SiteTopology,
        mode: HouseMode,
    ) -> EvidenceResult<EvidenceOutcome> {
        let context = match self.attribute(event, topology) {
            Attribution::Attributed(context) => context,
            Attribution::Unattributed(reason) => {
                debug!(
                    signal_id = %event.id,
                    sensor_id = %event.sensor_id,
                    reason = ?reason,
                    "Unattributed signal"
                );
                return Ok(EvidenceOutcome::Unattributed(reason));
            }
        };

        let mut updates = Vec::with_capacity(context.entry_points.len());
        for entry_point_id in &context.entry_points {
            updates.push(self.update(entry_point_id, event, &context, topology, mode)?);
        }
        Ok(EvidenceOutcome::Updated(updates))
    }

    /// Apply one signal to one entry point.
    pub fn update(
        &self,
        entry_point_id: &EntryPointId,
        event: &SensorEvent,
        context: &SignalContext,
        topology: &SiteTopology,
        mode: HouseMode,
    ) -> EvidenceResult<EvidenceUpdate> {
        let key = (event.circle_id.clone(), entry_point_id.clone());

        for _ in 0..SLOT_ATTEMPTS {
            let slot = self.slot(&key);
            let mut state = slot.lock().map_err(|_| EvidenceError::LockPoisoned {
                circle_id: key.0.clone(),
                entry_point_id: key.1.clone(),
            })?;
            if state.retired {
                drop(state);
                self.states.remove_if(&key, |_, current| Arc::ptr_eq(current, &slot));
                continue;
            }
            return Ok(self.update_locked(&mut state, event, context, topology, mode));
        }
        Err(EvidenceError::Contended(entry_point_id.clone()))
    }

    fn update_locked(
        &self,
        state: &mut EntryPointState,
        event: &SensorEvent,
        context: &SignalContext,
        topology: &SiteTopology,
        mode: HouseMode,
    ) -> EvidenceUpdate {
        let now = event.occurred_at;
        let profile = *self.config.profile(mode);
        let mut transitions = Vec::new();

        if state.is_clearable(now, &profile, self.config.idle_timeout_seconds) {
            let cleared = state.clear(now);
            debug!(
                entry_point_id = %state.entry_point_id,
                from = %cleared.from,
                to = %cleared.to,
                "Cleared stale evidence before update"
            );
            if cleared.from != cleared.to {
                transitions.push(cleared);
            }
        }

        let (_, skewed) = state.elapsed_seconds(now);
        if skewed {
            warn!(
                entry_point_id = %state.entry_point_id,
                signal_id = %event.id,
                "Signal predates last update; clamping decay interval to zero"
            );
        }

        let chains = topology.chains_for(&state.entry_point_id);
        let chain_bonus = state.chain_bonus(&event.sensor_id, chains, self.config.chain_bonus, now);
        let raw_confidence = event.raw_confidence();
        let effective_confidence = raw_confidence
            * context.reliability
            * self.config.health_multiplier(context.health);
        let base_weight = self
            .config
            .base_weight(&event.sensor_type, &event.signal_type);
        let mode_multiplier = self.config.mode_multiplier(mode, context.location);
        let negative_penalty = self.config.penalty(&event.signal_type);

        let contribution = self.model.contribution(&ContributionInputs {
            signal_type: &event.signal_type,
            base_weight,
            effective_confidence,
            mode_multiplier,
            chain_bonus,
            negative_penalty,
        });

        let priced = PricedSignal {
            signal_id: event.id,
            sensor_id: event.sensor_id.clone(),
            sensor_type: event.sensor_type.clone(),
            signal_type: event.signal_type.clone(),
            raw_confidence,
            effective_confidence,
            base_weight,
            mode_multiplier,
            chain_bonus,
            negative_penalty,
            contribution,
        };
        let (entry, forward) = state.accumulate(priced, now, &profile);

        debug!(
            circle_id = %state.circle_id,
            entry_point_id = %state.entry_point_id,
            contribution,
            score = state.score,
            phase = %state.phase,
            "Accumulated evidence"
        );
        for transition in &forward {
            info!(
                circle_id = %transition.circle_id,
                entry_point_id = %transition.entry_point_id,
                from = %transition.from,
                to = %transition.to,
                score = transition.score,
                "Entry point transition"
            );
        }
        transitions.extend(forward);

        let alert_ledger = transitions
            .iter()
            .any(PhaseTransition::is_escalation)
            .then(|| state.evidence_ledger.clone());

        EvidenceUpdate {
            circle_id: state.circle_id.clone(),
            entry_point_id: state.entry_point_id.clone(),
            entry,
            phase: state.phase,
            score: state.score,
            transitions,
            alert_ledger,
        }
    }

    /// Clear and evict entry points that sat at or below `T_clear` for the
    /// idle timeout.
    ///
    /// Entry points locked by an in-flight update are skipped for this pass.
    pub fn sweep<F>(&self, now: DateTime<Utc>, mode_of: F) -> EvidenceSweep
    where
        F: Fn(&CircleId) -> HouseMode,
    {
        let slots: Vec<(SlotKey, Slot)> = self
            .states
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();

        let mut sweep = EvidenceSweep::default();
        for (key, slot) in slots {
            let mut state = match slot.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::WouldBlock) => {
                    sweep.skipped_busy += 1;
                    continue;
                }
                Err(TryLockError::Poisoned(_)) => {
                    warn!(entry_point_id = %key.1, "Skipping poisoned evidence slot");
                    sweep.skipped_busy += 1;
                    continue;
                }
            };
            if state.retired {
                continue;
            }
            let profile = self.config.profile(mode_of(&key.0));
            if !state.is_clearable(now, profile, self.config.idle_timeout_seconds) {
                continue;
            }

            let cleared = state.clear(now);
            state.retired = true;
            drop(state);
            self.states
                .remove_if(&key, |_, current| Arc::ptr_eq(current, &slot));
            sweep.evicted += 1;

            if cleared.from != cleared.to {
                info!(
                    circle_id = %cleared.circle_id,
                    entry_point_id = %cleared.entry_point_id,
                    from = %cleared.from,
                    to = %cleared.to,
                    "Entry point cleared"
                );
                sweep.cleared.push(cleared);
            }
        }
        debug!(
            evicted = sweep.evicted,
            skipped_busy = sweep.skipped_busy,
            "Evidence sweep complete"
        );
        sweep
    }

    /// Force an entry point to `Resolved` with a zero score.
    pub fn resolve(
        &self,
        circle_id: &CircleId,
        entry_point_id: &EntryPointId,
        at: DateTime<Utc>,
    ) -> EvidenceResult<Option<PhaseTransition>> {
        let key = (circle_id.clone(), entry_point_id.clone());
        let Some(slot) = self.states.get(&key).map(|r| r.value().clone()) else {
            return Ok(None);
        };
        let mut state = self.lock(&slot, &key)?;
        if state.retired {
            return Ok(None);
        }
        let transition = state.resolve(at);
        info!(
            circle_id = %circle_id,
            entry_point_id = %entry_point_id,
            from = %transition.from,
            "Entry point resolved"
        );
        Ok(Some(transition))
    }

    /// Current ledger of an entry point, oldest first.
    pub fn ledger(
        &self,
        circle_id: &CircleId,
        entry_point_id: &EntryPointId,
    ) -> EvidenceResult<Vec<EvidenceEntry>> {
        let key = (circle_id.clone(), entry_point_id.clone());
        let Some(slot) = self.states.get(&key).map(|r| r.value().clone()) else {
            return Ok(Vec::new());
        };
        let state = self.lock(&slot, &key)?;
        Ok(state.evidence_ledger.clone())
    }

    pub fn snapshot(
        &self,
        circle_id: &CircleId,
        entry_point_id: &EntryPointId,
    ) -> EvidenceResult<Option<EntryPointSnapshot>> {
        let key = (circle_id.clone(), entry_point_id.clone());
        let Some(slot) = self.states.get(&key).map(|r| r.value().clone()) else {
            return Ok(None);
        };
        let state = self.lock(&slot, &key)?;
        if state.retired {
            return Ok(None);
        }
        Ok(Some(EntryPointSnapshot {
            circle_id: state.circle_id.clone(),
            entry_point_id: state.entry_point_id.clone(),
            phase: state.phase,
            score: state.score,
            last_update_time: state.last_update_time,
            triggered_sensor_ids: state.triggered_sensor_ids.clone(),
            ledger_len: state.evidence_ledger.len(),
        }))
    }

    /// Score decayed to `now` without recording an update.
    pub fn current_score(
        &self,
        circle_id: &CircleId,
        entry_point_id: &EntryPointId,
        now: DateTime<Utc>,
        mode: HouseMode,
    ) -> EvidenceResult<f64> {
        let key = (circle_id.clone(), entry_point_id.clone());
        let Some(slot) = self.states.get(&key).map(|r| r.value().clone()) else {
            return Ok(0.0);
        };
        let state = self.lock(&slot, &key)?;
        Ok(state.decayed_score(now, self.config.profile(mode).tau_seconds))
    }

    fn slot(&self, key: &SlotKey) -> Slot {
        self.states
            .entry(key.clone())
            .or_insert_with(|| {
                Arc::new(Mutex::new(EntryPointState::new(
                    key.0.clone(),
                    key.1.clone(),
                )))
            })
            .value()
            .clone()
    }

    fn lock<'a>(
        &self,
        slot: &'a Slot,
        key: &SlotKey,
    ) -> EvidenceResult<std::sync::MutexGuard<'a, EntryPointState>> {
        slot.lock().map_err(|_| EvidenceError::LockPoisoned {
            circle_id: key.0.clone(),
            entry_point_id: key.1.clone(),
        })
    }
}

impl Default for EvidenceAccumulator {
    fn default() -> Self {
        Self::with_defaults()
    }
}
