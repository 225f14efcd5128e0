//! Per-entry-point score and hysteresis state machine.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use vigil_types::{
    Chain, CircleId, EntryPointId, EntryPointPhase, EvidenceEntry, SensorEventId, SensorId,
    SensorType, SignalType,
};

use crate::config::{ModeProfile, Thresholds};

/// A phase change of one entry point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub circle_id: CircleId,
    pub entry_point_id: EntryPointId,
    pub from: EntryPointPhase,
    pub to: EntryPointPhase,
    pub score: f64,
    pub at: DateTime<Utc>,
}

impl PhaseTransition {
    /// Upward move in the phase order.
    pub fn is_forward(&self) -> bool {
        self.to.rank() > self.from.rank()
    }

    /// Forward move into `PreAlert` or `Alarm`.
    pub fn is_escalation(&self) -> bool {
        self.is_forward() && self.to.is_alerting()
    }
}

/// A signal with every scoring term already priced.
#[derive(Debug, Clone, PartialEq)]
pub struct PricedSignal {
    pub signal_id: SensorEventId,
    pub sensor_id: SensorId,
    pub sensor_type: SensorType,
    pub signal_type: SignalType,
    pub raw_confidence: f64,
    pub effective_confidence: f64,
    pub base_weight: f64,
    pub mode_multiplier: f64,
    pub chain_bonus: f64,
    pub negative_penalty: f64,
    pub contribution: f64,
}

/// Live state of one (circle, entry point).
#[derive(Debug, Clone)]
pub struct EntryPointState {
    pub circle_id: CircleId,
    pub entry_point_id: EntryPointId,
    pub score: f64,
    pub last_update_time: Option<DateTime<Utc>>,
    pub phase: EntryPointPhase,
    /// Distinct sensors in first-fired order.
    pub triggered_sensor_ids: Vec<SensorId>,
    pub evidence_ledger: Vec<EvidenceEntry>,
    last_fired: HashMap<SensorId, DateTime<Utc>>,
    pub(crate) retired: bool,
}

impl EntryPointState {
    pub fn new(circle_id: CircleId, entry_point_id: EntryPointId) -> Self {
        Self {
            circle_id,
            entry_point_id,
            score: 0.0,
            last_update_time: None,
            phase: EntryPointPhase::Idle,
            triggered_sensor_ids: Vec::new(),
            evidence_ledger: Vec::new(),
            last_fired: HashMap::new(),
            retired: false,
        }
    }

    /// Seconds since the last update, clamped at zero.
    ///
    /// The flag is set when `now` precedes the last update.
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> (f64, bool) {
        match self.last_update_time {
            Some(last) => {
                let dt = (now - last).num_milliseconds() as f64 / 1000.0;
                if dt < 0.0 {
                    (0.0, true)
                } else {
                    (dt, false)
                }
            }
            None => (0.0, false),
        }
    }

    /// `exp(-Δt / τ)` for an update at `now`.
    pub fn decay_factor(&self, now: DateTime<Utc>, tau_seconds: f64) -> f64 {
        let (dt, _) = self.elapsed_seconds(now);
        (-dt / tau_seconds).exp()
    }

    /// Score as it would read at `now`, without mutating.
    pub fn decayed_score(&self, now: DateTime<Utc>, tau_seconds: f64) -> f64 {
        self.score * self.decay_factor(now, tau_seconds)
    }

    /// Bonus for `sensor_id` given the chains of this entry point.
    ///
    /// Applies at chain position ≥ 1 when every predecessor last fired within
    /// the chain window and in chain order. The largest applicable bonus wins.
    pub fn chain_bonus(
        &self,
        sensor_id: &SensorId,
        chains: &[Chain],
        default_bonus: f64,
        now: DateTime<Utc>,
    ) -> f64 {
        chains
            .iter()
            .filter(|chain| self.chain_satisfied(chain, sensor_id, now))
            .map(|chain| chain.bonus.unwrap_or(default_bonus))
            .fold(1.0, f64::max)
    }

    fn chain_satisfied(&self, chain: &Chain, sensor_id: &SensorId, now: DateTime<Utc>) -> bool {
        let Some(position) = chain.position(sensor_id) else {
            return false;
        };
        if position == 0 {
            return false;
        }
        let window = Duration::seconds(chain.window_seconds as i64);
        let mut previous: Option<DateTime<Utc>> = None;
        for predecessor in &chain.sensors[..position] {
            let Some(&fired) = self.last_fired.get(predecessor) else {
                return false;
            };
            if fired > now || now - fired > window {
                return false;
            }
            if previous.is_some_and(|p| fired < p) {
                return false;
            }
            previous = Some(fired);
        }
        true
    }

    /// Decay, add the priced contribution, record the ledger entry and
    /// evaluate forward transitions.
    pub fn accumulate(
        &mut self,
        priced: PricedSignal,
        now: DateTime<Utc>,
        profile: &ModeProfile,
    ) -> (EvidenceEntry, Vec<PhaseTransition>) {
        let decay_factor = self.decay_factor(now, profile.tau_seconds);
        let score_before = self.score * decay_factor;
        let score_after = (score_before + priced.contribution).max(0.0);

        let entry = EvidenceEntry {
            timestamp: now,
            signal_id: priced.signal_id,
            entry_point_id: self.entry_point_id.clone(),
            sensor_id: priced.sensor_id.clone(),
            sensor_type: priced.sensor_type,
            signal_type: priced.signal_type,
            raw_confidence: priced.raw_confidence,
            effective_confidence: priced.effective_confidence,
            base_weight: priced.base_weight,
            mode_multiplier: priced.mode_multiplier,
            chain_bonus: priced.chain_bonus,
            negative_penalty: priced.negative_penalty,
            contribution: priced.contribution,
            decay_factor,
            score_before,
            score_after,
        };

        self.score = score_after;
        self.last_update_time = Some(match self.last_update_time {
            Some(last) => last.max(now),
            None => now,
        });
        if !self.triggered_sensor_ids.contains(&priced.sensor_id) {
            self.triggered_sensor_ids.push(priced.sensor_id.clone());
        }
        let fired = self.last_fired.entry(priced.sensor_id).or_insert(now);
        *fired = (*fired).max(now);
        self.evidence_ledger.push(entry.clone());

        let transitions = self.advance(&profile.thresholds, now);
        (entry, transitions)
    }

    /// Forward-only threshold evaluation.
    ///
    /// A single update crossing both thresholds records `PreAlert` before
    /// `Alarm`. Falling below a threshold never moves the phase back.
    pub fn advance(&mut self, thresholds: &Thresholds, at: DateTime<Utc>) -> Vec<PhaseTransition> {
        let mut transitions = Vec::new();
        loop {
            let next = match self.phase {
                EntryPointPhase::Idle | EntryPointPhase::Resolved | EntryPointPhase::Watch
                    if self.score >= thresholds.pre =>
                {
                    EntryPointPhase::PreAlert
                }
                EntryPointPhase::Idle | EntryPointPhase::Resolved
                    if self.score > thresholds.clear =>
                {
                    EntryPointPhase::Watch
                }
                EntryPointPhase::PreAlert if self.score >= thresholds.alarm => {
                    EntryPointPhase::Alarm
                }
                _ => break,
            };
            transitions.push(self.transition(next, at));
        }
        transitions
    }

    /// Score at or below the clear floor with no update for the idle timeout.
    pub fn is_clearable(
        &self,
        now: DateTime<Utc>,
        profile: &ModeProfile,
        idle_timeout_seconds: u64,
    ) -> bool {
        let Some(last) = self.last_update_time else {
            return false;
        };
        now - last >= Duration::seconds(idle_timeout_seconds as i64)
            && self.decayed_score(now, profile.tau_seconds) <= profile.thresholds.clear
    }

    /// Drop the current hypothesis.
    ///
    /// Entry points that reached `PreAlert` or `Alarm` end `Resolved`, others
    /// return to `Idle`.
    pub fn clear(&mut self, at: DateTime<Utc>) -> PhaseTransition {
        let target = if self.phase.is_alerting() {
            EntryPointPhase::Resolved
        } else {
            EntryPointPhase::Idle
        };
        self.reset();
        self.transition(target, at)
    }

    /// Force `Resolved` with a zero score.
    pub fn resolve(&mut self, at: DateTime<Utc>) -> PhaseTransition {
        self.reset();
        self.transition(EntryPointPhase::Resolved, at)
    }

    fn reset(&mut self) {
        self.score = 0.0;
        self.triggered_sensor_ids.clear();
        self.last_fired.clear();
        self.evidence_ledger.clear();
    }

    fn transition(&mut self, to: EntryPointPhase, at: DateTime<Utc>) -> PhaseTransition {
        let transition = PhaseTransition {
            circle_id: self.circle_id.clone(),
            entry_point_id: self.entry_point_id.clone(),
            from: self.phase,
            to,
            score: self.score,
            at,
        };
        self.phase = to;
        transition
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_types::ChainId;

    fn state() -> EntryPointState {
        EntryPointState::new(CircleId::new("home"), EntryPointId::new("front"))
    }

    fn priced(sensor: &str, contribution: f64) -> PricedSignal {
        PricedSignal {
            signal_id: SensorEventId::generate(),
            sensor_id: SensorId::new(sensor),
            sensor_type: SensorType::Contact,
            signal_type: SignalType::Open,
            raw_confidence: 1.0,
            effective_confidence: 1.0,
            base_weight: contribution,
            mode_multiplier: 1.0,
            chain_bonus: 1.0,
            negative_penalty: 0.0,
            contribution,
        }
    }

    fn profile() -> ModeProfile {
        ModeProfile {
            tau_seconds: 90.0,
            thresholds: Thresholds {
                pre: 1.5,
                alarm: 3.5,
                clear: 0.3,
            },
        }
    }

    #[test]
    fn test_decay_applies_before_add() {
        let t0 = Utc::now();
        let mut s = state();
        s.accumulate(priced("a", 1.0), t0, &profile());
        let (entry, _) = s.accumulate(priced("a", 1.0), t0 + Duration::seconds(90), &profile());

        let expected_before = (-1.0f64).exp();
        assert!((entry.score_before - expected_before).abs() < 1e-12);
        assert!((entry.score_after - (expected_before + 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_single_update_records_both_transitions() {
        let mut s = state();
        let (_, transitions) = s.accumulate(priced("glass", 3.75), Utc::now(), &profile());
        let phases: Vec<_> = transitions.iter().map(|t| t.to).collect();
        assert_eq!(phases, vec![EntryPointPhase::PreAlert, EntryPointPhase::Alarm]);
        assert!(transitions.iter().all(PhaseTransition::is_escalation));
    }

    #[test]
    fn test_watch_then_no_oscillation() {
        let t0 = Utc::now();
        let mut s = state();
        let (_, first) = s.accumulate(priced("a", 0.5), t0, &profile());
        assert_eq!(first[0].to, EntryPointPhase::Watch);

        let (_, second) = s.accumulate(priced("a", 1.2), t0 + Duration::seconds(1), &profile());
        assert_eq!(second.len(), 1);
        assert_eq!(s.phase, EntryPointPhase::PreAlert);

        // Decays below T_pre, then climbs back: no repeated PreAlert.
        let (_, third) = s.accumulate(priced("a", 0.2), t0 + Duration::seconds(60), &profile());
        assert!(third.is_empty());
        let (_, fourth) = s.accumulate(priced("a", 0.8), t0 + Duration::seconds(61), &profile());
        assert!(fourth.is_empty());
        assert_eq!(s.phase, EntryPointPhase::PreAlert);
    }

    #[test]
    fn test_negative_evidence_floors_at_zero() {
        let mut s = state();
        let (entry, _) = s.accumulate(priced("keypad", -3.0), Utc::now(), &profile());
        assert_eq!(entry.score_after, 0.0);
        assert_eq!(s.score, 0.0);
    }

    #[test]
    fn test_clock_skew_clamps() {
        let t0 = Utc::now();
        let mut s = state();
        s.accumulate(priced("a", 1.0), t0, &profile());
        let (entry, _) = s.accumulate(priced("a", 0.0), t0 - Duration::seconds(30), &profile());
        assert_eq!(entry.decay_factor, 1.0);
        assert_eq!(s.last_update_time, Some(t0));
    }

    #[test]
    fn test_clear_requires_idle_and_low_score() {
        let t0 = Utc::now();
        let mut s = state();
        s.accumulate(priced("a", 2.0), t0, &profile());
        assert!(!s.is_clearable(t0 + Duration::seconds(100), &profile(), 300));
        assert!(s.is_clearable(t0 + Duration::seconds(300), &profile(), 300));

        let transition = s.clear(t0 + Duration::seconds(300));
        assert_eq!(transition.from, EntryPointPhase::PreAlert);
        assert_eq!(transition.to, EntryPointPhase::Resolved);
        assert!(s.evidence_ledger.is_empty());
    }

    #[test]
    fn test_chain_bonus_requires_order_and_window() {
        let t0 = Utc::now();
        let chain = Chain {
            id: ChainId::new("front"),
            entry_point_id: EntryPointId::new("front"),
            sensors: vec![SensorId::new("cam"), SensorId::new("door"), SensorId::new("pir")],
            window_seconds: 120,
            bonus: None,
        };
        let chains = std::slice::from_ref(&chain);
        let mut s = state();

        assert_eq!(s.chain_bonus(&SensorId::new("door"), chains, 1.3, t0), 1.0);
        s.accumulate(priced("cam", 0.1), t0, &profile());
        assert_eq!(s.chain_bonus(&SensorId::new("cam"), chains, 1.3, t0), 1.0);
        assert_eq!(s.chain_bonus(&SensorId::new("door"), chains, 1.3, t0), 1.3);
        assert_eq!(s.chain_bonus(&SensorId::new("pir"), chains, 1.3, t0), 1.0);

        let late = t0 + Duration::seconds(121);
        assert_eq!(s.chain_bonus(&SensorId::new("door"), chains, 1.3, late), 1.0);

        // Door fires before cam refires: predecessors out of order for pir.
        s.accumulate(priced("door", 0.1), t0 + Duration::seconds(5), &profile());
        s.accumulate(priced("cam", 0.1), t0 + Duration::seconds(10), &profile());
        let at = t0 + Duration::seconds(11);
        assert_eq!(s.chain_bonus(&SensorId::new("pir"), chains, 1.3, at), 1.0);
    }
}
