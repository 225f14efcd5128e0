//! Fusion rule table.
//!
//! Rules are plain records with function-pointer predicates, evaluated by a
//! linear scan in the order declared here.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use vigil_types::{
    EntryPointPhase, EventType, HouseMode, LocationType, SensorEvent, Severity, SignalType,
};

/// A track event together with the location class of its zone.
#[derive(Debug, Clone, Copy)]
pub struct LocatedEvent<'a> {
    pub event: &'a SensorEvent,
    pub location: Option<LocationType>,
}

impl<'a> LocatedEvent<'a> {
    pub fn new(event: &'a SensorEvent, location: Option<LocationType>) -> Self {
        Self { event, location }
    }

    fn signal(&self) -> &SignalType {
        &self.event.signal_type
    }

    fn at(&self, location: LocationType) -> bool {
        self.location == Some(location)
    }
}

/// Context a rule is evaluated against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleContext {
    pub mode: HouseMode,
    /// Evaluation time; windows are measured back from here.
    pub now: DateTime<Utc>,
    pub dwell_seconds_private: f64,
    /// Highest phase among the entry points the latest signal fed.
    pub entry_phase: EntryPointPhase,
}

/// Events inside one rule's window plus the shared context.
#[derive(Debug)]
pub struct RuleInput<'a> {
    pub events: Vec<LocatedEvent<'a>>,
    pub context: &'a RuleContext,
}

impl RuleInput<'_> {
    fn any(&self, signal: SignalType) -> bool {
        self.events.iter().any(|e| *e.signal() == signal)
    }

    fn count(&self, signal: SignalType) -> usize {
        self.events.iter().filter(|e| *e.signal() == signal).count()
    }

    fn mode_in(&self, modes: &[HouseMode]) -> bool {
        modes.contains(&self.context.mode)
    }
}

pub type Condition = fn(&RuleInput<'_>) -> bool;
pub type SeverityUpgrade = fn(&RuleInput<'_>, Severity) -> Severity;

/// One fusion rule.
#[derive(Debug, Clone, Copy)]
pub struct FusionRule {
    pub id: &'static str,
    pub event_type: EventType,
    pub base_severity: Severity,
    pub required_modes: &'static [HouseMode],
    pub window_seconds: u64,
    pub condition: Condition,
    pub severity_upgrade: Option<SeverityUpgrade>,
}

impl FusionRule {
    pub fn applies_in(&self, mode: HouseMode) -> bool {
        self.required_modes.contains(&mode)
    }

    /// Events of the track inside this rule's window.
    pub fn window<'a>(&self, events: &[LocatedEvent<'a>], now: DateTime<Utc>) -> Vec<LocatedEvent<'a>> {
        let start = now - Duration::seconds(self.window_seconds as i64);
        events
            .iter()
            .filter(|e| e.event.occurred_at >= start && e.event.occurred_at <= now)
            .copied()
            .collect()
    }

    /// Severity if the rule matches.
    pub fn check(&self, input: &RuleInput<'_>) -> Option<Severity> {
        if !(self.condition)(input) {
            return None;
        }
        let severity = match self.severity_upgrade {
            Some(upgrade) => upgrade(input, self.base_severity).max(self.base_severity),
            None => self.base_severity,
        };
        Some(severity.max(self.event_type.severity_floor()))
    }
}

const ALL: &[HouseMode] = &HouseMode::ALL;
const ARMED: &[HouseMode] = &[HouseMode::Home, HouseMode::Away, HouseMode::Night];
const AWAY_NIGHT: &[HouseMode] = &[HouseMode::Away, HouseMode::Night];

/// Life-safety rules, checked first in every mode.
pub static SAFETY_RULES: &[FusionRule] = &[
    FusionRule {
        id: "safety.fire",
        event_type: EventType::Fire,
        base_severity: Severity::Critical,
        required_modes: ALL,
        window_seconds: 300,
        condition: |input| input.any(SignalType::Smoke),
        severity_upgrade: None,
    },
    FusionRule {
        id: "safety.co",
        event_type: EventType::CarbonMonoxide,
        base_severity: Severity::Critical,
        required_modes: ALL,
        window_seconds: 300,
        condition: |input| input.any(SignalType::CarbonMonoxide),
        severity_upgrade: None,
    },
    FusionRule {
        id: "safety.water",
        event_type: EventType::WaterLeak,
        base_severity: Severity::High,
        required_modes: ALL,
        window_seconds: 300,
        condition: |input| input.any(SignalType::Leak),
        severity_upgrade: None,
    },
];

/// Glass-break rules, checked after safety and before mode gating.
pub static GLASS_RULES: &[FusionRule] = &[
    FusionRule {
        id: "glass.break_in",
        event_type: EventType::BreakIn,
        base_severity: Severity::Critical,
        required_modes: ALL,
        window_seconds: 120,
        condition: |input| input.any(SignalType::GlassBreak) && input.any(SignalType::Person),
        severity_upgrade: None,
    },
    FusionRule {
        id: "glass.perimeter",
        event_type: EventType::PerimeterDamage,
        base_severity: Severity::High,
        required_modes: ALL,
        window_seconds: 120,
        condition: |input| input.any(SignalType::GlassBreak),
        severity_upgrade: Some(|input, severity| {
            if input.mode_in(AWAY_NIGHT) {
                Severity::Critical
            } else {
                severity
            }
        }),
    },
];

/// Mode-gated rules in priority order.
pub static MODE_RULES: &[FusionRule] = &[
    FusionRule {
        id: "intrusion.entry_then_interior",
        event_type: EventType::BreakIn,
        base_severity: Severity::High,
        required_modes: AWAY_NIGHT,
        window_seconds: 120,
        condition: entry_then_interior,
        severity_upgrade: Some(|input, severity| {
            if input.context.mode == HouseMode::Night {
                Severity::Critical
            } else {
                severity
            }
        }),
    },
    FusionRule {
        id: "intrusion.forced_entry",
        event_type: EventType::BreakIn,
        base_severity: Severity::High,
        required_modes: ARMED,
        window_seconds: 60,
        condition: |input| {
            input
                .events
                .iter()
                .any(|e| *e.signal() == SignalType::Tamper && e.at(LocationType::Entry))
        },
        severity_upgrade: None,
    },
    FusionRule {
        id: "evidence.alarm",
        event_type: EventType::BreakIn,
        base_severity: Severity::High,
        required_modes: ARMED,
        window_seconds: 300,
        condition: |input| input.context.entry_phase == EntryPointPhase::Alarm,
        severity_upgrade: None,
    },
    FusionRule {
        id: "person.private_dwell",
        event_type: EventType::SuspiciousPerson,
        base_severity: Severity::Medium,
        required_modes: ARMED,
        window_seconds: 300,
        condition: |input| {
            input.any(SignalType::Person) && input.context.dwell_seconds_private >= 30.0
        },
        severity_upgrade: Some(|input, severity| {
            if input.mode_in(AWAY_NIGHT) || input.context.dwell_seconds_private >= 120.0 {
                Severity::High
            } else {
                severity
            }
        }),
    },
    FusionRule {
        id: "person.detected",
        event_type: EventType::SuspiciousPerson,
        base_severity: Severity::Medium,
        required_modes: AWAY_NIGHT,
        window_seconds: 120,
        condition: |input| input.any(SignalType::Person),
        severity_upgrade: Some(night_high),
    },
    FusionRule {
        id: "vehicle.loitering",
        event_type: EventType::SuspiciousVehicle,
        base_severity: Severity::Low,
        required_modes: ARMED,
        window_seconds: 600,
        condition: |input| input.count(SignalType::Vehicle) >= 2,
        severity_upgrade: Some(night_medium),
    },
    FusionRule {
        id: "noise.unusual",
        event_type: EventType::UnusualNoise,
        base_severity: Severity::Low,
        required_modes: AWAY_NIGHT,
        window_seconds: 120,
        condition: |input| input.any(SignalType::Noise),
        severity_upgrade: Some(night_medium),
    },
    FusionRule {
        id: "package.taken",
        event_type: EventType::PackageTaken,
        base_severity: Severity::Medium,
        required_modes: ARMED,
        window_seconds: 600,
        condition: |input| input.any(SignalType::PackageTaken),
        severity_upgrade: Some(|input, severity| {
            if input.context.mode == HouseMode::Away {
                Severity::High
            } else {
                severity
            }
        }),
    },
    FusionRule {
        id: "package.delivered",
        event_type: EventType::PackageDelivered,
        base_severity: Severity::Low,
        required_modes: ARMED,
        window_seconds: 600,
        condition: |input| input.any(SignalType::PackageDelivered),
        severity_upgrade: None,
    },
    FusionRule {
        id: "motion.generic",
        event_type: EventType::Motion,
        base_severity: Severity::Low,
        required_modes: AWAY_NIGHT,
        window_seconds: 120,
        condition: |input| input.events.iter().any(|e| e.signal().is_motion_like()),
        severity_upgrade: None,
    },
];

/// An entry-zone opening followed by interior motion.
fn entry_then_interior(input: &RuleInput<'_>) -> bool {
    let Some(opened) = input
        .events
        .iter()
        .filter(|e| *e.signal() == SignalType::Open && e.at(LocationType::Entry))
        .map(|e| e.event.occurred_at)
        .min()
    else {
        return false;
    };
    input.events.iter().any(|e| {
        matches!(e.signal(), SignalType::Motion | SignalType::Person)
            && e.at(LocationType::Indoor)
            && e.event.occurred_at >= opened
    })
}

fn night_high(input: &RuleInput<'_>, severity: Severity) -> Severity {
    if input.context.mode == HouseMode::Night {
        Severity::High
    } else {
        severity
    }
}

fn night_medium(input: &RuleInput<'_>, severity: Severity) -> Severity {
    if input.context.mode == HouseMode::Night {
        Severity::Medium
    } else {
        severity
    }
}
