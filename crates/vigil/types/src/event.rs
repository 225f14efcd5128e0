//! Security event classification and the outbound event record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::evidence::EvidenceEntry;
use crate::ids::{CircleId, EntryPointId, SecurityEventId, SensorId, TrackId, ZoneId};
use crate::mode::LocationType;

/// Symbolic event type.
///
/// `priority()` defines the total order used for in-place upgrades; a larger
/// value always wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Fire,
    CarbonMonoxide,
    WaterLeak,
    BreakIn,
    PerimeterDamage,
    SuspiciousPerson,
    SuspiciousVehicle,
    UnusualNoise,
    PackageTaken,
    PackageDelivered,
    Motion,
}

impl EventType {
    pub fn priority(&self) -> u8 {
        match self {
            EventType::Fire => 100,
            EventType::CarbonMonoxide => 95,
            EventType::WaterLeak => 90,
            EventType::BreakIn => 80,
            EventType::PerimeterDamage => 70,
            EventType::SuspiciousPerson => 60,
            EventType::SuspiciousVehicle => 50,
            EventType::UnusualNoise => 40,
            EventType::PackageTaken => 30,
            EventType::PackageDelivered => 20,
            EventType::Motion => 10,
        }
    }

    /// Fire, carbon monoxide and water events are never suppressed.
    pub fn is_safety(&self) -> bool {
        matches!(
            self,
            EventType::Fire | EventType::CarbonMonoxide | EventType::WaterLeak
        )
    }

    /// Lowest severity a safety event may carry.
    pub fn severity_floor(&self) -> Severity {
        match self {
            EventType::Fire | EventType::CarbonMonoxide => Severity::Critical,
            EventType::WaterLeak => Severity::High,
            _ => Severity::Low,
        }
    }

    pub fn outranks(&self, other: &EventType) -> bool {
        self.priority() > other.priority()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventType::Fire => "fire",
            EventType::CarbonMonoxide => "carbon_monoxide",
            EventType::WaterLeak => "water_leak",
            EventType::BreakIn => "break_in",
            EventType::PerimeterDamage => "perimeter_damage",
            EventType::SuspiciousPerson => "suspicious_person",
            EventType::SuspiciousVehicle => "suspicious_vehicle",
            EventType::UnusualNoise => "unusual_noise",
            EventType::PackageTaken => "package_taken",
            EventType::PackageDelivered => "package_delivered",
            EventType::Motion => "motion",
        };
        f.write_str(s)
    }
}

/// Event severity, ordered `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Notification urgency, ordered `None < Normal < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    None,
    Normal,
    High,
}

impl fmt::Display for NotificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationLevel::None => write!(f, "none"),
            NotificationLevel::Normal => write!(f, "normal"),
            NotificationLevel::High => write!(f, "high"),
        }
    }
}

/// External verdict closing a security event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feedback {
    TruePositive,
    FalsePositive,
    Missed,
}

/// Lifecycle of a security event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "feedback", rename_all = "snake_case")]
pub enum EventStatus {
    Open,
    Resolved(Feedback),
}

impl EventStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, EventStatus::Open)
    }
}

/// The externally visible security event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub id: SecurityEventId,
    pub circle_id: CircleId,
    pub zone_id: Option<ZoneId>,
    pub entry_point_id: Option<EntryPointId>,
    pub event_type: EventType,
    pub severity: Severity,
    pub status: EventStatus,
    pub primary_track_id: TrackId,
    pub fusion_rule_id: String,
    pub path_summary: Vec<LocationType>,
    pub dwell_seconds_private: f64,
    pub contributing_sensor_ids: Vec<SensorId>,
    /// Mapped confidence in [0, 1] for the UI.
    pub ml_score: f64,
    pub notification_level: NotificationLevel,
    /// Top-N contributors from the entry point's ledger.
    pub evidence_ledger: Vec<EvidenceEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SecurityEvent {
    /// Human-readable path such as `outdoor→entry→indoor`.
    pub fn path_label(&self) -> String {
        self.path_summary
            .iter()
            .map(|l| l.to_string())
            .collect::<Vec<_>>()
            .join("→")
    }
}
