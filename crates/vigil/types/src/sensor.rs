//! Sensor taxonomy and the normalized inbound transition record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{CircleId, EntryPointId, SensorEventId, SensorId, ZoneId};

/// Sensor category.
///
/// Unknown categories are preserved verbatim in `Other` so they can still be
/// scored with the default weight.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SensorType {
    Contact,
    Motion,
    OutdoorMotion,
    Camera,
    GlassBreak,
    Vibration,
    Lock,
    Doorbell,
    Keypad,
    Smoke,
    CarbonMonoxide,
    Water,
    Other(String),
}

impl SensorType {
    pub fn as_str(&self) -> &str {
        match self {
            SensorType::Contact => "contact",
            SensorType::Motion => "motion",
            SensorType::OutdoorMotion => "outdoor_motion",
            SensorType::Camera => "camera",
            SensorType::GlassBreak => "glass_break",
            SensorType::Vibration => "vibration",
            SensorType::Lock => "lock",
            SensorType::Doorbell => "doorbell",
            SensorType::Keypad => "keypad",
            SensorType::Smoke => "smoke",
            SensorType::CarbonMonoxide => "carbon_monoxide",
            SensorType::Water => "water",
            SensorType::Other(name) => name,
        }
    }
}

impl From<String> for SensorType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "contact" | "door" | "window" => SensorType::Contact,
            "motion" | "pir" => SensorType::Motion,
            "outdoor_motion" | "outdoor_pir" => SensorType::OutdoorMotion,
            "camera" => SensorType::Camera,
            "glass_break" => SensorType::GlassBreak,
            "vibration" => SensorType::Vibration,
            "lock" => SensorType::Lock,
            "doorbell" => SensorType::Doorbell,
            "keypad" => SensorType::Keypad,
            "smoke" => SensorType::Smoke,
            "carbon_monoxide" | "co" => SensorType::CarbonMonoxide,
            "water" | "leak" => SensorType::Water,
            _ => SensorType::Other(value),
        }
    }
}

impl From<SensorType> for String {
    fn from(value: SensorType) -> Self {
        value.as_str().to_string()
    }
}

impl From<&str> for SensorType {
    fn from(value: &str) -> Self {
        SensorType::from(value.to_string())
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the sensor reported.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SignalType {
    Open,
    Close,
    Motion,
    Person,
    Vehicle,
    Animal,
    PackageDelivered,
    PackageTaken,
    GlassBreak,
    Tamper,
    Noise,
    Press,
    Smoke,
    CarbonMonoxide,
    Leak,
    AuthorizedDisarm,
    OccupantPresent,
    Other(String),
}

impl SignalType {
    pub fn as_str(&self) -> &str {
        match self {
            SignalType::Open => "open",
            SignalType::Close => "close",
            SignalType::Motion => "motion",
            SignalType::Person => "person",
            SignalType::Vehicle => "vehicle",
            SignalType::Animal => "animal",
            SignalType::PackageDelivered => "package_delivered",
            SignalType::PackageTaken => "package_taken",
            SignalType::GlassBreak => "glass_break",
            SignalType::Tamper => "tamper",
            SignalType::Noise => "noise",
            SignalType::Press => "press",
            SignalType::Smoke => "smoke",
            SignalType::CarbonMonoxide => "carbon_monoxide",
            SignalType::Leak => "leak",
            SignalType::AuthorizedDisarm => "authorized_disarm",
            SignalType::OccupantPresent => "occupant_present",
            SignalType::Other(name) => name,
        }
    }

    /// Life-safety signals that bypass house-mode gating.
    pub fn is_safety(&self) -> bool {
        matches!(
            self,
            SignalType::Smoke | SignalType::CarbonMonoxide | SignalType::Leak
        )
    }

    /// Signals indicating movement of any kind.
    pub fn is_motion_like(&self) -> bool {
        matches!(
            self,
            SignalType::Motion | SignalType::Person | SignalType::Vehicle | SignalType::Animal
        )
    }

    /// Signals that contradict an intrusion hypothesis.
    pub fn is_negative_evidence(&self) -> bool {
        matches!(
            self,
            SignalType::AuthorizedDisarm | SignalType::OccupantPresent
        )
    }
}

impl From<String> for SignalType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "open" | "opened" => SignalType::Open,
            "close" | "closed" => SignalType::Close,
            "motion" => SignalType::Motion,
            "person" => SignalType::Person,
            "vehicle" => SignalType::Vehicle,
            "animal" => SignalType::Animal,
            "package_delivered" => SignalType::PackageDelivered,
            "package_taken" | "package_removed" => SignalType::PackageTaken,
            "glass_break" => SignalType::GlassBreak,
            "tamper" => SignalType::Tamper,
            "noise" => SignalType::Noise,
            "press" | "ring" => SignalType::Press,
            "smoke" | "fire" => SignalType::Smoke,
            "carbon_monoxide" | "co" => SignalType::CarbonMonoxide,
            "leak" | "water_leak" => SignalType::Leak,
            "authorized_disarm" => SignalType::AuthorizedDisarm,
            "occupant_present" => SignalType::OccupantPresent,
            _ => SignalType::Other(value),
        }
    }
}

impl From<SignalType> for String {
    fn from(value: SignalType) -> Self {
        value.as_str().to_string()
    }
}

impl From<&str> for SignalType {
    fn from(value: &str) -> Self {
        SignalType::from(value.to_string())
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reported device health, scaled by a configured multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorHealth {
    Healthy,
    LowBattery,
    Degraded,
    Offline,
}

impl Default for SensorHealth {
    fn default() -> Self {
        SensorHealth::Healthy
    }
}

/// One normalized sensor transition. Immutable once ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorEvent {
    #[serde(default = "SensorEventId::generate")]
    pub id: SensorEventId,
    pub circle_id: CircleId,
    pub sensor_id: SensorId,
    /// Zone the sensor reported from, when the integration layer knows it.
    #[serde(default)]
    pub zone_id: Option<ZoneId>,
    /// Explicit entry point attribution; falls back to the zone mapping.
    #[serde(default)]
    pub entry_point_id: Option<EntryPointId>,
    pub sensor_type: SensorType,
    pub signal_type: SignalType,
    /// Detector confidence in [0, 1]. Absent for binary contact/PIR sensors.
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub new_state: String,
    #[serde(default)]
    pub old_state: Option<String>,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub raw_payload: serde_json::Value,
}

impl SensorEvent {
    /// Construct an event with no payload, attributed by zone.
    pub fn new(
        circle_id: CircleId,
        sensor_id: SensorId,
        zone_id: Option<ZoneId>,
        sensor_type: SensorType,
        signal_type: SignalType,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SensorEventId::generate(),
            circle_id,
            sensor_id,
            zone_id,
            entry_point_id: None,
            sensor_type,
            new_state: signal_type.as_str().to_string(),
            signal_type,
            confidence: None,
            old_state: None,
            occurred_at,
            raw_payload: serde_json::Value::Null,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_entry_point(mut self, entry_point_id: EntryPointId) -> Self {
        self.entry_point_id = Some(entry_point_id);
        self
    }

    /// Raw confidence clamped to [0, 1]. Sensors without a detector
    /// probability (binary contact/PIR) report 1.0.
    pub fn raw_confidence(&self) -> f64 {
        match self.confidence {
            Some(c) if c.is_finite() => c.clamp(0.0, 1.0),
            Some(_) => 0.0,
            None => 1.0,
        }
    }
}
