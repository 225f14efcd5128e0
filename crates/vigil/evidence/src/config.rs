//! Evidence accumulator configuration.
//!
//! Holds the per-mode thresholds and decay constants together with the
//! weight and multiplier tables used to price every signal.

use serde::{Deserialize, Serialize};
use vigil_types::{HouseMode, LocationType, SensorHealth, SensorType, SignalType};

use crate::confidence::ConfidenceMapping;
use crate::model::LikelihoodRatio;

/// Configuration for evidence accumulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidenceConfig {
    /// Decay constant and thresholds per house mode.
    pub profiles: ModeProfiles,

    /// Quiet time after which a cleared entry point is retired.
    pub idle_timeout_seconds: u64,

    /// Base weight per (sensor category, signal type).
    pub base_weights: Vec<BaseWeight>,

    /// Weight for pairs missing from the table.
    pub default_weight: f64,

    /// Mode × location multipliers.
    pub mode_multipliers: ModeMultipliers,

    /// Multipliers applied for reported sensor health.
    pub health: HealthMultipliers,

    /// Penalties subtracted for contradicting context.
    pub penalties: NegativeEvidencePenalties,

    /// Chain bonus used when a chain does not declare its own.
    pub chain_bonus: f64,

    /// Score → confidence mapping exposed to the UI.
    pub confidence_mapping: ConfidenceMapping,

    /// Which contribution model prices signals.
    pub model: ContributionModelKind,

    /// Likelihood ratios consulted by the log-likelihood model.
    pub likelihoods: Vec<LikelihoodRatio>,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            profiles: ModeProfiles::default(),
            idle_timeout_seconds: 300,
            base_weights: default_base_weights(),
            default_weight: 1.0,
            mode_multipliers: ModeMultipliers::default(),
            health: HealthMultipliers::default(),
            penalties: NegativeEvidencePenalties::default(),
            chain_bonus: 1.3,
            confidence_mapping: ConfidenceMapping::default(),
            model: ContributionModelKind::Heuristic,
            likelihoods: Vec::new(),
        }
    }
}

impl EvidenceConfig {
    pub fn profile(&self, mode: HouseMode) -> &ModeProfile {
        self.profiles.get(mode)
    }

    /// Base weight for a signal.
    ///
    /// Negative-evidence signals carry no positive weight unless the table
    /// names them explicitly; they only subtract their penalty.
    pub fn base_weight(&self, sensor_type: &SensorType, signal_type: &SignalType) -> f64 {
        if let Some(entry) = self
            .base_weights
            .iter()
            .find(|w| &w.sensor_type == sensor_type && &w.signal_type == signal_type)
        {
            return entry.weight;
        }
        if signal_type.is_negative_evidence() {
            0.0
        } else {
            self.default_weight
        }
    }

    pub fn mode_multiplier(&self, mode: HouseMode, location: LocationType) -> f64 {
        self.mode_multipliers.get(mode).get(location)
    }

    pub fn health_multiplier(&self, health: SensorHealth) -> f64 {
        self.health.get(health)
    }

    pub fn penalty(&self, signal_type: &SignalType) -> f64 {
        self.penalties.get(signal_type)
    }

    /// Validate ranges that would break the state machine.
    pub fn validate(&self) -> Result<(), String> {
        for mode in HouseMode::ALL {
            let profile = self.profile(mode);
            if profile.tau_seconds <= 0.0 {
                return Err(format!("{mode}: tau_seconds must be positive"));
            }
            let t = &profile.thresholds;
            if !(t.clear < t.pre && t.pre <= t.alarm) {
                return Err(format!(
                    "{mode}: thresholds must satisfy clear < pre <= alarm"
                ));
            }
        }
        if self.chain_bonus < 1.0 {
            return Err("chain_bonus must be at least 1.0".to_string());
        }
        Ok(())
    }
}

/// Dual thresholds with a clear floor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub pre: f64,
    pub alarm: f64,
    pub clear: f64,
}

/// Decay constant and thresholds for one house mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModeProfile {
    pub tau_seconds: f64,
    pub thresholds: Thresholds,
}

impl ModeProfile {
    const fn armed() -> Self {
        Self {
            tau_seconds: 90.0,
            thresholds: Thresholds {
                pre: 1.5,
                alarm: 3.5,
                clear: 0.3,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeProfiles {
    pub disarmed: ModeProfile,
    pub home: ModeProfile,
    pub away: ModeProfile,
    pub night: ModeProfile,
}

impl Default for ModeProfiles {
    fn default() -> Self {
        Self {
            disarmed: ModeProfile {
                tau_seconds: 90.0,
                thresholds: Thresholds {
                    pre: 2.5,
                    alarm: 5.0,
                    clear: 0.3,
                },
            },
            home: ModeProfile::armed(),
            away: ModeProfile::armed(),
            night: ModeProfile::armed(),
        }
    }
}

impl ModeProfiles {
    pub fn get(&self, mode: HouseMode) -> &ModeProfile {
        match mode {
            HouseMode::Disarmed => &self.disarmed,
            HouseMode::Home => &self.home,
            HouseMode::Away => &self.away,
            HouseMode::Night => &self.night,
        }
    }
}

/// One row of the base weight table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseWeight {
    pub sensor_type: SensorType,
    pub signal_type: SignalType,
    pub weight: f64,
}

fn default_base_weights() -> Vec<BaseWeight> {
    [
        (SensorType::GlassBreak, SignalType::GlassBreak, 2.5),
        (SensorType::Lock, SignalType::Tamper, 2.0),
        (SensorType::Contact, SignalType::Open, 1.5),
        (SensorType::Vibration, SignalType::Tamper, 1.2),
        (SensorType::Camera, SignalType::Person, 1.2),
        (SensorType::Motion, SignalType::Motion, 0.8),
        (SensorType::Camera, SignalType::Vehicle, 0.6),
        (SensorType::OutdoorMotion, SignalType::Motion, 0.6),
        (SensorType::Camera, SignalType::Motion, 0.5),
        (SensorType::Contact, SignalType::Close, 0.2),
        (SensorType::Doorbell, SignalType::Press, 0.1),
    ]
    .into_iter()
    .map(|(sensor_type, signal_type, weight)| BaseWeight {
        sensor_type,
        signal_type,
        weight,
    })
    .collect()
}

/// Multipliers by zone location for one mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationMultipliers {
    pub outdoor: f64,
    pub entry: f64,
    pub indoor: f64,
}

impl LocationMultipliers {
    pub fn get(&self, location: LocationType) -> f64 {
        match location {
            LocationType::Outdoor => self.outdoor,
            LocationType::Entry => self.entry,
            LocationType::Indoor => self.indoor,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeMultipliers {
    pub disarmed: LocationMultipliers,
    pub home: LocationMultipliers,
    pub away: LocationMultipliers,
    pub night: LocationMultipliers,
}

impl Default for ModeMultipliers {
    fn default() -> Self {
        Self {
            disarmed: LocationMultipliers {
                outdoor: 0.0,
                entry: 0.0,
                indoor: 0.0,
            },
            home: LocationMultipliers {
                outdoor: 0.6,
                entry: 1.2,
                indoor: 0.0,
            },
            away: LocationMultipliers {
                outdoor: 0.8,
                entry: 1.4,
                indoor: 1.5,
            },
            night: LocationMultipliers {
                outdoor: 1.0,
                entry: 1.5,
                indoor: 1.2,
            },
        }
    }
}

impl ModeMultipliers {
    pub fn get(&self, mode: HouseMode) -> &LocationMultipliers {
        match mode {
            HouseMode::Disarmed => &self.disarmed,
            HouseMode::Home => &self.home,
            HouseMode::Away => &self.away,
            HouseMode::Night => &self.night,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthMultipliers {
    pub healthy: f64,
    pub low_battery: f64,
    pub degraded: f64,
    pub offline: f64,
}

impl Default for HealthMultipliers {
    fn default() -> Self {
        Self {
            healthy: 1.0,
            low_battery: 0.9,
            degraded: 0.6,
            offline: 0.0,
        }
    }
}

impl HealthMultipliers {
    pub fn get(&self, health: SensorHealth) -> f64 {
        match health {
            SensorHealth::Healthy => self.healthy,
            SensorHealth::LowBattery => self.low_battery,
            SensorHealth::Degraded => self.degraded,
            SensorHealth::Offline => self.offline,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NegativeEvidencePenalties {
    pub authorized_disarm: f64,
    pub occupant_present: f64,
}

impl Default for NegativeEvidencePenalties {
    fn default() -> Self {
        Self {
            authorized_disarm: 3.0,
            occupant_present: 1.0,
        }
    }
}

impl NegativeEvidencePenalties {
    pub fn get(&self, signal_type: &SignalType) -> f64 {
        match signal_type {
            SignalType::AuthorizedDisarm => self.authorized_disarm,
            SignalType::OccupantPresent => self.occupant_present,
            _ => 0.0,
        }
    }
}

/// Selects the active contribution model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributionModelKind {
    Heuristic,
    LogLikelihood,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tables() {
        let config = EvidenceConfig::default();
        assert_eq!(
            config.base_weight(&SensorType::GlassBreak, &SignalType::GlassBreak),
            2.5
        );
        assert_eq!(
            config.base_weight(&SensorType::Other("radar".into()), &SignalType::Motion),
            1.0
        );
        assert_eq!(
            config.base_weight(&SensorType::Keypad, &SignalType::AuthorizedDisarm),
            0.0
        );
        assert_eq!(config.mode_multiplier(HouseMode::Home, LocationType::Indoor), 0.0);
        assert_eq!(config.mode_multiplier(HouseMode::Home, LocationType::Entry), 1.2);
        assert_eq!(config.health_multiplier(SensorHealth::Offline), 0.0);
        assert_eq!(config.penalty(&SignalType::AuthorizedDisarm), 3.0);
        assert_eq!(config.profile(HouseMode::Disarmed).thresholds.alarm, 5.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_thresholds() {
        let mut config = EvidenceConfig::default();
        config.profiles.night.thresholds.clear = 2.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let config: EvidenceConfig = serde_json::from_str(
            r#"{"chain_bonus": 1.5, "confidence_mapping": {"linear": {"score_max": 5.0}}}"#,
        )
        .unwrap();
        assert_eq!(config.chain_bonus, 1.5);
        assert_eq!(config.idle_timeout_seconds, 300);
        assert_eq!(config.confidence_mapping.map(2.5), 0.5);
    }
}
