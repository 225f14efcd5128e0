//! Notification policy: event type, severity and mode to urgency.

use serde::{Deserialize, Serialize};
use vigil_types::{EventType, HouseMode, NotificationLevel, Severity};

use crate::error::{RuleError, RuleResult};

/// Urgency per severity for one house mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityLevels {
    pub low: NotificationLevel,
    pub medium: NotificationLevel,
    pub high: NotificationLevel,
    pub critical: NotificationLevel,
}

impl SeverityLevels {
    const fn new(
        low: NotificationLevel,
        medium: NotificationLevel,
        high: NotificationLevel,
        critical: NotificationLevel,
    ) -> Self {
        Self {
            low,
            medium,
            high,
            critical,
        }
    }

    pub fn get(&self, severity: Severity) -> NotificationLevel {
        match severity {
            Severity::Low => self.low,
            Severity::Medium => self.medium,
            Severity::High => self.high,
            Severity::Critical => self.critical,
        }
    }
}

/// Mode × severity matrix plus the confidence escalation point.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub disarmed: SeverityLevels,
    pub home: SeverityLevels,
    pub away: SeverityLevels,
    pub night: SeverityLevels,
    /// A `none` result is raised to `normal` at or above this confidence.
    pub confidence_escalation: f64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        use NotificationLevel::{High, None, Normal};
        Self {
            disarmed: SeverityLevels::new(None, None, Normal, High),
            home: SeverityLevels::new(None, Normal, High, High),
            away: SeverityLevels::new(Normal, High, High, High),
            night: SeverityLevels::new(None, Normal, High, High),
            confidence_escalation: 0.9,
        }
    }
}

impl NotificationConfig {
    pub fn levels(&self, mode: HouseMode) -> &SeverityLevels {
        match mode {
            HouseMode::Disarmed => &self.disarmed,
            HouseMode::Home => &self.home,
            HouseMode::Away => &self.away,
            HouseMode::Night => &self.night,
        }
    }
}

/// Decides how urgently a security event is pushed.
#[derive(Debug, Clone, Default)]
pub struct NotificationPolicy {
    config: NotificationConfig,
}

impl NotificationPolicy {
    pub fn new(config: NotificationConfig) -> RuleResult<Self> {
        if !(0.0..=1.0).contains(&config.confidence_escalation) {
            return Err(RuleError::InvalidConfig(format!(
                "confidence_escalation {} outside [0, 1]",
                config.confidence_escalation
            )));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &NotificationConfig {
        &self.config
    }

    /// Urgency for an event.
    ///
    /// `score` is the mapped confidence in [0, 1]. Safety types are forced to
    /// `High` before the matrix is consulted.
    pub fn decide(
        &self,
        score: f64,
        event_type: EventType,
        severity: Severity,
        mode: HouseMode,
    ) -> NotificationLevel {
        if event_type.is_safety() {
            return NotificationLevel::High;
        }
        match self.config.levels(mode).get(severity) {
            NotificationLevel::None if score >= self.config.confidence_escalation => {
                NotificationLevel::Normal
            }
            level => level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_defaults() {
        let policy = NotificationPolicy::default();
        let decide = |severity, mode| policy.decide(0.0, EventType::Motion, severity, mode);
        assert_eq!(decide(Severity::High, HouseMode::Disarmed), NotificationLevel::Normal);
        assert_eq!(decide(Severity::High, HouseMode::Away), NotificationLevel::High);
        assert_eq!(decide(Severity::Low, HouseMode::Home), NotificationLevel::None);
        assert_eq!(decide(Severity::Low, HouseMode::Away), NotificationLevel::Normal);
        assert_eq!(decide(Severity::Medium, HouseMode::Night), NotificationLevel::Normal);
    }

    #[test]
    fn test_safety_forced_high() {
        let policy = NotificationPolicy::default();
        for mode in HouseMode::ALL {
            assert_eq!(
                policy.decide(0.0, EventType::CarbonMonoxide, Severity::Low, mode),
                NotificationLevel::High
            );
        }
    }

    #[test]
    fn test_high_confidence_lifts_none() {
        let policy = NotificationPolicy::default();
        assert_eq!(
            policy.decide(0.95, EventType::Motion, Severity::Low, HouseMode::Home),
            NotificationLevel::Normal
        );
        assert_eq!(
            policy.decide(0.5, EventType::Motion, Severity::Low, HouseMode::Home),
            NotificationLevel::None
        );
    }

    #[test]
    fn test_partial_config_overrides_one_mode() {
        let config: NotificationConfig = serde_json::from_str(
            r#"{"home": {"low": "normal", "medium": "high", "high": "high", "critical": "high"}}"#,
        )
        .unwrap();
        assert_eq!(config.home.low, NotificationLevel::Normal);
        assert_eq!(config.away, NotificationConfig::default().away);
        assert_eq!(config.confidence_escalation, 0.9);

        let policy = NotificationPolicy::new(config).unwrap();
        assert_eq!(
            policy.decide(0.0, EventType::Motion, Severity::Low, HouseMode::Home),
            NotificationLevel::Normal
        );
    }

    #[test]
    fn test_rejects_out_of_range_escalation() {
        let config = NotificationConfig {
            confidence_escalation: 1.5,
            ..NotificationConfig::default()
        };
        assert!(NotificationPolicy::new(config).is_err());
    }
}
