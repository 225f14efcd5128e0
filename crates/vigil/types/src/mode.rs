//! Operating posture and zone classification.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// House mode: the operating posture gating rules and multipliers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HouseMode {
    Disarmed,
    Home,
    Away,
    Night,
}

impl HouseMode {
    pub const ALL: [HouseMode; 4] = [
        HouseMode::Disarmed,
        HouseMode::Home,
        HouseMode::Away,
        HouseMode::Night,
    ];

    /// Whether the system is armed in any form.
    pub fn is_armed(&self) -> bool {
        !matches!(self, HouseMode::Disarmed)
    }
}

impl Default for HouseMode {
    fn default() -> Self {
        HouseMode::Disarmed
    }
}

impl fmt::Display for HouseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HouseMode::Disarmed => write!(f, "disarmed"),
            HouseMode::Home => write!(f, "home"),
            HouseMode::Away => write!(f, "away"),
            HouseMode::Night => write!(f, "night"),
        }
    }
}

impl FromStr for HouseMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "disarmed" => Ok(HouseMode::Disarmed),
            "home" => Ok(HouseMode::Home),
            "away" => Ok(HouseMode::Away),
            "night" => Ok(HouseMode::Night),
            other => Err(format!("unknown house mode: {other}")),
        }
    }
}

/// Location classification of a zone.
///
/// Door and window contacts belong to `Entry` zones. Classifying them as
/// `Indoor` zeroes their evidence in HOME mode together with interior motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationType {
    Outdoor,
    Entry,
    Indoor,
}

impl fmt::Display for LocationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationType::Outdoor => write!(f, "outdoor"),
            LocationType::Entry => write!(f, "entry"),
            LocationType::Indoor => write!(f, "indoor"),
        }
    }
}

/// Ordinal sensitivity of a zone.
///
/// Declaration order is the total order `Public < SemiPrivate < Private < Restricted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivacyLevel {
    Public,
    SemiPrivate,
    Private,
    Restricted,
}

impl PrivacyLevel {
    /// Whether dwell in this tier counts as private dwell.
    pub fn is_private(&self) -> bool {
        *self >= PrivacyLevel::Private
    }
}

impl Default for PrivacyLevel {
    fn default() -> Self {
        PrivacyLevel::Public
    }
}

impl fmt::Display for PrivacyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrivacyLevel::Public => write!(f, "public"),
            PrivacyLevel::SemiPrivate => write!(f, "semi_private"),
            PrivacyLevel::Private => write!(f, "private"),
            PrivacyLevel::Restricted => write!(f, "restricted"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privacy_total_order() {
        assert!(PrivacyLevel::Public < PrivacyLevel::SemiPrivate);
        assert!(PrivacyLevel::SemiPrivate < PrivacyLevel::Private);
        assert!(PrivacyLevel::Private < PrivacyLevel::Restricted);
        assert!(PrivacyLevel::Restricted.is_private());
        assert!(!PrivacyLevel::SemiPrivate.is_private());
    }

    #[test]
    fn test_mode_serde_names() {
        let json = serde_json::to_string(&HouseMode::Night).unwrap();
        assert_eq!(json, "\"night\"");
        assert!(!HouseMode::Disarmed.is_armed());
        assert!(HouseMode::Home.is_armed());
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("AWAY".parse::<HouseMode>(), Ok(HouseMode::Away));
        assert!("vacation".parse::<HouseMode>().is_err());
    }
}
