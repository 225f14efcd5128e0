//! Strongly-typed identifiers for Vigil entities.
//!
//! Registry-owned entities (circles, zones, sensors, entry points, chains)
//! carry the string identifiers assigned by the integration layer. Entities
//! created by the engine itself (sensor events, tracks, security events) are
//! UUID-based.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }
    };
}

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }
    };
}

string_id!(
    /// A household (circle) sharing one security posture.
    CircleId,
    "circle"
);
string_id!(
    /// A physical zone inside a circle.
    ZoneId,
    "zone"
);
string_id!(
    /// A sensor device.
    SensorId,
    "sensor"
);
string_id!(
    /// A logical ingress aggregating one or more zones.
    EntryPointId,
    "entry"
);
string_id!(
    /// An ordered entry-point chain definition.
    ChainId,
    "chain"
);

uuid_id!(
    /// A single ingested sensor transition.
    SensorEventId,
    "signal"
);
uuid_id!(
    /// A clustered physical incursion.
    TrackId,
    "track"
);
uuid_id!(
    /// An externally visible security event.
    SecurityEventId,
    "event"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_ids_are_unique() {
        assert_ne!(TrackId::generate(), TrackId::generate());
        assert_ne!(SecurityEventId::generate(), SecurityEventId::generate());
    }

    #[test]
    fn test_display_prefixes() {
        assert_eq!(CircleId::new("home-1").to_string(), "circle:home-1");
        assert_eq!(EntryPointId::new("front").to_string(), "entry:front");
        assert!(TrackId::generate().to_string().starts_with("track:"));
    }

    #[test]
    fn test_string_ids_serialize_transparently() {
        let json = serde_json::to_string(&ZoneId::new("porch")).unwrap();
        assert_eq!(json, "\"porch\"");
        let back: ZoneId = serde_json::from_str(&json).unwrap();
        assert_eq!(back.as_str(), "porch");
    }
}
