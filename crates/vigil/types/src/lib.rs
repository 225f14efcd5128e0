//! # vigil-types
//!
//! Shared vocabulary for the Vigil sensor-fusion engine.
//!
//! - identifiers for registry entities and engine-created records
//! - house mode, zone location and privacy classification
//! - the normalized inbound [`SensorEvent`]
//! - the outbound [`SecurityEvent`] with its [`EvidenceEntry`] ledger
//! - the read-only [`SiteTopology`] registry snapshot

#![deny(unsafe_code)]

pub mod error;
pub mod event;
pub mod evidence;
pub mod ids;
pub mod mode;
pub mod phase;
pub mod sensor;
pub mod topology;

pub use error::{TopologyError, TopologyResult};
pub use event::{
    EventStatus, EventType, Feedback, NotificationLevel, SecurityEvent, Severity,
};
pub use evidence::EvidenceEntry;
pub use ids::{
    ChainId, CircleId, EntryPointId, SecurityEventId, SensorEventId, SensorId, TrackId, ZoneId,
};
pub use mode::{HouseMode, LocationType, PrivacyLevel};
pub use phase::EntryPointPhase;
pub use sensor::{SensorEvent, SensorHealth, SensorType, SignalType};
pub use topology::{Chain, EntryPoint, Sensor, SiteTopology, TopologyDocument, Zone};
