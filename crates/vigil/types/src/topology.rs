//! Static zone/sensor registry snapshot.
//!
//! The registry itself lives outside the engine. Vigil consumes a read-only
//! [`SiteTopology`] built from a [`TopologyDocument`], which is validated for
//! dangling references on construction.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{TopologyError, TopologyResult};
use crate::ids::{ChainId, CircleId, EntryPointId, SensorId, ZoneId};
use crate::mode::{LocationType, PrivacyLevel};
use crate::sensor::{SensorHealth, SensorType};

/// A physical zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: ZoneId,
    pub circle_id: CircleId,
    #[serde(default)]
    pub name: String,
    pub location: LocationType,
    #[serde(default)]
    pub privacy: PrivacyLevel,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// A registered sensor device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sensor {
    pub id: SensorId,
    pub zone_id: ZoneId,
    pub sensor_type: SensorType,
    /// Long-run reliability multiplier in [0, 1].
    #[serde(default = "default_reliability")]
    pub reliability: f64,
    #[serde(default)]
    pub health: SensorHealth,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// A logical ingress aggregating zones for evidence accumulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryPoint {
    pub id: EntryPointId,
    pub circle_id: CircleId,
    #[serde(default)]
    pub name: String,
    pub zones: Vec<ZoneId>,
}

/// Ordered sequence of expected sensor firings for an entry point.
///
/// Used only for bonus weighting, never as a gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chain {
    pub id: ChainId,
    pub entry_point_id: EntryPointId,
    pub sensors: Vec<SensorId>,
    #[serde(default = "default_chain_window")]
    pub window_seconds: u64,
    /// Overrides the configured default bonus when present.
    #[serde(default)]
    pub bonus: Option<f64>,
}

impl Chain {
    /// Position of a sensor in this chain.
    pub fn position(&self, sensor_id: &SensorId) -> Option<usize> {
        self.sensors.iter().position(|s| s == sensor_id)
    }
}

fn default_true() -> bool {
    true
}

fn default_reliability() -> f64 {
    1.0
}

fn default_chain_window() -> u64 {
    120
}

/// Serialized form of a topology.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopologyDocument {
    #[serde(default)]
    pub zones: Vec<Zone>,
    #[serde(default)]
    pub sensors: Vec<Sensor>,
    #[serde(default)]
    pub entry_points: Vec<EntryPoint>,
    #[serde(default)]
    pub chains: Vec<Chain>,
}

/// Indexed, validated topology.
#[derive(Debug, Clone, Default)]
pub struct SiteTopology {
    zones: HashMap<ZoneId, Zone>,
    sensors: HashMap<SensorId, Sensor>,
    entry_points: HashMap<EntryPointId, EntryPoint>,
    zone_entry_points: HashMap<ZoneId, Vec<EntryPointId>>,
    chains: HashMap<EntryPointId, Vec<Chain>>,
}

impl SiteTopology {
    /// Build and validate a topology.
    pub fn from_document(doc: TopologyDocument) -> TopologyResult<Self> {
        let mut topology = SiteTopology::default();

        for zone in doc.zones {
            if topology.zones.contains_key(&zone.id) {
                return Err(TopologyError::Duplicate(zone.id.to_string()));
            }
            topology.zones.insert(zone.id.clone(), zone);
        }

        for sensor in doc.sensors {
            if !topology.zones.contains_key(&sensor.zone_id) {
                return Err(TopologyError::UnknownReference {
                    owner: sensor.id.to_string(),
                    target: sensor.zone_id.to_string(),
                });
            }
            if !(0.0..=1.0).contains(&sensor.reliability) {
                return Err(TopologyError::InvalidValue {
                    field: format!("{}.reliability", sensor.id),
                    value: sensor.reliability,
                });
            }
            topology.sensors.insert(sensor.id.clone(), sensor);
        }

        for entry_point in doc.entry_points {
            for zone_id in &entry_point.zones {
                if !topology.zones.contains_key(zone_id) {
                    return Err(TopologyError::UnknownReference {
                        owner: entry_point.id.to_string(),
                        target: zone_id.to_string(),
                    });
                }
                topology
                    .zone_entry_points
                    .entry(zone_id.clone())
                    .or_default()
                    .push(entry_point.id.clone());
            }
            topology
                .entry_points
                .insert(entry_point.id.clone(), entry_point);
        }

        for chain in doc.chains {
            if !topology.entry_points.contains_key(&chain.entry_point_id) {
                return Err(TopologyError::UnknownReference {
                    owner: chain.id.to_string(),
                    target: chain.entry_point_id.to_string(),
                });
            }
            if let Some(missing) = chain
                .sensors
                .iter()
                .find(|s| !topology.sensors.contains_key(*s))
            {
                return Err(TopologyError::UnknownReference {
                    owner: chain.id.to_string(),
                    target: missing.to_string(),
                });
            }
            topology
                .chains
                .entry(chain.entry_point_id.clone())
                .or_default()
                .push(chain);
        }

        Ok(topology)
    }

    /// Parse a JSON topology document.
    pub fn from_json(json: &str) -> TopologyResult<Self> {
        let doc: TopologyDocument = serde_json::from_str(json)?;
        Self::from_document(doc)
    }

    /// Load a JSON topology document from disk.
    pub fn load(path: impl AsRef<Path>) -> TopologyResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn zone(&self, id: &ZoneId) -> Option<&Zone> {
        self.zones.get(id)
    }

    pub fn sensor(&self, id: &SensorId) -> Option<&Sensor> {
        self.sensors.get(id)
    }

    pub fn entry_point(&self, id: &EntryPointId) -> Option<&EntryPoint> {
        self.entry_points.get(id)
    }

    /// Entry points a zone belongs to, in declaration order.
    pub fn entry_points_for_zone(&self, zone_id: &ZoneId) -> &[EntryPointId] {
        self.zone_entry_points
            .get(zone_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Chains configured for an entry point.
    pub fn chains_for(&self, entry_point_id: &EntryPointId) -> &[Chain] {
        self.chains
            .get(entry_point_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn zone_count(&self) -> usize {
        self.zones.len()
    }

    pub fn sensor_count(&self) -> usize {
        self.sensors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SITE: &str = r#"{
        "zones": [
            {"id": "porch", "circle_id": "home", "location": "outdoor", "privacy": "semi_private"},
            {"id": "front-door", "circle_id": "home", "location": "entry", "privacy": "private"},
            {"id": "hall", "circle_id": "home", "location": "indoor", "privacy": "private"}
        ],
        "sensors": [
            {"id": "porch-cam", "zone_id": "porch", "sensor_type": "camera"},
            {"id": "door-contact", "zone_id": "front-door", "sensor_type": "contact"},
            {"id": "hall-pir", "zone_id": "hall", "sensor_type": "motion", "reliability": 0.9}
        ],
        "entry_points": [
            {"id": "front", "circle_id": "home", "zones": ["porch", "front-door", "hall"]}
        ],
        "chains": [
            {"id": "front-chain", "entry_point_id": "front",
             "sensors": ["porch-cam", "door-contact", "hall-pir"]}
        ]
    }"#;

    #[test]
    fn test_parse_and_index() {
        let topology = SiteTopology::from_json(SITE).unwrap();
        assert_eq!(topology.zone_count(), 3);
        assert_eq!(topology.sensor_count(), 3);
        assert_eq!(
            topology.entry_points_for_zone(&ZoneId::new("hall")),
            &[EntryPointId::new("front")]
        );
        let chain = &topology.chains_for(&EntryPointId::new("front"))[0];
        assert_eq!(chain.window_seconds, 120);
        assert_eq!(chain.position(&SensorId::new("hall-pir")), Some(2));
        assert!(topology.sensor(&SensorId::new("hall-pir")).unwrap().enabled);
    }

    #[test]
    fn test_rejects_dangling_sensor_zone() {
        let doc = TopologyDocument {
            sensors: vec![Sensor {
                id: SensorId::new("orphan"),
                zone_id: ZoneId::new("nowhere"),
                sensor_type: SensorType::Motion,
                reliability: 1.0,
                health: SensorHealth::Healthy,
                enabled: true,
            }],
            ..TopologyDocument::default()
        };
        assert!(matches!(
            SiteTopology::from_document(doc),
            Err(TopologyError::UnknownReference { .. })
        ));
    }

    #[test]
    fn test_unknown_zone_has_no_entry_points() {
        let topology = SiteTopology::from_json(SITE).unwrap();
        assert!(topology
            .entry_points_for_zone(&ZoneId::new("garage"))
            .is_empty());
    }
}
