//! Track and segment records.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use vigil_types::{
    CircleId, LocationType, PrivacyLevel, SensorEvent, SensorId, SignalType, TrackId, Zone,
    ZoneId,
};

/// Best guess at what is moving through the track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Unknown,
    Package,
    Animal,
    Vehicle,
    Person,
}

impl ObjectType {
    fn rank(&self) -> u8 {
        match self {
            ObjectType::Unknown => 0,
            ObjectType::Package => 1,
            ObjectType::Animal => 2,
            ObjectType::Vehicle => 3,
            ObjectType::Person => 4,
        }
    }

    fn from_signal(signal: &SignalType) -> ObjectType {
        match signal {
            SignalType::Person => ObjectType::Person,
            SignalType::Vehicle => ObjectType::Vehicle,
            SignalType::Animal => ObjectType::Animal,
            SignalType::PackageDelivered | SignalType::PackageTaken => ObjectType::Package,
            _ => ObjectType::Unknown,
        }
    }
}

/// Continuous stay in one zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub zone_id: ZoneId,
    pub zone_type: LocationType,
    pub privacy: PrivacyLevel,
    pub enter_time: DateTime<Utc>,
    pub leave_time: DateTime<Utc>,
}

impl Segment {
    fn open(zone: &Zone, at: DateTime<Utc>) -> Self {
        Self {
            zone_id: zone.id.clone(),
            zone_type: zone.location,
            privacy: zone.privacy,
            enter_time: at,
            leave_time: at,
        }
    }

    pub fn duration_seconds(&self) -> f64 {
        (self.leave_time - self.enter_time).num_milliseconds().max(0) as f64 / 1000.0
    }
}

/// Why a track stopped accepting events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    IdleTimeout,
    Superseded,
}

/// One continuous physical incursion.
///
/// Segments are time-ordered and non-overlapping; `end_time` never moves
/// backwards. Once `is_closed` is set the track is terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub circle_id: CircleId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub object_type: ObjectType,
    pub segments: Vec<Segment>,
    pub max_privacy_level: PrivacyLevel,
    pub dwell_seconds_by_privacy_level: BTreeMap<PrivacyLevel, f64>,
    /// Recent events, pruned to the retention window behind `end_time`.
    pub events: Vec<SensorEvent>,
    /// Distinct sensors in first-seen order, kept across pruning.
    pub sensor_ids: Vec<SensorId>,
    pub is_closed: bool,
    pub close_reason: Option<CloseReason>,
}

impl Track {
    /// Open a track from its first event.
    pub fn start(event: &SensorEvent, zone: &Zone) -> Self {
        let mut track = Self {
            id: TrackId::generate(),
            circle_id: event.circle_id.clone(),
            start_time: event.occurred_at,
            end_time: event.occurred_at,
            object_type: ObjectType::from_signal(&event.signal_type),
            segments: vec![Segment::open(zone, event.occurred_at)],
            max_privacy_level: zone.privacy,
            dwell_seconds_by_privacy_level: BTreeMap::new(),
            events: vec![event.clone()],
            sensor_ids: vec![event.sensor_id.clone()],
            is_closed: false,
            close_reason: None,
        };
        track.recompute();
        track
    }

    /// Append an event, extending the last segment or opening a new one.
    ///
    /// Late events are pinned to the current end of the path so segments stay
    /// ordered.
    pub fn extend(&mut self, event: &SensorEvent, zone: &Zone) {
        let at = match self.segments.last() {
            Some(last) => event.occurred_at.max(last.leave_time),
            None => event.occurred_at,
        };

        match self.segments.last_mut() {
            Some(last) if last.zone_id == zone.id => {
                last.leave_time = at;
            }
            Some(last) => {
                last.leave_time = at;
                self.segments.push(Segment::open(zone, at));
            }
            None => self.segments.push(Segment::open(zone, at)),
        }

        self.end_time = self.end_time.max(event.occurred_at);
        let observed = ObjectType::from_signal(&event.signal_type);
        if observed.rank() > self.object_type.rank() {
            self.object_type = observed;
        }
        if !self.sensor_ids.contains(&event.sensor_id) {
            self.sensor_ids.push(event.sensor_id.clone());
        }
        self.events.push(event.clone());
        self.recompute();
    }

    /// Drop events older than `retention` before `end_time`.
    ///
    /// Returns how many were removed.
    pub fn prune_events(&mut self, retention: Duration) -> usize {
        let cutoff = self.end_time - retention;
        let before = self.events.len();
        self.events.retain(|e| e.occurred_at >= cutoff);
        before - self.events.len()
    }

    pub(crate) fn close(&mut self, reason: CloseReason) {
        self.is_closed = true;
        self.close_reason = Some(reason);
    }

    fn recompute(&mut self) {
        self.max_privacy_level = self
            .segments
            .iter()
            .map(|s| s.privacy)
            .max()
            .unwrap_or(self.max_privacy_level)
            .max(self.max_privacy_level);

        self.dwell_seconds_by_privacy_level.clear();
        for segment in &self.segments {
            *self
                .dwell_seconds_by_privacy_level
                .entry(segment.privacy)
                .or_insert(0.0) += segment.duration_seconds();
        }
    }

    /// Zone-type path with consecutive duplicates collapsed.
    pub fn path_summary(&self) -> Vec<LocationType> {
        let mut path: Vec<LocationType> = Vec::new();
        for segment in &self.segments {
            if path.last() != Some(&segment.zone_type) {
                path.push(segment.zone_type);
            }
        }
        path
    }

    /// Dwell spent in `Private` and `Restricted` zones.
    pub fn dwell_seconds_private(&self) -> f64 {
        self.dwell_seconds_by_privacy_level
            .iter()
            .filter(|(level, _)| level.is_private())
            .map(|(_, secs)| secs)
            .sum()
    }

    /// Distinct sensors in first-seen order.
    pub fn contributing_sensor_ids(&self) -> Vec<SensorId> {
        self.sensor_ids.clone()
    }

    /// Zone of the most recent segment.
    pub fn current_zone(&self) -> Option<&ZoneId> {
        self.segments.last().map(|s| &s.zone_id)
    }

    pub fn idle_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.end_time).num_seconds()
    }
}
