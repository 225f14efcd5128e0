//! Track manager: per-circle clustering of sensor events.
//!
//! Each circle owns one mutex around its open tracks so that the
//! search-then-extend-or-create sequence runs under a single writer. Circles
//! never share state and proceed in parallel.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, TryLockError};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::{debug, info, warn};
use vigil_types::{CircleId, SensorEvent, TrackId, Zone};

use crate::config::TrackerConfig;
use crate::error::{TrackerError, TrackerResult};
use crate::track::{CloseReason, Track};

/// Result of assigning one event.
#[derive(Debug, Clone)]
pub struct TrackAssignment {
    /// Snapshot of the owning track after the event was applied.
    pub track: Track,
    /// Whether the event opened a new track.
    pub created: bool,
    /// Tracks closed as a side effect of this assignment.
    pub closed: Vec<Track>,
}

/// Outcome of one idle sweep.
#[derive(Debug, Clone, Default)]
pub struct TrackSweep {
    pub closed: Vec<Track>,
    /// Circles skipped because an assignment held their lock.
    pub skipped_busy: usize,
}

#[derive(Debug, Default)]
struct CircleTracks {
    open: Vec<Track>,
    closed: VecDeque<Track>,
}

impl CircleTracks {
    fn retire(&mut self, mut track: Track, reason: CloseReason, history: usize) -> Track {
        track.close(reason);
        self.closed.push_back(track.clone());
        while self.closed.len() > history {
            self.closed.pop_front();
        }
        track
    }

    /// Close open tracks matching `predicate`, returning them.
    fn close_where<F>(&mut self, reason: CloseReason, history: usize, predicate: F) -> Vec<Track>
    where
        F: Fn(&Track) -> bool,
    {
        let (stale, live): (Vec<Track>, Vec<Track>) =
            std::mem::take(&mut self.open).into_iter().partition(|t| predicate(t));
        self.open = live;
        stale
            .into_iter()
            .map(|t| self.retire(t, reason, history))
            .collect()
    }
}

/// Clusters temporally-close events from the same circle into tracks.
pub struct TrackManager {
    config: TrackerConfig,
    circles: DashMap<CircleId, Arc<Mutex<CircleTracks>>>,
}

impl TrackManager {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            circles: DashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(TrackerConfig::default())
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    fn slot(&self, circle_id: &CircleId) -> Arc<Mutex<CircleTracks>> {
        self.circles
            .entry(circle_id.clone())
            .or_default()
            .value()
            .clone()
    }

    /// Attach an event to an open track within the gap window, or start one.
    ///
    /// Tracks idle past the idle timeout are closed first, so a closed track
    /// never absorbs a new event. When a new track is started, remaining open
    /// tracks of the circle are closed as superseded.
    pub fn assign(&self, event: &SensorEvent, zone: &Zone) -> TrackerResult<TrackAssignment> {
        if zone.circle_id != event.circle_id {
            return Err(TrackerError::ZoneCircleMismatch {
                zone: zone.id.clone(),
                circle: event.circle_id.clone(),
            });
        }

        let slot = self.slot(&event.circle_id);
        let mut tracks = slot
            .lock()
            .map_err(|_| TrackerError::LockPoisoned(event.circle_id.clone()))?;

        let now = event.occurred_at;
        let idle = Duration::seconds(self.config.idle_timeout_seconds as i64);
        let gap = Duration::seconds(self.config.track_gap_seconds as i64);
        let history = self.config.closed_history;
        let retention = Duration::seconds(self.config.event_retention_seconds as i64);

        let mut closed =
            tracks.close_where(CloseReason::IdleTimeout, history, |t| now - t.end_time > idle);

        let candidate = tracks
            .open
            .iter()
            .enumerate()
            .filter(|(_, t)| (now - t.end_time).num_milliseconds().abs() <= gap.num_milliseconds())
            .max_by_key(|(_, t)| t.end_time)
            .map(|(idx, _)| idx);

        let (track, created) = match candidate {
            Some(idx) => {
                let track = &mut tracks.open[idx];
                track.extend(event, zone);
                track.prune_events(retention);
                debug!(
                    track_id = %track.id,
                    zone_id = %zone.id,
                    segments = track.segments.len(),
                    "Extended track"
                );
                (track.clone(), false)
            }
            None => {
                closed.extend(tracks.close_where(CloseReason::Superseded, history, |_| true));
                let track = Track::start(event, zone);
                debug!(
                    track_id = %track.id,
                    circle_id = %event.circle_id,
                    zone_id = %zone.id,
                    "Started track"
                );
                tracks.open.push(track.clone());
                (track, true)
            }
        };

        Ok(TrackAssignment {
            track,
            created,
            closed,
        })
    }

    /// Close every track idle longer than the idle timeout.
    ///
    /// Circles whose lock is held by an in-flight assignment are skipped for
    /// this pass.
    pub fn sweep_idle(&self, now: DateTime<Utc>) -> TrackSweep {
        let idle = Duration::seconds(self.config.idle_timeout_seconds as i64);
        let history = self.config.closed_history;
        let slots: Vec<(CircleId, Arc<Mutex<CircleTracks>>)> = self
            .circles
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();

        let mut sweep = TrackSweep::default();
        for (circle_id, slot) in slots {
            let mut tracks = match slot.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::WouldBlock) => {
                    sweep.skipped_busy += 1;
                    continue;
                }
                Err(TryLockError::Poisoned(_)) => {
                    warn!(circle_id = %circle_id, "Skipping poisoned track slot");
                    sweep.skipped_busy += 1;
                    continue;
                }
            };
            let closed =
                tracks.close_where(CloseReason::IdleTimeout, history, |t| now - t.end_time > idle);
            for track in &closed {
                info!(
                    track_id = %track.id,
                    circle_id = %circle_id,
                    events = track.events.len(),
                    "Closed idle track"
                );
            }
            sweep.closed.extend(closed);
        }
        sweep
    }

    /// Open tracks for a circle.
    pub fn open_tracks(&self, circle_id: &CircleId) -> TrackerResult<Vec<Track>> {
        let Some(slot) = self.circles.get(circle_id).map(|r| r.value().clone()) else {
            return Ok(Vec::new());
        };
        let tracks = slot
            .lock()
            .map_err(|_| TrackerError::LockPoisoned(circle_id.clone()))?;
        Ok(tracks.open.clone())
    }

    /// Look up an open or recently closed track.
    pub fn find(&self, circle_id: &CircleId, track_id: &TrackId) -> TrackerResult<Option<Track>> {
        let Some(slot) = self.circles.get(circle_id).map(|r| r.value().clone()) else {
            return Ok(None);
        };
        let tracks = slot
            .lock()
            .map_err(|_| TrackerError::LockPoisoned(circle_id.clone()))?;
        Ok(tracks
            .open
            .iter()
            .chain(tracks.closed.iter())
            .find(|t| t.id == *track_id)
            .cloned())
    }
}

impl Default for TrackManager {
    fn default() -> Self {
        Self::with_defaults()
    }
}
