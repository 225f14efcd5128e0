//! Fusion engine: the ingest pipeline tying tracker, evidence, rules and
//! emitter together.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, instrument, warn};
use vigil_evidence::{
    EntryPointSnapshot, EvidenceAccumulator, EvidenceOutcome, EvidenceUpdate, PhaseTransition,
    UnattributedReason,
};
use vigil_rules::{
    LocatedEvent, NotificationPolicy, RuleContext, RuleDecision, RuleEvaluator,
    SuppressionReason,
};
use vigil_tracker::{CloseReason, Track, TrackManager};
use vigil_types::{
    CircleId, EntryPointId, EntryPointPhase, EventStatus, EvidenceEntry, Feedback, HouseMode,
    LocationType, SecurityEvent, SecurityEventId, SensorEvent, SiteTopology, TrackId, Zone,
    ZoneId,
};

use crate::config::VigilConfig;
use crate::emitter::{Emission, EmissionKind, EventDraft, SecurityEventEmitter};
use crate::error::{EngineError, EngineResult};
use crate::store::{EventStore, InMemoryEventStore, RetryPolicy};

/// Why a signal was recorded but not fused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    UnknownSensor,
    DisabledSensor,
    UnknownZone,
    DisabledZone,
    /// The zone belongs to a different circle than the signal.
    CircleMismatch,
}

/// What ingesting one signal produced.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub track_id: TrackId,
    pub track_created: bool,
    /// Set when the signal fed no entry point.
    pub unattributed: Option<UnattributedReason>,
    pub updates: Vec<EvidenceUpdate>,
    pub decision: RuleDecision,
    pub emission: Option<Emission>,
}

impl IngestReport {
    /// Highest phase among the entry points this signal fed.
    pub fn entry_phase(&self) -> EntryPointPhase {
        highest_phase(&self.updates)
    }
}

#[derive(Debug, Clone)]
pub enum IngestOutcome {
    Skipped(SkipReason),
    Processed(Box<IngestReport>),
}

impl IngestOutcome {
    pub fn report(&self) -> Option<&IngestReport> {
        match self {
            IngestOutcome::Processed(report) => Some(&**report),
            IngestOutcome::Skipped(_) => None,
        }
    }

    pub fn emission(&self) -> Option<&Emission> {
        self.report().and_then(|r| r.emission.as_ref())
    }
}

/// Events broadcast to subscribers.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    EventEmitted(SecurityEvent),
    EventUpgraded {
        kind: EmissionKind,
        event: SecurityEvent,
    },
    EventResolved(SecurityEvent),
    /// Forward entry point transition. `ledger` is filled when the
    /// transition reached `PreAlert` or `Alarm`.
    PhaseChanged {
        transition: PhaseTransition,
        ledger: Vec<EvidenceEntry>,
    },
    TrackClosed {
        circle_id: CircleId,
        track_id: TrackId,
        reason: Option<CloseReason>,
    },
    Suppressed {
        circle_id: CircleId,
        track_id: TrackId,
        reason: SuppressionReason,
    },
}

/// A security event with its stored evidence trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Explanation {
    pub event: SecurityEvent,
    pub evidence: Vec<EvidenceEntry>,
}

/// Outcome of one background sweep.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepReport {
    pub tracks_closed: usize,
    pub entry_points_cleared: usize,
    pub entry_points_evicted: usize,
    pub skipped_busy: usize,
}

/// Point-in-time engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub received: u64,
    pub skipped: u64,
    pub unattributed: u64,
    pub suppressed: u64,
    pub emitted: u64,
    pub upgraded: u64,
    pub resolved: u64,
    pub persist_failures: u64,
    pub ledger_entries_lost: u64,
}

#[derive(Debug, Default)]
struct Counters {
    received: AtomicU64,
    skipped: AtomicU64,
    unattributed: AtomicU64,
    suppressed: AtomicU64,
    emitted: AtomicU64,
    upgraded: AtomicU64,
    resolved: AtomicU64,
    persist_failures: AtomicU64,
    ledger_entries_lost: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> EngineStats {
        EngineStats {
            received: self.received.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            unattributed: self.unattributed.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            emitted: self.emitted.load(Ordering::Relaxed),
            upgraded: self.upgraded.load(Ordering::Relaxed),
            resolved: self.resolved.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
            ledger_entries_lost: self.ledger_entries_lost.load(Ordering::Relaxed),
        }
    }
}

/// The sensor-fusion engine.
///
/// `ingest` runs one signal through the pipeline:
///
/// 1. record the signal for audit and validate sensor and zone
/// 2. assign it to a track
/// 3. update every entry point it feeds
/// 4. classify the track with the rule table
/// 5. create or upgrade the track's security event and persist it
///
/// All per-entity locks are released before any store call. Emission,
/// persistence and resolution of one track's event are serialized by an
/// async per-track lock so store writes land in emission order.
pub struct FusionEngine {
    config: VigilConfig,
    topology: RwLock<Arc<SiteTopology>>,
    modes: DashMap<CircleId, HouseMode>,
    tracker: TrackManager,
    evidence: EvidenceAccumulator,
    rules: RuleEvaluator,
    emitter: SecurityEventEmitter,
    /// Serializes emit and persist per track
    track_locks: DashMap<TrackId, Arc<Mutex<()>>>,
    store: Arc<dyn EventStore>,
    retry: RetryPolicy,
    event_tx: broadcast::Sender<EngineEvent>,
    counters: Counters,
}

impl FusionEngine {
    pub fn new(
        config: VigilConfig,
        topology: SiteTopology,
        store: Arc<dyn EventStore>,
    ) -> EngineResult<Self> {
        let evidence = EvidenceAccumulator::new(config.evidence.clone())?;
        let policy = NotificationPolicy::new(config.notification.clone())?;
        let (event_tx, _) = broadcast::channel(config.emitter.broadcast_capacity.max(1));

        info!(
            zones = topology.zone_count(),
            sensors = topology.sensor_count(),
            model = evidence.model_name(),
            "Fusion engine initialized"
        );

        Ok(Self {
            tracker: TrackManager::new(config.tracker.clone()),
            evidence,
            rules: RuleEvaluator::new(),
            emitter: SecurityEventEmitter::new(policy, config.emitter.ledger_top_n),
            track_locks: DashMap::new(),
            retry: RetryPolicy::new(config.emitter.store_retries, config.emitter.retry_backoff()),
            topology: RwLock::new(Arc::new(topology)),
            modes: DashMap::new(),
            store,
            event_tx,
            counters: Counters::default(),
            config,
        })
    }

    /// Engine backed by an [`InMemoryEventStore`].
    pub fn in_memory(config: VigilConfig, topology: SiteTopology) -> EngineResult<Self> {
        Self::new(config, topology, Arc::new(InMemoryEventStore::new()))
    }

    pub fn config(&self) -> &VigilConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    pub fn stats(&self) -> EngineStats {
        self.counters.snapshot()
    }

    pub async fn topology(&self) -> Arc<SiteTopology> {
        self.topology.read().await.clone()
    }

    /// Swap in a new registry snapshot for subsequent signals.
    pub async fn set_topology(&self, topology: SiteTopology) {
        info!(
            zones = topology.zone_count(),
            sensors = topology.sensor_count(),
            "Topology replaced"
        );
        *self.topology.write().await = Arc::new(topology);
    }

    /// Reload the registry snapshot from a JSON file.
    pub async fn reload_topology(&self, path: impl AsRef<std::path::Path>) -> EngineResult<()> {
        let topology = SiteTopology::load(path)?;
        self.set_topology(topology).await;
        Ok(())
    }

    pub fn house_mode(&self, circle_id: &CircleId) -> HouseMode {
        self.modes
            .get(circle_id)
            .map(|m| *m)
            .unwrap_or_default()
    }

    pub fn set_house_mode(&self, circle_id: CircleId, mode: HouseMode) {
        info!(circle_id = %circle_id, mode = %mode, "House mode set");
        self.modes.insert(circle_id, mode);
    }

    /// Run one normalized sensor transition through the pipeline.
    ///
    /// Only a failed security event write is returned as an error; every
    /// other problem is absorbed into the outcome.
    #[instrument(skip(self, signal), fields(signal_id = %signal.id, sensor_id = %signal.sensor_id))]
    pub async fn ingest(&self, signal: SensorEvent) -> EngineResult<IngestOutcome> {
        Counters::bump(&self.counters.received);

        if let Err(e) = self.store.append_signal(signal.clone()).await {
            warn!(error = %e, "Failed to record signal for audit");
        }

        let topology = self.topology().await;
        let zone = match validate(&signal, &topology) {
            Ok(zone) => zone,
            Err(reason) => {
                debug!(reason = ?reason, "Signal skipped");
                Counters::bump(&self.counters.skipped);
                return Ok(IngestOutcome::Skipped(reason));
            }
        };
        let zone_id = zone.id.clone();
        let mode = self.house_mode(&signal.circle_id);

        let assignment = self.tracker.assign(&signal, zone)?;
        for closed in &assignment.closed {
            self.on_track_closed(closed);
        }
        let track = assignment.track;

        let (updates, unattributed) = match self.evidence.apply(&signal, &topology, mode)? {
            EvidenceOutcome::Updated(updates) => (updates, None),
            EvidenceOutcome::Unattributed(reason) => {
                Counters::bump(&self.counters.unattributed);
                (Vec::new(), Some(reason))
            }
        };
        for update in &updates {
            for transition in update.transitions.iter().filter(|t| t.is_forward()) {
                let ledger = if transition.is_escalation() {
                    update.alert_ledger.clone().unwrap_or_default()
                } else {
                    Vec::new()
                };
                self.broadcast(EngineEvent::PhaseChanged {
                    transition: transition.clone(),
                    ledger,
                });
            }
        }

        let context = RuleContext {
            mode,
            now: track.end_time,
            dwell_seconds_private: track.dwell_seconds_private(),
            entry_phase: highest_phase(&updates),
        };
        let located: Vec<LocatedEvent<'_>> = track
            .events
            .iter()
            .map(|e| LocatedEvent::new(e, location_of(e, &topology)))
            .collect();
        let decision = self.rules.evaluate(&located, &context);

        let emission = match &decision {
            RuleDecision::Suppressed(reason) => {
                debug!(track_id = %track.id, reason = ?reason, "Evaluation suppressed");
                Counters::bump(&self.counters.suppressed);
                self.broadcast(EngineEvent::Suppressed {
                    circle_id: track.circle_id.clone(),
                    track_id: track.id,
                    reason: *reason,
                });
                None
            }
            RuleDecision::Matched(rule) => {
                let primary = strongest(&updates);
                let ledger = match primary {
                    Some(update) => match &update.alert_ledger {
                        Some(ledger) => ledger.clone(),
                        None => self
                            .evidence
                            .ledger(&update.circle_id, &update.entry_point_id)?,
                    },
                    None => Vec::new(),
                };
                let lock = self.track_lock(track.id);
                let _serial = lock.lock().await;
                let emission = self.emitter.emit(EventDraft {
                    track: &track,
                    rule: rule.clone(),
                    mode,
                    zone_id: Some(zone_id.clone()),
                    entry_point_id: primary.map(|u| u.entry_point_id.clone()),
                    ml_score: self
                        .evidence
                        .confidence(primary.map(|u| u.score).unwrap_or(0.0)),
                    ledger: &ledger,
                    at: signal.occurred_at,
                });
                self.persist(&emission, &ledger, &updates).await?;
                Some(emission)
            }
        };

        Ok(IngestOutcome::Processed(Box::new(IngestReport {
            track_id: track.id,
            track_created: assignment.created,
            unattributed,
            updates,
            decision,
            emission,
        })))
    }

    /// Close a security event with external feedback.
    pub async fn resolve(
        &self,
        id: &SecurityEventId,
        feedback: Feedback,
    ) -> EngineResult<SecurityEvent> {
        self.resolve_at(id, feedback, Utc::now()).await
    }

    /// [`resolve`](Self::resolve) with an explicit timestamp.
    #[instrument(skip(self))]
    pub async fn resolve_at(
        &self,
        id: &SecurityEventId,
        feedback: Feedback,
        at: DateTime<Utc>,
    ) -> EngineResult<SecurityEvent> {
        let track_id = match self.emitter.track_of(id) {
            Some(track_id) => track_id,
            None => {
                self.store
                    .get_event(id)
                    .await?
                    .ok_or(EngineError::EventNotFound(*id))?
                    .primary_track_id
            }
        };
        let lock = self.track_lock(track_id);
        let serial = lock.lock().await;

        let event = match self.emitter.resolve(id, feedback, at) {
            Some(event) => event,
            None => {
                let mut stored = self
                    .store
                    .get_event(id)
                    .await?
                    .ok_or(EngineError::EventNotFound(*id))?;
                if !stored.status.is_open() {
                    debug!(event_id = %id, status = ?stored.status, "Security event already resolved");
                    return Err(EngineError::AlreadyResolved(*id));
                }
                stored.status = EventStatus::Resolved(feedback);
                stored.updated_at = at;
                stored
            }
        };

        self.retry
            .run("upsert_event", || self.store.upsert_event(event.clone()))
            .await
            .inspect_err(|_| Counters::bump(&self.counters.persist_failures))?;

        if let Some(entry_point_id) = &event.entry_point_id {
            self.evidence.resolve(&event.circle_id, entry_point_id, at)?;
        }

        drop(serial);
        drop(lock);
        self.release_track_lock(&track_id);

        info!(event_id = %event.id, feedback = ?feedback, "Security event resolved");
        Counters::bump(&self.counters.resolved);
        self.broadcast(EngineEvent::EventResolved(event.clone()));
        Ok(event)
    }

    /// A security event with its full stored evidence trail.
    pub async fn explain(&self, id: &SecurityEventId) -> EngineResult<Explanation> {
        let event = match self.emitter.get(id) {
            Some(event) => event,
            None => self
                .store
                .get_event(id)
                .await?
                .ok_or(EngineError::EventNotFound(*id))?,
        };
        let evidence = self.store.evidence_for(id).await?;
        Ok(Explanation { event, evidence })
    }

    pub fn entry_point(
        &self,
        circle_id: &CircleId,
        entry_point_id: &EntryPointId,
    ) -> EngineResult<Option<EntryPointSnapshot>> {
        Ok(self.evidence.snapshot(circle_id, entry_point_id)?)
    }

    /// Entry point score decayed to `now` under the circle's house mode.
    pub fn current_score(
        &self,
        circle_id: &CircleId,
        entry_point_id: &EntryPointId,
        now: DateTime<Utc>,
    ) -> EngineResult<f64> {
        let mode = self.house_mode(circle_id);
        Ok(self
            .evidence
            .current_score(circle_id, entry_point_id, now, mode)?)
    }

    /// Live ledger of an entry point, oldest first.
    pub fn entry_point_ledger(
        &self,
        circle_id: &CircleId,
        entry_point_id: &EntryPointId,
    ) -> EngineResult<Vec<EvidenceEntry>> {
        Ok(self.evidence.ledger(circle_id, entry_point_id)?)
    }

    pub fn open_tracks(&self, circle_id: &CircleId) -> EngineResult<Vec<Track>> {
        Ok(self.tracker.open_tracks(circle_id)?)
    }

    /// Close idle tracks and clear stale entry points.
    pub fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let tracks = self.tracker.sweep_idle(now);
        for closed in &tracks.closed {
            self.on_track_closed(closed);
        }
        let evidence = self.evidence.sweep(now, |circle_id| self.house_mode(circle_id));

        let report = SweepReport {
            tracks_closed: tracks.closed.len(),
            entry_points_cleared: evidence.cleared.len(),
            entry_points_evicted: evidence.evicted,
            skipped_busy: tracks.skipped_busy + evidence.skipped_busy,
        };
        debug!(
            tracks_closed = report.tracks_closed,
            entry_points_cleared = report.entry_points_cleared,
            entry_points_evicted = report.entry_points_evicted,
            skipped_busy = report.skipped_busy,
            "Sweep complete"
        );
        report
    }

    /// Run [`sweep`](Self::sweep) periodically until `shutdown` flips to
    /// `true` or its sender is dropped.
    pub fn spawn_sweeper(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let period = Duration::from_secs(self.config.sweeper.interval_seconds.max(1));
        tokio::spawn(async move {
            let mut ticker = interval(period);
            info!(interval_secs = period.as_secs(), "Sweeper started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep(Utc::now());
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                if *shutdown.borrow() {
                    break;
                }
            }

            info!("Sweeper stopped");
        })
    }

    async fn persist(
        &self,
        emission: &Emission,
        ledger: &[EvidenceEntry],
        updates: &[EvidenceUpdate],
    ) -> EngineResult<()> {
        let event = &emission.event;
        self.retry
            .run("upsert_event", || self.store.upsert_event(event.clone()))
            .await
            .inspect_err(|e| {
                warn!(event_id = %event.id, error = %e, "Security event write failed");
                Counters::bump(&self.counters.persist_failures);
            })?;

        let entries: Vec<EvidenceEntry> = if emission.kind == EmissionKind::Created {
            ledger.to_vec()
        } else {
            updates
                .iter()
                .filter(|u| Some(&u.entry_point_id) == event.entry_point_id.as_ref())
                .map(|u| u.entry.clone())
                .collect()
        };
        if !entries.is_empty() {
            let count = entries.len() as u64;
            let appended = self
                .retry
                .run("append_evidence", || {
                    self.store.append_evidence(&event.id, entries.clone())
                })
                .await;
            if let Err(e) = appended {
                warn!(event_id = %event.id, lost = count, error = %e, "Evidence entries lost");
                self.counters
                    .ledger_entries_lost
                    .fetch_add(count, Ordering::Relaxed);
            }
        }

        match emission.kind {
            EmissionKind::Created => {
                Counters::bump(&self.counters.emitted);
                self.broadcast(EngineEvent::EventEmitted(event.clone()));
            }
            EmissionKind::TypeUpgraded | EmissionKind::SeverityRaised => {
                Counters::bump(&self.counters.upgraded);
                self.broadcast(EngineEvent::EventUpgraded {
                    kind: emission.kind,
                    event: event.clone(),
                });
            }
            EmissionKind::Refreshed => {}
        }
        Ok(())
    }

    fn track_lock(&self, track_id: TrackId) -> Arc<Mutex<()>> {
        self.track_locks.entry(track_id).or_default().clone()
    }

    /// Drop a track's lock unless a task still holds or awaits it.
    fn release_track_lock(&self, track_id: &TrackId) {
        self.track_locks
            .remove_if(track_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    fn on_track_closed(&self, track: &Track) {
        if let Some(event_id) = self.emitter.release_track(&track.id) {
            debug!(track_id = %track.id, event_id = %event_id, "Released event of closed track");
        }
        self.release_track_lock(&track.id);
        self.broadcast(EngineEvent::TrackClosed {
            circle_id: track.circle_id.clone(),
            track_id: track.id,
            reason: track.close_reason,
        });
    }

    fn broadcast(&self, event: EngineEvent) {
        let _ = self.event_tx.send(event);
    }
}

fn validate<'a>(
    signal: &SensorEvent,
    topology: &'a SiteTopology,
) -> Result<&'a Zone, SkipReason> {
    let sensor = topology
        .sensor(&signal.sensor_id)
        .ok_or(SkipReason::UnknownSensor)?;
    if !sensor.enabled {
        return Err(SkipReason::DisabledSensor);
    }
    let zone_id: &ZoneId = signal.zone_id.as_ref().unwrap_or(&sensor.zone_id);
    let zone = topology.zone(zone_id).ok_or(SkipReason::UnknownZone)?;
    if !zone.enabled {
        return Err(SkipReason::DisabledZone);
    }
    if zone.circle_id != signal.circle_id {
        return Err(SkipReason::CircleMismatch);
    }
    Ok(zone)
}

fn location_of(event: &SensorEvent, topology: &SiteTopology) -> Option<LocationType> {
    let zone_id = match &event.zone_id {
        Some(id) => id,
        None => &topology.sensor(&event.sensor_id)?.zone_id,
    };
    topology.zone(zone_id).map(|z| z.location)
}

fn highest_phase(updates: &[EvidenceUpdate]) -> EntryPointPhase {
    updates
        .iter()
        .map(|u| u.phase)
        .max_by_key(EntryPointPhase::rank)
        .unwrap_or_default()
}

fn strongest(updates: &[EvidenceUpdate]) -> Option<&EvidenceUpdate> {
    updates
        .iter()
        .max_by(|a, b| a.score.total_cmp(&b.score))
}
