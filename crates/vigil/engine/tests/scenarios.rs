//! End-to-end scenarios through the fusion engine.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::broadcast;
use vigil_engine::{
    EmissionKind, EngineError, EngineEvent, EventStore, FusionEngine, InMemoryEventStore,
    IngestOutcome, StoreError, StoreResult, VigilConfig,
};
use vigil_rules::{RuleDecision, SuppressionReason};
use vigil_types::{
    CircleId, EntryPointId, EntryPointPhase, EventStatus, EventType, EvidenceEntry, Feedback,
    HouseMode, NotificationLevel, SecurityEvent, SecurityEventId, SensorEvent, SensorId,
    SensorType, Severity, SiteTopology,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Porch camera and PIR outside, a door contact at the entry, hall motion
/// and glass-break inside, a smoke detector in the kitchen. The front entry
/// point spans porch, door and hall with a porch → door → hall chain.
fn site(door_location: &str) -> SiteTopology {
    let json = format!(
        r#"{{
        "zones": [
            {{"id": "porch", "circle_id": "home", "location": "outdoor"}},
            {{"id": "front-door", "circle_id": "home", "location": "{door_location}", "privacy": "semi_private"}},
            {{"id": "hall", "circle_id": "home", "location": "indoor", "privacy": "private"}},
            {{"id": "kitchen", "circle_id": "home", "location": "indoor", "privacy": "private"}}
        ],
        "sensors": [
            {{"id": "porch-cam", "zone_id": "porch", "sensor_type": "camera"}},
            {{"id": "porch-pir", "zone_id": "porch", "sensor_type": "outdoor_motion"}},
            {{"id": "door-contact", "zone_id": "front-door", "sensor_type": "contact"}},
            {{"id": "hall-pir", "zone_id": "hall", "sensor_type": "motion"}},
            {{"id": "hall-glass", "zone_id": "hall", "sensor_type": "glass_break"}},
            {{"id": "smoke", "zone_id": "kitchen", "sensor_type": "smoke"}}
        ],
        "entry_points": [
            {{"id": "front", "circle_id": "home", "zones": ["porch", "front-door", "hall"]}}
        ],
        "chains": [
            {{"id": "front-path", "entry_point_id": "front",
              "sensors": ["porch-cam", "door-contact", "hall-pir"], "window_seconds": 120}}
        ]
    }}"#
    );
    SiteTopology::from_json(&json).unwrap()
}

fn engine_in(mode: HouseMode) -> FusionEngine {
    engine_with_store(mode, Arc::new(InMemoryEventStore::new()))
}

fn engine_with_store(mode: HouseMode, store: Arc<dyn EventStore>) -> FusionEngine {
    let mut config = VigilConfig::default();
    config.emitter.retry_backoff_ms = 1;
    let engine = FusionEngine::new(config, site("entry"), store).unwrap();
    engine.set_house_mode(home(), mode);
    engine
}

fn home() -> CircleId {
    CircleId::new("home")
}

fn front() -> EntryPointId {
    EntryPointId::new("front")
}

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_767_225_600 + secs, 0).single().unwrap()
}

fn signal(sensor: &str, sensor_type: SensorType, signal: &str, secs: i64) -> SensorEvent {
    SensorEvent::new(
        home(),
        SensorId::new(sensor),
        None,
        sensor_type,
        signal.into(),
        at(secs),
    )
}

fn person_at_porch(secs: i64) -> SensorEvent {
    signal("porch-cam", SensorType::Camera, "person", secs)
}

fn door_open(secs: i64) -> SensorEvent {
    signal("door-contact", SensorType::Contact, "open", secs)
}

fn hall_motion(secs: i64) -> SensorEvent {
    signal("hall-pir", SensorType::Motion, "motion", secs)
}

fn phase_of(engine: &FusionEngine) -> EntryPointPhase {
    engine
        .entry_point(&home(), &front())
        .unwrap()
        .map(|s| s.phase)
        .unwrap_or_default()
}

fn drain(rx: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Replays a ledger from zero and returns the final score.
fn replay(ledger: &[EvidenceEntry]) -> f64 {
    ledger.iter().fold(0.0, |score, entry| {
        (score * entry.decay_factor + entry.contribution).max(0.0)
    })
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn glass_break_alarms_in_one_update_when_away() {
    let engine = engine_in(HouseMode::Away);
    let outcome = engine
        .ingest(signal("hall-glass", SensorType::GlassBreak, "glass_break", 0))
        .await
        .unwrap();

    let report = outcome.report().unwrap();
    let update = &report.updates[0];
    assert_eq!(update.phase, EntryPointPhase::Alarm);
    let phases: Vec<_> = update.transitions.iter().map(|t| t.to).collect();
    assert_eq!(phases, vec![EntryPointPhase::PreAlert, EntryPointPhase::Alarm]);
    assert!((update.score - 3.75).abs() < 1e-9);

    let event = &outcome.emission().unwrap().event;
    assert_eq!(event.event_type, EventType::PerimeterDamage);
    assert_eq!(event.severity, Severity::Critical);
    assert_eq!(event.notification_level, NotificationLevel::High);
    assert_eq!(event.entry_point_id, Some(front()));
}

#[tokio::test]
async fn weak_outdoor_motion_watches_then_decays() {
    let engine = engine_in(HouseMode::Away);
    let pir = signal("porch-pir", SensorType::OutdoorMotion, "motion", 0).with_confidence(0.7);
    let outcome = engine.ingest(pir).await.unwrap();

    let update = &outcome.report().unwrap().updates[0];
    assert!((update.score - 0.6 * 0.7 * 0.8).abs() < 1e-9);
    assert_eq!(update.phase, EntryPointPhase::Watch);
    assert!(update.transitions.iter().all(|t| !t.to.is_alerting()));

    let later = engine.current_score(&home(), &front(), at(120)).unwrap();
    let clear = engine.config().evidence.profile(HouseMode::Away).thresholds.clear;
    assert!(later < clear);
    assert_eq!(phase_of(&engine), EntryPointPhase::Watch);
}

#[tokio::test]
async fn entry_classified_door_prealerts_at_home() {
    let engine = engine_in(HouseMode::Home);
    engine.ingest(door_open(0)).await.unwrap();
    engine.ingest(hall_motion(10)).await.unwrap();
    assert!(phase_of(&engine).is_alerting());
}

#[tokio::test]
async fn indoor_classified_door_never_alarms_at_home() {
    let engine = FusionEngine::in_memory(VigilConfig::default(), site("indoor")).unwrap();
    engine.set_house_mode(home(), HouseMode::Home);

    for step in 0..5 {
        engine.ingest(door_open(step * 10)).await.unwrap();
        engine.ingest(hall_motion(step * 10 + 5)).await.unwrap();
    }
    let phase = phase_of(&engine);
    assert_ne!(phase, EntryPointPhase::Alarm);
    assert!(!phase.is_alerting());
}

#[tokio::test]
async fn chain_order_scores_higher_than_reverse() {
    let in_order = engine_in(HouseMode::Away);
    for event in [person_at_porch(0), door_open(0), hall_motion(0)] {
        in_order.ingest(event).await.unwrap();
    }

    let reversed = engine_in(HouseMode::Away);
    for event in [hall_motion(0), door_open(0), person_at_porch(0)] {
        reversed.ingest(event).await.unwrap();
    }

    let ordered = in_order.current_score(&home(), &front(), at(0)).unwrap();
    let unordered = reversed.current_score(&home(), &front(), at(0)).unwrap();
    assert!(ordered > unordered, "{ordered} <= {unordered}");

    let bonuses: Vec<f64> = in_order
        .entry_point_ledger(&home(), &front())
        .unwrap()
        .iter()
        .map(|e| e.chain_bonus)
        .collect();
    assert_eq!(bonuses, vec![1.0, 1.3, 1.3]);
}

#[tokio::test]
async fn alert_transition_ledger_replays_to_score() {
    let engine = engine_in(HouseMode::Away);
    let mut rx = engine.subscribe();
    engine.ingest(person_at_porch(0)).await.unwrap();
    engine.ingest(door_open(10)).await.unwrap();

    let alerts: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            EngineEvent::PhaseChanged { transition, ledger } if transition.to.is_alerting() => {
                Some((transition, ledger))
            }
            _ => None,
        })
        .collect();
    assert_eq!(alerts.len(), 2);
    for (transition, ledger) in alerts {
        assert!(!ledger.is_empty());
        assert!((replay(&ledger) - transition.score).abs() < 1e-9);
    }
}

#[tokio::test]
async fn smoke_is_never_suppressed() {
    let engine = engine_in(HouseMode::Disarmed);
    let outcome = engine
        .ingest(signal("smoke", SensorType::Smoke, "smoke", 0))
        .await
        .unwrap();
    let event = &outcome.emission().unwrap().event;
    assert_eq!(event.event_type, EventType::Fire);
    assert_eq!(event.severity, Severity::Critical);
    assert_eq!(event.notification_level, NotificationLevel::High);

    let motion = engine.ingest(hall_motion(500)).await.unwrap();
    assert_eq!(
        motion.report().unwrap().decision,
        RuleDecision::Suppressed(SuppressionReason::Disarmed)
    );
}

#[tokio::test]
async fn event_is_upgraded_in_place() {
    let engine = engine_in(HouseMode::Away);
    let first = engine.ingest(person_at_porch(0)).await.unwrap();
    let created = first.emission().unwrap().clone();
    assert_eq!(created.kind, EmissionKind::Created);
    assert_eq!(created.event.event_type, EventType::SuspiciousPerson);

    let second = engine.ingest(door_open(10)).await.unwrap();
    let upgraded = second.emission().unwrap();
    assert_eq!(second.report().unwrap().entry_phase(), EntryPointPhase::Alarm);
    assert_eq!(upgraded.kind, EmissionKind::TypeUpgraded);
    assert_eq!(upgraded.event.id, created.event.id);
    assert_eq!(upgraded.event.event_type, EventType::BreakIn);
    assert_eq!(upgraded.event.fusion_rule_id, "evidence.alarm");

    let third = engine.ingest(hall_motion(20)).await.unwrap();
    let refreshed = &third.emission().unwrap().event;
    assert_eq!(refreshed.id, created.event.id);
    assert_eq!(refreshed.event_type, EventType::BreakIn);
    assert_eq!(refreshed.path_label(), "outdoor→entry→indoor");

    let explained = engine.explain(&created.event.id).await.unwrap();
    assert_eq!(explained.evidence.len(), 3);
    assert!(explained.event.evidence_ledger.len() <= 5);
}

#[tokio::test]
async fn resolved_event_is_not_reopened() {
    let engine = engine_in(HouseMode::Away);
    let first = engine.ingest(person_at_porch(0)).await.unwrap();
    let first_id = first.emission().unwrap().event.id;

    let resolved = engine
        .resolve_at(&first_id, Feedback::FalsePositive, at(5))
        .await
        .unwrap();
    assert_eq!(resolved.status, EventStatus::Resolved(Feedback::FalsePositive));
    assert_eq!(phase_of(&engine), EntryPointPhase::Resolved);

    let second = engine.ingest(person_at_porch(10)).await.unwrap();
    let report = second.report().unwrap();
    assert!(!report.track_created);
    let emission = second.emission().unwrap();
    assert_eq!(emission.kind, EmissionKind::Created);
    assert_ne!(emission.event.id, first_id);

    let stored = engine.store().get_event(&first_id).await.unwrap().unwrap();
    assert!(!stored.status.is_open());
    assert_eq!(engine.stats().resolved, 1);
}

#[tokio::test]
async fn second_resolve_leaves_live_evidence_alone() {
    let engine = engine_in(HouseMode::Away);
    let first = engine.ingest(person_at_porch(0)).await.unwrap();
    let first_id = first.emission().unwrap().event.id;
    engine
        .resolve_at(&first_id, Feedback::FalsePositive, at(5))
        .await
        .unwrap();

    engine.ingest(door_open(10)).await.unwrap();
    let live = engine.entry_point(&home(), &front()).unwrap().unwrap();
    assert!(live.score > 0.0);

    let err = engine
        .resolve_at(&first_id, Feedback::TruePositive, at(15))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AlreadyResolved(id) if id == first_id));

    let stored = engine.store().get_event(&first_id).await.unwrap().unwrap();
    assert_eq!(stored.status, EventStatus::Resolved(Feedback::FalsePositive));
    let after = engine.entry_point(&home(), &front()).unwrap().unwrap();
    assert_eq!(after.phase, live.phase);
    assert_eq!(after.score, live.score);
    assert_eq!(after.ledger_len, live.ledger_len);
    assert_eq!(engine.stats().resolved, 1);
}

#[tokio::test]
async fn unknown_sensor_is_recorded_but_skipped() {
    let store = Arc::new(InMemoryEventStore::new());
    let engine = engine_with_store(HouseMode::Away, store.clone());
    let outcome = engine
        .ingest(signal("attic-pir", SensorType::Motion, "motion", 0))
        .await
        .unwrap();
    assert!(matches!(outcome, IngestOutcome::Skipped(_)));
    assert_eq!(store.signal_count().await, 1);
    assert!(engine.open_tracks(&home()).unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Store failures
// ---------------------------------------------------------------------------

/// Store whose event writes always fail.
#[derive(Default)]
struct UnavailableStore {
    upserts: AtomicU32,
    inner: InMemoryEventStore,
}

#[async_trait]
impl EventStore for UnavailableStore {
    async fn upsert_event(&self, _event: SecurityEvent) -> StoreResult<()> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn get_event(&self, id: &SecurityEventId) -> StoreResult<Option<SecurityEvent>> {
        self.inner.get_event(id).await
    }

    async fn list_events(&self, circle_id: &CircleId) -> StoreResult<Vec<SecurityEvent>> {
        self.inner.list_events(circle_id).await
    }

    async fn append_evidence(
        &self,
        id: &SecurityEventId,
        entries: Vec<EvidenceEntry>,
    ) -> StoreResult<()> {
        self.inner.append_evidence(id, entries).await
    }

    async fn evidence_for(&self, id: &SecurityEventId) -> StoreResult<Vec<EvidenceEntry>> {
        self.inner.evidence_for(id).await
    }

    async fn append_signal(&self, signal: SensorEvent) -> StoreResult<()> {
        self.inner.append_signal(signal).await
    }
}

#[tokio::test]
async fn failed_event_write_is_retryable() {
    let store = Arc::new(UnavailableStore::default());
    let engine = engine_with_store(HouseMode::Away, store.clone());

    let err = engine.ingest(person_at_porch(0)).await.unwrap_err();
    assert!(matches!(err, EngineError::Persistence { retryable: true, .. }));
    assert!(err.is_retryable());
    assert_eq!(store.upserts.load(Ordering::SeqCst), 4);
    assert_eq!(engine.stats().persist_failures, 1);

    // Evidence computed before the failure is kept.
    let ledger = engine.entry_point_ledger(&home(), &front()).unwrap();
    assert_eq!(ledger.len(), 1);
    assert!(engine
        .current_score(&home(), &front(), at(0) + Duration::seconds(1))
        .unwrap()
        > 0.0);
}

/// Store whose first event write stalls.
#[derive(Default)]
struct SlowFirstWriteStore {
    upserts: AtomicU32,
    inner: InMemoryEventStore,
}

#[async_trait]
impl EventStore for SlowFirstWriteStore {
    async fn upsert_event(&self, event: SecurityEvent) -> StoreResult<()> {
        if self.upserts.fetch_add(1, Ordering::SeqCst) == 0 {
            tokio::time::sleep(StdDuration::from_millis(50)).await;
        }
        self.inner.upsert_event(event).await
    }

    async fn get_event(&self, id: &SecurityEventId) -> StoreResult<Option<SecurityEvent>> {
        self.inner.get_event(id).await
    }

    async fn list_events(&self, circle_id: &CircleId) -> StoreResult<Vec<SecurityEvent>> {
        self.inner.list_events(circle_id).await
    }

    async fn append_evidence(
        &self,
        id: &SecurityEventId,
        entries: Vec<EvidenceEntry>,
    ) -> StoreResult<()> {
        self.inner.append_evidence(id, entries).await
    }

    async fn evidence_for(&self, id: &SecurityEventId) -> StoreResult<Vec<EvidenceEntry>> {
        self.inner.evidence_for(id).await
    }

    async fn append_signal(&self, signal: SensorEvent) -> StoreResult<()> {
        self.inner.append_signal(signal).await
    }
}

#[tokio::test]
async fn overlapping_ingests_store_the_upgraded_event() {
    let store = Arc::new(SlowFirstWriteStore::default());
    let engine = engine_with_store(HouseMode::Away, store.clone());

    let (first, second) = tokio::join!(
        engine.ingest(person_at_porch(0)),
        engine.ingest(door_open(10))
    );
    let created = first.unwrap().emission().unwrap().clone();
    let upgraded = second.unwrap().emission().unwrap().clone();
    assert_eq!(created.kind, EmissionKind::Created);
    assert_eq!(upgraded.kind, EmissionKind::TypeUpgraded);
    assert_eq!(upgraded.event.id, created.event.id);

    let stored = store.get_event(&created.event.id).await.unwrap().unwrap();
    assert_eq!(stored.event_type, EventType::BreakIn);
    assert_eq!(stored.severity, upgraded.event.severity);
    assert!(stored.status.is_open());

    // Creation ledger first, then the upgrading signal's entry.
    let evidence = store.evidence_for(&created.event.id).await.unwrap();
    assert_eq!(evidence.len(), 2);
    assert_eq!(engine.stats().ledger_entries_lost, 0);
}
