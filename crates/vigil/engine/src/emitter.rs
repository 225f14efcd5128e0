//! Security event emitter.
//!
//! Holds at most one open [`SecurityEvent`] per track. The first rule match
//! creates it; later matches may only upgrade its type or raise its severity.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;
use vigil_rules::{escalate, Escalation, NotificationPolicy, RuleMatch};
use vigil_tracker::Track;
use vigil_types::{
    EntryPointId, EventStatus, EvidenceEntry, Feedback, HouseMode, NotificationLevel,
    SecurityEvent, SecurityEventId, TrackId, ZoneId,
};

/// What an emission did to the track's event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmissionKind {
    Created,
    TypeUpgraded,
    SeverityRaised,
    /// Classification unchanged; path, dwell and evidence refreshed.
    Refreshed,
}

/// Result of [`SecurityEventEmitter::emit`].
#[derive(Debug, Clone)]
pub struct Emission {
    pub kind: EmissionKind,
    pub event: SecurityEvent,
}

impl Emission {
    pub fn is_upgrade(&self) -> bool {
        matches!(
            self.kind,
            EmissionKind::TypeUpgraded | EmissionKind::SeverityRaised
        )
    }
}

/// Inputs for one emission.
#[derive(Debug)]
pub struct EventDraft<'a> {
    pub track: &'a Track,
    pub rule: RuleMatch,
    pub mode: HouseMode,
    pub zone_id: Option<ZoneId>,
    pub entry_point_id: Option<EntryPointId>,
    /// Mapped confidence of the strongest entry point.
    pub ml_score: f64,
    /// Full ledger of the strongest entry point.
    pub ledger: &'a [EvidenceEntry],
    pub at: DateTime<Utc>,
}

pub struct SecurityEventEmitter {
    open: DashMap<TrackId, SecurityEvent>,
    /// Event ID to owning track
    index: DashMap<SecurityEventId, TrackId>,
    policy: NotificationPolicy,
    top_n: usize,
}

impl SecurityEventEmitter {
    pub fn new(policy: NotificationPolicy, top_n: usize) -> Self {
        Self {
            open: DashMap::new(),
            index: DashMap::new(),
            policy,
            top_n,
        }
    }

    pub fn policy(&self) -> &NotificationPolicy {
        &self.policy
    }

    /// Create or update the open event of the draft's track.
    pub fn emit(&self, draft: EventDraft<'_>) -> Emission {
        let track_id = draft.track.id;
        let emission = match self.open.entry(track_id) {
            Entry::Occupied(mut slot) => {
                let event = slot.get_mut();
                let current = RuleMatch {
                    rule_id: event.fusion_rule_id.clone(),
                    event_type: event.event_type,
                    severity: event.severity,
                };
                let kind = match escalate(&current, &draft.rule) {
                    Escalation::TypeUpgraded(m) => {
                        classify(event, m);
                        EmissionKind::TypeUpgraded
                    }
                    Escalation::SeverityRaised(m) => {
                        classify(event, m);
                        EmissionKind::SeverityRaised
                    }
                    Escalation::Unchanged => EmissionKind::Refreshed,
                };
                self.refresh(event, &draft);
                Emission {
                    kind,
                    event: event.clone(),
                }
            }
            Entry::Vacant(slot) => {
                let event = self.create(&draft);
                slot.insert(event.clone());
                Emission {
                    kind: EmissionKind::Created,
                    event,
                }
            }
        };

        if emission.kind == EmissionKind::Created {
            self.index.insert(emission.event.id, track_id);
        }
        if emission.kind != EmissionKind::Refreshed {
            info!(
                event_id = %emission.event.id,
                track_id = %track_id,
                kind = ?emission.kind,
                event_type = %emission.event.event_type,
                severity = %emission.event.severity,
                notification = %emission.event.notification_level,
                "Security event emitted"
            );
        }
        emission
    }

    /// Close an open event with external feedback.
    ///
    /// Returns `None` when the event is not open here, for instance because
    /// its track already closed.
    pub fn resolve(
        &self,
        id: &SecurityEventId,
        feedback: Feedback,
        at: DateTime<Utc>,
    ) -> Option<SecurityEvent> {
        let (_, track_id) = self.index.remove(id)?;
        let (_, mut event) = self.open.remove(&track_id)?;
        event.status = EventStatus::Resolved(feedback);
        event.updated_at = at;
        Some(event)
    }

    /// Forget the open event of a closed track.
    ///
    /// The event stays open in the store until feedback arrives but no longer
    /// receives in-place updates.
    pub fn release_track(&self, track_id: &TrackId) -> Option<SecurityEventId> {
        let (_, event) = self.open.remove(track_id)?;
        self.index.remove(&event.id);
        Some(event.id)
    }

    pub fn get(&self, id: &SecurityEventId) -> Option<SecurityEvent> {
        let track_id = *self.index.get(id)?;
        self.open.get(&track_id).map(|e| e.clone())
    }

    /// Track owning an open event.
    pub fn track_of(&self, id: &SecurityEventId) -> Option<TrackId> {
        self.index.get(id).map(|t| *t)
    }

    pub fn for_track(&self, track_id: &TrackId) -> Option<SecurityEvent> {
        self.open.get(track_id).map(|e| e.clone())
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    fn create(&self, draft: &EventDraft<'_>) -> SecurityEvent {
        let mut event = SecurityEvent {
            id: SecurityEventId::generate(),
            circle_id: draft.track.circle_id.clone(),
            zone_id: draft.zone_id.clone(),
            entry_point_id: draft.entry_point_id.clone(),
            event_type: draft.rule.event_type,
            severity: draft.rule.severity,
            status: EventStatus::Open,
            primary_track_id: draft.track.id,
            fusion_rule_id: draft.rule.rule_id.clone(),
            path_summary: Vec::new(),
            dwell_seconds_private: 0.0,
            contributing_sensor_ids: Vec::new(),
            ml_score: 0.0,
            notification_level: NotificationLevel::None,
            evidence_ledger: Vec::new(),
            created_at: draft.at,
            updated_at: draft.at,
        };
        self.refresh(&mut event, draft);
        event
    }

    fn refresh(&self, event: &mut SecurityEvent, draft: &EventDraft<'_>) {
        event.path_summary = draft.track.path_summary();
        event.dwell_seconds_private = draft.track.dwell_seconds_private();
        event.contributing_sensor_ids = draft.track.contributing_sensor_ids();
        event.ml_score = draft.ml_score;
        if event.entry_point_id.is_none() {
            event.entry_point_id = draft.entry_point_id.clone();
        }
        if event.zone_id.is_none() {
            event.zone_id = draft.zone_id.clone();
        }
        if !draft.ledger.is_empty() {
            event.evidence_ledger = EvidenceEntry::top_contributors(draft.ledger, self.top_n);
        }

        let level = self.policy.decide(
            draft.ml_score,
            event.event_type,
            event.severity,
            draft.mode,
        );
        event.notification_level = event.notification_level.max(level);
        event.updated_at = event.updated_at.max(draft.at);
    }
}

fn classify(event: &mut SecurityEvent, rule: RuleMatch) {
    event.fusion_rule_id = rule.rule_id;
    event.event_type = rule.event_type;
    event.severity = rule.severity;
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_types::{
        CircleId, EventType, LocationType, PrivacyLevel, SensorEvent, SensorId, SensorType,
        Severity, SignalType, Zone,
    };

    fn zone() -> Zone {
        Zone {
            id: ZoneId::new("yard"),
            circle_id: CircleId::new("home"),
            name: "Yard".into(),
            location: LocationType::Outdoor,
            privacy: PrivacyLevel::Public,
            enabled: true,
        }
    }

    fn track() -> Track {
        let event = SensorEvent::new(
            CircleId::new("home"),
            SensorId::new("cam"),
            Some(ZoneId::new("yard")),
            SensorType::Camera,
            SignalType::Person,
            Utc::now(),
        );
        Track::start(&event, &zone())
    }

    fn rule(id: &str, event_type: EventType, severity: Severity) -> RuleMatch {
        RuleMatch {
            rule_id: id.into(),
            event_type,
            severity,
        }
    }

    fn draft<'a>(track: &'a Track, rule: RuleMatch, mode: HouseMode) -> EventDraft<'a> {
        EventDraft {
            track,
            rule,
            mode,
            zone_id: Some(ZoneId::new("yard")),
            entry_point_id: None,
            ml_score: 0.2,
            ledger: &[],
            at: Utc::now(),
        }
    }

    #[test]
    fn test_create_then_upgrade_in_place() {
        let emitter = SecurityEventEmitter::new(NotificationPolicy::default(), 5);
        let track = track();

        let first = emitter.emit(draft(
            &track,
            rule("motion.generic", EventType::Motion, Severity::Low),
            HouseMode::Away,
        ));
        assert_eq!(first.kind, EmissionKind::Created);
        assert_eq!(first.event.notification_level, NotificationLevel::Normal);

        let second = emitter.emit(draft(
            &track,
            rule("person.detected", EventType::SuspiciousPerson, Severity::Medium),
            HouseMode::Away,
        ));
        assert_eq!(second.kind, EmissionKind::TypeUpgraded);
        assert_eq!(second.event.id, first.event.id);
        assert_eq!(second.event.fusion_rule_id, "person.detected");
        assert_eq!(second.event.notification_level, NotificationLevel::High);

        let third = emitter.emit(draft(
            &track,
            rule("motion.generic", EventType::Motion, Severity::Critical),
            HouseMode::Away,
        ));
        assert_eq!(third.kind, EmissionKind::Refreshed);
        assert_eq!(third.event.event_type, EventType::SuspiciousPerson);
        assert_eq!(emitter.open_count(), 1);
    }

    #[test]
    fn test_notification_level_never_drops() {
        let emitter = SecurityEventEmitter::new(NotificationPolicy::default(), 5);
        let track = track();
        emitter.emit(draft(
            &track,
            rule("person.detected", EventType::SuspiciousPerson, Severity::High),
            HouseMode::Away,
        ));
        let later = emitter.emit(draft(
            &track,
            rule("person.detected", EventType::SuspiciousPerson, Severity::High),
            HouseMode::Disarmed,
        ));
        assert_eq!(later.event.notification_level, NotificationLevel::High);
    }

    #[test]
    fn test_resolve_then_new_event() {
        let emitter = SecurityEventEmitter::new(NotificationPolicy::default(), 5);
        let track = track();
        let first = emitter.emit(draft(
            &track,
            rule("motion.generic", EventType::Motion, Severity::Low),
            HouseMode::Away,
        ));

        let resolved = emitter
            .resolve(&first.event.id, Feedback::FalsePositive, Utc::now())
            .unwrap();
        assert_eq!(resolved.status, EventStatus::Resolved(Feedback::FalsePositive));
        assert!(emitter.get(&first.event.id).is_none());
        assert!(emitter
            .resolve(&first.event.id, Feedback::TruePositive, Utc::now())
            .is_none());

        let next = emitter.emit(draft(
            &track,
            rule("motion.generic", EventType::Motion, Severity::Low),
            HouseMode::Away,
        ));
        assert_eq!(next.kind, EmissionKind::Created);
        assert_ne!(next.event.id, first.event.id);
    }

    #[test]
    fn test_release_track() {
        let emitter = SecurityEventEmitter::new(NotificationPolicy::default(), 5);
        let track = track();
        let emitted = emitter.emit(draft(
            &track,
            rule("motion.generic", EventType::Motion, Severity::Low),
            HouseMode::Away,
        ));
        assert_eq!(emitter.release_track(&track.id), Some(emitted.event.id));
        assert!(emitter.get(&emitted.event.id).is_none());
        assert!(emitter.for_track(&track.id).is_none());
    }
}
