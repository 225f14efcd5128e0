//! Rule evaluator and escalation.

use serde::{Deserialize, Serialize};
use tracing::debug;
use vigil_types::{EntryPointPhase, EventType, HouseMode, Severity};

use crate::rule::{
    FusionRule, LocatedEvent, RuleContext, RuleInput, GLASS_RULES, MODE_RULES, SAFETY_RULES,
};

/// A satisfied rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleMatch {
    pub rule_id: String,
    pub event_type: EventType,
    pub severity: Severity,
}

/// Why evaluation produced no event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionReason {
    /// No safety or glass-break rule matched while disarmed.
    Disarmed,
    /// Armed, but no rule's condition held.
    NoRuleMatched,
    /// The track carried no events.
    EmptyTrack,
}

/// Outcome of evaluating a track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleDecision {
    Matched(RuleMatch),
    Suppressed(SuppressionReason),
}

/// Result of merging a new match into an open event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Escalation {
    /// A strictly higher event type replaced the current one.
    TypeUpgraded(RuleMatch),
    /// Same type, higher severity.
    SeverityRaised(RuleMatch),
    Unchanged,
}

/// Evaluates the fixed-priority fusion rule table.
#[derive(Debug, Clone)]
pub struct RuleEvaluator {
    safety: &'static [FusionRule],
    glass: &'static [FusionRule],
    gated: &'static [FusionRule],
}

impl Default for RuleEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleEvaluator {
    pub fn new() -> Self {
        Self {
            safety: SAFETY_RULES,
            glass: GLASS_RULES,
            gated: MODE_RULES,
        }
    }

    /// All rules in evaluation order.
    pub fn rules(&self) -> impl Iterator<Item = &FusionRule> {
        self.safety.iter().chain(self.glass).chain(self.gated)
    }

    /// Classify a track.
    ///
    /// Safety rules run first in every mode, then glass-break rules. While
    /// disarmed nothing else is considered. Otherwise the first mode-gated
    /// rule whose condition holds wins.
    pub fn evaluate(&self, events: &[LocatedEvent<'_>], context: &RuleContext) -> RuleDecision {
        if events.is_empty() {
            return RuleDecision::Suppressed(SuppressionReason::EmptyTrack);
        }

        let mut ungated = self.safety.iter().chain(self.glass);
        if let Some(found) = ungated.find_map(|rule| self.try_rule(rule, events, context)) {
            return RuleDecision::Matched(found);
        }

        if context.mode == HouseMode::Disarmed {
            debug!(events = events.len(), "Suppressed while disarmed");
            return RuleDecision::Suppressed(SuppressionReason::Disarmed);
        }

        self.gated
            .iter()
            .filter(|rule| rule.applies_in(context.mode))
            .find_map(|rule| self.try_rule(rule, events, context))
            .map(RuleDecision::Matched)
            .unwrap_or(RuleDecision::Suppressed(SuppressionReason::NoRuleMatched))
    }

    fn try_rule(
        &self,
        rule: &FusionRule,
        events: &[LocatedEvent<'_>],
        context: &RuleContext,
    ) -> Option<RuleMatch> {
        let input = RuleInput {
            events: rule.window(events, context.now),
            context,
        };
        let mut severity = rule.check(&input)?;
        if context.entry_phase == EntryPointPhase::Alarm {
            severity = severity.max(Severity::High);
        }
        debug!(rule_id = rule.id, event_type = %rule.event_type, severity = %severity, "Rule matched");
        Some(RuleMatch {
            rule_id: rule.id.to_string(),
            event_type: rule.event_type,
            severity,
        })
    }
}

/// Merge a new match into the current classification of an open event.
///
/// A strictly higher type replaces type and rule and keeps the larger
/// severity. The same type may only raise severity. Lower types are ignored.
/// Safety floors always hold.
pub fn escalate(current: &RuleMatch, candidate: &RuleMatch) -> Escalation {
    if candidate.event_type.outranks(&current.event_type) {
        let severity = current
            .severity
            .max(candidate.severity)
            .max(candidate.event_type.severity_floor());
        return Escalation::TypeUpgraded(RuleMatch {
            rule_id: candidate.rule_id.clone(),
            event_type: candidate.event_type,
            severity,
        });
    }
    if candidate.event_type == current.event_type && candidate.severity > current.severity {
        return Escalation::SeverityRaised(RuleMatch {
            rule_id: current.rule_id.clone(),
            event_type: current.event_type,
            severity: candidate.severity,
        });
    }
    Escalation::Unchanged
}
