//! # vigil-rules
//!
//! Symbolic classification of tracks into security events, in-place
//! escalation of open events, and the notification urgency policy.
//!
//! Evaluation order:
//!
//! 1. safety rules (fire, carbon monoxide, water) in every mode
//! 2. glass-break rules in every mode
//! 3. suppression while disarmed
//! 4. mode-gated rules, first match wins

#![deny(unsafe_code)]

pub mod error;
pub mod evaluator;
pub mod notification;
pub mod rule;

pub use error::{RuleError, RuleResult};
pub use evaluator::{escalate, Escalation, RuleDecision, RuleEvaluator, RuleMatch, SuppressionReason};
pub use notification::{NotificationConfig, NotificationPolicy, SeverityLevels};
pub use rule::{FusionRule, LocatedEvent, RuleContext, RuleInput};
