//! Error types for rule evaluation and notification policy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("invalid notification configuration: {0}")]
    InvalidConfig(String),
}

pub type RuleResult<T> = Result<T, RuleError>;
