//! Engine configuration.
//!
//! Defaults are layered under an optional file and `VIGIL__*` environment
//! variables (`VIGIL__SWEEPER__INTERVAL_SECONDS=5`).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use vigil_evidence::EvidenceConfig;
use vigil_rules::NotificationConfig;
use vigil_tracker::TrackerConfig;

use crate::error::EngineResult;

/// Main engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VigilConfig {
    #[serde(default)]
    pub tracker: TrackerConfig,

    #[serde(default)]
    pub evidence: EvidenceConfig,

    #[serde(default)]
    pub notification: NotificationConfig,

    #[serde(default)]
    pub emitter: EmitterConfig,

    #[serde(default)]
    pub sweeper: SweeperConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl VigilConfig {
    /// Load configuration from defaults, an optional file and the environment.
    pub fn load(path: Option<&str>) -> EngineResult<Self> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&VigilConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("VIGIL")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        Ok(builder.build()?.try_deserialize()?)
    }
}

/// Security event emission and persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmitterConfig {
    /// Ledger entries attached to the outbound event.
    #[serde(default = "default_ledger_top_n")]
    pub ledger_top_n: usize,

    /// Retries after the first failed store call.
    #[serde(default = "default_store_retries")]
    pub store_retries: u32,

    /// Linear backoff step between retries.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Capacity of the engine event broadcast channel.
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            ledger_top_n: default_ledger_top_n(),
            store_retries: default_store_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            broadcast_capacity: default_broadcast_capacity(),
        }
    }
}

impl EmitterConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Background sweep cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    #[serde(default = "default_sweep_interval")]
    pub interval_seconds: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_sweep_interval(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_ledger_top_n() -> usize {
    5
}

fn default_store_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    50
}

fn default_broadcast_capacity() -> usize {
    1024
}

fn default_sweep_interval() -> u64 {
    15
}

fn default_log_level() -> String {
    "info".to_string()
}
