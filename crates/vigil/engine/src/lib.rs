//! Vigil fusion engine
//!
//! This crate provides the runtime around the fusion components:
//! - the [`FusionEngine`] ingest pipeline
//! - the [`SecurityEventEmitter`] keeping one open event per track
//! - the [`EventStore`] persistence seam with an in-memory backend
//! - layered [`VigilConfig`] loading
//! - the background sweeper closing idle tracks and stale entry points

#![deny(unsafe_code)]

pub mod config;
pub mod emitter;
pub mod engine;
pub mod error;
pub mod store;

pub use config::{EmitterConfig, LoggingConfig, SweeperConfig, VigilConfig};
pub use emitter::{Emission, EmissionKind, EventDraft, SecurityEventEmitter};
pub use engine::{
    EngineEvent, EngineStats, Explanation, FusionEngine, IngestOutcome, IngestReport, SkipReason,
    SweepReport,
};
pub use error::{EngineError, EngineResult, StoreError, StoreResult};
pub use store::{EventStore, InMemoryEventStore, RetryPolicy};
