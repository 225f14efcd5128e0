//! # vigil-tracker
//!
//! Clusters raw sensor events from one circle into [`Track`]s, each standing
//! for one continuous physical incursion. A track records its ordered zone
//! segments, dwell per privacy tier and the highest privacy tier reached.
//!
//! ```text
//!   SensorEvent ──► TrackManager::assign ──► extend open track (≤ gap)
//!                                       └──► start new track (supersedes stale ones)
//!
//!   sweep_idle(now) ──► close tracks idle > idle timeout (terminal)
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod manager;
pub mod track;

pub use config::TrackerConfig;
pub use error::{TrackerError, TrackerResult};
pub use manager::{TrackAssignment, TrackManager, TrackSweep};
pub use track::{CloseReason, ObjectType, Segment, Track};
