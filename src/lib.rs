//! # facetrack
//!
//! Analytic core of a facility-wide person re-identification and attendance
//! pipeline. Face-embedding observations arrive as [`domain::Update`]s tagged
//! with the camera device that produced them; the crate turns those into
//! within-day tracks, cross-day identities, movement predictions, and
//! attendance records.
//!
//! ## Pipeline
//!
//! 1. Updates are queued in a [`store::TrackStore`] and drained by the
//!    [`tracking::MatchEngine`]: every live track within the matching
//!    threshold is reinforced by Kalman fusion
//!    ([`domain::feature::fuse`]), its per-period [`graph::PathGraph`] is
//!    advanced, and a weighted arrival [`tracking::Particle`] is emitted.
//! 2. At each period boundary the [`lifecycle::RolloverEngine`] records
//!    attendance for identified, currently tracked students via the pure
//!    rule in [`resolve::attendance`].
//! 3. At the day boundary, tracks are folded into (or promoted to)
//!    long-term identities, and unbound identities get one
//!    schedule-elimination pass ([`resolve::ScheduleResolver`]) over their
//!    archived device path.
//!
//! Static inputs (device graph, sensor-noise covariance, engine knobs) are
//! loaded once into a [`config::EngineContext`] before any update is
//! processed.
//!
//! ## Example
//!
//! ```no_run
//! use facetrack::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let graph = BuildingGraph::from_json("building.json")?;
//! let noise = facetrack::config::load_covariance("sensor_noise.csv", FEATURE_DIM)?;
//! let ctx = EngineContext::initialize(EngineConfig::default(), graph, noise)?;
//!
//! let store = InMemoryStore::new();
//! let engine = MatchEngine::new(&ctx, &store);
//! engine.drain_pending(chrono::Utc::now())?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod domain;
pub mod error;
pub mod graph;
pub mod lifecycle;
pub mod resolve;
pub mod store;
pub mod tracking;

pub use config::{EngineConfig, EngineContext};
pub use error::{TrackError, TrackResult};

/// Crate version, from the package manifest.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The names most callers need.
pub mod prelude {
    pub use crate::config::{EngineConfig, EngineContext};
    pub use crate::domain::{
        AttendanceRecord, AttendanceStatus, DeviceId, LongTermId, LongTermState, RoomId, Schedule,
        ShortTermId, ShortTermState, StudentId, Update, UpdateId, FEATURE_DIM,
    };
    pub use crate::error::{TrackError, TrackResult};
    pub use crate::graph::{BuildingGraph, PathGraph, TrackKey};
    pub use crate::lifecycle::RolloverEngine;
    pub use crate::resolve::{resolve_attendance, Resolution, ScheduleResolver};
    pub use crate::store::{InMemoryStore, TrackStore};
    pub use crate::tracking::{MatchEngine, MatchOutcome, Particle};
}
