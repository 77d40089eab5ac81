//! Persistence boundary for the tracking engine.
//!
//! Everything the engine persists goes through [`TrackStore`]; the engine
//! itself holds no track tables. The trait is synchronous and object-safe so
//! a backing database can be swapped in without touching the match or
//! rollover code. [`InMemoryStore`] is the default backend and the one the
//! test suites run against.
//!
//! Contract notes that matter to callers:
//!
//! * [`TrackStore::enqueue_update`] deduplicates by update id, so a retried
//!   submission is a no-op.
//! * [`TrackStore::resolve_update`] and [`TrackStore::delete_update`] are
//!   idempotent against already-resolved or already-deleted ids.
//! * [`TrackStore::set_student`] is set-once: rebinding a long-term state to
//!   a different student is an error.

pub mod memory;

pub use memory::InMemoryStore;

use chrono::{DateTime, Utc};

use crate::domain::{
    AttendanceRecord, DeviceId, LongTermId, LongTermState, Schedule, ShortTermId, ShortTermState,
    StudentId, Update, UpdateId,
};
use crate::error::StoreError;
use crate::graph::{PathGraph, TrackKey};
use crate::tracking::Particle;

/// Synchronous persistence operations used by the match engine and the
/// period/day rollover.
pub trait TrackStore: Send + Sync {
    // -- update queue -------------------------------------------------------

    /// Queue an update for matching. Returns `false` when the id was already
    /// seen and the update was dropped as a duplicate.
    fn enqueue_update(&self, update: Update) -> Result<bool, StoreError>;

    /// Updates not yet resolved, oldest first.
    fn pending_updates(&self) -> Result<Vec<Update>, StoreError>;

    /// Mark an update as consumed by `sts` during `period`. Resolving an
    /// unknown or already-resolved id is a no-op.
    fn resolve_update(
        &self,
        id: UpdateId,
        sts: ShortTermId,
        period: u8,
    ) -> Result<(), StoreError>;

    /// Drop an update outright. Unknown ids are a no-op.
    fn delete_update(&self, id: UpdateId) -> Result<(), StoreError>;

    /// Remove every update, pending and resolved, along with the seen-id
    /// history (day rollover).
    fn clear_updates(&self) -> Result<(), StoreError>;

    /// `(period, device)` pairs of the resolved updates of `sts`, in
    /// resolution order. This is the observed device path the schedule
    /// resolver eliminates against.
    fn device_path(&self, sts: ShortTermId) -> Result<Vec<(u8, DeviceId)>, StoreError>;

    // -- short-term states --------------------------------------------------

    /// Persist a new short-term state, assigning its id.
    fn create_short_term(&self, seed: ShortTermState) -> Result<ShortTermState, StoreError>;

    /// All live short-term states.
    fn short_term_states(&self) -> Result<Vec<ShortTermState>, StoreError>;

    /// Look up one short-term state.
    fn short_term(&self, id: ShortTermId) -> Result<Option<ShortTermState>, StoreError>;

    /// Overwrite a short-term state in place.
    fn update_short_term(&self, state: &ShortTermState) -> Result<(), StoreError>;

    /// Drop every short-term state (end of day).
    fn clear_short_term(&self) -> Result<(), StoreError>;

    // -- long-term states ---------------------------------------------------

    /// Persist a new long-term state, assigning its id.
    fn create_long_term(&self, seed: LongTermState) -> Result<LongTermState, StoreError>;

    /// Look up one long-term state.
    fn long_term(&self, id: LongTermId) -> Result<Option<LongTermState>, StoreError>;

    /// All long-term states.
    fn long_term_states(&self) -> Result<Vec<LongTermState>, StoreError>;

    /// Overwrite a long-term state in place.
    fn update_long_term(&self, state: &LongTermState) -> Result<(), StoreError>;

    /// Bind a long-term state to a student. The binding is permanent;
    /// rebinding to a different student fails with
    /// [`StoreError::IdentityAlreadySet`]. Rebinding to the same student is a
    /// no-op.
    fn set_student(&self, id: LongTermId, student: StudentId) -> Result<(), StoreError>;

    // -- path graphs --------------------------------------------------------

    /// The path recorded for `key` during `period`, if any.
    fn path(&self, key: TrackKey, period: u8) -> Result<Option<PathGraph>, StoreError>;

    /// Insert or replace a path record.
    fn put_path(&self, path: PathGraph) -> Result<(), StoreError>;

    /// Fold every path of `sts` into the corresponding per-period path of
    /// `lts`, creating long-term paths that do not exist yet.
    fn copy_paths(&self, sts: ShortTermId, lts: LongTermId) -> Result<(), StoreError>;

    /// Drop every short-term path record (end of day). Long-term paths
    /// survive.
    fn clear_short_term_paths(&self) -> Result<(), StoreError>;

    // -- particles ----------------------------------------------------------

    /// Persist a predicted-arrival particle.
    fn create_particle(&self, particle: Particle) -> Result<(), StoreError>;

    /// Particles with at least one predicted arrival at or after `now`.
    fn active_particles(&self, now: DateTime<Utc>) -> Result<Vec<Particle>, StoreError>;

    /// Drop every particle (end of period).
    fn clear_particles(&self) -> Result<(), StoreError>;

    // -- schedules and attendance -------------------------------------------

    /// All known schedules.
    fn schedules(&self) -> Result<Vec<Schedule>, StoreError>;

    /// Insert or replace the schedule for one student.
    fn add_schedule_entry(&self, schedule: Schedule) -> Result<(), StoreError>;

    /// Append an attendance record.
    fn record_attendance(&self, record: AttendanceRecord) -> Result<(), StoreError>;

    /// All attendance records, in append order.
    fn attendance(&self) -> Result<Vec<AttendanceRecord>, StoreError>;

    // -- period counter -----------------------------------------------------

    /// Current 1-based period.
    fn period(&self) -> Result<u8, StoreError>;

    /// Set the current period.
    fn set_period(&self, period: u8) -> Result<(), StoreError>;
}
