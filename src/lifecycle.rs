//! Period and day rollover orchestration.
//!
//! The matching engine only ever mutates within-day state; everything that
//! crosses a period or day boundary happens here. Per period: attendance is
//! recorded for every identified, currently tracked student and ephemeral
//! particles are cleared. Per day: short-term tracks are folded into their
//! long-term identities (or promoted into new ones), unresolved identities
//! get one resolution attempt over the day's device path, and the whole
//! ephemeral layer is cleared only after every track has been processed.

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::config::EngineContext;
use crate::domain::{feature, LongTermId, LongTermState, Schedule, ShortTermState, StudentId};
use crate::error::{StoreError, TrackResult};
use crate::resolve::{resolve_attendance, Resolution, ScheduleResolver};
use crate::store::TrackStore;
use crate::tracking::engine::require_long_term;

/// What one period boundary recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodSummary {
    /// The period that just ended.
    pub period: u8,
    /// Attendance records written.
    pub records: usize,
}

/// What one day boundary did to the track pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DaySummary {
    /// Tracks folded into an existing long-term identity.
    pub merged: usize,
    /// Tracks promoted into new long-term identities.
    pub promoted: usize,
    /// Identities newly bound to a student.
    pub resolved: usize,
}

/// Boundary orchestrator over the same context and store as the matcher.
pub struct RolloverEngine<'a, S: TrackStore> {
    ctx: &'a EngineContext,
    store: &'a S,
}

impl<'a, S: TrackStore> RolloverEngine<'a, S> {
    pub fn new(ctx: &'a EngineContext, store: &'a S) -> Self {
        Self { ctx, store }
    }

    /// Close the current period: record attendance for every long-term state
    /// with a resolved student and a live linked track, clear particles, and
    /// advance the period counter (the counter stays on the final period
    /// until [`RolloverEngine::end_of_day`] resets it).
    pub fn end_of_period(&self, day: NaiveDate) -> TrackResult<PeriodSummary> {
        let period = self.store.period()?;
        let schedules = self.store.schedules()?;
        let mut records = 0;

        for sts in self.store.short_term_states()? {
            let Some(lts_id) = sts.long_term_key else {
                continue;
            };
            let lts = require_long_term(self.store, lts_id)?;
            let Some(student) = lts.student else {
                continue;
            };
            let Some(room) = schedules
                .iter()
                .find(|s| s.student == student)
                .and_then(|s| s.room_for_period(period))
            else {
                continue;
            };

            let status = resolve_attendance(&self.ctx.graph, sts.last_device, room);
            self.store.record_attendance(crate::domain::AttendanceRecord {
                day,
                room,
                period,
                student,
                status,
            })?;
            debug!(%student, %room, period, %status, "attendance recorded");
            records += 1;
        }

        self.store.clear_particles()?;
        if period < self.ctx.config.periods_per_day {
            self.store.set_period(period + 1)?;
        }
        info!(period, records, "period closed");
        Ok(PeriodSummary { period, records })
    }

    /// Close the day: merge or promote every short-term track, attempt
    /// identity resolution for unbound long-term states, then clear the
    /// ephemeral layer and reset the period counter to 1.
    ///
    /// The clears run strictly after the per-track loop so a mid-loop store
    /// failure leaves the day's state intact for a retry.
    pub fn end_of_day(&self) -> TrackResult<DaySummary> {
        let schedules = self.store.schedules()?;
        let resolver = ScheduleResolver::new(&self.ctx.graph);
        let mut summary = DaySummary::default();

        for sts in self.store.short_term_states()? {
            let lts_id = match sts.long_term_key {
                Some(id) => {
                    self.merge_into(&sts, id)?;
                    summary.merged += 1;
                    Some(id)
                }
                None if sts.update_count > self.ctx.config.promotion_min_updates => {
                    let id = self.promote(&sts)?;
                    summary.promoted += 1;
                    Some(id)
                }
                None => None,
            };

            let Some(lts_id) = lts_id else { continue };
            if sts.update_count <= self.ctx.config.min_resolve_updates {
                continue;
            }
            let lts = require_long_term(self.store, lts_id)?;
            if lts.student.is_some() {
                continue;
            }
            if self.try_resolve(&sts, lts_id, &resolver, &schedules)? {
                summary.resolved += 1;
            }
        }

        // ephemeral layer reset, strictly after all per-track processing
        self.store.clear_short_term()?;
        self.store.clear_updates()?;
        self.store.clear_short_term_paths()?;
        self.store.clear_particles()?;
        self.store.set_period(1)?;

        info!(
            merged = summary.merged,
            promoted = summary.promoted,
            resolved = summary.resolved,
            "day closed"
        );
        Ok(summary)
    }

    /// Fold a track's feature estimate and day paths into its linked
    /// identity. A degenerate feature fusion skips the estimate but still
    /// merges the paths.
    fn merge_into(&self, sts: &ShortTermState, lts_id: LongTermId) -> TrackResult<()> {
        let mut lts = require_long_term(self.store, lts_id)?;
        match feature::fuse(&lts.mean, &lts.covariance, &sts.mean, &sts.covariance) {
            Ok((mean, covariance)) => {
                lts.mean = mean;
                lts.covariance = covariance;
                self.store.update_long_term(&lts)?;
            }
            Err(e) => {
                warn!(track = %sts.id, identity = %lts_id, error = %e, "skipping feature merge");
            }
        }
        self.store.copy_paths(sts.id, lts_id)?;
        debug!(track = %sts.id, identity = %lts_id, "track merged");
        Ok(())
    }

    /// Turn a sufficiently observed track into a new long-term identity.
    fn promote(&self, sts: &ShortTermState) -> TrackResult<LongTermId> {
        let lts = self.store.create_long_term(LongTermState {
            id: LongTermId(0),
            mean: sts.mean.clone(),
            covariance: sts.covariance.clone(),
            student: None,
        })?;
        self.store.copy_paths(sts.id, lts.id)?;
        debug!(track = %sts.id, identity = %lts.id, count = sts.update_count, "track promoted");
        Ok(lts.id)
    }

    /// One schedule-elimination attempt over the track's archived device
    /// path. A lost set-identity race is logged and dropped.
    fn try_resolve(
        &self,
        sts: &ShortTermState,
        lts_id: LongTermId,
        resolver: &ScheduleResolver<'_>,
        schedules: &[Schedule],
    ) -> TrackResult<bool> {
        let observed = self.store.device_path(sts.id)?;
        match resolver.resolve(&observed, schedules) {
            Resolution::Resolved(student) => match self.store.set_student(lts_id, student) {
                Ok(()) => {
                    info!(identity = %lts_id, %student, "identity resolved");
                    Ok(true)
                }
                Err(StoreError::IdentityAlreadySet { existing, .. }) => {
                    warn!(
                        identity = %lts_id,
                        %student,
                        existing = %StudentId(existing),
                        "identity already bound, keeping existing"
                    );
                    Ok(false)
                }
                Err(e) => Err(e.into()),
            },
            Resolution::Ambiguous(_) | Resolution::NoCandidate => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::domain::{
        AttendanceStatus, DeviceId, RoomId, ShortTermId, FEATURE_DIM,
    };
    use crate::graph::building::line_graph;
    use crate::graph::TrackKey;
    use crate::store::{InMemoryStore, TrackStore};
    use ndarray::{Array1, Array2};

    fn ctx() -> EngineContext {
        EngineContext::initialize(
            EngineConfig::default(),
            line_graph(),
            Array2::eye(FEATURE_DIM),
        )
        .unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, 1).unwrap()
    }

    fn track(count: u32, device: usize, link: Option<LongTermId>) -> ShortTermState {
        ShortTermState {
            id: ShortTermId(0),
            mean: Array1::from_elem(FEATURE_DIM, 1.0),
            covariance: Array2::eye(FEATURE_DIM),
            update_count: count,
            last_device: DeviceId(device),
            last_update: None,
            long_term_key: link,
        }
    }

    fn identity(student: Option<StudentId>) -> LongTermState {
        LongTermState {
            id: LongTermId(0),
            mean: Array1::from_elem(FEATURE_DIM, 1.0),
            covariance: Array2::eye(FEATURE_DIM),
            student,
        }
    }

    #[test]
    fn attendance_follows_last_device() {
        let ctx = ctx();
        let store = InMemoryStore::new();
        let rollover = RolloverEngine::new(&ctx, &store);

        let lts = store.create_long_term(identity(Some(StudentId(7)))).unwrap();
        // device 1 covers rooms {100, 200}; schedule puts the student in 100
        store.create_short_term(track(3, 1, Some(lts.id))).unwrap();
        store
            .add_schedule_entry(Schedule {
                student: StudentId(7),
                rooms: vec![RoomId(100), RoomId(999)],
            })
            .unwrap();

        let summary = rollover.end_of_period(day()).unwrap();
        assert_eq!(summary.records, 1);
        let records = store.attendance().unwrap();
        assert_eq!(records[0].status, AttendanceStatus::Present);
        assert_eq!(records[0].room, RoomId(100));
        assert_eq!(store.period().unwrap(), 2);

        // period 2: scheduled room 999 is covered by no device
        let summary = rollover.end_of_period(day()).unwrap();
        assert_eq!(summary.period, 2);
        assert_eq!(
            store.attendance().unwrap()[1].status,
            AttendanceStatus::Absent
        );
    }

    #[test]
    fn unidentified_tracks_record_no_attendance() {
        let ctx = ctx();
        let store = InMemoryStore::new();
        let rollover = RolloverEngine::new(&ctx, &store);

        let lts = store.create_long_term(identity(None)).unwrap();
        store.create_short_term(track(3, 1, Some(lts.id))).unwrap();
        store.create_short_term(track(3, 1, None)).unwrap();

        let summary = rollover.end_of_period(day()).unwrap();
        assert_eq!(summary.records, 0);
        assert!(store.attendance().unwrap().is_empty());
    }

    #[test]
    fn promotion_requires_strictly_more_than_the_threshold() {
        let ctx = ctx();
        let store = InMemoryStore::new();
        let rollover = RolloverEngine::new(&ctx, &store);

        store.create_short_term(track(2, 0, None)).unwrap();
        let summary = rollover.end_of_day().unwrap();
        assert_eq!(summary.promoted, 0, "count == threshold must not promote");
        assert!(store.long_term_states().unwrap().is_empty());

        store.create_short_term(track(3, 0, None)).unwrap();
        let summary = rollover.end_of_day().unwrap();
        assert_eq!(summary.promoted, 1);
        assert_eq!(store.long_term_states().unwrap().len(), 1);
    }

    #[test]
    fn linked_track_is_merged_and_its_paths_copied() {
        let ctx = ctx();
        let store = InMemoryStore::new();
        let rollover = RolloverEngine::new(&ctx, &store);

        let lts = store.create_long_term(identity(None)).unwrap();
        let mut seed = track(4, 1, Some(lts.id));
        seed.mean = Array1::from_elem(FEATURE_DIM, 2.0);
        let sts = store.create_short_term(seed).unwrap();

        let mut path = crate::graph::PathGraph::new(TrackKey::Short(sts.id), 1, 3);
        path.start(DeviceId(0)).unwrap();
        path.advance(DeviceId(0), DeviceId(1)).unwrap();
        store.put_path(path).unwrap();

        let summary = rollover.end_of_day().unwrap();
        assert_eq!(summary.merged, 1);

        // equal unit covariances average the two means
        let merged = store.long_term(lts.id).unwrap().unwrap();
        assert!((merged.mean[0] - 1.5).abs() < 1e-9);
        let long_path = store.path(TrackKey::Long(lts.id), 1).unwrap().unwrap();
        assert_eq!(long_path.final_device(), Some(DeviceId(1)));
    }

    #[test]
    fn day_rollover_clears_the_ephemeral_layer() {
        let ctx = ctx();
        let store = InMemoryStore::new();
        let rollover = RolloverEngine::new(&ctx, &store);

        let sts = store.create_short_term(track(1, 0, None)).unwrap();
        store
            .put_path(crate::graph::PathGraph::new(TrackKey::Short(sts.id), 1, 3))
            .unwrap();
        store.set_period(5).unwrap();

        rollover.end_of_day().unwrap();
        assert!(store.short_term_states().unwrap().is_empty());
        assert!(store.path(TrackKey::Short(sts.id), 1).unwrap().is_none());
        assert_eq!(store.period().unwrap(), 1);
    }

    #[test]
    fn promoted_track_resolves_its_student() {
        let ctx = ctx();
        let store = InMemoryStore::new();
        let rollover = RolloverEngine::new(&ctx, &store);

        // unique schedule through rooms 100 then 200
        store
            .add_schedule_entry(Schedule {
                student: StudentId(1),
                rooms: vec![RoomId(100), RoomId(200)],
            })
            .unwrap();
        store
            .add_schedule_entry(Schedule {
                student: StudentId(2),
                rooms: vec![RoomId(100), RoomId(300)],
            })
            .unwrap();

        let sts = store.create_short_term(track(3, 1, None)).unwrap();
        // archived updates: period 1 at device 0 ({100}), period 2 at
        // device 1 ({100, 200})
        for (period, device) in [(1u8, 0usize), (2, 1)] {
            let u = crate::domain::Update::new(
                DeviceId(device),
                Array1::zeros(FEATURE_DIM),
                Array2::eye(FEATURE_DIM),
            );
            let id = u.id;
            store.enqueue_update(u).unwrap();
            store.resolve_update(id, sts.id, period).unwrap();
        }

        let summary = rollover.end_of_day().unwrap();
        assert_eq!(summary.promoted, 1);
        assert_eq!(summary.resolved, 1);

        let identities = store.long_term_states().unwrap();
        assert_eq!(identities[0].student, Some(StudentId(1)));
    }
}
