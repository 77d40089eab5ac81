//! In-memory [`TrackStore`] backend.
//!
//! Every table sits behind one `parking_lot::RwLock`, so each trait call is
//! atomic with respect to the others and the per-state read-fuse-write
//! sequences in the engine see a consistent snapshot. Persistent-state keys
//! are allocated from monotonic `i64` counters, matching what a database
//! backend would hand out.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::domain::{
    AttendanceRecord, DeviceId, LongTermId, LongTermState, Schedule, ShortTermId, ShortTermState,
    StudentId, Update, UpdateId,
};
use crate::error::StoreError;
use crate::graph::{PathGraph, TrackKey};
use crate::tracking::Particle;

use super::TrackStore;

/// One archived update: the matching linkage recorded at resolve time.
#[derive(Debug, Clone)]
struct ResolvedUpdate {
    update: Update,
    sts: ShortTermId,
    period: u8,
}

#[derive(Debug, Default)]
struct Inner {
    pending: Vec<Update>,
    resolved: Vec<ResolvedUpdate>,
    seen_updates: HashSet<UpdateId>,
    short_term: BTreeMap<i64, ShortTermState>,
    long_term: BTreeMap<i64, LongTermState>,
    paths: HashMap<(TrackKey, u8), PathGraph>,
    particles: Vec<Particle>,
    schedules: BTreeMap<i64, Schedule>,
    attendance: Vec<AttendanceRecord>,
    period: u8,
    next_short: i64,
    next_long: i64,
}

/// Default store backend: all tables in process memory.
#[derive(Debug)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                period: 1,
                next_short: 1,
                next_long: 1,
                ..Inner::default()
            }),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackStore for InMemoryStore {
    fn enqueue_update(&self, update: Update) -> Result<bool, StoreError> {
        let mut inner = self.inner.write();
        if !inner.seen_updates.insert(update.id) {
            return Ok(false);
        }
        inner.pending.push(update);
        Ok(true)
    }

    fn pending_updates(&self) -> Result<Vec<Update>, StoreError> {
        Ok(self.inner.read().pending.clone())
    }

    fn resolve_update(
        &self,
        id: UpdateId,
        sts: ShortTermId,
        period: u8,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        if let Some(pos) = inner.pending.iter().position(|u| u.id == id) {
            let mut update = inner.pending.remove(pos);
            update.period = Some(period);
            inner.resolved.push(ResolvedUpdate {
                update,
                sts,
                period,
            });
        }
        Ok(())
    }

    fn delete_update(&self, id: UpdateId) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        inner.pending.retain(|u| u.id != id);
        Ok(())
    }

    fn clear_updates(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        inner.pending.clear();
        inner.resolved.clear();
        inner.seen_updates.clear();
        Ok(())
    }

    fn device_path(&self, sts: ShortTermId) -> Result<Vec<(u8, DeviceId)>, StoreError> {
        Ok(self
            .inner
            .read()
            .resolved
            .iter()
            .filter(|r| r.sts == sts)
            .map(|r| (r.period, r.update.device))
            .collect())
    }

    fn create_short_term(&self, mut seed: ShortTermState) -> Result<ShortTermState, StoreError> {
        let mut inner = self.inner.write();
        let id = inner.next_short;
        inner.next_short += 1;
        seed.id = ShortTermId(id);
        inner.short_term.insert(id, seed.clone());
        Ok(seed)
    }

    fn short_term_states(&self) -> Result<Vec<ShortTermState>, StoreError> {
        Ok(self.inner.read().short_term.values().cloned().collect())
    }

    fn short_term(&self, id: ShortTermId) -> Result<Option<ShortTermState>, StoreError> {
        Ok(self.inner.read().short_term.get(&id.value()).cloned())
    }

    fn update_short_term(&self, state: &ShortTermState) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        match inner.short_term.get_mut(&state.id.value()) {
            Some(slot) => {
                *slot = state.clone();
                Ok(())
            }
            None => Err(StoreError::not_found("short-term state", state.id.value())),
        }
    }

    fn clear_short_term(&self) -> Result<(), StoreError> {
        self.inner.write().short_term.clear();
        Ok(())
    }

    fn create_long_term(&self, mut seed: LongTermState) -> Result<LongTermState, StoreError> {
        let mut inner = self.inner.write();
        let id = inner.next_long;
        inner.next_long += 1;
        seed.id = LongTermId(id);
        inner.long_term.insert(id, seed.clone());
        Ok(seed)
    }

    fn long_term(&self, id: LongTermId) -> Result<Option<LongTermState>, StoreError> {
        Ok(self.inner.read().long_term.get(&id.value()).cloned())
    }

    fn long_term_states(&self) -> Result<Vec<LongTermState>, StoreError> {
        Ok(self.inner.read().long_term.values().cloned().collect())
    }

    fn update_long_term(&self, state: &LongTermState) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        match inner.long_term.get_mut(&state.id.value()) {
            Some(slot) => {
                *slot = state.clone();
                Ok(())
            }
            None => Err(StoreError::not_found("long-term state", state.id.value())),
        }
    }

    fn set_student(&self, id: LongTermId, student: StudentId) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let state = inner
            .long_term
            .get_mut(&id.value())
            .ok_or_else(|| StoreError::not_found("long-term state", id.value()))?;
        match state.student {
            None => {
                state.student = Some(student);
                Ok(())
            }
            Some(existing) if existing == student => Ok(()),
            Some(existing) => Err(StoreError::IdentityAlreadySet {
                id: id.value(),
                existing: existing.value(),
            }),
        }
    }

    fn path(&self, key: TrackKey, period: u8) -> Result<Option<PathGraph>, StoreError> {
        Ok(self.inner.read().paths.get(&(key, period)).cloned())
    }

    fn put_path(&self, path: PathGraph) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        inner.paths.insert((path.key, path.period), path);
        Ok(())
    }

    fn copy_paths(&self, sts: ShortTermId, lts: LongTermId) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let short_key = TrackKey::Short(sts);
        let long_key = TrackKey::Long(lts);
        let day_paths: Vec<PathGraph> = inner
            .paths
            .values()
            .filter(|p| p.key == short_key)
            .cloned()
            .collect();
        for day_path in day_paths {
            match inner.paths.entry((long_key, day_path.period)) {
                std::collections::hash_map::Entry::Occupied(mut slot) => slot
                    .get_mut()
                    .fuse(&day_path)
                    .map_err(|e| StoreError::Backend(e.to_string()))?,
                std::collections::hash_map::Entry::Vacant(slot) => {
                    slot.insert(day_path.rekeyed(long_key));
                }
            }
        }
        Ok(())
    }

    fn clear_short_term_paths(&self) -> Result<(), StoreError> {
        self.inner
            .write()
            .paths
            .retain(|(key, _), _| matches!(key, TrackKey::Long(_)));
        Ok(())
    }

    fn create_particle(&self, particle: Particle) -> Result<(), StoreError> {
        self.inner.write().particles.push(particle);
        Ok(())
    }

    fn active_particles(&self, now: DateTime<Utc>) -> Result<Vec<Particle>, StoreError> {
        Ok(self
            .inner
            .read()
            .particles
            .iter()
            .filter(|p| p.arrivals.iter().any(|(_, t)| *t >= now))
            .cloned()
            .collect())
    }

    fn clear_particles(&self) -> Result<(), StoreError> {
        self.inner.write().particles.clear();
        Ok(())
    }

    fn schedules(&self) -> Result<Vec<Schedule>, StoreError> {
        Ok(self.inner.read().schedules.values().cloned().collect())
    }

    fn add_schedule_entry(&self, schedule: Schedule) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        inner.schedules.insert(schedule.student.value(), schedule);
        Ok(())
    }

    fn record_attendance(&self, record: AttendanceRecord) -> Result<(), StoreError> {
        self.inner.write().attendance.push(record);
        Ok(())
    }

    fn attendance(&self) -> Result<Vec<AttendanceRecord>, StoreError> {
        Ok(self.inner.read().attendance.clone())
    }

    fn period(&self) -> Result<u8, StoreError> {
        Ok(self.inner.read().period)
    }

    fn set_period(&self, period: u8) -> Result<(), StoreError> {
        self.inner.write().period = period;
        Ok(())
    }
}
