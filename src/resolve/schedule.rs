//! Identity resolution by schedule elimination.
//!
//! An observed device path constrains who the tracked entity can be: at
//! period `p` the entity was last seen by a device whose cameras cover a
//! known set of rooms, so any student scheduled in a room outside that set
//! during `p` is eliminated. Resolution succeeds only when exactly one
//! schedule survives every observation. Ambiguity is reported and left
//! unresolved, never tie-broken.

use tracing::{debug, warn};

use crate::domain::{DeviceId, Schedule, StudentId};
use crate::graph::BuildingGraph;

/// Outcome of one elimination run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Exactly one schedule survived.
    Resolved(StudentId),
    /// More than one schedule survived; the candidates, in schedule order.
    Ambiguous(Vec<StudentId>),
    /// No schedule is consistent with the observed path. Expected for
    /// incomplete or noisy paths, not an error.
    NoCandidate,
}

/// Constraint-elimination resolver over the device graph.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleResolver<'a> {
    graph: &'a BuildingGraph,
}

impl<'a> ScheduleResolver<'a> {
    pub fn new(graph: &'a BuildingGraph) -> Self {
        Self { graph }
    }

    /// Eliminate `schedules` against the observed `(period, device)` path.
    ///
    /// A schedule survives an observation `(p, d)` iff its room for period
    /// `p` is one of the rooms device `d` covers. A schedule with no room
    /// for `p` is eliminated by that observation. An observation at a device
    /// outside the graph eliminates everything.
    pub fn resolve(&self, observed: &[(u8, DeviceId)], schedules: &[Schedule]) -> Resolution {
        let survivors: Vec<&Schedule> = schedules
            .iter()
            .filter(|schedule| {
                observed.iter().all(|&(period, device)| {
                    self.graph.contains(device)
                        && schedule
                            .room_for_period(period)
                            .is_some_and(|room| self.graph.device_doors(device).contains(&room))
                })
            })
            .collect();

        match survivors.as_slice() {
            [] => Resolution::NoCandidate,
            [only] => {
                debug!(student = %only.student, observations = observed.len(), "schedule resolved");
                Resolution::Resolved(only.student)
            }
            many => {
                let candidates: Vec<StudentId> = many.iter().map(|s| s.student).collect();
                warn!(?candidates, observations = observed.len(), "ambiguous schedule resolution");
                Resolution::Ambiguous(candidates)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RoomId;
    use crate::graph::building::line_graph;

    // line_graph doors: device 0 -> {100}, device 1 -> {100, 200},
    // device 2 -> {200, 300}
    fn schedules() -> Vec<Schedule> {
        vec![
            Schedule {
                student: StudentId(1),
                rooms: vec![RoomId(100), RoomId(200)],
            },
            Schedule {
                student: StudentId(2),
                rooms: vec![RoomId(100), RoomId(300)],
            },
            Schedule {
                student: StudentId(3),
                rooms: vec![RoomId(200), RoomId(300)],
            },
        ]
    }

    #[test]
    fn unique_survivor_is_resolved() {
        let g = line_graph();
        let resolver = ScheduleResolver::new(&g);
        // period 1 at device 0 (rooms {100}): keeps S1, S2.
        // period 2 at device 1 (rooms {100, 200}): S1 has 200, S2 has 300.
        let observed = [(1, DeviceId(0)), (2, DeviceId(1))];
        assert_eq!(
            resolver.resolve(&observed, &schedules()),
            Resolution::Resolved(StudentId(1))
        );
    }

    #[test]
    fn partial_path_stays_ambiguous() {
        let g = line_graph();
        let resolver = ScheduleResolver::new(&g);
        let observed = [(1, DeviceId(0))];
        assert_eq!(
            resolver.resolve(&observed, &schedules()),
            Resolution::Ambiguous(vec![StudentId(1), StudentId(2)])
        );
    }

    #[test]
    fn inconsistent_path_has_no_candidate() {
        let g = line_graph();
        let resolver = ScheduleResolver::new(&g);
        // nobody stays in room 100 for both periods
        let observed = [(1, DeviceId(0)), (2, DeviceId(0))];
        assert_eq!(
            resolver.resolve(&observed, &schedules()),
            Resolution::NoCandidate
        );
    }

    #[test]
    fn observation_past_schedule_length_eliminates() {
        let g = line_graph();
        let resolver = ScheduleResolver::new(&g);
        let observed = [(3, DeviceId(0))];
        assert_eq!(
            resolver.resolve(&observed, &schedules()),
            Resolution::NoCandidate
        );
    }

    #[test]
    fn empty_path_keeps_everyone() {
        let g = line_graph();
        let resolver = ScheduleResolver::new(&g);
        assert_eq!(
            resolver.resolve(&[], &schedules()),
            Resolution::Ambiguous(vec![StudentId(1), StudentId(2), StudentId(3)])
        );
    }
}
