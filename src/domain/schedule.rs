//! Schedules and attendance records.

use chrono::NaiveDate;

use super::entity::{RoomId, StudentId};

/// Number of periods in a school day.
pub const PERIODS_PER_DAY: u8 = 7;

/// A student's fixed daily schedule: one room per period, immutable for the
/// school year.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Schedule {
    /// The student this schedule belongs to.
    pub student: StudentId,
    /// Room per period, ordered by period (index 0 = period 1).
    pub rooms: Vec<RoomId>,
}

impl Schedule {
    /// Room scheduled for 1-based `period`, or `None` if the schedule is
    /// shorter than the period asks for.
    pub fn room_for_period(&self, period: u8) -> Option<RoomId> {
        if period == 0 {
            return None;
        }
        self.rooms.get(usize::from(period) - 1).copied()
    }
}

/// Presence decision for one student in one period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AttendanceStatus {
    /// The student's last sighting is consistent with the scheduled room.
    Present,
    /// It is not.
    Absent,
}

impl std::fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttendanceStatus::Present => write!(f, "PRESENT"),
            AttendanceStatus::Absent => write!(f, "ABSENT"),
        }
    }
}

/// One appended attendance decision.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AttendanceRecord {
    /// Day the decision was taken.
    pub day: NaiveDate,
    /// Scheduled room the decision is about.
    pub room: RoomId,
    /// 1-based period.
    pub period: u8,
    /// The resolved student.
    pub student: StudentId,
    /// The decision.
    pub status: AttendanceStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_lookup_is_one_based() {
        let s = Schedule {
            student: StudentId(1),
            rooms: vec![RoomId(10), RoomId(20)],
        };
        assert_eq!(s.room_for_period(1), Some(RoomId(10)));
        assert_eq!(s.room_for_period(2), Some(RoomId(20)));
        assert_eq!(s.room_for_period(0), None);
        assert_eq!(s.room_for_period(3), None);
    }

    #[test]
    fn status_display_matches_store_enum() {
        assert_eq!(AttendanceStatus::Present.to_string(), "PRESENT");
        assert_eq!(AttendanceStatus::Absent.to_string(), "ABSENT");
    }
}
