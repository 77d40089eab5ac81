//! Identity and attendance resolution.

pub mod attendance;
pub mod schedule;

pub use attendance::resolve_attendance;
pub use schedule::{Resolution, ScheduleResolver};
