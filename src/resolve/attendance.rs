//! The attendance rule.

use crate::domain::{AttendanceStatus, DeviceId, RoomId};
use crate::graph::BuildingGraph;

/// A student is present for a period iff the last device that saw them
/// covers the room their schedule puts them in. Pure; no store access.
pub fn resolve_attendance(
    graph: &BuildingGraph,
    last_device: DeviceId,
    scheduled_room: RoomId,
) -> AttendanceStatus {
    if graph.contains(last_device) && graph.device_doors(last_device).contains(&scheduled_room) {
        AttendanceStatus::Present
    } else {
        AttendanceStatus::Absent
    }
}
