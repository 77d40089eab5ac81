//! Domain types: feature math, entity state records, schedules.

pub mod entity;
pub mod feature;
pub mod schedule;

pub use entity::{
    DeviceId, FeatureBearing, LongTermId, LongTermState, RoomId, ShortTermId, ShortTermState,
    StudentId, Update, UpdateId,
};
pub use feature::{
    distance, fuse, FeatureCovariance, FeatureEstimate, FeatureVector, FEATURE_DIM,
};
pub use schedule::{AttendanceRecord, AttendanceStatus, Schedule, PERIODS_PER_DAY};
