//! Device connectivity and per-track visitation paths.

pub mod building;
pub mod path;

pub use building::{BuildingGraph, GraphDescription};
pub use path::{PathGraph, TrackKey};
