//! Arrival prediction for matched tracks.
//!
//! When an update matches a short-term state, the engine emits a
//! [`Particle`]: a weighted hypothesis that the entity will keep following
//! the path its linked history recorded for this period. The particle walks
//! that path forward from the matched device at a fixed traversal speed and
//! carries the predicted arrival time at each downstream device.
//!
//! Prediction is pure: it reads a [`PathGraph`] and the [`BuildingGraph`] and
//! never touches the store.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::domain::{DeviceId, ShortTermId};
use crate::graph::{BuildingGraph, PathGraph};

/// Opaque particle identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ParticleId(Uuid);

impl ParticleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ParticleId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ParticleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// One weighted arrival hypothesis for a matched short-term state.
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    pub id: ParticleId,
    /// Device the matched update came from.
    pub origin: DeviceId,
    /// Track the hypothesis belongs to.
    pub short_term: ShortTermId,
    /// Match quality in `[0, 1]`: `1 - distance / threshold`.
    pub weight: f64,
    /// Predicted `(device, arrival time)` pairs, nearest first. Empty when
    /// the reference path ends at the origin.
    pub arrivals: Vec<(DeviceId, DateTime<Utc>)>,
}

impl Particle {
    /// Latest predicted arrival, if any.
    pub fn horizon(&self) -> Option<DateTime<Utc>> {
        self.arrivals.last().map(|(_, t)| *t)
    }
}

/// Walk `path` forward from `start`, predicting when an entity moving at
/// `speed` (graph length units per second) reaches each downstream device.
///
/// Stops at the path's final device, at a hop with no recorded edge length,
/// or after `node_count` hops as a cycle guard. An empty result means the
/// path holds no successor of `start`.
pub fn predict_arrivals(
    path: &PathGraph,
    graph: &BuildingGraph,
    start: DeviceId,
    start_time: DateTime<Utc>,
    speed: f64,
) -> Vec<(DeviceId, DateTime<Utc>)> {
    let mut arrivals = Vec::new();
    if speed <= 0.0 || !speed.is_finite() {
        return arrivals;
    }

    let mut here = start;
    let mut when = start_time;
    for _ in 0..graph.node_count() {
        let next = match path.next_device(here, graph) {
            Some(n) => n,
            None => break,
        };
        let len = match graph.edge_length(here, next) {
            Some(l) => l,
            None => break,
        };
        let millis = (len / speed * 1000.0).round() as i64;
        when += Duration::milliseconds(millis);
        arrivals.push((next, when));
        here = next;
    }
    arrivals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{building::line_graph, TrackKey};

    fn walked_path() -> PathGraph {
        let mut p = PathGraph::new(TrackKey::Short(ShortTermId(1)), 1, 3);
        p.start(DeviceId(0)).unwrap();
        p.advance(DeviceId(0), DeviceId(1)).unwrap();
        p.advance(DeviceId(1), DeviceId(2)).unwrap();
        p
    }

    #[test]
    fn arrival_times_follow_edge_lengths() {
        let g = line_graph();
        let p = walked_path();
        let t0 = Utc::now();

        // speed 2.0 over edges of length 8.0 then 12.0
        let arrivals = predict_arrivals(&p, &g, DeviceId(0), t0, 2.0);
        assert_eq!(arrivals.len(), 2);
        assert_eq!(arrivals[0].0, DeviceId(1));
        assert_eq!(arrivals[0].1, t0 + Duration::milliseconds(4_000));
        assert_eq!(arrivals[1].0, DeviceId(2));
        assert_eq!(arrivals[1].1, t0 + Duration::milliseconds(10_000));
    }

    #[test]
    fn prediction_from_final_device_is_empty() {
        let g = line_graph();
        let p = walked_path();
        assert!(predict_arrivals(&p, &g, DeviceId(2), Utc::now(), 1.4).is_empty());
    }

    #[test]
    fn prediction_over_empty_path_is_empty() {
        let g = line_graph();
        let p = PathGraph::new(TrackKey::Short(ShortTermId(1)), 1, 3);
        assert!(predict_arrivals(&p, &g, DeviceId(0), Utc::now(), 1.4).is_empty());
    }

    #[test]
    fn nonpositive_speed_yields_no_arrivals() {
        let g = line_graph();
        let p = walked_path();
        assert!(predict_arrivals(&p, &g, DeviceId(0), Utc::now(), 0.0).is_empty());
        assert!(predict_arrivals(&p, &g, DeviceId(0), Utc::now(), -1.0).is_empty());
    }
}
