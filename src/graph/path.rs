//! Per-track visitation paths over the device graph.
//!
//! A [`PathGraph`] records the order in which one tracked entity was seen at
//! devices during one period. The encoding is a depth vector indexed by graph
//! node: unvisited nodes hold `0`, the first visited node holds `-1`, and
//! each later sighting holds one less than the node it was reached from, so
//! later visits are strictly more negative. The most recently visited device
//! is therefore the minimum entry, and the successor of a node in the
//! recorded traversal is the neighbor whose depth is exactly one less.
//!
//! Fusing two paths is an element-wise sum of their depth vectors. The sum
//! mixes magnitudes across unrelated segments, so no monotonic-path property
//! is guaranteed for a fused vector; only idempotence under repeated
//! identical fuses is relied on elsewhere.

use crate::domain::{DeviceId, LongTermId, ShortTermId};
use crate::error::PathError;

use super::building::BuildingGraph;

// ---------------------------------------------------------------------------
// TrackKey
// ---------------------------------------------------------------------------

/// Owner of a path record: exactly one of a short-term or long-term state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum TrackKey {
    /// A within-day track.
    Short(ShortTermId),
    /// A cross-day cumulative record.
    Long(LongTermId),
}

impl std::fmt::Display for TrackKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackKey::Short(id) => write!(f, "sts:{}", id),
            TrackKey::Long(id) => write!(f, "lts:{}", id),
        }
    }
}

// ---------------------------------------------------------------------------
// PathGraph
// ---------------------------------------------------------------------------

/// One entity's device-visitation record for one period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathGraph {
    /// Owning track.
    pub key: TrackKey,
    /// 1-based period this path belongs to.
    pub period: u8,
    depths: Vec<i32>,
}

impl PathGraph {
    /// Empty path over a graph of `node_count` devices.
    pub fn new(key: TrackKey, period: u8, node_count: usize) -> Self {
        Self {
            key,
            period,
            depths: vec![0; node_count],
        }
    }

    /// Rebuild a path from a stored depth vector.
    pub fn from_depths(key: TrackKey, period: u8, depths: Vec<i32>) -> Self {
        Self {
            key,
            period,
            depths,
        }
    }

    /// The raw depth vector.
    pub fn depths(&self) -> &[i32] {
        &self.depths
    }

    /// `true` when no device has been visited yet.
    pub fn is_empty(&self) -> bool {
        self.depths.iter().all(|&d| d == 0)
    }

    /// Mark `node` as the first visited device.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::NodeOutOfRange`] if `node` is not a graph node.
    pub fn start(&mut self, node: DeviceId) -> Result<(), PathError> {
        let i = self.check(node)?;
        self.depths[i] = -1;
        Ok(())
    }

    /// Record a hop: `next` was visited immediately after `last`.
    ///
    /// `depths[next] = depths[last] - 1`, extending the strictly decreasing
    /// sequence along the observed path.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::NodeOutOfRange`] if either index is out of range.
    pub fn advance(&mut self, last: DeviceId, next: DeviceId) -> Result<(), PathError> {
        let last_i = self.check(last)?;
        let next_i = self.check(next)?;
        self.depths[next_i] = self.depths[last_i] - 1;
        Ok(())
    }

    /// Merge another path record into this one by element-wise sum.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::LengthMismatch`] if the vectors cover different
    /// node counts.
    pub fn fuse(&mut self, other: &PathGraph) -> Result<(), PathError> {
        if other.depths.len() != self.depths.len() {
            return Err(PathError::LengthMismatch {
                expected: self.depths.len(),
                actual: other.depths.len(),
            });
        }
        for (d, o) in self.depths.iter_mut().zip(other.depths.iter()) {
            *d += o;
        }
        Ok(())
    }

    /// The most recently visited device: the node with the minimum (most
    /// negative) depth, or `None` for an empty path.
    pub fn final_device(&self) -> Option<DeviceId> {
        self.depths
            .iter()
            .enumerate()
            .filter(|(_, &d)| d < 0)
            .min_by_key(|(_, &d)| d)
            .map(|(i, _)| DeviceId(i))
    }

    /// Depth recorded at `node` (`0` = unvisited).
    pub fn depth(&self, node: DeviceId) -> Option<i32> {
        self.depths.get(node.index()).copied()
    }

    /// The device reached immediately after `node` in the recorded
    /// traversal: the neighbor of `node` whose depth is exactly one less.
    ///
    /// Returns `None` when `node` was unvisited, is the final device, or the
    /// depth ordering has no matching neighbor (possible after fusing).
    pub fn next_device(&self, node: DeviceId, graph: &BuildingGraph) -> Option<DeviceId> {
        let here = *self.depths.get(node.index())?;
        if here >= 0 {
            return None;
        }
        graph
            .neighbors(node)
            .find(|n| self.depths.get(n.index()) == Some(&(here - 1)))
    }

    /// Clone this record under a different owner (short-term day path folded
    /// into a long-term key).
    pub fn rekeyed(&self, key: TrackKey) -> PathGraph {
        PathGraph {
            key,
            period: self.period,
            depths: self.depths.clone(),
        }
    }

    fn check(&self, node: DeviceId) -> Result<usize, PathError> {
        if node.index() < self.depths.len() {
            Ok(node.index())
        } else {
            Err(PathError::NodeOutOfRange {
                node: node.index(),
                nodes: self.depths.len(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::building::line_graph;

    fn path() -> PathGraph {
        PathGraph::new(TrackKey::Short(ShortTermId(1)), 1, 3)
    }

    #[test]
    fn depths_decrease_along_the_walk() {
        let mut p = path();
        p.start(DeviceId(0)).unwrap();
        p.advance(DeviceId(0), DeviceId(1)).unwrap();
        p.advance(DeviceId(1), DeviceId(2)).unwrap();

        let d0 = p.depth(DeviceId(0)).unwrap();
        let d1 = p.depth(DeviceId(1)).unwrap();
        let d2 = p.depth(DeviceId(2)).unwrap();
        assert!(
            d0 > d1 && d1 > d2,
            "depths must strictly decrease: {} {} {}",
            d0,
            d1,
            d2
        );
        assert_eq!(p.final_device(), Some(DeviceId(2)));
    }

    #[test]
    fn empty_path_has_no_final_device() {
        let p = path();
        assert!(p.is_empty());
        assert_eq!(p.final_device(), None);
    }

    #[test]
    fn next_device_follows_depth_ordering() {
        let g = line_graph();
        let mut p = path();
        p.start(DeviceId(0)).unwrap();
        p.advance(DeviceId(0), DeviceId(1)).unwrap();
        p.advance(DeviceId(1), DeviceId(2)).unwrap();

        assert_eq!(p.next_device(DeviceId(0), &g), Some(DeviceId(1)));
        assert_eq!(p.next_device(DeviceId(1), &g), Some(DeviceId(2)));
        assert_eq!(p.next_device(DeviceId(2), &g), None, "final has no next");
    }

    #[test]
    fn next_device_of_unvisited_node_is_none() {
        let g = line_graph();
        let mut p = path();
        p.start(DeviceId(0)).unwrap();
        assert_eq!(p.next_device(DeviceId(1), &g), None);
    }

    /// The additive fuse rule guarantees nothing beyond element-wise sums:
    /// fusing the same vector twice doubles it, and fusing an empty path is
    /// the identity. Only the latter is relied on by rollover.
    #[test]
    fn fusing_an_empty_path_is_identity() {
        let mut p = path();
        p.start(DeviceId(0)).unwrap();
        p.advance(DeviceId(0), DeviceId(1)).unwrap();
        let before = p.depths().to_vec();

        let empty = path();
        p.fuse(&empty).unwrap();
        assert_eq!(p.depths(), &before[..]);
    }

    #[test]
    fn repeated_identical_fuse_is_elementwise_sum() {
        let mut walked = path();
        walked.start(DeviceId(0)).unwrap();
        walked.advance(DeviceId(0), DeviceId(1)).unwrap();

        let mut acc = path();
        acc.fuse(&walked).unwrap();
        let once = acc.depths().to_vec();
        acc.fuse(&walked).unwrap();

        for (i, (&a, &b)) in acc.depths().iter().zip(once.iter()).enumerate() {
            assert_eq!(a, 2 * b, "entry {} should double under identical fuse", i);
        }
    }

    #[test]
    fn fuse_rejects_length_mismatch() {
        let mut p = path();
        let other = PathGraph::new(TrackKey::Short(ShortTermId(2)), 1, 5);
        assert_eq!(
            p.fuse(&other),
            Err(PathError::LengthMismatch {
                expected: 3,
                actual: 5
            })
        );
    }

    #[test]
    fn out_of_range_node_is_rejected() {
        let mut p = path();
        assert!(matches!(
            p.start(DeviceId(9)),
            Err(PathError::NodeOutOfRange { node: 9, nodes: 3 })
        ));
    }
}
