//! Static device-connectivity graph.
//!
//! Derived once from building geometry by an external preprocessing step
//! (flood fill over the floor plan) and consumed read-only by the path
//! graph, the particle predictor, and the attendance rule. The core never
//! parses geometry itself; it loads the already-derived description and
//! validates it before anything else runs.

use std::collections::BTreeSet;
use std::path::Path;

use crate::domain::{DeviceId, RoomId};
use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// BuildingGraph
// ---------------------------------------------------------------------------

/// Immutable device-connectivity graph.
///
/// Node indices are device indices ([`DeviceId`]). Edges are undirected hall
/// connections; `edge_lengths` is a symmetric matrix of walking distances in
/// metres; `device_doors` maps each device to the set of rooms whose
/// entry/exit it can plausibly observe.
#[derive(Debug, Clone)]
pub struct BuildingGraph {
    adjacency: Vec<BTreeSet<usize>>,
    edge_lengths: Vec<Vec<f64>>,
    device_doors: Vec<BTreeSet<RoomId>>,
}

impl BuildingGraph {
    /// Construct and validate a graph from derived data.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidGraph`] if the adjacency is asymmetric
    /// or out of range, the length matrix is not square/symmetric over the
    /// node count, an adjacent pair has a non-positive or non-finite length,
    /// or the door table does not cover every device.
    pub fn new(
        adjacency: Vec<BTreeSet<usize>>,
        edge_lengths: Vec<Vec<f64>>,
        device_doors: Vec<BTreeSet<RoomId>>,
    ) -> Result<Self, ConfigError> {
        let n = adjacency.len();

        if edge_lengths.len() != n {
            return Err(ConfigError::invalid_graph(format!(
                "edge length matrix has {} rows for {} devices",
                edge_lengths.len(),
                n
            )));
        }
        for (i, row) in edge_lengths.iter().enumerate() {
            if row.len() != n {
                return Err(ConfigError::invalid_graph(format!(
                    "edge length row {} has {} columns for {} devices",
                    i,
                    row.len(),
                    n
                )));
            }
        }
        if device_doors.len() != n {
            return Err(ConfigError::invalid_graph(format!(
                "door table covers {} of {} devices",
                device_doors.len(),
                n
            )));
        }

        for (node, neighbors) in adjacency.iter().enumerate() {
            for &next in neighbors {
                if next >= n {
                    return Err(ConfigError::invalid_graph(format!(
                        "device {} lists out-of-range neighbor {}",
                        node, next
                    )));
                }
                if !adjacency[next].contains(&node) {
                    return Err(ConfigError::invalid_graph(format!(
                        "edge {} -> {} is not symmetric",
                        node, next
                    )));
                }
                let len = edge_lengths[node][next];
                if !len.is_finite() || len <= 0.0 {
                    return Err(ConfigError::invalid_graph(format!(
                        "edge {} -> {} has invalid length {}",
                        node, next, len
                    )));
                }
                if (len - edge_lengths[next][node]).abs() > 1e-9 {
                    return Err(ConfigError::invalid_graph(format!(
                        "edge length {} <-> {} is asymmetric",
                        node, next
                    )));
                }
            }
        }

        Ok(Self {
            adjacency,
            edge_lengths,
            device_doors,
        })
    }

    /// Load a graph from a JSON description file (the preprocessing cache).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::FileRead`] if the file cannot be opened,
    /// [`ConfigError::InvalidValue`] if the JSON is malformed, and any
    /// [`ConfigError::InvalidGraph`] the validating constructor raises.
    pub fn from_json<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let desc: GraphDescription = serde_json::from_str(&contents)
            .map_err(|e| ConfigError::invalid_value("(graph file)", e.to_string()))?;
        desc.into_graph()
    }

    /// Number of devices (graph nodes).
    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Whether `device` is a node of this graph.
    pub fn contains(&self, device: DeviceId) -> bool {
        device.index() < self.adjacency.len()
    }

    /// Neighboring devices of `device`.
    pub fn neighbors(&self, device: DeviceId) -> impl Iterator<Item = DeviceId> + '_ {
        self.adjacency[device.index()].iter().map(|&i| DeviceId(i))
    }

    /// Walking distance between two adjacent devices.
    ///
    /// Returns `None` when the devices are not adjacent.
    pub fn edge_length(&self, from: DeviceId, to: DeviceId) -> Option<f64> {
        if self.adjacency[from.index()].contains(&to.index()) {
            Some(self.edge_lengths[from.index()][to.index()])
        } else {
            None
        }
    }

    /// Rooms whose doors `device` can plausibly observe.
    pub fn device_doors(&self, device: DeviceId) -> &BTreeSet<RoomId> {
        &self.device_doors[device.index()]
    }
}

// ---------------------------------------------------------------------------
// GraphDescription (serialized form)
// ---------------------------------------------------------------------------

/// On-disk form of the derived graph, written by the geometry preprocessor.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GraphDescription {
    /// Neighbor lists, one per device.
    pub edges: Vec<Vec<usize>>,
    /// Symmetric distance matrix, metres.
    pub edge_lengths: Vec<Vec<f64>>,
    /// Observable room ids, one list per device.
    pub device_doors: Vec<Vec<i64>>,
}

impl GraphDescription {
    /// Validate into a [`BuildingGraph`].
    pub fn into_graph(self) -> Result<BuildingGraph, ConfigError> {
        let adjacency = self
            .edges
            .into_iter()
            .map(|list| list.into_iter().collect())
            .collect();
        let doors = self
            .device_doors
            .into_iter()
            .map(|list| list.into_iter().map(RoomId).collect())
            .collect();
        BuildingGraph::new(adjacency, self.edge_lengths, doors)
    }
}

// ---------------------------------------------------------------------------
// Test fixture
// ---------------------------------------------------------------------------

/// Line of three devices, 0 - 1 - 2, with overlapping door sets per device.
#[cfg(test)]
pub(crate) fn line_graph() -> BuildingGraph {
    let adjacency = vec![
        BTreeSet::from([1]),
        BTreeSet::from([0, 2]),
        BTreeSet::from([1]),
    ];
    let mut lengths = vec![vec![0.0; 3]; 3];
    lengths[0][1] = 8.0;
    lengths[1][0] = 8.0;
    lengths[1][2] = 12.0;
    lengths[2][1] = 12.0;
    let doors = vec![
        BTreeSet::from([RoomId(100)]),
        BTreeSet::from([RoomId(100), RoomId(200)]),
        BTreeSet::from([RoomId(200), RoomId(300)]),
    ];
    BuildingGraph::new(adjacency, lengths, doors).unwrap()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
