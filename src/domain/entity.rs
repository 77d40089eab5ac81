//! Entity state records: observations and identity hypotheses.
//!
//! Three distinct structs share the feature-bearing shape through the
//! [`FeatureBearing`] trait rather than a common mutable base:
//!
//! - **[`Update`]**: a single immutable sensor observation
//! - **[`ShortTermState`]**: an ephemeral within-day identity hypothesis
//! - **[`LongTermState`]**: a persistent cross-day identity hypothesis
//!
//! Short-term states reference their long-term anchor by plain key
//! ([`LongTermId`]) resolved through the store, never by owning pointer; the
//! relationship is many short-term states (over time) to one long-term state.

use uuid::Uuid;

use super::feature::{FeatureCovariance, FeatureEstimate, FeatureVector};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Identifier of a single sensor observation, allocated by the sensing
/// collaborator at capture time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct UpdateId(Uuid);

impl UpdateId {
    /// Allocate a new random update id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Borrow the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UpdateId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UpdateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! store_key {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
        )]
        pub struct $name(pub i64);

        impl $name {
            /// The raw store key.
            pub fn value(&self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

store_key!(
    /// Store-allocated key of a short-term state.
    ShortTermId
);
store_key!(
    /// Store-allocated key of a long-term state.
    LongTermId
);
store_key!(
    /// Identifier of a known student.
    StudentId
);
store_key!(
    /// Identifier of a room (door) in the building.
    RoomId
);

/// Index of a sensing device, doubling as its node index in the
/// device-connectivity graph.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct DeviceId(pub usize);

impl DeviceId {
    /// Graph node index of this device.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// FeatureBearing
// ---------------------------------------------------------------------------

/// Shared capability of every record that carries a feature belief.
pub trait FeatureBearing {
    /// The (mean) feature vector.
    fn feature_mean(&self) -> &FeatureVector;

    /// The covariance attached to the feature vector.
    fn feature_covariance(&self) -> &FeatureCovariance;

    /// Both together, cloned into an estimate.
    fn estimate(&self) -> FeatureEstimate {
        FeatureEstimate::new(self.feature_mean().clone(), self.feature_covariance().clone())
    }
}

// ---------------------------------------------------------------------------
// Update
// ---------------------------------------------------------------------------

/// A single sensor observation of a face at a device.
///
/// Immutable once created; consumed by the matching engine and either
/// archived (resolved against a short-term state) or left pending for retry.
#[derive(Debug, Clone)]
pub struct Update {
    /// Observation id from the sensing collaborator.
    pub id: UpdateId,
    /// Device that produced the observation.
    pub device: DeviceId,
    /// Observed feature vector.
    pub features: FeatureVector,
    /// Observation covariance; defaults to the startup sensor-noise matrix.
    pub covariance: FeatureCovariance,
    /// Period the observation was resolved in; `None` until assigned.
    pub period: Option<u8>,
}

impl Update {
    /// Construct an observation with an explicit covariance.
    pub fn new(device: DeviceId, features: FeatureVector, covariance: FeatureCovariance) -> Self {
        Self {
            id: UpdateId::new(),
            device,
            features,
            covariance,
            period: None,
        }
    }
}

impl FeatureBearing for Update {
    fn feature_mean(&self) -> &FeatureVector {
        &self.features
    }

    fn feature_covariance(&self) -> &FeatureCovariance {
        &self.covariance
    }
}

// ---------------------------------------------------------------------------
// ShortTermState
// ---------------------------------------------------------------------------

/// An ephemeral within-day identity hypothesis.
///
/// Seeded from the first unmatched [`Update`], fused in place on every later
/// match, and cleared at day rollover after promotion or merge into a
/// [`LongTermState`]. Invariant: `update_count >= 1`.
#[derive(Debug, Clone)]
pub struct ShortTermState {
    /// Store key.
    pub id: ShortTermId,
    /// Fused mean feature vector.
    pub mean: FeatureVector,
    /// Covariance of the fused mean.
    pub covariance: FeatureCovariance,
    /// Number of observations fused into this state.
    pub update_count: u32,
    /// Device of the most recent matched observation.
    pub last_device: DeviceId,
    /// Id of the most recent observation fused into this state. A retried
    /// observation carrying this id is skipped, so a crash between the state
    /// write and the update's archival never fuses the same observation
    /// twice.
    pub last_update: Option<UpdateId>,
    /// Back-reference to the anchoring long-term state, if matched.
    pub long_term_key: Option<LongTermId>,
}

impl FeatureBearing for ShortTermState {
    fn feature_mean(&self) -> &FeatureVector {
        &self.mean
    }

    fn feature_covariance(&self) -> &FeatureCovariance {
        &self.covariance
    }
}

// ---------------------------------------------------------------------------
// LongTermState
// ---------------------------------------------------------------------------

/// A persistent cross-day identity hypothesis, eventually bound to a student.
///
/// Created by promotion of a sufficiently-observed short-term state (or
/// explicitly), refined by day-rollover fusion, and never cleared.
/// `student` is set exactly once and is thereafter immutable.
#[derive(Debug, Clone)]
pub struct LongTermState {
    /// Store key.
    pub id: LongTermId,
    /// Fused mean feature vector.
    pub mean: FeatureVector,
    /// Covariance of the fused mean.
    pub covariance: FeatureCovariance,
    /// Resolved student identity; `None` until the schedule resolver binds it.
    pub student: Option<StudentId>,
}

impl FeatureBearing for LongTermState {
    fn feature_mean(&self) -> &FeatureVector {
        &self.mean
    }

    fn feature_covariance(&self) -> &FeatureCovariance {
        &self.covariance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};

    fn small_update() -> Update {
        Update::new(DeviceId(3), Array1::zeros(4), Array2::eye(4))
    }

    #[test]
    fn update_ids_are_unique() {
        let a = small_update();
        let b = small_update();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn update_starts_without_period() {
        let u = small_update();
        assert_eq!(u.period, None);
    }

    #[test]
    fn estimate_clones_both_parts() {
        let u = small_update();
        let est = u.estimate();
        assert_eq!(est.mean.len(), 4);
        assert_eq!(est.covariance.nrows(), 4);
    }
}
