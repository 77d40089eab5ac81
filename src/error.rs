//! Error types for the facetrack core.
//!
//! This module is the single source of truth for all error types in the
//! crate. Every module that produces an error imports its error type from
//! here rather than defining it inline, keeping the error hierarchy
//! centralised and consistent.
//!
//! ## Hierarchy
//!
//! ```text
//! TrackError (top-level)
//! ├── ConfigError   (configuration validation / static-input loading)
//! ├── FeatureError  (distance / fusion numerics)
//! ├── PathError     (depth-vector operations)
//! └── StoreError    (persistence collaborator)
//! ```
//!
//! Configuration errors are fatal at startup: the engine must never run
//! against an uninitialized graph or sensor-noise covariance. Feature errors
//! during a candidate scan are recovered locally (the candidate is skipped);
//! store errors abort the current update so it stays pending for retry.

use std::path::PathBuf;
use thiserror::Error;

// ---------------------------------------------------------------------------
// TrackResult
// ---------------------------------------------------------------------------

/// Convenient `Result` alias used by orchestration-level functions.
pub type TrackResult<T> = Result<T, TrackError>;

// ---------------------------------------------------------------------------
// TrackError (top-level aggregator)
// ---------------------------------------------------------------------------

/// Top-level error type for the facetrack core.
///
/// Orchestration-level functions ([`crate::tracking::MatchEngine`],
/// [`crate::lifecycle::RolloverEngine`]) return `TrackResult<T>`. Lower-level
/// functions return their own module-specific error types which are
/// automatically coerced via [`From`].
#[derive(Debug, Error)]
pub enum TrackError {
    /// A configuration validation or static-input loading error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A feature-math error that could not be recovered locally.
    #[error("Feature math error: {0}")]
    Feature(#[from] FeatureError),

    /// A path-graph depth-vector operation failed.
    #[error("Path graph error: {0}")]
    Path(#[from] PathError),

    /// A persistence operation failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A back-reference pointed at a state the store no longer holds.
    #[error("Dangling reference: {kind} with id {id} not found")]
    DanglingReference {
        /// Kind of the missing record.
        kind: &'static str,
        /// Identifier that failed to resolve.
        id: i64,
    },
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors raised while validating configuration or loading the static inputs
/// (sensor-noise covariance, device-connectivity graph).
///
/// All of these are fatal: the process must not start matching updates with
/// a partially initialized static context.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration field holds an invalid value.
    #[error("Invalid value for `{field}`: {reason}")]
    InvalidValue {
        /// Name of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// A static-input file could not be read.
    #[error("Failed to read {path:?}: {source}")]
    FileRead {
        /// Path that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A delimited numeric file did not parse.
    #[error("Malformed numeric input at {path:?}, line {line}: {reason}")]
    MalformedNumeric {
        /// Path that was being parsed.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// Parse failure description.
        reason: String,
    },

    /// The sensor-noise covariance had the wrong shape.
    #[error("Covariance dimension mismatch: expected {expected}x{expected}, got {rows}x{cols}")]
    CovarianceDimension {
        /// Required dimension (the feature-vector length).
        expected: usize,
        /// Number of rows found.
        rows: usize,
        /// Number of columns found (in the first offending row).
        cols: usize,
    },

    /// The device-connectivity graph description is internally inconsistent.
    #[error("Invalid device graph: {reason}")]
    InvalidGraph {
        /// What consistency check failed.
        reason: String,
    },
}

impl ConfigError {
    /// Construct a [`ConfigError::InvalidValue`].
    pub fn invalid_value(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field,
            reason: reason.into(),
        }
    }

    /// Construct a [`ConfigError::InvalidGraph`].
    pub fn invalid_graph(reason: impl Into<String>) -> Self {
        ConfigError::InvalidGraph {
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// FeatureError
// ---------------------------------------------------------------------------

/// Errors from the distance metric and covariance fusion.
///
/// During a candidate scan, [`FeatureError::NonFiniteDistance`] and
/// [`FeatureError::ZeroDistance`] exclude the offending pair and the scan
/// continues over the remaining pool; they never abort the whole update.
#[derive(Debug, Error, PartialEq)]
pub enum FeatureError {
    /// The computed distance was NaN or infinite.
    #[error("Distance is not finite")]
    NonFiniteDistance,

    /// The computed distance was exactly zero, which signals a duplicate
    /// observation or a self-comparison rather than a genuine match.
    #[error("Distance is exactly zero (duplicate or self-comparison)")]
    ZeroDistance,

    /// Two feature vectors or covariance matrices disagreed on dimension.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Actual dimension.
        actual: usize,
    },

    /// The innovation covariance could not be inverted.
    #[error("Covariance matrix is singular or near-singular")]
    SingularCovariance,
}

// ---------------------------------------------------------------------------
// PathError
// ---------------------------------------------------------------------------

/// Errors from per-track path-graph operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    /// Two depth vectors being fused cover different node counts.
    #[error("Depth vector length mismatch: expected {expected}, got {actual}")]
    LengthMismatch {
        /// Node count of the receiving path.
        expected: usize,
        /// Node count of the other path.
        actual: usize,
    },

    /// A device index is outside the graph's node range.
    #[error("Device {node} is out of range for a graph of {nodes} nodes")]
    NodeOutOfRange {
        /// The offending node index.
        node: usize,
        /// Total node count.
        nodes: usize,
    },
}

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Errors from the persistent-store collaborator.
///
/// A store failure must never corrupt in-memory match results: the engine
/// aborts the current update and leaves it pending for an idempotent retry.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A record with the given key does not exist.
    #[error("{kind} with id {id} not found")]
    NotFound {
        /// Kind of the missing record.
        kind: &'static str,
        /// Key that missed.
        id: i64,
    },

    /// A long-term state's identity was already bound to a different student.
    ///
    /// `studentId` is set exactly once; re-asserting the same binding is a
    /// no-op, a conflicting one is this error.
    #[error("Long-term state {id} is already bound to student {existing}")]
    IdentityAlreadySet {
        /// Long-term state key.
        id: i64,
        /// The student it is already bound to.
        existing: i64,
    },

    /// The backing store rejected or failed the operation.
    #[error("Store backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    /// Construct a [`StoreError::NotFound`].
    pub fn not_found(kind: &'static str, id: i64) -> Self {
        StoreError::NotFound { kind, id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display_names_the_field() {
        let err = ConfigError::invalid_value("matching_threshold", "must be > 0.0");
        assert!(err.to_string().contains("matching_threshold"));
    }

    #[test]
    fn feature_error_coerces_into_track_error() {
        fn fails() -> TrackResult<()> {
            Err(FeatureError::ZeroDistance)?
        }
        assert!(matches!(fails(), Err(TrackError::Feature(_))));
    }

    #[test]
    fn covariance_dimension_reports_shape() {
        let err = ConfigError::CovarianceDimension {
            expected: 128,
            rows: 127,
            cols: 128,
        };
        let msg = err.to_string();
        assert!(msg.contains("128x128"));
        assert!(msg.contains("127x128"));
    }
}
