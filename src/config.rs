//! Engine configuration and one-time static inputs.
//!
//! Two things are loaded once at startup and never mutated afterwards: the
//! [`EngineConfig`] knobs and the static inputs (device graph, sensor-noise
//! covariance) bundled into an [`EngineContext`]. Every component borrows the
//! context; nothing in the crate reads global state.

use std::fs;
use std::path::Path;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::domain::{
    DeviceId, FeatureCovariance, FeatureVector, Update, FEATURE_DIM, PERIODS_PER_DAY,
};
use crate::error::ConfigError;
use crate::graph::BuildingGraph;

/// Tunable parameters of the matching engine and lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Feature-vector dimensionality. Every update, covariance, and stored
    /// state must agree with this.
    pub feature_dim: usize,

    /// Squared-distance match threshold. A candidate matches only when its
    /// distance is strictly below this value.
    pub matching_threshold: f64,

    /// A short-term state is promoted to long-term at day rollover when its
    /// update count exceeds this value.
    pub promotion_min_updates: u32,

    /// Identity resolution runs at day rollover only for tracks with more
    /// observations than this.
    pub min_resolve_updates: u32,

    /// Periods per day; the period counter wraps back to 1 past this.
    pub periods_per_day: u8,

    /// Nominal walking speed in graph length units per second, used for
    /// arrival prediction.
    pub traversal_speed: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            feature_dim: FEATURE_DIM,
            matching_threshold: 0.36,
            promotion_min_updates: 2,
            min_resolve_updates: 1,
            periods_per_day: PERIODS_PER_DAY,
            traversal_speed: 1.4,
        }
    }
}

impl EngineConfig {
    /// Check every invariant, reporting the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.feature_dim == 0 {
            return Err(ConfigError::invalid_value(
                "feature_dim",
                "must be positive",
            ));
        }
        if !self.matching_threshold.is_finite() || self.matching_threshold <= 0.0 {
            return Err(ConfigError::invalid_value(
                "matching_threshold",
                "must be finite and positive",
            ));
        }
        if self.periods_per_day == 0 {
            return Err(ConfigError::invalid_value(
                "periods_per_day",
                "must be positive",
            ));
        }
        if !self.traversal_speed.is_finite() || self.traversal_speed <= 0.0 {
            return Err(ConfigError::invalid_value(
                "traversal_speed",
                "must be finite and positive",
            ));
        }
        Ok(())
    }

    /// Load and validate a configuration from a JSON file.
    pub fn from_json<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            ConfigError::invalid_value("config", format!("malformed JSON: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize for inspection or round-tripping.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

/// Load the sensor-noise covariance from a comma-delimited numeric file.
///
/// The file must hold exactly `dim` rows of `dim` values each; anything else
/// fails the load. Blank lines are ignored.
pub fn load_covariance<P: AsRef<Path>>(
    path: P,
    dim: usize,
) -> Result<FeatureCovariance, ConfigError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;

    let mut rows: Vec<Vec<f64>> = Vec::with_capacity(dim);
    for (line_no, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let mut row = Vec::with_capacity(dim);
        for field in line.split(',') {
            let value: f64 =
                field
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::MalformedNumeric {
                        path: path.to_path_buf(),
                        line: line_no + 1,
                        reason: format!("cannot parse {:?} as a number", field.trim()),
                    })?;
            row.push(value);
        }
        if row.len() != dim {
            return Err(ConfigError::CovarianceDimension {
                expected: dim,
                rows: rows.len() + 1,
                cols: row.len(),
            });
        }
        rows.push(row);
    }
    if rows.len() != dim {
        return Err(ConfigError::CovarianceDimension {
            expected: dim,
            rows: rows.len(),
            cols: dim,
        });
    }

    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((dim, dim), flat).map_err(|e| {
        ConfigError::invalid_value("sensor covariance", format!("shape error: {}", e))
    })
}

/// Immutable bundle of everything initialized once at startup.
#[derive(Debug)]
pub struct EngineContext {
    pub config: EngineConfig,
    pub graph: BuildingGraph,
    /// Observation-noise covariance applied to raw updates that carry none
    /// of their own.
    pub sensor_noise: FeatureCovariance,
}

impl EngineContext {
    /// Validate the pieces against each other and freeze them.
    ///
    /// # Errors
    ///
    /// Fails when the config is invalid or the covariance dimension does not
    /// match `config.feature_dim`.
    pub fn initialize(
        config: EngineConfig,
        graph: BuildingGraph,
        sensor_noise: FeatureCovariance,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let (rows, cols) = (sensor_noise.nrows(), sensor_noise.ncols());
        if rows != config.feature_dim || cols != config.feature_dim {
            return Err(ConfigError::CovarianceDimension {
                expected: config.feature_dim,
                rows,
                cols,
            });
        }
        Ok(Self {
            config,
            graph,
            sensor_noise,
        })
    }

    /// Build an update for a raw observation, attaching the startup
    /// sensor-noise covariance as its observation noise.
    pub fn observation(&self, device: DeviceId, features: FeatureVector) -> Update {
        Update::new(device, features, self.sensor_noise.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_threshold_is_rejected() {
        let config = EngineConfig {
            matching_threshold: 0.0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "matching_threshold"
        ));
    }

    #[test]
    fn config_json_round_trip() {
        let config = EngineConfig {
            matching_threshold: 0.5,
            ..EngineConfig::default()
        };
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.to_json().as_bytes()).unwrap();

        let loaded = EngineConfig::from_json(file.path()).unwrap();
        assert_eq!(loaded.matching_threshold, 0.5);
        assert_eq!(loaded.feature_dim, FEATURE_DIM);
    }

    #[test]
    fn covariance_loads_with_exact_dimensions() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "1.0, 0.0").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "0.0, 2.0").unwrap();

        let cov = load_covariance(file.path(), 2).unwrap();
        assert_eq!(cov[[0, 0]], 1.0);
        assert_eq!(cov[[1, 1]], 2.0);
    }

    #[test]
    fn covariance_row_count_mismatch_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "1.0, 0.0").unwrap();

        let err = load_covariance(file.path(), 2).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::CovarianceDimension {
                expected: 2,
                rows: 1,
                ..
            }
        ));
    }

    #[test]
    fn covariance_rejects_garbage_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "1.0, oops").unwrap();
        writeln!(file, "0.0, 1.0").unwrap();

        let err = load_covariance(file.path(), 2).unwrap_err();
        assert!(matches!(err, ConfigError::MalformedNumeric { line: 1, .. }));
    }

    #[test]
    fn context_rejects_mismatched_covariance() {
        let config = EngineConfig {
            feature_dim: 4,
            ..EngineConfig::default()
        };
        let graph = test_graph();
        let err = EngineContext::initialize(config, graph, Array2::eye(3)).unwrap_err();
        assert!(matches!(err, ConfigError::CovarianceDimension { .. }));
    }

    fn test_graph() -> BuildingGraph {
        crate::graph::building::line_graph()
    }
}
