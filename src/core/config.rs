//! Configuration system: TOML file + programmatic defaults.

#![allow(missing_docs)]

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{GeoFixError, Result};

/// Full configuration model for the geospatial error-correction core.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub decision: DecisionConfig,
    pub geometry: GeometryConfig,
    pub validator: ValidatorConfig,
}

/// Decision-engine thresholds (`spec.md` §4.2, §6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DecisionConfig {
    /// Minimum rule confidence to emit a strategy with tier `rule`.
    pub auto_fix_min: f64,
    /// Minimum oracle confidence to emit a strategy with tier `oracle`.
    pub llm_fix_min: f64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            auto_fix_min: 0.80,
            llm_fix_min: 0.60,
        }
    }
}

/// Geometric thresholds used by the detector and built-in rules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeometryConfig {
    pub sliver_max_area_m2: f64,
    pub min_building_area_m2: f64,
    pub max_building_area_m2: f64,
    pub road_snap_distance_m: f64,
    pub boundary_clip_buffer_m: f64,
    pub duplicate_ratio_min: f64,
    pub partial_ratio_min: f64,
    /// Minimum isoperimetric quotient (`4πA/P²`) before `low_compactness` fires.
    pub min_compactness: f64,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            sliver_max_area_m2: 1.0,
            min_building_area_m2: 4.0,
            max_building_area_m2: 50_000.0,
            road_snap_distance_m: 2.0,
            boundary_clip_buffer_m: 0.5,
            duplicate_ratio_min: 0.98,
            partial_ratio_min: 0.30,
            min_compactness: 0.05,
        }
    }
}

/// Post-fix validation bounds (`spec.md` §4.4).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ValidatorConfig {
    pub min_area_m2: f64,
    pub max_area_ratio_change: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            min_area_m2: 0.5,
            max_area_ratio_change: 5.0,
        }
    }
}

impl Config {
    /// Default configuration file path, mirroring the CLI's `--config` flag
    /// resolution convention.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathBuf::from("geofix.toml")
    }

    /// Load config from an explicit path, the `GEOFIX_CONFIG` environment
    /// variable, or built-in defaults, in that order. A missing file at the
    /// default path is not an error; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = if path.is_none() {
            env::var_os("GEOFIX_CONFIG").map(PathBuf::from)
        } else {
            None
        };
        let effective = path.map_or_else(
            || env_path.unwrap_or_else(Self::default_path),
            Path::to_path_buf,
        );

        if !effective.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(&effective).map_err(|source| {
            GeoFixError::io(&effective, source)
        })?;
        let config: Self = toml::from_str(&raw)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = Config::default();
        assert!((cfg.decision.auto_fix_min - 0.80).abs() < f64::EPSILON);
        assert!((cfg.decision.llm_fix_min - 0.60).abs() < f64::EPSILON);
        assert!((cfg.geometry.sliver_max_area_m2 - 1.0).abs() < f64::EPSILON);
        assert!((cfg.geometry.min_building_area_m2 - 4.0).abs() < f64::EPSILON);
        assert!((cfg.geometry.max_building_area_m2 - 50_000.0).abs() < f64::EPSILON);
        assert!((cfg.geometry.road_snap_distance_m - 2.0).abs() < f64::EPSILON);
        assert!((cfg.geometry.boundary_clip_buffer_m - 0.5).abs() < f64::EPSILON);
        assert!((cfg.geometry.duplicate_ratio_min - 0.98).abs() < f64::EPSILON);
        assert!((cfg.geometry.partial_ratio_min - 0.30).abs() < f64::EPSILON);
        assert!((cfg.validator.min_area_m2 - 0.5).abs() < f64::EPSILON);
        assert!((cfg.validator.max_area_ratio_change - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = Config::load(Some(Path::new("/nonexistent/geofix.toml"))).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn loads_partial_toml_with_field_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("geofix.toml");
        std::fs::write(&path, "[decision]\nauto_fix_min = 0.9\n").unwrap();
        let cfg = Config::load(Some(&path)).unwrap();
        assert!((cfg.decision.auto_fix_min - 0.9).abs() < f64::EPSILON);
        assert!((cfg.decision.llm_fix_min - 0.60).abs() < f64::EPSILON);
    }
}
