//! GFX-prefixed error types with structured error codes.

#![allow(missing_docs)]

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, GeoFixError>;

/// Top-level error type for the geospatial error-correction core.
///
/// Variants are grouped by the failure taxonomy: `1xxx` input, `2xxx`
/// detector, `3xxx` decision (rule/oracle), `4xxx` fix, `5xxx` audit.
#[derive(Debug, Error)]
pub enum GeoFixError {
    #[error("[GFX-1001] malformed geometry for feature {feature_id}: {details}")]
    InvalidGeometry { feature_id: String, details: String },

    #[error("[GFX-1002] duplicate feature id: {feature_id}")]
    DuplicateFeatureId { feature_id: String },

    #[error("[GFX-1003] unknown coordinate reference: {details}")]
    UnknownCrs { details: String },

    #[error("[GFX-1004] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[GFX-1005] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[GFX-2001] spatial predicate failed for feature {feature_id}: {details}")]
    DetectorFailure { feature_id: String, details: String },

    #[error("[GFX-3001] rule function panicked: {rule}")]
    RuleError { rule: &'static str },

    #[error("[GFX-3002] oracle consultation failed: {details}")]
    OracleError { details: String },

    #[error("[GFX-3003] oracle timed out after {millis} ms")]
    OracleTimeout { millis: u64 },

    #[error("[GFX-4001] fix execution failed for {fix_kind}: {details}")]
    FixError {
        fix_kind: &'static str,
        details: String,
    },

    #[error("[GFX-4002] fix validation rejected result: {reason}")]
    FixValidationFailed { reason: String },

    #[error("[GFX-5001] audit write failure: {details}")]
    AuditWrite { details: String },

    #[error("[GFX-5002] audit query failure: {details}")]
    AuditQuery { details: String },

    #[error("[GFX-5101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[GFX-5102] IO failure at {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl GeoFixError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidGeometry { .. } => "GFX-1001",
            Self::DuplicateFeatureId { .. } => "GFX-1002",
            Self::UnknownCrs { .. } => "GFX-1003",
            Self::ConfigParse { .. } => "GFX-1004",
            Self::InvalidConfig { .. } => "GFX-1005",
            Self::DetectorFailure { .. } => "GFX-2001",
            Self::RuleError { .. } => "GFX-3001",
            Self::OracleError { .. } => "GFX-3002",
            Self::OracleTimeout { .. } => "GFX-3003",
            Self::FixError { .. } => "GFX-4001",
            Self::FixValidationFailed { .. } => "GFX-4002",
            Self::AuditWrite { .. } => "GFX-5001",
            Self::AuditQuery { .. } => "GFX-5002",
            Self::Serialization { .. } => "GFX-5101",
            Self::Io { .. } => "GFX-5102",
        }
    }

    /// Whether this failure is fatal to the whole pipeline invocation, as
    /// opposed to one that is recovered locally or at a tier boundary.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidGeometry { .. }
                | Self::DuplicateFeatureId { .. }
                | Self::UnknownCrs { .. }
                | Self::ConfigParse { .. }
                | Self::InvalidConfig { .. }
                | Self::AuditWrite { .. }
                | Self::AuditQuery { .. }
                | Self::Io { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for GeoFixError {
    fn from(value: rusqlite::Error) -> Self {
        Self::AuditWrite {
            details: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for GeoFixError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for GeoFixError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_variants() -> Vec<GeoFixError> {
        vec![
            GeoFixError::InvalidGeometry {
                feature_id: String::new(),
                details: String::new(),
            },
            GeoFixError::DuplicateFeatureId {
                feature_id: String::new(),
            },
            GeoFixError::UnknownCrs {
                details: String::new(),
            },
            GeoFixError::ConfigParse {
                context: "",
                details: String::new(),
            },
            GeoFixError::InvalidConfig {
                details: String::new(),
            },
            GeoFixError::DetectorFailure {
                feature_id: String::new(),
                details: String::new(),
            },
            GeoFixError::RuleError { rule: "" },
            GeoFixError::OracleError {
                details: String::new(),
            },
            GeoFixError::OracleTimeout { millis: 0 },
            GeoFixError::FixError {
                fix_kind: "",
                details: String::new(),
            },
            GeoFixError::FixValidationFailed {
                reason: String::new(),
            },
            GeoFixError::AuditWrite {
                details: String::new(),
            },
            GeoFixError::AuditQuery {
                details: String::new(),
            },
            GeoFixError::Serialization {
                context: "",
                details: String::new(),
            },
            GeoFixError::Io {
                path: std::path::PathBuf::new(),
                source: std::io::Error::other("test"),
            },
        ]
    }

    #[test]
    fn error_codes_are_unique() {
        let codes: Vec<&str> = all_variants().iter().map(GeoFixError::code).collect();
        let unique: std::collections::HashSet<&&str> = codes.iter().collect();
        assert_eq!(codes.len(), unique.len(), "codes must be unique: {codes:?}");
    }

    #[test]
    fn error_codes_have_gfx_prefix() {
        for err in all_variants() {
            assert!(err.code().starts_with("GFX-"));
        }
    }

    #[test]
    fn error_display_includes_code() {
        let err = GeoFixError::InvalidConfig {
            details: "bad value".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("GFX-1005"));
        assert!(msg.contains("bad value"));
    }

    #[test]
    fn fatal_classification_matches_taxonomy() {
        assert!(
            GeoFixError::InvalidGeometry {
                feature_id: String::new(),
                details: String::new()
            }
            .is_fatal()
        );
        assert!(
            GeoFixError::AuditWrite {
                details: String::new()
            }
            .is_fatal()
        );
        assert!(!GeoFixError::RuleError { rule: "x" }.is_fatal());
        assert!(!GeoFixError::OracleTimeout { millis: 50 }.is_fatal());
        assert!(
            !GeoFixError::FixValidationFailed {
                reason: String::new()
            }
            .is_fatal()
        );
    }

    #[test]
    fn io_convenience_constructor() {
        let err = GeoFixError::io(
            "/tmp/test.txt",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.code(), "GFX-5102");
        assert!(err.to_string().contains("/tmp/test.txt"));
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: GeoFixError = json_err.into();
        assert_eq!(err.code(), "GFX-5101");
    }

    #[test]
    fn from_toml_error() {
        let toml_err = toml::from_str::<toml::Value>("= invalid").unwrap_err();
        let err: GeoFixError = toml_err.into();
        assert_eq!(err.code(), "GFX-1004");
    }
}
