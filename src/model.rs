//! Core data model: features, detected errors, fix strategies and results,
//! and audit entries (`spec.md` §3).

use chrono::{DateTime, Utc};
use geo::Geometry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata attached to an ingested feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureMetadata {
    pub source: String,
    pub source_date: Option<DateTime<Utc>>,
    pub accuracy_m: f64,
    pub confidence: f64,
    pub tags: BTreeMap<String, String>,
}

impl Default for FeatureMetadata {
    fn default() -> Self {
        Self {
            source: "unknown".to_string(),
            source_date: None,
            accuracy_m: 10.0,
            confidence: 0.5,
            tags: BTreeMap::new(),
        }
    }
}

/// A single polygonal feature in the working set.
#[derive(Debug, Clone)]
pub struct Feature {
    pub id: String,
    pub geometry: Geometry<f64>,
    pub metadata: FeatureMetadata,
}

/// A road centerline with its required setback distance.
#[derive(Debug, Clone)]
pub struct RoadSegment {
    pub id: String,
    pub geometry: geo::LineString<f64>,
    pub buffer_m: f64,
}

/// Closed catalog of detector error kinds (`spec.md` §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidGeometry,
    EmptyGeometry,
    DuplicateGeometry,
    BuildingOverlap,
    BuildingOnRoad,
    BuildingBoundaryOverlap,
    OutsideBoundary,
    UnreasonableArea,
    LowCompactness,
    RoadSetback,
}

impl ErrorKind {
    /// Stable string form used in the audit log and CLI output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidGeometry => "invalid_geometry",
            Self::EmptyGeometry => "empty_geometry",
            Self::DuplicateGeometry => "duplicate_geometry",
            Self::BuildingOverlap => "building_overlap",
            Self::BuildingOnRoad => "building_on_road",
            Self::BuildingBoundaryOverlap => "building_boundary_overlap",
            Self::OutsideBoundary => "outside_boundary",
            Self::UnreasonableArea => "unreasonable_area",
            Self::LowCompactness => "low_compactness",
            Self::RoadSetback => "road_setback",
        }
    }

    /// Emission-order rank: errors are grouped by kind in catalog order
    /// (`spec.md` §4.1 "Output ordering").
    #[must_use]
    pub const fn emission_rank(self) -> u8 {
        self as u8
    }
}

/// Severity of a detected error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Coarse classification of a pairwise overlap (`spec.md` §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapClass {
    Duplicate,
    Partial,
    Sliver,
}

impl OverlapClass {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Duplicate => "duplicate",
            Self::Partial => "partial",
            Self::Sliver => "sliver",
        }
    }
}

/// Arbitrary scalar properties attached to a `DetectedError`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorProperties {
    pub overlap_ratio: Option<f64>,
    pub inter_area_m2: Option<f64>,
    pub overlap_class: Option<OverlapClass>,
    pub area_m2: Option<f64>,
    pub compactness: Option<f64>,
}

/// A defect found by the detector.
#[derive(Debug, Clone)]
pub struct DetectedError {
    pub error_id: String,
    pub kind: ErrorKind,
    pub severity: Severity,
    /// Geometry witnessing the error: the intersection polygon for
    /// overlaps, or the offending feature's own geometry otherwise.
    pub witness: Geometry<f64>,
    /// Affected feature IDs, length 1 or 2, in ascending lexicographic order.
    pub affected_features: Vec<String>,
    pub properties: ErrorProperties,
    /// Name of the detector routine that produced this error.
    pub provenance: &'static str,
}

/// Closed catalog of repair operation kinds (`spec.md` §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixKind {
    MakeValid,
    Simplify,
    Delete,
    Trim,
    Merge,
    Snap,
    Clip,
    Nudge,
    Flag,
    HumanReview,
}

impl FixKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MakeValid => "make_valid",
            Self::Simplify => "simplify",
            Self::Delete => "delete",
            Self::Trim => "trim",
            Self::Merge => "merge",
            Self::Snap => "snap",
            Self::Clip => "clip",
            Self::Nudge => "nudge",
            Self::Flag => "flag",
            Self::HumanReview => "human_review",
        }
    }

    /// `human_review` is the only kind the registry cannot execute
    /// (`spec.md` §4.3).
    #[must_use]
    pub const fn is_executable(self) -> bool {
        !matches!(self, Self::HumanReview)
    }
}

/// Which decision tier produced a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Rule,
    Oracle,
    Human,
}

impl Tier {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rule => "rule",
            Self::Oracle => "oracle",
            Self::Human => "human",
        }
    }
}

/// Untyped parameter bag passed from a strategy into an operation's
/// `execute`. Values are the subset of JSON relevant to geometry params
/// (floats, strings); geometry parameters travel via `geometry_params`.
pub type ParamBag = BTreeMap<String, serde_json::Value>;

/// A chosen repair strategy for one `DetectedError`.
#[derive(Debug, Clone)]
pub struct FixStrategy {
    pub error_id: String,
    pub fix_kind: FixKind,
    pub tier: Tier,
    pub confidence: f64,
    pub params: ParamBag,
    /// Geometry-valued parameters (e.g. `reference_geometry`), kept out of
    /// the JSON param bag since `Geometry<f64>` is not serde-friendly here.
    pub geometry_params: BTreeMap<String, Geometry<f64>>,
    /// Which feature the strategy primarily acts on.
    pub target_feature: String,
    pub rationale: String,
}

/// Outcome of a validator run (`spec.md` §4.4).
#[derive(Debug, Clone, Default)]
pub struct ValidationVerdict {
    pub passed: bool,
    pub checks_run: Vec<&'static str>,
    pub failures: Vec<String>,
}

/// Outcome of applying a `FixStrategy` through the registry.
#[derive(Debug, Clone)]
pub struct FixResult {
    pub strategy: FixStrategy,
    pub success: bool,
    pub original_geometry: Geometry<f64>,
    pub fixed_geometry: Option<Geometry<f64>>,
    pub validation: ValidationVerdict,
    pub new_errors: usize,
    pub timestamp: DateTime<Utc>,
}

/// What happened to a feature as a consequence of a decided error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixAction {
    Applied,
    RolledBack,
    Skipped,
    PendingReview,
}

impl FixAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::RolledBack => "rolled_back",
            Self::Skipped => "skipped",
            Self::PendingReview => "pending_review",
        }
    }
}

/// One append-only audit row (`spec.md` §3, §6).
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub feature_id: String,
    pub error_kind: ErrorKind,
    pub error_id: String,
    pub fix_kind: FixKind,
    pub tier: Tier,
    pub confidence: f64,
    pub rationale: String,
    pub before_wkt: String,
    pub after_wkt: Option<String>,
    pub action: FixAction,
    pub validation_ok: bool,
    pub new_errors: i64,
}

/// Aggregate counts for a session (`spec.md` §4.5).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub total: i64,
    pub applied: i64,
    pub rolled_back: i64,
    pub skipped: i64,
    pub pending_review: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_ordering_matches_catalog_order() {
        assert!(ErrorKind::InvalidGeometry.emission_rank() < ErrorKind::EmptyGeometry.emission_rank());
        assert!(ErrorKind::EmptyGeometry.emission_rank() < ErrorKind::DuplicateGeometry.emission_rank());
        assert!(ErrorKind::RoadSetback.emission_rank() > ErrorKind::LowCompactness.emission_rank());
    }

    #[test]
    fn fix_kind_human_review_is_not_executable() {
        assert!(!FixKind::HumanReview.is_executable());
        assert!(FixKind::Delete.is_executable());
    }

    #[test]
    fn metadata_defaults_match_spec() {
        let meta = FeatureMetadata::default();
        assert_eq!(meta.source, "unknown");
        assert!((meta.accuracy_m - 10.0).abs() < f64::EPSILON);
        assert!((meta.confidence - 0.5).abs() < f64::EPSILON);
        assert!(meta.source_date.is_none());
    }
}
