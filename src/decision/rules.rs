//! Tier 1: priority-ordered, pure, panic-safe rule functions
//! (`spec.md` §4.2 built-in rule table).

use std::collections::BTreeMap;

use geo::Geometry;
use serde_json::json;

use crate::core::config::{DecisionConfig, GeometryConfig};
use crate::decision::confidence::{combined_confidence, confidence_from_accuracy_gap, confidence_from_overlap_ratio};
use crate::geometry;
use crate::model::{DetectedError, ErrorKind, FeatureMetadata, FixKind, FixStrategy, OverlapClass, RoadSegment, Tier};

/// Everything a rule function needs to inspect to decide on a strategy,
/// borrowed from the pipeline's working state.
pub struct RuleInput<'a> {
    pub error: &'a DetectedError,
    /// Metadata for the affected features, keyed by feature ID.
    pub metadata: &'a BTreeMap<String, FeatureMetadata>,
    /// Current geometry for every feature, keyed by feature ID.
    pub geometries: &'a BTreeMap<String, Geometry<f64>>,
    pub boundary: Option<&'a Geometry<f64>>,
    pub roads: &'a [RoadSegment],
    pub decision: &'a DecisionConfig,
    pub geometry: &'a GeometryConfig,
}

impl RuleInput<'_> {
    fn meta(&self, id: &str) -> FeatureMetadata {
        self.metadata.get(id).cloned().unwrap_or_default()
    }

    fn geom(&self, id: &str) -> Option<&Geometry<f64>> {
        self.geometries.get(id)
    }
}

fn strategy(
    error: &DetectedError,
    fix_kind: FixKind,
    confidence: f64,
    target: &str,
    rationale: impl Into<String>,
) -> FixStrategy {
    FixStrategy {
        error_id: error.error_id.clone(),
        fix_kind,
        tier: Tier::Rule,
        confidence,
        params: BTreeMap::new(),
        geometry_params: BTreeMap::new(),
        target_feature: target.to_string(),
        rationale: rationale.into(),
    }
}

/// Priority 10 — two features share a normalized geometry: delete the
/// lexicographically second one.
fn rule_exact_duplicate(input: &RuleInput) -> Option<FixStrategy> {
    if input.error.kind != ErrorKind::DuplicateGeometry || input.error.affected_features.len() < 2 {
        return None;
    }
    let victim = &input.error.affected_features[1];
    let mut s = strategy(
        input.error,
        FixKind::Delete,
        0.95,
        victim,
        "exact duplicate geometry; removing the second occurrence",
    );
    s.params.insert("delete_feature".into(), json!(victim));
    Some(s)
}

/// Priority 20 — near-duplicate overlap, both features from the same
/// source: delete the lower-confidence one.
fn rule_duplicate_same_source(input: &RuleInput) -> Option<FixStrategy> {
    if !matches!(input.error.kind, ErrorKind::BuildingOverlap | ErrorKind::DuplicateGeometry) {
        return None;
    }
    let ratio = input.error.properties.overlap_ratio?;
    if ratio < input.geometry.duplicate_ratio_min || input.error.affected_features.len() < 2 {
        return None;
    }
    let (a, b) = (&input.error.affected_features[0], &input.error.affected_features[1]);
    let (ma, mb) = (input.meta(a), input.meta(b));
    if ma.source != mb.source {
        return None;
    }
    let victim = if ma.confidence <= mb.confidence { a } else { b };
    let mut s = strategy(
        input.error,
        FixKind::Delete,
        0.95,
        victim,
        format!("near-duplicate overlap (ratio {ratio:.2}) within source '{}'; removing lower-confidence feature", ma.source),
    );
    s.params.insert("delete_feature".into(), json!(victim));
    Some(s)
}

/// Priority 30 — near-duplicate overlap across sources: delete the
/// less-accurate one (larger `accuracy_m`).
fn rule_duplicate_diff_source(input: &RuleInput) -> Option<FixStrategy> {
    if !matches!(input.error.kind, ErrorKind::BuildingOverlap | ErrorKind::DuplicateGeometry) {
        return None;
    }
    let ratio = input.error.properties.overlap_ratio?;
    if ratio < input.geometry.duplicate_ratio_min || input.error.affected_features.len() < 2 {
        return None;
    }
    let (a, b) = (&input.error.affected_features[0], &input.error.affected_features[1]);
    let (ma, mb) = (input.meta(a), input.meta(b));
    if ma.source == mb.source {
        return None;
    }
    let victim = if ma.accuracy_m >= mb.accuracy_m { a } else { b };
    let mut s = strategy(
        input.error,
        FixKind::Delete,
        0.85,
        victim,
        format!("near-duplicate overlap (ratio {ratio:.2}) across sources; removing less-accurate feature"),
    );
    s.params.insert("delete_feature".into(), json!(victim));
    Some(s)
}

/// Priority 40 — self-intersecting / inverted-ring geometry: repair it.
fn rule_invalid_geometry(input: &RuleInput) -> Option<FixStrategy> {
    if input.error.kind != ErrorKind::InvalidGeometry {
        return None;
    }
    let target = input.error.affected_features.first()?;
    Some(strategy(
        input.error,
        FixKind::MakeValid,
        0.95,
        target,
        "self-intersecting or inverted-ring geometry",
    ))
}

/// Priority 50 — a small sliver overlap: trim the first feature against
/// the intersection.
fn rule_sliver_overlap(input: &RuleInput) -> Option<FixStrategy> {
    if input.error.properties.overlap_class != Some(OverlapClass::Sliver) {
        return None;
    }
    let inter_area = input.error.properties.inter_area_m2?;
    if inter_area >= input.geometry.sliver_max_area_m2 {
        return None;
    }
    let target = input.error.affected_features.first()?;
    let mut s = strategy(
        input.error,
        FixKind::Trim,
        0.90,
        target,
        format!("sliver overlap of {inter_area:.3} m^2"),
    );
    s.geometry_params
        .insert("overlap_geometry".into(), input.error.witness.clone());
    Some(s)
}

/// Priority 60 — partial overlap explainable by positional accuracy:
/// snap the less-accurate feature onto the more-accurate one.
fn rule_partial_overlap_by_accuracy(input: &RuleInput) -> Option<FixStrategy> {
    let ratio = input.error.properties.overlap_ratio?;
    if ratio < input.geometry.partial_ratio_min || ratio >= input.geometry.duplicate_ratio_min {
        return None;
    }
    if input.error.affected_features.len() < 2 {
        return None;
    }
    let (a, b) = (&input.error.affected_features[0], &input.error.affected_features[1]);
    let (ma, mb) = (input.meta(a), input.meta(b));
    let gap = (ma.accuracy_m - mb.accuracy_m).abs();
    if gap <= 5.0 {
        return None;
    }
    let (less_accurate, reference) = if ma.accuracy_m >= mb.accuracy_m { (a, b) } else { (b, a) };
    let reference_geom = input.geom(reference)?.clone();
    let confidence = combined_confidence(&[
        confidence_from_accuracy_gap(gap),
        confidence_from_overlap_ratio(ratio),
    ]);
    let mut s = strategy(
        input.error,
        FixKind::Snap,
        confidence,
        less_accurate,
        format!("partial overlap (ratio {ratio:.2}), accuracy gap {gap:.1} m"),
    );
    s.params
        .insert("tolerance".into(), json!(input.geometry.road_snap_distance_m));
    s.geometry_params.insert("reference_geometry".into(), reference_geom);
    Some(s)
}

/// Priority 70 — a small intersection with a road: nudge the feature
/// clear of it.
fn rule_small_road_conflict(input: &RuleInput) -> Option<FixStrategy> {
    if input.error.kind != ErrorKind::BuildingOnRoad {
        return None;
    }
    let inter_area = input.error.properties.inter_area_m2?;
    if inter_area >= 2.0 {
        return None;
    }
    let target = input.error.affected_features.first()?;
    let target_geom = input.geom(target)?;
    let nearest_road = input.roads.iter().min_by(|r1, r2| {
        let d1 = geometry::distance(target_geom, &Geometry::LineString(r1.geometry.clone()));
        let d2 = geometry::distance(target_geom, &Geometry::LineString(r2.geometry.clone()));
        d1.total_cmp(&d2)
    })?;
    let mut s = strategy(
        input.error,
        FixKind::Nudge,
        0.85,
        target,
        format!("small road intersection ({inter_area:.2} m^2)"),
    );
    s.params.insert("min_distance_m".into(), json!(3.0));
    s.geometry_params.insert(
        "road_geometry".into(),
        Geometry::LineString(nearest_road.geometry.clone()),
    );
    Some(s)
}

/// Priority 80 — a feature far too small to be plausible: delete it.
fn rule_tiny_building(input: &RuleInput) -> Option<FixStrategy> {
    if input.error.kind != ErrorKind::UnreasonableArea {
        return None;
    }
    let area = input.error.properties.area_m2?;
    if area >= 1.0 {
        return None;
    }
    let target = input.error.affected_features.first()?;
    let mut s = strategy(
        input.error,
        FixKind::Delete,
        0.70,
        target,
        format!("implausibly small feature ({area:.3} m^2)"),
    );
    s.params.insert("delete_feature".into(), json!(target));
    Some(s)
}

/// Priority 90 — a highly non-compact shape: simplify it.
fn rule_low_compactness(input: &RuleInput) -> Option<FixStrategy> {
    if input.error.kind != ErrorKind::LowCompactness {
        return None;
    }
    let q = input.error.properties.compactness?;
    if q >= input.geometry.min_compactness {
        return None;
    }
    let target = input.error.affected_features.first()?;
    let mut s = strategy(
        input.error,
        FixKind::Simplify,
        0.75,
        target,
        format!("low compactness ({q:.3})"),
    );
    s.params.insert("tolerance".into(), json!(0.5));
    s.params.insert("preserve_topology".into(), json!(true));
    Some(s)
}

/// Priority 100 — a feature crossing the area-of-interest boundary: clip
/// it to the boundary.
fn rule_boundary_clip(input: &RuleInput) -> Option<FixStrategy> {
    if input.error.kind != ErrorKind::BuildingBoundaryOverlap {
        return None;
    }
    let boundary = input.boundary?;
    let target = input.error.affected_features.first()?;
    let mut s = strategy(
        input.error,
        FixKind::Clip,
        0.85,
        target,
        "feature extends beyond the area-of-interest boundary",
    );
    s.geometry_params
        .insert("boundary_geometry".into(), boundary.clone());
    Some(s)
}

/// Priority 200+ — catch-alls keyed on `overlap_class` when richer
/// metadata (source, accuracy) is absent.
fn rule_overlap_class_fallback(input: &RuleInput) -> Option<FixStrategy> {
    let class = input.error.properties.overlap_class?;
    let target = input.error.affected_features.first()?;
    match class {
        OverlapClass::Duplicate => {
            let victim = input.error.affected_features.last()?;
            let mut s = strategy(
                input.error,
                FixKind::Delete,
                0.60,
                victim,
                "duplicate-class overlap with no source/accuracy metadata",
            );
            s.params.insert("delete_feature".into(), json!(victim));
            Some(s)
        }
        OverlapClass::Sliver => {
            let mut s = strategy(
                input.error,
                FixKind::Trim,
                0.55,
                target,
                "sliver-class overlap with no source/accuracy metadata",
            );
            s.geometry_params
                .insert("overlap_geometry".into(), input.error.witness.clone());
            Some(s)
        }
        OverlapClass::Partial => Some(strategy(
            input.error,
            FixKind::Flag,
            0.50,
            target,
            "partial-class overlap with no source/accuracy metadata",
        )),
    }
}

/// Priority 210 — an out-of-boundary or road-setback error with no more
/// specific rule: flag it for review rather than mutate geometry.
fn rule_flag_unhandled(input: &RuleInput) -> Option<FixStrategy> {
    if !matches!(input.error.kind, ErrorKind::OutsideBoundary | ErrorKind::RoadSetback) {
        return None;
    }
    let target = input.error.affected_features.first()?;
    Some(strategy(
        input.error,
        FixKind::Flag,
        0.50,
        target,
        format!("{} with no deterministic repair", input.error.kind.as_str()),
    ))
}

/// The priority-ordered rule table (`spec.md` §4.2). The first function
/// returning `Some` wins.
pub const RULE_TABLE: &[(u32, &str, fn(&RuleInput) -> Option<FixStrategy>)] = &[
    (10, "exact-duplicate", rule_exact_duplicate),
    (20, "duplicate-same-source", rule_duplicate_same_source),
    (30, "duplicate-diff-source", rule_duplicate_diff_source),
    (40, "invalid-geometry", rule_invalid_geometry),
    (50, "sliver-overlap", rule_sliver_overlap),
    (60, "partial-overlap-by-accuracy", rule_partial_overlap_by_accuracy),
    (70, "small-road-conflict", rule_small_road_conflict),
    (80, "tiny-building", rule_tiny_building),
    (90, "low-compactness", rule_low_compactness),
    (100, "boundary-clip", rule_boundary_clip),
    (200, "overlap-class-fallback", rule_overlap_class_fallback),
    (210, "flag-unhandled", rule_flag_unhandled),
];

/// Run the rule table in priority order. Any rule whose evaluation panics
/// is caught and treated as "no match" (`spec.md` §4.2, §7 `RuleError`).
pub fn run_rules(input: &RuleInput) -> Option<FixStrategy> {
    for (_, name, rule) in RULE_TABLE {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| rule(input)));
        match result {
            Ok(Some(strategy)) => return Some(strategy),
            Ok(None) => continue,
            Err(_) => {
                eprintln!("[GFX-RULE] rule '{name}' panicked; treating as no match");
                continue;
            }
        }
    }
    None
}
