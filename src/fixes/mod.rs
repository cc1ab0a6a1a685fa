//! Closed catalog of repair operations, composed by a shared
//! execute → validate → package lifecycle (`spec.md` §4.3).

use chrono::Utc;
use geo::{Area, Buffer, Geometry, Simplify, SimplifyVwPreserve, Translate};

use crate::geometry;
use crate::model::{FixKind, FixResult, FixStrategy, ValidationVerdict};
use crate::validator::Validator;

/// Outcome of an operation's `execute` step, before validation.
pub enum ExecuteOutcome {
    /// Produced a replacement geometry.
    Geometry(Geometry<f64>),
    /// The feature should be removed entirely; only `delete` emits this.
    Deleted,
    /// Execution could not produce a usable geometry.
    Failed(String),
}

/// A single repair operation. `check_bounds` layers a fix-kind-specific
/// area bound on top of the shared `Validator` (`spec.md` §4.3
/// "Validation (in addition to base)").
pub trait FixOperation {
    fn execute(&self, original: &Geometry<f64>, strategy: &FixStrategy) -> ExecuteOutcome;

    fn check_bounds(&self, _pre_area: f64, _post_area: f64) -> Result<(), String> {
        Ok(())
    }
}

fn param_f64(strategy: &FixStrategy, key: &str, default: f64) -> f64 {
    strategy
        .params
        .get(key)
        .and_then(serde_json::Value::as_f64)
        .unwrap_or(default)
}

struct MakeValidOp;
impl FixOperation for MakeValidOp {
    fn execute(&self, original: &Geometry<f64>, _strategy: &FixStrategy) -> ExecuteOutcome {
        geometry::make_valid(original).map_or_else(
            || ExecuteOutcome::Failed("make_valid could not repair this geometry".to_string()),
            ExecuteOutcome::Geometry,
        )
    }
}

struct SimplifyOp;
impl FixOperation for SimplifyOp {
    fn execute(&self, original: &Geometry<f64>, strategy: &FixStrategy) -> ExecuteOutcome {
        let Some(mp) = geometry::as_multi_polygon(original) else {
            return ExecuteOutcome::Failed("simplify requires polygonal geometry".to_string());
        };
        let epsilon = param_f64(strategy, "tolerance", 0.5);
        let preserve_topology = strategy
            .params
            .get("preserve_topology")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(true);
        let simplified = if preserve_topology {
            mp.simplify_vw_preserve(epsilon)
        } else {
            mp.simplify(epsilon)
        };
        ExecuteOutcome::Geometry(geometry::from_multi_polygon(simplified))
    }

    fn check_bounds(&self, pre_area: f64, post_area: f64) -> Result<(), String> {
        if pre_area > 0.0 && post_area < 0.5 * pre_area {
            return Err(format!(
                "simplify reduced area to {:.1}% of original, below the 50% bound",
                100.0 * post_area / pre_area
            ));
        }
        Ok(())
    }
}

struct DeleteOp;
impl FixOperation for DeleteOp {
    fn execute(&self, _original: &Geometry<f64>, _strategy: &FixStrategy) -> ExecuteOutcome {
        ExecuteOutcome::Deleted
    }
}

struct TrimOp;
impl FixOperation for TrimOp {
    fn execute(&self, original: &Geometry<f64>, strategy: &FixStrategy) -> ExecuteOutcome {
        let Some(overlap) = strategy.geometry_params.get("overlap_geometry") else {
            return ExecuteOutcome::Failed("trim requires an overlap_geometry parameter".to_string());
        };
        geometry::difference(original, overlap).map_or_else(
            || ExecuteOutcome::Failed("trim difference failed".to_string()),
            |g| ExecuteOutcome::Geometry(geometry::largest_part(g)),
        )
    }

    fn check_bounds(&self, pre_area: f64, post_area: f64) -> Result<(), String> {
        if pre_area > 0.0 && post_area < 0.3 * pre_area {
            return Err(format!(
                "trim reduced area to {:.1}% of original, below the 30% bound",
                100.0 * post_area / pre_area
            ));
        }
        Ok(())
    }
}

struct MergeOp;
impl FixOperation for MergeOp {
    fn execute(&self, original: &Geometry<f64>, strategy: &FixStrategy) -> ExecuteOutcome {
        let Some(other) = strategy.geometry_params.get("merge_with") else {
            return ExecuteOutcome::Failed("merge requires a merge_with parameter".to_string());
        };
        geometry::union(original, other).map_or_else(
            || ExecuteOutcome::Failed("merge union failed".to_string()),
            ExecuteOutcome::Geometry,
        )
    }
}

struct SnapOp;
impl FixOperation for SnapOp {
    fn execute(&self, original: &Geometry<f64>, strategy: &FixStrategy) -> ExecuteOutcome {
        let Some(reference) = strategy.geometry_params.get("reference_geometry") else {
            return ExecuteOutcome::Failed("snap requires a reference_geometry parameter".to_string());
        };
        let Some(centroid) = geometry::centroid(original) else {
            return ExecuteOutcome::Failed("snap requires a geometry with a centroid".to_string());
        };
        let Some(nearest) = geometry::closest_point(reference, &centroid) else {
            return ExecuteOutcome::Failed("snap could not locate a reference point".to_string());
        };
        let tolerance = param_f64(strategy, "tolerance", 2.0);
        let dx = nearest.x() - centroid.x();
        let dy = nearest.y() - centroid.y();
        let step = dx.hypot(dy);
        let snapped = if step <= 0.0 {
            original.clone()
        } else {
            let scale = step.min(tolerance) / step;
            original.translate(dx * scale, dy * scale)
        };
        geometry::difference(&snapped, reference).map_or_else(
            || ExecuteOutcome::Failed("snap difference against reference failed".to_string()),
            |g| ExecuteOutcome::Geometry(geometry::largest_part(g)),
        )
    }

    fn check_bounds(&self, pre_area: f64, post_area: f64) -> Result<(), String> {
        if pre_area > 0.0 {
            let ratio = post_area / pre_area;
            if !(0.5..=1.5).contains(&ratio) {
                return Err(format!(
                    "snap changed area by {ratio:.2}x, outside the 0.5x-1.5x bound"
                ));
            }
        }
        Ok(())
    }
}

struct ClipOp;
impl FixOperation for ClipOp {
    fn execute(&self, original: &Geometry<f64>, strategy: &FixStrategy) -> ExecuteOutcome {
        let Some(boundary) = strategy.geometry_params.get("boundary_geometry") else {
            return ExecuteOutcome::Failed("clip requires a boundary_geometry parameter".to_string());
        };
        let Some(boundary_mp) = geometry::as_multi_polygon(boundary) else {
            return ExecuteOutcome::Failed("clip boundary must be polygonal".to_string());
        };
        let buffer_m = param_f64(strategy, "buffer_m", 0.5);
        let buffered = boundary_mp.buffer(buffer_m);
        geometry::intersection(original, &Geometry::MultiPolygon(buffered)).map_or_else(
            || ExecuteOutcome::Failed("clip intersection failed".to_string()),
            |g| ExecuteOutcome::Geometry(geometry::largest_part(g)),
        )
    }

    fn check_bounds(&self, pre_area: f64, post_area: f64) -> Result<(), String> {
        if pre_area > 0.0 && post_area < 0.1 * pre_area {
            return Err(format!(
                "clip reduced area to {:.1}% of original, below the 10% bound",
                100.0 * post_area / pre_area
            ));
        }
        Ok(())
    }
}

struct NudgeOp;
impl FixOperation for NudgeOp {
    fn execute(&self, original: &Geometry<f64>, strategy: &FixStrategy) -> ExecuteOutcome {
        let Some(road) = strategy.geometry_params.get("road_geometry") else {
            return ExecuteOutcome::Failed("nudge requires a road_geometry parameter".to_string());
        };
        let Some(centroid) = geometry::centroid(original) else {
            return ExecuteOutcome::Failed("nudge requires a geometry with a centroid".to_string());
        };
        let Some(nearest) = geometry::closest_point(road, &centroid) else {
            return ExecuteOutcome::Failed("nudge could not locate the nearest road point".to_string());
        };
        let min_distance = param_f64(strategy, "min_distance_m", 3.0);
        let current = geometry::distance(original, road);
        let (away_dx, away_dy) = {
            let dx = centroid.x() - nearest.x();
            let dy = centroid.y() - nearest.y();
            if dx.hypot(dy) <= 0.0 {
                (0.0, 1.0)
            } else {
                (dx, dy)
            }
        };
        let norm = away_dx.hypot(away_dy);
        let needed = (min_distance - current).max(0.0);
        let scale = needed / norm;
        ExecuteOutcome::Geometry(original.translate(away_dx * scale, away_dy * scale))
    }

    fn check_bounds(&self, pre_area: f64, post_area: f64) -> Result<(), String> {
        if pre_area > 0.0 {
            let ratio = post_area / pre_area;
            if (ratio - 1.0).abs() > 0.01 {
                return Err(format!(
                    "nudge is not a pure translation: area changed by {:.2}%",
                    100.0 * (ratio - 1.0)
                ));
            }
        }
        Ok(())
    }
}

struct FlagOp;
impl FixOperation for FlagOp {
    fn execute(&self, original: &Geometry<f64>, _strategy: &FixStrategy) -> ExecuteOutcome {
        ExecuteOutcome::Geometry(original.clone())
    }
}

/// Look up the `FixOperation` implementing a given kind. Returns `None`
/// for `human_review`, the only non-executable kind (`spec.md` §4.3).
#[must_use]
pub fn operation_for(kind: FixKind) -> Option<&'static dyn FixOperation> {
    match kind {
        FixKind::MakeValid => Some(&MakeValidOp),
        FixKind::Simplify => Some(&SimplifyOp),
        FixKind::Delete => Some(&DeleteOp),
        FixKind::Trim => Some(&TrimOp),
        FixKind::Merge => Some(&MergeOp),
        FixKind::Snap => Some(&SnapOp),
        FixKind::Clip => Some(&ClipOp),
        FixKind::Nudge => Some(&NudgeOp),
        FixKind::Flag => Some(&FlagOp),
        FixKind::HumanReview => None,
    }
}

/// The fix registry: looks up and runs operations through the shared
/// execute → validate → package lifecycle.
pub struct FixRegistry<'a> {
    validator: Validator<'a>,
}

impl<'a> FixRegistry<'a> {
    #[must_use]
    pub const fn new(validator: Validator<'a>) -> Self {
        Self { validator }
    }

    /// Apply `strategy` to `original`, consuming it. Always returns a
    /// `FixResult`; failures are reported via `success: false` rather than
    /// an `Err`, so the pipeline can audit every attempt uniformly.
    #[must_use]
    pub fn apply(&self, strategy: FixStrategy, original: Geometry<f64>) -> FixResult {
        let kind = strategy.fix_kind;
        let Some(op) = operation_for(kind) else {
            return FixResult {
                strategy,
                success: false,
                original_geometry: original,
                fixed_geometry: None,
                validation: ValidationVerdict {
                    passed: false,
                    checks_run: vec!["lookup"],
                    failures: vec!["fix kind is not executable".to_string()],
                },
                new_errors: 0,
                timestamp: Utc::now(),
            };
        };

        let outcome =
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| op.execute(&original, &strategy)));

        let (success, fixed_geometry, validation) = match outcome {
            Err(_) => (
                false,
                None,
                ValidationVerdict {
                    passed: false,
                    checks_run: vec!["execute"],
                    failures: vec![format!("fix execution panicked for {}", kind.as_str())],
                },
            ),
            Ok(ExecuteOutcome::Failed(reason)) => (
                false,
                None,
                ValidationVerdict {
                    passed: false,
                    checks_run: vec!["execute"],
                    failures: vec![reason],
                },
            ),
            Ok(ExecuteOutcome::Deleted) => (
                true,
                None,
                ValidationVerdict {
                    passed: true,
                    checks_run: vec!["delete"],
                    failures: vec![],
                },
            ),
            Ok(ExecuteOutcome::Geometry(fixed)) => {
                let mut verdict = self.validator.validate_fix(&original, Some(&fixed), false);
                if verdict.passed {
                    let pre = original.unsigned_area();
                    let post = fixed.unsigned_area();
                    verdict.checks_run.push("fix_specific_bounds");
                    if let Err(reason) = op.check_bounds(pre, post) {
                        verdict.passed = false;
                        verdict.failures.push(reason);
                    }
                }
                let ok = verdict.passed;
                (ok, Some(fixed), verdict)
            }
        };

        FixResult {
            strategy,
            success,
            original_geometry: original,
            fixed_geometry,
            validation,
            new_errors: 0,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ValidatorConfig;
    use crate::model::Tier;
    use geo::polygon;
    use std::collections::BTreeMap;

    fn square(side: f64) -> Geometry<f64> {
        Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0),
            (x: side, y: 0.0),
            (x: side, y: side),
            (x: 0.0, y: side),
            (x: 0.0, y: 0.0),
        ])
    }

    fn base_strategy(fix_kind: FixKind) -> FixStrategy {
        FixStrategy {
            error_id: "err-000000".to_string(),
            fix_kind,
            tier: Tier::Rule,
            confidence: 0.9,
            params: BTreeMap::new(),
            geometry_params: BTreeMap::new(),
            target_feature: "a".to_string(),
            rationale: "test".to_string(),
        }
    }

    #[test]
    fn delete_produces_nil_geometry_and_passes() {
        let config = ValidatorConfig::default();
        let registry = FixRegistry::new(Validator::new(&config));
        let result = registry.apply(base_strategy(FixKind::Delete), square(2.0));
        assert!(result.success);
        assert!(result.fixed_geometry.is_none());
    }

    #[test]
    fn make_valid_repairs_bowtie() {
        let bowtie = Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 10.0, y: 0.0),
            (x: 0.0, y: 10.0),
            (x: 0.0, y: 0.0),
        ]);
        let config = ValidatorConfig::default();
        let registry = FixRegistry::new(Validator::new(&config));
        let result = registry.apply(base_strategy(FixKind::MakeValid), bowtie);
        assert!(result.success, "{:?}", result.validation.failures);
        assert!(geometry::is_valid(result.fixed_geometry.as_ref().unwrap()));
    }

    #[test]
    fn trim_rejects_excessive_area_loss() {
        let mut strategy = base_strategy(FixKind::Trim);
        let original = square(10.0);
        strategy
            .geometry_params
            .insert("overlap_geometry".into(), square(9.9));
        let config = ValidatorConfig::default();
        let registry = FixRegistry::new(Validator::new(&config));
        let result = registry.apply(strategy, original);
        assert!(!result.success);
    }

    #[test]
    fn snap_removes_residual_overlap_with_reference() {
        let reference = Geometry::Polygon(polygon![
            (x: 8.0, y: 0.0),
            (x: 18.0, y: 0.0),
            (x: 18.0, y: 10.0),
            (x: 8.0, y: 10.0),
            (x: 8.0, y: 0.0),
        ]);
        let mut strategy = base_strategy(FixKind::Snap);
        strategy
            .geometry_params
            .insert("reference_geometry".into(), reference.clone());
        strategy.params.insert("tolerance".into(), serde_json::json!(0.1));
        let original = square(10.0);
        let config = ValidatorConfig::default();
        let registry = FixRegistry::new(Validator::new(&config));
        let result = registry.apply(strategy, original);
        assert!(result.success, "{:?}", result.validation.failures);
        let fixed = result.fixed_geometry.unwrap();
        let overlap = geometry::intersection(&fixed, &reference).unwrap();
        assert!(
            geometry::area_m2(&overlap) < 1e-9,
            "snap must eliminate residual overlap with the reference, left {}",
            geometry::area_m2(&overlap)
        );
    }

    #[test]
    fn nudge_translates_north_on_degenerate_direction() {
        // Road centerline passes exactly through the building's centroid
        // (5, 5): "away from the nearest road point" is undefined, so the
        // op must fall back to translating north rather than failing.
        let road = Geometry::LineString(geo::LineString::from(vec![(0.0, 5.0), (10.0, 5.0)]));
        let mut strategy = base_strategy(FixKind::Nudge);
        strategy.geometry_params.insert("road_geometry".into(), road.clone());
        strategy.params.insert("min_distance_m".into(), serde_json::json!(3.0));
        let building = Geometry::Polygon(polygon![
            (x: 4.0, y: 4.0),
            (x: 6.0, y: 4.0),
            (x: 6.0, y: 6.0),
            (x: 4.0, y: 6.0),
            (x: 4.0, y: 4.0),
        ]);
        let config = ValidatorConfig::default();
        let registry = FixRegistry::new(Validator::new(&config));
        let result = registry.apply(strategy, building.clone());
        assert!(result.success, "{:?}", result.validation.failures);
        let fixed = result.fixed_geometry.unwrap();
        let pre_centroid = geometry::centroid(&building).unwrap();
        let post_centroid = geometry::centroid(&fixed).unwrap();
        assert!((post_centroid.x() - pre_centroid.x()).abs() < 1e-9);
        assert!(post_centroid.y() > pre_centroid.y());
    }

    #[test]
    fn human_review_is_not_found_in_registry() {
        assert!(operation_for(FixKind::HumanReview).is_none());
        let config = ValidatorConfig::default();
        let registry = FixRegistry::new(Validator::new(&config));
        let result = registry.apply(base_strategy(FixKind::HumanReview), square(2.0));
        assert!(!result.success);
    }
}
