//! End-to-end orchestration: detect → decide → apply → validate → audit
//! (`spec.md` §4.6).
//!
//! Every fix is written to the audit log synchronously, immediately after
//! it is decided, before the pipeline moves on to the next error — so a
//! cancelled run leaves a complete record of everything that happened up
//! to that point (`spec.md` §5 "Suspension points").

use std::collections::BTreeMap;
use std::time::Duration;

use geo::{Geometry, Polygon};
use wkt::ToWkt;

use crate::audit::AuditLog;
use crate::core::config::Config;
use crate::decision::{decide, DecisionContext, ReasoningOracle};
use crate::detector;
use crate::fixes::FixRegistry;
use crate::geometry;
use crate::model::{Feature, FixAction, FixResult, RoadSegment};
use crate::validator::Validator;

/// Summary of one pipeline run.
pub struct RunReport {
    pub features: Vec<Feature>,
    pub results: Vec<FixResult>,
}

/// Orchestrates one full pass over a feature set.
pub struct Pipeline<'a> {
    pub config: &'a Config,
    pub oracle: &'a dyn ReasoningOracle,
    pub oracle_timeout: Duration,
    pub rules_only: bool,
}

impl<'a> Pipeline<'a> {
    #[must_use]
    pub const fn new(config: &'a Config, oracle: &'a dyn ReasoningOracle) -> Self {
        Self {
            config,
            oracle,
            oracle_timeout: Duration::from_secs(5),
            rules_only: false,
        }
    }

    /// Run detection, decision, and repair over `features`, writing one
    /// audit row per decided error, and return the updated feature set.
    pub fn run(
        &self,
        features: Vec<Feature>,
        roads: &[RoadSegment],
        boundary: Option<&Polygon<f64>>,
        audit: &AuditLog,
        session_id: &str,
    ) -> crate::core::errors::Result<RunReport> {
        let boundary_geom = boundary.map(|p| Geometry::Polygon(p.clone()));
        let errors = detector::detect(&features, roads, boundary, &self.config.geometry);

        let metadata: BTreeMap<String, _> = features.iter().map(|f| (f.id.clone(), f.metadata.clone())).collect();
        let mut geometries: BTreeMap<String, Geometry<f64>> =
            features.iter().map(|f| (f.id.clone(), f.geometry.clone())).collect();

        let validator = Validator::new(&self.config.validator);
        let registry = FixRegistry::new(validator);
        let mut results = Vec::with_capacity(errors.len());
        let mut deleted: Vec<String> = Vec::new();

        for error in &errors {
            let ctx = DecisionContext {
                metadata: &metadata,
                geometries: &geometries,
                boundary: boundary_geom.as_ref(),
                roads,
                decision: &self.config.decision,
                geometry: &self.config.geometry,
                oracle: self.oracle,
                oracle_timeout: self.oracle_timeout,
                rules_only: self.rules_only,
            };
            let strategy = decide(error, &ctx);
            let target = strategy.target_feature.clone();

            if !strategy.fix_kind.is_executable() {
                let entry_action = FixAction::PendingReview;
                let before_wkt = geometries.get(&target).map_or_else(String::new, Geometry::wkt_string);
                audit.insert(&crate::model::AuditEntry {
                    timestamp: chrono::Utc::now(),
                    session_id: session_id.to_string(),
                    feature_id: target.clone(),
                    error_kind: error.kind,
                    error_id: error.error_id.clone(),
                    fix_kind: strategy.fix_kind,
                    tier: strategy.tier,
                    confidence: strategy.confidence,
                    rationale: strategy.rationale.clone(),
                    before_wkt,
                    after_wkt: None,
                    action: entry_action,
                    validation_ok: false,
                    new_errors: 0,
                })?;
                continue;
            }

            let Some(original) = geometries.get(&target).cloned() else {
                audit.insert(&crate::model::AuditEntry {
                    timestamp: chrono::Utc::now(),
                    session_id: session_id.to_string(),
                    feature_id: target.clone(),
                    error_kind: error.kind,
                    error_id: error.error_id.clone(),
                    fix_kind: strategy.fix_kind,
                    tier: strategy.tier,
                    confidence: strategy.confidence,
                    rationale: strategy.rationale.clone(),
                    before_wkt: String::new(),
                    after_wkt: None,
                    action: FixAction::Skipped,
                    validation_ok: false,
                    new_errors: 0,
                })?;
                continue;
            };
            let result = registry.apply(strategy, original.clone());
            let action = if result.success { FixAction::Applied } else { FixAction::RolledBack };

            if result.success {
                match &result.fixed_geometry {
                    Some(fixed) => {
                        geometries.insert(target.clone(), fixed.clone());
                    }
                    None => {
                        geometries.remove(&target);
                        deleted.push(target.clone());
                    }
                }
            }

            let new_errors = result.fixed_geometry.as_ref().map_or(0, |g| local_error_count(g, &self.config.geometry));

            audit.insert(&crate::model::AuditEntry {
                timestamp: result.timestamp,
                session_id: session_id.to_string(),
                feature_id: target.clone(),
                error_kind: error.kind,
                error_id: error.error_id.clone(),
                fix_kind: result.strategy.fix_kind,
                tier: result.strategy.tier,
                confidence: result.strategy.confidence,
                rationale: result.strategy.rationale.clone(),
                before_wkt: original.wkt_string(),
                after_wkt: result.fixed_geometry.as_ref().map(Geometry::wkt_string),
                action,
                validation_ok: result.validation.passed,
                new_errors: new_errors as i64,
            })?;

            results.push(FixResult { new_errors, ..result });
        }

        let updated: Vec<Feature> = features
            .into_iter()
            .filter(|f| !deleted.contains(&f.id))
            .map(|mut f| {
                if let Some(g) = geometries.get(&f.id) {
                    f.geometry = g.clone();
                }
                f
            })
            .collect();

        Ok(RunReport {
            features: updated,
            results,
        })
    }
}

/// Conservative single-feature re-check used to estimate how many new
/// defects a fix introduced, independent of other features in the set
/// (`spec.md` §3 `FixResult.new_errors`).
fn local_error_count(geom: &Geometry<f64>, config: &crate::core::config::GeometryConfig) -> usize {
    let mut count = 0;
    if geometry::is_empty(geom) || !geometry::is_valid(geom) {
        count += 1;
    }
    let area = geometry::area_m2(geom);
    if area > 0.0 && (area < config.min_building_area_m2 || area > config.max_building_area_m2) {
        count += 1;
    }
    if let Geometry::Polygon(poly) = geom {
        if geometry::compactness(poly) < config.min_compactness {
            count += 1;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::decision::NullOracle;
    use crate::model::FeatureMetadata;
    use geo::polygon;

    fn bowtie_feature(id: &str) -> Feature {
        Feature {
            id: id.to_string(),
            geometry: Geometry::Polygon(polygon![
                (x: 0.0, y: 0.0),
                (x: 10.0, y: 10.0),
                (x: 10.0, y: 0.0),
                (x: 0.0, y: 10.0),
                (x: 0.0, y: 0.0),
            ]),
            metadata: FeatureMetadata::default(),
        }
    }

    fn coincident_feature(id: &str) -> Feature {
        Feature {
            id: id.to_string(),
            geometry: Geometry::Polygon(polygon![
                (x: 0.0, y: 0.0),
                (x: 10.0, y: 0.0),
                (x: 10.0, y: 10.0),
                (x: 0.0, y: 10.0),
                (x: 0.0, y: 0.0),
            ]),
            metadata: FeatureMetadata {
                confidence: 0.9,
                ..FeatureMetadata::default()
            },
        }
    }

    /// Three coincident duplicates a/b/c: the (a,b) and (a,c) pairs each
    /// delete their second feature at rule tier, so by the time the (b,c)
    /// pair is decided its target ("c") is already gone. That must still
    /// produce an audit row (property 5), not a silently dropped decision.
    #[test]
    fn already_deleted_target_is_audited_as_skipped() {
        let config = Config::default();
        let oracle = NullOracle;
        let pipeline = Pipeline::new(&config, &oracle);
        let audit = AuditLog::open_in_memory().unwrap();

        let features = vec![coincident_feature("a"), coincident_feature("b"), coincident_feature("c")];
        let report = pipeline.run(features, &[], None, &audit, "session-dup").unwrap();

        assert_eq!(report.features.len(), 1);
        assert_eq!(report.features[0].id, "a");

        let summary = audit.session_summary("session-dup").unwrap();
        assert_eq!(summary.total, 3, "one audit row per decided error, including the skipped one");
        assert_eq!(summary.applied, 2);
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn invalid_geometry_is_repaired_and_audited() {
        let config = Config::default();
        let oracle = NullOracle;
        let pipeline = Pipeline::new(&config, &oracle);
        let audit = AuditLog::open_in_memory().unwrap();
        let report = pipeline
            .run(vec![bowtie_feature("a")], &[], None, &audit, "session-1")
            .unwrap();
        assert_eq!(report.features.len(), 1);
        assert!(geometry::is_valid(&report.features[0].geometry));
        assert_eq!(report.results.len(), 1);
        assert!(report.results[0].success);
        let summary = audit.session_summary("session-1").unwrap();
        assert_eq!(summary.applied, 1);
    }
}
