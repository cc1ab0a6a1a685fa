//! Tier dispatch: rules → oracle → human review (`spec.md` §4.2).

use std::collections::BTreeMap;
use std::time::Duration;

use geo::Geometry;

use crate::core::config::{DecisionConfig, GeometryConfig};
use crate::decision::oracle::{OracleContext, ReasoningOracle};
use crate::decision::rules::{run_rules, RuleInput};
use crate::model::{DetectedError, FeatureMetadata, FixKind, FixStrategy, RoadSegment, Tier};

/// Everything the decision engine needs from the pipeline's working
/// state to decide a single error.
pub struct DecisionContext<'a> {
    pub metadata: &'a BTreeMap<String, FeatureMetadata>,
    pub geometries: &'a BTreeMap<String, Geometry<f64>>,
    pub boundary: Option<&'a Geometry<f64>>,
    pub roads: &'a [RoadSegment],
    pub decision: &'a DecisionConfig,
    pub geometry: &'a GeometryConfig,
    pub oracle: &'a dyn ReasoningOracle,
    pub oracle_timeout: Duration,
    pub rules_only: bool,
}

/// Decide a fix strategy for a single error. Always returns a strategy —
/// worst case a `human_review` fallback (`spec.md` §4.2, §8 property 3).
#[must_use]
pub fn decide(error: &DetectedError, ctx: &DecisionContext<'_>) -> FixStrategy {
    let rule_input = RuleInput {
        error,
        metadata: ctx.metadata,
        geometries: ctx.geometries,
        boundary: ctx.boundary,
        roads: ctx.roads,
        decision: ctx.decision,
        geometry: ctx.geometry,
    };
    let rule_attempt = run_rules(&rule_input);

    if let Some(strategy) = &rule_attempt {
        if strategy.confidence >= ctx.decision.auto_fix_min {
            return strategy.clone();
        }
    }

    if !ctx.rules_only {
        let oracle_ctx = OracleContext {
            error,
            metadata_by_feature: ctx.metadata,
            rule_attempt: rule_attempt.as_ref(),
        };
        if let Ok(Some(recommendation)) = ctx.oracle.reason(&oracle_ctx, ctx.oracle_timeout) {
            if recommendation.confidence >= ctx.decision.llm_fix_min {
                let target = error
                    .affected_features
                    .first()
                    .cloned()
                    .unwrap_or_default();
                return FixStrategy {
                    error_id: error.error_id.clone(),
                    fix_kind: recommendation.fix_kind,
                    tier: Tier::Oracle,
                    confidence: recommendation.confidence,
                    params: recommendation.parameters,
                    geometry_params: BTreeMap::new(),
                    target_feature: target,
                    rationale: recommendation.rationale,
                };
            }
        }
    }

    human_review_fallback(error, rule_attempt)
}

fn human_review_fallback(error: &DetectedError, rule_attempt: Option<FixStrategy>) -> FixStrategy {
    let target = error.affected_features.first().cloned().unwrap_or_default();
    let (confidence, rationale) = rule_attempt.map_or_else(
        || (0.0, format!("{}: no rule or oracle match", error.kind.as_str())),
        |s| (s.confidence, format!("{}; insufficient confidence for automated fix", s.rationale)),
    );
    FixStrategy {
        error_id: error.error_id.clone(),
        fix_kind: FixKind::HumanReview,
        tier: Tier::Human,
        confidence,
        params: BTreeMap::new(),
        geometry_params: BTreeMap::new(),
        target_feature: target,
        rationale,
    }
}

/// Map `decide` over an ordered error list, preserving order
/// (`spec.md` §4.2 `decide_batch`).
#[must_use]
pub fn decide_batch(errors: &[DetectedError], ctx: &DecisionContext<'_>) -> Vec<FixStrategy> {
    errors.iter().map(|error| decide(error, ctx)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ErrorKind, ErrorProperties, Severity};
    use crate::decision::oracle::NullOracle;

    fn bowtie_error() -> DetectedError {
        DetectedError {
            error_id: "err-000000".to_string(),
            kind: ErrorKind::InvalidGeometry,
            severity: Severity::High,
            witness: Geometry::Point(geo::Point::new(0.0, 0.0)),
            affected_features: vec!["a".to_string()],
            properties: ErrorProperties::default(),
            provenance: "test",
        }
    }

    #[test]
    fn invalid_geometry_resolves_at_rule_tier() {
        let metadata = BTreeMap::new();
        let geometries = BTreeMap::new();
        let decision = DecisionConfig::default();
        let geometry = GeometryConfig::default();
        let oracle = NullOracle;
        let ctx = DecisionContext {
            metadata: &metadata,
            geometries: &geometries,
            boundary: None,
            roads: &[],
            decision: &decision,
            geometry: &geometry,
            oracle: &oracle,
            oracle_timeout: Duration::from_millis(100),
            rules_only: true,
        };
        let error = bowtie_error();
        let strategy = decide(&error, &ctx);
        assert_eq!(strategy.fix_kind, FixKind::MakeValid);
        assert_eq!(strategy.tier, Tier::Rule);
        assert!((strategy.confidence - 0.95).abs() < f64::EPSILON);
    }

    #[test]
    fn unmatched_error_falls_back_to_human_review() {
        let metadata = BTreeMap::new();
        let geometries = BTreeMap::new();
        let decision = DecisionConfig::default();
        let geometry = GeometryConfig::default();
        let oracle = NullOracle;
        let ctx = DecisionContext {
            metadata: &metadata,
            geometries: &geometries,
            boundary: None,
            roads: &[],
            decision: &decision,
            geometry: &geometry,
            oracle: &oracle,
            oracle_timeout: Duration::from_millis(100),
            rules_only: true,
        };
        let error = DetectedError {
            error_id: "err-000001".to_string(),
            kind: ErrorKind::EmptyGeometry,
            severity: Severity::High,
            witness: Geometry::Point(geo::Point::new(0.0, 0.0)),
            affected_features: vec!["a".to_string()],
            properties: ErrorProperties::default(),
            provenance: "test",
        };
        let strategy = decide(&error, &ctx);
        assert_eq!(strategy.fix_kind, FixKind::HumanReview);
        assert_eq!(strategy.tier, Tier::Human);
    }
}
