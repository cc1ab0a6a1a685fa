//! Tier 2: the narrow reasoning-oracle interface (`spec.md` §4.2, §6, §9).
//!
//! The oracle is a pluggable collaborator; any network or LLM tooling used
//! to implement one lives outside this crate and must not leak types into
//! the core.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::model::{DetectedError, FeatureMetadata, FixKind, FixStrategy};

/// Structured recommendation an oracle may return for one error.
#[derive(Debug, Clone)]
pub struct Recommendation {
    pub fix_kind: FixKind,
    pub confidence: f64,
    pub rationale: String,
    pub parameters: BTreeMap<String, serde_json::Value>,
}

/// Context handed to the oracle for one decision.
pub struct OracleContext<'a> {
    pub error: &'a DetectedError,
    pub metadata_by_feature: &'a BTreeMap<String, FeatureMetadata>,
    /// The best strategy Tier 1 produced, if any, even if below
    /// `auto_fix_min`.
    pub rule_attempt: Option<&'a FixStrategy>,
}

/// A reasoning oracle consulted when no rule is sufficiently confident.
///
/// Implementations may block (network, subprocess); callers must honor
/// `timeout` and treat an elapsed deadline as "no recommendation"
/// (`spec.md` §5 Suspension points).
pub trait ReasoningOracle {
    /// Consult the oracle. Returning `Ok(None)` or an error is equivalent
    /// to "no match" — the engine proceeds to Tier 3.
    fn reason(
        &self,
        ctx: &OracleContext<'_>,
        timeout: Duration,
    ) -> Result<Option<Recommendation>, crate::core::errors::GeoFixError>;
}

/// No-op oracle: always declines. Used when no oracle is configured, so
/// `rules_only` behavior and "no oracle" behave identically.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullOracle;

impl ReasoningOracle for NullOracle {
    fn reason(
        &self,
        _ctx: &OracleContext<'_>,
        _timeout: Duration,
    ) -> Result<Option<Recommendation>, crate::core::errors::GeoFixError> {
        Ok(None)
    }
}
