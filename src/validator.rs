//! Post-fix geometry validation (`spec.md` §4.4).
//!
//! Runs a fixed ordered sequence of checks and reports every failure it
//! finds — callers use `passed` to decide whether to commit a fix or roll
//! it back.

use geo::{Area, Geometry};

use crate::core::config::ValidatorConfig;
use crate::geometry;
use crate::model::ValidationVerdict;

/// Validates a proposed post-fix geometry against its pre-fix original.
pub struct Validator<'a> {
    config: &'a ValidatorConfig,
}

impl<'a> Validator<'a> {
    #[must_use]
    pub const fn new(config: &'a ValidatorConfig) -> Self {
        Self { config }
    }

    /// Run the ordered check sequence: null, validity, area-nonzero,
    /// area-ratio, minimum-area. `allow_deletion` is true for the
    /// `delete` fix kind, whose nil post-geometry is intentional.
    #[must_use]
    pub fn validate_fix(
        &self,
        original: &Geometry<f64>,
        fixed: Option<&Geometry<f64>>,
        allow_deletion: bool,
    ) -> ValidationVerdict {
        let mut verdict = ValidationVerdict {
            passed: true,
            checks_run: Vec::new(),
            failures: Vec::new(),
        };

        verdict.checks_run.push("not_null");
        let Some(fixed) = fixed else {
            if !allow_deletion {
                verdict.passed = false;
                verdict
                    .failures
                    .push("post-fix geometry is null but deletion was not requested".to_string());
            }
            return verdict;
        };

        verdict.checks_run.push("validity");
        if !geometry::is_valid(fixed) {
            verdict.passed = false;
            verdict.failures.push("post-fix geometry is not valid".to_string());
        }

        verdict.checks_run.push("area_nonzero");
        let post_area = fixed.unsigned_area();
        if geometry::is_empty(fixed) || post_area <= 0.0 {
            verdict.passed = false;
            verdict
                .failures
                .push("post-fix geometry is empty or has zero area".to_string());
        }

        let pre_area = original.unsigned_area();
        if pre_area > 0.0 && post_area > 0.0 {
            verdict.checks_run.push("area_ratio");
            let ratio = post_area / pre_area;
            let max = self.config.max_area_ratio_change;
            if ratio > max || ratio < 1.0 / max {
                verdict.passed = false;
                verdict.failures.push(format!(
                    "area ratio {ratio:.3} exceeds allowed change of {max:.1}x in either direction"
                ));
            }
        }

        verdict.checks_run.push("min_area");
        if post_area > 0.0 && post_area < self.config.min_area_m2 {
            verdict.passed = false;
            verdict.failures.push(format!(
                "post-fix area {post_area:.3} m^2 is below the minimum of {:.3} m^2",
                self.config.min_area_m2
            ));
        }

        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn square(side: f64) -> Geometry<f64> {
        Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0),
            (x: side, y: 0.0),
            (x: side, y: side),
            (x: 0.0, y: side),
            (x: 0.0, y: 0.0),
        ])
    }

    #[test]
    fn deletion_with_nil_geometry_passes_when_allowed() {
        let config = ValidatorConfig::default();
        let validator = Validator::new(&config);
        let original = square(2.0);
        let verdict = validator.validate_fix(&original, None, true);
        assert!(verdict.passed);
    }

    #[test]
    fn nil_geometry_fails_when_deletion_not_allowed() {
        let config = ValidatorConfig::default();
        let validator = Validator::new(&config);
        let original = square(2.0);
        let verdict = validator.validate_fix(&original, None, false);
        assert!(!verdict.passed);
    }

    #[test]
    fn valid_unchanged_geometry_passes() {
        let config = ValidatorConfig::default();
        let validator = Validator::new(&config);
        let original = square(2.0);
        let fixed = square(2.0);
        let verdict = validator.validate_fix(&original, Some(&fixed), false);
        assert!(verdict.passed);
    }

    #[test]
    fn area_collapse_beyond_ratio_fails() {
        let config = ValidatorConfig::default();
        let validator = Validator::new(&config);
        let original = square(10.0); // area 100
        let fixed = square(1.0); // area 1, ratio 0.01 << 1/5.0
        let verdict = validator.validate_fix(&original, Some(&fixed), false);
        assert!(!verdict.passed);
    }

    #[test]
    fn area_below_minimum_fails() {
        let config = ValidatorConfig::default();
        let validator = Validator::new(&config);
        let original = square(0.5);
        let fixed = square(0.5);
        let verdict = validator.validate_fix(&original, Some(&fixed), false);
        assert!(!verdict.passed, "area 0.25 m^2 is below the 0.5 m^2 minimum");
    }
}
