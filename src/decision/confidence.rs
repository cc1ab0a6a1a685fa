//! Confidence scoring for rule-produced strategies (`spec.md` §4.2).

/// Confidence from a positional-accuracy gap between two features, in
/// meters. Threshold ladder per `spec.md` §4.2.
#[must_use]
pub fn confidence_from_accuracy_gap(gap_m: f64) -> f64 {
    if gap_m >= 10.0 {
        0.95
    } else if gap_m >= 5.0 {
        0.85
    } else if gap_m >= 2.0 {
        0.75
    } else if gap_m >= 1.0 {
        0.65
    } else {
        0.55
    }
}

/// Confidence from an overlap ratio. Threshold ladder per `spec.md` §4.2.
#[must_use]
pub fn confidence_from_overlap_ratio(ratio: f64) -> f64 {
    if ratio >= 0.98 {
        0.95
    } else if ratio >= 0.80 {
        0.85
    } else if ratio >= 0.60 {
        0.75
    } else if ratio >= 0.40 {
        0.65
    } else {
        0.55
    }
}

/// Geometric mean of several confidence scores, each floored at 0.01 to
/// avoid a single near-zero term collapsing the combination to zero
/// (`spec.md` §4.2).
#[must_use]
pub fn combined_confidence(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let product: f64 = scores.iter().map(|s| s.max(0.01)).product();
    product.powf(1.0 / scores.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accuracy_gap_ladder() {
        assert!((confidence_from_accuracy_gap(10.0) - 0.95).abs() < f64::EPSILON);
        assert!((confidence_from_accuracy_gap(7.0) - 0.85).abs() < f64::EPSILON);
        assert!((confidence_from_accuracy_gap(3.0) - 0.75).abs() < f64::EPSILON);
        assert!((confidence_from_accuracy_gap(1.0) - 0.65).abs() < f64::EPSILON);
        assert!((confidence_from_accuracy_gap(0.1) - 0.55).abs() < f64::EPSILON);
    }

    #[test]
    fn overlap_ratio_ladder() {
        assert!((confidence_from_overlap_ratio(0.99) - 0.95).abs() < f64::EPSILON);
        assert!((confidence_from_overlap_ratio(0.85) - 0.85).abs() < f64::EPSILON);
        assert!((confidence_from_overlap_ratio(0.65) - 0.75).abs() < f64::EPSILON);
        assert!((confidence_from_overlap_ratio(0.45) - 0.65).abs() < f64::EPSILON);
        assert!((confidence_from_overlap_ratio(0.1) - 0.55).abs() < f64::EPSILON);
    }

    #[test]
    fn combined_is_geometric_mean() {
        let c = combined_confidence(&[0.65, 0.95]);
        assert!((c - (0.65f64 * 0.95).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn combined_floors_each_term() {
        let c = combined_confidence(&[0.0, 1.0]);
        assert!((c - (0.01f64 * 1.0).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn empty_scores_yield_zero() {
        assert_eq!(combined_confidence(&[]), 0.0);
    }
}
