//! `margin = (Σ 1/odds_i − 1) × 100` over active outcomes (spec §3, §4.B,
//! §8 property 3).

use crate::error::MappingError;
use crate::model::OutcomeOdds;

/// Computes the overround for a set of outcomes, rejecting any non-positive
/// odds with [`MappingError::InvalidOddsValue`] before it ever reaches
/// storage (spec §4.B Numeric semantics).
pub fn compute_margin(outcomes: &[OutcomeOdds]) -> Result<f64, MappingError> {
    let mut sum_inverse = 0.0;
    for outcome in outcomes {
        if !outcome.active {
            continue;
        }
        if outcome.odds <= 0.0 {
            return Err(MappingError::InvalidOddsValue(outcome.odds));
        }
        sum_inverse += 1.0 / outcome.odds;
    }
    Ok((sum_inverse - 1.0) * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(odds: f64, active: bool) -> OutcomeOdds {
        OutcomeOdds { name: "x".into(), odds, active }
    }

    #[test]
    fn margin_matches_reference_formula() {
        // E4: {1.85, 3.40, 4.20} -> ~5.17%
        let outcomes = vec![outcome(1.85, true), outcome(3.40, true), outcome(4.20, true)];
        let margin = compute_margin(&outcomes).unwrap();
        assert!((margin - 5.1735).abs() < 1e-3, "margin was {margin}");
    }

    #[test]
    fn inactive_outcomes_excluded_from_sum() {
        let outcomes = vec![outcome(2.0, true), outcome(2.0, true), outcome(999.0, false)];
        let margin = compute_margin(&outcomes).unwrap();
        assert!((margin - 0.0).abs() < 1e-6);
    }

    #[test]
    fn non_positive_odds_rejected() {
        let outcomes = vec![outcome(1.9, true), outcome(0.0, true)];
        assert_eq!(compute_margin(&outcomes), Err(MappingError::InvalidOddsValue(0.0)));
    }

    #[test]
    fn negative_odds_rejected() {
        let outcomes = vec![outcome(-1.5, true)];
        assert_eq!(compute_margin(&outcomes), Err(MappingError::InvalidOddsValue(-1.5)));
    }
}
