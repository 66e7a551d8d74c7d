//! Profit calculation for a two-leg round

use serde::Serialize;

/// Outcome of comparing a round's final amount against its input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SpreadEvaluation {
    pub profitable: bool,
    /// `final - initial` in input-token smallest units
    pub profit: i128,
}

pub struct ProfitCalculator;

impl ProfitCalculator {
    /// A round is worth executing only when it returns strictly more than `min_profit` over its input.
    ///
    /// Works in integer units so no rounding ever turns a loss into a profit.
    pub fn evaluate(amount_in: u64, amount_out: u64, min_profit: u64) -> SpreadEvaluation {
        let profit = amount_out as i128 - amount_in as i128;
        SpreadEvaluation {
            profitable: profit > 0 && profit > min_profit as i128,
            profit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profit_above_threshold() {
        let eval = ProfitCalculator::evaluate(1_000_000, 1_000_450, 400);
        assert!(eval.profitable);
        assert_eq!(eval.profit, 450);
    }

    #[test]
    fn test_profit_below_threshold() {
        let eval = ProfitCalculator::evaluate(1_000_000, 1_000_300, 400);
        assert!(!eval.profitable);
        assert_eq!(eval.profit, 300);
    }

    #[test]
    fn test_threshold_is_strict() {
        assert!(!ProfitCalculator::evaluate(1_000_000, 1_000_400, 400).profitable);
        assert!(ProfitCalculator::evaluate(1_000_000, 1_000_401, 400).profitable);
    }

    #[test]
    fn test_zero_threshold_needs_positive_profit() {
        assert!(!ProfitCalculator::evaluate(1_000_000, 1_000_000, 0).profitable);
        assert!(ProfitCalculator::evaluate(1_000_000, 1_000_001, 0).profitable);
    }

    #[test]
    fn test_loss_is_negative() {
        let eval = ProfitCalculator::evaluate(1_000_000, 999_000, 0);
        assert!(!eval.profitable);
        assert_eq!(eval.profit, -1_000);
        let eval = ProfitCalculator::evaluate(u64::MAX, 0, 0);
        assert_eq!(eval.profit, -(u64::MAX as i128));
    }
}
