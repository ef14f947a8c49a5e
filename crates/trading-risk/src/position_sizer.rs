//! Position sizing via the Kelly criterion.

use num_traits::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Trades needed before the track record drives the Kelly fraction.
pub const MIN_KELLY_TRADES: usize = 10;

/// Raw Kelly fraction `f* = (p·b − q) / b`, with `b = avg_win / avg_loss`.
///
/// Returns `None` when the payoff ratio is undefined.
pub fn kelly_fraction(win_rate: f64, avg_win: f64, avg_loss: f64) -> Option<f64> {
    if avg_win <= 0.0 || avg_loss <= 0.0 || !(0.0..=1.0).contains(&win_rate) {
        return None;
    }
    let b = avg_win / avg_loss;
    let q = 1.0 - win_rate;
    Some((win_rate * b - q) / b)
}

/// Round `quantity` down to `precision` decimals, never below zero.
pub fn round_quantity(quantity: Decimal, precision: u32) -> Decimal {
    quantity
        .round_dp_with_strategy(precision, RoundingStrategy::ToZero)
        .max(Decimal::ZERO)
}

/// Breakdown of a sizing computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizingResult {
    /// Raw Kelly fraction, if the history supported one
    pub kelly: Option<f64>,
    /// Fraction of equity after the multiplier and cap
    pub fraction: f64,
    pub position_value: Decimal,
    pub quantity: Decimal,
}

/// Sizes positions as a capped, fractional-Kelly share of equity.
#[derive(Debug, Clone)]
pub struct PositionSizer {
    kelly_multiplier: f64,
    max_position_size: f64,
    max_loss_per_trade: f64,
}

impl PositionSizer {
    pub fn new(
        kelly_multiplier: f64,
        max_position_size: Decimal,
        max_loss_per_trade: Decimal,
    ) -> Self {
        Self {
            kelly_multiplier,
            max_position_size: max_position_size.to_f64().unwrap_or(0.0),
            max_loss_per_trade: max_loss_per_trade.to_f64().unwrap_or(0.0),
        }
    }

    /// Fraction of equity to commit.
    ///
    /// `kelly × multiplier` capped at the max position size, floored at zero.
    /// Without a usable track record the cap itself is used.
    pub fn fraction(&self, kelly: Option<f64>) -> f64 {
        match kelly {
            Some(k) => (k * self.kelly_multiplier).clamp(0.0, self.max_position_size),
            None => self.max_position_size,
        }
    }

    /// Quantity for a trade at `entry` with its stop at `stop`, rounded down
    /// to `precision` decimals.
    ///
    /// The Kelly notional is further limited so the loss at the stop stays
    /// within the per-trade maximum.
    pub fn size(
        &self,
        precision: u32,
        equity: Decimal,
        entry: Decimal,
        stop: Option<Decimal>,
        kelly: Option<f64>,
    ) -> SizingResult {
        let fraction = self.fraction(kelly);
        let mut result = SizingResult {
            kelly,
            fraction,
            position_value: Decimal::ZERO,
            quantity: Decimal::ZERO,
        };
        if equity <= Decimal::ZERO || entry <= Decimal::ZERO {
            return result;
        }

        let position_value = equity * Decimal::from_f64(fraction).unwrap_or(Decimal::ZERO);
        let mut quantity = position_value / entry;

        if let Some(stop) = stop {
            let per_unit_risk = (entry - stop).abs();
            if per_unit_risk > Decimal::ZERO {
                let max_loss =
                    equity * Decimal::from_f64(self.max_loss_per_trade).unwrap_or(Decimal::ZERO);
                quantity = quantity.min(max_loss / per_unit_risk);
            }
        }

        result.quantity = round_quantity(quantity, precision);
        result.position_value = result.quantity * entry;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_kelly_fraction() {
        // (0.6 * 2 - 0.4) / 2
        let k = kelly_fraction(0.6, 2.0, 1.0).unwrap();
        assert!((k - 0.4).abs() < 1e-12);
        assert!(kelly_fraction(0.6, 2.0, 0.0).is_none());
    }

    #[test]
    fn test_fraction_applies_multiplier_and_cap() {
        let sizer = PositionSizer::new(0.25, dec!(0.10), dec!(0.02));
        assert!((sizer.fraction(Some(0.4)) - 0.1).abs() < 1e-12);

        let tight = PositionSizer::new(0.25, dec!(0.05), dec!(0.02));
        assert!((tight.fraction(Some(0.4)) - 0.05).abs() < 1e-12);

        // Negative edge never sizes up
        assert_eq!(sizer.fraction(Some(-0.3)), 0.0);
        assert!((sizer.fraction(None) - 0.10).abs() < 1e-12);
    }

    #[test]
    fn test_size_within_position_cap() {
        let sizer = PositionSizer::new(0.25, dec!(0.05), dec!(0.02));
        let result = sizer.size(0, dec!(100000), dec!(175), Some(dec!(171.5)), None);
        // 5000 / 175 = 28.57
        assert_eq!(result.quantity, dec!(28));
        assert!(result.position_value <= dec!(5000));
    }

    #[test]
    fn test_size_limited_by_stop_distance() {
        let sizer = PositionSizer::new(0.25, dec!(0.10), dec!(0.01));
        // Risk budget 1000 at 10/unit = 100 units, Kelly cap allows 100 at 100
        let result = sizer.size(0, dec!(100000), dec!(50), Some(dec!(40)), None);
        assert_eq!(result.quantity, dec!(100));
    }

    #[test]
    fn test_fractional_units_keep_their_precision() {
        let sizer = PositionSizer::new(0.25, dec!(0.10), dec!(0.02));
        // 10000 / 60000 = 0.16666..
        let whole = sizer.size(0, dec!(100000), dec!(60000), Some(dec!(58800)), None);
        assert_eq!(whole.quantity, Decimal::ZERO);

        let fractional = sizer.size(6, dec!(100000), dec!(60000), Some(dec!(58800)), None);
        assert_eq!(fractional.quantity, dec!(0.166666));
        assert!(fractional.position_value <= dec!(10000));
    }

    #[test]
    fn test_round_quantity_truncates() {
        assert_eq!(round_quantity(dec!(2.999), 0), dec!(2));
        assert_eq!(round_quantity(dec!(0.1234567), 4), dec!(0.1234));
        assert_eq!(round_quantity(dec!(-1), 2), Decimal::ZERO);
    }
}
