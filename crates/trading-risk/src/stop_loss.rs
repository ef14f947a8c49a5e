//! Stop-loss and take-profit placement.

use num_traits::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use trading_core::types::{round_away_from, Side};

/// Closest a stop may sit to the entry, as a fraction.
pub const MIN_STOP_DISTANCE: Decimal = dec!(0.001);

/// Which input produced the stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopMethod {
    Atr,
    Volatility,
    Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StopLevel {
    pub price: Decimal,
    pub method: StopMethod,
}

#[derive(Debug, Clone)]
pub struct StopLossCalculator {
    atr_multiplier: f64,
    fixed_pct: f64,
}

impl StopLossCalculator {
    pub fn new(atr_multiplier: f64, fixed_pct: f64) -> Self {
        Self {
            atr_multiplier,
            fixed_pct,
        }
    }

    /// Stop for a position opened on `side` at `entry`.
    ///
    /// ATR first (`entry ∓ ATR × multiplier`), then volatility
    /// (`entry ∓ entry × volatility × 2`), then the fixed percentage. The
    /// distance is never below [`MIN_STOP_DISTANCE`] of entry, rounding
    /// included.
    pub fn stop_loss(
        &self,
        entry: Decimal,
        side: Side,
        atr: Option<f64>,
        volatility: Option<f64>,
    ) -> StopLevel {
        let usable = |v: Option<f64>| {
            v.filter(|x| x.is_finite() && *x > 0.0)
                .and_then(Decimal::from_f64)
        };

        let (distance, method) = if let Some(atr) = usable(atr) {
            let multiplier = Decimal::from_f64(self.atr_multiplier).unwrap_or(Decimal::TWO);
            (atr * multiplier, StopMethod::Atr)
        } else if let Some(volatility) = usable(volatility) {
            (entry * volatility * Decimal::TWO, StopMethod::Volatility)
        } else {
            let pct = Decimal::from_f64(self.fixed_pct).unwrap_or(dec!(0.02));
            (entry * pct, StopMethod::Fixed)
        };

        let distance = distance.max(entry * MIN_STOP_DISTANCE);
        let price = match side {
            Side::Buy => (entry - distance).max(Decimal::ZERO),
            Side::Sell => entry + distance,
        };
        StopLevel {
            price: round_away_from(price, entry),
            method,
        }
    }

    /// Target at `reward_risk` times the stop distance beyond entry.
    pub fn take_profit(
        &self,
        entry: Decimal,
        stop: Decimal,
        side: Side,
        reward_risk: f64,
    ) -> Decimal {
        let risk = (entry - stop).abs();
        let reward = risk * Decimal::from_f64(reward_risk).unwrap_or(Decimal::TWO);
        let target = match side {
            Side::Buy => entry + reward,
            Side::Sell => entry - reward,
        };
        round_away_from(target.max(Decimal::ZERO), entry)
    }
}

impl Default for StopLossCalculator {
    fn default() -> Self {
        Self::new(2.0, 0.02)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atr_stop_preferred() {
        let calc = StopLossCalculator::default();
        let stop = calc.stop_loss(dec!(100), Side::Buy, Some(1.5), Some(0.02));
        assert_eq!(stop.method, StopMethod::Atr);
        assert_eq!(stop.price, dec!(97));
    }

    #[test]
    fn test_volatility_then_fixed() {
        let calc = StopLossCalculator::default();
        let stop = calc.stop_loss(dec!(100), Side::Sell, None, Some(0.01));
        assert_eq!(stop.method, StopMethod::Volatility);
        assert_eq!(stop.price, dec!(102));

        let stop = calc.stop_loss(dec!(100), Side::Buy, Some(f64::NAN), None);
        assert_eq!(stop.method, StopMethod::Fixed);
        assert_eq!(stop.price, dec!(98));
    }

    #[test]
    fn test_minimum_distance_enforced() {
        let calc = StopLossCalculator::default();
        let stop = calc.stop_loss(dec!(100), Side::Buy, Some(0.001), None);
        assert_eq!(stop.price, dec!(99.9));
    }

    #[test]
    fn test_sub_unit_entry_keeps_minimum_distance() {
        let calc = StopLossCalculator::default();
        for entry in [dec!(0.05), dec!(0.3333), dec!(0.00001234), dec!(1.00007)] {
            for side in [Side::Buy, Side::Sell] {
                let stop = calc.stop_loss(entry, side, Some(0.000001), None);
                let distance = (entry - stop.price).abs();
                assert!(
                    distance >= entry * MIN_STOP_DISTANCE,
                    "{side:?} stop {} too close to {entry}",
                    stop.price
                );
                match side {
                    Side::Buy => assert!(stop.price < entry),
                    Side::Sell => assert!(stop.price > entry),
                }
            }
        }
        let stop = calc.stop_loss(dec!(0.05), Side::Buy, Some(0.000001), None);
        assert_eq!(stop.price, dec!(0.04995));
    }

    #[test]
    fn test_stop_side_invariant() {
        let calc = StopLossCalculator::default();
        for atr in [None, Some(0.5), Some(4.0)] {
            let long = calc.stop_loss(dec!(50), Side::Buy, atr, None);
            let short = calc.stop_loss(dec!(50), Side::Sell, atr, None);
            assert!(long.price < dec!(50));
            assert!(short.price > dec!(50));
        }
    }

    #[test]
    fn test_take_profit() {
        let calc = StopLossCalculator::default();
        assert_eq!(calc.take_profit(dec!(100), dec!(97), Side::Buy, 2.0), dec!(106));
        assert_eq!(calc.take_profit(dec!(100), dec!(103), Side::Sell, 2.0), dec!(94));
    }
}
