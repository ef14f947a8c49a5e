//! Price precision.

use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places kept for prices of one unit or more.
pub const PRICE_DP: u32 = 4;

const MAX_PRICE_DP: u32 = 16;

/// Decimal places to keep for prices near `reference`.
///
/// Four at or above one. Each leading zero after the decimal point adds a
/// place, so sub-unit prices never collapse to zero.
pub fn price_scale(reference: Decimal) -> u32 {
    let mut value = reference.abs();
    let mut scale = PRICE_DP;
    if value.is_zero() {
        return scale;
    }
    while value < Decimal::ONE && scale < MAX_PRICE_DP {
        value *= Decimal::TEN;
        scale += 1;
    }
    scale
}

/// `price` rounded to its own scale, midpoint away from zero.
pub fn round_price(price: Decimal) -> Decimal {
    price.round_dp_with_strategy(price_scale(price), RoundingStrategy::MidpointAwayFromZero)
}

/// `level` rounded at the scale of `reference`, never toward it.
///
/// Used for stops and targets so rounding can only widen their distance
/// from the entry.
pub fn round_away_from(level: Decimal, reference: Decimal) -> Decimal {
    let scale = price_scale(reference);
    let strategy = if level < reference {
        RoundingStrategy::ToNegativeInfinity
    } else {
        RoundingStrategy::ToPositiveInfinity
    };
    level.round_dp_with_strategy(scale, strategy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_scale_grows_below_one() {
        assert_eq!(price_scale(dec!(175)), 4);
        assert_eq!(price_scale(dec!(1)), 4);
        assert_eq!(price_scale(dec!(0.05)), 6);
        assert_eq!(price_scale(dec!(0.00001234)), 9);
        assert_eq!(price_scale(Decimal::ZERO), 4);
    }

    #[test]
    fn test_small_prices_survive_rounding() {
        assert_eq!(round_price(dec!(174.91254)), dec!(174.9125));
        assert_eq!(round_price(dec!(0.0000123456)), dec!(0.000012346));
        assert!(round_price(dec!(0.00003)) > Decimal::ZERO);
    }

    #[test]
    fn test_round_away_from_reference() {
        assert_eq!(round_away_from(dec!(99.99995), dec!(100)), dec!(99.9999));
        assert_eq!(round_away_from(dec!(100.00001), dec!(100)), dec!(100.0001));
        assert_eq!(round_away_from(dec!(0.0499501), dec!(0.05)), dec!(0.04995));
    }
}
