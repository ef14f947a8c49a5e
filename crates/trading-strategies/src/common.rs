//! Helpers shared by the built-in strategies.

use chrono::Duration;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use trading_core::types::{round_price, SignalAction, StrategySignal};

pub(crate) fn decimal(value: f64) -> Option<Decimal> {
    if !value.is_finite() || value <= 0.0 {
        return None;
    }
    Decimal::from_f64(value).map(round_price)
}

/// Build a signal with entry, stop and target levels in one go.
#[allow(clippy::too_many_arguments)]
pub(crate) fn signal_with_levels(
    strategy_id: &str,
    asset_id: &str,
    action: SignalAction,
    confidence: f64,
    strength: f64,
    ttl_secs: i64,
    (price, stop, target): (f64, f64, f64),
    reasoning: String,
) -> StrategySignal {
    StrategySignal::new(strategy_id, asset_id, action, confidence, Duration::seconds(ttl_secs))
        .with_strength(strength)
        .with_levels(decimal(price), decimal(stop), decimal(target))
        .with_reasoning(reasoning)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use trading_core::traits::StrategyInput;
    use trading_core::types::{Asset, Candle, TechnicalAnalysis};
    use trading_indicators::TechnicalAnalyzer;

    /// Gently oscillating candles around 100.
    pub fn candles(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let close = 100.0 + (i as f64 * 0.4).sin() * 2.0;
                let (open, high, low) = (close - 0.1, close + 0.6, close - 0.6);
                Candle::new(i as i64 * 60_000, open, high, low, close, 1_000.0)
            })
            .collect()
    }

    pub fn analysis(candles: &[Candle]) -> TechnicalAnalysis {
        TechnicalAnalyzer::default().analyze("AAPL", candles).unwrap()
    }

    pub fn asset() -> Asset {
        Asset::new("AAPL", "NASDAQ", "tech")
    }

    pub fn input<'a>(
        asset: &'a Asset,
        candles: &'a [Candle],
        analysis: &'a TechnicalAnalysis,
    ) -> StrategyInput<'a> {
        StrategyInput {
            asset,
            candles,
            analysis,
            quote: None,
            position: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_rejects_non_positive() {
        assert!(decimal(0.0).is_none());
        assert!(decimal(f64::NAN).is_none());
        assert_eq!(decimal(101.123456).unwrap().to_string(), "101.1235");
    }
}
