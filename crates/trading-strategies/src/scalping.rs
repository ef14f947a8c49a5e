//! Scalping strategy: short EMA crossovers with tight fixed stops.

use serde::{Deserialize, Serialize};
use trading_core::{
    error::StrategyError,
    traits::{Indicator, Strategy, StrategyInput, StrategyPerformance},
    types::{SignalAction, StrategySignal},
};
use trading_indicators::Ema;

use crate::common::signal_with_levels;

pub const SCALPING_ID: &str = "scalping";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalpingConfig {
    pub fast_period: usize,
    pub slow_period: usize,
    /// Stop distance as a fraction of price
    pub stop_pct: f64,
    /// Target distance as a fraction of price
    pub target_pct: f64,
    /// Skip when the quoted spread exceeds this fraction of mid
    pub max_spread: f64,
    pub base_confidence: f64,
    pub signal_ttl_secs: i64,
}

impl Default for ScalpingConfig {
    fn default() -> Self {
        Self {
            fast_period: 5,
            slow_period: 13,
            stop_pct: 0.003,
            target_pct: 0.006,
            max_spread: 0.001,
            base_confidence: 0.4,
            signal_ttl_secs: 60,
        }
    }
}

impl ScalpingConfig {
    pub fn validate(&self) -> Result<(), StrategyError> {
        if self.fast_period == 0 || self.fast_period >= self.slow_period {
            return Err(StrategyError::InvalidConfig(
                "fast period must be positive and below slow period".into(),
            ));
        }
        if self.stop_pct <= 0.0 || self.target_pct <= 0.0 {
            return Err(StrategyError::InvalidConfig(
                "stop and target percentages must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.base_confidence) || self.signal_ttl_secs <= 0 {
            return Err(StrategyError::InvalidConfig(
                "base confidence must be in [0, 1] and TTL positive".into(),
            ));
        }
        Ok(())
    }
}

pub struct ScalpingStrategy {
    config: ScalpingConfig,
    fast: Ema,
    slow: Ema,
    performance: StrategyPerformance,
}

impl ScalpingStrategy {
    pub fn new(config: ScalpingConfig) -> Result<Self, StrategyError> {
        config.validate()?;
        let to_config_err =
            |e: trading_core::IndicatorError| StrategyError::InvalidConfig(e.to_string());
        Ok(Self {
            fast: Ema::new(config.fast_period).map_err(to_config_err)?,
            slow: Ema::new(config.slow_period).map_err(to_config_err)?,
            config,
            performance: StrategyPerformance::default(),
        })
    }
}

impl Strategy for ScalpingStrategy {
    fn id(&self) -> &str {
        SCALPING_ID
    }

    fn name(&self) -> &str {
        "Scalping"
    }

    fn description(&self) -> &str {
        "Short EMA crossovers with tight stops and low confidence"
    }

    fn min_candles(&self) -> usize {
        self.config.slow_period + 2
    }

    fn analyze(&self, input: &StrategyInput<'_>) -> Result<Option<StrategySignal>, StrategyError> {
        self.check_data(input)?;

        if let Some(quote) = input.quote {
            use rust_decimal::prelude::ToPrimitive;
            let spread = quote.spread_ratio().to_f64().unwrap_or(f64::MAX);
            if spread > self.config.max_spread {
                return Ok(None);
            }
        }

        let closes: Vec<f64> = input.candles.iter().map(|c| c.close).collect();
        let fast = self.fast.calculate(&closes);
        let slow = self.slow.calculate(&closes);
        let (Some(fast_now), Some(slow_now)) = (fast.last().copied(), slow.last().copied()) else {
            return Ok(None);
        };
        let (Some(fast_prev), Some(slow_prev)) = (
            fast.len().checked_sub(2).map(|i| fast[i]),
            slow.len().checked_sub(2).map(|i| slow[i]),
        ) else {
            return Ok(None);
        };

        let action = if fast_prev <= slow_prev && fast_now > slow_now {
            SignalAction::Buy
        } else if fast_prev >= slow_prev && fast_now < slow_now {
            SignalAction::Sell
        } else {
            return Ok(None);
        };

        let cfg = &self.config;
        let price = input.price();
        let dir = action.direction();
        let volume_boost = if input.analysis.indicators.volume_ratio > 1.0 { 0.1 } else { 0.0 };
        let gap = ((fast_now - slow_now).abs() / price / cfg.stop_pct).min(1.0);

        Ok(Some(signal_with_levels(
            self.id(),
            &input.asset.id,
            action,
            cfg.base_confidence + volume_boost,
            gap,
            cfg.signal_ttl_secs,
            (price, price * (1.0 - dir * cfg.stop_pct), price * (1.0 + dir * cfg.target_pct)),
            format!(
                "EMA{} crossed {} EMA{}",
                cfg.fast_period,
                if dir > 0.0 { "above" } else { "below" },
                cfg.slow_period
            ),
        )))
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or_default()
    }

    fn performance(&self) -> &StrategyPerformance {
        &self.performance
    }

    fn record_outcome(&mut self, pnl: f64) {
        self.performance.record(pnl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::fixtures;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use trading_core::types::{Candle, Quote};

    /// Falling then a sharp turn up on the last candle.
    fn crossing_up() -> Vec<Candle> {
        let mut closes: Vec<f64> = (0..60).map(|i| 110.0 - i as f64 * 0.2).collect();
        closes.push(closes[59] + 8.0);
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Candle::new(i as i64 * 60_000, c, c + 0.1, c - 0.1, c, 1_000.0))
            .collect()
    }

    #[test]
    fn test_buy_on_fast_cross() {
        let candles = crossing_up();
        let analysis = fixtures::analysis(&candles);
        let asset = fixtures::asset();

        let strategy = ScalpingStrategy::new(ScalpingConfig::default()).unwrap();
        let signal = strategy
            .analyze(&fixtures::input(&asset, &candles, &analysis))
            .unwrap()
            .unwrap();

        assert_eq!(signal.action, SignalAction::Buy);
        assert!(signal.confidence <= 0.5);
        assert!(signal.stop_loss.unwrap() < signal.price.unwrap());
    }

    #[test]
    fn test_wide_spread_skips() {
        let candles = crossing_up();
        let analysis = fixtures::analysis(&candles);
        let asset = fixtures::asset();
        let quote = Quote {
            asset_id: "AAPL".into(),
            bid: dec!(99.0),
            ask: dec!(101.0),
            last: dec!(100.0),
            volume: dec!(0),
            timestamp: Utc::now(),
        };
        let mut input = fixtures::input(&asset, &candles, &analysis);
        input.quote = Some(&quote);

        let strategy = ScalpingStrategy::new(ScalpingConfig::default()).unwrap();
        assert!(strategy.analyze(&input).unwrap().is_none());
    }

    #[test]
    fn test_config_requires_fast_below_slow() {
        let config = ScalpingConfig {
            fast_period: 20,
            ..Default::default()
        };
        assert!(ScalpingStrategy::new(config).is_err());
    }
}
