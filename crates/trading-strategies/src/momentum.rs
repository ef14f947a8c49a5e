//! Momentum strategy.
//!
//! Rides strong rate-of-change moves when the MACD histogram agrees and RSI
//! confirms without being stretched.

use serde::{Deserialize, Serialize};
use trading_core::{
    error::StrategyError,
    traits::{Indicator, Strategy, StrategyInput, StrategyPerformance},
    types::{SignalAction, StrategySignal},
};
use trading_indicators::RateOfChange;

use crate::common::signal_with_levels;

pub const MOMENTUM_ID: &str = "momentum";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MomentumConfig {
    pub roc_period: usize,
    /// Minimum absolute rate of change (fraction)
    pub roc_threshold: f64,
    /// Long entries need RSI above this and below `rsi_ceiling`
    pub rsi_floor: f64,
    pub rsi_ceiling: f64,
    pub atr_stop_multiplier: f64,
    pub reward_risk: f64,
    pub signal_ttl_secs: i64,
}

impl Default for MomentumConfig {
    fn default() -> Self {
        Self {
            roc_period: 10,
            roc_threshold: 0.02,
            rsi_floor: 50.0,
            rsi_ceiling: 80.0,
            atr_stop_multiplier: 2.0,
            reward_risk: 2.0,
            signal_ttl_secs: 300,
        }
    }
}

impl MomentumConfig {
    pub fn validate(&self) -> Result<(), StrategyError> {
        if self.roc_period == 0 {
            return Err(StrategyError::InvalidConfig("ROC period must be positive".into()));
        }
        if self.roc_threshold <= 0.0 {
            return Err(StrategyError::InvalidConfig("ROC threshold must be positive".into()));
        }
        if self.rsi_floor >= self.rsi_ceiling {
            return Err(StrategyError::InvalidConfig(
                "RSI floor must be below RSI ceiling".into(),
            ));
        }
        if self.atr_stop_multiplier <= 0.0 || self.reward_risk <= 0.0 || self.signal_ttl_secs <= 0 {
            return Err(StrategyError::InvalidConfig(
                "ATR multiplier, reward/risk and TTL must be positive".into(),
            ));
        }
        Ok(())
    }
}

pub struct MomentumStrategy {
    config: MomentumConfig,
    roc: RateOfChange,
    performance: StrategyPerformance,
}

impl MomentumStrategy {
    pub fn new(config: MomentumConfig) -> Result<Self, StrategyError> {
        config.validate()?;
        let roc = RateOfChange::new(config.roc_period)
            .map_err(|e| StrategyError::InvalidConfig(e.to_string()))?;
        Ok(Self {
            config,
            roc,
            performance: StrategyPerformance::default(),
        })
    }
}

impl Strategy for MomentumStrategy {
    fn id(&self) -> &str {
        MOMENTUM_ID
    }

    fn name(&self) -> &str {
        "Momentum"
    }

    fn description(&self) -> &str {
        "Follows strong rate-of-change moves confirmed by MACD and RSI"
    }

    fn min_candles(&self) -> usize {
        50.max(self.config.roc_period + 1)
    }

    fn analyze(&self, input: &StrategyInput<'_>) -> Result<Option<StrategySignal>, StrategyError> {
        self.check_data(input)?;

        let closes: Vec<f64> = input.candles.iter().map(|c| c.close).collect();
        let roc = self
            .roc
            .latest(&closes)
            .map_err(|e| StrategyError::Internal(e.to_string()))?;

        let ind = &input.analysis.indicators;
        let cfg = &self.config;
        // Mirror the RSI band for shorts: 50..80 long becomes 20..50 short
        let short_floor = 100.0 - cfg.rsi_ceiling;
        let short_ceiling = 100.0 - cfg.rsi_floor;

        let action = if roc >= cfg.roc_threshold
            && ind.macd_histogram > 0.0
            && ind.rsi > cfg.rsi_floor
            && ind.rsi < cfg.rsi_ceiling
        {
            SignalAction::Buy
        } else if roc <= -cfg.roc_threshold
            && ind.macd_histogram < 0.0
            && ind.rsi > short_floor
            && ind.rsi < short_ceiling
        {
            SignalAction::Sell
        } else {
            return Ok(None);
        };

        let price = input.price();
        let stop_distance = ind.atr * cfg.atr_stop_multiplier;
        if stop_distance <= 0.0 {
            return Ok(None);
        }
        let dir = action.direction();
        let strength = (roc.abs() / (3.0 * cfg.roc_threshold)).min(1.0);
        let confidence = 0.5 + 0.3 * strength + if ind.volume_ratio > 1.2 { 0.1 } else { 0.0 };

        Ok(Some(signal_with_levels(
            self.id(),
            &input.asset.id,
            action,
            confidence,
            strength,
            cfg.signal_ttl_secs,
            (price, price - dir * stop_distance, price + dir * stop_distance * cfg.reward_risk),
            format!(
                "ROC({}) {:+.2}%, MACD histogram {:+.4}, RSI {:.1}",
                cfg.roc_period,
                roc * 100.0,
                ind.macd_histogram,
                ind.rsi
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
    use trading_core::types::Candle;

    fn rising(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let close = 100.0 * 1.004_f64.powi(i as i32);
                let (open, high, low) = (close * 0.999, close * 1.002, close * 0.997);
                Candle::new(i as i64 * 60_000, open, high, low, close, 1_000.0)
            })
            .collect()
    }

    #[test]
    fn test_buy_on_strong_rate_of_change() {
        let candles = rising(80);
        let mut analysis = fixtures::analysis(&candles);
        analysis.indicators.macd_histogram = 0.05;
        analysis.indicators.rsi = 65.0;
        analysis.indicators.atr = 0.8;
        let asset = fixtures::asset();

        let strategy = MomentumStrategy::new(MomentumConfig::default()).unwrap();
        let signal = strategy
            .analyze(&fixtures::input(&asset, &candles, &analysis))
            .unwrap()
            .unwrap();

        assert_eq!(signal.action, SignalAction::Buy);
        assert!(signal.confidence > 0.5);
        assert!(signal.stop_loss.unwrap() < signal.price.unwrap());
    }

    #[test]
    fn test_rsi_too_hot_blocks_entry() {
        let candles = rising(80);
        let mut analysis = fixtures::analysis(&candles);
        analysis.indicators.macd_histogram = 0.05;
        analysis.indicators.rsi = 85.0;
        analysis.indicators.atr = 0.8;
        let asset = fixtures::asset();

        let strategy = MomentumStrategy::new(MomentumConfig::default()).unwrap();
        assert!(strategy
            .analyze(&fixtures::input(&asset, &candles, &analysis))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = MomentumConfig {
            roc_period: 0,
            ..Default::default()
        };
        assert!(MomentumStrategy::new(config).is_err());
    }
}
