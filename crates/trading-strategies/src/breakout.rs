//! Breakout strategy.
//!
//! Enters when the last close clears the prior channel high (or low) with
//! expanding volume. The stop sits back inside the broken level.

use serde::{Deserialize, Serialize};
use trading_core::{
    error::StrategyError,
    traits::{Strategy, StrategyInput, StrategyPerformance},
    types::{SignalAction, StrategySignal},
};

use crate::common::signal_with_levels;

pub const BREAKOUT_ID: &str = "breakout";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakoutConfig {
    /// Candles forming the channel, excluding the breakout candle
    pub lookback: usize,
    /// Last volume over average volume needed to confirm
    pub volume_multiplier: f64,
    /// Close must clear the level by this fraction
    pub breakout_buffer: f64,
    /// Stop distance inside the level, in ATRs
    pub atr_stop_multiplier: f64,
    pub reward_risk: f64,
    pub signal_ttl_secs: i64,
}

impl Default for BreakoutConfig {
    fn default() -> Self {
        Self {
            lookback: 20,
            volume_multiplier: 1.5,
            breakout_buffer: 0.001,
            atr_stop_multiplier: 0.5,
            reward_risk: 2.0,
            signal_ttl_secs: 180,
        }
    }
}

impl BreakoutConfig {
    pub fn validate(&self) -> Result<(), StrategyError> {
        if self.lookback < 2 {
            return Err(StrategyError::InvalidConfig("lookback must be at least 2".into()));
        }
        if self.volume_multiplier < 1.0 {
            return Err(StrategyError::InvalidConfig(
                "volume multiplier must be at least 1".into(),
            ));
        }
        if self.breakout_buffer < 0.0 || self.atr_stop_multiplier <= 0.0 || self.reward_risk <= 0.0
        {
            return Err(StrategyError::InvalidConfig(
                "buffer must be non-negative, ATR multiplier and reward/risk positive".into(),
            ));
        }
        if self.signal_ttl_secs <= 0 {
            return Err(StrategyError::InvalidConfig("signal TTL must be positive".into()));
        }
        Ok(())
    }
}

pub struct BreakoutStrategy {
    config: BreakoutConfig,
    performance: StrategyPerformance,
}

impl BreakoutStrategy {
    pub fn new(config: BreakoutConfig) -> Self {
        Self {
            config,
            performance: StrategyPerformance::default(),
        }
    }
}

impl Default for BreakoutStrategy {
    fn default() -> Self {
        Self::new(BreakoutConfig::default())
    }
}

impl Strategy for BreakoutStrategy {
    fn id(&self) -> &str {
        BREAKOUT_ID
    }

    fn name(&self) -> &str {
        "Breakout"
    }

    fn description(&self) -> &str {
        "Trades channel breakouts confirmed by volume expansion"
    }

    fn min_candles(&self) -> usize {
        50.max(self.config.lookback + 1)
    }

    fn analyze(&self, input: &StrategyInput<'_>) -> Result<Option<StrategySignal>, StrategyError> {
        self.check_data(input)?;

        let cfg = &self.config;
        let candles = input.candles;
        let last = candles[candles.len() - 1];
        let channel = &candles[candles.len() - 1 - cfg.lookback..candles.len() - 1];

        let channel_high = channel.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
        let channel_low = channel.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
        let avg_volume = channel.iter().map(|c| c.volume).sum::<f64>() / channel.len() as f64;
        let volume_ratio = if avg_volume > 0.0 { last.volume / avg_volume } else { 0.0 };

        if volume_ratio < cfg.volume_multiplier {
            return Ok(None);
        }

        let (action, level) = if last.close > channel_high * (1.0 + cfg.breakout_buffer) {
            (SignalAction::Buy, channel_high)
        } else if last.close < channel_low * (1.0 - cfg.breakout_buffer) {
            (SignalAction::Sell, channel_low)
        } else {
            return Ok(None);
        };

        let atr = input.analysis.indicators.atr;
        let dir = action.direction();
        let price = input.price();
        let stop = level - dir * atr * cfg.atr_stop_multiplier;
        let risk = (price - stop) * dir;
        if risk <= 0.0 {
            return Ok(None);
        }
        let target = price + dir * risk * cfg.reward_risk;

        // Room to run: no known level sits between price and target
        let analysis = input.analysis;
        let obstructed = match action {
            SignalAction::Buy => analysis.nearest_resistance().is_some_and(|r| r < target),
            _ => analysis.nearest_support().is_some_and(|s| s > target),
        };
        let volume_strength = ((volume_ratio / cfg.volume_multiplier) - 1.0).clamp(0.0, 1.0);
        let confidence = 0.55 + 0.2 * volume_strength + if obstructed { 0.0 } else { 0.1 };

        Ok(Some(signal_with_levels(
            self.id(),
            &input.asset.id,
            action,
            confidence,
            volume_strength.max(0.3),
            cfg.signal_ttl_secs,
            (price, stop, target),
            format!(
                "Close {:.2} broke {}-candle {} {:.2} on {:.1}x volume",
                last.close,
                cfg.lookback,
                if dir > 0.0 { "high" } else { "low" },
                level,
                volume_ratio
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

    fn with_breakout(volume: f64, close: f64) -> Vec<Candle> {
        let mut candles: Vec<Candle> = (0..60)
            .map(|i| Candle::new(i * 60_000, 100.0, 101.0, 99.0, 100.0, 1_000.0))
            .collect();
        candles.push(Candle::new(60 * 60_000, 100.5, close + 0.2, 100.4, close, volume));
        candles
    }

    #[test]
    fn test_breakout_with_volume() {
        let candles = with_breakout(3_000.0, 102.0);
        let mut analysis = fixtures::analysis(&candles);
        analysis.indicators.atr = 1.0;
        analysis.price = 102.0;
        analysis.resistance.clear();
        let asset = fixtures::asset();

        let signal = BreakoutStrategy::default()
            .analyze(&fixtures::input(&asset, &candles, &analysis))
            .unwrap()
            .unwrap();

        assert_eq!(signal.action, SignalAction::Buy);
        // Stop half an ATR under the broken 101 high
        assert_eq!(signal.stop_loss.unwrap().to_string(), "100.5");
        assert!((signal.confidence - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_breakout_without_volume_ignored() {
        let candles = with_breakout(1_100.0, 102.0);
        let analysis = fixtures::analysis(&candles);
        let asset = fixtures::asset();

        assert!(BreakoutStrategy::default()
            .analyze(&fixtures::input(&asset, &candles, &analysis))
            .unwrap()
            .is_none());
    }
}
