//! Mean reversion strategy using Bollinger %B and RSI extremes.
//!
//! Buys when price sits at or below the lower band with RSI oversold,
//! sells the mirror case. Targets the middle band.

use serde::{Deserialize, Serialize};
use trading_core::{
    error::StrategyError,
    traits::{Strategy, StrategyInput, StrategyPerformance},
    types::{SignalAction, StrategySignal},
};

use crate::common::signal_with_levels;

pub const MEAN_REVERSION_ID: &str = "mean_reversion";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeanReversionConfig {
    /// %B at or below this (or at or above 1 minus this) counts as stretched
    pub entry_percent_b: f64,
    pub oversold_rsi: f64,
    pub overbought_rsi: f64,
    /// Stop placed this many ATRs beyond the band
    pub atr_stop_multiplier: f64,
    pub signal_ttl_secs: i64,
}

impl Default for MeanReversionConfig {
    fn default() -> Self {
        Self {
            entry_percent_b: 0.05,
            oversold_rsi: 30.0,
            overbought_rsi: 70.0,
            atr_stop_multiplier: 1.0,
            signal_ttl_secs: 300,
        }
    }
}

impl MeanReversionConfig {
    pub fn validate(&self) -> Result<(), StrategyError> {
        if !(0.0..0.5).contains(&self.entry_percent_b) {
            return Err(StrategyError::InvalidConfig(
                "entry_percent_b must be in [0, 0.5)".into(),
            ));
        }
        if self.oversold_rsi >= self.overbought_rsi {
            return Err(StrategyError::InvalidConfig(
                "oversold RSI must be below overbought RSI".into(),
            ));
        }
        if self.atr_stop_multiplier <= 0.0 || self.signal_ttl_secs <= 0 {
            return Err(StrategyError::InvalidConfig(
                "ATR multiplier and signal TTL must be positive".into(),
            ));
        }
        Ok(())
    }
}

pub struct MeanReversionStrategy {
    config: MeanReversionConfig,
    performance: StrategyPerformance,
}

impl MeanReversionStrategy {
    pub fn new(config: MeanReversionConfig) -> Self {
        Self {
            config,
            performance: StrategyPerformance::default(),
        }
    }
}

impl Default for MeanReversionStrategy {
    fn default() -> Self {
        Self::new(MeanReversionConfig::default())
    }
}

impl Strategy for MeanReversionStrategy {
    fn id(&self) -> &str {
        MEAN_REVERSION_ID
    }

    fn name(&self) -> &str {
        "Mean Reversion"
    }

    fn description(&self) -> &str {
        "Fades Bollinger band extremes confirmed by RSI"
    }

    fn min_candles(&self) -> usize {
        50
    }

    fn analyze(&self, input: &StrategyInput<'_>) -> Result<Option<StrategySignal>, StrategyError> {
        self.check_data(input)?;

        let ind = &input.analysis.indicators;
        let cfg = &self.config;
        let price = input.price();
        let percent_b = ind.bollinger_percent_b;

        let low_band = percent_b <= cfg.entry_percent_b;
        let high_band = percent_b >= 1.0 - cfg.entry_percent_b;
        let oversold = ind.rsi <= cfg.oversold_rsi;
        let overbought = ind.rsi >= cfg.overbought_rsi;

        let (action, confidence, reason) = match (low_band, high_band) {
            (true, _) if oversold => (
                SignalAction::Buy,
                0.55 + (cfg.oversold_rsi - ind.rsi) / 60.0
                    + (cfg.entry_percent_b - percent_b).max(0.0),
                format!("%B {:.2} at lower band, RSI oversold {:.1}", percent_b, ind.rsi),
            ),
            (true, _) if percent_b < 0.0 => (
                SignalAction::Buy,
                0.45,
                format!("%B {:.2} below lower band", percent_b),
            ),
            (_, true) if overbought => (
                SignalAction::Sell,
                0.55 + (ind.rsi - cfg.overbought_rsi) / 60.0
                    + (percent_b - 1.0 + cfg.entry_percent_b).max(0.0),
                format!("%B {:.2} at upper band, RSI overbought {:.1}", percent_b, ind.rsi),
            ),
            (_, true) if percent_b > 1.0 => (
                SignalAction::Sell,
                0.45,
                format!("%B {:.2} above upper band", percent_b),
            ),
            _ => return Ok(None),
        };

        let buffer = ind.atr * cfg.atr_stop_multiplier;
        let (stop, target) = match action {
            SignalAction::Buy => (ind.bollinger_lower.min(price) - buffer, ind.bollinger_middle),
            _ => (ind.bollinger_upper.max(price) + buffer, ind.bollinger_middle),
        };
        // Target already passed: nothing left to revert
        if (target - price) * action.direction() <= 0.0 {
            return Ok(None);
        }

        let stretch = (percent_b - 0.5).abs().min(1.0);
        Ok(Some(signal_with_levels(
            self.id(),
            &input.asset.id,
            action,
            confidence.min(0.9),
            stretch,
            cfg.signal_ttl_secs,
            (price, stop, target),
            reason,
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
