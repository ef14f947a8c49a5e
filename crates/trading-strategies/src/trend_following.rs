//! Trend following strategy.
//!
//! Goes with an established SMA20/SMA50 trend once it has enough strength
//! and has persisted for a few candles. Stops and targets are ATR multiples.

use serde::{Deserialize, Serialize};
use trading_core::{
    error::StrategyError,
    traits::{Strategy, StrategyInput, StrategyPerformance},
    types::{SignalAction, StrategySignal, TrendDirection},
};

use crate::common::signal_with_levels;

pub const TREND_FOLLOWING_ID: &str = "trend_following";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendFollowingConfig {
    /// Minimum trend strength in [0, 1]
    pub min_trend_strength: f64,
    /// Minimum candles on the trend side of the SMA20
    pub min_duration: usize,
    pub atr_stop_multiplier: f64,
    /// Target distance as a multiple of stop distance
    pub reward_risk: f64,
    pub signal_ttl_secs: i64,
}

impl Default for TrendFollowingConfig {
    fn default() -> Self {
        Self {
            min_trend_strength: 0.3,
            min_duration: 3,
            atr_stop_multiplier: 2.0,
            reward_risk: 2.5,
            signal_ttl_secs: 300,
        }
    }
}

impl TrendFollowingConfig {
    pub fn validate(&self) -> Result<(), StrategyError> {
        if !(0.0..=1.0).contains(&self.min_trend_strength) {
            return Err(StrategyError::InvalidConfig(
                "min_trend_strength must be between 0 and 1".into(),
            ));
        }
        if self.atr_stop_multiplier <= 0.0 || self.reward_risk <= 0.0 {
            return Err(StrategyError::InvalidConfig(
                "ATR multiplier and reward/risk must be positive".into(),
            ));
        }
        if self.signal_ttl_secs <= 0 {
            return Err(StrategyError::InvalidConfig("signal TTL must be positive".into()));
        }
        Ok(())
    }
}

pub struct TrendFollowingStrategy {
    config: TrendFollowingConfig,
    performance: StrategyPerformance,
}

impl TrendFollowingStrategy {
    pub fn new(config: TrendFollowingConfig) -> Self {
        Self {
            config,
            performance: StrategyPerformance::default(),
        }
    }
}

impl Default for TrendFollowingStrategy {
    fn default() -> Self {
        Self::new(TrendFollowingConfig::default())
    }
}

impl Strategy for TrendFollowingStrategy {
    fn id(&self) -> &str {
        TREND_FOLLOWING_ID
    }

    fn name(&self) -> &str {
        "Trend Following"
    }

    fn description(&self) -> &str {
        "Follows established SMA20/SMA50 trends with ATR-based stops"
    }

    fn min_candles(&self) -> usize {
        50
    }

    fn analyze(&self, input: &StrategyInput<'_>) -> Result<Option<StrategySignal>, StrategyError> {
        self.check_data(input)?;

        let analysis = input.analysis;
        let trend = &analysis.trend;
        let ind = &analysis.indicators;

        if trend.strength < self.config.min_trend_strength
            || trend.duration < self.config.min_duration
        {
            return Ok(None);
        }

        let action = match trend.direction {
            TrendDirection::Up => SignalAction::Buy,
            TrendDirection::Down => SignalAction::Sell,
            TrendDirection::Sideways => return Ok(None),
        };

        let price = input.price();
        let stop_distance = ind.atr * self.config.atr_stop_multiplier;
        if stop_distance <= 0.0 {
            return Ok(None);
        }
        let dir = action.direction();
        let stop = price - dir * stop_distance;
        let target = price + dir * stop_distance * self.config.reward_risk;

        let macd_agrees = ind.macd_histogram * dir > 0.0;
        let macd_bonus = if macd_agrees { 0.1 } else { 0.0 };
        let confidence = (0.5 + 0.4 * trend.strength + macd_bonus).min(0.95);

        Ok(Some(signal_with_levels(
            self.id(),
            &input.asset.id,
            action,
            confidence,
            trend.strength,
            self.config.signal_ttl_secs,
            (price, stop, target),
            format!(
                "{:?} trend, strength {:.2} over {} candles{}",
                trend.direction,
                trend.strength,
                trend.duration,
                if macd_agrees { ", MACD confirms" } else { "" }
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
