//! Risk limits and circuit breaker thresholds.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{RiskError, RiskResult};

const MAX_QUANTITY_PRECISION: u32 = 8;

/// Risk profile. Fractions are of current equity (0.02 = 2%).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Largest single position as a fraction of equity
    pub max_position_size: Decimal,
    /// Largest loss at the stop for one trade
    pub max_loss_per_trade: Decimal,
    pub min_reward_risk: f64,
    pub daily_loss_limit: Decimal,
    pub weekly_loss_limit: Decimal,
    pub monthly_loss_limit: Decimal,
    /// Post-trade exposure cap for one asset
    pub max_concentration: Decimal,
    /// Cash that must remain after a buy
    pub min_cash_reserve: Decimal,
    /// Largest same-market share of positions before warning
    pub correlation_threshold: f64,
    pub max_concurrent_positions: usize,
    pub kelly_multiplier: f64,
    pub atr_stop_multiplier: f64,
    pub fixed_stop_pct: f64,
    /// Decimals kept when quantities are rounded down; 0 trades whole units
    pub quantity_precision: u32,
    /// Per-asset overrides of `quantity_precision`, e.g. fractional crypto
    pub asset_precision: HashMap<String, u32>,
    pub breakers: BreakerConfig,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_position_size: dec!(0.10),
            max_loss_per_trade: dec!(0.02),
            min_reward_risk: 1.5,
            daily_loss_limit: dec!(0.03),
            weekly_loss_limit: dec!(0.06),
            monthly_loss_limit: dec!(0.10),
            max_concentration: dec!(0.20),
            min_cash_reserve: dec!(0.10),
            correlation_threshold: 0.6,
            max_concurrent_positions: 10,
            kelly_multiplier: 0.25,
            atr_stop_multiplier: 2.0,
            fixed_stop_pct: 0.02,
            quantity_precision: 0,
            asset_precision: HashMap::new(),
            breakers: BreakerConfig::default(),
        }
    }
}

fn fraction(name: &str, value: Decimal) -> RiskResult<()> {
    if value <= Decimal::ZERO || value > Decimal::ONE {
        return Err(RiskError::InvalidConfig(format!(
            "{} must be in (0, 1], got {}",
            name, value
        )));
    }
    Ok(())
}

impl RiskConfig {
    pub fn validate(&self) -> RiskResult<()> {
        fraction("max_position_size", self.max_position_size)?;
        fraction("max_loss_per_trade", self.max_loss_per_trade)?;
        fraction("daily_loss_limit", self.daily_loss_limit)?;
        fraction("weekly_loss_limit", self.weekly_loss_limit)?;
        fraction("monthly_loss_limit", self.monthly_loss_limit)?;
        fraction("max_concentration", self.max_concentration)?;
        if self.min_cash_reserve < Decimal::ZERO || self.min_cash_reserve >= Decimal::ONE {
            return Err(RiskError::InvalidConfig(
                "min_cash_reserve must be in [0, 1)".into(),
            ));
        }
        if self.min_reward_risk <= 0.0 {
            return Err(RiskError::InvalidConfig("min_reward_risk must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.correlation_threshold) {
            return Err(RiskError::InvalidConfig(
                "correlation_threshold must be in [0, 1]".into(),
            ));
        }
        if self.max_concurrent_positions == 0 {
            return Err(RiskError::InvalidConfig(
                "max_concurrent_positions must be at least 1".into(),
            ));
        }
        if self.kelly_multiplier <= 0.0 || self.kelly_multiplier > 1.0 {
            return Err(RiskError::InvalidConfig("kelly_multiplier must be in (0, 1]".into()));
        }
        if self.atr_stop_multiplier <= 0.0
            || self.fixed_stop_pct <= 0.0
            || self.fixed_stop_pct >= 1.0
        {
            return Err(RiskError::InvalidConfig(
                "stop multipliers must be positive and fixed_stop_pct below 1".into(),
            ));
        }
        let precisions =
            std::iter::once(&self.quantity_precision).chain(self.asset_precision.values());
        if precisions.copied().any(|p| p > MAX_QUANTITY_PRECISION) {
            return Err(RiskError::InvalidConfig(format!(
                "quantity precision above {}",
                MAX_QUANTITY_PRECISION
            )));
        }
        self.breakers.validate()
    }

    /// Decimals `asset_id` is traded in. Asset keys match case-insensitively
    /// since layered config sources lowercase them.
    pub fn precision_for(&self, asset_id: &str) -> u32 {
        self.asset_precision
            .iter()
            .find(|(asset, _)| asset.eq_ignore_ascii_case(asset_id))
            .map(|(_, precision)| *precision)
            .unwrap_or(self.quantity_precision)
    }
}

/// Thresholds and cooldowns for the five circuit breakers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Single-tick move that counts as a crash (fraction)
    pub flash_crash_move: f64,
    pub flash_crash_cooldown_mins: i64,
    /// Volatility over baseline that trips the breaker
    pub volatility_spike_multiple: f64,
    pub volatility_spike_cooldown_mins: i64,
    /// Daily loss fraction that trips the breaker
    pub daily_loss: f64,
    pub daily_loss_cooldown_mins: i64,
    pub consecutive_losses: usize,
    pub consecutive_losses_cooldown_mins: i64,
    /// Failure share over the operation window
    pub error_rate: f64,
    pub error_rate_window: usize,
    pub error_rate_min_samples: usize,
    pub error_rate_cooldown_mins: i64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            flash_crash_move: 0.05,
            flash_crash_cooldown_mins: 30,
            volatility_spike_multiple: 3.0,
            volatility_spike_cooldown_mins: 15,
            daily_loss: 0.03,
            daily_loss_cooldown_mins: 24 * 60,
            consecutive_losses: 5,
            consecutive_losses_cooldown_mins: 60,
            error_rate: 0.5,
            error_rate_window: 20,
            error_rate_min_samples: 10,
            error_rate_cooldown_mins: 15,
        }
    }
}

impl BreakerConfig {
    pub fn validate(&self) -> RiskResult<()> {
        let cooldowns = [
            self.flash_crash_cooldown_mins,
            self.volatility_spike_cooldown_mins,
            self.daily_loss_cooldown_mins,
            self.consecutive_losses_cooldown_mins,
            self.error_rate_cooldown_mins,
        ];
        if cooldowns.iter().any(|c| *c <= 0) {
            return Err(RiskError::InvalidConfig(
                "breaker cooldowns must be positive".into(),
            ));
        }
        if self.flash_crash_move <= 0.0
            || self.daily_loss <= 0.0
            || self.volatility_spike_multiple <= 1.0
        {
            return Err(RiskError::InvalidConfig(
                "breaker thresholds must be positive, volatility multiple above 1".into(),
            ));
        }
        if self.consecutive_losses == 0 {
            return Err(RiskError::InvalidConfig(
                "consecutive_losses must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.error_rate)
            || self.error_rate_min_samples == 0
            || self.error_rate_min_samples > self.error_rate_window
        {
            return Err(RiskError::InvalidConfig(
                "error rate must be in [0, 1] with 0 < min samples <= window".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(RiskConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range_fraction() {
        let config = RiskConfig {
            max_position_size: dec!(1.5),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(RiskError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_bad_breaker_window() {
        let mut config = RiskConfig::default();
        config.breakers.error_rate_min_samples = 30;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_precision_overrides_per_asset() {
        let mut config = RiskConfig::default();
        config.asset_precision.insert("BTC-USD".into(), 6);
        assert!(config.validate().is_ok());
        assert_eq!(config.precision_for("BTC-USD"), 6);
        assert_eq!(config.precision_for("AAPL"), 0);
        config.asset_precision.insert("eth-usd".into(), 4);
        assert_eq!(config.precision_for("ETH-USD"), 4);

        config.asset_precision.insert("DOGE".into(), 12);
        assert!(config.validate().is_err());
    }
}
