//! Pacing configuration.

use chrono::NaiveTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::PacingError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// Mean of the Gaussian reaction time
    pub reaction_mean_ms: f64,
    pub reaction_std_ms: f64,
    /// Uniform jitter added on top, upper bound
    pub jitter_ms: f64,
    pub trading_start: NaiveTime,
    pub trading_end: NaiveTime,
    /// Offset of the trading-hours timezone from UTC
    pub utc_offset_minutes: i32,
    pub weekdays_only: bool,
    pub lunch_start: NaiveTime,
    pub lunch_end: NaiveTime,
    /// Share of checks rejected during lunch
    pub lunch_rejection: f64,
    pub split_orders: bool,
    pub max_chunk: Decimal,
    /// Per-chunk size jitter, as a fraction
    pub chunk_jitter: f64,
    /// Size jitter for unsplit orders; never increases the quantity
    pub order_jitter: f64,
    pub max_actions_per_hour: usize,
    pub cooldown_secs: i64,
}

fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN)
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            reaction_mean_ms: 450.0,
            reaction_std_ms: 150.0,
            jitter_ms: 50.0,
            trading_start: time(9, 30),
            trading_end: time(16, 0),
            utc_offset_minutes: -300,
            weekdays_only: true,
            lunch_start: time(12, 0),
            lunch_end: time(13, 0),
            lunch_rejection: 0.7,
            split_orders: true,
            max_chunk: Decimal::from(1000),
            chunk_jitter: 0.2,
            order_jitter: 0.05,
            max_actions_per_hour: 60,
            cooldown_secs: 5,
        }
    }
}

impl PacingConfig {
    /// Settings that never block: all hours, no cooldown, no jitter.
    pub fn permissive() -> Self {
        Self {
            reaction_mean_ms: 150.0,
            reaction_std_ms: 0.0,
            jitter_ms: 0.0,
            trading_start: NaiveTime::MIN,
            trading_end: NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN),
            utc_offset_minutes: 0,
            weekdays_only: false,
            lunch_rejection: 0.0,
            chunk_jitter: 0.0,
            order_jitter: 0.0,
            max_actions_per_hour: 10_000,
            cooldown_secs: 0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), PacingError> {
        if self.reaction_mean_ms <= 0.0 || self.reaction_std_ms < 0.0 || self.jitter_ms < 0.0 {
            return Err(PacingError::InvalidConfig(
                "reaction mean must be positive, std-dev and jitter non-negative".into(),
            ));
        }
        if self.trading_start >= self.trading_end {
            return Err(PacingError::InvalidConfig(
                "trading_start must be before trading_end".into(),
            ));
        }
        if self.lunch_start > self.lunch_end {
            return Err(PacingError::InvalidConfig(
                "lunch_start must not be after lunch_end".into(),
            ));
        }
        if self.utc_offset_minutes.abs() >= 24 * 60 {
            return Err(PacingError::InvalidConfig("UTC offset out of range".into()));
        }
        for (name, value) in [
            ("lunch_rejection", self.lunch_rejection),
            ("chunk_jitter", self.chunk_jitter),
            ("order_jitter", self.order_jitter),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(PacingError::InvalidConfig(format!("{} must be in [0, 1]", name)));
            }
        }
        if self.max_chunk <= Decimal::ZERO {
            return Err(PacingError::InvalidConfig("max_chunk must be positive".into()));
        }
        if self.max_actions_per_hour == 0 || self.cooldown_secs < 0 {
            return Err(PacingError::InvalidConfig(
                "max_actions_per_hour must be positive and cooldown non-negative".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(PacingConfig::default().validate().is_ok());
        assert!(PacingConfig::permissive().validate().is_ok());
    }

    #[test]
    fn test_inverted_window_rejected() {
        let config = PacingConfig {
            trading_start: time(17, 0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
