//! Decision brain configuration.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::BrainError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrainConfig {
    /// Net consensus weight needed to commit to a direction
    pub commit_threshold: f64,
    /// Weight of the analysis' own recommendation in the consensus
    pub recommendation_weight: f64,
    /// Open shorts on sell consensus without a long to close
    pub allow_short: bool,
    /// Largest notional `full_auto` executes without confirmation
    pub max_auto_notional: Decimal,
    /// Minimum reward:risk used when placing the target
    pub target_reward_risk: f64,
    /// Entry skew per unit of trend strength, as a fraction of price
    pub entry_skew: f64,
    /// Analysis older than this fails the freshness check
    pub max_analysis_age_secs: i64,
    /// Weighted share of passed checks needed overall
    pub min_pass_ratio: f64,
    /// Place limit orders at the skewed entry instead of market orders
    pub use_limit_orders: bool,
}

impl Default for BrainConfig {
    fn default() -> Self {
        Self {
            commit_threshold: 0.6,
            recommendation_weight: 0.2,
            allow_short: false,
            max_auto_notional: dec!(10000),
            target_reward_risk: 2.0,
            entry_skew: 0.001,
            max_analysis_age_secs: 300,
            min_pass_ratio: 0.6,
            use_limit_orders: false,
        }
    }
}

impl BrainConfig {
    pub fn validate(&self) -> Result<(), BrainError> {
        if !(0.0..=2.0).contains(&self.commit_threshold) || self.commit_threshold == 0.0 {
            return Err(BrainError::InvalidConfig(
                "commit_threshold must be in (0, 2]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.recommendation_weight) {
            return Err(BrainError::InvalidConfig(
                "recommendation_weight must be in [0, 1]".into(),
            ));
        }
        if self.max_auto_notional <= Decimal::ZERO {
            return Err(BrainError::InvalidConfig("max_auto_notional must be positive".into()));
        }
        if self.target_reward_risk < 1.0 {
            return Err(BrainError::InvalidConfig("target_reward_risk must be at least 1".into()));
        }
        if !(0.0..0.05).contains(&self.entry_skew) {
            return Err(BrainError::InvalidConfig("entry_skew must be in [0, 0.05)".into()));
        }
        if self.max_analysis_age_secs <= 0 {
            return Err(BrainError::InvalidConfig("max_analysis_age_secs must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.min_pass_ratio) {
            return Err(BrainError::InvalidConfig("min_pass_ratio must be in [0, 1]".into()));
        }
        Ok(())
    }
}
