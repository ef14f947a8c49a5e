//! Explicit table of built-in strategies.

use serde::{Deserialize, Serialize};
use trading_core::{error::StrategyError, traits::Strategy};

use crate::{
    BreakoutConfig, BreakoutStrategy, MeanReversionConfig, MeanReversionStrategy, MomentumConfig,
    MomentumStrategy, ScalpingConfig, ScalpingStrategy, TrendFollowingConfig,
    TrendFollowingStrategy, BREAKOUT_ID, MEAN_REVERSION_ID, MOMENTUM_ID, SCALPING_ID,
    TREND_FOLLOWING_ID,
};

/// Information about a built-in strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Default configuration as JSON
    pub default_config: serde_json::Value,
}

fn info<C: Serialize>(id: &str, name: &str, description: &str, config: C) -> StrategyInfo {
    StrategyInfo {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        default_config: serde_json::to_value(config).unwrap_or_default(),
    }
}

fn parse<C: serde::de::DeserializeOwned>(config: serde_json::Value) -> Result<C, StrategyError> {
    serde_json::from_value(config).map_err(|e| StrategyError::InvalidConfig(e.to_string()))
}

/// Registry of the strategies this build knows how to construct.
pub struct StrategyRegistry {
    strategies: Vec<StrategyInfo>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        let strategies = vec![
            info(
                TREND_FOLLOWING_ID,
                "Trend Following",
                "Follows established SMA20/SMA50 trends with ATR-based stops",
                TrendFollowingConfig::default(),
            ),
            info(
                MEAN_REVERSION_ID,
                "Mean Reversion",
                "Fades Bollinger band extremes confirmed by RSI",
                MeanReversionConfig::default(),
            ),
            info(
                MOMENTUM_ID,
                "Momentum",
                "Follows strong rate-of-change moves confirmed by MACD and RSI",
                MomentumConfig::default(),
            ),
            info(
                BREAKOUT_ID,
                "Breakout",
                "Trades channel breakouts confirmed by volume expansion",
                BreakoutConfig::default(),
            ),
            info(
                SCALPING_ID,
                "Scalping",
                "Short EMA crossovers with tight stops and low confidence",
                ScalpingConfig::default(),
            ),
        ];
        Self { strategies }
    }

    /// All strategies, in table order.
    pub fn list(&self) -> &[StrategyInfo] {
        &self.strategies
    }

    pub fn get(&self, id: &str) -> Option<&StrategyInfo> {
        self.strategies.iter().find(|s| s.id == id)
    }

    pub fn exists(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.id.as_str()).collect()
    }

    /// Create a strategy from a (possibly partial) JSON configuration.
    pub fn create(
        &self,
        id: &str,
        config: serde_json::Value,
    ) -> Result<Box<dyn Strategy>, StrategyError> {
        match id {
            TREND_FOLLOWING_ID => {
                let config: TrendFollowingConfig = parse(config)?;
                config.validate()?;
                Ok(Box::new(TrendFollowingStrategy::new(config)))
            }
            MEAN_REVERSION_ID => {
                let config: MeanReversionConfig = parse(config)?;
                config.validate()?;
                Ok(Box::new(MeanReversionStrategy::new(config)))
            }
            MOMENTUM_ID => Ok(Box::new(MomentumStrategy::new(parse(config)?)?)),
            BREAKOUT_ID => {
                let config: BreakoutConfig = parse(config)?;
                config.validate()?;
                Ok(Box::new(BreakoutStrategy::new(config)))
            }
            SCALPING_ID => Ok(Box::new(ScalpingStrategy::new(parse(config)?)?)),
            _ => Err(StrategyError::NotFound(id.to_string())),
        }
    }

    pub fn create_default(&self, id: &str) -> Result<Box<dyn Strategy>, StrategyError> {
        let info = self
            .get(id)
            .ok_or_else(|| StrategyError::NotFound(id.to_string()))?;
        self.create(id, info.default_config.clone())
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lists_five_builtins() {
        let registry = StrategyRegistry::new();
        assert_eq!(
            registry.ids(),
            vec!["trend_following", "mean_reversion", "momentum", "breakout", "scalping"]
        );
    }

    #[test]
    fn test_create_every_default() {
        let registry = StrategyRegistry::new();
        for id in registry.ids() {
            let strategy = registry.create_default(id).unwrap();
            assert_eq!(strategy.id(), id);
            assert_eq!(strategy.performance().win_rate, 0.5);
        }
    }

    #[test]
    fn test_create_with_partial_config() {
        let registry = StrategyRegistry::new();
        let config = serde_json::json!({ "lookback": 30 });
        let strategy = registry.create(BREAKOUT_ID, config).unwrap();
        assert_eq!(strategy.parameters()["lookback"], 30);
        assert_eq!(strategy.parameters()["volume_multiplier"], 1.5);
    }

    #[test]
    fn test_create_rejects_invalid_config() {
        let registry = StrategyRegistry::new();
        let config = serde_json::json!({ "fast_period": 50, "slow_period": 10 });
        assert!(matches!(
            registry.create(SCALPING_ID, config),
            Err(StrategyError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_create_unknown_strategy() {
        let registry = StrategyRegistry::new();
        assert!(matches!(
            registry.create_default("rsi"),
            Err(StrategyError::NotFound(_))
        ));
    }
}
