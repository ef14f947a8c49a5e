use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use trading_core::{AutonomyLevel, Timeframe};

use crate::error::AgentError;

/// Control-loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub autonomy: AutonomyLevel,
    /// Broker implementation to trade through
    pub broker: String,
    pub paper_trading: bool,
    /// Assets analysed every cycle, in order
    pub assets: Vec<String>,
    pub active_strategies: Vec<String>,
    /// Per-strategy parameter overrides, keyed by strategy id
    pub strategy_params: HashMap<String, serde_json::Value>,
    pub cycle_interval_secs: u64,
    pub timeframe: Timeframe,
    pub candle_limit: usize,
    /// Entries kept in the in-memory event log
    pub event_log_capacity: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            autonomy: AutonomyLevel::Advisory,
            broker: "paper".into(),
            paper_trading: true,
            assets: vec!["AAPL".into(), "MSFT".into(), "BTC-USD".into()],
            active_strategies: vec![
                "momentum".into(),
                "mean_reversion".into(),
                "trend_following".into(),
            ],
            strategy_params: HashMap::new(),
            cycle_interval_secs: 30,
            timeframe: Timeframe::Minute5,
            candle_limit: 200,
            event_log_capacity: 1000,
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.broker.trim().is_empty() {
            return Err(AgentError::InvalidConfig("broker must be set".into()));
        }
        if !self.paper_trading && self.broker == "paper" {
            return Err(AgentError::InvalidConfig(
                "the paper broker requires paper_trading = true".into(),
            ));
        }
        if self.cycle_interval_secs == 0 {
            return Err(AgentError::InvalidConfig(
                "cycle_interval_secs must be positive".into(),
            ));
        }
        if self.candle_limit == 0 {
            return Err(AgentError::InvalidConfig("candle_limit must be positive".into()));
        }
        if self.event_log_capacity == 0 {
            return Err(AgentError::InvalidConfig(
                "event_log_capacity must be positive".into(),
            ));
        }
        if let Some(asset) = self.assets.iter().find(|a| a.trim().is_empty()) {
            return Err(AgentError::InvalidConfig(format!("invalid asset id {:?}", asset)));
        }
        Ok(())
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }

    /// Parameter overrides for `strategy_id`, if any.
    pub fn params_for(&self, strategy_id: &str) -> Option<&serde_json::Value> {
        self.strategy_params.get(strategy_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = AgentConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cycle_interval(), Duration::from_secs(30));
        assert_eq!(config.event_log_capacity, 1000);
    }

    #[test]
    fn test_rejects_zero_interval() {
        let config = AgentConfig {
            cycle_interval_secs: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(AgentError::InvalidConfig(_))));
    }

    #[test]
    fn test_paper_broker_needs_paper_flag() {
        let config = AgentConfig {
            paper_trading: false,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial() {
        let json = r#"{"autonomy": "full_auto", "assets": ["ETH-USD"], "timeframe": "1h"}"#;
        let config: AgentConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.autonomy, AutonomyLevel::FullAuto);
        assert_eq!(config.assets, vec!["ETH-USD".to_string()]);
        assert_eq!(config.timeframe, Timeframe::Hour1);
        assert_eq!(config.candle_limit, 200);
    }
}
