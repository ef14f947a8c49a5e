//! Configuration structures.

use serde::{Deserialize, Serialize};
use trading_agent::AgentConfig;
use trading_brain::BrainConfig;
use trading_broker::PaperBrokerConfig;
use trading_core::TradingError;
use trading_pacing::PacingConfig;
use trading_risk::RiskConfig;
use trading_strategies::StrategyRegistry;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default)]
    pub brain: BrainConfig,
    #[serde(default)]
    pub paper: PaperBrokerConfig,
}

impl AppConfig {
    /// Check every section. The first problem found is reported.
    pub fn validate(&self) -> Result<(), TradingError> {
        fn section(
            name: &str,
            result: Result<(), impl std::fmt::Display>,
        ) -> Result<(), TradingError> {
            result.map_err(|e| TradingError::Config(format!("[{}] {}", name, e)))
        }

        section("logging", self.logging.validate())?;
        section("agent", self.agent.validate())?;
        section("risk", self.risk.validate())?;
        section("pacing", self.pacing.validate())?;
        section("brain", self.brain.validate())?;

        if self.agent.broker != "paper" {
            return Err(TradingError::Config(format!(
                "[agent] unsupported broker '{}', only 'paper' is available",
                self.agent.broker
            )));
        }
        if self.paper.initial_capital <= rust_decimal::Decimal::ZERO {
            return Err(TradingError::Config(
                "[paper] initial_capital must be positive".into(),
            ));
        }
        let unpriced = self.paper.assets.iter().find(|l| l.price <= rust_decimal::Decimal::ZERO);
        if let Some(listed) = unpriced {
            return Err(TradingError::Config(format!(
                "[paper] asset '{}' needs a positive price",
                listed.symbol
            )));
        }

        let registry = StrategyRegistry::new();
        if self.agent.active_strategies.is_empty() {
            return Err(TradingError::Config(
                "[agent] at least one active strategy is required".into(),
            ));
        }
        for id in self.agent.active_strategies.iter().chain(self.agent.strategy_params.keys()) {
            if !registry.exists(id) {
                return Err(TradingError::Config(format!(
                    "[agent] unknown strategy '{}', expected one of {}",
                    id,
                    registry.ids().join(", ")
                )));
            }
        }

        for asset in &self.agent.assets {
            if !self.paper.assets.iter().any(|listed| &listed.symbol == asset) {
                return Err(TradingError::Config(format!(
                    "[agent] asset '{}' is not listed in [[paper.assets]]",
                    asset
                )));
            }
        }
        Ok(())
    }

    /// The effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, TradingError> {
        toml::to_string_pretty(self).map_err(|e| TradingError::Config(e.to_string()))
    }
}

/// General app settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    pub name: String,
    pub environment: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            name: "autotrader".to_string(),
            environment: "development".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty` or `json`
    pub format: String,
    /// Directory for a daily-rolling log file, in addition to stdout
    pub directory: Option<String>,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            directory: None,
            file_prefix: "autotrader.log".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }

    fn validate(&self) -> Result<(), String> {
        if !matches!(self.format.to_ascii_lowercase().as_str(), "pretty" | "json") {
            return Err(format!("format must be 'pretty' or 'json', got '{}'", self.format));
        }
        if self.level.trim().is_empty() {
            return Err("level must be set".into());
        }
        Ok(())
    }
}
