//! Configuration management.
//!
//! A TOML file layered with `AUTOTRADER__SECTION__KEY` environment overrides,
//! deserialized into [`AppConfig`] and validated once.

mod settings;

pub use settings::{AppConfig, AppSettings, LoggingConfig};

use config::{Config, ConfigError, Environment, File, FileFormat};
use std::collections::HashMap;
use std::path::Path;
use trading_core::TradingError;

const ENV_PREFIX: &str = "AUTOTRADER";
const ENV_SEPARATOR: &str = "__";

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator(ENV_SEPARATOR)
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("agent.assets")
        .with_list_parse_key("agent.active_strategies")
}

fn finish(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
) -> Result<AppConfig, TradingError> {
    let config: AppConfig = builder
        .build()
        .and_then(Config::try_deserialize::<AppConfig>)
        .map_err(|e: ConfigError| TradingError::Config(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from file and environment.
pub fn load_config(path: &Path) -> Result<AppConfig, TradingError> {
    finish(
        Config::builder()
            .add_source(File::from(path).required(true))
            .add_source(environment()),
    )
}

/// Load configuration from TOML text, with overrides given as if they were
/// environment variables.
pub fn load_config_str(
    toml: &str,
    overrides: HashMap<String, String>,
) -> Result<AppConfig, TradingError> {
    finish(
        Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .add_source(environment().source(Some(overrides))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use trading_core::AutonomyLevel;

    const SAMPLE: &str = r#"
[app]
name = "autotrader"
environment = "test"

[agent]
autonomy = "semi_auto"
assets = ["AAPL", "MSFT"]
active_strategies = ["momentum", "breakout"]
cycle_interval_secs = 60

[risk]
max_position_size = 0.05

[pacing]
cooldown_secs = 10

[[paper.assets]]
symbol = "AAPL"
market = "tech"
price = 175

[[paper.assets]]
symbol = "MSFT"
market = "tech"
price = 410
"#;

    #[test]
    fn test_defaults_need_listed_assets() {
        let err = load_config_str("", HashMap::new()).unwrap_err();
        assert!(matches!(err, TradingError::Config(ref msg) if msg.contains("AAPL")));
    }

    #[test]
    fn test_unset_sections_use_defaults() {
        let config = load_config_str(SAMPLE, HashMap::new()).unwrap();
        assert_eq!(config.app.name, "autotrader");
        assert!(!config.logging.is_json());
        assert_eq!(
            config.brain.min_pass_ratio,
            trading_brain::BrainConfig::default().min_pass_ratio
        );
        assert_eq!(config.paper.assets.len(), 2);
        assert_eq!(config.paper.assets[1].price, dec!(410));
    }

    #[test]
    fn test_sections_are_read() {
        let config = load_config_str(SAMPLE, HashMap::new()).unwrap();
        assert_eq!(config.agent.autonomy, AutonomyLevel::SemiAuto);
        assert_eq!(config.agent.assets, vec!["AAPL", "MSFT"]);
        assert_eq!(config.agent.cycle_interval_secs, 60);
        assert_eq!(config.risk.max_position_size, dec!(0.05));
        // untouched keys keep their defaults
        assert_eq!(config.risk.max_loss_per_trade, dec!(0.02));
        assert_eq!(config.pacing.cooldown_secs, 10);
    }

    #[test]
    fn test_environment_overrides_file() {
        let overrides = HashMap::from([
            ("AUTOTRADER__AGENT__CYCLE_INTERVAL_SECS".to_string(), "15".to_string()),
            ("AUTOTRADER__AGENT__AUTONOMY".to_string(), "full_auto".to_string()),
            ("AUTOTRADER__AGENT__ASSETS".to_string(), "MSFT,AAPL".to_string()),
        ]);
        let config = load_config_str(SAMPLE, overrides).unwrap();
        assert_eq!(config.agent.cycle_interval_secs, 15);
        assert_eq!(config.agent.autonomy, AutonomyLevel::FullAuto);
        assert_eq!(config.agent.assets, vec!["MSFT", "AAPL"]);
    }

    #[test]
    fn test_invalid_sections_are_config_errors() {
        let bad_strategy = "[agent]\nactive_strategies = [\"astrology\"]\n";
        let err = load_config_str(bad_strategy, HashMap::new()).unwrap_err();
        assert!(matches!(err, TradingError::Config(ref msg) if msg.contains("astrology")));

        let unlisted = "[agent]\nassets = [\"TSLA\"]\n";
        assert!(matches!(
            load_config_str(unlisted, HashMap::new()),
            Err(TradingError::Config(ref msg)) if msg.contains("TSLA")
        ));

        let bad_risk = "[risk]\nmax_position_size = 1.5\n";
        assert!(matches!(
            load_config_str(bad_risk, HashMap::new()),
            Err(TradingError::Config(_))
        ));

        let bad_format = "[logging]\nformat = \"xml\"\n";
        assert!(matches!(
            load_config_str(bad_format, HashMap::new()),
            Err(TradingError::Config(_))
        ));
    }

    #[test]
    fn test_effective_config_reloads() {
        let config = load_config_str(SAMPLE, HashMap::new()).unwrap();
        let text = config.to_toml().unwrap();
        let reloaded = load_config_str(&text, HashMap::new()).unwrap();
        assert_eq!(reloaded.agent, config.agent);
        assert_eq!(reloaded.risk.max_position_size, config.risk.max_position_size);
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/default.toml");
        let config = load_config(&path).unwrap();
        assert!(config.agent.assets.iter().any(|a| a == "BTC-USD"));
        assert_eq!(config.risk.precision_for("BTC-USD"), 6);
        assert_eq!(config.risk.precision_for("AAPL"), 0);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = load_config(Path::new("does/not/exist.toml")).unwrap_err();
        assert!(matches!(err, TradingError::Config(_)));
    }
}
