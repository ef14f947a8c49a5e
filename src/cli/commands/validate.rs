//! Validate configuration command.

use anyhow::Result;
use std::path::Path;
use trading_config::AppConfig;
use trading_core::TradingError;

use crate::cli::ValidateArgs;

pub async fn run(
    args: ValidateArgs,
    config_path: &Path,
    loaded: Result<AppConfig, TradingError>,
) -> Result<()> {
    println!("Validating configuration: {:?}", config_path);

    match loaded {
        Ok(config) => {
            println!("Configuration is valid!");
            println!();
            println!("App: {}", config.app.name);
            println!("Environment: {}", config.app.environment);
            println!("Log level: {}", config.logging.level);
            println!("Autonomy: {}", config.agent.autonomy);
            println!("Assets: {}", config.agent.assets.join(", "));
            println!("Strategies: {}", config.agent.active_strategies.join(", "));
            println!("Cycle interval: {}s", config.agent.cycle_interval_secs);
            println!("Max position: {}", config.risk.max_position_size);
            println!("Max loss per trade: {}", config.risk.max_loss_per_trade);
            println!("Daily loss limit: {}", config.risk.daily_loss_limit);
            if args.print {
                println!();
                println!("{}", config.to_toml()?);
            }
        }
        Err(e) => {
            println!("Configuration error: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}
