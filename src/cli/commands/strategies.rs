//! List strategies command.

use anyhow::Result;
use trading_monitor::report;
use trading_strategies::StrategyRegistry;

pub async fn run() -> Result<()> {
    let registry = StrategyRegistry::new();
    print!("{}", report::render_registry(registry.list()));
    println!(
        "Activate strategies with [agent] active_strategies; \
         tune them with [agent.strategy_params.<id>]."
    );
    Ok(())
}
