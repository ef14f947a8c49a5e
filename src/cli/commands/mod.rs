//! CLI command implementations.

pub mod analyze;
pub mod console;
pub mod run;
pub mod strategies;
pub mod validate;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use trading_agent::{AgentConfig, TradingService};
use trading_brain::DecisionBrain;
use trading_broker::{PaperBroker, PaperBrokerBuilder};
use trading_config::AppConfig;
use trading_pacing::Humanizer;
use trading_risk::RiskManager;
use trading_strategies::{StrategyEngine, StrategyRegistry};

/// Register every known strategy, activating the configured ones.
pub fn build_engine(config: &AgentConfig) -> Result<StrategyEngine> {
    let registry = StrategyRegistry::new();
    let mut engine = StrategyEngine::new();
    for info in registry.list() {
        let strategy = match config.params_for(&info.id) {
            Some(params) => registry.create(&info.id, params.clone()),
            None => registry.create_default(&info.id),
        }
        .with_context(|| format!("Failed to create strategy {}", info.id))?;
        let active = config.active_strategies.iter().any(|id| id == &info.id);
        engine.register(strategy, active)?;
    }
    Ok(engine)
}

/// Paper broker plus a service wired from `config`.
pub fn build_service(config: &AppConfig) -> Result<(TradingService, PaperBroker)> {
    let broker = PaperBrokerBuilder::from_config(config.paper.clone()).build();
    let service = TradingService::new(
        config.agent.clone(),
        Arc::new(broker.clone()),
        build_engine(&config.agent)?,
        RiskManager::new(config.risk.clone())?,
        DecisionBrain::new(config.brain.clone())?,
        Humanizer::new(config.pacing.clone())?,
    )?;
    Ok((service, broker))
}

/// Step the paper market every `tick_ms`.
pub fn spawn_market(broker: PaperBroker, tick_ms: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(tick_ms.max(10)));
        loop {
            ticker.tick().await;
            let fills = broker.tick();
            if !fills.is_empty() {
                tracing::debug!(fills = fills.len(), "Resting orders filled");
            }
        }
    })
}
