//! Analyze command: one pipeline pass for one asset.

use anyhow::Result;
use trading_config::AppConfig;
use trading_core::Broker;
use trading_monitor::report;

use super::build_service;
use crate::cli::AnalyzeArgs;

pub async fn run(args: AnalyzeArgs, config: AppConfig) -> Result<()> {
    let (service, _broker) = build_service(&config)?;
    service.broker().connect().await?;
    let analysis = service.analyze_once(&args.asset.to_uppercase()).await?;
    print!("{}", report::render_analysis(&analysis));
    Ok(())
}
