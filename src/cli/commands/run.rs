//! Run command: the control loop until Ctrl-C.

use anyhow::Result;
use tracing::info;
use trading_config::AppConfig;
use trading_monitor::report;

use super::{build_service, spawn_market};
use crate::cli::RunArgs;

pub async fn run(args: RunArgs, mut config: AppConfig) -> Result<()> {
    if let Some(level) = args.autonomy {
        config.agent.autonomy = level;
    }
    let (service, broker) = build_service(&config)?;
    let market = spawn_market(broker, args.tick_ms);

    service.start().await?;
    info!(
        assets = ?config.agent.assets,
        autonomy = %service.autonomy(),
        "Running, press Ctrl-C to stop"
    );
    tokio::signal::ctrl_c().await?;

    if args.flatten_on_exit {
        let flattened = service.emergency_stop("flatten on exit").await;
        print!("{}", report::render_emergency(&flattened));
    }
    service.shutdown().await;
    market.abort();

    let state = service.get_state().await?;
    print!("{}", report::render_state(&state));
    Ok(())
}
