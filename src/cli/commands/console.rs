//! Console command: the control loop plus text commands on stdin.

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::warn;
use trading_agent::{Command, CommandOutput, TradingService};
use trading_config::AppConfig;
use trading_monitor::report;

use super::{build_service, spawn_market};
use crate::cli::RunArgs;

/// Print events a console user has to react to.
fn spawn_notifier(service: &TradingService) -> JoinHandle<()> {
    let events = service.events();
    let mut confirmations = events.subscribe_confirmations();
    let mut suggestions = events.subscribe_suggestions();
    let mut breakers = events.subscribe_circuit_breakers();
    let mut blocked = events.subscribe_blocked();
    let mut lifecycle = events.subscribe_lifecycle();

    fn closed<T>(result: &Result<T, RecvError>) -> bool {
        matches!(result, Err(RecvError::Closed))
    }

    tokio::spawn(async move {
        loop {
            tokio::select! {
                pending = confirmations.recv() => {
                    if closed(&pending) { break; }
                    if let Ok(pending) = pending {
                        print!("{}", report::render_pending(std::slice::from_ref(&pending)));
                        println!("  confirm {0} | reject {0}", pending.id);
                    }
                }
                decision = suggestions.recv() => {
                    if closed(&decision) { break; }
                    if let Ok(d) = decision {
                        println!(
                            "suggestion: {} {} {} @ {} ({})",
                            d.action, d.quantity, d.asset_id, d.entry_price.round_dp(4), d.reasoning
                        );
                    }
                }
                trip = breakers.recv() => {
                    if closed(&trip) { break; }
                    if let Ok(trip) = trip {
                        println!("circuit breaker {}: {}", trip.kind, trip.reason);
                    }
                }
                notice = blocked.recv() => {
                    if closed(&notice) { break; }
                    if let Ok(notice) = notice {
                        println!("blocked {}: {}", notice.asset_id, notice.reasons.join("; "));
                    }
                }
                event = lifecycle.recv() => {
                    if closed(&event) { break; }
                    if let Ok(trading_agent::LifecycleEvent::EmergencyStop {
                        reason,
                        report: sweep,
                    }) = event
                    {
                        println!("emergency stop ({})", reason);
                        print!("{}", report::render_emergency(&sweep));
                    }
                }
            }
        }
    })
}

pub async fn run(args: RunArgs, mut config: AppConfig) -> Result<()> {
    if let Some(level) = args.autonomy {
        config.agent.autonomy = level;
    }
    let (service, broker) = build_service(&config)?;
    let market = spawn_market(broker, args.tick_ms);
    let notifier = spawn_notifier(&service);

    service.start().await?;
    println!("{}", trading_agent::commands::HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };
        match service.execute(command).await {
            Ok(CommandOutput::Quit) => break,
            Ok(output) => print!("{}", report::render_output(&output)),
            Err(e) => {
                warn!(error = %e, "Command failed");
                println!("error: {}", e);
            }
        }
    }

    notifier.abort();
    if args.flatten_on_exit {
        let flattened = service.emergency_stop("flatten on exit").await;
        print!("{}", report::render_emergency(&flattened));
    }
    service.shutdown().await;
    market.abort();
    Ok(())
}
