//! Plain-text reports of agent state for the console and CLI.

use chrono::Utc;
use rust_decimal::Decimal;
use std::fmt::Write;
use trading_agent::{
    AITradingState, AnalysisReport, CommandOutput, EmergencyStopReport, PendingDecision,
};
use trading_brain::Deliberation;
use trading_core::{Order, Position, TradeDecision};
use trading_risk::{CircuitBreaker, PnlSummary};
use trading_strategies::{StrategyInfo, StrategyStatus};

const RULE: &str = "═══════════════════════════════════════════════════════════";
const THIN_RULE: &str = "───────────────────────────────────────────────────────────";

fn heading(out: &mut String, title: &str) {
    let _ = writeln!(out, "{}", title);
    let _ = writeln!(out, "{}", RULE);
}

fn pct(value: Decimal) -> String {
    format!("{:.2}%", value * Decimal::ONE_HUNDRED)
}

fn level(value: Option<Decimal>) -> String {
    value.map(|v| v.round_dp(4).to_string()).unwrap_or_else(|| "-".into())
}

pub fn render_state(state: &AITradingState) -> String {
    let mut out = String::new();
    heading(&mut out, "Agent");
    let _ = writeln!(
        out,
        "  running: {}   status: {} (since {})   autonomy: {}",
        if state.is_active { "yes" } else { "no" },
        state.status,
        state.status_since.format("%H:%M:%S"),
        state.autonomy_level
    );
    if let Some(error) = &state.last_error {
        let _ = writeln!(out, "  last error: {}", error);
    }
    let last_cycle = state
        .last_cycle_at
        .map(|t| format!("{}s ago", (Utc::now() - t).num_seconds()))
        .unwrap_or_else(|| "never".into());
    let _ = writeln!(
        out,
        "  cycles: {} run, {} skipped, last {}",
        state.stats.cycles_run, state.stats.cycles_skipped, last_cycle
    );
    let _ = writeln!(
        out,
        "  suggestions {}  orders {}  blocked {}  rejected {}  errors {}",
        state.stats.suggestions,
        state.stats.orders_placed,
        state.stats.decisions_blocked,
        state.stats.decisions_rejected,
        state.stats.errors
    );
    out.push('\n');
    out.push_str(&render_positions(&state.active_positions));
    out.push('\n');
    out.push_str(&render_pnl(&state.pnl));
    if !state.pending_decisions.is_empty() {
        out.push('\n');
        out.push_str(&render_pending(&state.pending_decisions));
    }
    if !state.recent_events.is_empty() {
        out.push('\n');
        heading(&mut out, "Recent events");
        for logged in state.recent_events.iter().rev().take(10) {
            let at = logged.at.format("%H:%M:%S");
            let _ = writeln!(out, "  {} #{} {}", at, logged.seq, logged.event);
        }
    }
    out
}

pub fn render_positions(positions: &[Position]) -> String {
    let mut out = String::new();
    heading(&mut out, "Positions");
    if positions.is_empty() {
        let _ = writeln!(out, "  (flat)");
        return out;
    }
    let _ = writeln!(
        out,
        "  {:<10} {:>12} {:>12} {:>12} {:>14}",
        "asset", "quantity", "entry", "price", "unrealized"
    );
    for p in positions {
        let _ = writeln!(
            out,
            "  {:<10} {:>12} {:>12} {:>12} {:>14}",
            p.asset_id,
            p.quantity,
            p.avg_entry_price.round_dp(4),
            p.current_price.round_dp(4),
            p.unrealized_pnl.round_dp(2)
        );
    }
    out
}

pub fn render_pnl(pnl: &PnlSummary) -> String {
    let mut out = String::new();
    heading(&mut out, "PnL");
    let _ = writeln!(
        out,
        "  daily {}  weekly {}  monthly {}",
        pnl.daily_pnl.round_dp(2),
        pnl.weekly_pnl.round_dp(2),
        pnl.monthly_pnl.round_dp(2)
    );
    let _ = writeln!(
        out,
        "  equity {} (peak {}, drawdown {})",
        pnl.current_equity.round_dp(2),
        pnl.peak_equity.round_dp(2),
        pct(pnl.drawdown)
    );
    let perf = &pnl.performance;
    let _ = writeln!(
        out,
        "  trades {}  win rate {:.1}%  profit factor {:.2}  sharpe {:.2}  losing streak {}",
        perf.trades,
        perf.win_rate * 100.0,
        perf.profit_factor,
        perf.sharpe_ratio,
        perf.consecutive_losses
    );
    if !pnl.trading_allowed {
        let _ = writeln!(out, "  TRADING HALTED by circuit breaker");
    }
    out
}

pub fn render_breakers(breakers: &[CircuitBreaker]) -> String {
    let mut out = String::new();
    heading(&mut out, "Circuit breakers");
    for b in breakers {
        let state = match (b.triggered, b.cooldown_ends_at) {
            (true, Some(until)) => format!("TRIPPED until {}", until.format("%H:%M:%S")),
            (true, None) => "TRIPPED".to_string(),
            _ => "ok".to_string(),
        };
        let kind = b.kind.to_string();
        let _ = writeln!(out, "  {:<20} {:<28} threshold {}", kind, state, b.threshold);
        if let (true, Some(reason)) = (b.triggered, &b.reason) {
            let _ = writeln!(out, "      {}", reason);
        }
    }
    out
}

fn decision_line(decision: &TradeDecision) -> String {
    let side = decision.side.map(|s| s.to_string()).unwrap_or_else(|| "-".into());
    format!(
        "{} {} {} {} @ {} (stop {}, target {}, confidence {:.2})",
        decision.action,
        side,
        decision.quantity,
        decision.asset_id,
        decision.entry_price.round_dp(4),
        level(decision.stop_loss),
        level(decision.take_profit),
        decision.confidence
    )
}

pub fn render_pending(pending: &[PendingDecision]) -> String {
    let mut out = String::new();
    heading(&mut out, "Pending decisions");
    if pending.is_empty() {
        let _ = writeln!(out, "  (none)");
    }
    for p in pending {
        let _ = writeln!(out, "  {}", p.id);
        let _ = writeln!(
            out,
            "    {}  expires {}",
            decision_line(&p.decision),
            p.expires_at().format("%H:%M:%S")
        );
        if !p.decision.reasoning.is_empty() {
            let _ = writeln!(out, "    {}", p.decision.reasoning);
        }
    }
    out
}

pub fn render_orders(orders: &[Order]) -> String {
    let mut out = String::new();
    if orders.is_empty() {
        let _ = writeln!(out, "No orders placed");
    }
    for o in orders {
        let _ = writeln!(
            out,
            "{} {} {} {} {:?} filled {} @ {}",
            o.id,
            o.side,
            o.quantity,
            o.asset_id,
            o.status,
            o.filled_quantity,
            level(o.filled_avg_price)
        );
    }
    out
}

pub fn render_analysis(report: &AnalysisReport) -> String {
    let mut out = String::new();
    let a = &report.analysis;
    heading(&mut out, &format!("Analysis of {}", report.asset.id));
    let _ = writeln!(
        out,
        "  bid {}  ask {}  last {}",
        report.quote.bid, report.quote.ask, report.quote.last
    );
    let _ = writeln!(
        out,
        "  trend {:?} strength {:.2} over {} candles",
        a.trend.direction, a.trend.strength, a.trend.duration
    );
    let i = &a.indicators;
    let _ = writeln!(
        out,
        "  rsi {:.1}  macd {:.3}/{:.3}  atr {:.3}  %b {:.2}  stoch {:.1}/{:.1}  vol {:.4}",
        i.rsi,
        i.macd,
        i.macd_signal,
        i.atr,
        i.bollinger_percent_b,
        i.stochastic_k,
        i.stochastic_d,
        i.volatility
    );
    if !a.patterns.is_empty() {
        let _ = writeln!(out, "  patterns {:?}", a.patterns);
    }
    let _ = writeln!(
        out,
        "  recommendation {} ({:.2})",
        a.recommendation.action, a.recommendation.strength
    );
    let _ = writeln!(out, "{}", THIN_RULE);
    for s in &report.signals {
        let _ = writeln!(
            out,
            "  {:<16} {:<5} confidence {:.2} strength {:.2}",
            s.strategy_id, s.action.to_string(), s.confidence, s.strength
        );
    }
    for (id, error) in &report.failures {
        let _ = writeln!(out, "  {:<16} failed: {}", id, error);
    }
    match &report.ensemble {
        Some(e) => {
            let _ = writeln!(out, "  ensemble: {} confidence {:.2}", e.action, e.confidence);
        }
        None => {
            let _ = writeln!(out, "  ensemble: no directional signal");
        }
    }
    let _ = writeln!(out, "{}", THIN_RULE);
    match &report.deliberation {
        Deliberation::Hold(decision) => {
            let _ = writeln!(out, "  HOLD: {}", decision.reasoning);
        }
        Deliberation::Rejected { reasons, .. } => {
            let _ = writeln!(out, "  REJECTED by self-questioning:");
            for reason in reasons {
                let _ = writeln!(out, "    - {}", reason);
            }
        }
        Deliberation::Decided { decision, verdict } => {
            let _ = writeln!(out, "  {}", decision_line(decision));
            let _ = writeln!(out, "  verdict: {:?}", verdict);
            let _ = writeln!(out, "  {}", decision.reasoning);
        }
    }
    out
}

pub fn render_emergency(report: &EmergencyStopReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Emergency stop: {} orders canceled, {} positions closed, {} already closing",
        report.orders_canceled, report.positions_closed, report.already_closing
    );
    for error in &report.errors {
        let _ = writeln!(out, "  error: {}", error);
    }
    out
}

pub fn render_strategies(strategies: &[StrategyStatus]) -> String {
    let mut out = String::new();
    heading(&mut out, "Strategies");
    for s in strategies {
        let p = &s.performance;
        let _ = writeln!(
            out,
            "  {:<16} {:<8} trades {:>4}  win {:>5.1}%  pf {:.2}  pnl {:.2}",
            s.id,
            if s.active { "active" } else { "inactive" },
            p.total_trades,
            p.win_rate * 100.0,
            p.profit_factor,
            p.total_pnl
        );
    }
    out
}

/// The registry table, with default parameters.
pub fn render_registry(infos: &[StrategyInfo]) -> String {
    let mut out = String::new();
    heading(&mut out, "Available Strategies");
    for info in infos {
        let _ = writeln!(out, "  {} ({})", info.name, info.id);
        let _ = writeln!(out, "  {}", THIN_RULE);
        let _ = writeln!(out, "  {}", info.description);
        let _ = writeln!(out, "  defaults: {}", info.default_config);
        out.push('\n');
    }
    out
}

/// Render the result of a console command.
pub fn render_output(output: &CommandOutput) -> String {
    match output {
        CommandOutput::Started => "Agent started\n".into(),
        CommandOutput::Stopped { was_active: true } => "Agent stopped\n".into(),
        CommandOutput::Stopped { was_active: false } => "Agent was not running\n".into(),
        CommandOutput::State(state) => render_state(state),
        CommandOutput::Orders(orders) => render_orders(orders),
        CommandOutput::Positions(positions) => render_positions(positions),
        CommandOutput::Pnl(pnl) => render_pnl(pnl),
        CommandOutput::Breakers(breakers) => render_breakers(breakers),
        CommandOutput::Pending(pending) => render_pending(pending),
        CommandOutput::AutonomySet(level) => format!("Autonomy set to {}\n", level),
        CommandOutput::Rejected(pending) => format!("Rejected {}\n", pending.id),
        CommandOutput::Analysis(report) => render_analysis(report),
        CommandOutput::EmergencyStop(report) => render_emergency(report),
        CommandOutput::Help => format!("{}\n", trading_agent::commands::HELP),
        CommandOutput::Quit => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use trading_core::{AutonomyLevel, TradeAction};
    use trading_risk::{RiskConfig, RiskManager};

    fn position() -> Position {
        let mut p = Position::new("AAPL", dec!(10), dec!(175));
        p.current_price = dec!(180);
        p.unrealized_pnl = dec!(50);
        p
    }

    #[test]
    fn test_positions_table() {
        let text = render_positions(&[position()]);
        assert!(text.contains("AAPL"));
        assert!(text.contains("50"));
        assert!(render_positions(&[]).contains("(flat)"));
    }

    #[test]
    fn test_pnl_and_breakers() {
        let mut risk = RiskManager::new(RiskConfig::default()).unwrap();
        let now = Utc::now();
        let summary = risk.pnl_summary(now);
        assert!(render_pnl(&summary).contains("trades 0"));

        risk.trigger_circuit_breaker(trading_risk::BreakerKind::FlashCrash, "gap down", now);
        let text = render_breakers(&risk.circuit_breaker_status());
        assert!(text.contains("TRIPPED"));
        assert!(text.contains("gap down"));
        assert!(render_pnl(&risk.pnl_summary(now)).contains("HALTED"));
    }

    #[test]
    fn test_pending_lists_ids() {
        let side = Some(trading_core::Side::Buy);
        let decision = TradeDecision::new("MSFT", TradeAction::Buy, side, dec!(5), dec!(410))
            .with_reasoning("momentum consensus");
        let pending = PendingDecision::new(decision, Utc::now());
        let text = render_pending(std::slice::from_ref(&pending));
        assert!(text.contains(&pending.id.to_string()));
        assert!(text.contains("momentum consensus"));
        assert!(text.contains("BUY"));
    }

    #[test]
    fn test_output_messages() {
        assert_eq!(render_output(&CommandOutput::Started), "Agent started\n");
        let autonomy = render_output(&CommandOutput::AutonomySet(AutonomyLevel::Guardian));
        assert!(autonomy.contains("guardian"));
        assert!(render_output(&CommandOutput::Help).contains("set_autonomy"));
        let report = EmergencyStopReport {
            orders_canceled: 2,
            positions_closed: 1,
            errors: vec!["cancel x: not found".into()],
            ..EmergencyStopReport::default()
        };
        let text = render_output(&CommandOutput::EmergencyStop(report));
        assert!(text.contains("2 orders canceled"));
        assert!(text.contains("not found"));
    }
}
