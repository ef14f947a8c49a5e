//! The trading service.
//!
//! A cheap-clone handle over the agent's shared state. One timer task drives
//! [`TradingService::run_analysis_cycle`]; manual trades, confirmations and
//! status queries run concurrently with it. Every component sits behind its
//! own lock and no lock is held across a broker call.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use num_traits::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use trading_brain::{AgentStatus, AutonomyVerdict, DecisionBrain, DecisionContext, Deliberation};
use trading_core::{
    Asset, AutonomyLevel, Broker, ConnectionStatus, Order, OrderRequest, Position, Quote,
    Side, StrategyInput, StrategySignal, TechnicalAnalysis, TradeAction, TradeDecision,
};
use trading_indicators::TechnicalAnalyzer;
use trading_pacing::{Humanizer, TimeGate};
use trading_risk::{BreakerKind, CircuitBreaker, CircuitBreakerEvent, PnlSummary, RiskManager};
use trading_strategies::StrategyEngine;
use uuid::Uuid;

use crate::config::AgentConfig;
use crate::error::{AgentError, AgentResult};
use crate::events::{
    AgentEvent, DecisionNotice, ErrorEvent, EventChannels, LifecycleEvent, OrderEvent,
};
use crate::state::{AITradingState, LoggedEvent, PendingDecision, ServiceState};

/// Client order id prefix of emergency flattening orders.
pub const EMERGENCY_PREFIX: &str = "emergency-";
/// Events included in a state snapshot.
const SNAPSHOT_EVENTS: usize = 50;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn is_emergency(order: &Order) -> bool {
    order.client_order_id.starts_with(EMERGENCY_PREFIX)
}

/// Outcome of an emergency stop sweep.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmergencyStopReport {
    /// Cancel and close calls made against the broker
    pub attempts: usize,
    pub orders_canceled: usize,
    pub positions_closed: usize,
    /// Positions left alone because a flattening order is already working
    pub already_closing: usize,
    pub errors: Vec<String>,
}

/// Why a cycle did nothing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum CycleSkip {
    /// The previous tick is still running
    Busy,
    Inactive,
    Cooldown { wait_secs: i64 },
    OutsideHours { gate: TimeGate },
}

/// What happened to one asset in a cycle.
#[derive(Debug, Clone)]
pub enum AssetOutcome {
    Held { reason: String },
    Rejected { reasons: Vec<String> },
    Blocked { reasons: Vec<String> },
    Suppressed { reason: String },
    Suggested(TradeDecision),
    Queued(PendingDecision),
    Executed { decision: TradeDecision, orders: Vec<Order> },
    Failed { error: String },
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub skipped: Option<CycleSkip>,
    /// Per asset, in processing order
    pub outcomes: Vec<(String, AssetOutcome)>,
}

impl CycleReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            skipped: None,
            outcomes: Vec::new(),
        }
    }

    fn skipped(reason: CycleSkip, started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            skipped: Some(reason),
            outcomes: Vec::new(),
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.skipped.is_some()
    }

    /// Executed decisions with the orders that realized them.
    pub fn executions(&self) -> impl Iterator<Item = (&TradeDecision, &[Order])> {
        self.outcomes.iter().filter_map(|(_, outcome)| match outcome {
            AssetOutcome::Executed { decision, orders } => Some((decision, orders.as_slice())),
            _ => None,
        })
    }

    pub fn orders_placed(&self) -> usize {
        self.executions().map(|(_, orders)| orders.len()).sum()
    }
}

/// The full pipeline for one asset, without execution.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub asset: Asset,
    pub quote: Quote,
    pub analysis: TechnicalAnalysis,
    pub signals: Vec<StrategySignal>,
    pub ensemble: Option<StrategySignal>,
    /// Strategies that failed, with their errors
    pub failures: Vec<(String, String)>,
    pub deliberation: Deliberation,
}

/// A closing order whose realized PnL is not booked yet.
#[derive(Debug, Clone)]
struct PendingClose {
    order_id: Uuid,
    asset_id: String,
    entry_price: Decimal,
    /// +1 closing a long, -1 closing a short
    direction: Decimal,
    quantity: Decimal,
    strategy_ids: Vec<String>,
}

#[derive(Default)]
struct Tasks {
    shutdown: Option<watch::Sender<bool>>,
    timer: Option<JoinHandle<()>>,
    breaker_listener: Option<JoinHandle<()>>,
}

struct Inner {
    config: AgentConfig,
    broker: Arc<dyn Broker>,
    analyzer: TechnicalAnalyzer,
    state: Mutex<ServiceState>,
    risk: Mutex<RiskManager>,
    engine: Mutex<StrategyEngine>,
    brain: Mutex<DecisionBrain>,
    humanizer: Mutex<Humanizer>,
    /// Strategies behind each open position
    attribution: Mutex<HashMap<String, Vec<String>>>,
    closes: Mutex<Vec<PendingClose>>,
    events: EventChannels,
    cycle_guard: tokio::sync::Mutex<()>,
    tasks: Mutex<Tasks>,
}

#[derive(Clone)]
pub struct TradingService {
    inner: Arc<Inner>,
}

impl TradingService {
    pub fn new(
        config: AgentConfig,
        broker: Arc<dyn Broker>,
        engine: StrategyEngine,
        risk: RiskManager,
        brain: DecisionBrain,
        humanizer: Humanizer,
    ) -> AgentResult<Self> {
        config.validate()?;
        let state = ServiceState::new(config.autonomy, config.event_log_capacity, Utc::now());
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                broker,
                analyzer: TechnicalAnalyzer::default(),
                state: Mutex::new(state),
                risk: Mutex::new(risk),
                engine: Mutex::new(engine),
                brain: Mutex::new(brain),
                humanizer: Mutex::new(humanizer),
                attribution: Mutex::new(HashMap::new()),
                closes: Mutex::new(Vec::new()),
                events: EventChannels::new(),
                cycle_guard: tokio::sync::Mutex::new(()),
                tasks: Mutex::new(Tasks::default()),
            }),
        })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.inner.config
    }

    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.inner.broker
    }

    pub fn events(&self) -> &EventChannels {
        &self.inner.events
    }

    pub fn is_active(&self) -> bool {
        lock(&self.inner.state).is_active()
    }

    pub fn status(&self) -> AgentStatus {
        lock(&self.inner.state).status().status()
    }

    pub fn autonomy(&self) -> AutonomyLevel {
        lock(&self.inner.state).autonomy()
    }

    pub fn pending_decisions(&self) -> Vec<PendingDecision> {
        lock(&self.inner.state).pending().to_vec()
    }

    pub fn recent_events(&self, n: usize) -> Vec<LoggedEvent> {
        lock(&self.inner.state).recent_events(n)
    }

    pub fn strategies(&self) -> Vec<trading_strategies::StrategyStatus> {
        lock(&self.inner.engine).list()
    }

    /// Start the control loop. Calling it on a running agent is a no-op.
    pub async fn start(&self) -> AgentResult<()> {
        if self.is_active() {
            debug!("Agent already running");
            return Ok(());
        }
        if self.inner.broker.connection_status() != ConnectionStatus::Connected {
            self.inner.broker.connect().await?;
        }
        if lock(&self.inner.state).set_active(true) {
            return Ok(());
        }
        lock(&self.inner.humanizer).start_session(Utc::now());
        self.spawn_breaker_listener();
        self.spawn_timer();

        info!(
            broker = self.inner.broker.name(),
            assets = ?self.inner.config.assets,
            autonomy = %self.autonomy(),
            interval_secs = self.inner.config.cycle_interval_secs,
            "Trading agent started"
        );
        self.emit(AgentEvent::Lifecycle(LifecycleEvent::Started));
        Ok(())
    }

    /// Halt future ticks. A cycle already running finishes its current asset.
    /// Returns whether the agent was running.
    pub fn stop(&self, reason: &str) -> bool {
        self.halt_timer();
        let was_active = {
            let mut state = lock(&self.inner.state);
            let was_active = state.set_active(false);
            state.status_mut().settle(Utc::now());
            was_active
        };
        if was_active {
            info!(reason, "Trading agent stopped");
            self.emit(AgentEvent::Lifecycle(LifecycleEvent::Stopped {
                reason: reason.to_string(),
            }));
        }
        was_active
    }

    /// Stop and wait for the background tasks to finish.
    pub async fn shutdown(&self) {
        self.stop("shutdown");
        let (timer, listener) = {
            let mut tasks = lock(&self.inner.tasks);
            (tasks.timer.take(), tasks.breaker_listener.take())
        };
        if let Some(listener) = &listener {
            listener.abort();
        }
        let handles: Vec<JoinHandle<()>> = timer.into_iter().chain(listener).collect();
        for result in join_all(handles).await {
            if let Err(e) = result {
                if !e.is_cancelled() {
                    warn!(error = %e, "Background task ended abnormally");
                }
            }
        }
    }

    /// Stop the timer, then cancel every open order and flatten every
    /// position. Individual failures are collected, never fatal.
    ///
    /// Safe to call repeatedly and while a cycle is running: flattening
    /// orders are never canceled and a position that already has one
    /// working is skipped.
    pub async fn emergency_stop(&self, reason: &str) -> EmergencyStopReport {
        self.halt_timer();
        let was_active = {
            let mut state = lock(&self.inner.state);
            let was_active = state.set_active(false);
            state.status_mut().settle(Utc::now());
            was_active
        };
        warn!(reason, was_active, "Emergency stop");

        let broker = &self.inner.broker;
        let mut report = EmergencyStopReport::default();
        let mut closing: HashSet<String> = HashSet::new();

        match broker.get_orders(true).await {
            Ok(orders) => {
                for order in orders {
                    if is_emergency(&order) {
                        closing.insert(order.asset_id.clone());
                        continue;
                    }
                    report.attempts += 1;
                    match broker.cancel_order(order.id).await {
                        Ok(()) => report.orders_canceled += 1,
                        Err(e) => report
                            .errors
                            .push(format!("cancel {} on {}: {}", order.id, order.asset_id, e)),
                    }
                }
            }
            Err(e) => report.errors.push(format!("list open orders: {}", e)),
        }

        match broker.get_positions().await {
            Ok(positions) => {
                for position in positions.into_iter().filter(|p| !p.is_flat()) {
                    if closing.contains(&position.asset_id) {
                        report.already_closing += 1;
                        continue;
                    }
                    report.attempts += 1;
                    let request = OrderRequest::market(
                        position.asset_id.clone(),
                        position.closing_side(),
                        position.abs_quantity(),
                    )
                    .with_client_order_id(format!("{}{}", EMERGENCY_PREFIX, Uuid::new_v4()));
                    match broker.place_order(request).await {
                        Ok(order) => {
                            report.positions_closed += 1;
                            let mut closable = position.abs_quantity();
                            self.track_close(Some(&position), &order, &mut closable);
                            self.emit(AgentEvent::Order(OrderEvent {
                                decision_id: None,
                                order,
                            }));
                        }
                        Err(e) => report.errors.push(format!(
                            "close {} {}: {}",
                            position.quantity, position.asset_id, e
                        )),
                    }
                }
            }
            Err(e) => report.errors.push(format!("list positions: {}", e)),
        }

        self.settle_closes().await;

        if report.errors.is_empty() {
            info!(
                canceled = report.orders_canceled,
                closed = report.positions_closed,
                "Emergency stop complete"
            );
        } else {
            error!(
                canceled = report.orders_canceled,
                closed = report.positions_closed,
                errors = ?report.errors,
                "Emergency stop finished with errors"
            );
        }
        self.emit(AgentEvent::Lifecycle(LifecycleEvent::EmergencyStop {
            reason: reason.to_string(),
            report: report.clone(),
        }));
        report
    }

    /// One pass of the control loop over every configured asset.
    ///
    /// Skips without side effects while another cycle runs, while stopped,
    /// or when the pacing gates say no.
    pub async fn run_analysis_cycle(&self) -> AgentResult<CycleReport> {
        let now = Utc::now();
        let Ok(_guard) = self.inner.cycle_guard.try_lock() else {
            debug!("Previous cycle still running, skipping tick");
            return Ok(CycleReport::skipped(CycleSkip::Busy, now));
        };
        if !self.is_active() {
            return Ok(CycleReport::skipped(CycleSkip::Inactive, now));
        }

        {
            let mut state = lock(&self.inner.state);
            state.status_mut().begin_cycle(now)?;
            state.last_cycle_at = Some(now);
        }

        if let Some(skip) = self.pacing_gate(now) {
            let status = match skip {
                CycleSkip::OutsideHours { .. } => AgentStatus::OutsideHours,
                _ => AgentStatus::Cooldown,
            };
            debug!(?skip, "Pacing gate closed, skipping cycle");
            self.set_status(status);
            lock(&self.inner.state).stats.cycles_skipped += 1;
            return Ok(CycleReport::skipped(skip, now));
        }

        let expired = lock(&self.inner.state).expire_pending(now);
        for pending in expired {
            info!(id = %pending.id, asset = %pending.decision.asset_id, "Pending decision expired");
        }
        self.settle_closes().await;

        let mut report = CycleReport::new(now);
        let mut last_error = None;
        for asset_id in &self.inner.config.assets {
            if !self.is_active() {
                info!("Agent stopped mid-cycle");
                break;
            }
            let outcome = match self.process_asset(asset_id).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(asset = %asset_id, error = %e, "Asset processing failed");
                    self.record_operation(false);
                    self.emit(AgentEvent::Error(ErrorEvent {
                        context: asset_id.clone(),
                        message: e.to_string(),
                    }));
                    last_error = Some(format!("{}: {}", asset_id, e));
                    AssetOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };
            report.outcomes.push((asset_id.clone(), outcome));
        }

        {
            let mut state = lock(&self.inner.state);
            state.stats.cycles_run += 1;
            match last_error {
                Some(reason) => state.status_mut().fail(reason, Utc::now()),
                None => {
                    if let Err(e) = state.status_mut().transition(AgentStatus::Active, Utc::now()) {
                        debug!(error = %e, "Cycle status left unchanged");
                    }
                }
            }
        }
        info!(
            assets = report.outcomes.len(),
            orders = report.orders_placed(),
            "Analysis cycle complete"
        );
        Ok(report)
    }

    /// Run the pipeline for one asset without executing anything.
    pub async fn analyze_once(&self, asset_id: &str) -> AgentResult<AnalysisReport> {
        self.analyze_asset(asset_id).await
    }

    /// Place a manual order regardless of autonomy level. It is still risk
    /// assessed and split the same way automatic orders are.
    pub async fn request_trade(
        &self,
        asset_id: &str,
        side: Side,
        quantity: Decimal,
    ) -> AgentResult<Vec<Order>> {
        OrderRequest::market(asset_id, side, quantity).validate()?;

        let broker = &self.inner.broker;
        let quote = broker.get_quote(asset_id).await?;
        let position = broker.get_position(asset_id).await?.filter(|p| !p.is_flat());
        let action = match &position {
            Some(p) if side == p.closing_side() && quantity == p.abs_quantity() => {
                TradeAction::Close
            }
            _ if side == Side::Buy => TradeAction::Buy,
            _ => TradeAction::Sell,
        };
        let decision = TradeDecision::new(asset_id, action, Some(side), quantity, quote.last)
            .with_confidence(1.0)
            .with_reasoning(format!("manual {} request", action))
            .with_entry_invariant();
        if !decision.action.is_actionable() {
            return Err(AgentError::NotActionable(asset_id.to_string()));
        }
        info!(asset = %asset_id, %side, %quantity, "Manual trade requested");

        let decision = self.reassess(decision).await?;
        self.execute_decision(&decision, false).await
    }

    pub async fn confirm_pending_decision(&self, id: Uuid) -> AgentResult<Vec<Order>> {
        let pending = lock(&self.inner.state).take_pending(id, Utc::now());
        let pending = match pending {
            Ok(pending) => pending,
            Err(e) => {
                warn!(%id, error = %e, "Cannot confirm decision");
                return Err(e);
            }
        };
        info!(%id, asset = %pending.decision.asset_id, "Pending decision confirmed");
        let decision = self.reassess(pending.decision).await?;
        self.execute_decision(&decision, false).await
    }

    pub fn reject_pending_decision(&self, id: Uuid) -> AgentResult<PendingDecision> {
        let pending = lock(&self.inner.state).remove_pending(id)?;
        info!(%id, asset = %pending.decision.asset_id, "Pending decision rejected");
        self.emit(AgentEvent::Rejected(DecisionNotice {
            asset_id: pending.decision.asset_id.clone(),
            decision_id: Some(pending.decision.id),
            reasons: vec!["rejected by user".into()],
        }));
        Ok(pending)
    }

    pub fn set_autonomy_level(&self, level: AutonomyLevel) {
        let previous = lock(&self.inner.state).set_autonomy(level);
        if previous != level {
            info!(from = %previous, to = %level, "Autonomy level changed");
            self.emit(AgentEvent::Lifecycle(LifecycleEvent::AutonomyChanged {
                from: previous,
                to: level,
            }));
        }
    }

    pub async fn get_positions(&self) -> AgentResult<Vec<Position>> {
        Ok(self.inner.broker.get_positions().await?)
    }

    pub fn get_pnl_summary(&self) -> PnlSummary {
        lock(&self.inner.risk).pnl_summary(Utc::now())
    }

    pub fn get_circuit_breaker_status(&self) -> Vec<CircuitBreaker> {
        lock(&self.inner.risk).circuit_breaker_status()
    }

    /// Trip a breaker from outside the risk checks. Critical kinds escalate
    /// to an emergency stop once the breaker listener is running.
    pub fn trigger_circuit_breaker(&self, kind: BreakerKind, reason: &str) -> CircuitBreakerEvent {
        lock(&self.inner.risk).trigger_circuit_breaker(kind, reason, Utc::now())
    }

    pub async fn get_state(&self) -> AgentResult<AITradingState> {
        let active_positions = self.inner.broker.get_positions().await?;
        let pnl = self.get_pnl_summary();
        let state = lock(&self.inner.state);
        Ok(AITradingState {
            is_active: state.is_active(),
            status: state.status().status(),
            status_since: state.status().since(),
            last_error: state.status().last_error().map(str::to_string),
            autonomy_level: state.autonomy(),
            pending_decisions: state.pending().to_vec(),
            active_positions,
            recent_events: state.recent_events(SNAPSHOT_EVENTS),
            pnl,
            stats: state.stats,
            last_cycle_at: state.last_cycle_at,
        })
    }

    fn emit(&self, event: AgentEvent) {
        debug!(event = event.name(), "{}", event.summary());
        self.inner.events.publish(&event);
        lock(&self.inner.state).record(event, Utc::now());
    }

    fn set_status(&self, next: AgentStatus) {
        let mut state = lock(&self.inner.state);
        if let Err(e) = state.status_mut().transition(next, Utc::now()) {
            debug!(error = %e, "Status change skipped");
        }
    }

    fn record_operation(&self, success: bool) {
        lock(&self.inner.risk).record_operation(success, Utc::now());
    }

    fn pacing_gate(&self, now: DateTime<Utc>) -> Option<CycleSkip> {
        let mut humanizer = lock(&self.inner.humanizer);
        let gate = humanizer.can_act(now);
        if !gate.is_allowed() {
            return Some(CycleSkip::Cooldown {
                wait_secs: gate.wait().num_seconds(),
            });
        }
        let time = humanizer.is_trading_time_allowed(now);
        if !time.is_allowed() {
            return Some(CycleSkip::OutsideHours { gate: time });
        }
        None
    }

    fn halt_timer(&self) {
        let mut tasks = lock(&self.inner.tasks);
        if let Some(shutdown) = tasks.shutdown.take() {
            let _ = shutdown.send(true);
        }
    }

    fn spawn_timer(&self) {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let period = self.inner.config.cycle_interval();
        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(inner) = weak.upgrade() else { break };
                        let service = TradingService { inner };
                        if let Err(e) = service.run_analysis_cycle().await {
                            error!(error = %e, "Analysis cycle failed");
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("Control loop timer stopped");
        });

        let mut tasks = lock(&self.inner.tasks);
        if let Some(previous) = tasks.shutdown.replace(shutdown_tx) {
            let _ = previous.send(true);
        }
        tasks.timer = Some(handle);
    }

    fn spawn_breaker_listener(&self) {
        let mut tasks = lock(&self.inner.tasks);
        if tasks.breaker_listener.is_some() {
            return;
        }
        let mut trips = lock(&self.inner.risk).subscribe();
        let weak = Arc::downgrade(&self.inner);
        tasks.breaker_listener = Some(tokio::spawn(async move {
            loop {
                match trips.recv().await {
                    Ok(trip) => {
                        let Some(inner) = weak.upgrade() else { break };
                        TradingService { inner }.on_circuit_breaker(trip).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Circuit breaker listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));
    }

    async fn on_circuit_breaker(&self, trip: CircuitBreakerEvent) {
        let critical = trip.critical;
        let reason = format!("{} breaker: {}", trip.kind, trip.reason);
        self.emit(AgentEvent::CircuitBreaker(trip));
        if critical {
            error!(%reason, "Critical circuit breaker, flattening");
            self.emergency_stop(&reason).await;
        }
    }

    /// Fetch data for `asset_id` and deliberate on it.
    async fn analyze_asset(&self, asset_id: &str) -> AgentResult<AnalysisReport> {
        let broker = &self.inner.broker;
        let config = &self.inner.config;
        let asset = broker.get_asset(asset_id).await?;
        let quote = broker.get_quote(asset_id).await?;
        let candles = broker.get_candles(asset_id, config.timeframe, config.candle_limit).await?;
        let portfolio = broker.get_account().await?;
        let now = Utc::now();
        self.record_operation(true);

        if let Some(price) = quote.last.to_f64() {
            lock(&self.inner.risk).observe_price(asset_id, price, now);
        }
        let analysis = self.inner.analyzer.analyze(asset_id, &candles)?;
        lock(&self.inner.risk).observe_volatility(asset_id, analysis.indicators.volatility, now);

        let position = portfolio.position(asset_id).filter(|p| !p.is_flat());
        let input = StrategyInput {
            asset: &asset,
            candles: &candles,
            analysis: &analysis,
            quote: Some(&quote),
            position,
        };
        let (batch, ensemble) = {
            let engine = lock(&self.inner.engine);
            let batch = engine.generate_signals(&input);
            let ensemble = engine.fuse(&batch.signals);
            (batch, ensemble)
        };
        let failures: Vec<(String, String)> = batch
            .failures
            .iter()
            .map(|(id, e)| (id.clone(), e.to_string()))
            .collect();
        for (id, message) in &failures {
            self.emit(AgentEvent::Error(ErrorEvent {
                context: format!("strategy {} on {}", id, asset_id),
                message: message.clone(),
            }));
        }

        let deliberation = {
            let ctx = DecisionContext {
                analysis: &analysis,
                ensemble: ensemble.as_ref(),
                signals: &batch.signals,
                portfolio: &portfolio,
                quote: Some(&quote),
                autonomy: self.autonomy(),
                now,
            };
            let brain = lock(&self.inner.brain);
            let mut risk = lock(&self.inner.risk);
            brain.process_analysis(&ctx, &mut risk)?
        };

        Ok(AnalysisReport {
            asset,
            quote,
            analysis,
            signals: batch.signals,
            ensemble,
            failures,
            deliberation,
        })
    }

    async fn process_asset(&self, asset_id: &str) -> AgentResult<AssetOutcome> {
        let report = self.analyze_asset(asset_id).await?;
        match report.deliberation {
            Deliberation::Hold(decision) => {
                debug!(asset = %asset_id, reason = %decision.reasoning, "Holding");
                Ok(AssetOutcome::Held {
                    reason: decision.reasoning,
                })
            }
            Deliberation::Rejected { asset_id, reasons } => {
                info!(
                    asset = %asset_id,
                    reasons = ?reasons,
                    "Decision rejected by self-questioning"
                );
                lock(&self.inner.state).stats.decisions_rejected += 1;
                self.emit(AgentEvent::Rejected(DecisionNotice {
                    asset_id,
                    decision_id: None,
                    reasons: reasons.clone(),
                }));
                Ok(AssetOutcome::Rejected { reasons })
            }
            Deliberation::Decided { decision, verdict } => self.act(decision, verdict).await,
        }
    }

    /// Pace, re-assess and route a decision by its autonomy verdict.
    async fn act(
        &self,
        decision: TradeDecision,
        verdict: AutonomyVerdict,
    ) -> AgentResult<AssetOutcome> {
        if let AutonomyVerdict::Suppress(reason) = &verdict {
            debug!(asset = %decision.asset_id, %reason, "Decision suppressed");
            return Ok(AssetOutcome::Suppressed {
                reason: reason.clone(),
            });
        }

        let delay = lock(&self.inner.humanizer).get_delay();
        tokio::time::sleep(delay).await;
        if !self.is_active() {
            return Ok(AssetOutcome::Suppressed {
                reason: "agent stopped".into(),
            });
        }

        let decision = match self.reassess(decision).await {
            Ok(decision) => decision,
            Err(AgentError::RiskBlocked { reasons }) => {
                return Ok(AssetOutcome::Blocked { reasons })
            }
            Err(e) => return Err(e),
        };

        match verdict {
            AutonomyVerdict::Suggest => {
                info!(
                    asset = %decision.asset_id,
                    action = %decision.action,
                    quantity = %decision.quantity,
                    "Trade suggested"
                );
                lock(&self.inner.state).stats.suggestions += 1;
                self.emit(AgentEvent::TradeSuggestion(decision.clone()));
                Ok(AssetOutcome::Suggested(decision))
            }
            AutonomyVerdict::Confirm => {
                let pending = lock(&self.inner.state).enqueue(decision, Utc::now());
                info!(
                    id = %pending.id,
                    asset = %pending.decision.asset_id,
                    expires_at = %pending.expires_at(),
                    "Decision awaiting confirmation"
                );
                self.emit(AgentEvent::TradeConfirmationRequired(pending.clone()));
                Ok(AssetOutcome::Queued(pending))
            }
            AutonomyVerdict::Execute => {
                let orders = self.execute_decision(&decision, true).await?;
                if orders.is_empty() {
                    return Ok(AssetOutcome::Suppressed {
                        reason: "agent stopped before execution".into(),
                    });
                }
                Ok(AssetOutcome::Executed {
                    decision: decision.into_executed(),
                    orders,
                })
            }
            AutonomyVerdict::Suppress(reason) => Ok(AssetOutcome::Suppressed { reason }),
        }
    }

    /// Assess against the live account; blocked decisions become `RiskBlocked`.
    async fn reassess(&self, decision: TradeDecision) -> AgentResult<TradeDecision> {
        let portfolio = self.inner.broker.get_account().await?;
        let assessment =
            lock(&self.inner.risk).assess_trade_risk(&decision, &portfolio, Utc::now());

        if !assessment.can_trade {
            let reasons = assessment.rejection_reasons();
            warn!(asset = %decision.asset_id, reasons = ?reasons, "Decision blocked by risk");
            lock(&self.inner.state).stats.decisions_blocked += 1;
            self.emit(AgentEvent::Blocked(DecisionNotice {
                asset_id: decision.asset_id.clone(),
                decision_id: Some(decision.id),
                reasons: reasons.clone(),
            }));
            return Err(AgentError::RiskBlocked { reasons });
        }

        let mut decision = decision;
        if let Some(quantity) = assessment.adjusted_quantity {
            if quantity <= Decimal::ZERO {
                return Err(AgentError::RiskBlocked {
                    reasons: vec!["risk sizing left nothing to trade".into()],
                });
            }
            decision = decision.with_quantity(quantity);
        }
        if decision.stop_loss.is_none() && assessment.adjusted_stop_loss.is_some() {
            let target = decision.take_profit;
            decision = decision.with_levels(assessment.adjusted_stop_loss, target);
        }
        Ok(decision.with_risk_assessment(assessment))
    }

    /// Place `decision` chunk by chunk. A failed chunk abandons the rest;
    /// automatic executions also stop when the agent is stopped.
    async fn execute_decision(
        &self,
        decision: &TradeDecision,
        automatic: bool,
    ) -> AgentResult<Vec<Order>> {
        let request = decision
            .order_request()
            .ok_or_else(|| AgentError::NotActionable(decision.asset_id.clone()))?;
        request.validate()?;

        let position = self
            .inner
            .broker
            .get_position(&decision.asset_id)
            .await?
            .filter(|p| !p.is_flat());
        let mut closable = position.as_ref().map(|p| p.abs_quantity()).unwrap_or_default();

        let chunks = lock(&self.inner.humanizer).shape_order(&request);
        let total = chunks.len();
        let mut orders = Vec::with_capacity(total);
        for (i, chunk) in chunks.into_iter().enumerate() {
            if automatic && !self.is_active() {
                warn!(
                    asset = %decision.asset_id,
                    remaining = total - i,
                    "Agent stopped, abandoning chunks"
                );
                break;
            }
            if i > 0 {
                let delay = lock(&self.inner.humanizer).get_delay();
                tokio::time::sleep(delay).await;
            }
            let chunk = if total > 1 {
                chunk.with_client_order_id(format!("{}-{}", decision.id, i + 1))
            } else {
                chunk
            };

            match self.inner.broker.place_order(chunk).await {
                Ok(order) => {
                    self.record_operation(true);
                    lock(&self.inner.humanizer).record_action(Utc::now());
                    info!(
                        asset = %order.asset_id,
                        side = %order.side,
                        quantity = %order.quantity,
                        status = ?order.status,
                        chunk = i + 1,
                        of = total,
                        "Order placed"
                    );
                    self.track_close(position.as_ref(), &order, &mut closable);
                    self.emit(AgentEvent::Order(OrderEvent {
                        decision_id: Some(decision.id),
                        order: order.clone(),
                    }));
                    orders.push(order);
                }
                Err(e) => {
                    error!(
                        asset = %decision.asset_id,
                        chunk = i + 1,
                        of = total,
                        error = %e,
                        "Order failed"
                    );
                    self.record_operation(false);
                    self.emit(AgentEvent::Error(ErrorEvent {
                        context: format!("order {}", decision.asset_id),
                        message: e.to_string(),
                    }));
                    if orders.is_empty() {
                        return Err(e.into());
                    }
                    break;
                }
            }
        }

        if !orders.is_empty() {
            lock(&self.inner.state).stats.orders_placed += orders.len() as u64;
            lock(&self.inner.brain).record_execution(decision);
            self.attribute(decision, position.as_ref());
            self.settle_closes().await;
        }
        Ok(orders)
    }

    /// Remember which strategies opened or added to a position.
    fn attribute(&self, decision: &TradeDecision, position: Option<&Position>) {
        if !matches!(decision.action, TradeAction::Buy | TradeAction::Sell)
            || decision.is_risk_reducing(position)
            || decision.strategy_ids.is_empty()
        {
            return;
        }
        let mut attribution = lock(&self.inner.attribution);
        let ids = attribution.entry(decision.asset_id.clone()).or_default();
        for id in &decision.strategy_ids {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
    }

    /// Queue `order` for PnL booking if it reduces `position`.
    fn track_close(&self, position: Option<&Position>, order: &Order, closable: &mut Decimal) {
        let Some(position) = position else { return };
        if order.side != position.closing_side() || *closable <= Decimal::ZERO {
            return;
        }
        let quantity = order.quantity.min(*closable);
        *closable -= quantity;
        let strategy_ids = lock(&self.inner.attribution)
            .get(&position.asset_id)
            .cloned()
            .unwrap_or_default();
        lock(&self.inner.closes).push(PendingClose {
            order_id: order.id,
            asset_id: position.asset_id.clone(),
            entry_price: position.avg_entry_price,
            direction: if position.is_long() { Decimal::ONE } else { -Decimal::ONE },
            quantity,
            strategy_ids,
        });
    }

    /// Book realized PnL of closing orders that have finished.
    async fn settle_closes(&self) {
        let queued: Vec<PendingClose> = std::mem::take(&mut *lock(&self.inner.closes));
        if queued.is_empty() {
            return;
        }
        let mut working = Vec::new();
        let mut flattened = Vec::new();
        for close in queued {
            match self.inner.broker.get_order(close.order_id).await {
                Ok(order) if order.status.is_terminal() => {
                    if order.filled_quantity > Decimal::ZERO {
                        self.book_close(&close, &order);
                        flattened.push(close.asset_id);
                    }
                }
                Ok(_) => working.push(close),
                Err(e) => warn!(
                    order = %close.order_id,
                    error = %e,
                    "Dropping close the broker no longer knows"
                ),
            }
        }
        lock(&self.inner.closes).extend(working);

        for asset_id in flattened {
            if let Ok(None) = self.inner.broker.get_position(&asset_id).await {
                lock(&self.inner.attribution).remove(&asset_id);
                lock(&self.inner.brain).forget(&asset_id);
            }
        }
    }

    fn book_close(&self, close: &PendingClose, order: &Order) {
        let Some(fill_price) = order.filled_avg_price else {
            return;
        };
        let quantity = order.filled_quantity.min(close.quantity);
        let pnl = (fill_price - close.entry_price) * quantity * close.direction;
        let basis = close.entry_price * quantity;
        let trade_return = if basis > Decimal::ZERO {
            (pnl / basis).to_f64().unwrap_or(0.0)
        } else {
            0.0
        };
        let now = Utc::now();
        lock(&self.inner.risk).record_trade(pnl, trade_return, now);

        let pnl_f64 = pnl.to_f64().unwrap_or(0.0);
        {
            let mut engine = lock(&self.inner.engine);
            for id in &close.strategy_ids {
                if let Err(e) = engine.record_outcome(id, pnl_f64) {
                    debug!(strategy = %id, error = %e, "Outcome not recorded");
                }
            }
        }
        info!(
            asset = %close.asset_id,
            %quantity,
            %pnl,
            trade_return,
            strategies = ?close.strategy_ids,
            "Realized trade"
        );
    }
}
