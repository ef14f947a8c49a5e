//! Service events.
//!
//! Every kind of event has its own broadcast channel carrying its own
//! payload type. Subscribers pick the kinds they care about; delivery is
//! at-most-once and a lagging receiver loses the oldest entries. The
//! service also appends every event to its bounded in-memory log.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;
use trading_core::{AutonomyLevel, Order, TradeDecision};
use trading_risk::CircuitBreakerEvent;
use uuid::Uuid;

use crate::service::EmergencyStopReport;
use crate::state::PendingDecision;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LifecycleEvent {
    Started,
    Stopped { reason: String },
    EmergencyStop { reason: String, report: EmergencyStopReport },
    AutonomyChanged { from: AutonomyLevel, to: AutonomyLevel },
}

/// An order placed by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    /// Decision the order realizes; `None` for emergency flattening
    pub decision_id: Option<Uuid>,
    pub order: Order,
}

/// A decision that was dropped, with the reasons why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionNotice {
    pub asset_id: String,
    pub decision_id: Option<Uuid>,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
    /// What the service was doing, e.g. an asset id or operation name
    pub context: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum AgentEvent {
    Lifecycle(LifecycleEvent),
    TradeSuggestion(TradeDecision),
    TradeConfirmationRequired(PendingDecision),
    CircuitBreaker(CircuitBreakerEvent),
    Order(OrderEvent),
    /// Risk assessment refused the decision
    Blocked(DecisionNotice),
    /// Self-questioning refused the decision
    Rejected(DecisionNotice),
    Error(ErrorEvent),
}

impl AgentEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AgentEvent::Lifecycle(LifecycleEvent::Started) => "started",
            AgentEvent::Lifecycle(LifecycleEvent::Stopped { .. }) => "stopped",
            AgentEvent::Lifecycle(LifecycleEvent::EmergencyStop { .. }) => "emergency_stop",
            AgentEvent::Lifecycle(LifecycleEvent::AutonomyChanged { .. }) => "autonomy_changed",
            AgentEvent::TradeSuggestion(_) => "trade_suggestion",
            AgentEvent::TradeConfirmationRequired(_) => "trade_confirmation_required",
            AgentEvent::CircuitBreaker(_) => "circuit_breaker",
            AgentEvent::Order(_) => "order",
            AgentEvent::Blocked(_) => "blocked",
            AgentEvent::Rejected(_) => "rejected",
            AgentEvent::Error(_) => "error",
        }
    }

    /// One-line human summary.
    pub fn summary(&self) -> String {
        match self {
            AgentEvent::Lifecycle(LifecycleEvent::Started) => "agent started".into(),
            AgentEvent::Lifecycle(LifecycleEvent::Stopped { reason }) => {
                format!("agent stopped: {}", reason)
            }
            AgentEvent::Lifecycle(LifecycleEvent::EmergencyStop { reason, report }) => format!(
                "emergency stop ({}): {} canceled, {} closed, {} errors",
                reason,
                report.orders_canceled,
                report.positions_closed,
                report.errors.len()
            ),
            AgentEvent::Lifecycle(LifecycleEvent::AutonomyChanged { from, to }) => {
                format!("autonomy {} -> {}", from, to)
            }
            AgentEvent::TradeSuggestion(d) => format!(
                "suggest {} {} {} @ {} ({:.0}%)",
                d.action,
                d.quantity,
                d.asset_id,
                d.entry_price,
                d.confidence * 100.0
            ),
            AgentEvent::TradeConfirmationRequired(p) => format!(
                "confirm {}: {} {} {} @ {}",
                p.id,
                p.decision.action,
                p.decision.quantity,
                p.decision.asset_id,
                p.decision.entry_price
            ),
            AgentEvent::CircuitBreaker(trip) => format!("{} breaker: {}", trip.kind, trip.reason),
            AgentEvent::Order(e) => format!(
                "{} {} {} {} ({:?})",
                e.order.side,
                e.order.quantity,
                e.order.asset_id,
                e.order.order_type,
                e.order.status
            ),
            AgentEvent::Blocked(n) => format!("blocked {}: {}", n.asset_id, n.reasons.join("; ")),
            AgentEvent::Rejected(n) => format!("rejected {}: {}", n.asset_id, n.reasons.join("; ")),
            AgentEvent::Error(e) => format!("{}: {}", e.context, e.message),
        }
    }
}

impl fmt::Display for AgentEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.name(), self.summary())
    }
}

/// One broadcast channel per event kind.
pub struct EventChannels {
    lifecycle: broadcast::Sender<LifecycleEvent>,
    suggestions: broadcast::Sender<TradeDecision>,
    confirmations: broadcast::Sender<PendingDecision>,
    breakers: broadcast::Sender<CircuitBreakerEvent>,
    orders: broadcast::Sender<OrderEvent>,
    blocked: broadcast::Sender<DecisionNotice>,
    rejected: broadcast::Sender<DecisionNotice>,
    errors: broadcast::Sender<ErrorEvent>,
}

impl Default for EventChannels {
    fn default() -> Self {
        Self {
            lifecycle: broadcast::channel(CHANNEL_CAPACITY).0,
            suggestions: broadcast::channel(CHANNEL_CAPACITY).0,
            confirmations: broadcast::channel(CHANNEL_CAPACITY).0,
            breakers: broadcast::channel(CHANNEL_CAPACITY).0,
            orders: broadcast::channel(CHANNEL_CAPACITY).0,
            blocked: broadcast::channel(CHANNEL_CAPACITY).0,
            rejected: broadcast::channel(CHANNEL_CAPACITY).0,
            errors: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }
}

impl EventChannels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `event` to its channel. Sending without subscribers is not an error.
    pub fn publish(&self, event: &AgentEvent) {
        match event {
            AgentEvent::Lifecycle(e) => {
                let _ = self.lifecycle.send(e.clone());
            }
            AgentEvent::TradeSuggestion(d) => {
                let _ = self.suggestions.send(d.clone());
            }
            AgentEvent::TradeConfirmationRequired(p) => {
                let _ = self.confirmations.send(p.clone());
            }
            AgentEvent::CircuitBreaker(trip) => {
                let _ = self.breakers.send(trip.clone());
            }
            AgentEvent::Order(e) => {
                let _ = self.orders.send(e.clone());
            }
            AgentEvent::Blocked(n) => {
                let _ = self.blocked.send(n.clone());
            }
            AgentEvent::Rejected(n) => {
                let _ = self.rejected.send(n.clone());
            }
            AgentEvent::Error(e) => {
                let _ = self.errors.send(e.clone());
            }
        }
    }

    pub fn subscribe_lifecycle(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.lifecycle.subscribe()
    }

    pub fn subscribe_suggestions(&self) -> broadcast::Receiver<TradeDecision> {
        self.suggestions.subscribe()
    }

    pub fn subscribe_confirmations(&self) -> broadcast::Receiver<PendingDecision> {
        self.confirmations.subscribe()
    }

    pub fn subscribe_circuit_breakers(&self) -> broadcast::Receiver<CircuitBreakerEvent> {
        self.breakers.subscribe()
    }

    pub fn subscribe_orders(&self) -> broadcast::Receiver<OrderEvent> {
        self.orders.subscribe()
    }

    pub fn subscribe_blocked(&self) -> broadcast::Receiver<DecisionNotice> {
        self.blocked.subscribe()
    }

    pub fn subscribe_rejected(&self) -> broadcast::Receiver<DecisionNotice> {
        self.rejected.subscribe()
    }

    pub fn subscribe_errors(&self) -> broadcast::Receiver<ErrorEvent> {
        self.errors.subscribe()
    }
}
