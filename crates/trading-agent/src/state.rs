//! Mutable service state and the snapshot handed to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use trading_brain::{AgentStatus, StatusMachine};
use trading_core::{AutonomyLevel, Position, TradeDecision};
use trading_risk::PnlSummary;
use uuid::Uuid;

use crate::error::{AgentError, AgentResult};
use crate::events::AgentEvent;

/// A decision waiting for a human to confirm or reject it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingDecision {
    pub id: Uuid,
    pub decision: TradeDecision,
    pub queued_at: DateTime<Utc>,
}

impl PendingDecision {
    pub fn new(decision: TradeDecision, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            decision,
            queued_at: now,
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.decision.expires_at
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.decision.is_expired(now)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedEvent {
    pub seq: u64,
    pub at: DateTime<Utc>,
    pub event: AgentEvent,
}

/// Ring buffer of the most recent events.
#[derive(Debug)]
pub struct EventLog {
    capacity: usize,
    next_seq: u64,
    entries: VecDeque<LoggedEvent>,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            next_seq: 0,
            entries: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    pub fn push(&mut self, event: AgentEvent, now: DateTime<Utc>) -> &LoggedEvent {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.next_seq += 1;
        self.entries.push_back(LoggedEvent {
            seq: self.next_seq,
            at: now,
            event,
        });
        &self.entries[self.entries.len() - 1]
    }

    /// The last `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<LoggedEvent> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleStats {
    pub cycles_run: u64,
    pub cycles_skipped: u64,
    pub suggestions: u64,
    pub orders_placed: u64,
    pub decisions_blocked: u64,
    pub decisions_rejected: u64,
    pub errors: u64,
}

/// State owned by the service and mutated only under its lock.
#[derive(Debug)]
pub struct ServiceState {
    active: bool,
    status: StatusMachine,
    autonomy: AutonomyLevel,
    pending: Vec<PendingDecision>,
    log: EventLog,
    pub stats: CycleStats,
    pub last_cycle_at: Option<DateTime<Utc>>,
}

impl ServiceState {
    pub fn new(autonomy: AutonomyLevel, log_capacity: usize, now: DateTime<Utc>) -> Self {
        Self {
            active: false,
            status: StatusMachine::new(now),
            autonomy,
            pending: Vec::new(),
            log: EventLog::new(log_capacity),
            stats: CycleStats::default(),
            last_cycle_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Returns the previous value.
    pub fn set_active(&mut self, active: bool) -> bool {
        std::mem::replace(&mut self.active, active)
    }

    pub fn status(&self) -> &StatusMachine {
        &self.status
    }

    pub fn status_mut(&mut self) -> &mut StatusMachine {
        &mut self.status
    }

    pub fn autonomy(&self) -> AutonomyLevel {
        self.autonomy
    }

    /// Returns the previous level.
    pub fn set_autonomy(&mut self, level: AutonomyLevel) -> AutonomyLevel {
        std::mem::replace(&mut self.autonomy, level)
    }

    pub fn pending(&self) -> &[PendingDecision] {
        &self.pending
    }

    pub fn enqueue(&mut self, decision: TradeDecision, now: DateTime<Utc>) -> PendingDecision {
        let pending = PendingDecision::new(decision, now);
        self.pending.push(pending.clone());
        pending
    }

    /// Remove a pending decision for execution. An expired one is removed
    /// and reported as an error.
    pub fn take_pending(&mut self, id: Uuid, now: DateTime<Utc>) -> AgentResult<PendingDecision> {
        let index = self
            .pending
            .iter()
            .position(|p| p.id == id)
            .ok_or(AgentError::DecisionNotFound(id))?;
        let pending = self.pending.remove(index);
        if pending.is_expired(now) {
            return Err(AgentError::DecisionExpired(id));
        }
        Ok(pending)
    }

    pub fn remove_pending(&mut self, id: Uuid) -> AgentResult<PendingDecision> {
        let index = self
            .pending
            .iter()
            .position(|p| p.id == id)
            .ok_or(AgentError::DecisionNotFound(id))?;
        Ok(self.pending.remove(index))
    }

    /// Drop every pending decision past its expiry.
    pub fn expire_pending(&mut self, now: DateTime<Utc>) -> Vec<PendingDecision> {
        let (expired, live): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|p| p.is_expired(now));
        self.pending = live;
        expired
    }

    pub fn record(&mut self, event: AgentEvent, now: DateTime<Utc>) {
        if matches!(event, AgentEvent::Error(_)) {
            self.stats.errors += 1;
        }
        self.log.push(event, now);
    }

    pub fn recent_events(&self, n: usize) -> Vec<LoggedEvent> {
        self.log.recent(n)
    }

    pub fn event_count(&self) -> usize {
        self.log.len()
    }
}

/// Read-only view of the agent for status queries.
#[derive(Debug, Clone, Serialize)]
pub struct AITradingState {
    pub is_active: bool,
    pub status: AgentStatus,
    pub status_since: DateTime<Utc>,
    pub last_error: Option<String>,
    pub autonomy_level: AutonomyLevel,
    pub pending_decisions: Vec<PendingDecision>,
    pub active_positions: Vec<Position>,
    pub recent_events: Vec<LoggedEvent>,
    pub pnl: PnlSummary,
    pub stats: CycleStats,
    pub last_cycle_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ErrorEvent, LifecycleEvent};
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use trading_core::{Side, TradeAction};

    fn decision() -> TradeDecision {
        TradeDecision::new("AAPL", TradeAction::Buy, Some(Side::Buy), dec!(10), dec!(175))
    }

    #[test]
    fn test_event_log_is_bounded() {
        let mut log = EventLog::new(3);
        let now = Utc::now();
        for _ in 0..5 {
            log.push(AgentEvent::Lifecycle(LifecycleEvent::Started), now);
        }
        assert_eq!(log.len(), 3);
        let recent = log.recent(10);
        assert_eq!(recent.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![3, 4, 5]);
        assert_eq!(log.recent(1)[0].seq, 5);
    }

    #[test]
    fn test_pending_round_trip() {
        let now = Utc::now();
        let mut state = ServiceState::new(AutonomyLevel::SemiAuto, 10, now);
        let pending = state.enqueue(decision(), now);
        assert_eq!(state.pending().len(), 1);

        let taken = state.take_pending(pending.id, now).unwrap();
        assert_eq!(taken.decision.asset_id, "AAPL");
        assert!(state.pending().is_empty());
        assert!(matches!(
            state.take_pending(pending.id, now),
            Err(AgentError::DecisionNotFound(_))
        ));
    }

    #[test]
    fn test_expired_pending_cannot_be_taken() {
        let now = Utc::now();
        let mut state = ServiceState::new(AutonomyLevel::SemiAuto, 10, now);
        let pending = state.enqueue(decision(), now);
        let later = pending.expires_at() + Duration::seconds(1);

        assert!(matches!(
            state.take_pending(pending.id, later),
            Err(AgentError::DecisionExpired(_))
        ));
        assert!(state.pending().is_empty());
    }

    #[test]
    fn test_expire_pending_keeps_live_entries() {
        let now = Utc::now();
        let mut state = ServiceState::new(AutonomyLevel::SemiAuto, 10, now);
        let mut stale = decision();
        stale.expires_at = now - Duration::minutes(1);
        state.enqueue(stale, now - Duration::minutes(6));
        let live = state.enqueue(decision(), now);

        let expired = state.expire_pending(now);
        assert_eq!(expired.len(), 1);
        assert_eq!(state.pending().len(), 1);
        assert_eq!(state.pending()[0].id, live.id);
    }

    #[test]
    fn test_record_counts_errors() {
        let now = Utc::now();
        let mut state = ServiceState::new(AutonomyLevel::Advisory, 10, now);
        state.record(
            AgentEvent::Error(ErrorEvent {
                context: "AAPL".into(),
                message: "timeout".into(),
            }),
            now,
        );
        state.record(AgentEvent::Lifecycle(LifecycleEvent::Started), now);
        assert_eq!(state.stats.errors, 1);
        assert_eq!(state.event_count(), 2);
    }
}
