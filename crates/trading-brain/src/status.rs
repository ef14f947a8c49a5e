//! Control-loop status and its transition table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{BrainError, BrainResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Idle,
    Analyzing,
    /// The last cycle ran to completion
    Active,
    /// Pacing budget or cooldown not yet available
    Cooldown,
    OutsideHours,
    Error,
}

impl AgentStatus {
    /// Legal moves:
    ///
    /// ```text
    /// idle -> analyzing
    /// analyzing -> active | cooldown | outside_hours | idle
    /// active | cooldown | outside_hours -> idle
    /// * -> error
    /// error -> idle
    /// ```
    pub fn can_transition_to(self, next: AgentStatus) -> bool {
        use AgentStatus::*;
        match (self, next) {
            (_, Error) => true,
            (Idle, Analyzing) => true,
            (Analyzing, Active | Cooldown | OutsideHours | Idle) => true,
            (Active | Cooldown | OutsideHours | Error, Idle) => true,
            _ => false,
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Analyzing => "analyzing",
            AgentStatus::Active => "active",
            AgentStatus::Cooldown => "cooldown",
            AgentStatus::OutsideHours => "outside_hours",
            AgentStatus::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// Current status plus when it was entered and the last error seen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusMachine {
    status: AgentStatus,
    since: DateTime<Utc>,
    last_error: Option<String>,
}

impl StatusMachine {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            status: AgentStatus::Idle,
            since: now,
            last_error: None,
        }
    }

    pub fn status(&self) -> AgentStatus {
        self.status
    }

    pub fn since(&self) -> DateTime<Utc> {
        self.since
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn transition(&mut self, next: AgentStatus, now: DateTime<Utc>) -> BrainResult<()> {
        if self.status == next {
            return Ok(());
        }
        if !self.status.can_transition_to(next) {
            return Err(BrainError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.since = now;
        Ok(())
    }

    /// Enter `error`, remembering why.
    pub fn fail(&mut self, reason: impl Into<String>, now: DateTime<Utc>) {
        self.last_error = Some(reason.into());
        self.status = AgentStatus::Error;
        self.since = now;
    }

    /// Return to `idle` from wherever the last cycle ended.
    pub fn settle(&mut self, now: DateTime<Utc>) {
        if self.status.can_transition_to(AgentStatus::Idle) {
            self.status = AgentStatus::Idle;
            self.since = now;
        }
    }

    /// Start a cycle: settle to `idle`, then enter `analyzing`.
    pub fn begin_cycle(&mut self, now: DateTime<Utc>) -> BrainResult<()> {
        self.settle(now);
        self.transition(AgentStatus::Analyzing, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        use AgentStatus::*;
        assert!(Idle.can_transition_to(Analyzing));
        assert!(!Idle.can_transition_to(Active));
        assert!(Analyzing.can_transition_to(Cooldown));
        assert!(Analyzing.can_transition_to(Idle));
        assert!(!Active.can_transition_to(Analyzing));
        assert!(OutsideHours.can_transition_to(Idle));
        assert!(Active.can_transition_to(Error));
        assert!(Error.can_transition_to(Idle));
        assert!(!Error.can_transition_to(Analyzing));
    }

    #[test]
    fn test_cycle_round_trip() {
        let now = Utc::now();
        let mut machine = StatusMachine::new(now);
        machine.begin_cycle(now).unwrap();
        machine.transition(AgentStatus::Active, now).unwrap();
        machine.begin_cycle(now).unwrap();
        assert_eq!(machine.status(), AgentStatus::Analyzing);

        let err = machine.transition(AgentStatus::Analyzing, now);
        assert!(err.is_ok(), "same-state transition is a no-op");
    }

    #[test]
    fn test_illegal_transition_is_reported() {
        let now = Utc::now();
        let mut machine = StatusMachine::new(now);
        let err = machine.transition(AgentStatus::Cooldown, now).unwrap_err();
        assert_eq!(
            err,
            BrainError::InvalidTransition {
                from: AgentStatus::Idle,
                to: AgentStatus::Cooldown
            }
        );
        assert_eq!(machine.status(), AgentStatus::Idle);
    }

    #[test]
    fn test_error_recovers_through_idle() {
        let now = Utc::now();
        let mut machine = StatusMachine::new(now);
        machine.begin_cycle(now).unwrap();
        machine.fail("quote timeout", now);
        assert_eq!(machine.status(), AgentStatus::Error);
        assert_eq!(machine.last_error(), Some("quote timeout"));

        machine.begin_cycle(now).unwrap();
        assert_eq!(machine.status(), AgentStatus::Analyzing);
    }
}
