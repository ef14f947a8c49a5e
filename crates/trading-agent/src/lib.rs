//! The trading agent service.
//!
//! [`TradingService`] wires the broker, strategy engine, risk manager,
//! pacing and decision brain into one control loop, keeps the observable
//! [`AITradingState`] and publishes typed events. The [`commands`] module
//! maps text commands onto its operations.

pub mod commands;
mod config;
mod error;
mod events;
mod service;
mod state;

pub use commands::{Command, CommandError, CommandOutput};
pub use config::AgentConfig;
pub use error::{AgentError, AgentResult};
pub use events::{
    AgentEvent, DecisionNotice, ErrorEvent, EventChannels, LifecycleEvent, OrderEvent,
};
pub use service::{
    AnalysisReport, AssetOutcome, CycleReport, CycleSkip, EmergencyStopReport, TradingService,
    EMERGENCY_PREFIX,
};
pub use state::{AITradingState, CycleStats, EventLog, LoggedEvent, PendingDecision};
