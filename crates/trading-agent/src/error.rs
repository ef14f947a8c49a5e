use thiserror::Error;
use trading_brain::BrainError;
use trading_core::{BrokerError, IndicatorError, StrategyError, ValidationError};
use trading_pacing::PacingError;
use trading_risk::RiskError;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Invalid agent configuration: {0}")]
    InvalidConfig(String),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Invalid order: {0}")]
    Validation(#[from] ValidationError),

    #[error("Analysis failed: {0}")]
    Indicator(#[from] IndicatorError),

    #[error("Strategy error: {0}")]
    Strategy(#[from] StrategyError),

    #[error("Risk error: {0}")]
    Risk(#[from] RiskError),

    #[error("Decision error: {0}")]
    Brain(#[from] BrainError),

    #[error("Pacing error: {0}")]
    Pacing(#[from] PacingError),

    #[error("Risk management blocked trade: {}", reasons.join("; "))]
    RiskBlocked { reasons: Vec<String> },

    #[error("No pending decision {0}")]
    DecisionNotFound(Uuid),

    #[error("Pending decision {0} expired")]
    DecisionExpired(Uuid),

    #[error("Decision for {0} has nothing to execute")]
    NotActionable(String),
}

pub type AgentResult<T> = Result<T, AgentError>;
