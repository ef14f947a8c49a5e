use thiserror::Error;

use crate::status::AgentStatus;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BrainError {
    #[error("Invalid brain configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid status transition {from} -> {to}")]
    InvalidTransition { from: AgentStatus, to: AgentStatus },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type BrainResult<T> = Result<T, BrainError>;
