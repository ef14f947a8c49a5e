use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RiskError {
    #[error("Invalid risk configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input for {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },
}

pub type RiskResult<T> = Result<T, RiskError>;
