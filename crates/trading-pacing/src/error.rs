use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PacingError {
    #[error("Invalid pacing configuration: {0}")]
    InvalidConfig(String),
}
