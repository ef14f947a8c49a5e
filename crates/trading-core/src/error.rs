//! Error types for the trading agent.

use rust_decimal::Decimal;
use thiserror::Error;

/// Top-level trading error.
#[derive(Error, Debug)]
pub enum TradingError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Strategy error: {0}")]
    Strategy(#[from] StrategyError),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Indicator error: {0}")]
    Indicator(#[from] IndicatorError),

    #[error("Risk management blocked order: {}", reasons.join("; "))]
    RiskBlocked { reasons: Vec<String> },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Malformed order requests, rejected before they reach a broker.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Order is missing an asset")]
    MissingAsset,

    #[error("Quantity must be positive, got {0}")]
    NonPositiveQuantity(Decimal),

    #[error("{order_type} order requires a positive {field}")]
    MissingPrice {
        order_type: String,
        field: &'static str,
    },

    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Strategy-specific errors.
#[derive(Error, Debug, Clone)]
pub enum StrategyError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Insufficient data: need {required} candles, have {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("Strategy not found: {0}")]
    NotFound(String),

    #[error("Strategy already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Strategy error: {0}")]
    Internal(String),
}

/// Broker-specific errors.
#[derive(Error, Debug, Clone)]
pub enum BrokerError {
    #[error("Not connected to {0}")]
    NotConnected(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Order rejected: {0}")]
    OrderRejected(String),

    #[error("Invalid order: {0}")]
    InvalidOrder(#[from] ValidationError),

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Decimal, available: Decimal },

    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("No market data for {0}")]
    NoMarketData(String),

    #[error("Rate limited: retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("Market closed")]
    MarketClosed,

    #[error("API error: {0}")]
    ApiError(String),
}

/// Indicator calculation errors.
#[derive(Error, Debug, Clone)]
pub enum IndicatorError {
    #[error("Insufficient data: need {required} points, have {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type alias for trading operations.
pub type TradingResult<T> = Result<T, TradingError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_risk_blocked_message_joins_reasons() {
        let err = TradingError::RiskBlocked {
            reasons: vec!["daily loss limit".into(), "breaker active".into()],
        };
        assert_eq!(
            err.to_string(),
            "Risk management blocked order: daily loss limit; breaker active"
        );
    }

    #[test]
    fn test_validation_converts_into_broker_error() {
        let err: BrokerError = ValidationError::NonPositiveQuantity(dec!(0)).into();
        assert!(matches!(err, BrokerError::InvalidOrder(_)));
    }
}
