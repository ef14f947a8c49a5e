//! Core types and traits for the trading agent.
//!
//! This crate provides the foundational building blocks including:
//! - Reference and market data (Asset, Quote, OrderBook, Candle)
//! - Order, position and account types exchanged with brokers
//! - Derived analysis, strategy signals, risk assessments and trade decisions
//! - Core traits for strategies, indicators and brokers

pub mod error;
pub mod traits;
pub mod types;

pub use error::{
    BrokerError, IndicatorError, StrategyError, TradingError, TradingResult, ValidationError,
};
pub use traits::*;
pub use types::*;
