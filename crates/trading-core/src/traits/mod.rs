//! Core traits for the trading agent.

mod broker;
mod indicator;
mod strategy;

pub use broker::Broker;
pub use indicator::{CandleIndicator, Indicator};
pub use strategy::{Strategy, StrategyInput, StrategyPerformance};
