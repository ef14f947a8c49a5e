//! Core data types for the trading agent.

mod analysis;
mod asset;
mod decision;
mod ohlcv;
mod order;
mod position;
mod price;
mod signal;
mod timeframe;

pub use analysis::{
    IndicatorSignal, IndicatorSnapshot, PatternKind, Recommendation, TechnicalAnalysis,
    TrendDirection, TrendInfo,
};
pub use asset::{Asset, BookLevel, ConnectionStatus, OrderBook, Quote};
pub use decision::{
    AutonomyLevel, RiskAssessment, RiskLevel, SelfQuestionResult, TradeAction, TradeDecision,
};
pub use ohlcv::{Candle, CandleSeries};
pub use order::{
    Fill, ModifyOrderRequest, Order, OrderRequest, OrderStatus, OrderType, Side, TimeInForce,
};
pub use position::{Portfolio, Position};
pub use price::{price_scale, round_away_from, round_price, PRICE_DP};
pub use signal::{SignalAction, StrategySignal};
pub use timeframe::Timeframe;
