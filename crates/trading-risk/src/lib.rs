//! Risk management for trading.
//!
//! Five-layer trade assessment, Kelly position sizing, stop/target
//! placement, circuit breakers and the rolling P&L and return history
//! they depend on.

mod circuit_breaker;
mod correlation;
mod error;
mod limits;
mod performance;
mod pnl;
mod position_sizer;
mod risk_manager;
mod stop_loss;

pub use circuit_breaker::{BreakerKind, CircuitBreaker, CircuitBreakerEvent, CircuitBreakers};
pub use correlation::{largest_cluster, MarketClassifier, TableClassifier, TagClassifier};
pub use error::{RiskError, RiskResult};
pub use limits::{BreakerConfig, RiskConfig};
pub use performance::{PerformanceStats, PerformanceTracker, RETURN_HISTORY};
pub use pnl::PnlPeriods;
pub use position_sizer::{
    kelly_fraction, round_quantity, PositionSizer, SizingResult, MIN_KELLY_TRADES,
};
pub use risk_manager::{PnlSummary, RiskManager};
pub use stop_loss::{StopLevel, StopLossCalculator, StopMethod, MIN_STOP_DISTANCE};
