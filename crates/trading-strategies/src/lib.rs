//! Trading strategy implementations.
//!
//! Five built-in strategies, an explicit registry table to construct them
//! from configuration, and the [`StrategyEngine`] that runs the active ones
//! and fuses their signals into a single ensemble signal.

mod breakout;
mod common;
mod engine;
mod mean_reversion;
mod momentum;
mod registry;
mod scalping;
mod trend_following;

pub use breakout::{BreakoutConfig, BreakoutStrategy, BREAKOUT_ID};
pub use engine::{SignalBatch, StrategyEngine, StrategyStatus, ENSEMBLE_ID};
pub use mean_reversion::{MeanReversionConfig, MeanReversionStrategy, MEAN_REVERSION_ID};
pub use momentum::{MomentumConfig, MomentumStrategy, MOMENTUM_ID};
pub use registry::{StrategyInfo, StrategyRegistry};
pub use scalping::{ScalpingConfig, ScalpingStrategy, SCALPING_ID};
pub use trend_following::{TrendFollowingConfig, TrendFollowingStrategy, TREND_FOLLOWING_ID};
