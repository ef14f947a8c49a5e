//! Technical indicators and the technical analyzer.
//!
//! This crate provides:
//! - Moving averages (SMA, EMA)
//! - Momentum indicators (RSI, MACD, Stochastic, rate of change)
//! - Volatility indicators (ATR, Bollinger Bands, standard deviation, realized volatility)
//! - Candlestick and chart pattern detection, support/resistance clustering
//! - `TechnicalAnalyzer`, which folds all of the above into a `TechnicalAnalysis`

pub mod analysis;
pub mod momentum;
pub mod moving_average;
pub mod patterns;
pub mod volatility;

pub use analysis::{AnalyzerConfig, TechnicalAnalyzer, MIN_CANDLES};
pub use momentum::{Macd, MacdOutput, RateOfChange, Rsi, Stochastic, StochasticOutput};
pub use moving_average::{Ema, Sma};
pub use patterns::{detect_candlestick_patterns, detect_chart_patterns, support_resistance};
pub use volatility::{realized_volatility, Atr, BollingerBands, BollingerOutput, StdDev};
