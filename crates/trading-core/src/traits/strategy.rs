//! Strategy trait definitions.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::VecDeque;

use crate::error::StrategyError;
use crate::types::{Asset, Candle, Position, Quote, StrategySignal, TechnicalAnalysis};

/// Outcomes kept per strategy for the Sharpe estimate.
const MAX_OUTCOMES: usize = 500;
/// Profit factor reported when there are wins and no losses.
const MAX_PROFIT_FACTOR: f64 = 10.0;

/// Realized track record of one strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyPerformance {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    /// Per-trade Sharpe (mean over std-dev of outcomes), not annualized
    pub sharpe_ratio: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub total_pnl: f64,
    #[serde(skip)]
    outcomes: VecDeque<f64>,
    #[serde(skip)]
    gross_profit: f64,
    #[serde(skip)]
    gross_loss: f64,
}

impl Default for StrategyPerformance {
    /// A fresh strategy is treated as a coin flip.
    fn default() -> Self {
        Self {
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            win_rate: 0.5,
            profit_factor: 1.0,
            sharpe_ratio: 0.0,
            avg_win: 0.0,
            avg_loss: 0.0,
            total_pnl: 0.0,
            outcomes: VecDeque::new(),
            gross_profit: 0.0,
            gross_loss: 0.0,
        }
    }
}

impl StrategyPerformance {
    /// Record a closed trade and recompute the statistics.
    pub fn record(&mut self, pnl: f64) {
        self.total_trades += 1;
        self.total_pnl += pnl;
        if pnl > 0.0 {
            self.winning_trades += 1;
            self.gross_profit += pnl;
        } else if pnl < 0.0 {
            self.losing_trades += 1;
            self.gross_loss += -pnl;
        }

        if self.outcomes.len() == MAX_OUTCOMES {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(pnl);

        self.win_rate = self.winning_trades as f64 / self.total_trades as f64;
        self.avg_win = if self.winning_trades > 0 {
            self.gross_profit / self.winning_trades as f64
        } else {
            0.0
        };
        self.avg_loss = if self.losing_trades > 0 {
            self.gross_loss / self.losing_trades as f64
        } else {
            0.0
        };
        self.profit_factor = if self.gross_loss > 0.0 {
            (self.gross_profit / self.gross_loss).min(MAX_PROFIT_FACTOR)
        } else if self.gross_profit > 0.0 {
            MAX_PROFIT_FACTOR
        } else {
            1.0
        };
        self.sharpe_ratio = if self.outcomes.len() >= 2 {
            let mean = self.outcomes.iter().mean();
            let std_dev = self.outcomes.iter().std_dev();
            if std_dev > 0.0 && std_dev.is_finite() {
                mean / std_dev
            } else {
                0.0
            }
        } else {
            0.0
        };
    }

    /// Fusion weight: 0.4 normalized profit factor + 0.3 win rate + 0.3 normalized Sharpe.
    pub fn weight(&self) -> f64 {
        let normalized_pf = (self.profit_factor / 3.0).clamp(0.0, 1.0);
        let normalized_sharpe = ((self.sharpe_ratio + 1.0) / 4.0).clamp(0.0, 1.0);
        0.4 * normalized_pf + 0.3 * self.win_rate + 0.3 * normalized_sharpe
    }
}

/// Everything a strategy may look at for one asset in one cycle.
#[derive(Debug, Clone, Copy)]
pub struct StrategyInput<'a> {
    pub asset: &'a Asset,
    pub candles: &'a [Candle],
    pub analysis: &'a TechnicalAnalysis,
    pub quote: Option<&'a Quote>,
    pub position: Option<&'a Position>,
}

impl<'a> StrategyInput<'a> {
    /// Last traded price, preferring the live quote over the last close.
    pub fn price(&self) -> f64 {
        use num_traits::ToPrimitive;

        self.quote
            .and_then(|q| q.last.to_f64())
            .filter(|p| *p > 0.0)
            .unwrap_or(self.analysis.price)
    }
}

/// A pluggable signal generator.
///
/// Strategies are registered in an explicit table and never mutate shared
/// state while analyzing; only `record_outcome` changes them.
pub trait Strategy: Send + Sync {
    /// Stable identifier used in the registry and in signals.
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Candles needed before `analyze` can say anything.
    fn min_candles(&self) -> usize;

    /// Produce a signal for the asset, or `None` when there is no setup.
    fn analyze(&self, input: &StrategyInput<'_>) -> Result<Option<StrategySignal>, StrategyError>;

    /// Current parameters as JSON.
    fn parameters(&self) -> serde_json::Value;

    fn performance(&self) -> &StrategyPerformance;

    /// Feed a realized trade outcome back into the track record.
    fn record_outcome(&mut self, pnl: f64);

    fn check_data(&self, input: &StrategyInput<'_>) -> Result<(), StrategyError> {
        if input.candles.len() < self.min_candles() {
            return Err(StrategyError::InsufficientData {
                required: self.min_candles(),
                available: input.candles.len(),
            });
        }
        Ok(())
    }
}
