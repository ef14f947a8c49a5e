//! Per-trade return history.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::VecDeque;

/// Returns kept for the rolling statistics.
pub const RETURN_HISTORY: usize = 500;

/// Snapshot of the rolling trade statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub trades: usize,
    pub win_rate: f64,
    /// Mean winning return (fraction)
    pub avg_win: f64,
    /// Mean losing return as a positive fraction
    pub avg_loss: f64,
    pub profit_factor: f64,
    /// Per-trade Sharpe, not annualized
    pub sharpe_ratio: f64,
    pub consecutive_losses: usize,
}

/// Fixed-capacity ring buffer of per-trade returns; the oldest is evicted.
#[derive(Debug, Clone, Default)]
pub struct PerformanceTracker {
    returns: VecDeque<f64>,
    consecutive_losses: usize,
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, trade_return: f64) {
        if !trade_return.is_finite() {
            return;
        }
        if self.returns.len() == RETURN_HISTORY {
            self.returns.pop_front();
        }
        self.returns.push_back(trade_return);
        if trade_return < 0.0 {
            self.consecutive_losses += 1;
        } else {
            self.consecutive_losses = 0;
        }
    }

    pub fn len(&self) -> usize {
        self.returns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.returns.is_empty()
    }

    pub fn consecutive_losses(&self) -> usize {
        self.consecutive_losses
    }

    pub fn win_rate(&self) -> f64 {
        if self.returns.is_empty() {
            return 0.0;
        }
        self.returns.iter().filter(|r| **r > 0.0).count() as f64 / self.returns.len() as f64
    }

    pub fn avg_win(&self) -> f64 {
        let wins: Vec<f64> = self.returns.iter().copied().filter(|r| *r > 0.0).collect();
        if wins.is_empty() {
            0.0
        } else {
            wins.mean()
        }
    }

    pub fn avg_loss(&self) -> f64 {
        let losses: Vec<f64> = self.returns.iter().filter(|r| **r < 0.0).map(|r| -r).collect();
        if losses.is_empty() {
            0.0
        } else {
            losses.mean()
        }
    }

    pub fn profit_factor(&self) -> f64 {
        let gross_profit: f64 = self.returns.iter().filter(|r| **r > 0.0).sum();
        let gross_loss: f64 = self.returns.iter().filter(|r| **r < 0.0).map(|r| -r).sum();
        if gross_loss > 0.0 {
            gross_profit / gross_loss
        } else if gross_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        }
    }

    pub fn sharpe_ratio(&self) -> f64 {
        if self.returns.len() < 2 {
            return 0.0;
        }
        let mean = self.returns.iter().mean();
        let std_dev = self.returns.iter().std_dev();
        if std_dev > 0.0 && std_dev.is_finite() {
            mean / std_dev
        } else {
            0.0
        }
    }

    pub fn stats(&self) -> PerformanceStats {
        PerformanceStats {
            trades: self.returns.len(),
            win_rate: self.win_rate(),
            avg_win: self.avg_win(),
            avg_loss: self.avg_loss(),
            profit_factor: self.profit_factor(),
            sharpe_ratio: self.sharpe_ratio(),
            consecutive_losses: self.consecutive_losses,
        }
    }
}
