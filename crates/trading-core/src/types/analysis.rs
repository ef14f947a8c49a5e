//! Technical analysis snapshot derived from candles.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::SignalAction;

/// Direction of the prevailing trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    Sideways,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendInfo {
    pub direction: TrendDirection,
    /// Normalized strength in [0, 1]
    pub strength: f64,
    /// Consecutive candles closing on the trend side of the SMA20
    pub duration: usize,
}

/// Latest values of every computed indicator.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub rsi: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub macd_histogram: f64,
    pub sma_20: f64,
    pub sma_50: f64,
    pub ema_12: f64,
    pub ema_26: f64,
    pub atr: f64,
    pub bollinger_upper: f64,
    pub bollinger_middle: f64,
    pub bollinger_lower: f64,
    pub bollinger_percent_b: f64,
    pub stochastic_k: f64,
    pub stochastic_d: f64,
    /// Standard deviation of close-to-close returns
    pub volatility: f64,
    /// Last volume over the 20-candle average volume
    pub volume_ratio: f64,
}

/// A vote cast by a single indicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSignal {
    pub indicator: String,
    pub action: SignalAction,
    /// In [0, 1]
    pub strength: f64,
    pub description: String,
}

/// Recognized candlestick and chart patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Doji,
    Hammer,
    ShootingStar,
    BullishEngulfing,
    BearishEngulfing,
    MorningStar,
    EveningStar,
    DoubleTop,
    DoubleBottom,
}

impl PatternKind {
    /// Directional bias the pattern implies.
    pub fn bias(&self) -> SignalAction {
        match self {
            PatternKind::Hammer
            | PatternKind::BullishEngulfing
            | PatternKind::MorningStar
            | PatternKind::DoubleBottom => SignalAction::Buy,
            PatternKind::ShootingStar
            | PatternKind::BearishEngulfing
            | PatternKind::EveningStar
            | PatternKind::DoubleTop => SignalAction::Sell,
            PatternKind::Doji => SignalAction::Hold,
        }
    }
}

/// Net recommendation of the analysis itself.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub action: SignalAction,
    /// In [0, 1]
    pub strength: f64,
}

/// Immutable per-cycle analysis of one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalAnalysis {
    pub asset_id: String,
    /// Last close
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    pub trend: TrendInfo,
    pub indicators: IndicatorSnapshot,
    /// Support levels below price, nearest first
    pub support: Vec<f64>,
    /// Resistance levels above price, nearest first
    pub resistance: Vec<f64>,
    pub signals: Vec<IndicatorSignal>,
    pub patterns: Vec<PatternKind>,
    pub recommendation: Recommendation,
}

impl TechnicalAnalysis {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.timestamp
    }

    pub fn nearest_support(&self) -> Option<f64> {
        self.support.first().copied()
    }

    pub fn nearest_resistance(&self) -> Option<f64> {
        self.resistance.first().copied()
    }

    pub fn has_pattern(&self, kind: PatternKind) -> bool {
        self.patterns.contains(&kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_bias() {
        assert_eq!(PatternKind::Hammer.bias(), SignalAction::Buy);
        assert_eq!(PatternKind::DoubleTop.bias(), SignalAction::Sell);
        assert_eq!(PatternKind::Doji.bias(), SignalAction::Hold);
    }
}
