//! OHLCV candle types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::Timeframe;

/// Compact OHLCV candle.
/// Uses f64 for fast indicator calculations; order math uses Decimal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Candle {
    /// Unix timestamp in milliseconds (candle open)
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Typical price (HLC average).
    #[inline]
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// High minus low.
    #[inline]
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// Absolute open/close difference.
    #[inline]
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    /// Wick above the body.
    #[inline]
    pub fn upper_shadow(&self) -> f64 {
        self.high - self.open.max(self.close)
    }

    /// Wick below the body.
    #[inline]
    pub fn lower_shadow(&self) -> f64 {
        self.open.min(self.close) - self.low
    }

    #[inline]
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    #[inline]
    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    /// The candle open time, falling back to the epoch on out-of-range values.
    pub fn datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.timestamp).unwrap_or_default()
    }

    /// True range against the previous close (used for ATR).
    pub fn true_range(&self, prev_close: Option<f64>) -> f64 {
        match prev_close {
            Some(pc) => {
                let hl = self.high - self.low;
                let hc = (self.high - pc).abs();
                let lc = (self.low - pc).abs();
                hl.max(hc).max(lc)
            }
            None => self.high - self.low,
        }
    }
}

/// Time-ordered candles for one asset, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandleSeries {
    pub asset_id: String,
    pub timeframe: Timeframe,
    candles: VecDeque<Candle>,
    /// Maximum capacity (0 = unlimited)
    capacity: usize,
}

impl CandleSeries {
    pub fn new(asset_id: impl Into<String>, timeframe: Timeframe) -> Self {
        Self::with_capacity(asset_id, timeframe, 0)
    }

    /// When capacity is reached, the oldest candle is evicted.
    pub fn with_capacity(
        asset_id: impl Into<String>,
        timeframe: Timeframe,
        capacity: usize,
    ) -> Self {
        Self {
            asset_id: asset_id.into(),
            timeframe,
            candles: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Build a series from candles ordered oldest first.
    pub fn from_candles(
        asset_id: impl Into<String>,
        timeframe: Timeframe,
        candles: Vec<Candle>,
    ) -> Self {
        Self {
            asset_id: asset_id.into(),
            timeframe,
            candles: candles.into(),
            capacity: 0,
        }
    }

    pub fn push(&mut self, candle: Candle) {
        if self.capacity > 0 && self.candles.len() >= self.capacity {
            self.candles.pop_front();
        }
        self.candles.push_back(candle);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.candles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.back()
    }

    /// Get a candle by index (0 = oldest).
    pub fn get(&self, index: usize) -> Option<&Candle> {
        self.candles.get(index)
    }

    /// The last `n` candles, oldest first.
    pub fn last_n(&self, n: usize) -> Vec<Candle> {
        let start = self.candles.len().saturating_sub(n);
        self.candles.iter().skip(start).copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candle> {
        self.candles.iter()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    pub fn highs(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.high).collect()
    }

    pub fn lows(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.low).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.volume).collect()
    }

    /// Close-to-close simple returns.
    pub fn returns(&self) -> Vec<f64> {
        let closes = self.closes();
        closes
            .windows(2)
            .filter(|w| w[0] != 0.0)
            .map(|w| (w[1] - w[0]) / w[0])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candle_shape() {
        let candle = Candle::new(1000, 100.0, 110.0, 95.0, 105.0, 1_000_000.0);

        assert!((candle.typical_price() - 103.333333).abs() < 0.001);
        assert!((candle.range() - 15.0).abs() < 1e-9);
        assert!((candle.body() - 5.0).abs() < 1e-9);
        assert!((candle.upper_shadow() - 5.0).abs() < 1e-9);
        assert!((candle.lower_shadow() - 5.0).abs() < 1e-9);
        assert!(candle.is_bullish());
    }

    #[test]
    fn test_true_range_with_gap() {
        let candle = Candle::new(1000, 100.0, 110.0, 95.0, 105.0, 1_000_000.0);
        assert!((candle.true_range(None) - 15.0).abs() < 1e-9);
        assert!((candle.true_range(Some(90.0)) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_series_capacity_evicts_oldest() {
        let mut series = CandleSeries::with_capacity("AAPL", Timeframe::Daily, 3);
        for i in 0..4 {
            let p = 100.0 + i as f64;
            series.push(Candle::new(i, p, p + 1.0, p - 1.0, p + 0.5, 1000.0));
        }
        assert_eq!(series.len(), 3);
        assert_eq!(series.get(0).unwrap().timestamp, 1);
    }

    #[test]
    fn test_series_returns() {
        let series = CandleSeries::from_candles(
            "AAPL",
            Timeframe::Daily,
            vec![
                Candle::new(1, 100.0, 100.0, 100.0, 100.0, 1.0),
                Candle::new(2, 100.0, 110.0, 100.0, 110.0, 1.0),
            ],
        );
        let returns = series.returns();
        assert_eq!(returns.len(), 1);
        assert!((returns[0] - 0.1).abs() < 1e-12);
    }
}
