//! Momentum indicators.

use serde::{Deserialize, Serialize};
use trading_core::error::IndicatorError;
use trading_core::traits::{CandleIndicator, Indicator};
use trading_core::types::Candle;

use crate::moving_average::{check_period, ema_series};

/// Wilder smoothing: avg = (prev * (n - 1) + value) / n, seeded with an SMA.
pub(crate) fn wilder_smooth(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return vec![];
    }

    let n = period as f64;
    let mut result = Vec::with_capacity(values.len() - period + 1);
    let mut avg = values[..period].iter().sum::<f64>() / n;
    result.push(avg);

    for &value in &values[period..] {
        avg = (avg * (n - 1.0) + value) / n;
        result.push(avg);
    }
    result
}

/// Relative Strength Index (Wilder).
#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
}

impl Rsi {
    pub fn new(period: usize) -> Result<Self, IndicatorError> {
        check_period("RSI", period, 2)?;
        Ok(Self { period })
    }
}

impl Indicator for Rsi {
    type Output = f64;

    fn calculate(&self, data: &[f64]) -> Vec<f64> {
        if data.len() <= self.period {
            return vec![];
        }

        let (gains, losses): (Vec<f64>, Vec<f64>) = data
            .windows(2)
            .map(|w| {
                let change = w[1] - w[0];
                (change.max(0.0), (-change).max(0.0))
            })
            .unzip();

        let avg_gains = wilder_smooth(&gains, self.period);
        let avg_losses = wilder_smooth(&losses, self.period);

        avg_gains
            .iter()
            .zip(avg_losses.iter())
            .map(|(&gain, &loss)| {
                if loss == 0.0 {
                    if gain == 0.0 {
                        50.0
                    } else {
                        100.0
                    }
                } else {
                    100.0 - (100.0 / (1.0 + gain / loss))
                }
            })
            .collect()
    }

    fn period(&self) -> usize {
        self.period + 1
    }

    fn name(&self) -> &str {
        "RSI"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacdOutput {
    /// Fast EMA minus slow EMA
    pub macd: f64,
    /// EMA of the MACD line
    pub signal: f64,
    pub histogram: f64,
}

/// MACD (12/26/9 by default).
#[derive(Debug, Clone)]
pub struct Macd {
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
}

impl Macd {
    pub fn with_periods(fast: usize, slow: usize, signal: usize) -> Result<Self, IndicatorError> {
        check_period("MACD fast", fast, 1)?;
        check_period("MACD signal", signal, 1)?;
        if fast >= slow {
            return Err(IndicatorError::InvalidParameter(format!(
                "MACD fast period {} must be below slow period {}",
                fast, slow
            )));
        }
        Ok(Self {
            fast_period: fast,
            slow_period: slow,
            signal_period: signal,
        })
    }
}

impl Default for Macd {
    fn default() -> Self {
        Self {
            fast_period: 12,
            slow_period: 26,
            signal_period: 9,
        }
    }
}

impl Indicator for Macd {
    type Output = MacdOutput;

    fn calculate(&self, data: &[f64]) -> Vec<MacdOutput> {
        if data.len() < self.period() {
            return vec![];
        }

        let fast = ema_series(data, self.fast_period);
        let slow = ema_series(data, self.slow_period);
        let fast = &fast[self.slow_period - self.fast_period..];

        let macd_line: Vec<f64> = fast.iter().zip(slow.iter()).map(|(f, s)| f - s).collect();
        let signal_line = ema_series(&macd_line, self.signal_period);

        macd_line[self.signal_period - 1..]
            .iter()
            .zip(signal_line.iter())
            .map(|(&macd, &signal)| MacdOutput {
                macd,
                signal,
                histogram: macd - signal,
            })
            .collect()
    }

    fn period(&self) -> usize {
        self.slow_period + self.signal_period - 1
    }

    fn name(&self) -> &str {
        "MACD"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StochasticOutput {
    pub k: f64,
    /// SMA of %K
    pub d: f64,
}

/// Stochastic oscillator (14/3 by default).
#[derive(Debug, Clone)]
pub struct Stochastic {
    k_period: usize,
    d_period: usize,
}

impl Stochastic {
    pub fn with_periods(k_period: usize, d_period: usize) -> Result<Self, IndicatorError> {
        check_period("Stochastic %K", k_period, 1)?;
        check_period("Stochastic %D", d_period, 1)?;
        Ok(Self { k_period, d_period })
    }
}

impl Default for Stochastic {
    fn default() -> Self {
        Self {
            k_period: 14,
            d_period: 3,
        }
    }
}

impl CandleIndicator for Stochastic {
    type Output = StochasticOutput;

    fn calculate(&self, candles: &[Candle]) -> Vec<StochasticOutput> {
        if candles.len() < self.period() {
            return vec![];
        }

        let k_values: Vec<f64> = candles
            .windows(self.k_period)
            .map(|window| {
                let highest = window.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
                let lowest = window.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
                let close = window[window.len() - 1].close;
                let range = highest - lowest;
                if range == 0.0 {
                    50.0
                } else {
                    (close - lowest) / range * 100.0
                }
            })
            .collect();

        k_values
            .windows(self.d_period)
            .map(|w| StochasticOutput {
                k: w[w.len() - 1],
                d: w.iter().sum::<f64>() / self.d_period as f64,
            })
            .collect()
    }

    fn period(&self) -> usize {
        self.k_period + self.d_period - 1
    }

    fn name(&self) -> &str {
        "Stochastic"
    }
}

/// Rate of change over `period` values, as a fraction.
#[derive(Debug, Clone)]
pub struct RateOfChange {
    period: usize,
}

impl RateOfChange {
    pub fn new(period: usize) -> Result<Self, IndicatorError> {
        check_period("ROC", period, 1)?;
        Ok(Self { period })
    }
}

impl Indicator for RateOfChange {
    type Output = f64;

    fn calculate(&self, data: &[f64]) -> Vec<f64> {
        if data.len() <= self.period {
            return vec![];
        }
        data.windows(self.period + 1)
            .map(|w| {
                let base = w[0];
                if base == 0.0 {
                    0.0
                } else {
                    (w[self.period] - base) / base
                }
            })
            .collect()
    }

    fn period(&self) -> usize {
        self.period + 1
    }

    fn name(&self) -> &str {
        "ROC"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rsi_bounds() {
        let rsi = Rsi::new(14).unwrap();
        let data: Vec<f64> = (0..30).map(|i| 100.0 + (i as f64 * 0.5).sin() * 5.0).collect();

        let result = rsi.calculate(&data);
        assert!(!result.is_empty());
        assert!(result.iter().all(|v| (0.0..=100.0).contains(v)));
    }

    #[test]
    fn test_rsi_extremes() {
        let rsi = Rsi::new(5).unwrap();
        let up = rsi.latest(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]).unwrap();
        assert!((up - 100.0).abs() < 1e-10);

        let down = rsi.latest(&[7.0, 6.0, 5.0, 4.0, 3.0, 2.0, 1.0]).unwrap();
        assert!(down.abs() < 1e-10);

        let flat = rsi.latest(&[5.0; 8]).unwrap();
        assert!((flat - 50.0).abs() < 1e-10);
    }

    #[test]
    fn test_macd_uptrend_positive() {
        let macd = Macd::default();
        let data: Vec<f64> = (0..50).map(|i| 100.0 + i as f64).collect();
        let result = macd.calculate(&data);

        assert_eq!(result.len(), 50 - macd.period() + 1);
        assert!(result.last().unwrap().macd > 0.0);
    }

    #[test]
    fn test_macd_rejects_inverted_periods() {
        assert!(Macd::with_periods(26, 12, 9).is_err());
        assert!(Macd::with_periods(5, 10, 3).is_ok());
    }

    #[test]
    fn test_stochastic_close_at_high() {
        let stoch = Stochastic::with_periods(5, 3).unwrap();
        let candles: Vec<Candle> = (0..8)
            .map(|i| {
                let high = 10.0 + i as f64;
                Candle::new(i, high - 2.0, high, high - 5.0, high, 1000.0)
            })
            .collect();

        let last = stoch.latest(&candles).unwrap();
        assert!((last.k - 100.0).abs() < 1e-10);
        assert!((0.0..=100.0).contains(&last.d));
    }

    #[test]
    fn test_rate_of_change() {
        let roc = RateOfChange::new(2).unwrap();
        let result = roc.calculate(&[100.0, 105.0, 110.0]);
        assert_eq!(result.len(), 1);
        assert!((result[0] - 0.1).abs() < 1e-10);
    }
}
