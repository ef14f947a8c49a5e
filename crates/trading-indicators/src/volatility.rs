//! Volatility indicators.

use serde::{Deserialize, Serialize};
use trading_core::error::IndicatorError;
use trading_core::traits::{CandleIndicator, Indicator};
use trading_core::types::Candle;

use crate::momentum::wilder_smooth;
use crate::moving_average::check_period;

fn mean_and_std(window: &[f64]) -> (f64, f64) {
    let n = window.len() as f64;
    let mean = window.iter().sum::<f64>() / n;
    let variance = window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

/// Population standard deviation over a rolling window.
#[derive(Debug, Clone)]
pub struct StdDev {
    period: usize,
}

impl StdDev {
    pub fn new(period: usize) -> Result<Self, IndicatorError> {
        check_period("StdDev", period, 2)?;
        Ok(Self { period })
    }
}

impl Indicator for StdDev {
    type Output = f64;

    fn calculate(&self, data: &[f64]) -> Vec<f64> {
        if data.len() < self.period {
            return vec![];
        }
        data.windows(self.period).map(|w| mean_and_std(w).1).collect()
    }

    fn period(&self) -> usize {
        self.period
    }

    fn name(&self) -> &str {
        "StdDev"
    }
}

/// Standard deviation of close-to-close returns over the last `period` returns.
pub fn realized_volatility(closes: &[f64], period: usize) -> Option<f64> {
    if period < 2 || closes.len() <= period {
        return None;
    }
    let returns: Vec<f64> = closes[closes.len() - period - 1..]
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect();
    if returns.len() < 2 {
        return None;
    }
    Some(mean_and_std(&returns).1)
}

/// Average True Range (Wilder) over OHLC candles.
#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
}

impl Atr {
    pub fn new(period: usize) -> Result<Self, IndicatorError> {
        check_period("ATR", period, 1)?;
        Ok(Self { period })
    }
}

impl CandleIndicator for Atr {
    type Output = f64;

    fn calculate(&self, candles: &[Candle]) -> Vec<f64> {
        if candles.len() < self.period() {
            return vec![];
        }
        let true_ranges: Vec<f64> = candles
            .windows(2)
            .map(|w| w[1].true_range(Some(w[0].close)))
            .collect();
        wilder_smooth(&true_ranges, self.period)
    }

    fn period(&self) -> usize {
        self.period + 1
    }

    fn name(&self) -> &str {
        "ATR"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BollingerOutput {
    pub upper: f64,
    /// SMA of the window
    pub middle: f64,
    pub lower: f64,
    /// (upper - lower) / middle
    pub bandwidth: f64,
    /// (price - lower) / (upper - lower)
    pub percent_b: f64,
}

impl BollingerOutput {
    pub fn is_overbought(&self, price: f64) -> bool {
        price >= self.upper
    }

    pub fn is_oversold(&self, price: f64) -> bool {
        price <= self.lower
    }
}

/// Bollinger Bands (20, 2σ by default).
#[derive(Debug, Clone)]
pub struct BollingerBands {
    period: usize,
    std_dev_multiplier: f64,
}

impl BollingerBands {
    pub fn with_params(period: usize, std_dev_multiplier: f64) -> Result<Self, IndicatorError> {
        check_period("Bollinger", period, 2)?;
        if std_dev_multiplier <= 0.0 {
            return Err(IndicatorError::InvalidParameter(format!(
                "Bollinger multiplier must be positive, got {}",
                std_dev_multiplier
            )));
        }
        Ok(Self {
            period,
            std_dev_multiplier,
        })
    }
}

impl Default for BollingerBands {
    fn default() -> Self {
        Self {
            period: 20,
            std_dev_multiplier: 2.0,
        }
    }
}

impl Indicator for BollingerBands {
    type Output = BollingerOutput;

    fn calculate(&self, data: &[f64]) -> Vec<BollingerOutput> {
        if data.len() < self.period {
            return vec![];
        }

        data.windows(self.period)
            .map(|window| {
                let (mean, std_dev) = mean_and_std(window);
                let upper = mean + self.std_dev_multiplier * std_dev;
                let lower = mean - self.std_dev_multiplier * std_dev;
                let price = window[window.len() - 1];

                BollingerOutput {
                    upper,
                    middle: mean,
                    lower,
                    bandwidth: if mean != 0.0 { (upper - lower) / mean } else { 0.0 },
                    percent_b: if upper != lower {
                        (price - lower) / (upper - lower)
                    } else {
                        0.5
                    },
                }
            })
            .collect()
    }

    fn period(&self) -> usize {
        self.period
    }

    fn name(&self) -> &str {
        "Bollinger Bands"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_std_dev_constant_series() {
        let std_dev = StdDev::new(5).unwrap();
        let result = std_dev.calculate(&[3.0; 10]);
        assert_eq!(result.len(), 6);
        assert!(result.iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn test_std_dev_known_value() {
        let std_dev = StdDev::new(4).unwrap();
        // mean 5, deviations 3,1,1,3 -> variance 5
        let value = std_dev.latest(&[2.0, 4.0, 6.0, 8.0]).unwrap();
        assert!((value - 5.0_f64.sqrt()).abs() < 1e-10);
    }

    #[test]
    fn test_atr_constant_range() {
        let atr = Atr::new(3).unwrap();
        let candles: Vec<Candle> = (0..10)
            .map(|i| Candle::new(i, 100.0, 101.0, 99.0, 100.0, 10.0))
            .collect();
        let value = atr.latest(&candles).unwrap();
        assert!((value - 2.0).abs() < 1e-10);
    }

    #[test]
    fn test_atr_uses_gaps() {
        let atr = Atr::new(1).unwrap();
        let candles = vec![
            Candle::new(0, 100.0, 101.0, 99.0, 100.0, 10.0),
            Candle::new(1, 110.0, 111.0, 109.0, 110.0, 10.0),
        ];
        // Gap up: true range = 111 - 100
        assert!((atr.latest(&candles).unwrap() - 11.0).abs() < 1e-10);
    }

    #[test]
    fn test_bollinger_percent_b() {
        let bands = BollingerBands::default();
        let mut data: Vec<f64> = (0..19).map(|i| 100.0 + (i % 2) as f64).collect();
        data.push(110.0);
        let last = bands.latest(&data).unwrap();

        assert!(last.upper > last.middle && last.middle > last.lower);
        assert!(last.percent_b > 1.0);
        assert!(last.is_overbought(110.0));
    }

    #[test]
    fn test_realized_volatility() {
        let flat = vec![100.0; 30];
        assert_eq!(realized_volatility(&flat, 20), Some(0.0));

        let choppy: Vec<f64> = (0..30).map(|i| if i % 2 == 0 { 100.0 } else { 102.0 }).collect();
        assert!(realized_volatility(&choppy, 20).unwrap() > 0.01);
        assert!(realized_volatility(&choppy[..5], 20).is_none());
    }
}
