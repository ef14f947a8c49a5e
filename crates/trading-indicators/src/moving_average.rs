//! Moving average indicators.

use trading_core::error::IndicatorError;
use trading_core::traits::Indicator;

pub(crate) fn check_period(name: &str, period: usize, min: usize) -> Result<(), IndicatorError> {
    if period < min {
        return Err(IndicatorError::InvalidParameter(format!(
            "{} period must be at least {}, got {}",
            name, min, period
        )));
    }
    Ok(())
}

/// Exponential smoothing seeded with the SMA of the first `period` values.
pub(crate) fn ema_series(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period {
        return vec![];
    }
    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut result = Vec::with_capacity(data.len() - period + 1);

    let mut ema = data[..period].iter().sum::<f64>() / period as f64;
    result.push(ema);
    for &price in &data[period..] {
        ema = price * multiplier + ema * (1.0 - multiplier);
        result.push(ema);
    }
    result
}

/// Simple Moving Average (SMA).
#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
}

impl Sma {
    pub fn new(period: usize) -> Result<Self, IndicatorError> {
        check_period("SMA", period, 1)?;
        Ok(Self { period })
    }
}

impl Indicator for Sma {
    type Output = f64;

    fn calculate(&self, data: &[f64]) -> Vec<f64> {
        if data.len() < self.period {
            return vec![];
        }

        let mut result = Vec::with_capacity(data.len() - self.period + 1);
        let period = self.period as f64;

        let mut sum: f64 = data[..self.period].iter().sum();
        result.push(sum / period);

        for i in self.period..data.len() {
            sum = sum - data[i - self.period] + data[i];
            result.push(sum / period);
        }

        result
    }

    fn period(&self) -> usize {
        self.period
    }

    fn name(&self) -> &str {
        "SMA"
    }
}

/// Exponential Moving Average (EMA).
#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
}

impl Ema {
    pub fn new(period: usize) -> Result<Self, IndicatorError> {
        check_period("EMA", period, 1)?;
        Ok(Self { period })
    }
}

impl Indicator for Ema {
    type Output = f64;

    fn calculate(&self, data: &[f64]) -> Vec<f64> {
        ema_series(data, self.period)
    }

    fn period(&self) -> usize {
        self.period
    }

    fn name(&self) -> &str {
        "EMA"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma() {
        let sma = Sma::new(3).unwrap();
        let result = sma.calculate(&[1.0, 2.0, 3.0, 4.0, 5.0]);

        assert_eq!(result.len(), 3);
        assert!((result[0] - 2.0).abs() < 1e-10);
        assert!((result[2] - 4.0).abs() < 1e-10);
    }

    #[test]
    fn test_sma_insufficient_data() {
        let sma = Sma::new(5).unwrap();
        assert!(sma.calculate(&[1.0, 2.0, 3.0]).is_empty());
        assert!(sma.latest(&[1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn test_zero_period_rejected() {
        assert!(matches!(Sma::new(0), Err(IndicatorError::InvalidParameter(_))));
        assert!(Ema::new(0).is_err());
    }

    #[test]
    fn test_ema() {
        let ema = Ema::new(3).unwrap();
        let result = ema.calculate(&[1.0, 2.0, 3.0, 4.0, 5.0]);

        assert_eq!(result.len(), 3);
        // Seeded with SMA(1,2,3) = 2, multiplier 0.5
        assert!((result[0] - 2.0).abs() < 1e-10);
        assert!((result[1] - 3.0).abs() < 1e-10);
        assert!((result[2] - 4.0).abs() < 1e-10);
    }
}
