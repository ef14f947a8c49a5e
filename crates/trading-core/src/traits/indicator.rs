//! Indicator trait definitions.

use crate::error::IndicatorError;
use crate::types::Candle;

/// Batch indicator over a price series (usually closes).
pub trait Indicator: Send + Sync {
    type Output;

    /// Values for every window the data supports, oldest first.
    /// Returns an empty vector when there is not enough data.
    fn calculate(&self, data: &[f64]) -> Vec<Self::Output>;

    /// Minimum number of points needed for one output.
    fn period(&self) -> usize;

    fn name(&self) -> &str;

    fn validate_data(&self, data: &[f64]) -> Result<(), IndicatorError> {
        if data.len() < self.period() {
            return Err(IndicatorError::InsufficientData {
                required: self.period(),
                available: data.len(),
            });
        }
        Ok(())
    }

    /// Most recent value.
    fn latest(&self, data: &[f64]) -> Result<Self::Output, IndicatorError> {
        self.validate_data(data)?;
        self.calculate(data)
            .pop()
            .ok_or(IndicatorError::InsufficientData {
                required: self.period(),
                available: data.len(),
            })
    }
}

/// Indicator that needs full OHLCV candles rather than one series.
pub trait CandleIndicator: Send + Sync {
    type Output;

    fn calculate(&self, candles: &[Candle]) -> Vec<Self::Output>;

    fn period(&self) -> usize;

    fn name(&self) -> &str;

    fn latest(&self, candles: &[Candle]) -> Result<Self::Output, IndicatorError> {
        let required = self.period();
        if candles.len() < required {
            return Err(IndicatorError::InsufficientData {
                required,
                available: candles.len(),
            });
        }
        self.calculate(candles)
            .pop()
            .ok_or(IndicatorError::InsufficientData {
                required,
                available: candles.len(),
            })
    }
}
