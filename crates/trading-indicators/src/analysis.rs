//! Technical analyzer: turns a candle history into a `TechnicalAnalysis`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use trading_core::error::IndicatorError;
use trading_core::traits::{CandleIndicator, Indicator};
use trading_core::types::{
    Candle, IndicatorSignal, IndicatorSnapshot, Recommendation, SignalAction, TechnicalAnalysis,
    TrendDirection, TrendInfo,
};

use crate::momentum::{Macd, MacdOutput, Rsi, Stochastic};
use crate::moving_average::{Ema, Sma};
use crate::patterns::{detect_candlestick_patterns, detect_chart_patterns, support_resistance};
use crate::volatility::{realized_volatility, Atr, BollingerBands};

/// Candles required before an analysis is attempted.
pub const MIN_CANDLES: usize = 50;

/// Net vote needed for the analysis to recommend a direction.
const RECOMMENDATION_THRESHOLD: f64 = 0.2;

/// Indicator periods used by the analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub sma_fast: usize,
    pub sma_slow: usize,
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub macd_signal: usize,
    pub rsi_period: usize,
    pub atr_period: usize,
    pub bollinger_period: usize,
    pub bollinger_std_dev: f64,
    pub stochastic_k: usize,
    pub stochastic_d: usize,
    pub volatility_period: usize,
    pub volume_period: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            sma_fast: 20,
            sma_slow: 50,
            ema_fast: 12,
            ema_slow: 26,
            macd_signal: 9,
            rsi_period: 14,
            atr_period: 14,
            bollinger_period: 20,
            bollinger_std_dev: 2.0,
            stochastic_k: 14,
            stochastic_d: 3,
            volatility_period: 20,
            volume_period: 20,
        }
    }
}

/// Stateless analyzer; one instance can serve every asset.
#[derive(Debug, Clone, Default)]
pub struct TechnicalAnalyzer {
    config: AnalyzerConfig,
}

impl TechnicalAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn min_candles(&self) -> usize {
        MIN_CANDLES.max(self.config.sma_slow)
    }

    /// Analyze with the current time as the snapshot timestamp.
    pub fn analyze(
        &self,
        asset_id: &str,
        candles: &[Candle],
    ) -> Result<TechnicalAnalysis, IndicatorError> {
        self.analyze_at(asset_id, candles, Utc::now())
    }

    pub fn analyze_at(
        &self,
        asset_id: &str,
        candles: &[Candle],
        now: DateTime<Utc>,
    ) -> Result<TechnicalAnalysis, IndicatorError> {
        let required = self.min_candles();
        if candles.len() < required {
            return Err(IndicatorError::InsufficientData {
                required,
                available: candles.len(),
            });
        }

        let cfg = &self.config;
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let price = closes[closes.len() - 1];

        let sma_fast_series = Sma::new(cfg.sma_fast)?.calculate(&closes);
        let sma_fast = last_of(&sma_fast_series, cfg.sma_fast, closes.len())?;
        let sma_slow = Sma::new(cfg.sma_slow)?.latest(&closes)?;
        let ema_fast = Ema::new(cfg.ema_fast)?.latest(&closes)?;
        let ema_slow = Ema::new(cfg.ema_slow)?.latest(&closes)?;
        let rsi = Rsi::new(cfg.rsi_period)?.latest(&closes)?;
        let macd_series =
            Macd::with_periods(cfg.ema_fast, cfg.ema_slow, cfg.macd_signal)?.calculate(&closes);
        let macd = *macd_series.last().ok_or(IndicatorError::InsufficientData {
            required,
            available: closes.len(),
        })?;
        let prev_macd = macd_series.len().checked_sub(2).map(|i| macd_series[i]);
        let atr = Atr::new(cfg.atr_period)?.latest(candles)?;
        let bollinger = BollingerBands::with_params(cfg.bollinger_period, cfg.bollinger_std_dev)?
            .latest(&closes)?;
        let stochastic =
            Stochastic::with_periods(cfg.stochastic_k, cfg.stochastic_d)?.latest(candles)?;
        let volatility = realized_volatility(&closes, cfg.volatility_period).unwrap_or(0.0);
        let volume_ratio = volume_ratio(candles, cfg.volume_period);

        let indicators = IndicatorSnapshot {
            rsi,
            macd: macd.macd,
            macd_signal: macd.signal,
            macd_histogram: macd.histogram,
            sma_20: sma_fast,
            sma_50: sma_slow,
            ema_12: ema_fast,
            ema_26: ema_slow,
            atr,
            bollinger_upper: bollinger.upper,
            bollinger_middle: bollinger.middle,
            bollinger_lower: bollinger.lower,
            bollinger_percent_b: bollinger.percent_b,
            stochastic_k: stochastic.k,
            stochastic_d: stochastic.d,
            volatility,
            volume_ratio,
        };

        let trend = trend_info(&closes, &sma_fast_series, cfg.sma_fast, &indicators);
        let (support, resistance) = support_resistance(candles, price);
        let mut patterns = detect_candlestick_patterns(candles);
        patterns.extend(detect_chart_patterns(candles));

        let mut signals = indicator_signals(price, &indicators, prev_macd, &trend);
        for pattern in &patterns {
            let action = pattern.bias();
            if action.is_directional() {
                signals.push(IndicatorSignal {
                    indicator: "pattern".to_string(),
                    action,
                    strength: 0.4,
                    description: format!("{:?} pattern", pattern),
                });
            }
        }
        let recommendation = recommend(&signals);

        debug!(
            asset = asset_id,
            price,
            trend = ?trend.direction,
            strength = trend.strength,
            rsi,
            recommendation = %recommendation.action,
            "Technical analysis complete"
        );

        Ok(TechnicalAnalysis {
            asset_id: asset_id.to_string(),
            price,
            timestamp: now,
            trend,
            indicators,
            support,
            resistance,
            signals,
            patterns,
            recommendation,
        })
    }
}

fn last_of(series: &[f64], required: usize, available: usize) -> Result<f64, IndicatorError> {
    series
        .last()
        .copied()
        .ok_or(IndicatorError::InsufficientData { required, available })
}

/// Last volume relative to the average of the preceding window.
fn volume_ratio(candles: &[Candle], period: usize) -> f64 {
    if period == 0 || candles.len() <= period {
        return 1.0;
    }
    let end = candles.len() - 1;
    let avg = candles[end - period..end].iter().map(|c| c.volume).sum::<f64>() / period as f64;
    if avg > 0.0 {
        candles[end].volume / avg
    } else {
        1.0
    }
}

fn trend_info(
    closes: &[f64],
    sma_series: &[f64],
    sma_period: usize,
    ind: &IndicatorSnapshot,
) -> TrendInfo {
    let price = closes[closes.len() - 1];
    let direction = if ind.sma_20 > ind.sma_50 && price > ind.sma_20 {
        TrendDirection::Up
    } else if ind.sma_20 < ind.sma_50 && price < ind.sma_20 {
        TrendDirection::Down
    } else {
        TrendDirection::Sideways
    };

    let ema_component = if price > 0.0 {
        ((ind.ema_12 - ind.ema_26).abs() / price / 0.02).min(1.0)
    } else {
        0.0
    };
    let macd_component = if price > 0.0 {
        (ind.macd_histogram.abs() / (price * 0.005)).min(1.0)
    } else {
        0.0
    };
    let mut strength = 0.6 * ema_component + 0.4 * macd_component;
    if direction == TrendDirection::Sideways {
        strength *= 0.5;
    }

    // sma_series[j] belongs to closes[j + sma_period - 1]
    let offset = sma_period - 1;
    let above = price >= ind.sma_20;
    let duration = sma_series
        .iter()
        .enumerate()
        .rev()
        .take_while(|(j, sma)| (closes[j + offset] >= **sma) == above)
        .count();

    TrendInfo {
        direction,
        strength: strength.clamp(0.0, 1.0),
        duration,
    }
}

fn signal(
    indicator: &str,
    action: SignalAction,
    strength: f64,
    description: impl Into<String>,
) -> IndicatorSignal {
    IndicatorSignal {
        indicator: indicator.to_string(),
        action,
        strength: strength.clamp(0.0, 1.0),
        description: description.into(),
    }
}

fn indicator_signals(
    price: f64,
    ind: &IndicatorSnapshot,
    prev_macd: Option<MacdOutput>,
    trend: &TrendInfo,
) -> Vec<IndicatorSignal> {
    let mut signals = Vec::new();

    if ind.rsi < 30.0 {
        let strength = 0.5 + (30.0 - ind.rsi) / 60.0;
        let description = format!("RSI oversold at {:.1}", ind.rsi);
        signals.push(signal("rsi", SignalAction::Buy, strength, description));
    } else if ind.rsi > 70.0 {
        let strength = 0.5 + (ind.rsi - 70.0) / 60.0;
        let description = format!("RSI overbought at {:.1}", ind.rsi);
        signals.push(signal("rsi", SignalAction::Sell, strength, description));
    }

    match prev_macd {
        Some(prev) if prev.histogram <= 0.0 && ind.macd_histogram > 0.0 => {
            signals.push(signal("macd", SignalAction::Buy, 0.7, "MACD bullish crossover"));
        }
        Some(prev) if prev.histogram >= 0.0 && ind.macd_histogram < 0.0 => {
            signals.push(signal("macd", SignalAction::Sell, 0.7, "MACD bearish crossover"));
        }
        _ if ind.macd_histogram > 0.0 => {
            signals.push(signal("macd", SignalAction::Buy, 0.3, "MACD above signal"));
        }
        _ if ind.macd_histogram < 0.0 => {
            signals.push(signal("macd", SignalAction::Sell, 0.3, "MACD below signal"));
        }
        _ => {}
    }

    if price <= ind.bollinger_lower {
        let description = "Price at lower Bollinger band";
        signals.push(signal("bollinger", SignalAction::Buy, 0.6, description));
    } else if price >= ind.bollinger_upper {
        let description = "Price at upper Bollinger band";
        signals.push(signal("bollinger", SignalAction::Sell, 0.6, description));
    }

    if ind.stochastic_k < 20.0 {
        let description = format!("Stochastic oversold at {:.1}", ind.stochastic_k);
        signals.push(signal("stochastic", SignalAction::Buy, 0.5, description));
    } else if ind.stochastic_k > 80.0 {
        let description = format!("Stochastic overbought at {:.1}", ind.stochastic_k);
        signals.push(signal("stochastic", SignalAction::Sell, 0.5, description));
    }

    let strength = trend.strength.max(0.2);
    match trend.direction {
        TrendDirection::Up => {
            signals.push(signal("sma_trend", SignalAction::Buy, strength, "SMA20 above SMA50"))
        }
        TrendDirection::Down => {
            signals.push(signal("sma_trend", SignalAction::Sell, strength, "SMA20 below SMA50"))
        }
        TrendDirection::Sideways => {}
    }

    signals
}

/// Strength-weighted net vote of the directional signals.
fn recommend(signals: &[IndicatorSignal]) -> Recommendation {
    let total: f64 = signals.iter().map(|s| s.strength).sum();
    if total <= 0.0 {
        return Recommendation {
            action: SignalAction::Hold,
            strength: 0.0,
        };
    }
    let net = signals.iter().map(|s| s.action.direction() * s.strength).sum::<f64>() / total;
    let action = if net >= RECOMMENDATION_THRESHOLD {
        SignalAction::Buy
    } else if net <= -RECOMMENDATION_THRESHOLD {
        SignalAction::Sell
    } else {
        SignalAction::Hold
    };
    Recommendation {
        action,
        strength: net.abs().min(1.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trending(n: usize, step: f64) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let close = 100.0 + i as f64 * step + (i as f64 * 0.7).sin() * 0.3;
                let open = close - step * 0.5;
                let (high, low) = (open.max(close) + 0.4, open.min(close) - 0.4);
                Candle::new(i as i64 * 60_000, open, high, low, close, 1000.0 + i as f64)
            })
            .collect()
    }

    #[test]
    fn test_requires_fifty_candles() {
        let analyzer = TechnicalAnalyzer::default();
        let err = analyzer.analyze("AAPL", &trending(49, 0.5)).unwrap_err();
        assert!(matches!(err, IndicatorError::InsufficientData { required: 50, available: 49 }));
    }

    #[test]
    fn test_uptrend_analysis() {
        let analyzer = TechnicalAnalyzer::default();
        let candles = trending(120, 0.5);
        let analysis = analyzer.analyze("AAPL", &candles).unwrap();

        assert_eq!(analysis.trend.direction, TrendDirection::Up);
        assert!(analysis.trend.strength > 0.0 && analysis.trend.strength <= 1.0);
        assert!(analysis.trend.duration > 0);
        assert!(analysis.indicators.sma_20 > analysis.indicators.sma_50);
        assert!(analysis.indicators.rsi > 50.0);
        assert!(analysis.resistance.iter().all(|r| *r > analysis.price));
        assert!(analysis.support.iter().all(|s| *s < analysis.price));
        // Every close is higher than the last: trend says buy, oscillators say overbought
        assert!(analysis
            .signals
            .iter()
            .any(|s| s.indicator == "sma_trend" && s.action == SignalAction::Buy));
        assert!(analysis
            .signals
            .iter()
            .any(|s| s.indicator == "rsi" && s.action == SignalAction::Sell));
    }

    #[test]
    fn test_downtrend_analysis() {
        let analyzer = TechnicalAnalyzer::default();
        let candles = trending(120, -0.4);
        let analysis = analyzer.analyze("AAPL", &candles).unwrap();

        assert_eq!(analysis.trend.direction, TrendDirection::Down);
        assert!(analysis
            .signals
            .iter()
            .any(|s| s.indicator == "sma_trend" && s.action == SignalAction::Sell));
    }

    #[test]
    fn test_recommend_balances_votes() {
        let signals = vec![
            signal("a", SignalAction::Buy, 0.5, String::new()),
            signal("b", SignalAction::Sell, 0.5, String::new()),
        ];
        assert_eq!(recommend(&signals).action, SignalAction::Hold);
        assert_eq!(recommend(&[]).strength, 0.0);
    }

    #[test]
    fn test_volume_ratio() {
        let mut candles: Vec<Candle> =
            (0..21).map(|i| Candle::new(i, 1.0, 1.0, 1.0, 1.0, 100.0)).collect();
        candles[20].volume = 300.0;
        assert!((volume_ratio(&candles, 20) - 3.0).abs() < 1e-10);
    }
}
