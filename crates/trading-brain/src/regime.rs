use serde::{Deserialize, Serialize};
use std::fmt;
use trading_core::{TechnicalAnalysis, TrendDirection};

/// Per-candle return volatility above which the market counts as volatile.
pub const VOLATILE_THRESHOLD: f64 = 0.02;
/// Trend strength from which a directional market counts as trending.
pub const TRENDING_STRENGTH: f64 = 0.5;

/// Coarse market regime read off an analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketRegime {
    Trending,
    Ranging,
    Volatile,
}

impl MarketRegime {
    pub fn classify(analysis: &TechnicalAnalysis) -> Self {
        if analysis.indicators.volatility > VOLATILE_THRESHOLD {
            MarketRegime::Volatile
        } else if analysis.trend.direction != TrendDirection::Sideways
            && analysis.trend.strength >= TRENDING_STRENGTH
        {
            MarketRegime::Trending
        } else {
            MarketRegime::Ranging
        }
    }
}

impl fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MarketRegime::Trending => "trending",
            MarketRegime::Ranging => "ranging",
            MarketRegime::Volatile => "volatile",
        };
        write!(f, "{}", s)
    }
}
