//! Candle timeframes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Candle interval requested from a broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    Minute1,
    #[serde(rename = "5m")]
    #[default]
    Minute5,
    #[serde(rename = "15m")]
    Minute15,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "4h")]
    Hour4,
    #[serde(rename = "1d")]
    Daily,
}

impl Timeframe {
    pub const ALL: [Timeframe; 6] = [
        Timeframe::Minute1,
        Timeframe::Minute5,
        Timeframe::Minute15,
        Timeframe::Hour1,
        Timeframe::Hour4,
        Timeframe::Daily,
    ];

    /// Short label, identical to the serialized form.
    pub fn label(&self) -> &'static str {
        match self {
            Timeframe::Minute1 => "1m",
            Timeframe::Minute5 => "5m",
            Timeframe::Minute15 => "15m",
            Timeframe::Hour1 => "1h",
            Timeframe::Hour4 => "4h",
            Timeframe::Daily => "1d",
        }
    }

    /// Duration of one candle in seconds.
    pub fn as_secs(&self) -> u64 {
        match self {
            Timeframe::Minute1 => 60,
            Timeframe::Minute5 => 5 * 60,
            Timeframe::Minute15 => 15 * 60,
            Timeframe::Hour1 => 60 * 60,
            Timeframe::Hour4 => 4 * 60 * 60,
            Timeframe::Daily => 24 * 60 * 60,
        }
    }

    pub fn as_millis(&self) -> i64 {
        self.as_secs() as i64 * 1000
    }

    /// How many `base` candles make up one candle of this timeframe.
    /// Finer timeframes than `base` count as one.
    pub fn multiple_of(&self, base: Timeframe) -> usize {
        (self.as_secs() / base.as_secs()).max(1) as usize
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        if let Some(tf) = Self::ALL.iter().find(|tf| tf.label() == wanted) {
            return Ok(*tf);
        }
        match wanted.as_str() {
            "1min" | "minute" => Ok(Timeframe::Minute1),
            "5min" => Ok(Timeframe::Minute5),
            "15min" => Ok(Timeframe::Minute15),
            "1hour" | "hour" => Ok(Timeframe::Hour1),
            "4hour" => Ok(Timeframe::Hour4),
            "day" | "daily" => Ok(Timeframe::Daily),
            _ => Err(format!("Invalid timeframe: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_parse_back() {
        for tf in Timeframe::ALL {
            assert_eq!(tf.label().parse::<Timeframe>().unwrap(), tf);
        }
        assert_eq!(" 5min".parse::<Timeframe>().unwrap(), Timeframe::Minute5);
        assert_eq!("Daily".parse::<Timeframe>().unwrap(), Timeframe::Daily);
        assert!("7m".parse::<Timeframe>().is_err());
    }

    #[test]
    fn test_multiples() {
        assert_eq!(Timeframe::Hour1.multiple_of(Timeframe::Minute5), 12);
        assert_eq!(Timeframe::Minute1.multiple_of(Timeframe::Minute5), 1);
        assert_eq!(Timeframe::Daily.as_millis(), 86_400_000);
    }
}
