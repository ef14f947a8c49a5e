//! Candlestick patterns, chart patterns and support/resistance levels.

use trading_core::types::{Candle, PatternKind};

/// Candles on each side a swing point must dominate.
pub const PIVOT_WINDOW: usize = 2;
/// Levels closer than this fraction are merged.
pub const CLUSTER_TOLERANCE: f64 = 0.01;
/// Levels reported on each side of the price.
pub const MAX_LEVELS: usize = 3;

const DOUBLE_LOOKBACK: usize = 40;
const DOUBLE_PEAK_TOLERANCE: f64 = 0.015;
const DOUBLE_MIN_SEPARATION: usize = 5;
const DOUBLE_MIN_DEPTH: f64 = 0.02;

fn is_doji(c: &Candle) -> bool {
    c.range() > 0.0 && c.body() <= 0.1 * c.range()
}

/// Net close change over the candles before the last one.
fn prior_move(candles: &[Candle], lookback: usize) -> f64 {
    if candles.len() < lookback + 1 {
        return 0.0;
    }
    let end = candles.len() - 1;
    candles[end - 1].close - candles[end - lookback].close
}

/// Candlestick patterns completed by the last candle.
pub fn detect_candlestick_patterns(candles: &[Candle]) -> Vec<PatternKind> {
    let mut found = Vec::new();
    let Some(last) = candles.last() else {
        return found;
    };

    if is_doji(last) {
        found.push(PatternKind::Doji);
    } else if last.range() > 0.0 {
        let body = last.body();
        let small_top = last.upper_shadow() <= 0.25 * last.range();
        let small_bottom = last.lower_shadow() <= 0.25 * last.range();
        let trend = prior_move(candles, 5);

        if last.lower_shadow() >= 2.0 * body && small_top && trend < 0.0 {
            found.push(PatternKind::Hammer);
        }
        if last.upper_shadow() >= 2.0 * body && small_bottom && trend > 0.0 {
            found.push(PatternKind::ShootingStar);
        }
    }

    if candles.len() >= 2 {
        let prev = &candles[candles.len() - 2];
        if prev.is_bearish()
            && last.is_bullish()
            && last.open <= prev.close
            && last.close >= prev.open
            && last.body() > prev.body()
        {
            found.push(PatternKind::BullishEngulfing);
        }
        if prev.is_bullish()
            && last.is_bearish()
            && last.open >= prev.close
            && last.close <= prev.open
            && last.body() > prev.body()
        {
            found.push(PatternKind::BearishEngulfing);
        }
    }

    if candles.len() >= 3 {
        let first = &candles[candles.len() - 3];
        let middle = &candles[candles.len() - 2];
        let first_mid = (first.open + first.close) / 2.0;
        let strong_first = first.range() > 0.0 && first.body() >= 0.6 * first.range();
        let small_middle = middle.body() <= 0.3 * first.body();

        let star = strong_first && small_middle;
        if star && first.is_bearish() && last.is_bullish() && last.close > first_mid {
            found.push(PatternKind::MorningStar);
        }
        if star && first.is_bullish() && last.is_bearish() && last.close < first_mid {
            found.push(PatternKind::EveningStar);
        }
    }

    found
}

/// Indices of swing highs (`highs == true`) or swing lows.
fn pivots(candles: &[Candle], highs: bool) -> Vec<usize> {
    if candles.len() < 2 * PIVOT_WINDOW + 1 {
        return vec![];
    }
    (PIVOT_WINDOW..candles.len() - PIVOT_WINDOW)
        .filter(|&i| {
            let window = &candles[i - PIVOT_WINDOW..=i + PIVOT_WINDOW];
            if highs {
                window.iter().all(|c| c.high <= candles[i].high)
            } else {
                window.iter().all(|c| c.low >= candles[i].low)
            }
        })
        .collect()
}

/// Double top / double bottom over the recent lookback.
pub fn detect_chart_patterns(candles: &[Candle]) -> Vec<PatternKind> {
    let start = candles.len().saturating_sub(DOUBLE_LOOKBACK);
    let recent = &candles[start..];
    let Some(last) = recent.last() else {
        return vec![];
    };
    let mut found = Vec::new();

    let tops = pivots(recent, true);
    if let [.., a, b] = tops[..] {
        let (p1, p2) = (recent[a].high, recent[b].high);
        let trough = recent[a..=b].iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
        let peak = p1.max(p2);
        if b - a >= DOUBLE_MIN_SEPARATION
            && (p1 - p2).abs() / peak <= DOUBLE_PEAK_TOLERANCE
            && (peak - trough) / peak >= DOUBLE_MIN_DEPTH
            && last.close < (peak + trough) / 2.0
        {
            found.push(PatternKind::DoubleTop);
        }
    }

    let bottoms = pivots(recent, false);
    if let [.., a, b] = bottoms[..] {
        let (p1, p2) = (recent[a].low, recent[b].low);
        let crest = recent[a..=b].iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
        let floor = p1.min(p2);
        if b - a >= DOUBLE_MIN_SEPARATION
            && floor > 0.0
            && (p1 - p2).abs() / floor <= DOUBLE_PEAK_TOLERANCE
            && (crest - floor) / floor >= DOUBLE_MIN_DEPTH
            && last.close > (crest + floor) / 2.0
        {
            found.push(PatternKind::DoubleBottom);
        }
    }

    found
}

/// Merge sorted levels lying within the tolerance of a running cluster mean.
fn cluster_levels(mut levels: Vec<f64>) -> Vec<f64> {
    levels.sort_by(|a, b| a.total_cmp(b));
    let mut clusters: Vec<(f64, usize)> = Vec::new();

    for level in levels {
        if let Some((sum, count)) = clusters.last_mut() {
            let mean = *sum / *count as f64;
            if mean > 0.0 && (level - mean) / mean <= CLUSTER_TOLERANCE {
                *sum += level;
                *count += 1;
                continue;
            }
        }
        clusters.push((level, 1));
    }

    clusters.into_iter().map(|(sum, count)| sum / count as f64).collect()
}

/// Nearest distinct levels, `levels` already ordered by distance from price.
fn nearest(mut levels: Vec<f64>) -> Vec<f64> {
    levels.dedup_by(|a, b| *b > 0.0 && (*a - *b).abs() / *b <= CLUSTER_TOLERANCE);
    levels.truncate(MAX_LEVELS);
    levels
}

/// Clustered support (below price, nearest first) and resistance (above, nearest first).
///
/// Swing lows and swing highs both count on either side: a broken resistance
/// becomes support and vice versa.
pub fn support_resistance(candles: &[Candle], price: f64) -> (Vec<f64>, Vec<f64>) {
    let swing_points: Vec<f64> = pivots(candles, false)
        .into_iter()
        .map(|i| candles[i].low)
        .chain(pivots(candles, true).into_iter().map(|i| candles[i].high))
        .collect();
    let levels = cluster_levels(swing_points);

    let mut support: Vec<f64> = levels.iter().copied().filter(|l| *l < price).collect();
    support.sort_by(|a, b| b.total_cmp(a));

    let mut resistance: Vec<f64> = levels.into_iter().filter(|l| *l > price).collect();
    resistance.sort_by(|a, b| a.total_cmp(b));

    (nearest(support), nearest(resistance))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(i: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle::new(i, open, high, low, close, 1000.0)
    }

    fn declining(n: i64) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let base = 120.0 - i as f64;
                candle(i, base + 0.5, base + 1.0, base - 1.0, base - 0.5)
            })
            .collect()
    }

    #[test]
    fn test_doji() {
        let candles = vec![candle(0, 100.0, 102.0, 98.0, 100.1)];
        assert_eq!(detect_candlestick_patterns(&candles), vec![PatternKind::Doji]);
    }

    #[test]
    fn test_hammer_after_decline() {
        let mut candles = declining(6);
        // Long lower wick, close near the high
        candles.push(candle(6, 113.0, 114.1, 108.0, 114.0));
        let found = detect_candlestick_patterns(&candles);
        assert!(found.contains(&PatternKind::Hammer));
        assert!(!found.contains(&PatternKind::ShootingStar));
    }

    #[test]
    fn test_bullish_engulfing() {
        let candles = vec![
            candle(0, 101.0, 101.5, 99.5, 100.0),
            candle(1, 99.8, 102.5, 99.5, 102.0),
        ];
        let found = detect_candlestick_patterns(&candles);
        assert!(found.contains(&PatternKind::BullishEngulfing));
        assert!(!found.contains(&PatternKind::BearishEngulfing));
    }

    #[test]
    fn test_evening_star() {
        let candles = vec![
            candle(0, 100.0, 105.2, 99.8, 105.0),
            candle(1, 105.5, 106.2, 105.0, 105.7),
            candle(2, 105.0, 105.2, 101.0, 101.5),
        ];
        assert!(detect_candlestick_patterns(&candles).contains(&PatternKind::EveningStar));
    }

    #[test]
    fn test_double_top() {
        // Up to 110, down to 104, back to 110, then down to 103
        let closes = [
            100.0, 102.0, 104.0, 106.0, 108.0, 110.0, 108.0, 106.0, 104.0, 105.0, 106.0, 107.0,
            108.0, 110.0, 108.0, 106.0, 104.0, 103.0,
        ];
        let candles: Vec<Candle> = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| candle(i as i64, c, c + 0.2, c - 0.2, c))
            .collect();
        let found = detect_chart_patterns(&candles);
        assert!(found.contains(&PatternKind::DoubleTop));
        assert!(!found.contains(&PatternKind::DoubleBottom));
    }

    #[test]
    fn test_cluster_levels_merges_close_values() {
        let clustered = cluster_levels(vec![100.0, 100.5, 110.0, 100.2]);
        assert_eq!(clustered.len(), 2);
        assert!((clustered[0] - 100.2333).abs() < 1e-3);
        assert!((clustered[1] - 110.0).abs() < 1e-10);
    }

    #[test]
    fn test_support_resistance_sides() {
        // Oscillate between ~95 and ~105
        let candles: Vec<Candle> = (0..40)
            .map(|i| {
                let phase = (i % 8) as f64;
                let mid = if phase < 4.0 {
                    95.0 + phase * 3.3
                } else {
                    105.0 - (phase - 4.0) * 3.3
                };
                candle(i, mid, mid + 0.5, mid - 0.5, mid)
            })
            .collect();
        let (support, resistance) = support_resistance(&candles, 100.0);

        assert!(!support.is_empty() && !resistance.is_empty());
        assert!(support.iter().all(|s| *s < 100.0));
        assert!(resistance.iter().all(|r| *r > 100.0));
        assert!(support.len() <= MAX_LEVELS && resistance.len() <= MAX_LEVELS);
    }
}
