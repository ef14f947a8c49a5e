//! Humanized pacing: reaction delays, trading-hours gating, order shaping
//! and action rate limits.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveTime, Utc, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::VecDeque;
use tracing::debug;
use trading_core::types::OrderRequest;

use crate::config::PacingConfig;
use crate::error::PacingError;

pub const MIN_DELAY_MS: u64 = 150;
pub const MAX_DELAY_MS: u64 = 2000;
/// Delays and order sizes kept for the human score.
const HISTORY: usize = 100;
/// Fatigue added per hour of session.
const FATIGUE_PER_HOUR: f64 = 0.05;

/// Outcome of the trading-hours check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeGate {
    Allowed,
    Weekend,
    OutsideHours,
    /// Stochastic lunch-break rejection
    LunchBreak,
}

impl TimeGate {
    pub fn is_allowed(&self) -> bool {
        matches!(self, TimeGate::Allowed)
    }
}

/// Outcome of the action rate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionGate {
    Allowed,
    HourlyLimit { wait: Duration },
    Cooldown { wait: Duration },
}

impl ActionGate {
    pub fn is_allowed(&self) -> bool {
        matches!(self, ActionGate::Allowed)
    }

    pub fn wait(&self) -> Duration {
        match self {
            ActionGate::Allowed => Duration::zero(),
            ActionGate::HourlyLimit { wait } | ActionGate::Cooldown { wait } => *wait,
        }
    }
}

pub struct Humanizer {
    config: PacingConfig,
    offset: FixedOffset,
    rng: StdRng,
    session_start: DateTime<Utc>,
    actions: VecDeque<DateTime<Utc>>,
    last_action: Option<DateTime<Utc>>,
    delays: VecDeque<f64>,
    order_sizes: VecDeque<f64>,
}

impl Humanizer {
    pub fn new(config: PacingConfig) -> Result<Self, PacingError> {
        Self::build(config, StdRng::from_entropy())
    }

    /// Deterministic humanizer for tests and replays.
    pub fn with_seed(config: PacingConfig, seed: u64) -> Result<Self, PacingError> {
        Self::build(config, StdRng::seed_from_u64(seed))
    }

    fn build(config: PacingConfig, rng: StdRng) -> Result<Self, PacingError> {
        config.validate()?;
        let offset = FixedOffset::east_opt(config.utc_offset_minutes * 60)
            .ok_or_else(|| PacingError::InvalidConfig("UTC offset out of range".into()))?;
        Ok(Self {
            config,
            offset,
            rng,
            session_start: Utc::now(),
            actions: VecDeque::new(),
            last_action: None,
            delays: VecDeque::with_capacity(HISTORY),
            order_sizes: VecDeque::with_capacity(HISTORY),
        })
    }

    pub fn config(&self) -> &PacingConfig {
        &self.config
    }

    /// Restart the fatigue clock.
    pub fn start_session(&mut self, now: DateTime<Utc>) {
        self.session_start = now;
    }

    /// Standard normal sample (Box–Muller).
    fn gaussian(&mut self) -> f64 {
        // u1 in (0, 1] so the log is finite
        let u1: f64 = 1.0 - self.rng.gen::<f64>();
        let u2: f64 = self.rng.gen::<f64>();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }

    pub fn get_delay(&mut self) -> std::time::Duration {
        self.delay_at(Utc::now())
    }

    /// Reaction delay at `now`, always within [`MIN_DELAY_MS`, `MAX_DELAY_MS`].
    pub fn delay_at(&mut self, now: DateTime<Utc>) -> std::time::Duration {
        let hours = (now - self.session_start).num_seconds().max(0) as f64 / 3600.0;
        let fatigue = 1.0 + hours * FATIGUE_PER_HOUR;
        let base = self.config.reaction_mean_ms + self.config.reaction_std_ms * self.gaussian();
        let jitter = if self.config.jitter_ms > 0.0 {
            self.rng.gen_range(0.0..self.config.jitter_ms)
        } else {
            0.0
        };
        let raw = base * fatigue + jitter;
        let ms = if raw.is_finite() {
            raw.clamp(MIN_DELAY_MS as f64, MAX_DELAY_MS as f64)
        } else {
            MIN_DELAY_MS as f64
        };

        if self.delays.len() == HISTORY {
            self.delays.pop_front();
        }
        self.delays.push_back(ms);
        std::time::Duration::from_millis(ms.round() as u64)
    }

    pub fn is_trading_time_allowed(&mut self, now: DateTime<Utc>) -> TimeGate {
        let local = now.with_timezone(&self.offset);
        if self.config.weekdays_only && matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return TimeGate::Weekend;
        }
        let time: NaiveTime = local.time();
        if time < self.config.trading_start || time > self.config.trading_end {
            return TimeGate::OutsideHours;
        }
        if time >= self.config.lunch_start
            && time < self.config.lunch_end
            && self.rng.gen::<f64>() < self.config.lunch_rejection
        {
            debug!(%time, "Lunch break check rejected");
            return TimeGate::LunchBreak;
        }
        TimeGate::Allowed
    }

    /// Split or jitter an order. Chunk quantities sum exactly to the request.
    pub fn shape_order(&mut self, request: &OrderRequest) -> Vec<OrderRequest> {
        let total = request.quantity;
        if total <= Decimal::ZERO {
            return vec![request.clone()];
        }
        let scale = total.scale();
        let unit = Decimal::new(1, scale);

        let shaped = if self.config.split_orders && total > self.config.max_chunk {
            let mut chunks = Vec::new();
            let mut remaining = total;
            while remaining > Decimal::ZERO {
                let base = self.config.max_chunk.min(remaining);
                let factor = self.jitter_factor(self.config.chunk_jitter, true);
                let mut chunk = (base * factor)
                    .round_dp_with_strategy(scale, RoundingStrategy::ToZero)
                    .min(self.config.max_chunk)
                    .max(unit);
                if chunk >= remaining {
                    chunk = remaining;
                }
                remaining -= chunk;
                chunks.push(request.with_quantity(chunk));
            }
            chunks
        } else {
            let factor = self.jitter_factor(self.config.order_jitter, false);
            let jittered = (total * factor).round_dp_with_strategy(scale, RoundingStrategy::ToZero);
            let quantity = if jittered > Decimal::ZERO { jittered.min(total) } else { total };
            vec![request.with_quantity(quantity)]
        };

        for chunk in &shaped {
            if self.order_sizes.len() == HISTORY {
                self.order_sizes.pop_front();
            }
            self.order_sizes.push_back(chunk.quantity.to_f64().unwrap_or(0.0));
        }
        shaped
    }

    /// `1 ± U(0, jitter)`, or `1 − U(0, jitter)` when only shrinking.
    fn jitter_factor(&mut self, jitter: f64, symmetric: bool) -> Decimal {
        if jitter <= 0.0 {
            return Decimal::ONE;
        }
        let low = 1.0 - jitter;
        let high = if symmetric { 1.0 + jitter } else { 1.0 };
        Decimal::from_f64(self.rng.gen_range(low..=high)).unwrap_or(Decimal::ONE)
    }

    pub fn can_act(&mut self, now: DateTime<Utc>) -> ActionGate {
        let hour_ago = now - Duration::hours(1);
        while self.actions.front().is_some_and(|t| *t <= hour_ago) {
            self.actions.pop_front();
        }
        if self.actions.len() >= self.config.max_actions_per_hour {
            if let Some(oldest) = self.actions.front() {
                return ActionGate::HourlyLimit {
                    wait: *oldest + Duration::hours(1) - now,
                };
            }
        }
        if let Some(last) = self.last_action {
            let ready = last + Duration::seconds(self.config.cooldown_secs);
            if now < ready {
                return ActionGate::Cooldown { wait: ready - now };
            }
        }
        ActionGate::Allowed
    }

    pub fn record_action(&mut self, now: DateTime<Utc>) {
        self.actions.push_back(now);
        self.last_action = Some(now);
    }

    pub fn actions_last_hour(&self) -> usize {
        self.actions.len()
    }

    /// 0–100 observability score; never gates trading.
    ///
    /// Up to 40 for delay std-dev in a 50–400 ms band, up to 40 for order
    /// size diversity and up to 20 for a session under four hours.
    pub fn human_score(&self, now: DateTime<Utc>) -> f64 {
        let timing = if self.delays.len() < 5 {
            20.0
        } else {
            let std_dev = self.delays.iter().std_dev();
            if (50.0..=400.0).contains(&std_dev) {
                40.0
            } else if std_dev < 50.0 {
                40.0 * std_dev / 50.0
            } else {
                (40.0 * 400.0 / std_dev).min(40.0)
            }
        };

        let sizes = if self.order_sizes.len() < 3 {
            20.0
        } else {
            let mut distinct: Vec<f64> = self.order_sizes.iter().copied().collect();
            distinct.sort_by(|a, b| a.total_cmp(b));
            distinct.dedup();
            40.0 * distinct.len() as f64 / self.order_sizes.len() as f64
        };

        let hours = (now - self.session_start).num_minutes().max(0) as f64 / 60.0;
        let session = if hours < 4.0 {
            20.0
        } else if hours < 8.0 {
            10.0
        } else {
            0.0
        };

        (timing + sizes + session).clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use trading_core::types::Side;

    fn humanizer(config: PacingConfig) -> Humanizer {
        Humanizer::with_seed(config, 7).unwrap()
    }

    #[test]
    fn test_delay_always_in_bounds() {
        let extremes = [
            (10_000.0, 5_000.0),
            (1.0, 0.0),
            (450.0, 2_000.0),
        ];
        for (mean, std) in extremes {
            let config = PacingConfig {
                reaction_mean_ms: mean,
                reaction_std_ms: std,
                ..Default::default()
            };
            let mut h = humanizer(config);
            let start = Utc::now();
            h.start_session(start);
            for i in 0..500 {
                let d = h.delay_at(start + Duration::hours(i % 12)).as_millis() as u64;
                assert!((MIN_DELAY_MS..=MAX_DELAY_MS).contains(&d), "delay {} out of bounds", d);
            }
        }
    }

    #[test]
    fn test_split_sums_exactly() {
        let mut h = humanizer(PacingConfig::default());
        let request = OrderRequest::market("AAPL", Side::Buy, dec!(2500));
        for _ in 0..50 {
            let chunks = h.shape_order(&request);
            assert!(chunks.len() >= 3);
            let total: Decimal = chunks.iter().map(|c| c.quantity).sum();
            assert_eq!(total, dec!(2500));
            assert!(chunks.iter().all(|c| c.quantity > Decimal::ZERO && c.quantity <= dec!(1000)));
        }
    }

    #[test]
    fn test_single_order_never_grows() {
        let mut h = humanizer(PacingConfig::default());
        let request = OrderRequest::market("AAPL", Side::Sell, dec!(200));
        for _ in 0..50 {
            let chunks = h.shape_order(&request);
            assert_eq!(chunks.len(), 1);
            assert!(chunks[0].quantity <= dec!(200));
            assert!(chunks[0].quantity >= dec!(190));
        }
    }

    #[test]
    fn test_trading_hours() {
        let mut h = humanizer(PacingConfig::default());
        // 15:00 UTC on a Wednesday is 10:00 at UTC-5
        let open = Utc.with_ymd_and_hms(2024, 3, 6, 15, 0, 0).unwrap();
        assert_eq!(h.is_trading_time_allowed(open), TimeGate::Allowed);

        let night = Utc.with_ymd_and_hms(2024, 3, 6, 23, 0, 0).unwrap();
        assert_eq!(h.is_trading_time_allowed(night), TimeGate::OutsideHours);

        let saturday = Utc.with_ymd_and_hms(2024, 3, 9, 15, 0, 0).unwrap();
        assert_eq!(h.is_trading_time_allowed(saturday), TimeGate::Weekend);
    }

    #[test]
    fn test_lunch_break_is_stochastic() {
        let mut h = humanizer(PacingConfig::default());
        // 17:30 UTC is 12:30 local
        let lunch = Utc.with_ymd_and_hms(2024, 3, 6, 17, 30, 0).unwrap();
        let rejected = (0..1000)
            .filter(|_| h.is_trading_time_allowed(lunch) == TimeGate::LunchBreak)
            .count();
        assert!((600..800).contains(&rejected), "rejected {}", rejected);
    }

    #[test]
    fn test_can_act_limits() {
        let config = PacingConfig {
            max_actions_per_hour: 2,
            cooldown_secs: 5,
            ..Default::default()
        };
        let mut h = humanizer(config);
        let t0 = Utc::now();
        assert!(h.can_act(t0).is_allowed());
        h.record_action(t0);

        let gate = h.can_act(t0 + Duration::seconds(2));
        assert_eq!(gate, ActionGate::Cooldown { wait: Duration::seconds(3) });

        h.record_action(t0 + Duration::seconds(10));
        let gate = h.can_act(t0 + Duration::seconds(20));
        assert!(matches!(gate, ActionGate::HourlyLimit { .. }));
        assert_eq!(gate.wait(), Duration::seconds(3580));

        assert!(h.can_act(t0 + Duration::hours(1) + Duration::seconds(1)).is_allowed());
    }

    #[test]
    fn test_human_score_range() {
        let mut h = humanizer(PacingConfig::default());
        let now = Utc::now();
        h.start_session(now);
        for _ in 0..20 {
            h.delay_at(now);
        }
        let score = h.human_score(now);
        assert!((0.0..=100.0).contains(&score));
        assert!(h.human_score(now + Duration::hours(10)) < score);
    }
}
