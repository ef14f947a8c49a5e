//! Circuit breakers.
//!
//! One breaker per [`BreakerKind`]. `trigger` is the only way to set a
//! breaker; it stays tripped until a check after its cooldown clears it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::limits::BreakerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerKind {
    FlashCrash,
    VolatilitySpike,
    DailyLoss,
    ConsecutiveLosses,
    ErrorRate,
}

impl BreakerKind {
    pub const ALL: [BreakerKind; 5] = [
        BreakerKind::FlashCrash,
        BreakerKind::VolatilitySpike,
        BreakerKind::DailyLoss,
        BreakerKind::ConsecutiveLosses,
        BreakerKind::ErrorRate,
    ];

    /// Critical trips escalate to an emergency stop.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            BreakerKind::FlashCrash | BreakerKind::DailyLoss | BreakerKind::ErrorRate
        )
    }
}

impl fmt::Display for BreakerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BreakerKind::FlashCrash => "flash_crash",
            BreakerKind::VolatilitySpike => "volatility_spike",
            BreakerKind::DailyLoss => "daily_loss",
            BreakerKind::ConsecutiveLosses => "consecutive_losses",
            BreakerKind::ErrorRate => "error_rate",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreaker {
    pub kind: BreakerKind,
    pub threshold: f64,
    pub triggered: bool,
    pub cooldown_secs: i64,
    pub triggered_at: Option<DateTime<Utc>>,
    pub cooldown_ends_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

impl CircuitBreaker {
    fn new(kind: BreakerKind, threshold: f64, cooldown_mins: i64) -> Self {
        Self {
            kind,
            threshold,
            triggered: false,
            cooldown_secs: cooldown_mins * 60,
            triggered_at: None,
            cooldown_ends_at: None,
            reason: None,
        }
    }

    pub fn cooldown(&self) -> Duration {
        Duration::seconds(self.cooldown_secs)
    }

    /// Whether the breaker still blocks at `now`.
    pub fn is_blocking(&self, now: DateTime<Utc>) -> bool {
        self.triggered && self.cooldown_ends_at.is_some_and(|end| now <= end)
    }
}

/// Published whenever a breaker trips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerEvent {
    pub kind: BreakerKind,
    pub reason: String,
    pub critical: bool,
    pub triggered_at: DateTime<Utc>,
    pub cooldown_ends_at: DateTime<Utc>,
}

/// The full set of breakers.
#[derive(Debug, Clone)]
pub struct CircuitBreakers {
    breakers: Vec<CircuitBreaker>,
}

impl CircuitBreakers {
    pub fn new(config: &BreakerConfig) -> Self {
        let breakers = vec![
            CircuitBreaker::new(
                BreakerKind::FlashCrash,
                config.flash_crash_move,
                config.flash_crash_cooldown_mins,
            ),
            CircuitBreaker::new(
                BreakerKind::VolatilitySpike,
                config.volatility_spike_multiple,
                config.volatility_spike_cooldown_mins,
            ),
            CircuitBreaker::new(
                BreakerKind::DailyLoss,
                config.daily_loss,
                config.daily_loss_cooldown_mins,
            ),
            CircuitBreaker::new(
                BreakerKind::ConsecutiveLosses,
                config.consecutive_losses as f64,
                config.consecutive_losses_cooldown_mins,
            ),
            CircuitBreaker::new(
                BreakerKind::ErrorRate,
                config.error_rate,
                config.error_rate_cooldown_mins,
            ),
        ];
        Self { breakers }
    }

    pub fn get(&self, kind: BreakerKind) -> &CircuitBreaker {
        // The table always holds every kind, in `BreakerKind::ALL` order
        &self.breakers[kind as usize]
    }

    pub fn threshold(&self, kind: BreakerKind) -> f64 {
        self.get(kind).threshold
    }

    /// Trip `kind`. Re-triggering extends the cooldown from `now`.
    pub fn trigger(
        &mut self,
        kind: BreakerKind,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> CircuitBreakerEvent {
        let reason = reason.into();
        let breaker = &mut self.breakers[kind as usize];
        let ends = now + breaker.cooldown();
        breaker.triggered = true;
        breaker.triggered_at = Some(now);
        breaker.cooldown_ends_at = Some(ends);
        breaker.reason = Some(reason.clone());
        CircuitBreakerEvent {
            kind,
            reason,
            critical: kind.is_critical(),
            triggered_at: now,
            cooldown_ends_at: ends,
        }
    }

    /// Clear every breaker whose cooldown has passed.
    pub fn clear_expired(&mut self, now: DateTime<Utc>) -> Vec<BreakerKind> {
        let mut cleared = Vec::new();
        for breaker in self.breakers.iter_mut() {
            if breaker.triggered && !breaker.is_blocking(now) {
                breaker.triggered = false;
                breaker.reason = None;
                cleared.push(breaker.kind);
            }
        }
        cleared
    }

    /// Auto-resets breakers past cooldown, then reports whether any still blocks.
    pub fn is_trading_allowed(&mut self, now: DateTime<Utc>) -> bool {
        self.clear_expired(now);
        !self.breakers.iter().any(|b| b.triggered)
    }

    pub fn is_triggered(&self, kind: BreakerKind) -> bool {
        self.get(kind).triggered
    }

    /// Reasons for every breaker blocking at `now`.
    pub fn blocking_reasons(&self, now: DateTime<Utc>) -> Vec<String> {
        self.breakers
            .iter()
            .filter(|b| b.is_blocking(now))
            .map(|b| {
                format!(
                    "circuit breaker {} active: {}",
                    b.kind,
                    b.reason.as_deref().unwrap_or("no reason given")
                )
            })
            .collect()
    }

    pub fn snapshot(&self) -> Vec<CircuitBreaker> {
        self.breakers.clone()
    }
}
