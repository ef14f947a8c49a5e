//! Strategy signals.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// What a strategy wants to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
}

impl SignalAction {
    /// +1 buy, -1 sell, 0 hold.
    pub fn direction(&self) -> f64 {
        match self {
            SignalAction::Buy => 1.0,
            SignalAction::Sell => -1.0,
            SignalAction::Hold => 0.0,
        }
    }

    pub fn is_directional(&self) -> bool {
        !matches!(self, SignalAction::Hold)
    }
}

impl std::fmt::Display for SignalAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalAction::Buy => write!(f, "buy"),
            SignalAction::Sell => write!(f, "sell"),
            SignalAction::Hold => write!(f, "hold"),
        }
    }
}

/// A signal produced by one strategy (or fused from several).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySignal {
    pub strategy_id: String,
    pub asset_id: String,
    pub action: SignalAction,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Magnitude of the underlying setup, strategy-specific scale in [0, 1]
    pub strength: f64,
    pub price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub reasoning: String,
    pub timestamp: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl StrategySignal {
    /// A signal stamped now, valid for `ttl`.
    pub fn new(
        strategy_id: impl Into<String>,
        asset_id: impl Into<String>,
        action: SignalAction,
        confidence: f64,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            strategy_id: strategy_id.into(),
            asset_id: asset_id.into(),
            action,
            confidence: confidence.clamp(0.0, 1.0),
            strength: 0.0,
            price: None,
            stop_loss: None,
            take_profit: None,
            reasoning: String::new(),
            timestamp: now,
            expires_at: now + ttl,
        }
    }

    pub fn with_strength(mut self, strength: f64) -> Self {
        self.strength = strength.clamp(0.0, 1.0);
        self
    }

    pub fn with_levels(
        mut self,
        price: Option<Decimal>,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> Self {
        self.price = price;
        self.stop_loss = stop_loss;
        self.take_profit = take_profit;
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
