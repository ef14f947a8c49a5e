//! Reference data and point-in-time market data.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A tradeable instrument. Immutable reference data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Asset {
    /// Broker-scoped unique id
    pub id: String,
    /// Ticker symbol
    pub symbol: String,
    /// Human readable name
    pub name: String,
    /// Venue / exchange the asset trades on
    pub venue: String,
    /// Quote currency
    pub currency: String,
    /// Opaque market tag used to cluster correlated positions
    pub market: String,
}

impl Asset {
    /// Create an asset whose id equals its symbol.
    pub fn new(
        symbol: impl Into<String>,
        venue: impl Into<String>,
        market: impl Into<String>,
    ) -> Self {
        let symbol = symbol.into();
        Self {
            id: symbol.clone(),
            name: symbol.clone(),
            symbol,
            venue: venue.into(),
            currency: "USD".to_string(),
            market: market.into(),
        }
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the quote currency.
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }
}

/// A real-time quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub asset_id: String,
    /// Best bid price
    pub bid: Decimal,
    /// Best ask price
    pub ask: Decimal,
    /// Last traded price
    pub last: Decimal,
    /// Volume traded in the current session
    pub volume: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    /// Get the mid price.
    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }

    /// Get the spread.
    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }

    /// Spread as a fraction of the mid price.
    pub fn spread_ratio(&self) -> Decimal {
        let mid = self.mid();
        if mid.is_zero() {
            Decimal::ZERO
        } else {
            self.spread() / mid
        }
    }
}

/// One price level of an order book.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

/// Aggregated order book snapshot, best levels first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBook {
    pub asset_id: String,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
    pub timestamp: DateTime<Utc>,
}

impl OrderBook {
    pub fn best_bid(&self) -> Option<&BookLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&BookLevel> {
        self.asks.first()
    }
}

/// Broker connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}
