//! Order types and structures.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// +1 for buy, -1 for sell.
    pub fn sign(&self) -> Decimal {
        match self {
            Side::Buy => Decimal::ONE,
            Side::Sell => -Decimal::ONE,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    /// Execute immediately at the best available price
    #[default]
    Market,
    /// Execute at the limit price or better
    Limit,
    /// Becomes a market order once the stop price trades
    Stop,
    /// Becomes a limit order once the stop price trades
    StopLimit,
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderType::Market => write!(f, "MARKET"),
            OrderType::Limit => write!(f, "LIMIT"),
            OrderType::Stop => write!(f, "STOP"),
            OrderType::StopLimit => write!(f, "STOP_LIMIT"),
        }
    }
}

/// Time in force for orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimeInForce {
    /// Valid for the trading day only
    #[default]
    Day,
    /// Good til canceled
    #[serde(rename = "gtc")]
    GTC,
    /// Immediate or cancel
    #[serde(rename = "ioc")]
    IOC,
}

/// Order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created locally, not yet acknowledged
    Pending,
    /// Acknowledged and resting at the venue
    Accepted,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Canceled
                | OrderStatus::Rejected
                | OrderStatus::Expired
        )
    }

    /// Still working: can fill or be canceled.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::Accepted | OrderStatus::PartiallyFilled
        )
    }
}

/// Request to place a new order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub asset_id: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Decimal,
    /// Limit price (limit and stop-limit orders)
    pub limit_price: Option<Decimal>,
    /// Stop price (stop and stop-limit orders)
    pub stop_price: Option<Decimal>,
    pub time_in_force: TimeInForce,
    pub client_order_id: Option<String>,
}

impl OrderRequest {
    pub fn market(asset_id: impl Into<String>, side: Side, quantity: Decimal) -> Self {
        Self {
            asset_id: asset_id.into(),
            side,
            order_type: OrderType::Market,
            quantity,
            limit_price: None,
            stop_price: None,
            time_in_force: TimeInForce::Day,
            client_order_id: None,
        }
    }

    pub fn limit(
        asset_id: impl Into<String>,
        side: Side,
        quantity: Decimal,
        limit_price: Decimal,
    ) -> Self {
        Self {
            order_type: OrderType::Limit,
            limit_price: Some(limit_price),
            ..Self::market(asset_id, side, quantity)
        }
    }

    pub fn stop(
        asset_id: impl Into<String>,
        side: Side,
        quantity: Decimal,
        stop_price: Decimal,
    ) -> Self {
        Self {
            order_type: OrderType::Stop,
            stop_price: Some(stop_price),
            time_in_force: TimeInForce::GTC,
            ..Self::market(asset_id, side, quantity)
        }
    }

    pub fn with_time_in_force(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = tif;
        self
    }

    pub fn with_client_order_id(mut self, id: impl Into<String>) -> Self {
        self.client_order_id = Some(id.into());
        self
    }

    /// Same request with a different quantity (used when splitting orders).
    pub fn with_quantity(&self, quantity: Decimal) -> Self {
        Self {
            quantity,
            ..self.clone()
        }
    }

    /// Reject malformed requests before they reach a broker.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.asset_id.trim().is_empty() {
            return Err(ValidationError::MissingAsset);
        }
        if self.quantity <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveQuantity(self.quantity));
        }
        let positive = |p: Option<Decimal>| p.is_some_and(|v| v > Decimal::ZERO);
        match self.order_type {
            OrderType::Market => {}
            OrderType::Limit => {
                if !positive(self.limit_price) {
                    return Err(ValidationError::MissingPrice {
                        order_type: self.order_type.to_string(),
                        field: "limit_price",
                    });
                }
            }
            OrderType::Stop => {
                if !positive(self.stop_price) {
                    return Err(ValidationError::MissingPrice {
                        order_type: self.order_type.to_string(),
                        field: "stop_price",
                    });
                }
            }
            OrderType::StopLimit => {
                if !positive(self.stop_price) {
                    return Err(ValidationError::MissingPrice {
                        order_type: self.order_type.to_string(),
                        field: "stop_price",
                    });
                }
                if !positive(self.limit_price) {
                    return Err(ValidationError::MissingPrice {
                        order_type: self.order_type.to_string(),
                        field: "limit_price",
                    });
                }
            }
        }
        Ok(())
    }
}

/// Changes to a working order. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModifyOrderRequest {
    pub quantity: Option<Decimal>,
    pub limit_price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
}

/// A partial or complete execution of an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub id: Uuid,
    pub order_id: Uuid,
    pub asset_id: String,
    pub side: Side,
    pub quantity: Decimal,
    pub price: Decimal,
    pub commission: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Order with status and fill information, as reported by a broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub client_order_id: String,
    pub asset_id: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub limit_price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub time_in_force: TimeInForce,
    pub status: OrderStatus,
    pub filled_quantity: Decimal,
    pub filled_avg_price: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub filled_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Create a pending order from a request.
    pub fn from_request(request: &OrderRequest) -> Self {
        let now = Utc::now();
        let id = Uuid::new_v4();
        Self {
            id,
            client_order_id: request
                .client_order_id
                .clone()
                .unwrap_or_else(|| id.to_string()),
            asset_id: request.asset_id.clone(),
            side: request.side,
            order_type: request.order_type,
            quantity: request.quantity,
            limit_price: request.limit_price,
            stop_price: request.stop_price,
            time_in_force: request.time_in_force,
            status: OrderStatus::Pending,
            filled_quantity: Decimal::ZERO,
            filled_avg_price: None,
            created_at: now,
            updated_at: now,
            filled_at: None,
            canceled_at: None,
        }
    }

    pub fn remaining_quantity(&self) -> Decimal {
        self.quantity - self.filled_quantity
    }

    pub fn is_filled(&self) -> bool {
        self.status == OrderStatus::Filled
    }

    /// Notional value of what has been filled so far.
    pub fn filled_value(&self) -> Option<Decimal> {
        self.filled_avg_price.map(|price| price * self.filled_quantity)
    }

    /// Apply an execution and advance the status.
    pub fn add_fill(&mut self, fill: &Fill) {
        let total_qty = self.filled_quantity + fill.quantity;
        if total_qty.is_zero() {
            return;
        }
        let total_value = self.filled_avg_price.unwrap_or(Decimal::ZERO) * self.filled_quantity
            + fill.price * fill.quantity;

        self.filled_avg_price = Some(total_value / total_qty);
        self.filled_quantity = total_qty;
        self.updated_at = fill.timestamp;

        if self.filled_quantity >= self.quantity {
            self.status = OrderStatus::Filled;
            self.filled_at = Some(fill.timestamp);
        } else {
            self.status = OrderStatus::PartiallyFilled;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fill(order: &Order, quantity: Decimal, price: Decimal) -> Fill {
        Fill {
            id: Uuid::new_v4(),
            order_id: order.id,
            asset_id: order.asset_id.clone(),
            side: order.side,
            quantity,
            price,
            commission: Decimal::ZERO,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_validate_rejects_malformed_requests() {
        let missing = OrderRequest::market("  ", Side::Buy, dec!(10));
        assert_eq!(missing.validate(), Err(ValidationError::MissingAsset));

        let zero = OrderRequest::market("AAPL", Side::Buy, dec!(0));
        assert_eq!(zero.validate(), Err(ValidationError::NonPositiveQuantity(dec!(0))));

        let mut limit = OrderRequest::limit("AAPL", Side::Buy, dec!(10), dec!(150));
        assert!(limit.validate().is_ok());
        limit.limit_price = None;
        assert!(matches!(
            limit.validate(),
            Err(ValidationError::MissingPrice { field: "limit_price", .. })
        ));

        let stop = OrderRequest::stop("AAPL", Side::Sell, dec!(10), dec!(-1));
        assert!(stop.validate().is_err());
    }

    #[test]
    fn test_order_from_request_uses_client_id() {
        let request =
            OrderRequest::market("AAPL", Side::Buy, dec!(100)).with_client_order_id("abc");
        let order = Order::from_request(&request);

        assert_eq!(order.client_order_id, "abc");
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.remaining_quantity(), dec!(100));
    }

    #[test]
    fn test_order_add_fill_averages_price() {
        let request = OrderRequest::market("AAPL", Side::Buy, dec!(100));
        let mut order = Order::from_request(&request);

        let first = fill(&order, dec!(50), dec!(150.00));
        order.add_fill(&first);
        assert_eq!(order.status, OrderStatus::PartiallyFilled);

        let second = fill(&order, dec!(50), dec!(152.00));
        order.add_fill(&second);
        assert_eq!(order.filled_quantity, dec!(100));
        assert_eq!(order.filled_avg_price, Some(dec!(151.00)));
        assert!(order.is_filled());
        assert_eq!(order.filled_value(), Some(dec!(15100.00)));
    }

    #[test]
    fn test_with_quantity_keeps_other_fields() {
        let request = OrderRequest::limit("AAPL", Side::Sell, dec!(100), dec!(150));
        let chunk = request.with_quantity(dec!(40));
        assert_eq!(chunk.quantity, dec!(40));
        assert_eq!(chunk.limit_price, Some(dec!(150)));
        assert_eq!(chunk.side, Side::Sell);
    }
}
