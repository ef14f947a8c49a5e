//! Position and account types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::Side;

/// A holding in a single asset, as reported by the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub asset_id: String,
    pub symbol: String,
    /// Market tag copied from the asset, used for correlation clustering
    pub market: String,
    /// Positive for long, negative for short
    pub quantity: Decimal,
    pub avg_entry_price: Decimal,
    pub current_price: Decimal,
    /// quantity * current_price
    pub market_value: Decimal,
    /// quantity * avg_entry_price
    pub cost_basis: Decimal,
    pub unrealized_pnl: Decimal,
    /// Realized profit/loss from closed portions
    pub realized_pnl: Decimal,
}

impl Position {
    pub fn new(asset_id: impl Into<String>, quantity: Decimal, avg_entry_price: Decimal) -> Self {
        let asset_id = asset_id.into();
        Self {
            symbol: asset_id.clone(),
            asset_id,
            market: String::new(),
            quantity,
            avg_entry_price,
            current_price: avg_entry_price,
            market_value: quantity * avg_entry_price,
            cost_basis: quantity * avg_entry_price,
            unrealized_pnl: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
        }
    }

    pub fn with_market(mut self, market: impl Into<String>) -> Self {
        self.market = market.into();
        self
    }

    pub fn is_long(&self) -> bool {
        self.quantity > Decimal::ZERO
    }

    pub fn is_short(&self) -> bool {
        self.quantity < Decimal::ZERO
    }

    pub fn is_flat(&self) -> bool {
        self.quantity.is_zero()
    }

    pub fn abs_quantity(&self) -> Decimal {
        self.quantity.abs()
    }

    /// The side of the order that would flatten this position.
    pub fn closing_side(&self) -> Side {
        if self.is_short() {
            Side::Buy
        } else {
            Side::Sell
        }
    }

    /// Mark to a new price.
    pub fn update_price(&mut self, price: Decimal) {
        self.current_price = price;
        self.market_value = self.quantity * price;
        self.unrealized_pnl = self.market_value - self.cost_basis;
    }

    /// Apply an execution. Returns the realized P&L when the position shrinks.
    pub fn apply_fill(&mut self, side: Side, quantity: Decimal, price: Decimal) -> Decimal {
        let signed_qty = side.sign() * quantity;
        let mut realized = Decimal::ZERO;

        let adds_exposure = self.quantity.is_zero()
            || (self.quantity > Decimal::ZERO) == (signed_qty > Decimal::ZERO);

        if adds_exposure {
            let total_cost = self.quantity * self.avg_entry_price + signed_qty * price;
            let new_quantity = self.quantity + signed_qty;
            if !new_quantity.is_zero() {
                self.avg_entry_price = total_cost / new_quantity;
            }
            self.quantity = new_quantity;
        } else {
            let closed = quantity.min(self.quantity.abs());
            realized = if self.is_long() {
                closed * (price - self.avg_entry_price)
            } else {
                closed * (self.avg_entry_price - price)
            };
            self.realized_pnl += realized;

            let leftover = quantity - closed;
            if leftover > Decimal::ZERO {
                // Flipped through zero: the remainder opens at the fill price.
                self.quantity = side.sign() * leftover;
                self.avg_entry_price = price;
            } else {
                self.quantity += signed_qty;
            }
        }

        self.cost_basis = self.quantity * self.avg_entry_price;
        self.update_price(price);
        realized
    }
}

/// Account snapshot: cash, buying power and positions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub cash: Decimal,
    /// May differ from cash on margin accounts
    pub buying_power: Decimal,
    /// cash + market value of positions
    pub equity: Decimal,
    /// Positions keyed by asset id
    pub positions: HashMap<String, Position>,
    pub total_unrealized_pnl: Decimal,
    pub total_realized_pnl: Decimal,
    pub initial_capital: Decimal,
    pub peak_equity: Decimal,
}

impl Portfolio {
    pub fn new(initial_capital: Decimal) -> Self {
        Self {
            cash: initial_capital,
            buying_power: initial_capital,
            equity: initial_capital,
            positions: HashMap::new(),
            total_unrealized_pnl: Decimal::ZERO,
            total_realized_pnl: Decimal::ZERO,
            initial_capital,
            peak_equity: initial_capital,
        }
    }

    pub fn position(&self, asset_id: &str) -> Option<&Position> {
        self.positions.get(asset_id)
    }

    pub fn has_position(&self, asset_id: &str) -> bool {
        self.positions
            .get(asset_id)
            .map(|p| !p.is_flat())
            .unwrap_or(false)
    }

    /// Absolute market value held in one asset.
    pub fn exposure(&self, asset_id: &str) -> Decimal {
        self.positions
            .get(asset_id)
            .map(|p| p.market_value.abs())
            .unwrap_or(Decimal::ZERO)
    }

    /// Gross market value across all positions.
    pub fn gross_exposure(&self) -> Decimal {
        self.positions.values().map(|p| p.market_value.abs()).sum()
    }

    pub fn position_count(&self) -> usize {
        self.positions.values().filter(|p| !p.is_flat()).count()
    }

    /// Recompute equity, unrealized P&L and the peak.
    pub fn update_equity(&mut self) {
        let market_value: Decimal = self.positions.values().map(|p| p.market_value).sum();
        self.equity = self.cash + market_value;
        self.total_unrealized_pnl = self.positions.values().map(|p| p.unrealized_pnl).sum();
        if self.equity > self.peak_equity {
            self.peak_equity = self.equity;
        }
    }

    /// Drawdown from peak as a fraction (0.1 = 10%).
    pub fn drawdown(&self) -> Decimal {
        if self.peak_equity <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        ((self.peak_equity - self.equity) / self.peak_equity).max(Decimal::ZERO)
    }

    /// Total return as a fraction of initial capital.
    pub fn total_return(&self) -> Decimal {
        if self.initial_capital.is_zero() {
            return Decimal::ZERO;
        }
        (self.equity - self.initial_capital) / self.initial_capital
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_position_mark_to_market() {
        let mut position = Position::new("AAPL", dec!(100), dec!(150.00));
        assert!(position.is_long());
        assert_eq!(position.closing_side(), Side::Sell);

        position.update_price(dec!(160.00));
        assert_eq!(position.market_value, dec!(16000.00));
        assert_eq!(position.unrealized_pnl, dec!(1000.00));
    }

    #[test]
    fn test_apply_fill_averages_entry() {
        let mut position = Position::new("AAPL", dec!(100), dec!(150.00));
        let realized = position.apply_fill(Side::Buy, dec!(100), dec!(160.00));
        assert_eq!(realized, Decimal::ZERO);
        assert_eq!(position.quantity, dec!(200));
        assert_eq!(position.avg_entry_price, dec!(155.00));
    }

    #[test]
    fn test_apply_fill_close_realizes_pnl() {
        let mut position = Position::new("AAPL", dec!(100), dec!(150.00));
        let realized = position.apply_fill(Side::Sell, dec!(100), dec!(160.00));
        assert_eq!(realized, dec!(1000.00));
        assert!(position.is_flat());
    }

    #[test]
    fn test_apply_fill_flips_short() {
        let mut position = Position::new("AAPL", dec!(10), dec!(100));
        let realized = position.apply_fill(Side::Sell, dec!(15), dec!(90));
        assert_eq!(realized, dec!(-100));
        assert_eq!(position.quantity, dec!(-5));
        assert_eq!(position.avg_entry_price, dec!(90));
        assert_eq!(position.closing_side(), Side::Buy);
    }

    #[test]
    fn test_portfolio_drawdown_fraction() {
        let mut portfolio = Portfolio::new(dec!(100000));
        portfolio.peak_equity = dec!(110000);
        portfolio.equity = dec!(99000);
        assert_eq!(portfolio.drawdown(), dec!(0.1));
    }

    #[test]
    fn test_portfolio_exposure() {
        let mut portfolio = Portfolio::new(dec!(100000));
        portfolio
            .positions
            .insert("AAPL".into(), Position::new("AAPL", dec!(10), dec!(100)));
        portfolio
            .positions
            .insert("TSLA".into(), Position::new("TSLA", dec!(-5), dec!(200)));
        assert_eq!(portfolio.exposure("AAPL"), dec!(1000));
        assert_eq!(portfolio.gross_exposure(), dec!(2000));
        assert_eq!(portfolio.position_count(), 2);
        assert!(!portfolio.has_position("MSFT"));
    }
}
