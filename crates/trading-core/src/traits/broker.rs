//! Broker trait definition.

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::BrokerError;
use crate::types::{
    Asset, Candle, ConnectionStatus, ModifyOrderRequest, Order, OrderBook, OrderRequest,
    Portfolio, Position, Quote, Timeframe,
};

/// Abstract venue contract.
///
/// Every call is independent: a failure of one says nothing about the next.
/// Live and simulated implementations satisfy it identically.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Get the broker name.
    fn name(&self) -> &str;

    async fn connect(&self) -> Result<(), BrokerError>;

    async fn disconnect(&self) -> Result<(), BrokerError>;

    fn connection_status(&self) -> ConnectionStatus;

    /// Account snapshot including positions.
    async fn get_account(&self) -> Result<Portfolio, BrokerError>;

    /// Available cash.
    async fn get_balance(&self) -> Result<Decimal, BrokerError> {
        let account = self.get_account().await?;
        Ok(account.cash)
    }

    async fn get_positions(&self) -> Result<Vec<Position>, BrokerError>;

    /// Position in one asset, if any.
    async fn get_position(&self, asset_id: &str) -> Result<Option<Position>, BrokerError> {
        let positions = self.get_positions().await?;
        Ok(positions.into_iter().find(|p| p.asset_id == asset_id))
    }

    async fn get_quote(&self, asset_id: &str) -> Result<Quote, BrokerError>;

    /// Quotes for several assets, fetched one after another.
    async fn get_quotes(&self, asset_ids: &[String]) -> Result<Vec<Quote>, BrokerError> {
        let mut quotes = Vec::with_capacity(asset_ids.len());
        for asset_id in asset_ids {
            quotes.push(self.get_quote(asset_id).await?);
        }
        Ok(quotes)
    }

    /// Stream quote updates for the given assets.
    async fn subscribe_quotes(
        &self,
        asset_ids: &[String],
    ) -> Result<mpsc::Receiver<Quote>, BrokerError>;

    async fn get_order_book(&self, asset_id: &str, depth: usize) -> Result<OrderBook, BrokerError>;

    /// Most recent `limit` candles, oldest first.
    async fn get_candles(
        &self,
        asset_id: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>, BrokerError>;

    async fn place_order(&self, request: OrderRequest) -> Result<Order, BrokerError>;

    async fn cancel_order(&self, order_id: Uuid) -> Result<(), BrokerError>;

    async fn modify_order(
        &self,
        order_id: Uuid,
        changes: ModifyOrderRequest,
    ) -> Result<Order, BrokerError>;

    async fn get_order(&self, order_id: Uuid) -> Result<Order, BrokerError>;

    /// All known orders, or only the working ones.
    async fn get_orders(&self, open_only: bool) -> Result<Vec<Order>, BrokerError>;

    /// Case-insensitive search over symbol and name.
    async fn search_assets(&self, query: &str) -> Result<Vec<Asset>, BrokerError>;

    async fn get_asset(&self, asset_id: &str) -> Result<Asset, BrokerError>;
}
