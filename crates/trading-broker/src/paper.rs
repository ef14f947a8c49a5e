//! Paper trading broker for simulation and tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use trading_core::{
    round_price, Asset, Broker, BrokerError, Candle, ConnectionStatus, Fill, ModifyOrderRequest,
    Order, OrderBook, OrderRequest, OrderStatus, OrderType, Portfolio, Position, Quote, Side,
    Timeframe,
};

use crate::market::SyntheticMarket;

const BROKER_NAME: &str = "paper";
const FILL_CHANNEL_CAPACITY: usize = 256;
const QUOTE_CHANNEL_CAPACITY: usize = 256;

/// Paper broker settings. Also the `[paper]` section of the app config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperBrokerConfig {
    pub initial_capital: Decimal,
    /// Seed for the price walk; `None` draws one from the OS
    pub seed: Option<u64>,
    /// Simulated round-trip latency per call
    pub latency_ms: u64,
    /// Delay between acceptance and fill; zero fills before `place_order` returns
    pub fill_delay_ms: u64,
    /// Adverse slippage applied to market and stop fills, in basis points
    pub slippage_bps: Decimal,
    /// Quoted bid/ask spread, in basis points
    pub spread_bps: Decimal,
    pub commission_per_share: Decimal,
    /// Candles of synthetic history kept per asset
    pub history_len: usize,
    /// Assets listed when the broker is built
    pub assets: Vec<ListedAsset>,
}

impl Default for PaperBrokerConfig {
    fn default() -> Self {
        Self {
            initial_capital: dec!(100000),
            seed: None,
            latency_ms: 20,
            fill_delay_ms: 100,
            slippage_bps: dec!(5),
            spread_bps: dec!(2),
            commission_per_share: Decimal::ZERO,
            history_len: 200,
            assets: Vec::new(),
        }
    }
}

/// A paper asset and the price its synthetic history ends at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListedAsset {
    pub symbol: String,
    /// Market tag used for correlation clustering
    #[serde(default = "default_market")]
    pub market: String,
    pub price: Decimal,
}

fn default_market() -> String {
    "equity".to_string()
}

impl ListedAsset {
    pub fn to_asset(&self) -> Asset {
        Asset::new(self.symbol.clone(), BROKER_NAME.to_uppercase(), self.market.clone())
    }
}

/// Builder for [`PaperBroker`].
#[derive(Debug, Clone, Default)]
pub struct PaperBrokerBuilder {
    config: PaperBrokerConfig,
    assets: Vec<(Asset, Decimal)>,
}

impl PaperBrokerBuilder {
    pub fn from_config(config: PaperBrokerConfig) -> Self {
        Self {
            config,
            assets: Vec::new(),
        }
    }

    pub fn initial_capital(mut self, capital: Decimal) -> Self {
        self.config.initial_capital = capital;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn latency(mut self, latency: Duration) -> Self {
        self.config.latency_ms = latency.as_millis() as u64;
        self
    }

    pub fn fill_delay(mut self, delay: Duration) -> Self {
        self.config.fill_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn slippage_bps(mut self, bps: Decimal) -> Self {
        self.config.slippage_bps = bps;
        self
    }

    pub fn commission_per_share(mut self, commission: Decimal) -> Self {
        self.config.commission_per_share = commission;
        self
    }

    pub fn history_len(mut self, len: usize) -> Self {
        self.config.history_len = len;
        self
    }

    /// List an asset whose synthetic history ends at `price`.
    pub fn with_asset(mut self, asset: Asset, price: Decimal) -> Self {
        self.assets.push((asset, price));
        self
    }

    pub fn build(self) -> PaperBroker {
        let rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut ledger = Ledger {
            portfolio: Portfolio::new(self.config.initial_capital),
            orders: HashMap::new(),
            markets: BTreeMap::new(),
            rng,
        };
        let now = Utc::now();
        let listed = self.config.assets.iter().map(|l| (l.to_asset(), l.price));
        for (asset, price) in listed.chain(self.assets) {
            ledger.list(asset, price, self.config.history_len, now);
        }

        let (fills, _) = broadcast::channel(FILL_CHANNEL_CAPACITY);
        PaperBroker {
            shared: Arc::new(Shared {
                config: self.config,
                status: Mutex::new(ConnectionStatus::Disconnected),
                ledger: Mutex::new(ledger),
                fills,
                quote_subscribers: Mutex::new(Vec::new()),
            }),
        }
    }
}

struct QuoteSubscriber {
    assets: HashSet<String>,
    tx: mpsc::Sender<Quote>,
}

struct Shared {
    config: PaperBrokerConfig,
    status: Mutex<ConnectionStatus>,
    ledger: Mutex<Ledger>,
    fills: broadcast::Sender<Fill>,
    quote_subscribers: Mutex<Vec<QuoteSubscriber>>,
}

/// In-memory venue. Cheap to clone; clones share one ledger.
#[derive(Clone)]
pub struct PaperBroker {
    shared: Arc<Shared>,
}

impl PaperBroker {
    pub fn builder() -> PaperBrokerBuilder {
        PaperBrokerBuilder::default()
    }

    pub fn config(&self) -> &PaperBrokerConfig {
        &self.shared.config
    }

    /// List a new asset at runtime.
    pub fn add_asset(&self, asset: Asset, price: Decimal) {
        let history_len = self.shared.config.history_len;
        self.ledger().list(asset, price, history_len, Utc::now());
    }

    /// Receive every fill as it happens.
    pub fn subscribe_fills(&self) -> broadcast::Receiver<Fill> {
        self.shared.fills.subscribe()
    }

    /// Advance every price walk one step, publish quotes and fill resting
    /// orders that became marketable.
    pub fn tick(&self) -> Vec<Fill> {
        let now = Utc::now();
        let (quotes, fills) = {
            let mut ledger = self.ledger();
            ledger.step_markets(now);
            let quotes = ledger.quotes(self.shared.config.spread_bps, now);
            let fills = ledger.fill_resting(&self.shared.config, now);
            (quotes, fills)
        };
        self.publish(&quotes, &fills);
        fills
    }

    /// Move one asset to `price` outright, as a gap or a crash would.
    pub fn set_price(&self, asset_id: &str, price: Decimal) -> Result<Vec<Fill>, BrokerError> {
        if price <= Decimal::ZERO {
            return Err(BrokerError::ApiError(format!("invalid price {}", price)));
        }
        let now = Utc::now();
        let (quotes, fills) = {
            let mut ledger = self.ledger();
            ledger.jump(asset_id, price, now)?;
            let quotes = ledger.quotes(self.shared.config.spread_bps, now);
            let fills = ledger.fill_resting(&self.shared.config, now);
            (quotes, fills)
        };
        self.publish(&quotes, &fills);
        Ok(fills)
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.shared.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn status(&self) -> MutexGuard<'_, ConnectionStatus> {
        self.shared.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn simulate_latency(&self) {
        if self.shared.config.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.shared.config.latency_ms)).await;
        }
    }

    fn ensure_connected(&self) -> Result<(), BrokerError> {
        if self.status().is_connected() {
            Ok(())
        } else {
            Err(BrokerError::NotConnected(BROKER_NAME.to_string()))
        }
    }

    fn publish(&self, quotes: &[Quote], fills: &[Fill]) {
        if !quotes.is_empty() {
            let mut subscribers = self
                .shared
                .quote_subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            subscribers.retain(|sub| !sub.tx.is_closed());
            for sub in subscribers.iter() {
                for quote in quotes.iter().filter(|q| sub.assets.contains(&q.asset_id)) {
                    // A full subscriber misses this quote; the next tick supersedes it.
                    let _ = sub.tx.try_send(quote.clone());
                }
            }
        }
        for fill in fills {
            // No receivers is fine.
            let _ = self.shared.fills.send(fill.clone());
        }
    }

    /// Fill an accepted order against the current price if it is marketable.
    fn try_fill(&self, order_id: Uuid) -> Result<Option<Fill>, BrokerError> {
        let fill = {
            let mut ledger = self.ledger();
            ledger.fill_if_marketable(order_id, &self.shared.config, Utc::now())?
        };
        if let Some(fill) = &fill {
            self.publish(&[], std::slice::from_ref(fill));
        }
        Ok(fill)
    }
}

struct Ledger {
    portfolio: Portfolio,
    orders: HashMap<Uuid, Order>,
    markets: BTreeMap<String, SyntheticMarket>,
    rng: StdRng,
}

impl Ledger {
    fn list(&mut self, asset: Asset, price: Decimal, history_len: usize, now: DateTime<Utc>) {
        let id = asset.id.clone();
        let market = SyntheticMarket::seeded(asset, price, history_len, now, &mut self.rng);
        debug!(asset = %id, %price, "Listed paper asset");
        self.markets.insert(id, market);
        self.mark_to_market();
    }

    fn market(&self, asset_id: &str) -> Result<&SyntheticMarket, BrokerError> {
        self.markets
            .get(asset_id)
            .ok_or_else(|| BrokerError::AssetNotFound(asset_id.to_string()))
    }

    fn step_markets(&mut self, now: DateTime<Utc>) {
        for market in self.markets.values_mut() {
            market.step(now, &mut self.rng);
        }
        self.mark_to_market();
    }

    fn jump(
        &mut self,
        asset_id: &str,
        price: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(), BrokerError> {
        let market = self
            .markets
            .get_mut(asset_id)
            .ok_or_else(|| BrokerError::AssetNotFound(asset_id.to_string()))?;
        market.set_price(price, now, &mut self.rng);
        self.mark_to_market();
        Ok(())
    }

    fn quotes(&self, spread_bps: Decimal, now: DateTime<Utc>) -> Vec<Quote> {
        self.markets.values().map(|m| m.quote(spread_bps, now)).collect()
    }

    fn mark_to_market(&mut self) {
        for position in self.portfolio.positions.values_mut() {
            if let Some(market) = self.markets.get(&position.asset_id) {
                position.update_price(market.price);
            }
        }
        self.portfolio.buying_power = self.portfolio.cash.max(Decimal::ZERO);
        self.portfolio.update_equity();
    }

    /// Price an order would fill at right now, or `None` if it would rest.
    fn fill_price(order: &Order, price: Decimal, slippage_bps: Decimal) -> Option<Decimal> {
        let slipped = slip(order.side, price, slippage_bps);
        match (order.order_type, order.side) {
            (OrderType::Market, _) => Some(slipped),
            (OrderType::Limit, Side::Buy) => {
                order.limit_price.filter(|l| price <= *l).map(|l| price.min(l))
            }
            (OrderType::Limit, Side::Sell) => {
                order.limit_price.filter(|l| price >= *l).map(|l| price.max(l))
            }
            (OrderType::Stop, Side::Buy) => {
                order.stop_price.filter(|s| price >= *s).map(|_| slipped)
            }
            (OrderType::Stop, Side::Sell) => {
                order.stop_price.filter(|s| price <= *s).map(|_| slipped)
            }
            (OrderType::StopLimit, side) => {
                let triggered = match (side, order.stop_price) {
                    (Side::Buy, Some(stop)) => price >= stop,
                    (Side::Sell, Some(stop)) => price <= stop,
                    _ => false,
                };
                let within_limit = match (side, order.limit_price) {
                    (Side::Buy, Some(limit)) => price <= limit,
                    (Side::Sell, Some(limit)) => price >= limit,
                    _ => false,
                };
                (triggered && within_limit).then_some(price)
            }
        }
    }

    /// Cash needed up front to accept a buy.
    fn required_cash(
        request: &OrderRequest,
        price: Decimal,
        config: &PaperBrokerConfig,
    ) -> Decimal {
        let reference = match request.order_type {
            OrderType::Market => slip(Side::Buy, price, config.slippage_bps),
            OrderType::Limit | OrderType::StopLimit => request.limit_price.unwrap_or(price),
            OrderType::Stop => request.stop_price.unwrap_or(price).max(price),
        };
        request.quantity * reference + request.quantity * config.commission_per_share
    }

    fn fill_if_marketable(
        &mut self,
        order_id: Uuid,
        config: &PaperBrokerConfig,
        now: DateTime<Utc>,
    ) -> Result<Option<Fill>, BrokerError> {
        let order = self
            .orders
            .get(&order_id)
            .ok_or_else(|| BrokerError::OrderNotFound(order_id.to_string()))?;
        if !order.status.is_active() {
            return Ok(None);
        }
        let price = self.market(&order.asset_id)?.price;
        match Self::fill_price(order, price, config.slippage_bps) {
            Some(fill_price) => self.execute(order_id, fill_price, config, now).map(Some),
            None => Ok(None),
        }
    }

    fn fill_resting(&mut self, config: &PaperBrokerConfig, now: DateTime<Utc>) -> Vec<Fill> {
        let mut resting: Vec<(DateTime<Utc>, Uuid)> = self
            .orders
            .values()
            .filter(|o| o.status.is_active())
            .map(|o| (o.created_at, o.id))
            .collect();
        resting.sort();

        let mut fills = Vec::new();
        for (_, id) in resting {
            match self.fill_if_marketable(id, config, now) {
                Ok(Some(fill)) => fills.push(fill),
                Ok(None) => {}
                Err(e) => warn!(order_id = %id, error = %e, "Resting paper order rejected"),
            }
        }
        fills
    }

    /// Fill the remaining quantity of an order in full at `price`.
    fn execute(
        &mut self,
        order_id: Uuid,
        price: Decimal,
        config: &PaperBrokerConfig,
        now: DateTime<Utc>,
    ) -> Result<Fill, BrokerError> {
        let (asset_id, side, quantity) = match self.orders.get(&order_id) {
            Some(order) => (order.asset_id.clone(), order.side, order.remaining_quantity()),
            None => return Err(BrokerError::OrderNotFound(order_id.to_string())),
        };
        let commission = quantity * config.commission_per_share;

        if side == Side::Buy {
            let required = quantity * price + commission;
            if required > self.portfolio.cash {
                let available = self.portfolio.cash;
                if let Some(order) = self.orders.get_mut(&order_id) {
                    order.status = OrderStatus::Rejected;
                    order.updated_at = now;
                }
                return Err(BrokerError::InsufficientFunds { required, available });
            }
        }

        let (symbol, market) = match self.markets.get(&asset_id) {
            Some(m) => (m.asset.symbol.clone(), m.asset.market.clone()),
            None => (asset_id.clone(), String::new()),
        };
        let position = self
            .portfolio
            .positions
            .entry(asset_id.clone())
            .or_insert_with(|| {
                let mut p = Position::new(asset_id.clone(), Decimal::ZERO, Decimal::ZERO)
                    .with_market(market);
                p.symbol = symbol;
                p
            });
        let realized = position.apply_fill(side, quantity, price);
        let flat = position.is_flat();
        if flat {
            self.portfolio.positions.remove(&asset_id);
        }

        self.portfolio.cash -= side.sign() * quantity * price + commission;
        self.portfolio.total_realized_pnl += realized;

        let fill = Fill {
            id: Uuid::new_v4(),
            order_id,
            asset_id,
            side,
            quantity,
            price,
            commission,
            timestamp: now,
        };
        if let Some(order) = self.orders.get_mut(&order_id) {
            order.add_fill(&fill);
        }
        self.mark_to_market();

        info!(
            order_id = %order_id,
            asset = %fill.asset_id,
            side = %side,
            quantity = %quantity,
            price = %price,
            realized = %realized,
            "Paper fill"
        );
        Ok(fill)
    }
}

fn slip(side: Side, price: Decimal, bps: Decimal) -> Decimal {
    round_price(price * (Decimal::ONE + side.sign() * bps / dec!(10000)))
}

#[async_trait]
impl Broker for PaperBroker {
    fn name(&self) -> &str {
        BROKER_NAME
    }

    async fn connect(&self) -> Result<(), BrokerError> {
        self.simulate_latency().await;
        *self.status() = ConnectionStatus::Connected;
        info!("Paper broker connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), BrokerError> {
        *self.status() = ConnectionStatus::Disconnected;
        info!("Paper broker disconnected");
        Ok(())
    }

    fn connection_status(&self) -> ConnectionStatus {
        *self.status()
    }

    async fn get_account(&self) -> Result<Portfolio, BrokerError> {
        self.simulate_latency().await;
        self.ensure_connected()?;
        Ok(self.ledger().portfolio.clone())
    }

    async fn get_positions(&self) -> Result<Vec<Position>, BrokerError> {
        self.simulate_latency().await;
        self.ensure_connected()?;
        let mut positions: Vec<Position> =
            self.ledger().portfolio.positions.values().cloned().collect();
        positions.sort_by(|a, b| a.asset_id.cmp(&b.asset_id));
        Ok(positions)
    }

    async fn get_quote(&self, asset_id: &str) -> Result<Quote, BrokerError> {
        self.simulate_latency().await;
        self.ensure_connected()?;
        let ledger = self.ledger();
        Ok(ledger.market(asset_id)?.quote(self.shared.config.spread_bps, Utc::now()))
    }

    async fn subscribe_quotes(
        &self,
        asset_ids: &[String],
    ) -> Result<mpsc::Receiver<Quote>, BrokerError> {
        self.simulate_latency().await;
        self.ensure_connected()?;
        let (tx, rx) = mpsc::channel(QUOTE_CHANNEL_CAPACITY);
        {
            let ledger = self.ledger();
            let now = Utc::now();
            for id in asset_ids {
                let quote = ledger.market(id)?.quote(self.shared.config.spread_bps, now);
                let _ = tx.try_send(quote);
            }
        }
        self.shared
            .quote_subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(QuoteSubscriber {
                assets: asset_ids.iter().cloned().collect(),
                tx,
            });
        Ok(rx)
    }

    async fn get_order_book(&self, asset_id: &str, depth: usize) -> Result<OrderBook, BrokerError> {
        self.simulate_latency().await;
        self.ensure_connected()?;
        Ok(self.ledger().market(asset_id)?.order_book(depth, Utc::now()))
    }

    async fn get_candles(
        &self,
        asset_id: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>, BrokerError> {
        self.simulate_latency().await;
        self.ensure_connected()?;
        Ok(self.ledger().market(asset_id)?.candles(timeframe, limit))
    }

    async fn place_order(&self, request: OrderRequest) -> Result<Order, BrokerError> {
        self.simulate_latency().await;
        self.ensure_connected()?;
        request.validate()?;

        let config = &self.shared.config;
        let (order, marketable) = {
            let mut ledger = self.ledger();
            let price = ledger.market(&request.asset_id)?.price;
            if request.side == Side::Buy {
                let required = Ledger::required_cash(&request, price, config);
                if required > ledger.portfolio.cash {
                    return Err(BrokerError::InsufficientFunds {
                        required,
                        available: ledger.portfolio.cash,
                    });
                }
            }
            let mut order = Order::from_request(&request);
            order.status = OrderStatus::Accepted;
            let marketable = Ledger::fill_price(&order, price, config.slippage_bps).is_some();
            ledger.orders.insert(order.id, order.clone());
            (order, marketable)
        };
        debug!(
            order_id = %order.id,
            client_order_id = %order.client_order_id,
            asset = %order.asset_id,
            side = %order.side,
            quantity = %order.quantity,
            "Paper order accepted"
        );

        if !marketable {
            return Ok(order);
        }
        if config.fill_delay_ms == 0 {
            self.try_fill(order.id)?;
            return self
                .ledger()
                .orders
                .get(&order.id)
                .cloned()
                .ok_or_else(|| BrokerError::OrderNotFound(order.id.to_string()));
        }

        let broker = self.clone();
        let delay = Duration::from_millis(config.fill_delay_ms);
        let order_id = order.id;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = broker.try_fill(order_id) {
                warn!(order_id = %order_id, error = %e, "Delayed paper fill failed");
            }
        });
        Ok(order)
    }

    async fn cancel_order(&self, order_id: Uuid) -> Result<(), BrokerError> {
        self.simulate_latency().await;
        self.ensure_connected()?;
        let mut ledger = self.ledger();
        let order = ledger
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| BrokerError::OrderNotFound(order_id.to_string()))?;
        if order.status.is_terminal() {
            return Err(BrokerError::OrderRejected(format!(
                "order {} is already {:?}",
                order_id, order.status
            )));
        }
        let now = Utc::now();
        order.status = OrderStatus::Canceled;
        order.canceled_at = Some(now);
        order.updated_at = now;
        debug!(order_id = %order_id, "Paper order canceled");
        Ok(())
    }

    /// Amend a resting order. Marketability is re-evaluated on the next tick.
    async fn modify_order(
        &self,
        order_id: Uuid,
        changes: ModifyOrderRequest,
    ) -> Result<Order, BrokerError> {
        self.simulate_latency().await;
        self.ensure_connected()?;
        let mut ledger = self.ledger();
        let order = ledger
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| BrokerError::OrderNotFound(order_id.to_string()))?;
        if !order.status.is_active() {
            return Err(BrokerError::OrderRejected(format!(
                "order {} is {:?} and cannot be modified",
                order_id, order.status
            )));
        }
        if let Some(quantity) = changes.quantity {
            if quantity <= order.filled_quantity {
                return Err(BrokerError::OrderRejected(format!(
                    "new quantity {} does not exceed filled {}",
                    quantity, order.filled_quantity
                )));
            }
            order.quantity = quantity;
        }
        if let Some(limit) = changes.limit_price {
            if limit <= Decimal::ZERO {
                return Err(BrokerError::OrderRejected(format!("invalid limit price {}", limit)));
            }
            order.limit_price = Some(limit);
        }
        if let Some(stop) = changes.stop_price {
            if stop <= Decimal::ZERO {
                return Err(BrokerError::OrderRejected(format!("invalid stop price {}", stop)));
            }
            order.stop_price = Some(stop);
        }
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn get_order(&self, order_id: Uuid) -> Result<Order, BrokerError> {
        self.simulate_latency().await;
        self.ensure_connected()?;
        self.ledger()
            .orders
            .get(&order_id)
            .cloned()
            .ok_or_else(|| BrokerError::OrderNotFound(order_id.to_string()))
    }

    async fn get_orders(&self, open_only: bool) -> Result<Vec<Order>, BrokerError> {
        self.simulate_latency().await;
        self.ensure_connected()?;
        let mut orders: Vec<Order> = self
            .ledger()
            .orders
            .values()
            .filter(|o| !open_only || o.status.is_active())
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }

    async fn search_assets(&self, query: &str) -> Result<Vec<Asset>, BrokerError> {
        self.simulate_latency().await;
        let query = query.to_lowercase();
        Ok(self
            .ledger()
            .markets
            .values()
            .map(|m| &m.asset)
            .filter(|a| {
                a.symbol.to_lowercase().contains(&query) || a.name.to_lowercase().contains(&query)
            })
            .cloned()
            .collect())
    }

    async fn get_asset(&self, asset_id: &str) -> Result<Asset, BrokerError> {
        self.simulate_latency().await;
        Ok(self.ledger().market(asset_id)?.asset.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aapl() -> Asset {
        Asset::new("AAPL", "PAPER", "tech").with_name("Apple Inc.")
    }

    async fn broker() -> PaperBroker {
        let broker = PaperBroker::builder()
            .initial_capital(dec!(100000))
            .seed(42)
            .latency(Duration::ZERO)
            .fill_delay(Duration::ZERO)
            .slippage_bps(Decimal::ZERO)
            .with_asset(aapl(), dec!(175))
            .with_asset(Asset::new("MSFT", "PAPER", "tech"), dec!(400))
            .build();
        broker.connect().await.unwrap();
        broker
    }

    #[tokio::test]
    async fn test_requires_connection() {
        let broker = PaperBroker::builder().with_asset(aapl(), dec!(175)).build();
        let err = broker.get_quote("AAPL").await.unwrap_err();
        assert!(matches!(err, BrokerError::NotConnected(_)));
        assert_eq!(broker.connection_status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_config_lists_assets() {
        let config = PaperBrokerConfig {
            seed: Some(1),
            latency_ms: 0,
            assets: vec![ListedAsset {
                symbol: "BTC-USD".into(),
                market: "crypto".into(),
                price: dec!(60000),
            }],
            ..PaperBrokerConfig::default()
        };
        let broker = PaperBrokerBuilder::from_config(config).with_asset(aapl(), dec!(175)).build();
        broker.connect().await.unwrap();

        let btc = broker.get_asset("BTC-USD").await.unwrap();
        assert_eq!(btc.market, "crypto");
        assert_eq!(broker.get_quote("BTC-USD").await.unwrap().last, dec!(60000));
        assert!(broker.get_asset("AAPL").await.is_ok());
    }

    #[tokio::test]
    async fn test_market_buy_fills_inline() {
        let broker = broker().await;
        let mut fills = broker.subscribe_fills();

        let order = broker
            .place_order(OrderRequest::market("AAPL", Side::Buy, dec!(10)))
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.filled_avg_price, Some(dec!(175)));

        let fill = fills.recv().await.unwrap();
        assert_eq!(fill.order_id, order.id);
        assert_eq!(fill.quantity, dec!(10));

        let account = broker.get_account().await.unwrap();
        assert_eq!(account.cash, dec!(98250));
        assert_eq!(account.equity, dec!(100000));
        let position = broker.get_position("AAPL").await.unwrap().unwrap();
        assert_eq!(position.quantity, dec!(10));
        assert_eq!(position.market, "tech");
    }

    #[tokio::test]
    async fn test_slippage_is_adverse() {
        let broker = PaperBroker::builder()
            .seed(1)
            .latency(Duration::ZERO)
            .fill_delay(Duration::ZERO)
            .slippage_bps(dec!(10))
            .with_asset(aapl(), dec!(100))
            .build();
        broker.connect().await.unwrap();

        let buy = broker
            .place_order(OrderRequest::market("AAPL", Side::Buy, dec!(1)))
            .await
            .unwrap();
        assert_eq!(buy.filled_avg_price, Some(dec!(100.1)));
        let sell = broker
            .place_order(OrderRequest::market("AAPL", Side::Sell, dec!(1)))
            .await
            .unwrap();
        assert_eq!(sell.filled_avg_price, Some(dec!(99.9)));
    }

    #[tokio::test]
    async fn test_round_trip_realizes_pnl_and_removes_position() {
        let broker = broker().await;
        broker
            .place_order(OrderRequest::market("AAPL", Side::Buy, dec!(10)))
            .await
            .unwrap();
        broker.set_price("AAPL", dec!(180)).unwrap();
        broker
            .place_order(OrderRequest::market("AAPL", Side::Sell, dec!(10)))
            .await
            .unwrap();

        let account = broker.get_account().await.unwrap();
        assert_eq!(account.total_realized_pnl, dec!(50));
        assert_eq!(account.cash, dec!(100050));
        assert!(broker.get_positions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_buy_beyond_cash_is_rejected() {
        let broker = broker().await;
        let err = broker
            .place_order(OrderRequest::market("AAPL", Side::Buy, dec!(1000)))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::InsufficientFunds { .. }));
        assert!(broker.get_orders(false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_request_never_reaches_ledger() {
        let broker = broker().await;
        let err = broker
            .place_order(OrderRequest::market("AAPL", Side::Buy, Decimal::ZERO))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::InvalidOrder(_)));

        let err = broker
            .place_order(OrderRequest::market("TSLA", Side::Buy, dec!(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::AssetNotFound(_)));
    }

    #[tokio::test]
    async fn test_limit_order_rests_until_marketable() {
        let broker = broker().await;
        let order = broker
            .place_order(OrderRequest::limit("AAPL", Side::Buy, dec!(5), dec!(170)))
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Accepted);
        assert_eq!(broker.get_orders(true).await.unwrap().len(), 1);

        let fills = broker.set_price("AAPL", dec!(169.5)).unwrap();
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].price, dec!(169.5));
        assert!(broker.get_order(order.id).await.unwrap().is_filled());
        assert!(broker.get_orders(true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stop_order_triggers_on_cross() {
        let broker = broker().await;
        broker
            .place_order(OrderRequest::market("AAPL", Side::Buy, dec!(10)))
            .await
            .unwrap();
        let stop = broker
            .place_order(OrderRequest::stop("AAPL", Side::Sell, dec!(10), dec!(170)))
            .await
            .unwrap();
        assert_eq!(stop.status, OrderStatus::Accepted);

        assert!(broker.set_price("AAPL", dec!(171)).unwrap().is_empty());
        let fills = broker.set_price("AAPL", dec!(168)).unwrap();
        assert_eq!(fills.len(), 1);
        assert!(broker.get_positions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_and_modify() {
        let broker = broker().await;
        let order = broker
            .place_order(OrderRequest::limit("AAPL", Side::Buy, dec!(5), dec!(150)))
            .await
            .unwrap();

        let modified = broker
            .modify_order(
                order.id,
                ModifyOrderRequest {
                    quantity: Some(dec!(8)),
                    limit_price: Some(dec!(155)),
                    stop_price: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(modified.quantity, dec!(8));
        assert_eq!(modified.limit_price, Some(dec!(155)));

        broker.cancel_order(order.id).await.unwrap();
        assert_eq!(broker.get_order(order.id).await.unwrap().status, OrderStatus::Canceled);
        assert!(broker.cancel_order(order.id).await.is_err());
        assert!(matches!(
            broker.cancel_order(Uuid::new_v4()).await,
            Err(BrokerError::OrderNotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_fill() {
        let broker = PaperBroker::builder()
            .seed(3)
            .latency(Duration::ZERO)
            .fill_delay(Duration::from_millis(100))
            .with_asset(aapl(), dec!(175))
            .build();
        broker.connect().await.unwrap();
        let mut fills = broker.subscribe_fills();

        let order = broker
            .place_order(OrderRequest::market("AAPL", Side::Buy, dec!(1)))
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Accepted);

        let fill = fills.recv().await.unwrap();
        assert_eq!(fill.order_id, order.id);
        assert!(broker.get_order(order.id).await.unwrap().is_filled());
    }

    #[tokio::test]
    async fn test_tick_pushes_quotes_and_is_seeded() {
        let a = broker().await;
        let b = broker().await;
        let mut quotes = a.subscribe_quotes(&["AAPL".to_string()]).await.unwrap();
        let initial = quotes.recv().await.unwrap();
        assert_eq!(initial.last, dec!(175));

        for _ in 0..5 {
            a.tick();
            b.tick();
        }
        let qa = a.get_quote("AAPL").await.unwrap();
        let qb = b.get_quote("AAPL").await.unwrap();
        assert_eq!(qa.last, qb.last);

        let mut received = 0;
        while quotes.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, 5);
    }

    #[tokio::test]
    async fn test_market_data() {
        let broker = broker().await;
        let candles = broker.get_candles("AAPL", Timeframe::Minute5, 100).await.unwrap();
        assert_eq!(candles.len(), 100);
        let book = broker.get_order_book("AAPL", 5).await.unwrap();
        assert_eq!(book.bids.len(), 5);
        assert!(book.best_bid().unwrap().price < book.best_ask().unwrap().price);

        let found = broker.search_assets("apple").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(broker.get_asset("MSFT").await.unwrap().symbol, "MSFT");
        let quotes = broker
            .get_quotes(&["AAPL".to_string(), "MSFT".to_string()])
            .await
            .unwrap();
        assert_eq!(quotes.len(), 2);
    }
}
