//! Synthetic market for one asset: a bounded random walk and the candle
//! history it leaves behind.

use chrono::{DateTime, Utc};
use num_traits::{FromPrimitive, ToPrimitive};
use rand::rngs::StdRng;
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use trading_core::{
    round_price, Asset, BookLevel, Candle, CandleSeries, OrderBook, Quote, Timeframe,
};

/// Largest single-step move of the walk, as a fraction of price.
pub(crate) const MAX_STEP: f64 = 0.005;

/// Resolution of the generated history.
pub(crate) const BASE_TIMEFRAME: Timeframe = Timeframe::Minute5;

const MIN_PRICE: Decimal = dec!(0.00000001);

pub(crate) struct SyntheticMarket {
    pub asset: Asset,
    pub price: Decimal,
    pub session_volume: Decimal,
    history: CandleSeries,
}

impl SyntheticMarket {
    /// Seed a market whose generated history ends exactly at `price`.
    pub fn seeded(
        asset: Asset,
        price: Decimal,
        history_len: usize,
        now: DateTime<Utc>,
        rng: &mut StdRng,
    ) -> Self {
        let step_ms = BASE_TIMEFRAME.as_millis();
        let last_open = now.timestamp_millis() / step_ms * step_ms;
        let last_close = price.to_f64().unwrap_or_default();

        // Walk backwards from the seed price so the newest close matches it.
        let mut closes = vec![last_close; history_len.max(1)];
        for i in (0..closes.len().saturating_sub(1)).rev() {
            let step: f64 = rng.gen_range(-MAX_STEP..=MAX_STEP);
            closes[i] = closes[i + 1] / (1.0 + step);
        }

        let mut history =
            CandleSeries::with_capacity(asset.id.clone(), BASE_TIMEFRAME, history_len.max(1));
        let mut prev_close = closes[0] * (1.0 + rng.gen_range(-MAX_STEP..=MAX_STEP));
        let count = closes.len() as i64;
        for (i, close) in closes.into_iter().enumerate() {
            let ts = last_open - (count - 1 - i as i64) * step_ms;
            history.push(synthetic_candle(ts, prev_close, close, rng));
            prev_close = close;
        }

        Self {
            asset,
            price,
            session_volume: Decimal::ZERO,
            history,
        }
    }

    /// Advance the walk one step and record the move as a new candle.
    pub fn step(&mut self, now: DateTime<Utc>, rng: &mut StdRng) -> Decimal {
        let change: f64 = rng.gen_range(-MAX_STEP..=MAX_STEP);
        let factor = Decimal::from_f64(1.0 + change).unwrap_or(Decimal::ONE);
        let next = round_price(self.price * factor).max(MIN_PRICE);
        self.set_price(next, now, rng);
        next
    }

    /// Jump to `price` and record the move as a new candle.
    pub fn set_price(&mut self, price: Decimal, now: DateTime<Utc>, rng: &mut StdRng) {
        let open = self.price.to_f64().unwrap_or_default();
        let close = price.to_f64().unwrap_or_default();
        let ts = self
            .history
            .last()
            .map(|c| c.timestamp + BASE_TIMEFRAME.as_millis())
            .unwrap_or_else(|| now.timestamp_millis());
        let candle = synthetic_candle(ts, open, close, rng);
        self.session_volume += Decimal::from_f64(candle.volume).unwrap_or_default();
        self.history.push(candle);
        self.price = price;
    }

    pub fn quote(&self, spread_bps: Decimal, now: DateTime<Utc>) -> Quote {
        let half = round_price(self.price * spread_bps / dec!(20000));
        Quote {
            asset_id: self.asset.id.clone(),
            bid: self.price - half,
            ask: self.price + half,
            last: self.price,
            volume: self.session_volume,
            timestamp: now,
        }
    }

    /// Synthetic depth: levels one basis point apart, size growing with distance.
    pub fn order_book(&self, depth: usize, now: DateTime<Utc>) -> OrderBook {
        let tick = (self.price / dec!(10000)).max(MIN_PRICE);
        let level = |i: usize, sign: Decimal| BookLevel {
            price: round_price(self.price + sign * tick * Decimal::from(i + 1)),
            quantity: Decimal::from(100 * (i + 1)),
        };
        OrderBook {
            asset_id: self.asset.id.clone(),
            bids: (0..depth).map(|i| level(i, Decimal::NEGATIVE_ONE)).collect(),
            asks: (0..depth).map(|i| level(i, Decimal::ONE)).collect(),
            timestamp: now,
        }
    }

    /// Newest `limit` candles at `timeframe`, oldest first.
    ///
    /// Coarser timeframes are aggregated from the base history; finer ones
    /// are served at base resolution.
    pub fn candles(&self, timeframe: Timeframe, limit: usize) -> Vec<Candle> {
        let factor = timeframe.multiple_of(BASE_TIMEFRAME);
        if factor == 1 {
            return self.history.last_n(limit);
        }

        let base: Vec<Candle> = self.history.iter().copied().collect();
        let skip = base.len() % factor;
        let mut out: Vec<Candle> = base[skip..]
            .chunks(factor)
            .map(|group| {
                let first = group[0];
                let last = group[group.len() - 1];
                Candle::new(
                    first.timestamp,
                    first.open,
                    group.iter().map(|c| c.high).fold(f64::MIN, f64::max),
                    group.iter().map(|c| c.low).fold(f64::MAX, f64::min),
                    last.close,
                    group.iter().map(|c| c.volume).sum(),
                )
            })
            .collect();
        if out.len() > limit {
            out.drain(..out.len() - limit);
        }
        out
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}

fn synthetic_candle(ts: i64, open: f64, close: f64, rng: &mut StdRng) -> Candle {
    let wick_up: f64 = rng.gen_range(0.0..0.002);
    let wick_down: f64 = rng.gen_range(0.0..0.002);
    let volume: f64 = rng.gen_range(1_000.0..5_000.0);
    Candle::new(
        ts,
        open,
        open.max(close) * (1.0 + wick_up),
        open.min(close) * (1.0 - wick_down),
        close,
        volume.round(),
    )
}
