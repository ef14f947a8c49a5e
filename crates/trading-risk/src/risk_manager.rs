//! Unified risk manager.
//!
//! Owns equity tracking, rolling P&L, the per-trade return history and the
//! circuit breakers, and runs every candidate decision through five layers:
//! per-trade, daily, period, systemic and circuit breakers.

use chrono::{DateTime, Utc};
use num_traits::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use trading_core::types::{Portfolio, RiskAssessment, Side, TradeDecision};

use crate::circuit_breaker::{BreakerKind, CircuitBreaker, CircuitBreakerEvent, CircuitBreakers};
use crate::correlation::{largest_cluster, MarketClassifier, TagClassifier};
use crate::error::RiskResult;
use crate::limits::RiskConfig;
use crate::performance::{PerformanceStats, PerformanceTracker};
use crate::pnl::PnlPeriods;
use crate::position_sizer::{
    kelly_fraction, round_quantity, PositionSizer, SizingResult, MIN_KELLY_TRADES,
};
use crate::stop_loss::{StopLevel, StopLossCalculator};

const EVENT_CAPACITY: usize = 64;
/// Positions needed before the correlation heuristic applies.
const CORRELATION_MIN_POSITIONS: usize = 3;
/// Baseline volatility smoothing.
const VOLATILITY_ALPHA: f64 = 0.1;

/// Snapshot for `pnl` / status queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PnlSummary {
    pub daily_pnl: Decimal,
    pub weekly_pnl: Decimal,
    pub monthly_pnl: Decimal,
    pub current_equity: Decimal,
    pub peak_equity: Decimal,
    /// Fraction below peak
    pub drawdown: Decimal,
    pub performance: PerformanceStats,
    pub trading_allowed: bool,
}

/// Accumulates layer output into one assessment.
#[derive(Default)]
struct Layers {
    score: f64,
    warnings: Vec<String>,
    blocks: Vec<String>,
    recommendations: Vec<String>,
}

impl Layers {
    fn warn(&mut self, score: f64, message: String) {
        self.score += score;
        self.warnings.push(message);
    }

    /// Block, or only warn when the trade reduces exposure.
    fn block(&mut self, score: f64, message: String, exempt: bool) {
        self.score += score;
        if exempt {
            self.warnings.push(message);
        } else {
            self.blocks.push(message);
        }
    }

    fn recommend(&mut self, message: impl Into<String>) {
        self.recommendations.push(message.into());
    }
}

fn pct(value: Decimal) -> String {
    format!("{:.2}%", value * Decimal::ONE_HUNDRED)
}

pub struct RiskManager {
    config: RiskConfig,
    breakers: CircuitBreakers,
    performance: PerformanceTracker,
    pnl: PnlPeriods,
    sizer: PositionSizer,
    stops: StopLossCalculator,
    classifier: Box<dyn MarketClassifier>,
    current_equity: Decimal,
    peak_equity: Decimal,
    /// Recent operation outcomes, true on success
    operations: VecDeque<bool>,
    last_prices: HashMap<String, f64>,
    volatility_baselines: HashMap<String, f64>,
    events: broadcast::Sender<CircuitBreakerEvent>,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> RiskResult<Self> {
        config.validate()?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            breakers: CircuitBreakers::new(&config.breakers),
            sizer: PositionSizer::new(
                config.kelly_multiplier,
                config.max_position_size,
                config.max_loss_per_trade,
            ),
            stops: StopLossCalculator::new(config.atr_stop_multiplier, config.fixed_stop_pct),
            performance: PerformanceTracker::new(),
            pnl: PnlPeriods::new(Utc::now()),
            classifier: Box::new(TagClassifier),
            current_equity: Decimal::ZERO,
            peak_equity: Decimal::ZERO,
            operations: VecDeque::new(),
            last_prices: HashMap::new(),
            volatility_baselines: HashMap::new(),
            events,
            config,
        })
    }

    pub fn with_classifier(mut self, classifier: Box<dyn MarketClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Breaker trips, in order.
    pub fn subscribe(&self) -> broadcast::Receiver<CircuitBreakerEvent> {
        self.events.subscribe()
    }

    pub fn update_equity(&mut self, equity: Decimal) {
        self.current_equity = equity;
        if equity > self.peak_equity {
            self.peak_equity = equity;
        }
    }

    pub fn drawdown(&self) -> Decimal {
        if self.peak_equity <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        ((self.peak_equity - self.current_equity) / self.peak_equity).max(Decimal::ZERO)
    }

    fn loss_fraction(&self, pnl: Decimal) -> Decimal {
        if self.current_equity <= Decimal::ZERO || pnl >= Decimal::ZERO {
            return Decimal::ZERO;
        }
        -pnl / self.current_equity
    }

    /// Run `decision` through the five risk layers against `portfolio`.
    pub fn assess_trade_risk(
        &mut self,
        decision: &TradeDecision,
        portfolio: &Portfolio,
        now: DateTime<Utc>,
    ) -> RiskAssessment {
        self.update_equity(portfolio.equity);
        self.pnl.roll(now);

        let mut layers = Layers::default();
        let position = portfolio.position(&decision.asset_id);
        let exempt = decision.is_risk_reducing(position);
        let equity = portfolio.equity;

        let mut quantity = decision.quantity;
        let mut adjusted_stop = None;

        if equity <= Decimal::ZERO {
            layers.block(100.0, "account has no equity".into(), false);
        } else if !exempt {
            if let (Some(side), true) = (decision.side, decision.action.is_actionable()) {
                let (q, stop) = self.per_trade_layer(&mut layers, decision, side, equity);
                quantity = q;
                adjusted_stop = stop;
            }
        }

        if equity > Decimal::ZERO {
            self.daily_layer(&mut layers, exempt);
            self.period_layer(&mut layers, exempt);
            if !exempt && decision.action.is_actionable() {
                self.systemic_layer(&mut layers, decision, portfolio, quantity);
            }
        }
        self.breaker_layer(&mut layers, exempt, now);

        let adjusted_quantity = (quantity != decision.quantity).then_some(quantity);
        let assessment = RiskAssessment::from_parts(
            layers.score,
            layers.warnings,
            layers.blocks,
            layers.recommendations,
            adjusted_quantity,
            adjusted_stop,
        );

        if assessment.is_blocked() {
            warn!(
                asset = %decision.asset_id,
                action = %decision.action,
                blocks = ?assessment.blocks,
                "Trade blocked by risk layers"
            );
        } else {
            debug!(
                asset = %decision.asset_id,
                risk = %assessment.overall_risk,
                score = assessment.score,
                "Risk assessed"
            );
        }
        assessment
    }

    /// Layer 1. Returns the accepted quantity and a stop if one had to be set.
    fn per_trade_layer(
        &self,
        layers: &mut Layers,
        decision: &TradeDecision,
        side: Side,
        equity: Decimal,
    ) -> (Decimal, Option<Decimal>) {
        let entry = decision.entry_price;
        let mut quantity = decision.quantity;
        let precision = self.config.precision_for(&decision.asset_id);
        if entry <= Decimal::ZERO {
            layers.block(50.0, "no valid entry price".into(), false);
            return (quantity, None);
        }
        if quantity <= Decimal::ZERO {
            layers.block(50.0, format!("non-positive quantity {}", quantity), false);
            return (quantity, None);
        }

        let size = quantity * entry / equity;
        if size > self.config.max_position_size {
            let capped = round_quantity(equity * self.config.max_position_size / entry, precision);
            layers.warn(
                15.0,
                format!(
                    "position size {} exceeds max {}, reduced to {}",
                    pct(size),
                    pct(self.config.max_position_size),
                    capped
                ),
            );
            quantity = capped;
        }

        let mut adjusted_stop = None;
        let stop = match decision.stop_loss {
            Some(stop) => {
                let wrong_side = match side {
                    Side::Buy => stop >= entry,
                    Side::Sell => stop <= entry,
                };
                if wrong_side {
                    let reason = format!("stop-loss {} on wrong side of entry {}", stop, entry);
                    layers.block(30.0, reason, false);
                    return (quantity, None);
                }
                stop
            }
            None => {
                let level = self.stops.stop_loss(entry, side, None, None);
                layers.warn(10.0, format!("no stop-loss set, using {}", level.price));
                layers.recommend("always define where the trade is wrong");
                adjusted_stop = Some(level.price);
                level.price
            }
        };

        let per_unit = (entry - stop).abs();
        let loss = quantity * per_unit / equity;
        if loss > self.config.max_loss_per_trade {
            let capped =
                round_quantity(equity * self.config.max_loss_per_trade / per_unit, precision);
            layers.warn(
                10.0,
                format!(
                    "loss at stop {} exceeds max {}, reduced to {}",
                    pct(loss),
                    pct(self.config.max_loss_per_trade),
                    capped
                ),
            );
            quantity = capped;
        }
        if quantity <= Decimal::ZERO {
            layers.block(30.0, "no quantity fits the per-trade limits".into(), false);
        }

        match decision.take_profit {
            Some(target) => {
                let reward = (target - entry).abs();
                let rr = (reward / per_unit).to_f64().unwrap_or(0.0);
                if rr < 1.0 {
                    layers.block(25.0, format!("reward/risk {:.2} below 1", rr), false);
                } else if rr < self.config.min_reward_risk {
                    layers.warn(
                        15.0,
                        format!(
                            "reward/risk {:.2} below minimum {:.2}",
                            rr, self.config.min_reward_risk
                        ),
                    );
                    layers.recommend("widen the target or tighten the stop");
                }
            }
            None => layers.warn(5.0, "no take-profit set".into()),
        }

        (quantity, adjusted_stop)
    }

    /// Layer 2.
    fn daily_layer(&self, layers: &mut Layers, exempt: bool) {
        let limit = self.config.daily_loss_limit;
        let loss = self.loss_fraction(self.pnl.daily);
        if loss >= limit {
            layers.block(
                40.0,
                format!("daily loss {} at limit {}", pct(loss), pct(limit)),
                exempt,
            );
        } else if loss >= limit * Decimal::new(8, 1) {
            layers.warn(20.0, format!("daily loss {} above 80% of limit", pct(loss)));
            layers.recommend("reduce size for the rest of the day");
        } else if loss >= limit / Decimal::TWO {
            layers.warn(10.0, format!("daily loss {} above 50% of limit", pct(loss)));
        }
    }

    /// Layer 3.
    fn period_layer(&self, layers: &mut Layers, exempt: bool) {
        let weekly = self.loss_fraction(self.pnl.weekly);
        if weekly >= self.config.weekly_loss_limit {
            layers.block(
                30.0,
                format!(
                    "weekly loss {} at limit {}",
                    pct(weekly),
                    pct(self.config.weekly_loss_limit)
                ),
                exempt,
            );
        } else if weekly >= self.config.weekly_loss_limit * Decimal::new(8, 1) {
            layers.warn(10.0, format!("weekly loss {} nearing limit", pct(weekly)));
        }

        let monthly = self.loss_fraction(self.pnl.monthly);
        if monthly >= self.config.monthly_loss_limit {
            layers.block(
                30.0,
                format!(
                    "monthly loss {} at limit {}",
                    pct(monthly),
                    pct(self.config.monthly_loss_limit)
                ),
                exempt,
            );
        }

        let drawdown = self.drawdown();
        if drawdown >= self.config.monthly_loss_limit {
            layers.block(
                30.0,
                format!(
                    "drawdown {} from peak at limit {}",
                    pct(drawdown),
                    pct(self.config.monthly_loss_limit)
                ),
                exempt,
            );
        } else if drawdown >= self.config.monthly_loss_limit / Decimal::TWO {
            layers.warn(10.0, format!("drawdown {} from peak", pct(drawdown)));
        }
    }

    /// Layer 4. Only for exposure-increasing trades.
    fn systemic_layer(
        &self,
        layers: &mut Layers,
        decision: &TradeDecision,
        portfolio: &Portfolio,
        quantity: Decimal,
    ) {
        let equity = portfolio.equity;
        let notional = quantity * decision.entry_price;

        let concentration = (portfolio.exposure(&decision.asset_id) + notional) / equity;
        if concentration > self.config.max_concentration {
            layers.block(
                25.0,
                format!(
                    "post-trade concentration {} in {} exceeds {}",
                    pct(concentration),
                    decision.asset_id,
                    pct(self.config.max_concentration)
                ),
                false,
            );
        }

        if decision.side == Some(Side::Buy) {
            let reserve = (portfolio.cash - notional) / equity;
            if reserve < self.config.min_cash_reserve {
                layers.block(
                    20.0,
                    format!(
                        "cash reserve after trade {} below minimum {}",
                        pct(reserve),
                        pct(self.config.min_cash_reserve)
                    ),
                    false,
                );
            }
        }

        let open = portfolio.position_count();
        let max_open = self.config.max_concurrent_positions;
        if !portfolio.has_position(&decision.asset_id) && open >= max_open {
            layers.block(
                20.0,
                format!("{} open positions at maximum {}", open, max_open),
                false,
            );
        }

        if open >= CORRELATION_MIN_POSITIONS {
            let cluster = largest_cluster(portfolio.positions.values(), self.classifier.as_ref());
            if let Some((market, share)) = cluster {
                if share > self.config.correlation_threshold {
                    layers.warn(
                        15.0,
                        format!("{:.0}% of positions in market {}", share * 100.0, market),
                    );
                    layers.recommend("diversify across markets");
                }
            }
        }
    }

    /// Layer 5.
    fn breaker_layer(&mut self, layers: &mut Layers, exempt: bool, now: DateTime<Utc>) {
        self.check_daily_loss_breaker(now);
        self.breakers.clear_expired(now);
        for reason in self.breakers.blocking_reasons(now) {
            layers.block(30.0, reason, exempt);
        }
    }

    fn check_daily_loss_breaker(&mut self, now: DateTime<Utc>) -> Option<CircuitBreakerEvent> {
        let threshold = self.breakers.threshold(BreakerKind::DailyLoss);
        let loss = self.loss_fraction(self.pnl.daily).to_f64().unwrap_or(0.0);
        if loss >= threshold && !self.breakers.is_triggered(BreakerKind::DailyLoss) {
            let reason =
                format!("daily loss {:.2}% crossed {:.2}%", loss * 100.0, threshold * 100.0);
            return Some(self.trigger_circuit_breaker(BreakerKind::DailyLoss, reason, now));
        }
        None
    }

    /// The only path that trips a breaker. The trip is published to subscribers.
    pub fn trigger_circuit_breaker(
        &mut self,
        kind: BreakerKind,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> CircuitBreakerEvent {
        let event = self.breakers.trigger(kind, reason, now);
        warn!(
            breaker = %kind,
            critical = event.critical,
            until = %event.cooldown_ends_at,
            reason = %event.reason,
            "Circuit breaker triggered"
        );
        // No subscribers is fine
        let _ = self.events.send(event.clone());
        event
    }

    /// False while any breaker is inside its cooldown. Clears expired ones.
    pub fn is_trading_allowed(&mut self, now: DateTime<Utc>) -> bool {
        let cleared = self.breakers.clear_expired(now);
        for kind in cleared {
            info!(breaker = %kind, "Circuit breaker cooldown ended");
        }
        self.breakers.is_trading_allowed(now)
    }

    pub fn circuit_breaker_status(&self) -> Vec<CircuitBreaker> {
        self.breakers.snapshot()
    }

    /// Record a closed trade. Returns any breakers it tripped.
    pub fn record_trade(
        &mut self,
        pnl: Decimal,
        trade_return: f64,
        now: DateTime<Utc>,
    ) -> Vec<CircuitBreakerEvent> {
        self.pnl.record(pnl, now);
        self.performance.record(trade_return);
        self.update_equity(self.current_equity + pnl);

        let mut events = Vec::new();
        let threshold = self.config.breakers.consecutive_losses;
        let losses = self.performance.consecutive_losses();
        if losses >= threshold && !self.breakers.is_triggered(BreakerKind::ConsecutiveLosses) {
            events.push(self.trigger_circuit_breaker(
                BreakerKind::ConsecutiveLosses,
                format!("{} consecutive losing trades", losses),
                now,
            ));
        }
        events.extend(self.check_daily_loss_breaker(now));
        events
    }

    /// Record the outcome of a broker or analysis operation for the error-rate breaker.
    pub fn record_operation(
        &mut self,
        success: bool,
        now: DateTime<Utc>,
    ) -> Option<CircuitBreakerEvent> {
        let cfg = &self.config.breakers;
        if self.operations.len() == cfg.error_rate_window {
            self.operations.pop_front();
        }
        self.operations.push_back(success);

        if self.operations.len() < cfg.error_rate_min_samples
            || self.breakers.is_triggered(BreakerKind::ErrorRate)
        {
            return None;
        }
        let failures = self.operations.iter().filter(|ok| !**ok).count();
        let rate = failures as f64 / self.operations.len() as f64;
        if rate < cfg.error_rate {
            return None;
        }
        let reason = format!("{} of last {} operations failed", failures, self.operations.len());
        self.operations.clear();
        Some(self.trigger_circuit_breaker(BreakerKind::ErrorRate, reason, now))
    }

    /// Feed a price tick for the flash-crash breaker.
    pub fn observe_price(
        &mut self,
        asset_id: &str,
        price: f64,
        now: DateTime<Utc>,
    ) -> Option<CircuitBreakerEvent> {
        if !price.is_finite() || price <= 0.0 {
            return None;
        }
        let previous = self.last_prices.insert(asset_id.to_string(), price)?;
        let threshold = self.breakers.threshold(BreakerKind::FlashCrash);
        let change = (price - previous) / previous;
        if change.abs() >= threshold && !self.breakers.is_triggered(BreakerKind::FlashCrash) {
            let reason = format!("{} moved {:+.2}% in one tick", asset_id, change * 100.0);
            return Some(self.trigger_circuit_breaker(BreakerKind::FlashCrash, reason, now));
        }
        None
    }

    /// Feed a volatility reading for the volatility-spike breaker.
    pub fn observe_volatility(
        &mut self,
        asset_id: &str,
        volatility: f64,
        now: DateTime<Utc>,
    ) -> Option<CircuitBreakerEvent> {
        if !volatility.is_finite() || volatility <= 0.0 {
            return None;
        }
        let multiple = self.breakers.threshold(BreakerKind::VolatilitySpike);
        let Some(baseline) = self.volatility_baselines.get(asset_id).copied() else {
            self.volatility_baselines.insert(asset_id.to_string(), volatility);
            return None;
        };
        if volatility >= baseline * multiple {
            if self.breakers.is_triggered(BreakerKind::VolatilitySpike) {
                return None;
            }
            let reason = format!(
                "{} volatility {:.4} is {:.1}x baseline {:.4}",
                asset_id,
                volatility,
                volatility / baseline,
                baseline
            );
            return Some(self.trigger_circuit_breaker(BreakerKind::VolatilitySpike, reason, now));
        }
        self.volatility_baselines.insert(
            asset_id.to_string(),
            baseline * (1.0 - VOLATILITY_ALPHA) + volatility * VOLATILITY_ALPHA,
        );
        None
    }

    /// Kelly fraction from the return history, once there is enough of it.
    pub fn kelly(&self) -> Option<f64> {
        if self.performance.len() < MIN_KELLY_TRADES {
            return None;
        }
        kelly_fraction(
            self.performance.win_rate(),
            self.performance.avg_win(),
            self.performance.avg_loss(),
        )
    }

    /// Size a trade in `asset_id`, rounded down to the asset's precision.
    pub fn calculate_position_size(
        &self,
        asset_id: &str,
        equity: Decimal,
        entry: Decimal,
        stop: Option<Decimal>,
    ) -> SizingResult {
        let precision = self.config.precision_for(asset_id);
        self.sizer.size(precision, equity, entry, stop, self.kelly())
    }

    pub fn calculate_stop_loss(
        &self,
        entry: Decimal,
        side: Side,
        atr: Option<f64>,
        volatility: Option<f64>,
    ) -> StopLevel {
        self.stops.stop_loss(entry, side, atr, volatility)
    }

    pub fn calculate_take_profit(
        &self,
        entry: Decimal,
        stop: Decimal,
        side: Side,
        reward_risk: f64,
    ) -> Decimal {
        self.stops.take_profit(entry, stop, side, reward_risk)
    }

    pub fn performance_stats(&self) -> PerformanceStats {
        self.performance.stats()
    }

    pub fn pnl_summary(&mut self, now: DateTime<Utc>) -> PnlSummary {
        self.pnl.roll(now);
        PnlSummary {
            daily_pnl: self.pnl.daily,
            weekly_pnl: self.pnl.weekly,
            monthly_pnl: self.pnl.monthly,
            current_equity: self.current_equity,
            peak_equity: self.peak_equity,
            drawdown: self.drawdown(),
            performance: self.performance.stats(),
            trading_allowed: self.is_trading_allowed(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use trading_core::types::{Position, RiskLevel, TradeAction};

    fn portfolio() -> Portfolio {
        Portfolio::new(dec!(100000))
    }

    fn manager() -> RiskManager {
        RiskManager::new(RiskConfig::default()).unwrap()
    }

    fn buy(quantity: Decimal, entry: Decimal, stop: Decimal, target: Decimal) -> TradeDecision {
        TradeDecision::new("AAPL", TradeAction::Buy, Some(Side::Buy), quantity, entry)
            .with_levels(Some(stop), Some(target))
    }

    #[test]
    fn test_clean_trade_passes() {
        let mut risk = manager();
        let decision = buy(dec!(50), dec!(100), dec!(97), dec!(106));
        let assessment = risk.assess_trade_risk(&decision, &portfolio(), Utc::now());

        assert!(assessment.can_trade, "{:?}", assessment.blocks);
        assert!(assessment.adjusted_quantity.is_none());
        assert_eq!(assessment.overall_risk, RiskLevel::Low);
    }

    #[test]
    fn test_oversized_trade_is_reduced() {
        let mut risk = manager();
        // 20% of equity against a 10% cap
        let decision = buy(dec!(200), dec!(100), dec!(99), dec!(103));
        let assessment = risk.assess_trade_risk(&decision, &portfolio(), Utc::now());

        assert_eq!(assessment.adjusted_quantity, Some(dec!(100)));
        assert!(!assessment.warnings.is_empty());
    }

    #[test]
    fn test_loss_at_stop_caps_quantity() {
        let mut risk = manager();
        // 90 units with a 30 stop distance risks 2700 > 2000
        let decision = buy(dec!(90), dec!(100), dec!(70), dec!(160));
        let assessment = risk.assess_trade_risk(&decision, &portfolio(), Utc::now());
        assert_eq!(assessment.adjusted_quantity, Some(dec!(66)));
    }

    #[test]
    fn test_fractional_asset_is_capped_not_zeroed() {
        let btc =
            TradeDecision::new("BTC-USD", TradeAction::Buy, Some(Side::Buy), dec!(1), dec!(60000))
                .with_levels(Some(dec!(58800)), Some(dec!(62400)));

        let mut whole_units = manager();
        let assessment = whole_units.assess_trade_risk(&btc, &portfolio(), Utc::now());
        assert!(!assessment.can_trade);
        assert!(assessment.blocks.iter().any(|b| b.contains("no quantity fits")));

        let mut config = RiskConfig::default();
        config.asset_precision.insert("BTC-USD".into(), 6);
        let mut fractional = RiskManager::new(config).unwrap();
        let assessment = fractional.assess_trade_risk(&btc, &portfolio(), Utc::now());
        assert!(assessment.can_trade, "{:?}", assessment.blocks);
        // 10% of 100000 at 60000
        assert_eq!(assessment.adjusted_quantity, Some(dec!(0.166666)));

        let sizing = fractional.calculate_position_size(
            "BTC-USD",
            dec!(100000),
            dec!(60000),
            Some(dec!(58800)),
        );
        assert_eq!(sizing.quantity, dec!(0.166666));
    }

    #[test]
    fn test_stop_on_wrong_side_blocks() {
        let mut risk = manager();
        let decision = buy(dec!(10), dec!(100), dec!(101), dec!(110));
        let assessment = risk.assess_trade_risk(&decision, &portfolio(), Utc::now());
        assert!(!assessment.can_trade);
        assert!(assessment.blocks[0].contains("wrong side"));
    }

    #[test]
    fn test_missing_stop_is_filled_in() {
        let mut risk = manager();
        let decision =
            TradeDecision::new("AAPL", TradeAction::Buy, Some(Side::Buy), dec!(10), dec!(100));
        let assessment = risk.assess_trade_risk(&decision, &portfolio(), Utc::now());
        assert_eq!(assessment.adjusted_stop_loss, Some(dec!(98)));
    }

    #[test]
    fn test_daily_loss_blocks_and_trips_breaker() {
        let mut risk = manager();
        let mut events = risk.subscribe();
        let now = Utc::now();
        risk.update_equity(dec!(100000));
        risk.record_trade(dec!(-3500), -0.035, now);

        let decision = buy(dec!(10), dec!(100), dec!(97), dec!(106));
        let mut account = portfolio();
        account.equity = dec!(96500);
        let assessment = risk.assess_trade_risk(&decision, &account, now);

        assert!(!assessment.can_trade);
        assert!(assessment.blocks.iter().any(|b| b.contains("daily loss")));
        let event = events.try_recv().unwrap();
        assert_eq!(event.kind, BreakerKind::DailyLoss);
        assert!(event.critical);
    }

    #[test]
    fn test_closing_trade_is_exempt_from_breakers() {
        let mut risk = manager();
        let now = Utc::now();
        risk.trigger_circuit_breaker(BreakerKind::FlashCrash, "test", now);

        let mut account = portfolio();
        account
            .positions
            .insert("AAPL".into(), Position::new("AAPL", dec!(10), dec!(100)));
        let close =
            TradeDecision::new("AAPL", TradeAction::Close, Some(Side::Sell), dec!(10), dec!(100));
        let assessment = risk.assess_trade_risk(&close, &account, now);
        assert!(assessment.blocks.is_empty());

        let open = buy(dec!(10), dec!(100), dec!(97), dec!(106));
        let assessment = risk.assess_trade_risk(&open, &account, now);
        assert!(assessment.blocks.iter().any(|b| b.contains("flash_crash")));
    }

    #[test]
    fn test_concentration_and_cash_reserve() {
        let mut risk = manager();
        let mut account = portfolio();
        account.cash = dec!(12000);
        let mut held = Position::new("AAPL", dec!(150), dec!(100));
        held.update_price(dec!(100));
        account.positions.insert("AAPL".into(), held);

        let decision = buy(dec!(90), dec!(100), dec!(97), dec!(106));
        let assessment = risk.assess_trade_risk(&decision, &account, Utc::now());
        assert!(assessment.blocks.iter().any(|b| b.contains("concentration")));
        assert!(assessment.blocks.iter().any(|b| b.contains("cash reserve")));
    }

    #[test]
    fn test_consecutive_losses_trip() {
        let mut risk = manager();
        risk.update_equity(dec!(1000000));
        let now = Utc::now();
        let mut tripped = Vec::new();
        for _ in 0..5 {
            tripped.extend(risk.record_trade(dec!(-10), -0.001, now));
        }
        assert_eq!(tripped.len(), 1);
        assert_eq!(tripped[0].kind, BreakerKind::ConsecutiveLosses);
        assert!(!risk.is_trading_allowed(now));
        assert!(risk.is_trading_allowed(now + Duration::minutes(61)));
    }

    #[test]
    fn test_error_rate_needs_min_samples() {
        let mut risk = manager();
        let now = Utc::now();
        for _ in 0..9 {
            assert!(risk.record_operation(false, now).is_none());
        }
        let event = risk.record_operation(false, now).unwrap();
        assert_eq!(event.kind, BreakerKind::ErrorRate);
    }

    #[test]
    fn test_flash_crash_and_volatility_spike() {
        let mut risk = manager();
        let now = Utc::now();
        assert!(risk.observe_price("AAPL", 100.0, now).is_none());
        assert!(risk.observe_price("AAPL", 98.0, now).is_none());
        let event = risk.observe_price("AAPL", 92.0, now).unwrap();
        assert_eq!(event.kind, BreakerKind::FlashCrash);

        assert!(risk.observe_volatility("AAPL", 0.01, now).is_none());
        let event = risk.observe_volatility("AAPL", 0.031, now).unwrap();
        assert_eq!(event.kind, BreakerKind::VolatilitySpike);
    }

    #[test]
    fn test_kelly_sizing_from_history() {
        let mut risk = manager();
        risk.update_equity(dec!(100000));
        let now = Utc::now();
        assert!(risk.kelly().is_none());
        // 60% wins at +2%, 40% losses at -1%
        for i in 0..10 {
            let r = if i % 5 < 3 { 0.02 } else { -0.01 };
            risk.record_trade(Decimal::ZERO, r, now);
        }
        let kelly = risk.kelly().unwrap();
        assert!((kelly - 0.4).abs() < 1e-9);

        let sizing = risk.calculate_position_size("AAPL", dec!(100000), dec!(100), None);
        assert!((sizing.fraction - 0.1).abs() < 1e-9);
        assert_eq!(sizing.quantity, dec!(100));
    }
}
