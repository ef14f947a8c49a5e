//! The decision brain.
//!
//! Turns one asset's analysis and fused strategy signal into a fully
//! specified [`TradeDecision`]: consensus, entry/stop/target/quantity,
//! risk assessment, self-questioning and finally the autonomy filter.
//! It also watches the stop and target of positions it opened and emits
//! `close` decisions when price crosses them.

use chrono::{DateTime, Duration, Utc};
use num_traits::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};
use trading_core::{
    round_price, AutonomyLevel, OrderType, Portfolio, Position, Quote, Side, StrategySignal,
    TechnicalAnalysis, TradeAction, TradeDecision,
};
use trading_risk::{round_quantity, RiskManager, MIN_STOP_DISTANCE};

use crate::autonomy::{autonomy_filter, AutonomyVerdict};
use crate::config::BrainConfig;
use crate::error::{BrainError, BrainResult};
use crate::regime::MarketRegime;
use crate::self_question::{run_self_questions, QuestionContext};

/// RSI levels beyond which the entry is skewed further.
const RSI_OVERBOUGHT: f64 = 70.0;
const RSI_OVERSOLD: f64 = 30.0;

/// Inputs for one asset in one cycle.
pub struct DecisionContext<'a> {
    pub analysis: &'a TechnicalAnalysis,
    /// Fused signal of the active strategies
    pub ensemble: Option<&'a StrategySignal>,
    /// Raw signals the ensemble was fused from
    pub signals: &'a [StrategySignal],
    pub portfolio: &'a Portfolio,
    pub quote: Option<&'a Quote>,
    pub autonomy: AutonomyLevel,
    pub now: DateTime<Utc>,
}

impl DecisionContext<'_> {
    /// Live price, falling back to the last close.
    fn price(&self) -> Decimal {
        self.quote
            .map(|q| q.last)
            .filter(|p| *p > Decimal::ZERO)
            .or_else(|| Decimal::from_f64(self.analysis.price).filter(|p| *p > Decimal::ZERO))
            .map(round_price)
            .unwrap_or(Decimal::ZERO)
    }

    fn position(&self) -> Option<&Position> {
        self.portfolio
            .position(&self.analysis.asset_id)
            .filter(|p| !p.is_flat())
    }
}

/// What the brain concluded for one asset.
#[derive(Debug, Clone, PartialEq)]
pub enum Deliberation {
    /// No trade; the decision carries the reason
    Hold(TradeDecision),
    Decided {
        decision: TradeDecision,
        verdict: AutonomyVerdict,
    },
    /// A required self-question failed or too few passed
    Rejected { asset_id: String, reasons: Vec<String> },
}

/// Stop and target of a position the brain opened.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackedLevels {
    pub side: Side,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
}

pub struct DecisionBrain {
    config: BrainConfig,
    tracked: HashMap<String, TrackedLevels>,
}

impl DecisionBrain {
    pub fn new(config: BrainConfig) -> BrainResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            tracked: HashMap::new(),
        })
    }

    pub fn config(&self) -> &BrainConfig {
        &self.config
    }

    pub fn tracked(&self, asset_id: &str) -> Option<&TrackedLevels> {
        self.tracked.get(asset_id)
    }

    /// Remember the levels of an executed entry, or forget them on a close.
    pub fn record_execution(&mut self, decision: &TradeDecision) {
        match (decision.action, decision.side) {
            (TradeAction::Close, _) => {
                self.tracked.remove(&decision.asset_id);
            }
            (TradeAction::Buy | TradeAction::Sell, Some(side))
                if decision.stop_loss.is_some() || decision.take_profit.is_some() =>
            {
                self.tracked.insert(
                    decision.asset_id.clone(),
                    TrackedLevels {
                        side,
                        stop_loss: decision.stop_loss,
                        take_profit: decision.take_profit,
                    },
                );
            }
            _ => {}
        }
    }

    /// Drop levels for an asset whose position is gone.
    pub fn forget(&mut self, asset_id: &str) {
        self.tracked.remove(asset_id);
    }

    /// Run the full decision pipeline for one asset.
    ///
    /// Risk computation happens against `risk`; nothing is executed here.
    pub fn process_analysis(
        &self,
        ctx: &DecisionContext<'_>,
        risk: &mut RiskManager,
    ) -> BrainResult<Deliberation> {
        let analysis = ctx.analysis;
        let asset_id = analysis.asset_id.as_str();
        if let Some(ensemble) = ctx.ensemble {
            if ensemble.asset_id != asset_id {
                return Err(BrainError::InvalidInput(format!(
                    "ensemble signal for {} paired with analysis of {}",
                    ensemble.asset_id, asset_id
                )));
            }
        }

        let price = ctx.price();
        let position = ctx.position();

        if let Some(position) = position {
            if let Some(reason) = self.exit_trigger(asset_id, position, price) {
                return Ok(self.exit(ctx, position, price, reason, risk));
            }
        }

        let regime = MarketRegime::classify(analysis);
        let (ensemble_dir, ensemble_conf) = ctx
            .ensemble
            .map(|s| (s.action.direction(), s.confidence))
            .unwrap_or((0.0, 0.0));
        let recommendation = analysis.recommendation;
        let net = ensemble_dir * ensemble_conf
            + self.config.recommendation_weight
                * recommendation.action.direction()
                * recommendation.strength;

        if net.abs() < self.config.commit_threshold {
            debug!(asset = %asset_id, net, "No consensus");
            return Ok(Deliberation::Hold(TradeDecision::hold(
                asset_id,
                format!(
                    "net consensus {:+.2} below threshold {:.2}",
                    net, self.config.commit_threshold
                ),
            )));
        }

        let wanted = if net > 0.0 { Side::Buy } else { Side::Sell };
        let (action, side) = match (wanted, position) {
            (wanted, Some(p)) if wanted == p.closing_side() => (TradeAction::Close, wanted),
            (Side::Sell, _) if !self.config.allow_short => {
                return Ok(Deliberation::Hold(TradeDecision::hold(
                    asset_id,
                    "sell consensus without a long to close and shorting is disabled",
                )));
            }
            (Side::Buy, _) => (TradeAction::Buy, Side::Buy),
            (Side::Sell, _) => (TradeAction::Sell, Side::Sell),
        };

        let mut contributors: Vec<String> = ctx
            .signals
            .iter()
            .filter(|s| s.action.direction() * net > 0.0)
            .map(|s| s.strategy_id.clone())
            .collect();
        contributors.sort();
        contributors.dedup();

        let mut reasoning = format!("{} consensus {:+.2} in a {} market", action, net, regime);
        if let Some(ensemble) = ctx.ensemble.filter(|s| !s.reasoning.is_empty()) {
            reasoning.push_str(": ");
            reasoning.push_str(&ensemble.reasoning);
        }
        let confidence = net.abs().min(1.0);

        let base = if action == TradeAction::Close {
            let quantity = position.map(|p| p.abs_quantity()).unwrap_or_default();
            TradeDecision::new(asset_id, action, Some(side), quantity, price)
        } else {
            let entry = self.entry_price(price, side, analysis);
            let stop = self.stop_loss(ctx.ensemble, entry, side, analysis, risk);
            let target = self.take_profit(ctx.ensemble, entry, stop, side, risk);
            let sizing =
                risk.calculate_position_size(asset_id, ctx.portfolio.equity, entry, Some(stop));
            TradeDecision::new(asset_id, action, Some(side), sizing.quantity, entry)
                .with_levels(Some(stop), Some(target))
                .with_order_type(if self.config.use_limit_orders {
                    OrderType::Limit
                } else {
                    OrderType::Market
                })
        };
        let candidate = base
            .with_confidence(confidence)
            .with_reasoning(reasoning)
            .with_strategies(contributors)
            .with_entry_invariant();

        if !candidate.action.is_actionable() {
            return Ok(Deliberation::Hold(candidate));
        }
        if candidate.quantity <= Decimal::ZERO {
            return Ok(Deliberation::Hold(TradeDecision::hold(
                asset_id,
                "position size rounds to zero",
            )));
        }

        let assessment = risk.assess_trade_risk(&candidate, ctx.portfolio, ctx.now);
        let mut decision = candidate;
        if let Some(quantity) = assessment.adjusted_quantity {
            let precision = risk.config().precision_for(asset_id);
            decision = decision.with_quantity(round_quantity(quantity, precision));
        }
        if let (Some(stop), Some(side)) = (assessment.adjusted_stop_loss, decision.side) {
            let target = risk.calculate_take_profit(
                decision.entry_price,
                stop,
                side,
                self.config.target_reward_risk,
            );
            decision = decision.with_levels(Some(stop), Some(target));
        }
        if decision.quantity <= Decimal::ZERO {
            return Ok(Deliberation::Hold(TradeDecision::hold(
                asset_id,
                format!("risk layers left no size: {}", assessment.rejection_reasons().join("; ")),
            )));
        }

        let report = run_self_questions(&QuestionContext {
            decision: &decision,
            analysis,
            assessment: &assessment,
            regime,
            portfolio: ctx.portfolio,
            max_position_size: risk.config().max_position_size,
            max_loss_per_trade: risk.config().max_loss_per_trade,
            max_analysis_age: Duration::seconds(self.config.max_analysis_age_secs),
            now: ctx.now,
        });
        if !report.passed(self.config.min_pass_ratio) {
            let reasons = report.failure_reasons();
            if report.required_failures().is_empty() {
                info!(
                    asset = %asset_id,
                    ratio = report.pass_ratio,
                    ?reasons,
                    "Self-questioning below pass ratio"
                );
            } else {
                warn!(asset = %asset_id, ?reasons, "Required self-question failed");
            }
            return Ok(Deliberation::Rejected {
                asset_id: asset_id.to_string(),
                reasons,
            });
        }

        let decision = decision
            .with_risk_assessment(assessment)
            .with_self_questions(report.results);
        let verdict =
            autonomy_filter(ctx.autonomy, &decision, position, self.config.max_auto_notional);
        info!(
            asset = %asset_id,
            action = %decision.action,
            quantity = %decision.quantity,
            entry = %decision.entry_price,
            confidence = decision.confidence,
            ?verdict,
            "Decision"
        );
        Ok(Deliberation::Decided { decision, verdict })
    }

    fn exit_trigger(&self, asset_id: &str, position: &Position, price: Decimal) -> Option<String> {
        let levels = self.tracked.get(asset_id)?;
        if price <= Decimal::ZERO {
            return None;
        }
        match levels.side {
            Side::Buy if position.is_long() => {
                if levels.stop_loss.is_some_and(|s| price <= s) {
                    Some(format!("stop-loss hit at {}", price))
                } else if levels.take_profit.is_some_and(|t| price >= t) {
                    Some(format!("take-profit hit at {}", price))
                } else {
                    None
                }
            }
            Side::Sell if position.is_short() => {
                if levels.stop_loss.is_some_and(|s| price >= s) {
                    Some(format!("stop-loss hit at {}", price))
                } else if levels.take_profit.is_some_and(|t| price <= t) {
                    Some(format!("take-profit hit at {}", price))
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Protective close. Skips consensus and self-questioning.
    fn exit(
        &self,
        ctx: &DecisionContext<'_>,
        position: &Position,
        price: Decimal,
        reason: String,
        risk: &mut RiskManager,
    ) -> Deliberation {
        let asset_id = &ctx.analysis.asset_id;
        let decision = TradeDecision::new(
            asset_id.clone(),
            TradeAction::Close,
            Some(position.closing_side()),
            position.abs_quantity(),
            price,
        )
        .with_confidence(1.0)
        .with_reasoning(reason);
        let assessment = risk.assess_trade_risk(&decision, ctx.portfolio, ctx.now);
        let decision = decision.with_risk_assessment(assessment);
        let verdict = autonomy_filter(
            ctx.autonomy,
            &decision,
            Some(position),
            self.config.max_auto_notional,
        );
        info!(asset = %asset_id, reason = %decision.reasoning, ?verdict, "Exit triggered");
        Deliberation::Decided { decision, verdict }
    }

    /// Skew toward a better fill: by trend strength, and again when RSI
    /// already runs against the trade.
    fn entry_price(&self, price: Decimal, side: Side, analysis: &TechnicalAnalysis) -> Decimal {
        let mut skew = self.config.entry_skew * analysis.trend.strength.clamp(0.0, 1.0);
        let rsi = analysis.indicators.rsi;
        let stretched = match side {
            Side::Buy => rsi > RSI_OVERBOUGHT,
            Side::Sell => rsi > 0.0 && rsi < RSI_OVERSOLD,
        };
        if stretched {
            skew += self.config.entry_skew;
        }
        let skew = Decimal::from_f64(skew).unwrap_or(Decimal::ZERO);
        let factor = match side {
            Side::Buy => Decimal::ONE - skew,
            Side::Sell => Decimal::ONE + skew,
        };
        round_price(price * factor)
    }

    /// The ensemble's stop when it sits on the right side at least the
    /// minimum distance away, else a computed one.
    fn stop_loss(
        &self,
        ensemble: Option<&StrategySignal>,
        entry: Decimal,
        side: Side,
        analysis: &TechnicalAnalysis,
        risk: &RiskManager,
    ) -> Decimal {
        let floor = entry * MIN_STOP_DISTANCE;
        let proposed = ensemble.and_then(|s| s.stop_loss).filter(|stop| match side {
            Side::Buy => entry - *stop >= floor,
            Side::Sell => *stop - entry >= floor,
        });
        match proposed {
            Some(stop) => stop,
            None => {
                let indicators = &analysis.indicators;
                let positive = |v: f64| (v.is_finite() && v > 0.0).then_some(v);
                risk.calculate_stop_loss(
                    entry,
                    side,
                    positive(indicators.atr),
                    positive(indicators.volatility),
                )
                .price
            }
        }
    }

    /// The ensemble's target when it pays at least the configured multiple.
    fn take_profit(
        &self,
        ensemble: Option<&StrategySignal>,
        entry: Decimal,
        stop: Decimal,
        side: Side,
        risk: &RiskManager,
    ) -> Decimal {
        let minimum = risk.calculate_take_profit(entry, stop, side, self.config.target_reward_risk);
        let proposed = ensemble.and_then(|s| s.take_profit).filter(|target| match side {
            Side::Buy => *target >= minimum,
            Side::Sell => *target <= minimum,
        });
        proposed.unwrap_or(minimum)
    }
}
