//! Self-questioning battery run over every candidate decision.
//!
//! Each check is named, weighted and either required or optional. A failed
//! required check rejects the candidate outright; otherwise the weighted
//! share of passed checks must reach the configured ratio.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use trading_core::{
    Portfolio, RiskAssessment, RiskLevel, SelfQuestionResult, Side, SignalAction, TechnicalAnalysis,
    TradeAction, TradeDecision, TrendDirection,
};

use crate::regime::MarketRegime;

/// Confidence needed to trade through high assessed risk or a volatile regime.
const HIGH_RISK_CONFIDENCE: f64 = 0.7;
/// Trend candles that count as an established move rather than a blip.
const MIN_TREND_DURATION: usize = 3;
/// Largest share of indicator signals allowed to contradict the trade.
const MAX_CONTRARY_SHARE: f64 = 0.5;

/// Everything the checks look at.
pub struct QuestionContext<'a> {
    pub decision: &'a TradeDecision,
    pub analysis: &'a TechnicalAnalysis,
    pub assessment: &'a RiskAssessment,
    pub regime: MarketRegime,
    pub portfolio: &'a Portfolio,
    pub max_position_size: Decimal,
    pub max_loss_per_trade: Decimal,
    pub max_analysis_age: Duration,
    pub now: DateTime<Utc>,
}

impl QuestionContext<'_> {
    fn direction(&self) -> SignalAction {
        match self.decision.side {
            Some(Side::Buy) => SignalAction::Buy,
            Some(Side::Sell) => SignalAction::Sell,
            None => SignalAction::Hold,
        }
    }

    fn is_close(&self) -> bool {
        self.decision.action == TradeAction::Close
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Question {
    Rationale,
    RiskPerception,
    Freshness,
    RecencyBias,
    ConfirmationBias,
    OpportunityCost,
    IfWrong,
    Mandate,
}

impl Question {
    pub const ALL: [Question; 8] = [
        Question::Rationale,
        Question::RiskPerception,
        Question::Freshness,
        Question::RecencyBias,
        Question::ConfirmationBias,
        Question::OpportunityCost,
        Question::IfWrong,
        Question::Mandate,
    ];

    pub fn text(&self) -> &'static str {
        match self {
            Question::Rationale => "Is there a concrete rationale for this trade?",
            Question::RiskPerception => "Does my read of the risk match the assessed risk?",
            Question::Freshness => "Is the analysis fresh?",
            Question::RecencyBias => "Am I reacting to the last few candles only?",
            Question::ConfirmationBias => "Am I ignoring evidence against the trade?",
            Question::OpportunityCost => "Is the capital tied up bounded?",
            Question::IfWrong => "Do I know where I am wrong?",
            Question::Mandate => "Does the trade fit the risk profile?",
        }
    }

    pub fn weight(&self) -> f64 {
        match self {
            Question::Rationale | Question::Freshness | Question::Mandate => 1.0,
            Question::RiskPerception => 1.5,
            Question::IfWrong => 1.25,
            Question::RecencyBias | Question::ConfirmationBias | Question::OpportunityCost => 0.75,
        }
    }

    pub fn required(&self) -> bool {
        matches!(
            self,
            Question::Rationale | Question::Freshness | Question::IfWrong | Question::Mandate
        )
    }

    /// Run the check: pass flag and the reason behind it.
    fn check(&self, ctx: &QuestionContext<'_>) -> (bool, String) {
        let decision = ctx.decision;
        match self {
            Question::Rationale => {
                if decision.reasoning.trim().is_empty() {
                    (false, "no reasoning recorded".into())
                } else if decision.confidence <= 0.0 {
                    (false, "zero confidence".into())
                } else {
                    (true, format!("confidence {:.2}", decision.confidence))
                }
            }
            Question::RiskPerception => {
                let assessed = ctx.assessment.overall_risk;
                if assessed == RiskLevel::Critical {
                    (false, "assessed risk is critical".into())
                } else if assessed == RiskLevel::High
                    && decision.confidence < HIGH_RISK_CONFIDENCE
                {
                    (false, format!("high risk with confidence {:.2}", decision.confidence))
                } else if ctx.regime == MarketRegime::Volatile
                    && decision.confidence < HIGH_RISK_CONFIDENCE
                    && !ctx.is_close()
                {
                    (false, format!("volatile regime with confidence {:.2}", decision.confidence))
                } else {
                    (true, format!("{} risk in a {} market", assessed, ctx.regime))
                }
            }
            Question::Freshness => {
                let age = ctx.analysis.age(ctx.now);
                if age < ctx.max_analysis_age {
                    (true, format!("analysis is {}s old", age.num_seconds()))
                } else {
                    (false, format!("analysis is {}s old", age.num_seconds()))
                }
            }
            Question::RecencyBias => {
                if ctx.is_close() {
                    return (true, "exits are exempt".into());
                }
                let trend = ctx.analysis.trend;
                let agrees = matches!(
                    (trend.direction, ctx.direction()),
                    (TrendDirection::Up, SignalAction::Buy)
                        | (TrendDirection::Down, SignalAction::Sell)
                );
                if agrees || trend.duration >= MIN_TREND_DURATION {
                    (true, format!("{:?} trend over {} candles", trend.direction, trend.duration))
                } else {
                    (false, format!("counter-trend after only {} candles", trend.duration))
                }
            }
            Question::ConfirmationBias => {
                let direction = ctx.direction();
                let directional: Vec<_> = ctx
                    .analysis
                    .signals
                    .iter()
                    .filter(|s| s.action.is_directional())
                    .collect();
                if directional.is_empty() || ctx.is_close() {
                    return (true, "no contrary evidence to weigh".into());
                }
                let contrary = directional
                    .iter()
                    .filter(|s| s.action.direction() * direction.direction() < 0.0)
                    .count();
                let share = contrary as f64 / directional.len() as f64;
                if share <= MAX_CONTRARY_SHARE {
                    (true, format!("{} of {} indicators disagree", contrary, directional.len()))
                } else {
                    (false, format!("{} of {} indicators disagree", contrary, directional.len()))
                }
            }
            Question::OpportunityCost => {
                let position = ctx.portfolio.position(&decision.asset_id);
                if ctx.is_close() || decision.is_risk_reducing(position) {
                    return (true, "frees capital".into());
                }
                let notional = decision.notional();
                let equity = ctx.portfolio.equity;
                if notional > ctx.portfolio.cash {
                    (false, format!("notional {} exceeds cash {}", notional, ctx.portfolio.cash))
                } else if equity > Decimal::ZERO && notional > equity * ctx.max_position_size {
                    (false, format!("notional {} exceeds the position cap", notional))
                } else {
                    (true, format!("notional {}", notional.round_dp(2)))
                }
            }
            Question::IfWrong => {
                if ctx.is_close() {
                    return (true, "closing removes the exposure".into());
                }
                match (decision.stop_loss, decision.side) {
                    (Some(stop), Some(Side::Buy)) if stop < decision.entry_price => {
                        (true, format!("stop at {}", stop))
                    }
                    (Some(stop), Some(Side::Sell)) if stop > decision.entry_price => {
                        (true, format!("stop at {}", stop))
                    }
                    (Some(stop), _) => {
                        (false, format!("stop {} is on the wrong side of entry", stop))
                    }
                    (None, _) => (false, "no stop-loss defined".into()),
                }
            }
            Question::Mandate => {
                if ctx.is_close() {
                    return (true, "protective exit".into());
                }
                let Some(stop) = decision.stop_loss else {
                    return (false, "cannot bound the loss without a stop".into());
                };
                let loss = decision.quantity * (decision.entry_price - stop).abs();
                let budget = ctx.portfolio.equity * ctx.max_loss_per_trade;
                let within = loss <= budget;
                let (loss, budget) = (loss.round_dp(2), budget.round_dp(2));
                if within {
                    (true, format!("loss at stop {} within {}", loss, budget))
                } else {
                    (false, format!("loss at stop {} exceeds {}", loss, budget))
                }
            }
        }
    }
}

/// Outcome of the whole battery.
#[derive(Debug, Clone, PartialEq)]
pub struct SelfQuestionReport {
    pub results: Vec<SelfQuestionResult>,
    /// Weighted share of passed checks
    pub pass_ratio: f64,
}

impl SelfQuestionReport {
    pub fn required_failures(&self) -> Vec<&SelfQuestionResult> {
        self.results.iter().filter(|r| r.required && !r.passed).collect()
    }

    pub fn passed(&self, min_ratio: f64) -> bool {
        self.required_failures().is_empty() && self.pass_ratio >= min_ratio
    }

    /// `question: reason` for every failed check.
    pub fn failure_reasons(&self) -> Vec<String> {
        self.results
            .iter()
            .filter(|r| !r.passed)
            .map(|r| format!("{} {}", r.question, r.reason))
            .collect()
    }
}

pub fn run_self_questions(ctx: &QuestionContext<'_>) -> SelfQuestionReport {
    let mut passed_weight = 0.0;
    let mut total_weight = 0.0;
    let results: Vec<SelfQuestionResult> = Question::ALL
        .iter()
        .map(|q| {
            let (passed, reason) = q.check(ctx);
            total_weight += q.weight();
            if passed {
                passed_weight += q.weight();
            }
            SelfQuestionResult {
                question: q.text().to_string(),
                passed,
                weight: q.weight(),
                required: q.required(),
                reason,
            }
        })
        .collect();

    SelfQuestionReport {
        results,
        pass_ratio: if total_weight > 0.0 { passed_weight / total_weight } else { 0.0 },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use trading_core::{
        IndicatorSignal, IndicatorSnapshot, Recommendation, TrendInfo,
    };

    fn analysis(now: DateTime<Utc>) -> TechnicalAnalysis {
        TechnicalAnalysis {
            asset_id: "AAPL".into(),
            price: 175.0,
            timestamp: now,
            trend: TrendInfo {
                direction: TrendDirection::Up,
                strength: 0.6,
                duration: 5,
            },
            indicators: IndicatorSnapshot::default(),
            support: vec![],
            resistance: vec![],
            signals: vec![IndicatorSignal {
                indicator: "rsi".into(),
                action: SignalAction::Buy,
                strength: 0.5,
                description: "oversold".into(),
            }],
            patterns: vec![],
            recommendation: Recommendation {
                action: SignalAction::Buy,
                strength: 0.5,
            },
        }
    }

    fn buy() -> TradeDecision {
        TradeDecision::new("AAPL", TradeAction::Buy, Some(Side::Buy), dec!(20), dec!(175))
            .with_levels(Some(dec!(170)), Some(dec!(185)))
            .with_confidence(0.8)
            .with_reasoning("trend continuation")
    }

    fn report(
        decision: &TradeDecision,
        analysis: &TechnicalAnalysis,
        now: DateTime<Utc>,
    ) -> SelfQuestionReport {
        let assessment = RiskAssessment::from_parts(10.0, vec![], vec![], vec![], None, None);
        let portfolio = Portfolio::new(dec!(100000));
        run_self_questions(&QuestionContext {
            decision,
            analysis,
            assessment: &assessment,
            regime: MarketRegime::classify(analysis),
            portfolio: &portfolio,
            max_position_size: dec!(0.10),
            max_loss_per_trade: dec!(0.02),
            max_analysis_age: Duration::minutes(5),
            now,
        })
    }

    #[test]
    fn test_sound_trade_passes_everything() {
        let now = Utc::now();
        let report = report(&buy(), &analysis(now), now);
        assert_eq!(report.results.len(), Question::ALL.len());
        assert!(report.results.iter().all(|r| r.passed), "{:?}", report.failure_reasons());
        assert!((report.pass_ratio - 1.0).abs() < 1e-12);
        assert!(report.passed(0.6));
    }

    #[test]
    fn test_missing_stop_fails_required_check() {
        let now = Utc::now();
        let decision = buy().with_levels(None, None);
        let report = report(&decision, &analysis(now), now);
        let failures = report.required_failures();
        assert!(failures.iter().any(|r| r.question == Question::IfWrong.text()));
        assert!(!report.passed(0.0));
    }

    #[test]
    fn test_stale_analysis_fails() {
        let now = Utc::now();
        let stale = analysis(now - Duration::minutes(6));
        let report = report(&buy(), &stale, now);
        assert!(!report.passed(0.6));
        assert!(report.failure_reasons()[0].contains("old"));
    }

    #[test]
    fn test_optional_failures_only_lower_the_ratio() {
        let now = Utc::now();
        let mut a = analysis(now);
        a.trend.direction = TrendDirection::Down;
        a.trend.duration = 1;
        a.signals[0].action = SignalAction::Sell;
        let report = report(&buy(), &a, now);
        assert!(report.required_failures().is_empty());
        // recency and confirmation fail: 1.5 of 8.0
        assert!((report.pass_ratio - 6.5 / 8.0).abs() < 1e-12);
        assert!(report.passed(0.6));
    }

    #[test]
    fn test_oversized_loss_breaks_mandate() {
        let now = Utc::now();
        let decision = buy().with_quantity(dec!(500));
        let report = report(&decision, &analysis(now), now);
        assert!(report
            .required_failures()
            .iter()
            .any(|r| r.question == Question::Mandate.text()));
    }
}
