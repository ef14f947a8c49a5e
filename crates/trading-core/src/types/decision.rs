//! Risk assessments and trade decisions.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{OrderRequest, OrderType, Position, Side};

/// Default lifetime of a decision before it must be re-derived.
pub const DECISION_TTL_MINUTES: i64 = 5;

/// Action carried by a trade decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Buy,
    Sell,
    Hold,
    /// Flatten an existing position
    Close,
}

impl TradeAction {
    /// Whether the decision needs an order at all.
    pub fn is_actionable(&self) -> bool {
        !matches!(self, TradeAction::Hold)
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeAction::Buy => write!(f, "buy"),
            TradeAction::Sell => write!(f, "sell"),
            TradeAction::Hold => write!(f, "hold"),
            TradeAction::Close => write!(f, "close"),
        }
    }
}

/// Coarse risk bucket derived from the cumulative score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// <25 low, <50 medium, <80 high, else critical.
    pub fn from_score(score: f64) -> Self {
        if score < 25.0 {
            RiskLevel::Low
        } else if score < 50.0 {
            RiskLevel::Medium
        } else if score < 80.0 {
            RiskLevel::High
        } else {
            RiskLevel::Critical
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        };
        write!(f, "{}", s)
    }
}

/// Result of running a candidate decision through the risk layers.
/// Never mutated once built; a new candidate gets a new assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub overall_risk: RiskLevel,
    pub score: f64,
    pub warnings: Vec<String>,
    pub blocks: Vec<String>,
    pub recommendations: Vec<String>,
    pub can_trade: bool,
    /// Quantity the risk layers would accept, when it differs from the request
    pub adjusted_quantity: Option<Decimal>,
    /// Stop the risk layers computed when the candidate had none
    pub adjusted_stop_loss: Option<Decimal>,
    pub assessed_at: DateTime<Utc>,
}

impl RiskAssessment {
    /// Build the final assessment from accumulated layer output.
    pub fn from_parts(
        score: f64,
        warnings: Vec<String>,
        blocks: Vec<String>,
        recommendations: Vec<String>,
        adjusted_quantity: Option<Decimal>,
        adjusted_stop_loss: Option<Decimal>,
    ) -> Self {
        let overall_risk = RiskLevel::from_score(score);
        let can_trade = blocks.is_empty() && overall_risk != RiskLevel::Critical;
        Self {
            overall_risk,
            score,
            warnings,
            blocks,
            recommendations,
            can_trade,
            adjusted_quantity,
            adjusted_stop_loss,
            assessed_at: Utc::now(),
        }
    }

    pub fn is_blocked(&self) -> bool {
        !self.blocks.is_empty()
    }

    /// Human-readable reasons the trade cannot proceed.
    pub fn rejection_reasons(&self) -> Vec<String> {
        let mut reasons = self.blocks.clone();
        if reasons.is_empty() && !self.can_trade {
            reasons.push(format!("overall risk {} (score {:.0})", self.overall_risk, self.score));
        }
        reasons
    }
}

/// Outcome of one self-questioning check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfQuestionResult {
    pub question: String,
    pub passed: bool,
    pub weight: f64,
    pub required: bool,
    pub reason: String,
}

/// How much the agent may do on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AutonomyLevel {
    /// Suggest only
    #[default]
    Advisory,
    /// Queue decisions for confirmation
    SemiAuto,
    /// Execute within notional limits
    FullAuto,
    /// Only protective exits
    Guardian,
}

impl fmt::Display for AutonomyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AutonomyLevel::Advisory => "advisory",
            AutonomyLevel::SemiAuto => "semi_auto",
            AutonomyLevel::FullAuto => "full_auto",
            AutonomyLevel::Guardian => "guardian",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for AutonomyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "advisory" => Ok(AutonomyLevel::Advisory),
            "semi_auto" | "semi" => Ok(AutonomyLevel::SemiAuto),
            "full_auto" | "full" | "auto" => Ok(AutonomyLevel::FullAuto),
            "guardian" => Ok(AutonomyLevel::Guardian),
            _ => Err(format!("Invalid autonomy level: {}", s)),
        }
    }
}

/// A fully specified trade decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeDecision {
    pub id: Uuid,
    pub asset_id: String,
    pub action: TradeAction,
    /// Order side; `None` for hold
    pub side: Option<Side>,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub risk_reward: f64,
    pub confidence: f64,
    pub reasoning: String,
    pub risk_assessment: Option<RiskAssessment>,
    pub self_questions: Vec<SelfQuestionResult>,
    /// Strategies whose signals contributed
    pub strategy_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub executed: bool,
}

impl TradeDecision {
    /// A candidate decision with default lifetime and no risk data attached.
    pub fn new(
        asset_id: impl Into<String>,
        action: TradeAction,
        side: Option<Side>,
        quantity: Decimal,
        entry_price: Decimal,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            asset_id: asset_id.into(),
            action,
            side: if action.is_actionable() { side } else { None },
            order_type: OrderType::Market,
            quantity,
            entry_price,
            stop_loss: None,
            take_profit: None,
            risk_reward: 0.0,
            confidence: 0.0,
            reasoning: String::new(),
            risk_assessment: None,
            self_questions: Vec::new(),
            strategy_ids: Vec::new(),
            created_at: now,
            expires_at: now + Duration::minutes(DECISION_TTL_MINUTES),
            executed: false,
        }
    }

    /// A hold decision explaining why nothing is done.
    pub fn hold(asset_id: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self::new(asset_id, TradeAction::Hold, None, Decimal::ZERO, Decimal::ZERO)
            .with_reasoning(reasoning)
    }

    pub fn with_levels(mut self, stop_loss: Option<Decimal>, take_profit: Option<Decimal>) -> Self {
        self.stop_loss = stop_loss;
        self.take_profit = take_profit;
        self.risk_reward = self.compute_risk_reward();
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    pub fn with_order_type(mut self, order_type: OrderType) -> Self {
        self.order_type = order_type;
        self
    }

    pub fn with_strategies(mut self, strategy_ids: Vec<String>) -> Self {
        self.strategy_ids = strategy_ids;
        self
    }

    pub fn with_risk_assessment(mut self, assessment: RiskAssessment) -> Self {
        self.risk_assessment = Some(assessment);
        self
    }

    pub fn with_self_questions(mut self, results: Vec<SelfQuestionResult>) -> Self {
        self.self_questions = results;
        self
    }

    pub fn with_quantity(mut self, quantity: Decimal) -> Self {
        self.quantity = quantity;
        self
    }

    /// Coerce buy/sell without a positive entry price to hold.
    pub fn with_entry_invariant(mut self) -> Self {
        if matches!(self.action, TradeAction::Buy | TradeAction::Sell)
            && self.entry_price <= Decimal::ZERO
        {
            self.action = TradeAction::Hold;
            self.side = None;
            if !self.reasoning.is_empty() {
                self.reasoning.push_str("; ");
            }
            self.reasoning.push_str("no valid entry price, holding");
        }
        self
    }

    /// Reward over risk measured from the entry price.
    fn compute_risk_reward(&self) -> f64 {
        use num_traits::ToPrimitive;

        match (self.stop_loss, self.take_profit) {
            (Some(stop), Some(target)) => {
                let risk = (self.entry_price - stop).abs();
                let reward = (target - self.entry_price).abs();
                if risk.is_zero() {
                    0.0
                } else {
                    (reward / risk).to_f64().unwrap_or(0.0)
                }
            }
            _ => 0.0,
        }
    }

    pub fn notional(&self) -> Decimal {
        self.quantity * self.entry_price
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether executing this decision lowers exposure on `position`.
    pub fn is_risk_reducing(&self, position: Option<&Position>) -> bool {
        match self.action {
            TradeAction::Close => true,
            TradeAction::Sell => position.is_some_and(|p| p.is_long()),
            TradeAction::Buy => position.is_some_and(|p| p.is_short()),
            TradeAction::Hold => false,
        }
    }

    /// Order request realizing this decision, or `None` for hold.
    pub fn order_request(&self) -> Option<OrderRequest> {
        let side = self.side?;
        if !self.action.is_actionable() || self.quantity <= Decimal::ZERO {
            return None;
        }
        let request = match self.order_type {
            OrderType::Limit => {
                OrderRequest::limit(self.asset_id.clone(), side, self.quantity, self.entry_price)
            }
            _ => OrderRequest::market(self.asset_id.clone(), side, self.quantity),
        };
        Some(request.with_client_order_id(self.id.to_string()))
    }

    /// The same decision marked executed.
    pub fn into_executed(self) -> Self {
        Self {
            executed: true,
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_risk_level_thresholds() {
        assert_eq!(RiskLevel::from_score(0.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(24.9), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(25.0), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(79.0), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(120.0), RiskLevel::Critical);
    }

    #[test]
    fn test_assessment_can_trade() {
        let ok = RiskAssessment::from_parts(10.0, vec![], vec![], vec![], None, None);
        assert!(ok.can_trade);

        let rejections = vec!["daily limit".to_string()];
        let blocked = RiskAssessment::from_parts(10.0, vec![], rejections, vec![], None, None);
        assert!(!blocked.can_trade);
        assert_eq!(blocked.rejection_reasons(), vec!["daily limit".to_string()]);

        let critical = RiskAssessment::from_parts(85.0, vec![], vec![], vec![], None, None);
        assert!(!critical.can_trade);
        assert_eq!(critical.rejection_reasons().len(), 1);
    }

    #[test]
    fn test_entry_invariant_coerces_hold() {
        let decision =
            TradeDecision::new("AAPL", TradeAction::Buy, Some(Side::Buy), dec!(10), dec!(0))
                .with_entry_invariant();
        assert_eq!(decision.action, TradeAction::Hold);
        assert!(decision.side.is_none());
        assert!(decision.order_request().is_none());
    }

    #[test]
    fn test_risk_reward_and_notional() {
        let decision =
            TradeDecision::new("AAPL", TradeAction::Buy, Some(Side::Buy), dec!(10), dec!(100))
                .with_levels(Some(dec!(98)), Some(dec!(104)));
        assert!((decision.risk_reward - 2.0).abs() < 1e-9);
        assert_eq!(decision.notional(), dec!(1000));
    }

    #[test]
    fn test_into_executed_keeps_identity() {
        let decision =
            TradeDecision::new("AAPL", TradeAction::Sell, Some(Side::Sell), dec!(5), dec!(50));
        let id = decision.id;
        let executed = decision.into_executed();
        assert!(executed.executed);
        assert_eq!(executed.id, id);
    }

    #[test]
    fn test_risk_reducing() {
        let long = Position::new("AAPL", dec!(10), dec!(100));
        let sell =
            TradeDecision::new("AAPL", TradeAction::Sell, Some(Side::Sell), dec!(10), dec!(100));
        assert!(sell.is_risk_reducing(Some(&long)));
        assert!(!sell.is_risk_reducing(None));

        let buy =
            TradeDecision::new("AAPL", TradeAction::Buy, Some(Side::Buy), dec!(10), dec!(100));
        assert!(!buy.is_risk_reducing(Some(&long)));
    }

    #[test]
    fn test_autonomy_parse() {
        assert_eq!("semi-auto".parse::<AutonomyLevel>().unwrap(), AutonomyLevel::SemiAuto);
        assert_eq!("FULL_AUTO".parse::<AutonomyLevel>().unwrap(), AutonomyLevel::FullAuto);
        assert!("yolo".parse::<AutonomyLevel>().is_err());
        assert_eq!(AutonomyLevel::Guardian.to_string(), "guardian");
    }
}
