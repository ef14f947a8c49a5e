//! What the agent may do with a decision on its own.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use trading_core::{AutonomyLevel, Position, TradeDecision};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "verdict", content = "reason")]
pub enum AutonomyVerdict {
    /// Place the orders now
    Execute,
    /// Queue for a human to confirm or reject
    Confirm,
    /// Report only
    Suggest,
    Suppress(String),
}

/// Route a decision according to the autonomy level.
///
/// `full_auto` above `max_auto_notional` falls back to confirmation.
/// `guardian` lets through only decisions that reduce exposure on
/// `position`.
pub fn autonomy_filter(
    level: AutonomyLevel,
    decision: &TradeDecision,
    position: Option<&Position>,
    max_auto_notional: Decimal,
) -> AutonomyVerdict {
    if !decision.action.is_actionable() {
        return AutonomyVerdict::Suppress("nothing to do on hold".into());
    }
    match level {
        AutonomyLevel::Advisory => AutonomyVerdict::Suggest,
        AutonomyLevel::SemiAuto => AutonomyVerdict::Confirm,
        AutonomyLevel::FullAuto => {
            if decision.notional() <= max_auto_notional {
                AutonomyVerdict::Execute
            } else {
                AutonomyVerdict::Confirm
            }
        }
        AutonomyLevel::Guardian => {
            if decision.is_risk_reducing(position) {
                AutonomyVerdict::Execute
            } else {
                AutonomyVerdict::Suppress(format!(
                    "guardian mode only takes protective exits, not {}",
                    decision.action
                ))
            }
        }
    }
}
