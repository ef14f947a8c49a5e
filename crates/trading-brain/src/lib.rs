//! Decision brain.
//!
//! Folds a technical analysis and the fused strategy signal into a
//! [`TradeDecision`](trading_core::TradeDecision), questions it, and routes
//! it according to the autonomy level. Also home of the control-loop
//! status machine.

mod autonomy;
mod brain;
mod config;
mod error;
mod regime;
mod self_question;
mod status;

pub use autonomy::{autonomy_filter, AutonomyVerdict};
pub use brain::{DecisionBrain, DecisionContext, Deliberation, TrackedLevels};
pub use config::BrainConfig;
pub use error::{BrainError, BrainResult};
pub use regime::MarketRegime;
pub use self_question::{run_self_questions, Question, QuestionContext, SelfQuestionReport};
pub use status::{AgentStatus, StatusMachine};
