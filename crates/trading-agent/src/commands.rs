//! Text commands and their mapping onto service calls.

use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;
use trading_core::{AutonomyLevel, Order, Position, Side};
use trading_risk::{CircuitBreaker, PnlSummary};
use uuid::Uuid;

use crate::error::AgentResult;
use crate::service::{AnalysisReport, EmergencyStopReport, TradingService};
use crate::state::{AITradingState, PendingDecision};

pub const HELP: &str = "\
start                      start the control loop
stop                       stop the control loop
status                     agent state
buy <qty> <asset>          manual buy
sell <qty> <asset>         manual sell
positions                  open positions
pnl                        realized PnL and performance
risk                       circuit breakers
pending                    decisions awaiting confirmation
set_autonomy <level>       advisory | semi_auto | full_auto | guardian
confirm <id>               execute a pending decision
reject <id>                drop a pending decision
analyze <asset>            run the pipeline once without trading
emergency [reason]         cancel everything and flatten
quit";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    #[error("Empty command")]
    Empty,

    #[error("Unknown command: {0}")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Invalid {what}: {value}")]
    InvalidArgument { what: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    Stop,
    Status,
    Trade { side: Side, quantity: Decimal, asset_id: String },
    Positions,
    Pnl,
    Risk,
    Pending,
    SetAutonomy(AutonomyLevel),
    Confirm(Uuid),
    Reject(Uuid),
    Analyze(String),
    Emergency(String),
    Help,
    Quit,
}

fn uuid_arg(value: Option<&str>, usage: &'static str) -> Result<Uuid, CommandError> {
    let value = value.ok_or(CommandError::Usage(usage))?;
    Uuid::parse_str(value).map_err(|_| CommandError::InvalidArgument {
        what: "decision id",
        value: value.to_string(),
    })
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let verb = words.next().ok_or(CommandError::Empty)?.to_lowercase();
        let command = match verb.as_str() {
            "start" => Command::Start,
            "stop" => Command::Stop,
            "status" => Command::Status,
            "buy" | "sell" => {
                let usage = "buy|sell <qty> <asset>";
                let quantity = words.next().ok_or(CommandError::Usage(usage))?;
                let asset_id = words.next().ok_or(CommandError::Usage(usage))?;
                let quantity =
                    Decimal::from_str(quantity).map_err(|_| CommandError::InvalidArgument {
                        what: "quantity",
                        value: quantity.to_string(),
                    })?;
                let side = if verb == "buy" { Side::Buy } else { Side::Sell };
                Command::Trade {
                    side,
                    quantity,
                    asset_id: asset_id.to_uppercase(),
                }
            }
            "positions" => Command::Positions,
            "pnl" => Command::Pnl,
            "risk" => Command::Risk,
            "pending" => Command::Pending,
            "set_autonomy" | "autonomy" => {
                let level = words.next().ok_or(CommandError::Usage("set_autonomy <level>"))?;
                let level =
                    AutonomyLevel::from_str(level).map_err(|_| CommandError::InvalidArgument {
                        what: "autonomy level",
                        value: level.to_string(),
                    })?;
                Command::SetAutonomy(level)
            }
            "confirm" => Command::Confirm(uuid_arg(words.next(), "confirm <id>")?),
            "reject" => Command::Reject(uuid_arg(words.next(), "reject <id>")?),
            "analyze" => {
                let asset_id = words.next().ok_or(CommandError::Usage("analyze <asset>"))?;
                Command::Analyze(asset_id.to_uppercase())
            }
            "emergency" => {
                let reason = words.collect::<Vec<_>>().join(" ");
                Command::Emergency(if reason.is_empty() { "manual".into() } else { reason })
            }
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}

/// Result of one command, for the caller to render.
#[derive(Debug, Clone)]
pub enum CommandOutput {
    Started,
    Stopped { was_active: bool },
    State(Box<AITradingState>),
    Orders(Vec<Order>),
    Positions(Vec<Position>),
    Pnl(PnlSummary),
    Breakers(Vec<CircuitBreaker>),
    Pending(Vec<PendingDecision>),
    AutonomySet(AutonomyLevel),
    Rejected(PendingDecision),
    Analysis(Box<AnalysisReport>),
    EmergencyStop(EmergencyStopReport),
    Help,
    Quit,
}

impl TradingService {
    /// Run one parsed command against the service.
    pub async fn execute(&self, command: Command) -> AgentResult<CommandOutput> {
        let output = match command {
            Command::Start => {
                self.start().await?;
                CommandOutput::Started
            }
            Command::Stop => CommandOutput::Stopped {
                was_active: self.stop("stopped by user"),
            },
            Command::Status => CommandOutput::State(Box::new(self.get_state().await?)),
            Command::Trade {
                side,
                quantity,
                asset_id,
            } => CommandOutput::Orders(self.request_trade(&asset_id, side, quantity).await?),
            Command::Positions => CommandOutput::Positions(self.get_positions().await?),
            Command::Pnl => CommandOutput::Pnl(self.get_pnl_summary()),
            Command::Risk => CommandOutput::Breakers(self.get_circuit_breaker_status()),
            Command::Pending => CommandOutput::Pending(self.pending_decisions()),
            Command::SetAutonomy(level) => {
                self.set_autonomy_level(level);
                CommandOutput::AutonomySet(level)
            }
            Command::Confirm(id) => CommandOutput::Orders(self.confirm_pending_decision(id).await?),
            Command::Reject(id) => CommandOutput::Rejected(self.reject_pending_decision(id)?),
            Command::Analyze(asset_id) => {
                CommandOutput::Analysis(Box::new(self.analyze_once(&asset_id).await?))
            }
            Command::Emergency(reason) => {
                CommandOutput::EmergencyStop(self.emergency_stop(&reason).await)
            }
            Command::Help => CommandOutput::Help,
            Command::Quit => CommandOutput::Quit,
        };
        Ok(output)
    }
}
