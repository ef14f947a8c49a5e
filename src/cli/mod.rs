//! CLI definitions.

pub mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use trading_core::AutonomyLevel;

#[derive(Parser)]
#[command(name = "autotrader")]
#[command(author, version, about = "Supervised-to-autonomous trading agent on a paper broker")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml", global = true)]
    pub config: PathBuf,

    /// Log level, overriding the config file
    #[arg(short, long, global = true)]
    pub log_level: Option<LogLevel>,

    /// Enable JSON log format
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the control loop until Ctrl-C
    Run(RunArgs),
    /// Run the control loop and read commands from stdin
    Console(RunArgs),
    /// Analyze one asset once without trading
    Analyze(AnalyzeArgs),
    /// List available strategies
    Strategies,
    /// Validate configuration
    ValidateConfig(ValidateArgs),
}

#[derive(clap::Args)]
pub struct RunArgs {
    /// Autonomy level, overriding the config file
    #[arg(short, long, value_parser = parse_autonomy)]
    pub autonomy: Option<AutonomyLevel>,

    /// Cancel open orders and close every position on exit
    #[arg(long)]
    pub flatten_on_exit: bool,

    /// Paper market step interval in milliseconds
    #[arg(long, default_value = "1000")]
    pub tick_ms: u64,
}

#[derive(clap::Args)]
pub struct AnalyzeArgs {
    /// Asset to analyze, e.g. AAPL
    pub asset: String,
}

#[derive(clap::Args)]
pub struct ValidateArgs {
    /// Print the effective configuration after validation
    #[arg(long)]
    pub print: bool,
}

fn parse_autonomy(value: &str) -> Result<AutonomyLevel, String> {
    value.parse()
}
