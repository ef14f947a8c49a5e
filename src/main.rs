//! Trading agent CLI application.

mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;
use trading_config::load_config;
use trading_monitor::{setup_logging, LogFile};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let loaded = load_config(&cli.config);

    // Setup logging; the config file decides unless overridden on the command line
    let logging = loaded.as_ref().map(|c| c.logging.clone()).unwrap_or_default();
    let level = cli.log_level.map(|l| l.as_str().to_string()).unwrap_or(logging.level.clone());
    let file = logging.directory.as_deref().map(|directory| LogFile {
        directory: Path::new(directory),
        prefix: &logging.file_prefix,
    });
    let _log_guard = setup_logging(&level, cli.json_logs || logging.is_json(), file);

    // Execute command
    match cli.command {
        Commands::Run(args) => cli::commands::run::run(args, loaded?).await,
        Commands::Console(args) => cli::commands::console::run(args, loaded?).await,
        Commands::Analyze(args) => cli::commands::analyze::run(args, loaded?).await,
        Commands::Strategies => cli::commands::strategies::run().await,
        Commands::ValidateConfig(args) => {
            cli::commands::validate::run(args, &cli.config, loaded).await
        }
    }
}
