//! Synthloop CLI entry point.

use clap::Parser;

use synthloop::cli::{Cli, Commands};
use synthloop::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logging follows the configured options when they load; a broken
    // configuration is reported by the command itself.
    let log_config = synthloop::cli::load_config(cli.config.as_deref())
        .ok()
        .and_then(|config| LogConfig::try_from(&config.logging).ok())
        .unwrap_or_default();
    let _logger = match LoggerImpl::init(&log_config) {
        Ok(logger) => Some(logger),
        Err(err) => {
            eprintln!("warning: logging disabled: {err:#}");
            None
        }
    };

    let config_path = cli.config.clone();
    let result = match cli.command {
        Commands::Init(args) => synthloop::cli::commands::init::execute(args, cli.json).await,
        Commands::Run(args) => synthloop::cli::commands::run::execute_run(args, config_path, cli.json).await,
        Commands::Resume(args) => {
            synthloop::cli::commands::run::execute_resume(args, config_path, cli.json).await
        }
        Commands::Checkpoint(command) => {
            synthloop::cli::commands::checkpoint::execute(command, config_path, cli.json).await
        }
        Commands::Config(command) => synthloop::cli::commands::config::execute(command, config_path, cli.json),
    };

    if let Err(err) = result {
        synthloop::cli::handle_error(err, cli.json);
    }
}
