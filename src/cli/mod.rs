//! Command-line interface.

pub mod commands;
pub mod output;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;

pub use commands::checkpoint::CheckpointCommands;
pub use commands::config::ConfigCommands;
pub use commands::init::InitArgs;
pub use commands::run::{ResumeArgs, RunArgs};

#[derive(Parser, Debug)]
#[command(name = "synthloop")]
#[command(about = "Synthloop - iteration control loop for evaluation sample synthesis", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file (defaults to .synthloop/config.yaml + local.yaml + env)
    #[arg(short, long, global = true, env = "SYNTHLOOP_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create .synthloop/ with a default config and checkpoint database
    Init(InitArgs),

    /// Start a new run
    Run(RunArgs),

    /// Resume a run from its latest checkpoint
    Resume(ResumeArgs),

    /// Inspect or discard checkpoints
    #[command(subcommand)]
    Checkpoint(CheckpointCommands),

    /// Show or validate the effective configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Load the effective configuration, from `path` when given.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
    .context("Failed to load configuration")
}

/// Print an error the way the output mode expects and exit non-zero.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let causes: Vec<String> = err.chain().skip(1).map(ToString::to_string).collect();
        let body = serde_json::json!({
            "success": false,
            "error": err.to_string(),
            "causes": causes,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.to_string())
        );
    } else {
        eprintln!("Error: {err}");
        for cause in err.chain().skip(1) {
            eprintln!("  caused by: {cause}");
        }
    }
    std::process::exit(1)
}
