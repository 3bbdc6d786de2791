//! `synthloop config show|validate`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use serde::Serialize;

use crate::cli::load_config;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration as YAML
    Show,

    /// Check the configuration and report the first invalid option
    Validate,
}

#[derive(Debug, Serialize)]
pub struct ConfigShowOutput {
    pub config: Config,
}

impl CommandOutput for ConfigShowOutput {
    fn to_human(&self) -> String {
        serde_yaml::to_string(&self.config).unwrap_or_default()
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
pub struct ConfigValidateOutput {
    pub valid: bool,
    pub message: String,
}

impl CommandOutput for ConfigValidateOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }
}

pub fn execute(command: ConfigCommands, config_path: Option<PathBuf>, json_mode: bool) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            let config = load_config(config_path.as_deref())?;
            output(&ConfigShowOutput { config }, json_mode);
            Ok(())
        }
        ConfigCommands::Validate => match load_config(config_path.as_deref()) {
            Ok(_) => {
                output(
                    &ConfigValidateOutput {
                        valid: true,
                        message: "Configuration is valid.".to_string(),
                    },
                    json_mode,
                );
                Ok(())
            }
            Err(err) => {
                let message = format!("{err:#}");
                output(
                    &ConfigValidateOutput {
                        valid: false,
                        message: message.clone(),
                    },
                    json_mode,
                );
                Err(err).context("Configuration is invalid")
            }
        },
    }
}
