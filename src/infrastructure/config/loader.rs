use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::{Category, Config};

/// Configuration error types
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid budget.{category}: soft_limit ({soft}) exceeds hard_limit ({hard})")]
    SoftAboveHard {
        category: Category,
        soft: u32,
        hard: u32,
    },

    #[error("Invalid {0}: hard limit must be at least 1")]
    ZeroHardLimit(String),

    #[error("Invalid {option}: {value}. Must be in (0, 1]")]
    FractionOutOfRange { option: String, value: f64 },

    #[error("Invalid {option}: {value}. Must be in [0, 1]")]
    RateOutOfRange { option: String, value: f64 },

    #[error("Invalid quality.convergence_window: {0}. Must be at least 2")]
    WindowTooSmall(usize),

    #[error("Invalid quality.oscillation_flips: must be at least 1")]
    ZeroOscillationFlips,

    #[error("Invalid {option}: {value}. Must be positive")]
    NonPositive { option: String, value: f64 },

    #[error("Invalid compaction.{0}.capacity_tokens: must be at least 1")]
    ZeroCapacity(String),

    #[error("Invalid design.required_artifacts: artifact names cannot be empty")]
    EmptyArtifactName,

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidLogRotation(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must not exceed max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .synthloop/config.yaml (project config, created by init)
    /// 3. .synthloop/local.yaml (project local overrides, optional)
    /// 4. Environment variables (SYNTHLOOP_* prefix, `__` between levels)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".synthloop/config.yaml"))
            .merge(Yaml::file(".synthloop/local.yaml"))
            .merge(Env::prefixed("SYNTHLOOP_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        // Budgets
        for category in Category::ALL {
            let limits = config.budget.category(category);
            if limits.hard_limit == 0 {
                return Err(ConfigError::ZeroHardLimit(format!("budget.{category}")));
            }
            if limits.soft_limit > limits.hard_limit {
                return Err(ConfigError::SoftAboveHard {
                    category,
                    soft: limits.soft_limit,
                    hard: limits.hard_limit,
                });
            }
        }
        if config.budget.global_hard_limit == 0 {
            return Err(ConfigError::ZeroHardLimit(
                "budget.global_hard_limit".to_string(),
            ));
        }

        // Fractions
        check_fraction("quality.quality_target", config.quality.quality_target)?;
        check_fraction(
            "problems.critical_fraction_threshold",
            config.problems.critical_fraction_threshold,
        )?;
        check_fraction("compaction.trigger_fraction", config.compaction.trigger_fraction)?;
        check_fraction("cost.low_quality_floor", config.cost.low_quality_floor)?;
        check_rate("cost.learning_rate", config.cost.learning_rate)?;
        check_rate("quality.min_improvement", config.quality.min_improvement)?;

        // Windows and counts
        if config.quality.convergence_window < 2 {
            return Err(ConfigError::WindowTooSmall(
                config.quality.convergence_window,
            ));
        }
        if config.quality.oscillation_flips == 0 {
            return Err(ConfigError::ZeroOscillationFlips);
        }
        if config.problems.repeated_critical_threshold == 0 {
            return Err(ConfigError::NonPositive {
                option: "problems.repeated_critical_threshold".to_string(),
                value: 0.0,
            });
        }

        // Cost model
        check_positive(
            "cost.cost_per_percent_ceiling",
            config.cost.cost_per_percent_ceiling,
        )?;

        // Compaction
        if config.compaction.design.capacity_tokens == 0 {
            return Err(ConfigError::ZeroCapacity("design".to_string()));
        }
        if config.compaction.execution.capacity_tokens == 0 {
            return Err(ConfigError::ZeroCapacity("execution".to_string()));
        }

        // Design gate
        if config
            .design
            .required_artifacts
            .iter()
            .any(|name| name.trim().is_empty())
        {
            return Err(ConfigError::EmptyArtifactName);
        }

        // Retry
        if config.retry.initial_backoff_ms > config.retry.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                config.retry.initial_backoff_ms,
                config.retry.max_backoff_ms,
            ));
        }

        // Database
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(
                config.database.max_connections,
            ));
        }

        // Logging
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }
        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidLogRotation(
                config.logging.rotation.clone(),
            ));
        }

        Ok(())
    }
}

fn check_fraction(option: &str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::FractionOutOfRange {
            option: option.to_string(),
            value,
        })
    }
}

fn check_rate(option: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::RateOutOfRange {
            option: option.to_string(),
            value,
        })
    }
}

fn check_positive(option: &str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive {
            option: option.to_string(),
            value,
        })
    }
}
