//! Configuration management infrastructure
//!
//! Hierarchical configuration using figment:
//! - Serialized defaults
//! - Project YAML files under `.synthloop/`
//! - `SYNTHLOOP_*` environment overrides
//! - Validation of every threshold and limit

pub mod loader;

pub use loader::{ConfigError, ConfigLoader};
