//! Infrastructure layer module
//!
//! Cross-cutting concerns that are not part of the control loop itself:
//! - Configuration management (figment)
//! - Logging infrastructure (tracing)

pub mod config;
pub mod logging;
