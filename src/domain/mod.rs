//! Domain layer for the synthloop control loop
//!
//! This module contains the pure analyzers, run state and collaborator ports.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
