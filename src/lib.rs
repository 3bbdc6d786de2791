//! Synthloop - iteration control loop for LLM-driven evaluation sample synthesis
//!
//! Synthloop decides, after every round of a design → generation → evaluation
//! pipeline, whether to stop or which category to retry. It enforces attempt
//! budgets, detects convergence and oscillation, escalates systemic defects,
//! weighs cost against expected improvement, keeps each agent's context
//! below its capacity, and checkpoints every step so a run survives a crash.
//!
//! # Architecture
//!
//! The crate follows a hexagonal layout:
//!
//! - **Domain Layer** (`domain`): models, pure analyzers and port traits
//! - **Service Layer** (`services`): decision engine, context compactor,
//!   run coordinator and run pool
//! - **Adapters** (`adapters`): sqlite and in-memory checkpoint stores,
//!   scripted collaborators
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use synthloop::adapters::{ExtractiveSummarizer, InMemoryCheckpointStore, ScriptedApproval, ScriptedExecutor};
//! use synthloop::services::{Collaborators, RunCoordinator};
//!
//! let collaborators = Collaborators {
//!     executor: Arc::new(ScriptedExecutor::new(rounds)),
//!     approval: Arc::new(ScriptedApproval::auto_approve()),
//!     summarizer: Arc::new(ExtractiveSummarizer::default()),
//!     store: Arc::new(InMemoryCheckpointStore::new()),
//! };
//! let outcome = RunCoordinator::new(Config::default(), collaborators).run().await?;
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{Category, Config, Decision, RoundResult, RunState};
pub use domain::ports::{ApprovalSignal, CheckpointStore, RoundExecutor, Summarizer};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{Collaborators, RunCoordinator, RunOutcome, RunPool};
