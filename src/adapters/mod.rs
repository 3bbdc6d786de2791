//! Adapters implementing the domain ports.
//!
//! - `sqlite`: durable checkpoint store
//! - `memory`: in-process checkpoint store
//! - `scripted`: script-driven executor, approvals and an extractive summarizer

pub mod memory;
pub mod scripted;
pub mod sqlite;

pub use memory::InMemoryCheckpointStore;
pub use scripted::{
    ExtractiveSummarizer, RunScript, ScriptedApproval, ScriptedExecutor, StdinApproval,
};
pub use sqlite::SqliteCheckpointStore;
