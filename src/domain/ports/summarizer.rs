//! Summarizer port used by the context compactor.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{ContextLog, Turn};

/// Produces the summary turn that replaces compacted history.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Condense `log` into a single summary turn.
    async fn summarize(&self, log: &ContextLog) -> DomainResult<Turn>;
}
