//! Bounded context log with summary-based compaction.
//!
//! Compaction replaces the log with `[pinned first turn?, summary, ...last N]`
//! in one assignment. It only runs when the coordinator asks at a round
//! boundary, so a round always sees its own turns in full.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::errors::DomainResult;
use crate::domain::models::{AgentRole, CompactionConfig, ContextLog, Turn, TurnRole};
use crate::domain::ports::Summarizer;
use crate::services::retry::RetryPolicy;

/// Record of one executed compaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactionEvent {
    pub role: AgentRole,
    pub threshold_tokens: usize,
    pub tokens_before: usize,
    pub tokens_after: usize,
    /// Turns folded into the summary.
    pub turns_compacted: usize,
    /// Turns carried over verbatim (including a pinned first turn).
    pub turns_kept: usize,
    /// Turns whose payload had to be cut to satisfy the threshold.
    pub truncated_turns: usize,
    pub forced: bool,
}

/// Owns a run's context log and keeps it under the active role's threshold.
pub struct ContextCompactor {
    log: ContextLog,
    config: CompactionConfig,
    summarizer: Arc<dyn Summarizer>,
    retry: RetryPolicy,
    role: AgentRole,
    /// Turns were appended since the last compaction.
    dirty: bool,
    force_requested: bool,
}

impl ContextCompactor {
    pub fn new(
        config: CompactionConfig,
        summarizer: Arc<dyn Summarizer>,
        retry: RetryPolicy,
        role: AgentRole,
    ) -> Self {
        Self {
            log: ContextLog::new(),
            config,
            summarizer,
            retry,
            role,
            dirty: false,
            force_requested: false,
        }
    }

    /// Resume with a previously checkpointed log. It is not compacted again
    /// until a new turn is appended.
    #[must_use]
    pub fn with_log(mut self, log: ContextLog) -> Self {
        self.dirty = false;
        self.log = log;
        self
    }

    pub fn append(&mut self, turn: Turn) {
        self.log.push(turn);
        self.dirty = true;
    }

    pub fn extend(&mut self, turns: impl IntoIterator<Item = Turn>) {
        for turn in turns {
            self.append(turn);
        }
    }

    pub const fn log(&self) -> &ContextLog {
        &self.log
    }

    pub const fn role(&self) -> AgentRole {
        self.role
    }

    pub fn set_role(&mut self, role: AgentRole) {
        self.role = role;
    }

    pub fn threshold_tokens(&self) -> usize {
        self.config.threshold_tokens(self.role)
    }

    /// Compact at the next boundary even if the log is below the threshold.
    pub fn request_compaction(&mut self) {
        self.force_requested = true;
    }

    /// Compact if the log crossed the threshold (or a compaction was
    /// requested) and something was appended since the last compaction.
    ///
    /// On summarizer failure the log is left exactly as it was.
    pub async fn maybe_compact(&mut self) -> DomainResult<Option<CompactionEvent>> {
        let forced = std::mem::take(&mut self.force_requested);
        if !self.dirty || self.log.is_empty() {
            return Ok(None);
        }

        let threshold = self.threshold_tokens();
        let tokens_before = self.log.total_size();
        if tokens_before < threshold && !forced {
            return Ok(None);
        }

        let summarizer = &self.summarizer;
        let log = &self.log;
        let summary = self.retry.execute(|| summarizer.summarize(log)).await?;
        let mut summary = summary.normalized();
        summary.role = TurnRole::Summary;

        let turns = self.log.turns();
        let pinned = if self.config.preserve_first_turn && turns.len() > 1 {
            Some(turns[0].clone())
        } else {
            None
        };
        let body = &turns[usize::from(pinned.is_some())..];
        let keep = self
            .config
            .role(self.role)
            .recent_turns_kept
            .min(body.len().saturating_sub(1));
        let (older, recent) = body.split_at(body.len() - keep);

        let mut compacted: Vec<Turn> = Vec::with_capacity(keep + 2);
        compacted.extend(pinned.iter().cloned());
        compacted.push(summary);
        compacted.extend(recent.iter().cloned());

        let truncated_turns = fit_below(&mut compacted, threshold);
        let turns_kept = recent.len() + usize::from(pinned.is_some());
        let turns_compacted = older.len();

        self.log = ContextLog::from_turns(compacted);
        self.dirty = false;

        let event = CompactionEvent {
            role: self.role,
            threshold_tokens: threshold,
            tokens_before,
            tokens_after: self.log.total_size(),
            turns_compacted,
            turns_kept,
            truncated_turns,
            forced,
        };
        info!(
            role = event.role.as_str(),
            tokens_before = event.tokens_before,
            tokens_after = event.tokens_after,
            turns_compacted = event.turns_compacted,
            truncated_turns = event.truncated_turns,
            forced = event.forced,
            "Context compacted"
        );
        Ok(Some(event))
    }
}

/// Truncate the largest turns until the total is strictly below `threshold`.
/// Returns how many turns were cut.
fn fit_below(turns: &mut [Turn], threshold: usize) -> usize {
    let total: usize = turns.iter().map(|t| t.size_estimate).sum();
    if total < threshold || turns.is_empty() {
        return 0;
    }
    let sizes: Vec<usize> = turns.iter().map(|t| t.size_estimate).collect();
    let cap = fair_share_cap(&sizes, threshold.saturating_sub(1));
    debug!(threshold, total, cap, "Truncating oversized turns after compaction");
    turns
        .iter_mut()
        .map(|t| t.truncate_to(cap))
        .filter(|cut| *cut)
        .count()
}

/// Largest per-turn cap such that `sum(min(size, cap)) <= budget`. Turns at
/// or under their fair share are left whole.
fn fair_share_cap(sizes: &[usize], budget: usize) -> usize {
    let mut sorted = sizes.to_vec();
    sorted.sort_unstable();
    let mut remaining = budget;
    let mut left = sorted.len();
    for size in sorted {
        let share = remaining / left;
        if size > share {
            return share;
        }
        remaining -= size;
        left -= 1;
    }
    usize::MAX
}
