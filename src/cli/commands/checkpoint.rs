//! `synthloop checkpoint list|show|discard`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use serde::Serialize;
use uuid::Uuid;

use crate::cli::commands::open_store;
use crate::cli::load_config;
use crate::cli::output::{format_quality, output, table, truncate, CommandOutput};
use crate::domain::errors::DomainError;
use crate::domain::models::{Category, Checkpoint, CheckpointSummary};
use crate::domain::ports::CheckpointStore;

#[derive(Subcommand, Debug)]
pub enum CheckpointCommands {
    /// List recent checkpoints, newest first
    List {
        /// Maximum number of checkpoints to display
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show a checkpoint by checkpoint id, or the latest one of a run id
    Show {
        id: Uuid,
    },

    /// Delete every checkpoint of a run
    Discard {
        run_id: Uuid,
    },
}

#[derive(Debug, Serialize)]
pub struct CheckpointListOutput {
    pub checkpoints: Vec<CheckpointSummary>,
}

impl CommandOutput for CheckpointListOutput {
    fn to_human(&self) -> String {
        if self.checkpoints.is_empty() {
            return "No checkpoints found.".to_string();
        }
        let mut t = table(&["Checkpoint", "Run", "Seq", "State", "Round", "Quality", "Created"]);
        for cp in &self.checkpoints {
            t.add_row(vec![
                truncate(&cp.checkpoint_id.to_string(), 11),
                cp.run_id.to_string(),
                cp.sequence.to_string(),
                cp.state.to_string(),
                cp.round_index.to_string(),
                format_quality(cp.last_quality),
                cp.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            ]);
        }
        format!("{t}\n\nShowing {} checkpoint(s)", self.checkpoints.len())
    }
}

#[derive(Debug, Serialize)]
pub struct CheckpointShowOutput {
    pub checkpoint: Checkpoint,
}

impl CommandOutput for CheckpointShowOutput {
    fn to_human(&self) -> String {
        let cp = &self.checkpoint;
        let ctx = &cp.context;
        let mut lines = vec![
            format!("Checkpoint {}", cp.checkpoint_id),
            format!("  run:        {}", cp.run_id),
            format!("  sequence:   {}", cp.sequence),
            format!("  state:      {}", cp.state),
            format!("  created:    {}", cp.created_at.format("%Y-%m-%d %H:%M:%S UTC")),
            format!("  round:      {}", ctx.round_index),
            format!("  quality:    {}", format_quality(cp.last_quality())),
            format!("  next:       {}", ctx.next_category),
            format!("  tokens:     {}", ctx.tokens_spent),
            format!("  context:    {} turns", cp.context_log.len()),
        ];
        if let Some(decision) = &cp.last_decision {
            lines.push(format!("  decision:   {decision}"));
        }

        let mut budgets = table(&["Category", "Attempts", "Soft", "Hard", "Outstanding"]);
        for category in Category::ALL {
            let budget = ctx.ledger.category(category);
            budgets.add_row(vec![
                category.to_string(),
                budget.attempts.to_string(),
                budget.soft_limit.to_string(),
                budget.hard_limit.to_string(),
                ctx.outstanding
                    .get(&category)
                    .map_or(0, Vec::len)
                    .to_string(),
            ]);
        }
        lines.push(String::new());
        lines.push(budgets.to_string());
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct DiscardOutput {
    pub run_id: Uuid,
    pub discarded: u64,
}

impl CommandOutput for DiscardOutput {
    fn to_human(&self) -> String {
        format!(
            "Discarded {} checkpoint(s) of run {}",
            self.discarded, self.run_id
        )
    }
}

pub async fn execute(
    command: CheckpointCommands,
    config_path: Option<PathBuf>,
    json_mode: bool,
) -> Result<()> {
    let config = load_config(config_path.as_deref())?;
    let store = open_store(&config).await?;

    match command {
        CheckpointCommands::List { limit } => {
            let checkpoints = store.list(limit).await.context("Failed to list checkpoints")?;
            output(&CheckpointListOutput { checkpoints }, json_mode);
        }
        CheckpointCommands::Show { id } => {
            let checkpoint = match store.load(id).await? {
                Some(checkpoint) => checkpoint,
                None => store
                    .load_latest(id)
                    .await?
                    .ok_or_else(|| DomainError::CheckpointNotFound(id.to_string()))?,
            };
            output(&CheckpointShowOutput { checkpoint }, json_mode);
        }
        CheckpointCommands::Discard { run_id } => {
            let discarded = store
                .discard(run_id)
                .await
                .context("Failed to discard checkpoints")?;
            output(&DiscardOutput { run_id, discarded }, json_mode);
        }
    }
    Ok(())
}
