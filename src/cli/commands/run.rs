//! `synthloop run` and `synthloop resume`.
//!
//! Both drive a coordinator with the scripted collaborators and a sqlite
//! checkpoint store. Ctrl-C cancels the run at the next safe point.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::adapters::scripted::{
    ExtractiveSummarizer, RunScript, ScriptedApproval, ScriptedExecutor, StdinApproval,
};
use crate::adapters::InMemoryCheckpointStore;
use crate::cli::commands::open_store;
use crate::cli::load_config;
use crate::cli::output::{format_quality, output, CommandOutput};
use crate::domain::models::Config;
use crate::domain::ports::{ApprovalSignal, CheckpointStore};
use crate::services::{Collaborators, RunCoordinator, RunOutcome};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// YAML script of round results and reviewer answers
    #[arg(short, long)]
    pub script: PathBuf,

    /// Requirement text; overrides the script's
    #[arg(short, long)]
    pub requirement: Option<String>,

    /// Ask for approvals on the terminal instead of using the script's answers
    #[arg(short, long)]
    pub interactive: bool,

    /// Keep checkpoints in memory only
    #[arg(long)]
    pub ephemeral: bool,
}

#[derive(Args, Debug)]
pub struct ResumeArgs {
    /// Run to resume (defaults to the most recently checkpointed run)
    pub run_id: Option<Uuid>,

    /// YAML script of round results and reviewer answers
    #[arg(short, long)]
    pub script: PathBuf,

    /// Ask for approvals on the terminal instead of using the script's answers
    #[arg(short, long)]
    pub interactive: bool,
}

#[derive(Debug, Serialize)]
pub struct RunOutput {
    #[serde(flatten)]
    pub outcome: RunOutcome,
    pub decision_code: Option<String>,
}

impl From<RunOutcome> for RunOutput {
    fn from(outcome: RunOutcome) -> Self {
        let decision_code = outcome
            .decision
            .as_ref()
            .map(|d| d.reason_code().to_string());
        Self {
            outcome,
            decision_code,
        }
    }
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        let outcome = &self.outcome;
        let mut lines = vec![
            format!("Run {}", outcome.run_id),
            format!("  state:    {}", outcome.final_state),
            format!(
                "  decision: {}",
                outcome.decision.as_ref().map_or("-", |d| d.as_str())
            ),
            format!("  reason:   {}", outcome.reason),
            format!("  quality:  {}", format_quality(outcome.final_quality)),
            format!("  rounds:   {}", outcome.rounds),
            format!("  tokens:   {}", outcome.tokens_spent),
        ];
        if outcome.cancelled {
            lines.push("  (cancelled)".to_string());
        }
        lines.join("\n")
    }
}

fn collaborators(
    script: &RunScript,
    interactive: bool,
    store: Arc<dyn CheckpointStore>,
) -> Collaborators {
    let approval: Arc<dyn ApprovalSignal> = if interactive {
        Arc::new(StdinApproval)
    } else {
        Arc::new(ScriptedApproval::new(script.approvals.clone()))
    };
    Collaborators {
        executor: Arc::new(ScriptedExecutor::new(script.rounds.clone())),
        approval,
        summarizer: Arc::new(ExtractiveSummarizer::default()),
        store,
    }
}

/// Cancel the coordinator on Ctrl-C.
fn cancel_on_ctrl_c(coordinator: &RunCoordinator) {
    let handle = coordinator.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            handle.cancel();
        }
    });
}

async fn drive(mut coordinator: RunCoordinator, json_mode: bool) -> Result<()> {
    cancel_on_ctrl_c(&coordinator);
    let outcome = coordinator.run().await.context("Run aborted")?;
    output(&RunOutput::from(outcome), json_mode);
    Ok(())
}

pub async fn execute_run(args: RunArgs, config_path: Option<PathBuf>, json_mode: bool) -> Result<()> {
    let config: Config = load_config(config_path.as_deref())?;
    let script = RunScript::load(&args.script).context("Failed to load run script")?;

    let store: Arc<dyn CheckpointStore> = if args.ephemeral {
        Arc::new(InMemoryCheckpointStore::new())
    } else {
        open_store(&config).await?
    };

    let requirement = args.requirement.or_else(|| script.requirement.clone());
    let mut coordinator =
        RunCoordinator::new(config, collaborators(&script, args.interactive, store));
    if let Some(requirement) = requirement {
        coordinator = coordinator.with_requirement(requirement);
    }
    drive(coordinator, json_mode).await
}

pub async fn execute_resume(
    args: ResumeArgs,
    config_path: Option<PathBuf>,
    json_mode: bool,
) -> Result<()> {
    let config: Config = load_config(config_path.as_deref())?;
    let script = RunScript::load(&args.script).context("Failed to load run script")?;
    let store = open_store(&config).await?;

    let run_id = match args.run_id {
        Some(run_id) => run_id,
        None => store
            .latest_run()
            .await?
            .context("No checkpointed run to resume")?,
    };

    let coordinator =
        RunCoordinator::resume(config, collaborators(&script, args.interactive, store), run_id)
            .await
            .with_context(|| format!("Failed to resume run {run_id}"))?;
    drive(coordinator, json_mode).await
}
