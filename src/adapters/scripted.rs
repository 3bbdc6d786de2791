//! Scripted collaborators.
//!
//! Drive the control loop without a reasoning backend: round results and
//! approval answers come from a YAML script, summaries are extractive.

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{truncate_middle, Category, ContextLog, RoundResult, Turn};
use crate::domain::ports::{
    ApprovalDecision, ApprovalRequest, ApprovalSignal, RoundExecutor, RoundRequest, Summarizer,
};

/// A run script: what each round reports and how the reviewer answers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunScript {
    /// Seeded as the first user turn of the context log.
    #[serde(default)]
    pub requirement: Option<String>,
    #[serde(default)]
    pub rounds: Vec<RoundResult>,
    #[serde(default)]
    pub approvals: Vec<ApprovalDecision>,
}

impl RunScript {
    pub fn from_yaml(yaml: &str) -> DomainResult<Self> {
        serde_yaml::from_str(yaml).map_err(|e| DomainError::SerializationError(e.to_string()))
    }

    pub fn load(path: &Path) -> DomainResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DomainError::Configuration(format!("cannot read script {}: {e}", path.display()))
        })?;
        Self::from_yaml(&content)
    }
}

// ---------------------------------------------------------------------------
// Round executor
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ExecutorState {
    queues: BTreeMap<Category, VecDeque<RoundResult>>,
    last: BTreeMap<Category, RoundResult>,
    failures_remaining: u32,
    calls: Vec<(u32, Category)>,
}

/// Serves scripted results per category, in order. Once a category's queue
/// is drained its last result repeats.
#[derive(Debug)]
pub struct ScriptedExecutor {
    state: Mutex<ExecutorState>,
}

impl ScriptedExecutor {
    pub fn new(rounds: Vec<RoundResult>) -> Self {
        let mut queues: BTreeMap<Category, VecDeque<RoundResult>> = BTreeMap::new();
        for round in rounds {
            queues.entry(round.category).or_default().push_back(round);
        }
        Self {
            state: Mutex::new(ExecutorState {
                queues,
                ..ExecutorState::default()
            }),
        }
    }

    /// Fail the next `count` calls with a collaborator failure.
    pub async fn fail_next(&self, count: u32) {
        self.state.lock().await.failures_remaining = count;
    }

    /// Every call received, as `(round_index, category)`, failed ones included.
    pub async fn calls(&self) -> Vec<(u32, Category)> {
        self.state.lock().await.calls.clone()
    }
}

#[async_trait]
impl RoundExecutor for ScriptedExecutor {
    async fn execute(&self, request: RoundRequest) -> DomainResult<RoundResult> {
        let mut state = self.state.lock().await;
        state.calls.push((request.round_index, request.category));

        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(DomainError::collaborator(
                "round executor",
                format!("scripted failure on round {}", request.round_index),
            ));
        }

        let next = state
            .queues
            .get_mut(&request.category)
            .and_then(VecDeque::pop_front);
        let result = match next {
            Some(result) => {
                state.last.insert(request.category, result.clone());
                result
            }
            None => state.last.get(&request.category).cloned().ok_or_else(|| {
                DomainError::collaborator(
                    "round executor",
                    format!("script has no {} rounds", request.category),
                )
            })?,
        };
        debug!(
            round = request.round_index,
            category = request.category.as_str(),
            quality = result.quality,
            "Serving scripted round"
        );
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Approval signals
// ---------------------------------------------------------------------------

/// Answers from a fixed queue, then approves everything.
#[derive(Debug, Default)]
pub struct ScriptedApproval {
    answers: Mutex<VecDeque<ApprovalDecision>>,
    requests: Mutex<Vec<ApprovalRequest>>,
}

impl ScriptedApproval {
    pub fn new(answers: Vec<ApprovalDecision>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Approves every request.
    pub fn auto_approve() -> Self {
        Self::default()
    }

    pub async fn requests(&self) -> Vec<ApprovalRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl ApprovalSignal for ScriptedApproval {
    async fn request(&self, request: ApprovalRequest) -> DomainResult<ApprovalDecision> {
        self.requests.lock().await.push(request);
        Ok(self
            .answers
            .lock()
            .await
            .pop_front()
            .unwrap_or(ApprovalDecision::Approve))
    }
}

/// Asks on the terminal. `y` approves; anything else rejects, and text
/// after a colon (`n: tighten the refund rules`) becomes feedback.
#[derive(Debug, Default)]
pub struct StdinApproval;

impl StdinApproval {
    pub fn parse_answer(line: &str) -> ApprovalDecision {
        let line = line.trim();
        let (verdict, feedback) = match line.split_once(':') {
            Some((verdict, feedback)) => (verdict.trim(), Some(feedback.trim().to_string())),
            None => (line, None),
        };
        if matches!(verdict.to_lowercase().as_str(), "y" | "yes" | "approve") {
            ApprovalDecision::Approve
        } else {
            ApprovalDecision::Reject {
                feedback: feedback.filter(|f| !f.is_empty()),
            }
        }
    }
}

#[async_trait]
impl ApprovalSignal for StdinApproval {
    async fn request(&self, request: ApprovalRequest) -> DomainResult<ApprovalDecision> {
        eprintln!("\n[{}] {}", request.state, request.summary);
        eprint!("Approve? [y / n: feedback] ");

        let mut line = String::new();
        let read = BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await
            .map_err(|e| DomainError::collaborator("approval signal", e.to_string()))?;
        if read == 0 {
            return Err(DomainError::collaborator("approval signal", "stdin closed"));
        }
        Ok(Self::parse_answer(&line))
    }
}

// ---------------------------------------------------------------------------
// Summarizer
// ---------------------------------------------------------------------------

/// Builds a summary from the first line of every turn.
#[derive(Debug, Clone)]
pub struct ExtractiveSummarizer {
    max_line_chars: usize,
    max_tokens: usize,
}

impl ExtractiveSummarizer {
    pub const fn new(max_line_chars: usize, max_tokens: usize) -> Self {
        Self {
            max_line_chars,
            max_tokens,
        }
    }
}

impl Default for ExtractiveSummarizer {
    fn default() -> Self {
        Self::new(160, 2_000)
    }
}

#[async_trait]
impl Summarizer for ExtractiveSummarizer {
    async fn summarize(&self, log: &ContextLog) -> DomainResult<Turn> {
        let mut text = format!("Summary of {} earlier turns:", log.len());
        for turn in log.turns() {
            let first_line = turn.payload.lines().next().unwrap_or_default();
            let line: String = first_line.chars().take(self.max_line_chars).collect();
            text.push_str(&format!("\n- {}: {line}", turn.role));
        }
        Ok(Turn::summary(truncate_middle(&text, self.max_tokens)))
    }
}
