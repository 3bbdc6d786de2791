//! Interaction turns and the bounded context log.
//!
//! Sizes use a 4 chars/token heuristic. Collaborators that know the real
//! token count may supply it on the turn; otherwise it is estimated.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Approximate characters per token (conservative heuristic).
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimate the number of tokens in a string using the chars/token heuristic.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(CHARS_PER_TOKEN)
}

fn floor_boundary(text: &str, index: usize) -> usize {
    let mut i = index.min(text.len());
    while !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_boundary(text: &str, index: usize) -> usize {
    let mut i = index.min(text.len());
    while !text.is_char_boundary(i) {
        i += 1;
    }
    i
}

/// Cut the middle out of `text` so that its estimate fits `max_tokens`,
/// keeping a head and a tail around an elision marker.
///
/// The result always satisfies `estimate_tokens(result) <= max_tokens`.
pub fn truncate_middle(text: &str, max_tokens: usize) -> String {
    let max_chars = max_tokens * CHARS_PER_TOKEN;
    if text.len() <= max_chars {
        return text.to_string();
    }

    let marker = format!(
        "\n[... truncated from ~{} tokens ...]\n",
        estimate_tokens(text)
    );
    if marker.len() >= max_chars {
        return text[..floor_boundary(text, max_chars)].to_string();
    }

    let budget = max_chars - marker.len();
    let head_end = floor_boundary(text, budget / 2);
    let tail_len = budget - head_end;
    let tail_start = ceil_boundary(text, text.len() - tail_len);

    format!("{}{}{}", &text[..head_end], marker, &text[tail_start..])
}

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    System,
    User,
    Assistant,
    Tool,
    /// A compaction summary standing in for earlier turns.
    Summary,
}

impl TurnRole {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
            Self::Summary => "summary",
        }
    }
}

impl fmt::Display for TurnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the interaction log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub payload: String,
    /// Size in tokens. Zero means "not supplied" and is estimated on append.
    #[serde(default)]
    pub size_estimate: usize,
}

impl Turn {
    pub fn new(role: TurnRole, payload: impl Into<String>) -> Self {
        let payload = payload.into();
        let size_estimate = estimate_tokens(&payload);
        Self {
            role,
            payload,
            size_estimate,
        }
    }

    pub fn user(payload: impl Into<String>) -> Self {
        Self::new(TurnRole::User, payload)
    }

    pub fn assistant(payload: impl Into<String>) -> Self {
        Self::new(TurnRole::Assistant, payload)
    }

    pub fn system(payload: impl Into<String>) -> Self {
        Self::new(TurnRole::System, payload)
    }

    pub fn summary(payload: impl Into<String>) -> Self {
        Self::new(TurnRole::Summary, payload)
    }

    /// Fill in a missing size estimate.
    pub fn normalized(mut self) -> Self {
        if self.size_estimate == 0 {
            self.size_estimate = estimate_tokens(&self.payload);
        }
        self
    }

    /// Shrink the payload to at most `max_tokens`, re-estimating the size.
    /// Returns whether anything was cut.
    pub fn truncate_to(&mut self, max_tokens: usize) -> bool {
        if self.size_estimate <= max_tokens {
            return false;
        }
        self.payload = truncate_middle(&self.payload, max_tokens);
        self.size_estimate = estimate_tokens(&self.payload).min(max_tokens);
        true
    }
}

/// The agent role whose context capacity applies to the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Design,
    Execution,
}

impl AgentRole {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Design => "design",
            Self::Execution => "execution",
        }
    }
}

/// Ordered sequence of turns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextLog {
    turns: Vec<Turn>,
}

impl ContextLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_turns(turns: Vec<Turn>) -> Self {
        Self {
            turns: turns.into_iter().map(Turn::normalized).collect(),
        }
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn.normalized());
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Running size estimate in tokens.
    pub fn total_size(&self) -> usize {
        self.turns.iter().map(|t| t.size_estimate).sum()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }
}
