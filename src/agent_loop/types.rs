//! Core run types for the agent loop.

use std::time::Duration;

use bon::Builder;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BotError, ErrorCategory};
use crate::types::ToolCall;
use crate::util::retry::RetryPolicy;

/// Unique run identifier.
pub type RunId = Uuid;

/// Where a run is within one user turn.
#[derive(Debug)]
pub enum LoopState {
    /// Waiting on the reasoning backend.
    Thinking,
    /// Executing the tool calls the backend asked for.
    ToolPending { calls: Vec<ToolCall> },
    /// Finished with an answer.
    Answered { text: String },
    /// Finished without an answer.
    Failed { error: BotError },
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Answered { .. } | Self::Failed { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Thinking => "thinking",
            Self::ToolPending { .. } => "tool_pending",
            Self::Answered { .. } => "answered",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Tuning knobs for [`AgentLoop`](super::AgentLoop).
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Thinking steps allowed per run.
    #[builder(default = 10)]
    pub max_iterations: usize,
    /// Turns of history sent to the backend.
    #[builder(default = 50)]
    pub max_history_turns: usize,
    /// Bound on one backend call.
    #[builder(default = Duration::from_secs(60))]
    #[serde(with = "crate::util::serde_duration_ms")]
    pub backend_timeout: Duration,
    #[builder(default)]
    pub backend_retry: RetryPolicy,
    pub system_prompt: Option<String>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Terminal result of one run.
#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: RunId,
    /// Thinking steps taken.
    pub iterations: usize,
    /// `Answered` or `Failed`.
    pub state: LoopState,
    /// Text to deliver to the thread; `None` when the run was canceled.
    pub reply: Option<String>,
}

impl RunOutcome {
    pub fn answer(&self) -> Option<&str> {
        match &self.state {
            LoopState::Answered { text } => Some(text),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&BotError> {
        match &self.state {
            LoopState::Failed { error } => Some(error),
            _ => None,
        }
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self.error(), Some(BotError::Canceled))
    }

    pub fn failure_kind(&self) -> Option<ErrorCategory> {
        self.error().map(BotError::category)
    }
}
