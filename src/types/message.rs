//! Turn types recorded in a session's history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorCategory;

/// One recorded exchange unit within a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    pub id: Uuid,
    pub role: Role,
    pub content: TurnContent,
    /// Slack user id for user turns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    fn new(role: Role, content: TurnContent) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content,
            author: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a user turn.
    pub fn user(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            author: Some(author.into()),
            ..Self::new(Role::User, TurnContent::Text { text: text.into() })
        }
    }

    /// Create an assistant answer turn.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, TurnContent::Text { text: text.into() })
    }

    /// Create an assistant turn requesting tool calls.
    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self::new(Role::Assistant, TurnContent::ToolCalls { calls })
    }

    /// Create a tool result turn.
    pub fn tool_result(result: ToolResult) -> Self {
        Self::new(Role::Tool, TurnContent::ToolResult(result))
    }

    /// Create an error-acknowledgement turn.
    pub fn error(text: impl Into<String>) -> Self {
        Self::new(Role::Error, TurnContent::Text { text: text.into() })
    }

    /// Text of this turn, if it carries plain text.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            TurnContent::Text { text } => Some(text),
            _ => None,
        }
    }

    /// Tool calls requested by this turn.
    pub fn calls(&self) -> &[ToolCall] {
        match &self.content {
            TurnContent::ToolCalls { calls } => calls,
            _ => &[],
        }
    }
}

/// Who produced a turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
    /// Error acknowledgement produced when a run fails.
    Error,
}

/// Payload of a turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnContent {
    Text { text: String },
    ToolCalls { calls: Vec<ToolCall> },
    ToolResult(ToolResult),
}

/// A tool call requested by the reasoning backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Resolution of a tool call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub tool_name: String,
    pub outcome: ToolOutcome,
}

impl ToolResult {
    pub fn success(call: &ToolCall, value: serde_json::Value) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            outcome: ToolOutcome::Success { value },
        }
    }

    pub fn failure(call: &ToolCall, kind: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            outcome: ToolOutcome::Failure {
                kind,
                message: message.into(),
            },
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Failure { .. })
    }

    /// JSON payload handed back to the reasoning backend.
    pub fn payload(&self) -> serde_json::Value {
        match &self.outcome {
            ToolOutcome::Success { value } => value.clone(),
            ToolOutcome::Failure { kind, message } => serde_json::json!({
                "error": message,
                "kind": kind,
            }),
        }
    }
}

/// Success payload or error of a tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success { value: serde_json::Value },
    Failure { kind: ErrorCategory, message: String },
}
