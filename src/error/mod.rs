//! Error types for the bot.

pub mod unified;

pub use unified::{ErrorCategory, RecoverySuggestion};

use thiserror::Error;

/// Primary error type for all bot operations.
#[derive(Error, Debug)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Schema error for tool '{tool_name}': {message}")]
    Schema { tool_name: String, message: String },

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution {
        tool_name: String,
        message: String,
        /// Whether the failure is worth retrying (idempotent tools only).
        transient: bool,
    },

    #[error("Reasoning backend error (status {status:?}): {message}")]
    ReasoningBackend {
        status: Option<u16>,
        message: String,
        transient: bool,
    },

    #[error("Agent loop exceeded {0} iterations")]
    LoopLimitExceeded(usize),

    #[error("Transport error: {message}")]
    Transport {
        message: String,
        /// Server-suggested delay before retrying, when known.
        retry_after_ms: Option<u64>,
    },

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Run canceled")]
    Canceled,

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl BotError {
    /// Create a schema error for a tool.
    pub fn schema(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Schema {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Create a permanent tool execution error.
    pub fn tool(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
            transient: false,
        }
    }

    /// Create a tool execution error that may succeed on retry.
    pub fn tool_transient(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
            transient: true,
        }
    }

    /// Create a reasoning backend error from an HTTP status.
    pub fn backend(status: u16, message: impl Into<String>) -> Self {
        Self::ReasoningBackend {
            status: Some(status),
            message: message.into(),
            transient: status == 429 || (500..=599).contains(&status),
        }
    }

    /// Create a transport error without a retry hint.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retry_after_ms: None,
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Schema { .. } => ErrorCategory::Schema,
            Self::UnknownTool(_) => ErrorCategory::Configuration,
            Self::ToolExecution { .. } => ErrorCategory::ToolExecution,
            Self::ReasoningBackend { .. } => ErrorCategory::Backend,
            Self::LoopLimitExceeded(_) => ErrorCategory::LoopLimit,
            Self::Transport { .. } => ErrorCategory::Transport,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Canceled => ErrorCategory::Canceled,
            Self::Authentication(_) => ErrorCategory::Authentication,
            Self::Network(_) => ErrorCategory::Network,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Io(_) | Self::InvalidState(_) => ErrorCategory::Unknown,
        }
    }

    /// Whether this error is potentially retryable.
    ///
    /// Retryability of tool failures additionally depends on the tool being
    /// idempotent; that check lives in the tool registry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ToolExecution { transient, .. } => *transient,
            Self::ReasoningBackend { transient, .. } => *transient,
            Self::Transport { .. } | Self::Timeout(_) | Self::Network(_) => true,
            _ => false,
        }
    }

    /// Server-provided retry delay, if any.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::Transport { retry_after_ms, .. } => *retry_after_ms,
            _ => None,
        }
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.category() {
            ErrorCategory::Authentication => RecoverySuggestion::CheckCredentials,
            ErrorCategory::Network
            | ErrorCategory::Backend
            | ErrorCategory::Transport => RecoverySuggestion::RetryWithBackoff,
            ErrorCategory::Timeout => RecoverySuggestion::IncreaseTimeout,
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
            ErrorCategory::Schema | ErrorCategory::ToolExecution => {
                RecoverySuggestion::CheckToolImplementation
            }
            ErrorCategory::LoopLimit => RecoverySuggestion::SimplifyRequest,
            _ => RecoverySuggestion::ContactSupport,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, BotError>;
