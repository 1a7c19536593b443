//! Reasoning backend trait and implementations.

pub mod http;
pub mod openai;

use async_trait::async_trait;

use crate::error::BotError;
use crate::tools::ToolSpec;
use crate::types::{ToolCall, Turn};

pub use openai::OpenAiBackend;

/// A request sent to the reasoning backend.
#[derive(Debug, Clone, Default)]
pub struct ReasoningRequest {
    /// Instructions prepended to every request.
    pub system_prompt: Option<String>,
    /// Session history, oldest first.
    pub history: Vec<Turn>,
    /// Tools the backend may call.
    pub tools: Vec<ToolSpec>,
}

/// What the backend decided to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum ReasoningResponse {
    /// A final answer for the user.
    Answer(String),
    /// Tool calls to run before reasoning again.
    ToolCalls(Vec<ToolCall>),
}

/// An external reasoning service.
#[async_trait]
pub trait ReasoningBackend: Send + Sync {
    /// Backend name for logs (e.g. "openai").
    fn name(&self) -> &str;

    /// Produce the next step for the given history.
    async fn reason(&self, request: &ReasoningRequest) -> Result<ReasoningResponse, BotError>;
}
