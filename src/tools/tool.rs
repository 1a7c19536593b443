//! Tool trait and closure-based tool wrapper.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use super::arguments::ToolArguments;
use super::types::ToolSpec;
use crate::error::BotError;
use crate::types::SessionKey;

/// Context available during tool execution.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// Thread the call originates from.
    pub session: Option<SessionKey>,
    /// Id of the tool call being served.
    pub tool_call_id: Option<String>,
}

/// A tool the agent loop can call.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Spec advertised to the reasoning backend.
    fn spec(&self) -> &ToolSpec;

    /// Execute the tool with schema-validated arguments.
    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &ToolContext,
    ) -> Result<serde_json::Value, BotError>;
}

type ToolHandler = dyn Fn(
        ToolArguments,
        ToolContext,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, BotError>> + Send>>
    + Send
    + Sync;

/// Closure-based tool for quick tool creation.
pub struct FnTool {
    spec: ToolSpec,
    handler: Arc<ToolHandler>,
}

impl FnTool {
    pub fn new<F, Fut>(spec: ToolSpec, handler: F) -> Self
    where
        F: Fn(ToolArguments, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value, BotError>> + Send + 'static,
    {
        Self {
            spec,
            handler: Arc::new(move |args, ctx| Box::pin(handler(args, ctx))),
        }
    }
}

#[async_trait]
impl Tool for FnTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &ToolContext,
    ) -> Result<serde_json::Value, BotError> {
        (self.handler)(args.clone(), ctx.clone()).await
    }
}

impl std::fmt::Debug for FnTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTool").field("spec", &self.spec).finish()
    }
}
