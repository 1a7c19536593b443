//! Immutable tool lookup with validated, bounded invocation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::arguments::ToolArguments;
use super::tool::{Tool, ToolContext};
use super::types::ToolSpec;
use super::validation::validate;
use crate::error::BotError;
use crate::util::retry::RetryPolicy;
use crate::util::timeout::with_timeout;

/// Collects tools at startup. Call [`build`](Self::build) to freeze them.
pub struct ToolRegistryBuilder {
    tools: Vec<Arc<dyn Tool>>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl Default for ToolRegistryBuilder {
    fn default() -> Self {
        Self {
            tools: Vec::new(),
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

impl ToolRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-attempt execution timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Retry policy applied to idempotent tools.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Register a tool.
    pub fn register(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    /// Register a tool from a spec and async handler.
    pub fn register_fn<F, Fut>(self, spec: ToolSpec, handler: F) -> Self
    where
        F: Fn(ToolArguments, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<serde_json::Value, BotError>> + Send + 'static,
    {
        self.register(Arc::new(super::tool::FnTool::new(spec, handler)))
    }

    /// Freeze the registry. Duplicate tool names are a configuration error.
    pub fn build(self) -> Result<ToolRegistry, BotError> {
        let mut index = HashMap::with_capacity(self.tools.len());
        for (position, tool) in self.tools.iter().enumerate() {
            let name = tool.spec().name.clone();
            if name.is_empty() {
                return Err(BotError::Configuration("tool name must not be empty".into()));
            }
            if index.insert(name.clone(), position).is_some() {
                return Err(BotError::Configuration(format!(
                    "tool '{name}' registered twice"
                )));
            }
        }
        Ok(ToolRegistry {
            inner: Arc::new(RegistryInner {
                tools: self.tools,
                index,
                timeout: self.timeout,
                retry: self.retry,
            }),
        })
    }
}

struct RegistryInner {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
    timeout: Duration,
    retry: RetryPolicy,
}

/// Read-only tool registry shared by all runs.
#[derive(Clone)]
pub struct ToolRegistry {
    inner: Arc<RegistryInner>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .field("timeout", &self.inner.timeout)
            .finish()
    }
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::new()
    }

    /// A registry with no tools.
    pub fn empty() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                tools: Vec::new(),
                index: HashMap::new(),
                timeout: Duration::from_secs(30),
                retry: RetryPolicy::no_retry(),
            }),
        }
    }

    /// Specs in registration order.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.inner.tools.iter().map(|t| t.spec().clone()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.inner.tools.iter().map(|t| t.spec().name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.inner.index.get(name).map(|&i| &self.inner.tools[i])
    }

    pub fn len(&self) -> usize {
        self.inner.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.tools.is_empty()
    }

    /// Invoke a tool without thread context.
    pub async fn invoke(
        &self,
        name: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, BotError> {
        self.invoke_with_context(name, args, &ToolContext::default()).await
    }

    /// Validate arguments, then run the tool under the configured timeout.
    ///
    /// Idempotent tools are retried on transient failures and timeouts;
    /// other tools run exactly once.
    pub async fn invoke_with_context(
        &self,
        name: &str,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<serde_json::Value, BotError> {
        let tool = self
            .get(name)
            .ok_or_else(|| BotError::UnknownTool(name.to_string()))?;
        let spec = tool.spec();

        validate(&args, &spec.input_schema).map_err(|message| BotError::schema(name, message))?;

        let args = ToolArguments::new(name, args);
        let timeout = self.inner.timeout;
        let idempotent = spec.idempotent;
        let policy = if idempotent {
            self.inner.retry.clone()
        } else {
            RetryPolicy::no_retry()
        };

        debug!(tool = name, idempotent, "invoking tool");
        let result = policy
            .execute_if(
                || with_timeout(timeout, tool.execute(&args, ctx)),
                |e| idempotent && e.is_retryable(),
            )
            .await
            .map_err(|e| as_execution_error(name, e));

        let value = match result {
            Ok(value) => value,
            Err(e) => {
                warn!(tool = name, error = %e, "tool invocation failed");
                return Err(e);
            }
        };

        if let Some(schema) = &spec.output_schema {
            validate(&value, schema).map_err(|message| {
                BotError::tool(name, format!("result does not match output schema: {message}"))
            })?;
        }
        Ok(value)
    }
}

/// Handler failures surface as `ToolExecution`, keeping their transience.
/// Argument errors and cancellation pass through unchanged.
fn as_execution_error(name: &str, error: BotError) -> BotError {
    match error {
        BotError::Timeout(ms) => BotError::tool_transient(name, format!("timed out after {ms}ms")),
        e @ (BotError::ToolExecution { .. } | BotError::Schema { .. } | BotError::Canceled) => e,
        other => BotError::ToolExecution {
            tool_name: name.to_string(),
            transient: other.is_retryable(),
            message: other.to_string(),
        },
    }
}
