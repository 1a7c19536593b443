//! Runs the reasoning/tool loop for one user turn.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{ReasoningBackend, ReasoningRequest, ReasoningResponse};
use crate::error::{BotError, RecoverySuggestion};
use crate::session::Session;
use crate::tools::{ToolContext, ToolRegistry};
use crate::types::{ToolCall, ToolResult, Turn};
use crate::util::timeout::with_timeout;

use super::events::{RunEventEmitter, RunEventPayload, RunEventSink};
use super::types::{LoopConfig, LoopState, RunOutcome};

/// Drives a session from its latest user turn to an answer or a failure.
///
/// The caller holds the session exclusively for the whole run, so every
/// turn the loop appends lands in order with nothing interleaved.
pub struct AgentLoop {
    backend: Arc<dyn ReasoningBackend>,
    tools: ToolRegistry,
    config: LoopConfig,
    event_sink: Option<RunEventSink>,
}

impl AgentLoop {
    pub fn new(backend: Arc<dyn ReasoningBackend>, tools: ToolRegistry, config: LoopConfig) -> Self {
        Self {
            backend,
            tools,
            config,
            event_sink: None,
        }
    }

    pub fn with_event_sink(mut self, sink: RunEventSink) -> Self {
        self.event_sink = Some(sink);
        self
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run until the backend answers, the iteration bound is hit, a fatal
    /// error occurs or `cancel` fires.
    ///
    /// Failures other than cancellation append an [`Error`](crate::types::Role::Error)
    /// turn whose text is returned as the reply.
    pub async fn run(&self, session: &mut Session, cancel: &CancellationToken) -> RunOutcome {
        let run_id = Uuid::new_v4();
        let emitter = RunEventEmitter::new(run_id, self.event_sink.clone());
        let thread = session.key().to_string();

        info!(%run_id, thread = %thread, "agent run started");
        emitter.emit(RunEventPayload::Started {
            session: session.key().clone(),
        });
        session.mark_active();

        let mut iterations = 0usize;
        let mut state = LoopState::Thinking;
        while !state.is_terminal() {
            state = match state {
                LoopState::Thinking => {
                    if cancel.is_cancelled() {
                        LoopState::Failed {
                            error: BotError::Canceled,
                        }
                    } else if iterations >= self.config.max_iterations {
                        LoopState::Failed {
                            error: BotError::LoopLimitExceeded(self.config.max_iterations),
                        }
                    } else {
                        iterations += 1;
                        debug!(%run_id, thread = %thread, iteration = iterations, "thinking");
                        emitter.emit(RunEventPayload::Thinking {
                            iteration: iterations,
                        });
                        self.think(session, cancel).await
                    }
                }
                LoopState::ToolPending { calls } => {
                    self.run_tools(session, &calls, cancel, &emitter).await
                }
                terminal => terminal,
            };
        }

        session.mark_idle();

        let reply = match &state {
            LoopState::Answered { text } => {
                info!(%run_id, thread = %thread, iterations, "agent run answered");
                emitter.emit(RunEventPayload::Answered { text: text.clone() });
                Some(text.clone())
            }
            LoopState::Failed {
                error: BotError::Canceled,
            } => {
                info!(%run_id, thread = %thread, iterations, "agent run canceled");
                emitter.emit(RunEventPayload::Canceled);
                None
            }
            LoopState::Failed { error } => {
                warn!(
                    %run_id,
                    thread = %thread,
                    iterations,
                    error = %error,
                    suggestion = ?error.recovery_suggestion(),
                    "agent run failed"
                );
                emitter.emit(RunEventPayload::Failed {
                    kind: error.category(),
                    message: error.to_string(),
                });
                let text = error_reply(error);
                if let Err(e) = session.append_turn(Turn::error(text.clone())) {
                    warn!(%run_id, thread = %thread, error = %e, "could not record error turn");
                }
                Some(text)
            }
            LoopState::Thinking | LoopState::ToolPending { .. } => None,
        };

        RunOutcome {
            run_id,
            iterations,
            state,
            reply,
        }
    }

    /// One backend round trip, recording the response in the session.
    async fn think(&self, session: &mut Session, cancel: &CancellationToken) -> LoopState {
        let request = ReasoningRequest {
            system_prompt: self.config.system_prompt.clone(),
            history: session
                .history_window(self.config.max_history_turns)
                .to_vec(),
            tools: self.tools.specs(),
        };

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(BotError::Canceled),
            result = self.reason_with_retry(&request) => result,
        };

        let recorded = match response {
            Ok(ReasoningResponse::Answer(text)) => session
                .append_turn(Turn::assistant(text.clone()))
                .map(|_| LoopState::Answered { text }),
            Ok(ReasoningResponse::ToolCalls(calls)) => session
                .append_turn(Turn::tool_calls(calls.clone()))
                .map(|_| LoopState::ToolPending { calls }),
            Err(error) => Ok(LoopState::Failed { error }),
        };
        recorded.unwrap_or_else(|error| LoopState::Failed { error })
    }

    async fn reason_with_retry(
        &self,
        request: &ReasoningRequest,
    ) -> Result<ReasoningResponse, BotError> {
        let timeout = self.config.backend_timeout;
        self.config
            .backend_retry
            .execute(|| with_timeout(timeout, self.backend.reason(request)))
            .await
            .map_err(|e| match e {
                BotError::Timeout(ms) => BotError::ReasoningBackend {
                    status: None,
                    message: format!("{} timed out after {ms}ms", self.backend.name()),
                    transient: true,
                },
                BotError::Network(err) => BotError::ReasoningBackend {
                    status: err.status().map(|s| s.as_u16()),
                    message: err.to_string(),
                    transient: true,
                },
                other => other,
            })
    }

    /// Resolve every call in order. Each call gets a result turn, even when
    /// the run stops early, so the history stays well-formed.
    async fn run_tools(
        &self,
        session: &mut Session,
        calls: &[ToolCall],
        cancel: &CancellationToken,
        emitter: &RunEventEmitter,
    ) -> LoopState {
        let mut fatal: Option<BotError> = None;

        for call in calls {
            let result = match &fatal {
                Some(error) => {
                    ToolResult::failure(call, error.category(), "skipped: run stopped early")
                }
                None => {
                    emitter.emit(RunEventPayload::ToolCallStarted { call: call.clone() });
                    let ctx = ToolContext {
                        session: Some(session.key().clone()),
                        tool_call_id: Some(call.id.clone()),
                    };
                    let invoked = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Err(BotError::Canceled),
                        r = self.tools.invoke_with_context(&call.name, call.arguments.clone(), &ctx) => r,
                    };
                    match invoked {
                        Ok(value) => ToolResult::success(call, value),
                        Err(error) => {
                            debug!(tool = %call.name, error = %error, "tool call failed");
                            let result =
                                ToolResult::failure(call, error.category(), error.to_string());
                            if matches!(error, BotError::UnknownTool(_) | BotError::Canceled) {
                                fatal = Some(error);
                            }
                            result
                        }
                    }
                }
            };

            emitter.emit(RunEventPayload::ToolResult {
                result: result.clone(),
            });
            if let Err(error) = session.append_turn(Turn::tool_result(result)) {
                return LoopState::Failed { error };
            }
        }

        match fatal {
            Some(error) => LoopState::Failed { error },
            None => LoopState::Thinking,
        }
    }
}

/// User-facing acknowledgement for a failed run.
pub fn error_reply(error: &BotError) -> String {
    match error {
        BotError::LoopLimitExceeded(limit) => format!(
            "Sorry, I couldn't complete that request: I reached my limit of {limit} reasoning steps."
        ),
        BotError::UnknownTool(name) => format!(
            "Sorry, I couldn't complete that request: I tried to use a tool that isn't available ({name})."
        ),
        other => match other.recovery_suggestion() {
            RecoverySuggestion::RetryWithBackoff | RecoverySuggestion::IncreaseTimeout => {
                "Sorry, I couldn't reach my reasoning service. Please try again in a moment."
                    .to_string()
            }
            RecoverySuggestion::CheckCredentials => {
                "Sorry, I couldn't authenticate with my reasoning service.".to_string()
            }
            RecoverySuggestion::CheckConfiguration => {
                "Sorry, I'm not configured correctly to handle that request.".to_string()
            }
            _ => format!(
                "Sorry, something went wrong while handling your request ({}).",
                other.category()
            ),
        },
    }
}
