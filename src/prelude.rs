//! Convenience re-exports for common use.

pub use crate::agent_loop::{AgentLoop, LoopConfig, LoopState, RunOutcome};
pub use crate::backend::{OpenAiBackend, ReasoningBackend, ReasoningRequest, ReasoningResponse};
pub use crate::bot::Bot;
pub use crate::channel::{BusyPolicy, ChannelAdapter, ChannelConfig, Transport};
pub use crate::config::BotConfig;
pub use crate::error::{BotError, Result};
pub use crate::session::{Session, SessionKey, SessionStore};
pub use crate::tools::{Tool, ToolArguments, ToolRegistry, ToolSpec};
pub use crate::types::{InboundEvent, OutboundMessage, Role, ToolCall, ToolResult, Turn};
