//! Agent loop: reason, call tools, answer.

pub mod events;
pub mod runner;
pub mod types;

pub use events::{RunEvent, RunEventPayload, RunEventSink};
pub use runner::{error_reply, AgentLoop};
pub use types::{LoopConfig, LoopState, RunId, RunOutcome};
