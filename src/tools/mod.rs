//! Tool system for function calling.

pub mod arguments;
pub mod builtin;
pub mod confluence_search;
pub mod history_search;
mod ranking;
pub mod registry;
pub mod tool;
pub mod types;
pub mod validation;

pub use arguments::ToolArguments;
pub use builtin::weather_tool;
pub use confluence_search::{ConfluenceSearchTool, DocumentPage, DocumentSource};
pub use history_search::{ChannelHistory, HistoryMessage, HistorySearchTool};
pub use registry::{ToolRegistry, ToolRegistryBuilder};
pub use tool::{FnTool, Tool, ToolContext};
pub use types::{ParameterBuilder, ToolSpec};
