//! Built-in tools shipped with the bot.

use std::sync::Arc;

use crate::tools::tool::{FnTool, Tool, ToolContext};
use crate::tools::types::{ParameterBuilder, ToolSpec};

/// Truncate to at most `max_bytes` without splitting a UTF-8 character.
pub(crate) fn truncate_utf8(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }

    let mut cutoff = max_bytes;
    while cutoff > 0 && !s.is_char_boundary(cutoff) {
        cutoff -= 1;
    }
    s[..cutoff].to_string()
}

/// Create the `weather` demo tool.
///
/// Answers from a fixed table; handy for checking the tool loop end to end
/// without external services.
pub fn weather_tool() -> Arc<dyn Tool> {
    let spec = ToolSpec::new(
        "weather",
        "Get the weather for a given city.",
        ParameterBuilder::new()
            .string("city", "Name of the city to get weather for.", true)
            .build(),
    )
    .idempotent(true)
    .with_output_schema(serde_json::json!({ "type": "string" }));

    Arc::new(FnTool::new(spec, |args, _ctx: ToolContext| async move {
        let city = args.get_str("city")?;
        let report = match city.trim().to_lowercase().as_str() {
            "new york" => "It's sunny in New York!".to_string(),
            "los angeles" => "It's rainy in Los Angeles!".to_string(),
            _ => format!("Sorry, I don't have weather information for {city}."),
        };
        Ok(serde_json::Value::String(report))
    }))
}
