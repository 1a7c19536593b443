//! Typed access to tool call arguments.

use crate::error::BotError;

/// Wrapper around tool call arguments providing typed extraction.
#[derive(Debug, Clone)]
pub struct ToolArguments {
    tool_name: String,
    value: serde_json::Value,
}

impl ToolArguments {
    pub fn new(tool_name: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            value,
        }
    }

    /// Get the raw JSON value.
    pub fn raw(&self) -> &serde_json::Value {
        &self.value
    }

    fn missing(&self, kind: &str, key: &str) -> BotError {
        BotError::schema(&self.tool_name, format!("missing {kind} argument: {key}"))
    }

    /// Get a string argument by key.
    pub fn get_str(&self, key: &str) -> Result<&str, BotError> {
        self.value
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| self.missing("string", key))
    }

    /// Get an optional string argument.
    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(|v| v.as_str())
    }

    /// Get an integer argument.
    pub fn get_i64(&self, key: &str) -> Result<i64, BotError> {
        self.value
            .get(key)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| self.missing("integer", key))
    }

    /// Get an optional integer argument.
    pub fn get_i64_opt(&self, key: &str) -> Option<i64> {
        self.value.get(key).and_then(|v| v.as_i64())
    }

    /// Get a boolean argument.
    pub fn get_bool(&self, key: &str) -> Result<bool, BotError> {
        self.value
            .get(key)
            .and_then(|v| v.as_bool())
            .ok_or_else(|| self.missing("boolean", key))
    }

    /// Deserialize the entire arguments into a typed struct.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T, BotError> {
        serde_json::from_value(self.value.clone()).map_err(|e| {
            BotError::schema(&self.tool_name, format!("failed to deserialize arguments: {e}"))
        })
    }
}
