//! Tool specs and parameter schema builder.

use serde::{Deserialize, Serialize};

/// Description of a tool as advertised to the reasoning backend.
///
/// Registered once at startup and immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema the call arguments must satisfy.
    pub input_schema: serde_json::Value,
    /// JSON Schema the tool's result must satisfy, when declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
    /// Safe to run more than once for the same call.
    #[serde(default)]
    pub idempotent: bool,
}

impl ToolSpec {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            output_schema: None,
            idempotent: false,
        }
    }

    pub fn idempotent(mut self, idempotent: bool) -> Self {
        self.idempotent = idempotent;
        self
    }

    pub fn with_output_schema(mut self, schema: serde_json::Value) -> Self {
        self.output_schema = Some(schema);
        self
    }
}

/// Builder for object-shaped input schemas.
#[derive(Debug, Default)]
pub struct ParameterBuilder {
    properties: serde_json::Map<String, serde_json::Value>,
    required: Vec<String>,
}

impl ParameterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn property(
        mut self,
        name: impl Into<String>,
        schema: serde_json::Value,
        required: bool,
    ) -> Self {
        let name = name.into();
        self.properties.insert(name.clone(), schema);
        if required {
            self.required.push(name);
        }
        self
    }

    /// Add a string property.
    pub fn string(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        let schema = serde_json::json!({ "type": "string", "description": description.into() });
        self.property(name, schema, required)
    }

    /// Add an integer property.
    pub fn integer(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        let schema = serde_json::json!({ "type": "integer", "description": description.into() });
        self.property(name, schema, required)
    }

    /// Add a boolean property.
    pub fn boolean(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        let schema = serde_json::json!({ "type": "boolean", "description": description.into() });
        self.property(name, schema, required)
    }

    /// Add an enum (string) property.
    pub fn string_enum(
        self,
        name: impl Into<String>,
        description: impl Into<String>,
        values: &[&str],
        required: bool,
    ) -> Self {
        let schema = serde_json::json!({
            "type": "string",
            "description": description.into(),
            "enum": values,
        });
        self.property(name, schema, required)
    }

    pub fn build(self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": self.properties,
            "required": self.required,
        })
    }
}

/// Schema for a tool that takes no arguments.
pub fn empty_schema() -> serde_json::Value {
    ParameterBuilder::new().build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_required_fields_in_order() {
        let schema = ParameterBuilder::new()
            .string("query", "Search query", true)
            .integer("limit", "Max results", false)
            .string("channel_id", "Channel", true)
            .build();

        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["limit"]["type"], "integer");
        assert_eq!(schema["required"], serde_json::json!(["query", "channel_id"]));
    }

    #[test]
    fn spec_defaults_to_non_idempotent() {
        let spec = ToolSpec::new("post", "Post something", empty_schema());
        assert!(!spec.idempotent);
        assert!(spec.output_schema.is_none());
    }
}
