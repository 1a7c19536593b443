//! OpenAI-compatible Chat Completions backend.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::BotError;
use crate::tools::ToolSpec;
use crate::types::{Role, ToolCall, Turn, TurnContent};

use super::http::{bearer_headers, shared_client, status_to_error};
use super::{ReasoningBackend, ReasoningRequest, ReasoningResponse};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiBackend {
    model: String,
    api_key: String,
    base_url: String,
}

impl std::fmt::Debug for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiBackend")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl OpenAiBackend {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            model: model.into(),
            api_key: api_key.into(),
            base_url: base_url
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request_body(&self, request: &ReasoningRequest) -> serde_json::Value {
        let mut messages = Vec::with_capacity(request.history.len() + 1);
        if let Some(prompt) = request.system_prompt.as_deref().filter(|p| !p.is_empty()) {
            messages.push(serde_json::json!({ "role": "system", "content": prompt }));
        }
        messages.extend(request.history.iter().map(turn_to_openai));

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
        });

        if !request.tools.is_empty() {
            let tools: Vec<serde_json::Value> = request.tools.iter().map(tool_to_openai).collect();
            body["tools"] = tools.into();
        }

        body
    }
}

#[async_trait]
impl ReasoningBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    async fn reason(&self, request: &ReasoningRequest) -> Result<ReasoningResponse, BotError> {
        let body = self.build_request_body(request);
        let url = format!("{}/chat/completions", self.base_url);

        debug!(
            model = self.model.as_str(),
            turns = request.history.len(),
            tools = request.tools.len(),
            "chat completion request"
        );

        let resp = shared_client()
            .post(&url)
            .headers(bearer_headers(&self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status, &body_text));
        }

        let data: ChatResponse = resp.json().await?;
        let choice = data.choices.into_iter().next().ok_or_else(|| {
            BotError::ReasoningBackend {
                status: Some(status),
                message: "no choices in response".into(),
                transient: false,
            }
        })?;

        let calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: serde_json::from_str(&tc.function.arguments)
                    .unwrap_or(serde_json::Value::String(tc.function.arguments)),
            })
            .collect();
        if !calls.is_empty() {
            return Ok(ReasoningResponse::ToolCalls(calls));
        }

        match choice.message.content.filter(|c| !c.trim().is_empty()) {
            Some(text) => Ok(ReasoningResponse::Answer(text)),
            None => Err(BotError::ReasoningBackend {
                status: Some(status),
                message: "response carried neither an answer nor tool calls".into(),
                transient: false,
            }),
        }
    }
}

fn tool_to_openai(spec: &ToolSpec) -> serde_json::Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": spec.name,
            "description": spec.description,
            "parameters": spec.input_schema,
        }
    })
}

fn turn_to_openai(turn: &Turn) -> serde_json::Value {
    match &turn.content {
        TurnContent::Text { text } => {
            let role = match turn.role {
                Role::User => "user",
                // Error acknowledgements were shown to the user as bot replies.
                Role::Assistant | Role::Error | Role::Tool => "assistant",
            };
            serde_json::json!({ "role": role, "content": text })
        }
        TurnContent::ToolCalls { calls } => {
            let tool_calls: Vec<serde_json::Value> = calls
                .iter()
                .map(|tc| {
                    serde_json::json!({
                        "id": tc.id,
                        "type": "function",
                        "function": {
                            "name": tc.name,
                            "arguments": tc.arguments.to_string(),
                        }
                    })
                })
                .collect();
            serde_json::json!({
                "role": "assistant",
                "content": serde_json::Value::Null,
                "tool_calls": tool_calls,
            })
        }
        TurnContent::ToolResult(result) => {
            let content = match result.payload() {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            serde_json::json!({
                "role": "tool",
                "tool_call_id": result.tool_call_id,
                "content": content,
            })
        }
    }
}

// Chat Completions response types (internal)

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ChatToolCall>>,
}

#[derive(Deserialize)]
struct ChatToolCall {
    id: String,
    function: ChatFunction,
}

#[derive(Deserialize)]
struct ChatFunction {
    name: String,
    arguments: String,
}
