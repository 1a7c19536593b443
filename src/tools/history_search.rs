//! `slack_channel_history_search`: find past messages in a channel.
//!
//! Messages are ranked by how many distinct query terms they contain, ties
//! going to the most recent message. Channel history is fetched lazily and
//! cached per channel for a short time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use super::arguments::ToolArguments;
use super::builtin::truncate_utf8;
use super::ranking::{rank_by_terms, Ties};
use super::tool::{Tool, ToolContext};
use super::types::{ParameterBuilder, ToolSpec};
use crate::error::BotError;

pub const TOOL_NAME: &str = "slack_channel_history_search";
const DEFAULT_TOP_K: usize = 5;
const MAX_OUTPUT_BYTES: usize = 16_384;

/// One message from a channel's history.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryMessage {
    pub user_id: String,
    pub user_name: String,
    /// Slack timestamp, unique within the channel.
    pub ts: String,
    pub text: String,
}

/// Source of channel history, implemented by the Slack Web API client.
#[async_trait]
pub trait ChannelHistory: Send + Sync {
    /// Messages of the channel, oldest first.
    async fn channel_history(&self, channel_id: &str) -> Result<Vec<HistoryMessage>, BotError>;
}

struct CachedHistory {
    fetched_at: Instant,
    messages: Arc<Vec<HistoryMessage>>,
}

/// Searches the message history of a Slack channel.
pub struct HistorySearchTool {
    spec: ToolSpec,
    source: Arc<dyn ChannelHistory>,
    cache: RwLock<HashMap<String, CachedHistory>>,
    cache_ttl: Duration,
    top_k: usize,
}

impl HistorySearchTool {
    pub fn new(source: Arc<dyn ChannelHistory>) -> Self {
        let spec = ToolSpec::new(
            TOOL_NAME,
            "Searches the message history of a specific Slack channel. Use this to find past \
             discussions, mentions, or information within the channel. Requires 'query'; \
             'channel_id' defaults to the current channel.",
            ParameterBuilder::new()
                .string("query", "The search query to run against the channel history.", true)
                .string("channel_id", "The ID of the Slack channel to search within.", false)
                .integer("limit", "Maximum number of messages to return.", false)
                .build(),
        )
        .idempotent(true);
        Self {
            spec,
            source,
            cache: RwLock::new(HashMap::new()),
            cache_ttl: Duration::from_secs(300),
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    async fn history(&self, channel_id: &str) -> Result<Arc<Vec<HistoryMessage>>, BotError> {
        if let Some(cached) = self.cache.read().await.get(channel_id) {
            if cached.fetched_at.elapsed() < self.cache_ttl {
                return Ok(cached.messages.clone());
            }
        }
        let messages = Arc::new(self.source.channel_history(channel_id).await?);
        self.cache.write().await.insert(
            channel_id.to_string(),
            CachedHistory {
                fetched_at: Instant::now(),
                messages: messages.clone(),
            },
        );
        Ok(messages)
    }
}

#[async_trait]
impl Tool for HistorySearchTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &ToolContext,
    ) -> Result<serde_json::Value, BotError> {
        let query = args.get_str("query")?;
        let channel_id = match args.get_str_opt("channel_id").filter(|c| !c.is_empty()) {
            Some(channel) => channel.to_string(),
            None => ctx
                .session
                .as_ref()
                .map(|key| key.channel_id.clone())
                .ok_or_else(|| BotError::schema(TOOL_NAME, "channel_id was not provided"))?,
        };
        let limit = args
            .get_i64_opt("limit")
            .filter(|&n| n > 0)
            .map(|n| n as usize)
            .unwrap_or(self.top_k);

        info!(channel = %channel_id, query, "searching channel history");
        let history = self.history(&channel_id).await?;
        let hits = rank_messages(&history, query, limit);

        let text = if hits.is_empty() {
            format!("No relevant messages found in channel {channel_id} for query: '{query}'")
        } else {
            let blocks: Vec<String> = hits.iter().map(|m| format_message(m)).collect();
            format!(
                "Found relevant messages in channel {channel_id}:\n\n{}",
                blocks.join("\n---\n")
            )
        };
        Ok(serde_json::Value::String(truncate_utf8(&text, MAX_OUTPUT_BYTES)))
    }
}

/// Top `limit` messages sharing at least one term with `query`.
pub fn rank_messages<'a>(
    messages: &'a [HistoryMessage],
    query: &str,
    limit: usize,
) -> Vec<&'a HistoryMessage> {
    let mut hits = rank_by_terms(messages, query, |m| m.text.as_str(), Ties::Later);
    hits.truncate(limit);
    hits
}

fn format_message(message: &HistoryMessage) -> String {
    let who = if !message.user_id.is_empty() && message.user_name != message.user_id {
        format!("{} ({})", message.user_name, message.user_id)
    } else {
        message.user_name.clone()
    };
    format!(
        "Message from: {who}\nTimestamp: {}\nContent: {}",
        message.ts, message.text
    )
}
