//! Slack Web API client.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::types::{
    AuthTest, ConnectionsOpen, HistoryResponse, PostMessage, PostMessageResponse,
    UsersInfoResponse,
};
use crate::backend::http::{bearer_headers, shared_client};
use crate::error::BotError;
use crate::tools::{ChannelHistory, HistoryMessage};
use crate::types::DeliveryAck;
use crate::util::retry::RetryPolicy;

pub const DEFAULT_API_BASE: &str = "https://slack.com/api";

const SKIPPED_SUBTYPES: &[&str] = &[
    "channel_join",
    "channel_leave",
    "channel_topic",
    "channel_purpose",
];

/// Limits for `conversations.history` crawls.
#[derive(Debug, Clone)]
pub struct HistoryLimits {
    pub page_size: u32,
    pub max_messages: usize,
    /// Pause between pages, to stay under Slack's tier limits.
    pub page_delay: Duration,
    /// Wall-clock allowance for one crawl. A crawl that runs out returns the
    /// newest messages it has so far; keep this below the tool timeout.
    pub crawl_budget: Duration,
}

impl Default for HistoryLimits {
    fn default() -> Self {
        Self {
            page_size: 200,
            max_messages: 10_000,
            page_delay: Duration::from_millis(1200),
            crawl_budget: Duration::from_secs(20),
        }
    }
}

pub struct SlackClient {
    bot_token: String,
    app_token: Option<String>,
    api_base: String,
    history: HistoryLimits,
    rate_limit_retry: RetryPolicy,
    user_names: RwLock<HashMap<String, String>>,
}

impl std::fmt::Debug for SlackClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackClient")
            .field("api_base", &self.api_base)
            .field("history", &self.history)
            .finish_non_exhaustive()
    }
}

/// Slack error codes that mean the token itself is bad.
fn is_auth_error(code: &str) -> bool {
    matches!(
        code,
        "invalid_auth" | "not_authed" | "account_inactive" | "token_revoked" | "token_expired"
    )
}

impl SlackClient {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            app_token: None,
            api_base: DEFAULT_API_BASE.to_string(),
            history: HistoryLimits::default(),
            rate_limit_retry: RetryPolicy {
                max_attempts: 5,
                ..RetryPolicy::default()
            },
            user_names: RwLock::new(HashMap::new()),
        }
    }

    /// App-level token (`xapp-…`) used to open Socket Mode connections.
    pub fn with_app_token(mut self, token: impl Into<String>) -> Self {
        self.app_token = Some(token.into());
        self
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_history_limits(mut self, limits: HistoryLimits) -> Self {
        self.history = limits;
        self
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{method}", self.api_base)
    }

    /// Send a Web API request. The outer error is a transport failure; the
    /// inner one is the Slack error code of an `ok: false` reply.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        request: RequestBuilder,
    ) -> Result<Result<T, String>, BotError> {
        let resp = request.send().await?;
        let status = resp.status().as_u16();

        if status == 429 {
            let retry_after_ms = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(|secs| secs.saturating_mul(1000));
            return Err(BotError::Transport {
                message: format!("{method} rate limited"),
                retry_after_ms: Some(retry_after_ms.unwrap_or(1000)),
            });
        }
        if !(200..300).contains(&status) {
            let body = resp.text().await.unwrap_or_default();
            return Err(BotError::transport(format!(
                "{method} returned HTTP {status}: {body}"
            )));
        }

        let body: serde_json::Value = resp.json().await?;
        if body.get("ok").and_then(|v| v.as_bool()) != Some(true) {
            let code = body
                .get("error")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown_error")
                .to_string();
            return Ok(Err(code));
        }
        Ok(Ok(serde_json::from_value(body)?))
    }

    /// [`call`](Self::call) with Slack error codes mapped to errors.
    async fn api<T: DeserializeOwned>(&self, method: &str, request: RequestBuilder) -> Result<T, BotError> {
        match self.call(method, request).await? {
            Ok(value) => Ok(value),
            Err(code) if is_auth_error(&code) => {
                Err(BotError::Authentication(format!("{method}: {code}")))
            }
            Err(code) if code == "ratelimited" => Err(BotError::Transport {
                message: format!("{method} rate limited"),
                retry_after_ms: Some(1000),
            }),
            Err(code) => Err(BotError::transport(format!("{method} failed: {code}"))),
        }
    }

    fn post(&self, method: &str, token: &str) -> RequestBuilder {
        shared_client().post(self.url(method)).headers(bearer_headers(token))
    }

    fn get(&self, method: &str) -> RequestBuilder {
        shared_client()
            .get(self.url(method))
            .headers(bearer_headers(&self.bot_token))
    }

    /// Identify the bot user behind the bot token.
    pub async fn auth_test(&self) -> Result<AuthTest, BotError> {
        let auth: AuthTest = self
            .api("auth.test", self.post("auth.test", &self.bot_token))
            .await?;
        info!(user_id = %auth.user_id, "authenticated with Slack");
        Ok(auth)
    }

    /// Post a message, threaded under `thread_ts` when given.
    pub async fn post_message(
        &self,
        channel: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<DeliveryAck, BotError> {
        let body = PostMessage {
            channel,
            text,
            thread_ts,
        };
        let resp: PostMessageResponse = self
            .api(
                "chat.postMessage",
                self.post("chat.postMessage", &self.bot_token).json(&body),
            )
            .await?;
        Ok(DeliveryAck {
            channel_id: resp.channel,
            message_ts: resp.ts,
        })
    }

    /// Open a Socket Mode connection; returns the WebSocket URL.
    pub async fn open_socket_connection(&self) -> Result<String, BotError> {
        let token = self.app_token.as_deref().ok_or_else(|| {
            BotError::Configuration("Socket Mode requires an app-level token".into())
        })?;
        let open: ConnectionsOpen = self
            .api("apps.connections.open", self.post("apps.connections.open", token))
            .await?;
        Ok(open.url)
    }

    /// Display name for a user id, cached.
    ///
    /// Empty ids are "Unknown User"; ids that are not user ids are returned
    /// as-is; users Slack doesn't know are remembered as not found.
    pub async fn user_name(&self, user_id: &str) -> String {
        if user_id.is_empty() {
            return "Unknown User".to_string();
        }
        if !(user_id.starts_with('U') || user_id.starts_with('W')) {
            return user_id.to_string();
        }
        if let Some(name) = self.user_names.read().await.get(user_id) {
            return name.clone();
        }

        let request = self.get("users.info").query(&[("user", user_id)]);
        let name = match self.call::<UsersInfoResponse>("users.info", request).await {
            Ok(Ok(info)) => info.user.display_name().unwrap_or_else(|| user_id.to_string()),
            Ok(Err(code)) if code == "user_not_found" => format!("Unknown User ({user_id})"),
            Ok(Err(code)) => {
                warn!(user_id, code = %code, "users.info failed");
                return user_id.to_string();
            }
            Err(e) => {
                warn!(user_id, error = %e, "users.info failed");
                return user_id.to_string();
            }
        };

        self.user_names
            .write()
            .await
            .insert(user_id.to_string(), name.clone());
        name
    }

    /// Fetch a channel's messages, oldest first. A crawl that outlives
    /// `crawl_budget` keeps only the newest pages it reached.
    pub async fn fetch_channel_history(&self, channel_id: &str) -> Result<Vec<HistoryMessage>, BotError> {
        let limit = self.history.page_size.to_string();
        let started = tokio::time::Instant::now();
        let mut raw = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let page: HistoryResponse = self
                .rate_limit_retry
                .execute_if(
                    || {
                        let mut query = vec![("channel", channel_id), ("limit", limit.as_str())];
                        if let Some(cursor) = cursor.as_deref() {
                            query.push(("cursor", cursor));
                        }
                        self.api("conversations.history", self.get("conversations.history").query(&query))
                    },
                    |e| e.retry_after_ms().is_some(),
                )
                .await?;

            debug!(channel = channel_id, count = page.messages.len(), "history page");
            let next = page.next_cursor().map(str::to_string);
            let has_more = page.has_more;
            raw.extend(page.messages);

            if raw.len() >= self.history.max_messages {
                raw.truncate(self.history.max_messages);
                break;
            }
            match next {
                Some(next) if has_more => cursor = Some(next),
                _ => break,
            }
            if started.elapsed().saturating_add(self.history.page_delay) >= self.history.crawl_budget {
                warn!(
                    channel = channel_id,
                    fetched = raw.len(),
                    budget_ms = self.history.crawl_budget.as_millis() as u64,
                    "history crawl budget spent; searching partial history"
                );
                break;
            }
            tokio::time::sleep(self.history.page_delay).await;
        }

        let mut messages = Vec::with_capacity(raw.len());
        for message in raw {
            let text = message.text.unwrap_or_default();
            if text.trim().is_empty()
                || message
                    .subtype
                    .as_deref()
                    .is_some_and(|s| SKIPPED_SUBTYPES.contains(&s))
            {
                continue;
            }
            let user_id = message.user.unwrap_or_default();
            let user_name = self.user_name(&user_id).await;
            messages.push(HistoryMessage {
                user_id,
                user_name,
                ts: message.ts,
                text,
            });
        }
        // Slack pages newest first.
        messages.reverse();
        info!(channel = channel_id, count = messages.len(), "loaded channel history");
        Ok(messages)
    }
}

#[async_trait]
impl ChannelHistory for SlackClient {
    async fn channel_history(&self, channel_id: &str) -> Result<Vec<HistoryMessage>, BotError> {
        self.fetch_channel_history(channel_id).await
    }
}
