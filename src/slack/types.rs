//! Slack wire types (Web API responses and Socket Mode envelopes).

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::types::InboundEvent;

#[derive(Debug, Clone, Deserialize)]
pub struct AuthTest {
    pub user_id: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
}

#[derive(Serialize)]
pub(crate) struct PostMessage<'a> {
    pub channel: &'a str,
    pub text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PostMessageResponse {
    pub channel: String,
    pub ts: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UsersInfoResponse {
    pub user: SlackUser,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SlackUser {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub real_name: Option<String>,
    #[serde(default)]
    pub profile: Option<SlackProfile>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SlackProfile {
    #[serde(default)]
    pub real_name: Option<String>,
}

impl SlackUser {
    /// Real name, else the handle.
    pub fn display_name(&self) -> Option<String> {
        self.real_name
            .clone()
            .or_else(|| self.profile.as_ref().and_then(|p| p.real_name.clone()))
            .filter(|n| !n.is_empty())
            .or_else(|| self.name.clone().filter(|n| !n.is_empty()))
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryResponse {
    #[serde(default)]
    pub messages: Vec<SlackMessage>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub response_metadata: Option<ResponseMetadata>,
}

impl HistoryResponse {
    pub fn next_cursor(&self) -> Option<&str> {
        self.response_metadata
            .as_ref()
            .and_then(|m| m.next_cursor.as_deref())
            .filter(|c| !c.is_empty())
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponseMetadata {
    #[serde(default)]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SlackMessage {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub ts: String,
    #[serde(default)]
    pub subtype: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConnectionsOpen {
    pub url: String,
}

/// A Socket Mode frame from Slack.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum SocketFrame {
    Hello,
    Disconnect {
        #[serde(default)]
        reason: Option<String>,
    },
    EventsApi {
        envelope_id: String,
        payload: EventCallback,
    },
    #[serde(other)]
    Other,
}

/// Any other envelope still needs its `envelope_id` acknowledged.
#[derive(Debug, Deserialize)]
pub(crate) struct AnyEnvelope {
    #[serde(default)]
    pub envelope_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EventCallback {
    pub event_id: String,
    pub event: SlackEvent,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SlackEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub channel_type: Option<String>,
    #[serde(default)]
    pub ts: Option<String>,
    #[serde(default)]
    pub thread_ts: Option<String>,
    /// Set on bot messages.
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub subtype: Option<String>,
}

impl EventCallback {
    /// Mentions anywhere, plus plain direct messages, become inbound events.
    pub fn into_inbound(self) -> Option<InboundEvent> {
        let event = self.event;
        let wanted = match event.event_type.as_str() {
            "app_mention" => true,
            "message" => event.channel_type.as_deref() == Some("im") && event.subtype.is_none(),
            _ => false,
        };
        if !wanted || event.bot_id.is_some() {
            return None;
        }

        let ts = event.ts?;
        Some(InboundEvent {
            event_id: self.event_id,
            channel_id: event.channel?,
            thread_id: event.thread_ts.unwrap_or_else(|| ts.clone()),
            author: event.user?,
            text: event.text.unwrap_or_default(),
            timestamp: parse_ts(&ts).unwrap_or_else(Utc::now),
        })
    }
}

/// Parse a Slack `ts` ("seconds.micros") into a UTC time.
pub fn parse_ts(ts: &str) -> Option<DateTime<Utc>> {
    let (secs, frac) = ts.split_once('.').unwrap_or((ts, "0"));
    let secs: i64 = secs.parse().ok()?;
    let micros: u32 = format!("{frac:0<6}").get(..6)?.parse().ok()?;
    Utc.timestamp_opt(secs, micros * 1_000).single()
}
