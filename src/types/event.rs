//! Transport-facing event and message shapes.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifies one conversation: a Slack channel plus the root thread timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey {
    pub channel_id: String,
    pub thread_id: String,
}

impl SessionKey {
    pub fn new(channel_id: impl Into<String>, thread_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            thread_id: thread_id.into(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.channel_id, self.thread_id)
    }
}

/// A structured inbound message from the transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InboundEvent {
    pub event_id: String,
    pub channel_id: String,
    pub thread_id: String,
    pub author: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl InboundEvent {
    pub fn key(&self) -> SessionKey {
        SessionKey::new(self.channel_id.clone(), self.thread_id.clone())
    }
}

/// A reply to deliver into a thread.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutboundMessage {
    pub channel_id: String,
    pub thread_id: String,
    pub text: String,
}

impl OutboundMessage {
    pub fn reply(key: &SessionKey, text: impl Into<String>) -> Self {
        Self {
            channel_id: key.channel_id.clone(),
            thread_id: key.thread_id.clone(),
            text: text.into(),
        }
    }
}

/// Delivery acknowledgement returned by the transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryAck {
    pub channel_id: String,
    /// Transport-assigned id of the delivered message (Slack `ts`).
    pub message_ts: String,
}
