//! [`Transport`] over `chat.postMessage`.

use std::sync::Arc;

use async_trait::async_trait;

use super::client::SlackClient;
use crate::channel::Transport;
use crate::error::BotError;
use crate::types::{DeliveryAck, OutboundMessage};

/// Delivers replies into Slack threads.
#[derive(Debug, Clone)]
pub struct SlackTransport {
    client: Arc<SlackClient>,
}

impl SlackTransport {
    pub fn new(client: Arc<SlackClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for SlackTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryAck, BotError> {
        let thread = Some(message.thread_id.as_str()).filter(|t| !t.is_empty());
        self.client
            .post_message(&message.channel_id, &message.text, thread)
            .await
    }
}
