//! Channel adapter: between the messaging transport and the agent loop.
//!
//! Inbound events are deduplicated and handed to a per-thread worker task,
//! so the transport's delivery path never waits on a run. Replies go back
//! through a [`Transport`] with bounded retries.

pub mod adapter;
pub mod dedup;

pub use adapter::{ChannelAdapter, Dispatch};

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::BotError;
use crate::types::{DeliveryAck, OutboundMessage};
use crate::util::retry::RetryPolicy;

/// Outbound side of a messaging platform.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryAck, BotError>;
}

/// What happens when an event arrives for a thread whose run is still going.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BusyPolicy {
    /// Wait for the active run, then process events in arrival order.
    #[default]
    Queue,
    /// Cancel the active run and start over with the new event included.
    CancelAndRestart,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub busy_policy: BusyPolicy,
    /// Event ids remembered for deduplication.
    pub dedup_capacity: usize,
    #[serde(with = "crate::util::serde_duration_ms")]
    pub dedup_ttl: Duration,
    /// Retry policy for outbound delivery.
    pub send_retry: RetryPolicy,
    /// A thread's worker exits after this long without events.
    #[serde(with = "crate::util::serde_duration_ms")]
    pub worker_idle_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            busy_policy: BusyPolicy::Queue,
            dedup_capacity: 10_000,
            dedup_ttl: Duration::from_secs(600),
            send_retry: RetryPolicy::default(),
            worker_idle_timeout: Duration::from_secs(300),
        }
    }
}
