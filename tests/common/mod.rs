//! Shared test helpers: a scripted reasoning backend and a recording transport.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;

use slack_agent::agent_loop::{AgentLoop, LoopConfig};
use slack_agent::backend::{ReasoningBackend, ReasoningRequest, ReasoningResponse};
use slack_agent::channel::{ChannelAdapter, ChannelConfig, Transport};
use slack_agent::error::BotError;
use slack_agent::session::SessionStore;
use slack_agent::tools::ToolRegistry;
use slack_agent::types::{DeliveryAck, InboundEvent, OutboundMessage, Role, ToolCall};
use slack_agent::util::retry::RetryPolicy;

pub const BOT_USER: &str = "UBOT";

/// One scripted backend step.
pub enum Step {
    Answer(String),
    Tools(Vec<ToolCall>),
    Fail(BotError),
    /// Never returns; the run can only end by cancellation.
    Hang,
}

/// A backend that replays queued steps, answering "Mock response" once
/// the script runs out.
#[derive(Default)]
pub struct MockBackend {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<ReasoningRequest>>,
    started: Notify,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn answer(&self, text: &str) {
        self.push(Step::Answer(text.to_string()));
    }

    pub fn tool_call(&self, id: &str, name: &str, args: serde_json::Value) {
        self.push(Step::Tools(vec![ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: args,
        }]));
    }

    pub fn push(&self, step: Step) {
        self.steps.lock().unwrap().push_back(step);
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ReasoningRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// User texts visible to the backend in request `index`.
    pub fn user_texts(&self, index: usize) -> Vec<String> {
        self.requests.lock().unwrap()[index]
            .history
            .iter()
            .filter(|turn| turn.role == Role::User)
            .filter_map(|turn| turn.text().map(str::to_string))
            .collect()
    }

    /// Wait until the backend has been called at least `n` times.
    pub async fn wait_for_calls(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let notified = self.started.notified();
                if self.calls() >= n {
                    return;
                }
                notified.await;
            }
        })
        .await
        .expect("backend was not called in time");
    }
}

#[async_trait]
impl ReasoningBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn reason(&self, request: &ReasoningRequest) -> Result<ReasoningResponse, BotError> {
        self.requests.lock().unwrap().push(request.clone());
        self.started.notify_waiters();
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Answer(text)) => Ok(ReasoningResponse::Answer(text)),
            Some(Step::Tools(calls)) => Ok(ReasoningResponse::ToolCalls(calls)),
            Some(Step::Fail(error)) => Err(error),
            Some(Step::Hang) => std::future::pending().await,
            None => Ok(ReasoningResponse::Answer("Mock response".to_string())),
        }
    }
}

/// A transport that records delivered messages and can fail the first N sends.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<OutboundMessage>>,
    failures_left: AtomicUsize,
    attempts: AtomicUsize,
    delivered: Notify,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(times: usize) -> Arc<Self> {
        let transport = Self::default();
        transport.failures_left.store(times, Ordering::SeqCst);
        Arc::new(transport)
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Wait until at least `n` messages were delivered and return them.
    pub async fn wait_for(&self, n: usize) -> Vec<OutboundMessage> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let notified = self.delivered.notified();
                let sent = self.sent();
                if sent.len() >= n {
                    return sent;
                }
                notified.await;
            }
        })
        .await
        .expect("messages were not delivered in time")
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryAck, BotError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(BotError::transport("chat.postMessage failed: internal_error"));
        }

        self.sent.lock().unwrap().push(message.clone());
        self.delivered.notify_waiters();
        Ok(DeliveryAck {
            channel_id: message.channel_id.clone(),
            message_ts: format!("1700000100.{attempt:06}"),
        })
    }
}

pub fn quick_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(1),
        multiplier: 1.0,
    }
}

pub fn event(event_id: &str, thread_id: &str, text: &str) -> InboundEvent {
    InboundEvent {
        event_id: event_id.to_string(),
        channel_id: "C1".to_string(),
        thread_id: thread_id.to_string(),
        author: "U1".to_string(),
        text: text.to_string(),
        timestamp: Utc::now(),
    }
}

pub fn channel_config() -> ChannelConfig {
    ChannelConfig {
        send_retry: quick_retry(3),
        ..ChannelConfig::default()
    }
}

pub fn loop_config() -> LoopConfig {
    LoopConfig::builder().backend_retry(quick_retry(1)).build()
}

/// An adapter wired to the given backend, tools and transport.
pub fn adapter(
    config: ChannelConfig,
    backend: Arc<MockBackend>,
    tools: ToolRegistry,
    transport: Arc<RecordingTransport>,
) -> ChannelAdapter {
    let agent = Arc::new(AgentLoop::new(backend, tools, loop_config()));
    ChannelAdapter::new(
        config,
        SessionStore::new(Duration::from_secs(3600)),
        agent,
        transport,
        Some(BOT_USER.to_string()),
    )
    .expect("adapter")
}
