//! Socket Mode event source.
//!
//! Slack pushes events over a WebSocket opened with the app-level token.
//! Every envelope is acknowledged before its event is handed to the
//! [`ChannelAdapter`], which returns without waiting for the run.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::{self, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::client::SlackClient;
use super::types::{AnyEnvelope, SocketFrame};
use crate::channel::ChannelAdapter;
use crate::error::BotError;

type SlackSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

enum ConnectionOutcome {
    Shutdown,
    /// The socket closed after delivering this many envelopes.
    Disconnected { envelopes: usize },
}

/// What one inbound frame meant for the connection.
enum FrameOutcome {
    Continue,
    Envelope,
    Reconnect,
}

#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub heartbeat_interval: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

pub struct SocketModeListener {
    client: Arc<SlackClient>,
    adapter: ChannelAdapter,
    reconnect: ReconnectPolicy,
}

impl SocketModeListener {
    pub fn new(client: Arc<SlackClient>, adapter: ChannelAdapter) -> Self {
        Self {
            client,
            adapter,
            reconnect: ReconnectPolicy::default(),
        }
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Receive events until `shutdown` fires.
    ///
    /// Connection failures are retried with backoff; only authentication
    /// and configuration errors end the loop early.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), BotError> {
        let mut attempt = 0usize;
        loop {
            if shutdown.is_cancelled() {
                return Ok(());
            }

            match self.connect().await {
                Ok(mut socket) => {
                    info!("Socket Mode connected");
                    let connected_at = time::Instant::now();
                    let envelopes = match self.run_connection(&mut socket, &shutdown).await {
                        ConnectionOutcome::Shutdown => return Ok(()),
                        ConnectionOutcome::Disconnected { envelopes } => envelopes,
                    };
                    let (next_attempt, delay) = after_disconnect(attempt, envelopes, connected_at.elapsed(), &self.reconnect);
                    attempt = next_attempt;
                    match delay {
                        None => info!(envelopes, "Socket Mode disconnected; reconnecting"),
                        Some(delay) => {
                            warn!(
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                "Socket Mode closed before any envelope arrived"
                            );
                            tokio::select! {
                                _ = shutdown.cancelled() => return Ok(()),
                                _ = time::sleep(delay) => {}
                            }
                        }
                    }
                }
                Err(e @ (BotError::Authentication(_) | BotError::Configuration(_))) => {
                    return Err(e);
                }
                Err(e) => {
                    attempt += 1;
                    let delay = backoff_delay(attempt, self.reconnect.base_delay, self.reconnect.max_delay);
                    warn!(attempt, error = %e, delay_ms = delay.as_millis() as u64, "Socket Mode connect failed");
                    tokio::select! {
                        _ = shutdown.cancelled() => return Ok(()),
                        _ = time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    async fn connect(&self) -> Result<SlackSocket, BotError> {
        let url = self.client.open_socket_connection().await?;
        connect_async(url.as_str())
            .await
            .map(|(socket, _)| socket)
            .map_err(|e| BotError::transport(format!("websocket connect failed: {e}")))
    }

    async fn run_connection(
        &self,
        socket: &mut SlackSocket,
        shutdown: &CancellationToken,
    ) -> ConnectionOutcome {
        let mut heartbeat = time::interval(self.reconnect.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        heartbeat.tick().await;
        let mut envelopes = 0usize;
        let disconnected = |envelopes| ConnectionOutcome::Disconnected { envelopes };

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    let _ = socket.send(Message::Close(None)).await;
                    return ConnectionOutcome::Shutdown;
                }
                _ = heartbeat.tick() => {
                    if let Err(e) = socket.send(Message::Ping(Default::default())).await {
                        warn!(error = %e, "Socket Mode heartbeat failed");
                        return disconnected(envelopes);
                    }
                }
                frame = socket.next() => match frame {
                    Some(Ok(message)) => match self.handle_message(socket, message).await {
                        Ok(FrameOutcome::Continue) => {}
                        Ok(FrameOutcome::Envelope) => envelopes += 1,
                        Ok(FrameOutcome::Reconnect) => return disconnected(envelopes),
                        Err(e) => {
                            warn!(error = %e, "Socket Mode frame handling failed");
                            return disconnected(envelopes);
                        }
                    },
                    Some(Err(e)) => {
                        warn!(error = %e, "Socket Mode receive failed");
                        return disconnected(envelopes);
                    }
                    None => return disconnected(envelopes),
                },
            }
        }
    }

    async fn handle_message(
        &self,
        socket: &mut SlackSocket,
        message: Message,
    ) -> Result<FrameOutcome, WsError> {
        let text = match message {
            Message::Text(text) => text.to_string(),
            Message::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => text,
                Err(_) => return Ok(FrameOutcome::Continue),
            },
            Message::Ping(payload) => {
                socket.send(Message::Pong(payload)).await?;
                return Ok(FrameOutcome::Continue);
            }
            Message::Pong(_) | Message::Frame(_) => return Ok(FrameOutcome::Continue),
            Message::Close(_) => return Ok(FrameOutcome::Reconnect),
        };

        match serde_json::from_str::<SocketFrame>(&text) {
            Ok(SocketFrame::Hello) => {
                debug!("Socket Mode hello");
                Ok(FrameOutcome::Continue)
            }
            Ok(SocketFrame::Disconnect { reason }) => {
                info!(reason = reason.as_deref().unwrap_or("unknown"), "Slack requested reconnect");
                Ok(FrameOutcome::Reconnect)
            }
            Ok(SocketFrame::EventsApi { envelope_id, payload }) => {
                acknowledge(socket, &envelope_id).await?;
                let event_id = payload.event_id.clone();
                match payload.into_inbound() {
                    Some(event) => {
                        let dispatch = self.adapter.on_event(event);
                        debug!(event_id = %event_id, ?dispatch, "event dispatched");
                    }
                    None => debug!(event_id = %event_id, "event not addressed to the bot"),
                }
                Ok(FrameOutcome::Envelope)
            }
            Ok(SocketFrame::Other) | Err(_) => {
                // Unhandled envelopes still need acknowledging or Slack retries them.
                match serde_json::from_str(&text) {
                    Ok(AnyEnvelope { envelope_id: Some(id) }) => {
                        acknowledge(socket, &id).await?;
                        Ok(FrameOutcome::Envelope)
                    }
                    _ => Ok(FrameOutcome::Continue),
                }
            }
        }
    }
}

async fn acknowledge(socket: &mut SlackSocket, envelope_id: &str) -> Result<(), WsError> {
    let ack = serde_json::json!({ "envelope_id": envelope_id }).to_string();
    socket.send(Message::Text(ack.into())).await
}

/// Next attempt counter and the wait before reconnecting. A connection that
/// delivered envelopes, or stayed up past `max_delay`, resets the backoff; one
/// that closed quickly without any counts as a failed attempt.
fn after_disconnect(
    attempt: usize,
    envelopes: usize,
    lived: Duration,
    policy: &ReconnectPolicy,
) -> (usize, Option<Duration>) {
    if envelopes > 0 || lived >= policy.max_delay {
        return (0, None);
    }
    let attempt = attempt + 1;
    (attempt, Some(backoff_delay(attempt, policy.base_delay, policy.max_delay)))
}

fn backoff_delay(attempt: usize, base: Duration, max_delay: Duration) -> Duration {
    let multiplier = 2u32.saturating_pow(attempt.saturating_sub(1) as u32) as f64;
    Duration::from_secs_f64((base.as_secs_f64() * multiplier).min(max_delay.as_secs_f64()))
}
