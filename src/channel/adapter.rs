//! Event dispatch to per-thread workers and reply delivery.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use regex::Regex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::dedup::SeenEvents;
use super::{BusyPolicy, ChannelConfig, Transport};
use crate::agent_loop::AgentLoop;
use crate::error::BotError;
use crate::session::SessionStore;
use crate::types::{DeliveryAck, InboundEvent, OutboundMessage, SessionKey, Turn};

/// What [`ChannelAdapter::on_event`] did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Handed to the thread's worker.
    Queued,
    /// Already seen; dropped.
    Duplicate,
    /// Not for the bot (own message, empty text, or shutting down).
    Ignored,
}

struct Worker {
    tx: mpsc::UnboundedSender<InboundEvent>,
    active_run: Arc<Mutex<Option<CancellationToken>>>,
}

struct Inner {
    config: ChannelConfig,
    store: SessionStore,
    agent: Arc<AgentLoop>,
    transport: Arc<dyn Transport>,
    bot_user_id: Option<String>,
    mention: Option<Regex>,
    seen: Mutex<SeenEvents>,
    workers: Mutex<HashMap<SessionKey, Worker>>,
    closed: AtomicBool,
    cancel_runs: CancellationToken,
    tracker: TaskTracker,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Routes inbound events to the agent loop and replies to the transport.
///
/// Cloning is cheap; clones share workers and the dedup set.
#[derive(Clone)]
pub struct ChannelAdapter {
    inner: Arc<Inner>,
}

impl ChannelAdapter {
    /// `bot_user_id` is the bot's own platform user id; its messages are
    /// ignored and its mention is stripped from inbound text.
    pub fn new(
        config: ChannelConfig,
        store: SessionStore,
        agent: Arc<AgentLoop>,
        transport: Arc<dyn Transport>,
        bot_user_id: Option<String>,
    ) -> Result<Self, BotError> {
        let mention = bot_user_id
            .as_deref()
            .map(|id| Regex::new(&format!(r"<@{}(?:\|[^>]*)?>", regex::escape(id))))
            .transpose()
            .map_err(|e| BotError::Configuration(format!("invalid bot user id: {e}")))?;
        let seen = SeenEvents::new(config.dedup_capacity, config.dedup_ttl);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                store,
                agent,
                transport,
                bot_user_id,
                mention,
                seen: Mutex::new(seen),
                workers: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
                cancel_runs: CancellationToken::new(),
                tracker: TaskTracker::new(),
            }),
        })
    }

    pub fn store(&self) -> &SessionStore {
        &self.inner.store
    }

    pub fn busy_policy(&self) -> BusyPolicy {
        self.inner.config.busy_policy
    }

    /// Accept an inbound event without waiting for it to be processed.
    pub fn on_event(&self, mut event: InboundEvent) -> Dispatch {
        let inner = &self.inner;

        if inner.bot_user_id.as_deref() == Some(event.author.as_str()) {
            debug!(event_id = %event.event_id, "ignoring own message");
            return Dispatch::Ignored;
        }
        event.text = inner.clean_text(&event.text);
        if event.text.is_empty() {
            debug!(event_id = %event.event_id, "ignoring empty message");
            return Dispatch::Ignored;
        }
        if !lock(&inner.seen).insert(&event.event_id, Instant::now()) {
            debug!(event_id = %event.event_id, "duplicate event");
            return Dispatch::Duplicate;
        }

        let key = event.key();
        let mut workers = lock(&inner.workers);
        if inner.closed.load(Ordering::SeqCst) {
            return Dispatch::Ignored;
        }

        if inner.config.busy_policy == BusyPolicy::CancelAndRestart {
            if let Some(worker) = workers.get(&key) {
                if let Some(run) = lock(&worker.active_run).as_ref() {
                    info!(thread = %key, event_id = %event.event_id, "new event cancels active run");
                    run.cancel();
                }
            }
        }

        let event_id = event.event_id.clone();
        let worker = workers
            .entry(key.clone())
            .or_insert_with(|| self.spawn_worker(key.clone()));
        if let Err(mpsc::error::SendError(event)) = worker.tx.send(event) {
            // Worker task ended without deregistering; replace it.
            let fresh = self.spawn_worker(key.clone());
            let _ = fresh.tx.send(event);
            workers.insert(key.clone(), fresh);
        }
        debug!(thread = %key, event_id = %event_id, "event queued");
        Dispatch::Queued
    }

    /// Deliver `text` into a thread, retrying transient transport failures.
    ///
    /// A message that still cannot be delivered is logged and dropped.
    pub async fn send(&self, key: &SessionKey, text: &str) -> Option<DeliveryAck> {
        self.inner.deliver(key, text).await
    }

    /// Stop accepting events and let workers finish their queues.
    ///
    /// Runs still going after `grace` are canceled.
    pub async fn shutdown(&self, grace: Duration) {
        let inner = &self.inner;
        {
            let mut workers = lock(&inner.workers);
            inner.closed.store(true, Ordering::SeqCst);
            workers.clear();
        }
        inner.tracker.close();

        if tokio::time::timeout(grace, inner.tracker.wait()).await.is_err() {
            warn!("canceling runs still active after shutdown grace period");
            inner.cancel_runs.cancel();
            inner.tracker.wait().await;
        }
        info!("channel adapter stopped");
    }

    fn spawn_worker(&self, key: SessionKey) -> Worker {
        let (tx, rx) = mpsc::unbounded_channel();
        let active_run = Arc::new(Mutex::new(None));
        debug!(thread = %key, "spawning thread worker");
        self.inner
            .tracker
            .spawn(run_worker(self.inner.clone(), key, rx, active_run.clone()));
        Worker { tx, active_run }
    }
}

async fn run_worker(
    inner: Arc<Inner>,
    key: SessionKey,
    mut rx: mpsc::UnboundedReceiver<InboundEvent>,
    active_run: Arc<Mutex<Option<CancellationToken>>>,
) {
    loop {
        let next = match tokio::time::timeout(inner.config.worker_idle_timeout, rx.recv()).await {
            Ok(received) => received,
            Err(_) => inner.retire_or_next(&key, &mut rx),
        };
        let Some(event) = next else { break };
        inner.process(&key, event, &mut rx, &active_run).await;
    }
    debug!(thread = %key, "thread worker stopped");
}

impl Inner {
    fn clean_text(&self, text: &str) -> String {
        match &self.mention {
            Some(re) => re.replace_all(text, "").trim().to_string(),
            None => text.trim().to_string(),
        }
    }

    /// Deregister an idle worker, unless an event slipped in meanwhile.
    fn retire_or_next(
        &self,
        key: &SessionKey,
        rx: &mut mpsc::UnboundedReceiver<InboundEvent>,
    ) -> Option<InboundEvent> {
        let mut workers = lock(&self.workers);
        match rx.try_recv() {
            Ok(event) => Some(event),
            Err(_) => {
                workers.remove(key);
                None
            }
        }
    }

    async fn process(
        &self,
        key: &SessionKey,
        first: InboundEvent,
        rx: &mut mpsc::UnboundedReceiver<InboundEvent>,
        active_run: &Mutex<Option<CancellationToken>>,
    ) {
        let token = self.cancel_runs.child_token();
        *lock(active_run) = Some(token.clone());

        let mut events = vec![first];
        if self.config.busy_policy == BusyPolicy::CancelAndRestart {
            // Everything already waiting supersedes this run; answer once.
            while let Ok(event) = rx.try_recv() {
                events.push(event);
            }
        }

        let outcome = {
            let mut session = self.store.lock_live(key).await;
            for event in &events {
                if let Err(e) = session.append_turn(Turn::user(event.author.clone(), event.text.clone())) {
                    warn!(thread = %key, event_id = %event.event_id, error = %e, "could not record user turn");
                }
            }
            self.agent.run(&mut session, &token).await
        };
        *lock(active_run) = None;

        if let Some(reply) = outcome.reply {
            self.deliver(key, &reply).await;
        }
    }

    async fn deliver(&self, key: &SessionKey, text: &str) -> Option<DeliveryAck> {
        let message = OutboundMessage::reply(key, text);
        match self
            .config
            .send_retry
            .execute(|| self.transport.send(&message))
            .await
        {
            Ok(ack) => {
                debug!(thread = %key, message_ts = %ack.message_ts, "reply delivered");
                Some(ack)
            }
            Err(e) => {
                error!(thread = %key, error = %e, "dropping reply after delivery failures");
                None
            }
        }
    }
}
