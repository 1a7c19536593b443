//! In-memory session store with idle eviction.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::{Session, SessionKey, SessionStatus};
use crate::error::BotError;
use crate::types::Turn;

/// A session shared between the store and the run that owns it.
pub type SharedSession = Arc<Mutex<Session>>;

/// Holds at most one live session per thread.
///
/// Cloning is cheap; all clones share the same sessions.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<SessionKey, SharedSession>>>,
    idle_timeout: Duration,
}

impl SessionStore {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            idle_timeout,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Get the live session for `key`, creating it on first use.
    pub async fn get_or_create(&self, key: &SessionKey) -> SharedSession {
        if let Some(existing) = self.sessions.read().await.get(key) {
            return existing.clone();
        }
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(key.clone())
            .or_insert_with(|| {
                debug!(thread = %key, "creating session");
                Arc::new(Mutex::new(Session::new(key.clone())))
            })
            .clone()
    }

    /// Get an existing session without creating one.
    pub async fn get(&self, key: &SessionKey) -> Option<SharedSession> {
        self.sessions.read().await.get(key).cloned()
    }

    /// Lock the live session for `key` exclusively.
    ///
    /// If the session is evicted while the caller waits for the lock, a fresh
    /// session is created and locked instead, so the guard never refers to a
    /// closed session.
    pub async fn lock_live(&self, key: &SessionKey) -> OwnedMutexGuard<Session> {
        loop {
            let guard = self.get_or_create(key).await.lock_owned().await;
            if guard.status() != SessionStatus::Closed {
                return guard;
            }
        }
    }

    /// Append a turn to a session, serializing with other writers.
    pub async fn append_turn(&self, session: &SharedSession, turn: Turn) -> Result<Uuid, BotError> {
        session.lock().await.append_turn(turn)
    }

    /// Evict the session for `key`, waiting for any active run to release it.
    ///
    /// Returns `false` if there was no session.
    pub async fn evict(&self, key: &SessionKey) -> bool {
        let Some(handle) = self.get(key).await else {
            return false;
        };
        let mut session = handle.lock().await;
        let mut sessions = self.sessions.write().await;
        let is_current = sessions
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, &handle));
        if is_current {
            sessions.remove(key);
        }
        session.close();
        debug!(thread = %key, "evicted session");
        is_current
    }

    /// Remove sessions idle for longer than the idle timeout.
    ///
    /// Sessions locked by an active run are skipped. Returns the number of
    /// evicted sessions.
    pub async fn evict_idle(&self, now: DateTime<Utc>) -> usize {
        let idle_for = chrono::Duration::from_std(self.idle_timeout)
            .unwrap_or_else(|_| chrono::Duration::days(365));
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|key, handle| {
            let Ok(mut session) = handle.try_lock() else {
                return true;
            };
            if now - session.last_active_at() < idle_for {
                return true;
            }
            debug!(thread = %key, "reaping idle session");
            session.close();
            false
        });
        before - sessions.len()
    }

    /// Periodically evict idle sessions until `shutdown` is canceled.
    pub fn spawn_reaper(&self, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let reaped = store.evict_idle(Utc::now()).await;
                        if reaped > 0 {
                            info!(reaped, "reaped idle sessions");
                        }
                    }
                }
            }
        })
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Keys of all live sessions.
    pub async fn keys(&self) -> Vec<SessionKey> {
        self.sessions.read().await.keys().cloned().collect()
    }
}
