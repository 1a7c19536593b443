//! Tests for the session store under concurrent use.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use slack_agent::session::{SessionKey, SessionStore};
use slack_agent::types::Turn;

fn key() -> SessionKey {
    SessionKey::new("C1", "1700000000.000100")
}

#[tokio::test]
async fn concurrent_appends_keep_strict_timestamp_order() {
    let store = SessionStore::new(Duration::from_secs(60));
    let session = store.get_or_create(&key()).await;

    let mut tasks = Vec::new();
    for i in 0..32 {
        let store = store.clone();
        let session = session.clone();
        tasks.push(tokio::spawn(async move {
            store
                .append_turn(&session, Turn::user("U1", format!("message {i}")))
                .await
                .unwrap()
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let session = session.lock().await;
    assert_eq!(session.len(), 32);
    assert!(session
        .turns()
        .windows(2)
        .all(|pair| pair[0].timestamp < pair[1].timestamp));
}

#[tokio::test]
async fn eviction_waits_for_the_active_run() {
    let store = SessionStore::new(Duration::from_secs(60));
    let guard = store.lock_live(&key()).await;

    let evicting = {
        let store = store.clone();
        tokio::spawn(async move { store.evict(&key()).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!evicting.is_finished());
    assert_eq!(store.len().await, 1);

    drop(guard);
    assert!(evicting.await.unwrap());
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn waiting_writer_gets_a_fresh_session_after_eviction() {
    let store = SessionStore::new(Duration::from_secs(60));
    let old = store.get_or_create(&key()).await;
    store.append_turn(&old, Turn::user("U1", "before")).await.unwrap();

    assert!(store.evict(&key()).await);
    assert!(store.append_turn(&old, Turn::user("U1", "late")).await.is_err());

    let fresh = store.lock_live(&key()).await;
    assert!(fresh.is_empty());
    assert!(!Arc::ptr_eq(&old, &store.get(&key()).await.unwrap()));
}

#[tokio::test]
async fn reaper_removes_idle_sessions_until_shutdown() {
    let store = SessionStore::new(Duration::from_millis(10));
    store.get_or_create(&key()).await;
    let busy = SessionKey::new("C1", "busy");
    let busy_guard = store.lock_live(&busy).await;

    tokio::time::sleep(Duration::from_millis(30)).await;
    let shutdown = CancellationToken::new();
    let reaper = store.spawn_reaper(Duration::from_millis(5), shutdown.clone());
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(store.keys().await, vec![busy.clone()]);
    shutdown.cancel();
    reaper.await.unwrap();
    drop(busy_guard);

    assert_eq!(store.evict_idle(Utc::now()).await, 1);
}
