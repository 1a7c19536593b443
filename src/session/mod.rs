//! Per-thread conversation state.
//!
//! A [`Session`] holds the ordered turns of one Slack thread. Sessions live in
//! a [`SessionStore`] behind an async mutex each, so appends to one thread
//! serialize while other threads proceed independently.

pub mod store;

pub use crate::types::SessionKey;
pub use store::{SessionStore, SharedSession};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;
use uuid::Uuid;

use crate::error::BotError;
use crate::types::{Role, Turn};

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionStatus {
    /// An agent run is in progress.
    Active,
    /// Waiting for the next inbound event.
    Idle,
    /// Evicted; no further turns may be appended.
    Closed,
}

/// Conversational state tied to one messaging thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    key: SessionKey,
    turns: Vec<Turn>,
    status: SessionStatus,
    created_at: DateTime<Utc>,
    last_active_at: DateTime<Utc>,
}

impl Session {
    pub fn new(key: SessionKey) -> Self {
        let now = Utc::now();
        Self {
            key,
            turns: Vec::new(),
            status: SessionStatus::Idle,
            created_at: now,
            last_active_at: now,
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_active_at(&self) -> DateTime<Utc> {
        self.last_active_at
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Append a turn, keeping timestamps strictly increasing.
    ///
    /// A turn stamped at or before the previous one is moved to one
    /// microsecond after it.
    pub fn append_turn(&mut self, mut turn: Turn) -> Result<Uuid, BotError> {
        if self.status == SessionStatus::Closed {
            return Err(BotError::InvalidState(format!(
                "session {} is closed",
                self.key
            )));
        }
        if let Some(last) = self.turns.last() {
            if turn.timestamp <= last.timestamp {
                turn.timestamp = last.timestamp + Duration::microseconds(1);
            }
        }
        self.last_active_at = turn.timestamp.max(Utc::now());
        let id = turn.id;
        self.turns.push(turn);
        Ok(id)
    }

    /// The most recent `max_turns` turns, trimmed so the window never starts
    /// with tool results whose originating call fell outside it.
    pub fn history_window(&self, max_turns: usize) -> &[Turn] {
        let mut start = self.turns.len().saturating_sub(max_turns);
        while start < self.turns.len() && self.turns[start].role == Role::Tool {
            start += 1;
        }
        &self.turns[start..]
    }

    pub(crate) fn mark_active(&mut self) {
        if self.status != SessionStatus::Closed {
            self.status = SessionStatus::Active;
            self.last_active_at = Utc::now();
        }
    }

    pub(crate) fn mark_idle(&mut self) {
        if self.status != SessionStatus::Closed {
            self.status = SessionStatus::Idle;
            self.last_active_at = Utc::now();
        }
    }

    pub(crate) fn close(&mut self) {
        self.status = SessionStatus::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ToolCall, ToolResult};
    use serde_json::json;

    fn session() -> Session {
        Session::new(SessionKey::new("C1", "t1"))
    }

    #[test]
    fn append_keeps_timestamps_strictly_ordered() {
        let mut session = session();
        let stamp = Utc::now();
        for text in ["a", "b", "c"] {
            let mut turn = Turn::user("U1", text);
            turn.timestamp = stamp;
            session.append_turn(turn).unwrap();
        }

        let turns = session.turns();
        assert!(turns[0].timestamp < turns[1].timestamp);
        assert!(turns[1].timestamp < turns[2].timestamp);
    }

    #[test]
    fn closed_session_rejects_appends() {
        let mut session = session();
        session.close();

        let err = session.append_turn(Turn::assistant("late")).unwrap_err();
        assert!(matches!(err, BotError::InvalidState(_)));
        assert!(session.is_empty());
    }

    #[test]
    fn history_window_skips_orphaned_tool_results() {
        let mut session = session();
        let call = ToolCall {
            id: "c1".into(),
            name: "weather".into(),
            arguments: json!({ "city": "New York" }),
        };
        session.append_turn(Turn::user("U1", "weather?")).unwrap();
        session.append_turn(Turn::tool_calls(vec![call.clone()])).unwrap();
        session
            .append_turn(Turn::tool_result(ToolResult::success(&call, json!("sunny"))))
            .unwrap();
        session.append_turn(Turn::assistant("It's sunny")).unwrap();

        let window = session.history_window(2);
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].text(), Some("It's sunny"));

        assert_eq!(session.history_window(10).len(), 4);
    }
}
