//! Bounded, expiring set of already-seen event ids.

use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct SeenEvents {
    order: VecDeque<(String, Instant)>,
    ids: HashSet<String>,
    capacity: usize,
    ttl: Duration,
}

impl SeenEvents {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            order: VecDeque::new(),
            ids: HashSet::new(),
            capacity: capacity.max(1),
            ttl,
        }
    }

    /// Record `event_id`; returns `false` if it was already seen.
    pub fn insert(&mut self, event_id: &str, now: Instant) -> bool {
        self.expire(now);
        if self.ids.contains(event_id) {
            return false;
        }
        while self.order.len() >= self.capacity {
            if let Some((oldest, _)) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        self.order.push_back((event_id.to_string(), now));
        self.ids.insert(event_id.to_string());
        true
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn expire(&mut self, now: Instant) {
        while let Some((id, seen_at)) = self.order.front() {
            if now.saturating_duration_since(*seen_at) < self.ttl {
                break;
            }
            self.ids.remove(id);
            self.order.pop_front();
        }
    }
}
