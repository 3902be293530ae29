//! Bounded, ordered, de-duplicated message window.
//!
//! DESIGN
//! ======
//! The visible list is a `Vec` kept sorted by timestamp (ties keep arrival
//! order) and truncated from the front to the most recent `limit` entries.
//! Duplicate detection checks the visible list plus [`RecentIds`], a ring of
//! the last `limit` admitted ids. The ring catches re-deliveries of entries
//! that were admitted but already windowed out, so a replayed join/leave
//! notice cannot move the participant count twice. Memory stays bounded by
//! `2 * limit` ids regardless of session length.

#[cfg(test)]
#[path = "history_test.rs"]
mod history_test;

use std::collections::{HashSet, VecDeque};

use crate::message::{ChatMessage, Notice};

/// Room capacity enforced by the backend.
pub const MAX_PARTICIPANTS: u8 = 4;

/// Outcome of [`MessageHistory::admit`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Duplicate,
}

// =============================================================================
// RECENT IDS
// =============================================================================

/// Fixed-capacity set of recently seen ids; the oldest id is evicted first.
#[derive(Clone, Debug)]
pub struct RecentIds {
    capacity: usize,
    order: VecDeque<String>,
    members: HashSet<String>,
}

impl RecentIds {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            members: HashSet::with_capacity(capacity),
        }
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.members.contains(id)
    }

    /// Record `id`. Returns `false` if it was already present.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.members.contains(id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.members.remove(&evicted);
            }
        }
        self.order.push_back(id.to_owned());
        self.members.insert(id.to_owned());
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.members.clear();
    }
}

// =============================================================================
// MESSAGE HISTORY
// =============================================================================

#[derive(Clone, Debug)]
pub struct MessageHistory {
    limit: usize,
    entries: Vec<ChatMessage>,
    seen: RecentIds,
}

impl MessageHistory {
    /// A window of the `limit` most recent messages (at least one).
    #[must_use]
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            limit,
            entries: Vec::with_capacity(limit),
            seen: RecentIds::new(limit),
        }
    }

    /// Insert `message` in timestamp order, then trim to the window.
    pub fn admit(&mut self, message: ChatMessage) -> Admission {
        if self.seen.contains(&message.id) || self.entries.iter().any(|m| m.id == message.id) {
            return Admission::Duplicate;
        }
        self.seen.insert(&message.id);

        let at = self.entries.partition_point(|m| m.timestamp <= message.timestamp);
        self.entries.insert(at, message);

        if self.entries.len() > self.limit {
            let excess = self.entries.len() - self.limit;
            self.entries.drain(..excess);
        }
        Admission::Admitted
    }

    /// Visible messages, oldest first.
    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.seen.clear();
    }
}

// =============================================================================
// PARTICIPANT COUNT
// =============================================================================

/// Participant count driven by join/leave notices, clamped to
/// `0..=MAX_PARTICIPANTS`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ParticipantCount(u8);

impl ParticipantCount {
    pub fn apply(&mut self, notice: Notice) {
        self.0 = match notice {
            Notice::Joined => self.0.saturating_add(1).min(MAX_PARTICIPANTS),
            Notice::Left => self.0.saturating_sub(1),
        };
    }

    #[must_use]
    pub fn get(self) -> u8 {
        self.0
    }

    pub fn reset(&mut self) {
        self.0 = 0;
    }
}
