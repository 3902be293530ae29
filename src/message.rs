//! Chat messages as the session materializes them.
//!
//! Inbound frames become [`ChatMessage`]s at admission time: a missing
//! timestamp is stamped with the arrival time and a missing id is synthesized
//! from the arrival time plus a random suffix. Synthesized ids are only unique
//! enough for the dedup window; two frames arriving in the same millisecond can
//! in principle collide. The backend contract gives no stronger identifier.

#[cfg(test)]
#[path = "message_test.rs"]
mod message_test;

use frames::{FrameKind, InboundFrame};
use rand::Rng;
use time::OffsetDateTime;

/// Join/leave notices emitted by the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Notice {
    Joined,
    Left,
}

/// What a message represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    /// Text written by a participant.
    UserMessage,
    /// Room event such as a join or a leave.
    SystemNotice(Notice),
}

/// One entry of the visible message list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    /// De-duplication token, from the backend or synthesized on arrival.
    pub id: String,
    pub kind: MessageKind,
    /// Author of a user message; subject of a notice when the backend names one.
    pub sender: Option<String>,
    pub body: String,
    /// Event time, or arrival time when the frame carried none.
    pub timestamp: OffsetDateTime,
}

impl ChatMessage {
    /// Materialize an inbound frame received at `arrived_at`.
    #[must_use]
    pub fn from_frame(frame: InboundFrame, arrived_at: OffsetDateTime) -> Self {
        let kind = match frame.kind {
            FrameKind::Message => MessageKind::UserMessage,
            FrameKind::UserJoined => MessageKind::SystemNotice(Notice::Joined),
            FrameKind::UserLeft => MessageKind::SystemNotice(Notice::Left),
        };

        Self {
            id: frame.id.unwrap_or_else(|| synthesize_id(arrived_at)),
            kind,
            sender: frame.username.filter(|name| !name.is_empty()),
            body: frame.content.unwrap_or_default(),
            timestamp: frame.timestamp.unwrap_or(arrived_at),
        }
    }

    /// The join/leave notice carried by this message, if any.
    #[must_use]
    pub fn notice(&self) -> Option<Notice> {
        match self.kind {
            MessageKind::SystemNotice(notice) => Some(notice),
            MessageKind::UserMessage => None,
        }
    }

    /// True for user messages written by `identity`.
    #[must_use]
    pub fn is_from(&self, identity: &str) -> bool {
        self.kind == MessageKind::UserMessage && self.sender.as_deref() == Some(identity)
    }
}

/// Arrival-time id: `<unix millis>-<32 random bits as hex>`.
#[must_use]
pub fn synthesize_id(arrived_at: OffsetDateTime) -> String {
    let millis = arrived_at.unix_timestamp_nanos() / 1_000_000;
    let suffix: u32 = rand::rng().random();
    format!("{millis}-{suffix:08x}")
}
