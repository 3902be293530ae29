//! Plain-text rendering of session state for the terminal.
//!
//! The renderer remembers which message ids it has already printed so each
//! snapshot only emits what is new. Because the history is ordered by
//! timestamp, a late arrival can land before lines already on screen; it is
//! still printed once, at the bottom.

#[cfg(test)]
#[path = "render_test.rs"]
mod render_test;

use quartet::history::RecentIds;
use quartet::{ChatMessage, ConnectionStatus, MAX_PARTICIPANTS, MessageKind, Notice, SessionSnapshot};
use time::OffsetDateTime;

pub struct Renderer {
    identity: String,
    budget: u32,
    status: Option<ConnectionStatus>,
    printed: RecentIds,
}

impl Renderer {
    pub fn new(identity: impl Into<String>, budget: u32, history_limit: usize) -> Self {
        Self {
            identity: identity.into(),
            budget,
            status: None,
            // Twice the window so ids trimmed from the snapshot are not reprinted.
            printed: RecentIds::new(history_limit.saturating_mul(2)),
        }
    }

    /// Lines to print for `snapshot`, oldest first.
    pub fn update(&mut self, snapshot: &SessionSnapshot) -> Vec<String> {
        let mut lines = Vec::new();

        if self.status != Some(snapshot.status) {
            self.status = Some(snapshot.status);
            lines.push(self.status_line(snapshot));
        }

        for message in &snapshot.messages {
            if self.printed.insert(&message.id) {
                lines.push(self.message_line(message, snapshot.user_count));
            }
        }
        lines
    }

    fn status_line(&self, snapshot: &SessionSnapshot) -> String {
        match snapshot.status {
            ConnectionStatus::Failed => format!(
                "[{}] gave up after {} attempts; type /reconnect to try again",
                snapshot.status, self.budget
            ),
            ConnectionStatus::Reconnecting => format!(
                "[{}] attempt {}/{}",
                snapshot.status, snapshot.retry_count, self.budget
            ),
            status => format!("[{status}]"),
        }
    }

    fn message_line(&self, message: &ChatMessage, user_count: u8) -> String {
        let clock = clock(message.timestamp);
        let sender = message.sender.as_deref().unwrap_or("someone");
        match message.kind {
            MessageKind::UserMessage if message.is_from(&self.identity) => {
                format!("{clock} {sender} (you): {}", message.body)
            }
            MessageKind::UserMessage => format!("{clock} {sender}: {}", message.body),
            MessageKind::SystemNotice(notice) => {
                let text = if message.body.is_empty() {
                    let verb = match notice {
                        Notice::Joined => "joined",
                        Notice::Left => "left",
                    };
                    format!("{sender} {verb} the chat")
                } else {
                    message.body.clone()
                };
                format!("{clock} * {text} ({user_count}/{MAX_PARTICIPANTS} online)")
            }
        }
    }
}

/// Why a typed line cannot be sent right now, or `None` when input is open.
pub fn input_blocked(status: ConnectionStatus) -> Option<&'static str> {
    if status.can_send() {
        None
    } else if status.is_transient() {
        Some("still connecting; try again shortly")
    } else {
        Some("not connected; type /reconnect to try again")
    }
}

fn clock(at: OffsetDateTime) -> String {
    format!("[{:02}:{:02}:{:02}]", at.hour(), at.minute(), at.second())
}
