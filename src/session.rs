//! Connection session state machine.
//!
//! DESIGN
//! ======
//! `SessionManager` owns everything one signed-in identity needs: status,
//! retry counter, the single pending-retry slot, the transport slot and the
//! message window. It performs no I/O. Operations and transport events go in,
//! an ordered list of [`Effect`]s comes out, and a driver (see `driver.rs`)
//! carries them out. Every transport gets a fresh [`ConnectionId`]; events
//! tagged with an id that is not in the transport slot are stale and dropped,
//! which keeps late closes from superseded or manually closed transports from
//! scheduling retries.
//!
//! LIFECYCLE
//! =========
//! Idle → Connecting → Connected | Error
//! Connected → Disconnected (abnormal close) → Reconnecting → Connecting → ...
//! Error (transport error) → Reconnecting | Failed
//! Any state → Idle on `disconnect()`
//!
//! An abnormal closure or transport error schedules a retry while
//! `retry_count < reconnect_attempts`, spending one unit of the budget per
//! scheduled retry. A drop that arrives with the budget spent moves the
//! session to `Failed` and nothing further is scheduled. A successful open
//! refunds the whole budget.

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

use std::fmt;
use std::time::Duration;

use frames::OutboundMessage;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::config::{Endpoint, SessionConfig};
use crate::history::{Admission, MessageHistory, ParticipantCount};
use crate::message::ChatMessage;

/// WebSocket close code for a normal, intentional closure.
pub const NORMAL_CLOSURE: u16 = 1000;
/// Close reason sent when the user signs out.
pub const MANUAL_DISCONNECT_REASON: &str = "Manual disconnect";

// =============================================================================
// STATUS
// =============================================================================

/// Observable connection status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No session: never connected, or signed out.
    #[default]
    Idle,
    /// A transport is being established.
    Connecting,
    /// The transport is open; messages can be sent.
    Connected,
    /// The transport closed.
    Disconnected,
    /// Waiting out the delay before the next automatic attempt.
    Reconnecting,
    /// Retry budget spent; only a manual connect recovers.
    Failed,
    /// The transport reported an error.
    Error,
}

impl ConnectionStatus {
    /// Short human-readable label for status bars.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle | Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting...",
            Self::Connected => "Connected",
            Self::Reconnecting => "Reconnecting...",
            Self::Failed => "Connection failed",
            Self::Error => "Connection Error",
        }
    }

    /// Input is only enabled while connected.
    #[must_use]
    pub fn can_send(self) -> bool {
        self == Self::Connected
    }

    /// True while an automatic attempt is pending or running.
    #[must_use]
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Connecting | Self::Reconnecting)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// IDS, EVENTS, EFFECTS
// =============================================================================

/// Identifies one transport instance for the lifetime of a manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Identifies one scheduled retry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RetryTicket(u64);

/// Something that happened to a transport or timer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// The transport finished its handshake.
    Opened(ConnectionId),
    /// A text frame arrived.
    Frame { connection: ConnectionId, text: String },
    /// The transport closed, with the peer's close code when it sent one.
    Closed {
        connection: ConnectionId,
        code: u16,
        reason: String,
    },
    /// The transport failed to establish or broke.
    TransportError { connection: ConnectionId, error: String },
    /// A scheduled retry delay has elapsed.
    RetryElapsed(RetryTicket),
}

/// I/O the driver must perform, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Establish a new transport to `url`. Any previous transport is abandoned.
    Open { connection: ConnectionId, url: String },
    /// Write one text frame.
    Send { connection: ConnectionId, text: String },
    /// Close the transport with the given code and reason.
    Close {
        connection: ConnectionId,
        code: u16,
        reason: String,
    },
    /// Arm the retry timer, replacing any armed timer.
    ScheduleRetry { ticket: RetryTicket, delay: Duration },
    /// Disarm the retry timer.
    CancelRetry(RetryTicket),
    /// The status changed; publish it.
    StatusChanged(ConnectionStatus),
}

// =============================================================================
// ERROR TYPE
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("websocket not connected")]
    NotConnected,
    #[error("failed to encode outbound message: {0}")]
    Codec(#[from] frames::CodecError),
    #[error("session task has stopped")]
    Stopped,
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// Owned copy of the observable session state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub identity: Option<String>,
    pub status: ConnectionStatus,
    pub retry_count: u32,
    pub user_count: u8,
    pub messages: Vec<ChatMessage>,
}

// =============================================================================
// SESSION MANAGER
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Transport {
    Closed,
    Opening(ConnectionId),
    Open(ConnectionId),
}

impl Transport {
    fn id(self) -> Option<ConnectionId> {
        match self {
            Self::Closed => None,
            Self::Opening(id) | Self::Open(id) => Some(id),
        }
    }
}

#[derive(Debug)]
pub struct SessionManager {
    config: SessionConfig,
    endpoint: Endpoint,
    identity: Option<String>,
    status: ConnectionStatus,
    retry_count: u32,
    pending_retry: Option<RetryTicket>,
    transport: Transport,
    history: MessageHistory,
    participants: ParticipantCount,
    next_connection: u64,
    next_ticket: u64,
}

impl SessionManager {
    #[must_use]
    pub fn new(config: SessionConfig, endpoint: Endpoint) -> Self {
        Self {
            history: MessageHistory::new(config.message_history_limit),
            config,
            endpoint,
            identity: None,
            status: ConnectionStatus::Idle,
            retry_count: 0,
            pending_retry: None,
            transport: Transport::Closed,
            participants: ParticipantCount::default(),
            next_connection: 0,
            next_ticket: 0,
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    #[must_use]
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    #[must_use]
    pub fn user_count(&self) -> u8 {
        self.participants.get()
    }

    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        self.history.messages()
    }

    #[must_use]
    pub fn pending_retry(&self) -> Option<RetryTicket> {
        self.pending_retry
    }

    /// True when a transport is open and sends will be attempted.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self.transport, Transport::Open(_))
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            identity: self.identity.clone(),
            status: self.status,
            retry_count: self.retry_count,
            user_count: self.participants.get(),
            messages: self.history.messages().to_vec(),
        }
    }

    // -------------------------------------------------------------------------
    // Operations
    // -------------------------------------------------------------------------

    /// Start a session for `identity`. No-op while a transport is open.
    pub fn connect(&mut self, identity: impl Into<String>) -> Vec<Effect> {
        let mut effects = Vec::new();
        if let Transport::Open(connection) = self.transport {
            debug!(%connection, "session: already connected");
            return effects;
        }

        self.cancel_retry(&mut effects);
        self.identity = Some(identity.into());
        self.open_transport(&mut effects);
        effects
    }

    /// Sign out: close normally, forget the identity, clear all session state
    /// and suppress any further automatic reconnection.
    pub fn disconnect(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.retry_count = self.config.reconnect_attempts;
        self.cancel_retry(&mut effects);

        if let Some(connection) = self.transport.id() {
            info!(%connection, "session: manual disconnect");
            effects.push(Effect::Close {
                connection,
                code: NORMAL_CLOSURE,
                reason: MANUAL_DISCONNECT_REASON.to_owned(),
            });
        }

        self.transport = Transport::Closed;
        self.identity = None;
        self.history.clear();
        self.participants.reset();
        self.set_status(ConnectionStatus::Idle, &mut effects);
        effects
    }

    /// Send a user message. The body is trimmed; its length is not checked.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotConnected`] when no transport is open.
    pub fn send_message(&mut self, body: &str) -> Result<Vec<Effect>, SessionError> {
        self.send_message_at(body, OffsetDateTime::now_utc())
    }

    /// [`SessionManager::send_message`] with an explicit client timestamp.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotConnected`] when no transport is open, or
    /// [`SessionError::Codec`] if the envelope cannot be encoded.
    pub fn send_message_at(&mut self, body: &str, now: OffsetDateTime) -> Result<Vec<Effect>, SessionError> {
        let Transport::Open(connection) = self.transport else {
            warn!(status = ?self.status, "session: send without open connection");
            return Err(SessionError::NotConnected);
        };

        let envelope = OutboundMessage::new(body.trim(), now);
        let text = frames::encode_outbound(&envelope)?;
        debug!(%connection, len = envelope.content.len(), "session: sending message");
        Ok(vec![Effect::Send { connection, text }])
    }

    /// Feed one transport or timer event into the state machine.
    pub fn handle(&mut self, event: SessionEvent) -> Vec<Effect> {
        self.handle_at(event, OffsetDateTime::now_utc())
    }

    /// [`SessionManager::handle`] with an explicit arrival time.
    pub fn handle_at(&mut self, event: SessionEvent, now: OffsetDateTime) -> Vec<Effect> {
        let mut effects = Vec::new();
        match event {
            SessionEvent::Opened(connection) => self.on_opened(connection, &mut effects),
            SessionEvent::Frame { connection, text } => self.on_frame(connection, &text, now),
            SessionEvent::Closed {
                connection,
                code,
                reason,
            } => self.on_closed(connection, code, &reason, &mut effects),
            SessionEvent::TransportError { connection, error } => {
                self.on_transport_error(connection, &error, &mut effects);
            }
            SessionEvent::RetryElapsed(ticket) => self.on_retry_elapsed(ticket, &mut effects),
        }
        effects
    }

    // -------------------------------------------------------------------------
    // Transitions
    // -------------------------------------------------------------------------

    fn on_opened(&mut self, connection: ConnectionId, effects: &mut Vec<Effect>) {
        if self.transport != Transport::Opening(connection) {
            debug!(%connection, "session: ignoring open from stale connection");
            return;
        }
        info!(%connection, identity = ?self.identity, "session: connected");
        self.transport = Transport::Open(connection);
        self.retry_count = 0;
        self.set_status(ConnectionStatus::Connected, effects);
    }

    fn on_frame(&mut self, connection: ConnectionId, text: &str, now: OffsetDateTime) {
        if self.transport != Transport::Open(connection) {
            debug!(%connection, "session: ignoring frame from stale connection");
            return;
        }

        let frame = match frames::decode_frame(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(%connection, error = %e, "session: discarding malformed frame");
                return;
            }
        };

        let message = ChatMessage::from_frame(frame, now);
        let notice = message.notice();
        let id = message.id.clone();
        match self.history.admit(message) {
            Admission::Duplicate => {
                debug!(%connection, %id, "session: discarding duplicate frame");
            }
            Admission::Admitted => {
                if let Some(notice) = notice {
                    self.participants.apply(notice);
                }
                debug!(%connection, %id, user_count = self.participants.get(), "session: admitted frame");
            }
        }
    }

    fn on_closed(&mut self, connection: ConnectionId, code: u16, reason: &str, effects: &mut Vec<Effect>) {
        if self.transport.id() != Some(connection) {
            debug!(%connection, code, "session: ignoring close from stale connection");
            return;
        }
        info!(%connection, code, %reason, "session: connection closed");
        self.transport = Transport::Closed;
        self.set_status(ConnectionStatus::Disconnected, effects);

        if code != NORMAL_CLOSURE {
            self.schedule_reconnect(effects);
        }
    }

    fn on_transport_error(&mut self, connection: ConnectionId, error: &str, effects: &mut Vec<Effect>) {
        if self.transport.id() != Some(connection) {
            debug!(%connection, %error, "session: ignoring error from stale connection");
            return;
        }
        warn!(%connection, %error, "session: transport error");
        self.transport = Transport::Closed;
        self.set_status(ConnectionStatus::Error, effects);
        self.schedule_reconnect(effects);
    }

    fn on_retry_elapsed(&mut self, ticket: RetryTicket, effects: &mut Vec<Effect>) {
        if self.pending_retry != Some(ticket) {
            debug!(?ticket, "session: ignoring cancelled retry");
            return;
        }
        self.pending_retry = None;
        info!(attempt = self.retry_count, budget = self.config.reconnect_attempts, "session: reconnecting");
        self.open_transport(effects);
    }

    fn schedule_reconnect(&mut self, effects: &mut Vec<Effect>) {
        if self.identity.is_none() {
            return;
        }

        let budget = self.config.reconnect_attempts;
        self.cancel_retry(effects);

        if self.retry_count >= budget {
            warn!(budget, "session: retry budget exhausted");
            self.set_status(ConnectionStatus::Failed, effects);
            return;
        }

        self.retry_count += 1;
        self.next_ticket += 1;
        let ticket = RetryTicket(self.next_ticket);
        self.pending_retry = Some(ticket);
        self.set_status(ConnectionStatus::Reconnecting, effects);
        info!(
            attempt = self.retry_count,
            budget,
            delay = ?self.config.reconnect_delay,
            "session: retry scheduled"
        );
        effects.push(Effect::ScheduleRetry {
            ticket,
            delay: self.config.reconnect_delay,
        });
    }

    fn open_transport(&mut self, effects: &mut Vec<Effect>) {
        let Some(identity) = self.identity.clone() else {
            return;
        };

        self.set_status(ConnectionStatus::Connecting, effects);
        match self.endpoint.url_for(&identity) {
            Ok(url) => {
                self.next_connection += 1;
                let connection = ConnectionId(self.next_connection);
                self.transport = Transport::Opening(connection);
                info!(%connection, %identity, %url, "session: opening connection");
                effects.push(Effect::Open { connection, url });
            }
            Err(e) => {
                warn!(%identity, error = %e, "session: cannot build connection URL");
                self.transport = Transport::Closed;
                self.set_status(ConnectionStatus::Error, effects);
            }
        }
    }

    fn cancel_retry(&mut self, effects: &mut Vec<Effect>) {
        if let Some(ticket) = self.pending_retry.take() {
            debug!(?ticket, "session: retry cancelled");
            effects.push(Effect::CancelRetry(ticket));
        }
    }

    fn set_status(&mut self, status: ConnectionStatus, effects: &mut Vec<Effect>) {
        if self.status == status {
            return;
        }
        debug!(from = ?self.status, to = ?status, "session: status");
        self.status = status;
        effects.push(Effect::StatusChanged(status));
    }
}
