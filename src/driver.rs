//! Async driver for [`SessionManager`].
//!
//! DESIGN
//! ======
//! One tokio task owns the manager, the live transport and the retry timer.
//! Callers talk to it through [`SessionHandle`]: commands go in over an mpsc
//! channel and state comes out through a `watch` of [`SessionSnapshot`]. The
//! task `select!`s over commands, transport events and the retry sleep, feeds
//! each one to the manager, then performs the returned effects in order.
//! A single step can pass through several statuses (Error then Reconnecting),
//! so every status change is also published as it is applied: the `watch`
//! carries it with the snapshot and a `broadcast` of [`ConnectionStatus`]
//! delivers each transition to subscribers that must see all of them.
//!
//! Every transport runs in its own task. It dials with `connect_async`, reports
//! `Opened`, then relays inbound text frames and the final close or error back
//! as [`SessionEvent`]s tagged with its [`ConnectionId`]. Outbound text and
//! close frames reach it over an unbounded channel; dropping the sender ends
//! the task.
//!
//! LIFECYCLE
//! =========
//! 1. `spawn` → task idle, snapshot `Idle`
//! 2. `connect` → `Open` effect → transport task dials
//! 3. Close / error → manager schedules a retry → sleep armed in the slot
//! 4. `shutdown` or handle dropped → manual disconnect → task exits

#[cfg(test)]
#[path = "driver_test.rs"]
mod driver_test;

use std::pin::Pin;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, info, warn};

use crate::config::{Endpoint, SessionConfig};
use crate::session::{
    ConnectionId, ConnectionStatus, Effect, RetryTicket, SessionError, SessionEvent, SessionManager, SessionSnapshot,
};

/// Close code reported when the peer closed without a status.
const NO_STATUS_RECEIVED: u16 = 1005;
/// Close code reported when the transport dropped without a close frame.
const ABNORMAL_CLOSURE: u16 = 1006;
/// How long `shutdown` waits for the closing transport to flush.
const CLOSE_GRACE: Duration = Duration::from_secs(2);
/// Status transitions buffered per lagging subscriber.
const STATUS_EVENT_CAPACITY: usize = 64;

// =============================================================================
// HANDLE
// =============================================================================

enum Command {
    Connect(String),
    Disconnect,
    Send {
        body: String,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Shutdown,
}

/// Owner-side handle to a running session task.
///
/// Dropping the handle signs the session out and stops the task.
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<SessionSnapshot>,
    statuses: broadcast::Sender<ConnectionStatus>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Start a session task on the current tokio runtime.
    #[must_use]
    pub fn spawn(config: SessionConfig, endpoint: Endpoint) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let manager = SessionManager::new(config, endpoint);
        let (snapshot_tx, snapshot) = watch::channel(manager.snapshot());
        let (statuses, _) = broadcast::channel(STATUS_EVENT_CAPACITY);

        let driver = Driver {
            manager,
            events_tx,
            events_rx,
            transport: None,
            closing: None,
            retry: None,
            snapshot: snapshot_tx,
            statuses: statuses.clone(),
        };
        let task = tokio::spawn(driver.run(command_rx));

        Self {
            commands,
            snapshot,
            statuses,
            task,
        }
    }

    /// Start (or restart) a session for `identity`.
    pub fn connect(&self, identity: impl Into<String>) {
        self.submit(Command::Connect(identity.into()));
    }

    /// Sign out and suppress automatic reconnection.
    pub fn disconnect(&self) {
        self.submit(Command::Disconnect);
    }

    /// Send one message on the open transport.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotConnected`] when no transport is open, or
    /// [`SessionError::Stopped`] if the session task is gone.
    pub async fn send_message(&self, body: impl Into<String>) -> Result<(), SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Send {
                body: body.into(),
                reply,
            })
            .map_err(|_| SessionError::Stopped)?;
        response.await.map_err(|_| SessionError::Stopped)?
    }

    /// Current observable state.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver that wakes on every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// Every status transition from now on, in order. A subscriber that falls
    /// more than a few dozen transitions behind sees `RecvError::Lagged`.
    #[must_use]
    pub fn status_events(&self) -> broadcast::Receiver<ConnectionStatus> {
        self.statuses.subscribe()
    }

    /// Sign out, close the transport normally and wait for the task to end.
    pub async fn shutdown(self) {
        self.submit(Command::Shutdown);
        if let Err(e) = self.task.await {
            warn!(error = %e, "session: driver task ended abnormally");
        }
    }

    fn submit(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!("session: driver task has stopped; command dropped");
        }
    }
}

// =============================================================================
// DRIVER TASK
// =============================================================================

struct TransportHandle {
    connection: ConnectionId,
    outbound: mpsc::UnboundedSender<Message>,
    task: JoinHandle<()>,
}

enum Step {
    Command(Command),
    Event(SessionEvent),
    Retry(RetryTicket),
    Stop,
}

struct Driver {
    manager: SessionManager,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    transport: Option<TransportHandle>,
    /// Transport most recently asked to close; awaited on shutdown.
    closing: Option<JoinHandle<()>>,
    retry: Option<(RetryTicket, Pin<Box<Sleep>>)>,
    snapshot: watch::Sender<SessionSnapshot>,
    statuses: broadcast::Sender<ConnectionStatus>,
}

impl Driver {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            let step = tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => Step::Stop,
                    Some(command) => Step::Command(command),
                },
                Some(event) = self.events_rx.recv() => Step::Event(event),
                ticket = retry_elapsed(&mut self.retry) => Step::Retry(ticket),
            };

            match step {
                Step::Command(command) => self.on_command(command),
                Step::Event(event) => {
                    let effects = self.manager.handle(event);
                    self.apply(effects);
                }
                Step::Retry(ticket) => {
                    self.retry = None;
                    let effects = self.manager.handle(SessionEvent::RetryElapsed(ticket));
                    self.apply(effects);
                }
                Step::Stop => break,
            }
            self.publish();
        }

        let effects = self.manager.disconnect();
        self.apply(effects);
        self.publish();
        if let Some(task) = self.closing.take() {
            if tokio::time::timeout(CLOSE_GRACE, task).await.is_err() {
                debug!("session: transport did not close within grace period");
            }
        }
        info!("session: driver stopped");
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Connect(identity) => {
                let effects = self.manager.connect(identity);
                self.apply(effects);
            }
            Command::Disconnect => {
                let effects = self.manager.disconnect();
                self.apply(effects);
            }
            Command::Send { body, reply } => {
                let result = self.manager.send_message(&body).map(|effects| self.apply(effects));
                // The caller may have given up waiting.
                let _ = reply.send(result);
            }
            Command::Shutdown => {}
        }
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Open { connection, url } => self.open(connection, url),
                Effect::Send { connection, text } => {
                    self.write(connection, Message::Text(text.into()));
                }
                Effect::Close {
                    connection,
                    code,
                    reason,
                } => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.into(),
                    };
                    self.write(connection, Message::Close(Some(frame)));
                    if let Some(transport) = self.transport.take() {
                        self.closing = Some(transport.task);
                    }
                }
                Effect::ScheduleRetry { ticket, delay } => {
                    self.retry = Some((ticket, Box::pin(tokio::time::sleep(delay))));
                }
                Effect::CancelRetry(ticket) => {
                    if self.retry.as_ref().is_some_and(|(armed, _)| *armed == ticket) {
                        self.retry = None;
                    }
                }
                Effect::StatusChanged(status) => self.publish_status(status),
            }
        }
    }

    fn open(&mut self, connection: ConnectionId, url: String) {
        if let Some(previous) = self.transport.take() {
            debug!(connection = %previous.connection, "session: abandoning previous transport");
        }
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_transport(connection, url, outbound_rx, self.events_tx.clone()));
        self.transport = Some(TransportHandle {
            connection,
            outbound,
            task,
        });
    }

    fn write(&self, connection: ConnectionId, message: Message) {
        let Some(transport) = self.transport.as_ref().filter(|t| t.connection == connection) else {
            debug!(%connection, "session: no live transport for outbound frame");
            return;
        };
        if transport.outbound.send(message).is_err() {
            warn!(%connection, "session: transport task gone; outbound frame dropped");
        }
    }

    fn publish(&self) {
        self.snapshot.send_replace(self.manager.snapshot());
    }

    /// Publish an intermediate status before the step finishes.
    fn publish_status(&self, status: ConnectionStatus) {
        info!(%status, retry_count = self.manager.retry_count(), "session: status changed");
        let mut snapshot = self.manager.snapshot();
        snapshot.status = status;
        self.snapshot.send_replace(snapshot);
        // No receivers is fine.
        let _ = self.statuses.send(status);
    }
}

/// Resolves when the armed retry sleep elapses; pends forever when unarmed.
async fn retry_elapsed(slot: &mut Option<(RetryTicket, Pin<Box<Sleep>>)>) -> RetryTicket {
    match slot {
        Some((ticket, sleep)) => {
            sleep.as_mut().await;
            *ticket
        }
        None => std::future::pending().await,
    }
}

// =============================================================================
// TRANSPORT TASK
// =============================================================================

async fn run_transport(
    connection: ConnectionId,
    url: String,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    events: mpsc::UnboundedSender<SessionEvent>,
) {
    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            warn!(%connection, error = %e, "ws: connect failed");
            let _ = events.send(SessionEvent::TransportError {
                connection,
                error: e.to_string(),
            });
            return;
        }
    };
    info!(%connection, "ws: connected");
    if events.send(SessionEvent::Opened(connection)).is_err() {
        return;
    }

    let (mut write, mut read) = stream.split();
    loop {
        tokio::select! {
            outgoing = outbound.recv() => {
                let Some(message) = outgoing else {
                    let _ = write.close().await;
                    break;
                };
                let closing = matches!(message, Message::Close(_));
                if let Err(e) = write.send(message).await {
                    warn!(%connection, error = %e, "ws: send failed");
                    let _ = events.send(SessionEvent::TransportError { connection, error: e.to_string() });
                    break;
                }
                if closing {
                    debug!(%connection, "ws: close frame sent");
                    break;
                }
            }
            incoming = read.next() => {
                let Some(event) = inbound_event(connection, incoming) else {
                    continue;
                };
                let terminal = !matches!(event, SessionEvent::Frame { .. });
                if events.send(event).is_err() || terminal {
                    break;
                }
            }
        }
    }
    debug!(%connection, "ws: transport task finished");
}

/// Map one read result to a session event. `None` means "nothing to report".
fn inbound_event(connection: ConnectionId, incoming: Option<Result<Message, WsError>>) -> Option<SessionEvent> {
    match incoming {
        Some(Ok(Message::Text(text))) => Some(SessionEvent::Frame {
            connection,
            text: text.as_str().to_owned(),
        }),
        Some(Ok(Message::Close(frame))) => {
            let (code, reason) = frame.map_or((NO_STATUS_RECEIVED, String::new()), |f| {
                (u16::from(f.code), f.reason.as_str().to_owned())
            });
            Some(SessionEvent::Closed {
                connection,
                code,
                reason,
            })
        }
        Some(Ok(_)) => None,
        Some(Err(
            WsError::ConnectionClosed
            | WsError::AlreadyClosed
            | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake),
        ))
        | None => Some(SessionEvent::Closed {
            connection,
            code: ABNORMAL_CLOSURE,
            reason: String::new(),
        }),
        Some(Err(e)) => Some(SessionEvent::TransportError {
            connection,
            error: e.to_string(),
        }),
    }
}
