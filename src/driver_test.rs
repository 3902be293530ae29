use super::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Router;
use axum::extract::Query;
use axum::extract::ws::{CloseFrame, Message as AxumMessage, WebSocketUpgrade};
use axum::routing::get;
use tokio::time::timeout;

use crate::session::ConnectionStatus;

const WAIT: Duration = Duration::from_secs(5);

fn config(attempts: u32, delay_ms: u64) -> SessionConfig {
    SessionConfig {
        reconnect_attempts: attempts,
        reconnect_delay: Duration::from_millis(delay_ms),
        ..SessionConfig::default()
    }
}

/// Serve `router` on an ephemeral port and return its `ws://` base.
async fn spawn_backend(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind backend");
    let addr = listener.local_addr().expect("backend addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("backend serve");
    });
    format!("ws://{addr}")
}

async fn wait_until(handle: &SessionHandle, pred: impl FnMut(&SessionSnapshot) -> bool) -> SessionSnapshot {
    let mut rx = handle.subscribe();
    let snapshot = timeout(WAIT, rx.wait_for(pred))
        .await
        .expect("timed out waiting for session state")
        .expect("session task stopped");
    snapshot.clone()
}

/// Backend that forwards every text frame the client sends and keeps the
/// socket open until the client leaves.
fn echo_backend(received: mpsc::UnboundedSender<String>) -> Router {
    Router::new().route(
        "/ws",
        get(move |ws: WebSocketUpgrade| {
            let received = received.clone();
            async move {
                ws.on_upgrade(move |mut socket| async move {
                    while let Some(Ok(message)) = socket.recv().await {
                        if let AxumMessage::Text(text) = message {
                            let _ = received.send(text.as_str().to_owned());
                        }
                    }
                })
            }
        }),
    )
}

#[tokio::test]
async fn inbound_frames_are_deduplicated_and_ordered() {
    let router = Router::new().route(
        "/ws",
        get(|Query(params): Query<HashMap<String, String>>, ws: WebSocketUpgrade| async move {
            let who = params.get("username").cloned().unwrap_or_default();
            ws.on_upgrade(move |mut socket| async move {
                let frames = [
                    format!(r#"{{"type":"user_joined","id":"j","username":"{who}","timestamp":1000}}"#),
                    r#"{"type":"message","id":2,"username":"bob","content":"later","timestamp":3000}"#.to_owned(),
                    r#"{"type":"message","id":3,"username":"bob","content":"earlier","timestamp":2000}"#.to_owned(),
                    r#"{"type":"message","id":2,"username":"bob","content":"later","timestamp":3000}"#.to_owned(),
                ];
                for frame in frames {
                    if socket.send(AxumMessage::Text(frame.into())).await.is_err() {
                        return;
                    }
                }
                while let Some(Ok(_)) = socket.recv().await {}
            })
        }),
    );
    let base = spawn_backend(router).await;

    let handle = SessionHandle::spawn(config(5, 50), Endpoint::new(base));
    handle.connect("alice smith");
    let snapshot = wait_until(&handle, |s| s.messages.len() >= 3).await;

    let ids: Vec<&str> = snapshot.messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["j", "3", "2"]);
    assert_eq!(snapshot.messages[0].sender.as_deref(), Some("alice smith"));
    assert_eq!(snapshot.user_count, 1);
    assert_eq!(snapshot.status, ConnectionStatus::Connected);

    handle.shutdown().await;
}

#[tokio::test]
async fn send_message_reaches_backend_as_envelope() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let base = spawn_backend(echo_backend(tx)).await;

    let handle = SessionHandle::spawn(config(5, 50), Endpoint::new(base));
    handle.connect("alice");
    wait_until(&handle, |s| s.status == ConnectionStatus::Connected).await;

    handle.send_message("  hello  ").await.expect("send");
    let text = timeout(WAIT, rx.recv()).await.expect("backend receive").expect("frame");
    let envelope = frames::decode_outbound(&text).expect("envelope");
    assert_eq!(envelope.content, "hello");

    handle.shutdown().await;
}

#[tokio::test]
async fn send_before_connect_is_rejected() {
    let handle = SessionHandle::spawn(config(5, 50), Endpoint::new("ws://127.0.0.1:9"));
    let err = handle.send_message("x").await.expect_err("not connected");
    assert!(matches!(err, SessionError::NotConnected));
    assert_eq!(handle.snapshot().status, ConnectionStatus::Idle);
    handle.shutdown().await;
}

#[tokio::test]
async fn dropped_transport_is_reestablished() {
    let connections = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&connections);
    let router = Router::new().route(
        "/ws",
        get(move |ws: WebSocketUpgrade| {
            let seen = Arc::clone(&seen);
            async move {
                let nth = seen.fetch_add(1, Ordering::SeqCst) + 1;
                ws.on_upgrade(move |mut socket| async move {
                    if nth == 1 {
                        // Drop the first socket without a close frame.
                        return;
                    }
                    while let Some(Ok(_)) = socket.recv().await {}
                })
            }
        }),
    );
    let base = spawn_backend(router).await;

    let handle = SessionHandle::spawn(config(5, 50), Endpoint::new(base));
    handle.connect("alice");
    let snapshot = wait_until(&handle, |s| {
        s.status == ConnectionStatus::Connected && connections.load(Ordering::SeqCst) >= 2
    })
    .await;
    assert_eq!(snapshot.retry_count, 0);

    handle.shutdown().await;
}

#[tokio::test]
async fn unreachable_backend_exhausts_retry_budget() {
    // Reserve a port, then free it so nothing listens there.
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("reserve port");
        listener.local_addr().expect("addr")
    };

    let handle = SessionHandle::spawn(config(2, 10), Endpoint::new(format!("ws://{addr}")));
    handle.connect("alice");
    let snapshot = wait_until(&handle, |s| s.status == ConnectionStatus::Failed).await;
    assert_eq!(snapshot.retry_count, 2);

    // Still failed after several retry delays: nothing else was scheduled.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(handle.snapshot().status, ConnectionStatus::Failed);

    handle.shutdown().await;
}

#[tokio::test]
async fn every_status_transition_is_delivered() {
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("reserve port");
        listener.local_addr().expect("addr")
    };

    let handle = SessionHandle::spawn(config(1, 20), Endpoint::new(format!("ws://{addr}")));
    let mut events = handle.status_events();
    handle.connect("alice");

    let mut seen = Vec::new();
    while seen.last() != Some(&ConnectionStatus::Failed) {
        let status = timeout(WAIT, events.recv())
            .await
            .expect("timed out waiting for status")
            .expect("status channel open");
        seen.push(status);
    }
    assert_eq!(
        seen,
        vec![
            ConnectionStatus::Connecting,
            ConnectionStatus::Error,
            ConnectionStatus::Reconnecting,
            ConnectionStatus::Connecting,
            ConnectionStatus::Error,
            ConnectionStatus::Failed,
        ]
    );

    handle.shutdown().await;
}

#[tokio::test]
async fn budget_of_one_reconnects_once_before_failing() {
    let connections = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&connections);
    let router = Router::new().route(
        "/ws",
        get(move |ws: WebSocketUpgrade| {
            let seen = Arc::clone(&seen);
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                ws.on_upgrade(|mut socket| async move {
                    let frame = CloseFrame {
                        code: 1011,
                        reason: "server error".into(),
                    };
                    let _ = socket.send(AxumMessage::Close(Some(frame))).await;
                    while let Some(Ok(_)) = socket.recv().await {}
                })
            }
        }),
    );
    let base = spawn_backend(router).await;

    let handle = SessionHandle::spawn(config(1, 20), Endpoint::new(base));
    handle.connect("alice");
    let snapshot = wait_until(&handle, |s| s.status == ConnectionStatus::Failed).await;
    assert_eq!(snapshot.retry_count, 1);
    assert_eq!(connections.load(Ordering::SeqCst), 2);

    handle.shutdown().await;
}

#[tokio::test]
async fn manual_disconnect_closes_normally_without_reconnecting() {
    let connections = Arc::new(AtomicUsize::new(0));
    let (close_tx, mut close_rx) = mpsc::unbounded_channel::<(u16, String)>();
    let seen = Arc::clone(&connections);
    let router = Router::new().route(
        "/ws",
        get(move |ws: WebSocketUpgrade| {
            let seen = Arc::clone(&seen);
            let close_tx = close_tx.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                ws.on_upgrade(move |mut socket| async move {
                    while let Some(Ok(message)) = socket.recv().await {
                        if let AxumMessage::Close(Some(frame)) = message {
                            let _ = close_tx.send((frame.code, frame.reason.as_str().to_owned()));
                        }
                    }
                })
            }
        }),
    );
    let base = spawn_backend(router).await;

    let handle = SessionHandle::spawn(config(5, 20), Endpoint::new(base));
    handle.connect("alice");
    wait_until(&handle, |s| s.status == ConnectionStatus::Connected).await;

    handle.disconnect();
    let snapshot = wait_until(&handle, |s| s.status == ConnectionStatus::Idle).await;
    assert!(snapshot.identity.is_none());
    assert_eq!(snapshot.retry_count, 5);

    let (code, reason) = timeout(WAIT, close_rx.recv()).await.expect("close frame").expect("close sent");
    assert_eq!(code, 1000);
    assert_eq!(reason, "Manual disconnect");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(connections.load(Ordering::SeqCst), 1);
    assert_eq!(handle.snapshot().status, ConnectionStatus::Idle);

    handle.shutdown().await;
}

#[test]
fn read_results_map_to_session_events() {
    let mut manager = SessionManager::new(SessionConfig::default(), Endpoint::new("ws://localhost:1"));
    let connection = manager
        .connect("a")
        .into_iter()
        .find_map(|e| match e {
            Effect::Open { connection, .. } => Some(connection),
            _ => None,
        })
        .expect("connect should open");

    assert_eq!(
        inbound_event(connection, None),
        Some(SessionEvent::Closed {
            connection,
            code: ABNORMAL_CLOSURE,
            reason: String::new(),
        })
    );
    assert_eq!(
        inbound_event(connection, Some(Ok(Message::Close(None)))),
        Some(SessionEvent::Closed {
            connection,
            code: NO_STATUS_RECEIVED,
            reason: String::new(),
        })
    );
    assert_eq!(inbound_event(connection, Some(Ok(Message::Binary(vec![1, 2].into())))), None);
    assert!(matches!(
        inbound_event(connection, Some(Ok(Message::Text("{}".into())))),
        Some(SessionEvent::Frame { .. })
    ));
}
