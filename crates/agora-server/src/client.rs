//! Socket plumbing shared by the participant and observer endpoints.
//!
//! A connection is split in two: the writer task owns the sink and drains
//! the connection's outbound queue, while the endpoint loop reads frames.
//! Everything else talks to the peer through [`ClientConnection`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use agora_core::ConnectionId;
use agora_engine::ClientConnection;
use agora_telemetry::metrics::PARTICIPANTS_CONNECTED;

pub(crate) type WsSink = SplitSink<WebSocket, WsMessage>;
pub(crate) type WsStream = SplitStream<WebSocket>;

/// Create a connection handle and the queue its writer drains.
pub(crate) fn open(max_send_queue: usize) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
    let (tx, rx) = mpsc::channel(max_send_queue.max(1));
    (Arc::new(ClientConnection::new(ConnectionId::new(), tx)), rx)
}

/// Forward queued frames to the socket until `closed` fires.
///
/// On close, frames already queued are still written, then a close frame is
/// sent. Leaves early if the socket stops accepting writes.
pub(crate) fn spawn_writer(
    mut sink: WsSink,
    mut rx: mpsc::Receiver<Arc<String>>,
    closed: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                frame = rx.recv() => match frame {
                    Some(frame) => {
                        if sink.send(text_frame(&frame)).await.is_err() {
                            return;
                        }
                    }
                    None => break,
                },
                () = closed.cancelled() => break,
            }
        }

        while let Ok(frame) = rx.try_recv() {
            if sink.send(text_frame(&frame)).await.is_err() {
                return;
            }
        }
        let _ = sink.send(WsMessage::Close(None)).await;
        let _ = sink.close().await;
    })
}

fn text_frame(frame: &Arc<String>) -> WsMessage {
    WsMessage::Text(String::clone(frame).into())
}

/// Next text frame from the peer, or `None` once the socket is done.
///
/// Control and binary frames are skipped; axum answers protocol-level pings.
pub(crate) async fn next_text(stream: &mut WsStream) -> Option<String> {
    while let Some(message) = stream.next().await {
        match message {
            Ok(WsMessage::Text(text)) => return Some(text.as_str().to_owned()),
            Ok(WsMessage::Close(_)) | Err(_) => return None,
            Ok(_) => {}
        }
    }
    None
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Participant,
    Observer,
}

/// Live socket counts, reported by `/health`.
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    participants: AtomicUsize,
    observers: AtomicUsize,
}

impl ConnectionTracker {
    /// Count a socket until the returned guard is dropped.
    pub fn enter(self: &Arc<Self>, role: Role) -> ConnectionGuard {
        let _ = self.counter(role).fetch_add(1, Ordering::Relaxed);
        if role == Role::Participant {
            metrics::gauge!(PARTICIPANTS_CONNECTED).increment(1.0);
        }
        ConnectionGuard {
            tracker: Arc::clone(self),
            role,
        }
    }

    pub fn participants(&self) -> usize {
        self.participants.load(Ordering::Relaxed)
    }

    pub fn observers(&self) -> usize {
        self.observers.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> usize {
        self.participants() + self.observers()
    }

    fn counter(&self, role: Role) -> &AtomicUsize {
        match role {
            Role::Participant => &self.participants,
            Role::Observer => &self.observers,
        }
    }
}

pub struct ConnectionGuard {
    tracker: Arc<ConnectionTracker>,
    role: Role,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let _ = self.tracker.counter(self.role).fetch_sub(1, Ordering::Relaxed);
        if self.role == Role::Participant {
            metrics::gauge!(PARTICIPANTS_CONNECTED).decrement(1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guards_count_by_role() {
        let tracker = Arc::new(ConnectionTracker::default());
        let a = tracker.enter(Role::Participant);
        let b = tracker.enter(Role::Observer);
        let c = tracker.enter(Role::Observer);
        assert_eq!(tracker.participants(), 1);
        assert_eq!(tracker.observers(), 2);
        assert_eq!(tracker.total(), 3);

        drop(b);
        drop(a);
        assert_eq!(tracker.participants(), 0);
        assert_eq!(tracker.observers(), 1);
        drop(c);
        assert_eq!(tracker.total(), 0);
    }

    #[test]
    fn open_applies_minimum_queue() {
        let (conn, _rx) = open(0);
        assert!(conn.send(Arc::new("x".into())));
        assert!(!conn.send(Arc::new("y".into())));
        assert_eq!(conn.drop_count(), 1);
    }

    #[test]
    fn text_frame_carries_payload() {
        let frame = Arc::new(r#"{"type":"ping"}"#.to_string());
        match text_frame(&frame) {
            WsMessage::Text(text) => assert_eq!(text.as_str(), r#"{"type":"ping"}"#),
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}
