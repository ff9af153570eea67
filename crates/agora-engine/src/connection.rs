//! Outbound half of a participant or observer connection.
//!
//! The socket writer task owns the receiving end of `tx`; everything else
//! (engine, fan-out relay, heartbeat) holds an `Arc<ClientConnection>` and
//! pushes pre-encoded frames without blocking.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use agora_core::protocol::ServerMessage;
use agora_core::ConnectionId;
use agora_telemetry::metrics::FRAMES_DROPPED_TOTAL;

/// A connected client, as seen from the server side.
pub struct ClientConnection {
    pub id: ConnectionId,
    tx: mpsc::Sender<Arc<String>>,
    closed: CancellationToken,
    missed_heartbeats: AtomicU32,
    dropped_messages: AtomicU64,
    pub connected_at: Instant,
}

impl ClientConnection {
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id,
            tx,
            closed: CancellationToken::new(),
            missed_heartbeats: AtomicU32::new(0),
            dropped_messages: AtomicU64::new(0),
            connected_at: Instant::now(),
        }
    }

    /// Queue a text frame for the writer.
    ///
    /// Returns `false` if the connection is closed or its queue is full; a
    /// full queue also bumps the dropped counter.
    pub fn send(&self, frame: Arc<String>) -> bool {
        if self.is_closed() {
            return false;
        }
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(FRAMES_DROPPED_TOTAL).increment(1);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Encode and queue a protocol message.
    pub fn send_message(&self, message: &ServerMessage) -> bool {
        match message.encode() {
            Ok(frame) => self.send(Arc::new(frame)),
            Err(error) => {
                warn!(conn_id = %self.id, kind = message.kind(), %error, "failed to encode frame");
                false
            }
        }
    }

    /// Ask the writer to flush what is queued and close the socket.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.tx.is_closed()
    }

    /// Resolves once [`close`](Self::close) has been called.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }

    /// Token cancelled on close, for tasks that outlive a borrow.
    pub fn close_token(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// A pong arrived: the peer is alive.
    pub fn record_pong(&self) {
        self.missed_heartbeats.store(0, Ordering::Relaxed);
    }

    /// Count one unanswered probe and return the new total.
    pub(crate) fn record_probe(&self) -> u32 {
        self.missed_heartbeats.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn missed_heartbeats(&self) -> u32 {
        self.missed_heartbeats.load(Ordering::Relaxed)
    }

    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
