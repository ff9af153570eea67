//! Observer fan-out.
//!
//! Each observed session gets one relay task fed through an unbounded
//! queue. Publishing only enqueues, so callers may publish while holding a
//! session lock; the relay owns the observer list and writes to each
//! observer's queue in arrival order. A slow observer loses frames instead
//! of stalling the session.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use agora_core::protocol::ServerMessage;
use agora_core::{ConnectionId, SessionId};
use agora_telemetry::metrics::OBSERVERS_CONNECTED;

use crate::connection::ClientConnection;

enum RelayCommand {
    Publish(Arc<String>),
    Attach(Arc<ClientConnection>, Option<Arc<String>>),
    Detach(ConnectionId),
    Close,
}

#[derive(Default)]
pub(crate) struct ObserverHub {
    relays: DashMap<SessionId, mpsc::UnboundedSender<RelayCommand>>,
}

impl ObserverHub {
    /// Queue a frame for every observer of `id`. No-op without observers.
    pub fn publish(&self, id: &SessionId, message: &ServerMessage) {
        let Some(relay) = self.relays.get(id) else {
            return;
        };
        match message.encode() {
            Ok(frame) => {
                let _ = relay.send(RelayCommand::Publish(Arc::new(frame)));
            }
            Err(error) => warn!(debate_id = %id, kind = message.kind(), %error, "failed to encode frame"),
        }
    }

    /// Add an observer, sending `snapshot` to it before any later frame.
    pub fn attach(&self, id: &SessionId, conn: Arc<ClientConnection>, snapshot: Option<&ServerMessage>) {
        let snapshot = snapshot.and_then(|m| m.encode().ok()).map(Arc::new);
        let relay = self
            .relays
            .entry(id.clone())
            .or_insert_with(|| spawn_relay(id.clone()))
            .clone();
        let _ = relay.send(RelayCommand::Attach(conn, snapshot));
    }

    pub fn detach(&self, id: &SessionId, conn_id: &ConnectionId) {
        if let Some(relay) = self.relays.get(id) {
            let _ = relay.send(RelayCommand::Detach(conn_id.clone()));
        }
    }

    /// Stop relaying for a finished session. Already queued frames still go out.
    pub fn close(&self, id: &SessionId) {
        if let Some((_, relay)) = self.relays.remove(id) {
            let _ = relay.send(RelayCommand::Close);
        }
    }

    #[cfg(test)]
    pub fn is_observed(&self, id: &SessionId) -> bool {
        self.relays.contains_key(id)
    }
}

fn spawn_relay(id: SessionId) -> mpsc::UnboundedSender<RelayCommand> {
    let (tx, rx) = mpsc::unbounded_channel();
    drop(tokio::spawn(run_relay(id, rx)));
    tx
}

async fn run_relay(id: SessionId, mut rx: mpsc::UnboundedReceiver<RelayCommand>) {
    let mut observers: HashMap<ConnectionId, Arc<ClientConnection>> = HashMap::new();

    while let Some(command) = rx.recv().await {
        match command {
            RelayCommand::Publish(frame) => {
                observers.retain(|conn_id, conn| {
                    if conn.is_closed() {
                        debug!(debate_id = %id, %conn_id, "pruning closed observer");
                        metrics::gauge!(OBSERVERS_CONNECTED).decrement(1.0);
                        return false;
                    }
                    if !conn.send(Arc::clone(&frame)) {
                        debug!(debate_id = %id, %conn_id, "observer queue full, frame dropped");
                    }
                    true
                });
            }
            RelayCommand::Attach(conn, snapshot) => {
                if let Some(frame) = snapshot {
                    let _ = conn.send(frame);
                }
                if observers.insert(conn.id.clone(), conn).is_none() {
                    metrics::gauge!(OBSERVERS_CONNECTED).increment(1.0);
                }
            }
            RelayCommand::Detach(conn_id) => {
                if observers.remove(&conn_id).is_some() {
                    metrics::gauge!(OBSERVERS_CONNECTED).decrement(1.0);
                }
            }
            RelayCommand::Close => break,
        }
    }

    metrics::gauge!(OBSERVERS_CONNECTED).decrement(observers.len() as f64);
    debug!(debate_id = %id, observers = observers.len(), "observer relay stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::protocol::Heartbeat;

    fn observer() -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(16);
        (Arc::new(ClientConnection::new(ConnectionId::new(), tx)), rx)
    }

    fn kind_of(frame: &str) -> String {
        let value: serde_json::Value = serde_json::from_str(frame).unwrap();
        value["type"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn snapshot_precedes_published_frames() {
        let hub = ObserverHub::default();
        let id = SessionId::new();
        let (conn, mut rx) = observer();

        hub.attach(&id, conn, Some(&ServerMessage::Ping(Heartbeat::now())));
        hub.publish(&id, &ServerMessage::Pong(Heartbeat::now()));

        assert_eq!(kind_of(&rx.recv().await.unwrap()), "ping");
        assert_eq!(kind_of(&rx.recv().await.unwrap()), "pong");
    }

    #[tokio::test]
    async fn publish_without_observers_is_noop() {
        let hub = ObserverHub::default();
        let id = SessionId::new();
        hub.publish(&id, &ServerMessage::Pong(Heartbeat::now()));
        assert!(!hub.is_observed(&id));
    }

    #[tokio::test]
    async fn detached_observer_stops_receiving() {
        let hub = ObserverHub::default();
        let id = SessionId::new();
        let (first, mut first_rx) = observer();
        let (second, mut second_rx) = observer();
        let first_id = first.id.clone();

        hub.attach(&id, first, None);
        hub.attach(&id, second, None);
        hub.detach(&id, &first_id);
        hub.publish(&id, &ServerMessage::Pong(Heartbeat::now()));
        hub.close(&id);

        assert_eq!(kind_of(&second_rx.recv().await.unwrap()), "pong");
        // relay is gone once closed, so the first observer's queue drains to nothing
        tokio::task::yield_now().await;
        assert!(first_rx.try_recv().is_err());
        assert!(!hub.is_observed(&id));
    }
}
