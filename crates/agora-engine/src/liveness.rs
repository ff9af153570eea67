//! Heartbeat probing for participant connections.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use agora_core::protocol::{Heartbeat, ServerMessage};

use crate::connection::ClientConnection;

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// `threshold` consecutive probes went unanswered.
    TimedOut,
    /// The connection closed or the caller cancelled.
    Cancelled,
}

/// Probe a connection every `interval` until it dies or `cancel` fires.
///
/// Each tick first checks the miss counter: at `threshold` unanswered probes
/// the peer is declared dead. Otherwise a `ping` is queued and the counter
/// incremented; [`ClientConnection::record_pong`] resets it. The first probe
/// goes out one interval after the call, not immediately.
pub async fn run_heartbeat(
    connection: Arc<ClientConnection>,
    interval: Duration,
    threshold: u32,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let threshold = threshold.max(1);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if connection.missed_heartbeats() >= threshold {
                    return HeartbeatResult::TimedOut;
                }
                let missed = connection.record_probe();
                debug!(conn_id = %connection.id, missed, "heartbeat probe");
                let _ = connection.send_message(&ServerMessage::Ping(Heartbeat::now()));
            }
            () = cancel.cancelled() => return HeartbeatResult::Cancelled,
            () = connection.closed() => return HeartbeatResult::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::ConnectionId;
    use tokio::sync::mpsc;

    fn make_connection() -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(32);
        (Arc::new(ClientConnection::new(ConnectionId::new(), tx)), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn silent_peer_times_out_after_threshold() {
        let (conn, mut rx) = make_connection();
        let started = Instant::now();
        let result = run_heartbeat(
            conn,
            Duration::from_secs(30),
            3,
            CancellationToken::new(),
        )
        .await;
        assert_eq!(result, HeartbeatResult::TimedOut);
        // three probes at 30/60/90s, verdict at the fourth tick
        assert_eq!(started.elapsed(), Duration::from_secs(120));
        let mut pings = 0;
        while let Ok(frame) = rx.try_recv() {
            assert!(frame.contains("\"ping\""));
            pings += 1;
        }
        assert_eq!(pings, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn answering_peer_stays_alive() {
        let (conn, mut rx) = make_connection();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_heartbeat(
            Arc::clone(&conn),
            Duration::from_secs(30),
            3,
            cancel.clone(),
        ));

        for _ in 0..6 {
            let frame = rx.recv().await.unwrap();
            assert!(frame.contains("\"ping\""));
            conn.record_pong();
        }
        cancel.cancel();
        assert_eq!(handle.await.unwrap(), HeartbeatResult::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn close_ends_loop() {
        let (conn, _rx) = make_connection();
        let handle = tokio::spawn(run_heartbeat(
            Arc::clone(&conn),
            Duration::from_secs(30),
            3,
            CancellationToken::new(),
        ));
        conn.close();
        assert_eq!(handle.await.unwrap(), HeartbeatResult::Cancelled);
    }
}
