use std::sync::Arc;

use tracing::{debug, error};

use agora_core::protocol::{DebateEnd, DebateWaiting, ServerMessage};
use agora_core::{ClientError, ConnectionId, ErrorCode, SessionId, SessionStatus, Side};
use agora_store::StoreError;

use super::DebateEngine;
use crate::connection::ClientConnection;

impl DebateEngine {
    /// Start streaming a session's events to an observer.
    ///
    /// A live session sends its current snapshot first, then every later
    /// event in order. A finished session sends its stored final state once.
    pub fn subscribe(&self, id: &SessionId, conn: Arc<ClientConnection>) -> Result<(), ClientError> {
        if let Some(shared) = self.inner.registry.get(id) {
            let state = shared.lock();
            if let Some(last) = &state.final_message {
                let _ = conn.send_message(last);
                return Ok(());
            }
            let snapshot = match state.status {
                _ if state.finalizing => None,
                SessionStatus::Waiting => {
                    Some(ServerMessage::DebateWaiting(state.waiting_snapshot("waiting")))
                }
                SessionStatus::Active => Some(ServerMessage::DebateUpdate(
                    state.turn_state(&self.inner.config, true),
                )),
                SessionStatus::Completed | SessionStatus::Timeout => None,
            };
            debug!(debate_id = %id, conn_id = %conn.id, "observer attached");
            self.inner.observers.attach(id, conn, snapshot.as_ref());
            return Ok(());
        }

        let snapshot = self.stored_snapshot(id)?;
        let _ = conn.send_message(&snapshot);
        Ok(())
    }

    pub fn unsubscribe(&self, id: &SessionId, conn_id: &ConnectionId) {
        self.inner.observers.detach(id, conn_id);
    }

    /// Final (or last known) state of a session that is not in memory.
    fn stored_snapshot(&self, id: &SessionId) -> Result<ServerMessage, ClientError> {
        let not_found = || ClientError::new(ErrorCode::DebateNotFound, "Debate not found").recoverable(true);
        let row = match self.inner.sessions.get(id) {
            Ok(row) => row,
            Err(StoreError::NotFound(_)) => return Err(not_found()),
            Err(error) => {
                error!(debate_id = %id, %error, "failed to load debate");
                return Err(not_found());
            }
        };

        let participants = self.inner.participants.list(id).unwrap_or_else(|error| {
            error!(debate_id = %id, %error, "failed to load participants");
            Vec::new()
        });
        let side_identifier = |side: Side| {
            participants
                .iter()
                .find(|p| p.side == Some(side))
                .map(|p| p.identifier.clone())
                .unwrap_or_default()
        };
        let result = self.inner.results.get(id).unwrap_or_else(|error| {
            error!(debate_id = %id, %error, "failed to load result");
            None
        });

        Ok(match result {
            Some(debate_result) => ServerMessage::DebateEnd(DebateEnd {
                debate_id: id.to_string(),
                topic: row.topic,
                supporting_side: side_identifier(Side::Supporting),
                opposing_side: side_identifier(Side::Opposing),
                total_rounds: row.total_rounds,
                status: row.status.as_str().to_string(),
                debate_log: self.inner.transcripts.list(id).unwrap_or_else(|error| {
                    error!(debate_id = %id, %error, "failed to load transcript");
                    Vec::new()
                }),
                debate_result,
            }),
            None => ServerMessage::DebateWaiting(DebateWaiting {
                debate_id: id.to_string(),
                topic: row.topic,
                total_rounds: row.total_rounds,
                status: row.status.as_str().to_string(),
                joined_bots: participants.iter().map(|p| p.identifier.clone()).collect(),
            }),
        })
    }
}
