use tracing::{error, info, warn};

use agora_core::protocol::ServerMessage;
use agora_core::{ClientError, EndReason, ErrorCode, SessionId, SessionStatus, Side};
use agora_store::StoreError;
use agora_telemetry::metrics::{SESSIONS_ACTIVE, SESSIONS_ENDED_TOTAL};

use super::DebateEngine;
use crate::registry::SharedSession;
use crate::result::{self, ResultInput};
use crate::session::SessionState;

/// A claimed terminal transition, waiting for its result.
pub(crate) struct EndJob {
    id: SessionId,
    status: SessionStatus,
    was_active: bool,
    input: ResultInput,
}

impl DebateEngine {
    /// Claim the terminal transition. `None` if another path already did.
    ///
    /// Runs under the session lock: sets the terminal status, disarms every
    /// deadline and copies out what the synthesizer needs.
    pub(super) fn begin_end(&self, state: &mut SessionState, reason: EndReason) -> Option<EndJob> {
        if state.status.is_terminal() || state.finalizing {
            return None;
        }
        let was_active = state.status == SessionStatus::Active;
        state.finalizing = true;
        state.status = reason.status();
        state.timers.disarm_all();
        info!(debate_id = %state.id, reason = %reason.code(), "debate ending");

        Some(EndJob {
            id: state.id.clone(),
            status: state.status,
            was_active,
            input: ResultInput {
                topic: state.topic.clone(),
                supporting: state.identifier_on(Side::Supporting).map(str::to_string),
                opposing: state.identifier_on(Side::Opposing).map(str::to_string),
                transcript: state.transcript.clone(),
                reason,
            },
        })
    }

    /// Synthesize, persist, notify, then drop the session from memory.
    pub(super) async fn finish_end(&self, shared: SharedSession, job: EndJob) {
        let result = result::synthesize(
            self.inner.judge.as_deref(),
            &job.input,
            &self.inner.config,
        )
        .await;

        match self.inner.results.finalize(&job.id, job.status, Some(&result)) {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => {
                warn!(debate_id = %job.id, "result already recorded");
            }
            Err(error) => error!(debate_id = %job.id, %error, "failed to persist result"),
        }

        {
            let mut state = shared.lock();
            let end = ServerMessage::DebateEnd(state.end_message(result.clone()));
            for participant in &state.participants {
                if let Some(conn) = participant.live_conn() {
                    let _ = conn.send_message(&end);
                    conn.close();
                }
            }
            self.inner.observers.publish(&job.id, &end);
            self.inner.observers.close(&job.id);
            state.final_message = Some(end);
        }
        let _ = self.inner.registry.remove(&job.id);

        metrics::counter!(SESSIONS_ENDED_TOTAL, "reason_kind" => job.input.reason.kind())
            .increment(1);
        if job.was_active {
            metrics::gauge!(SESSIONS_ACTIVE).decrement(1.0);
        }
        info!(
            debate_id = %job.id,
            status = %job.status,
            winner = %result.winner,
            supporting_score = result.supporting_score,
            opposing_score = result.opposing_score,
            "debate ended"
        );
    }

    /// Join-wait deadline: the session never filled. No result is written.
    ///
    /// Returns `true` if the session expired and should leave the registry.
    pub(super) fn expire_waiting(&self, state: &mut SessionState) -> bool {
        if state.status != SessionStatus::Waiting || state.finalizing || state.is_full() {
            return false;
        }
        state.finalizing = true;
        state.status = SessionStatus::Timeout;
        state.timers.disarm_all();

        if let Err(error) = self.inner.results.finalize(&state.id, SessionStatus::Timeout, None) {
            error!(debate_id = %state.id, %error, "failed to persist waiting timeout");
        }

        let notice = ServerMessage::error(
            &ClientError::new(
                ErrorCode::WaitingTimeout,
                "No opponent joined in time; the debate has been closed",
            ),
            Some(state.id.as_str()),
        );
        for conn in state.live_connections() {
            let _ = conn.send_message(&notice);
            conn.close();
        }

        let waiting = ServerMessage::DebateWaiting(state.waiting_snapshot("timeout"));
        self.inner.observers.publish(&state.id, &waiting);
        self.inner.observers.close(&state.id);
        state.final_message = Some(waiting);

        metrics::counter!(SESSIONS_ENDED_TOTAL, "reason_kind" => "waiting_timeout").increment(1);
        info!(
            debate_id = %state.id,
            joined = state.participants.len(),
            "debate closed after waiting timeout"
        );
        true
    }
}
