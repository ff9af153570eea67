use tracing::{debug, error, info};

use agora_core::protocol::{now_rfc3339, DebateSpeech};
use agora_core::{
    ClientError, ConnectionId, DisconnectCause, EndReason, ErrorCode, SessionId, SessionStatus,
    Side, TranscriptEntry,
};
use agora_telemetry::metrics::{SPEECHES_ACCEPTED_TOTAL, SPEECHES_REJECTED_TOTAL};

use super::DebateEngine;
use crate::arbiter::{self, TurnOutcome};
use crate::timers::TimerKind;

impl DebateEngine {
    /// Validate and apply a speech. Errors go back to the sender only.
    pub async fn submit_speech(&self, speech: &DebateSpeech) -> Result<(), ClientError> {
        let id = SessionId::from_raw(speech.debate_id.as_str());
        let Some(shared) = self.inner.registry.get(&id) else {
            metrics::counter!(SPEECHES_REJECTED_TOTAL, "code" => ErrorCode::DebateNotFound.as_str())
                .increment(1);
            return Err(ClientError::new(ErrorCode::DebateNotFound, "Debate not found"));
        };

        let job = {
            let mut state = shared.lock();
            let side = match arbiter::validate_speech(&state, speech, &self.inner.config) {
                Ok(side) => side,
                Err(rejection) => {
                    metrics::counter!(SPEECHES_REJECTED_TOTAL, "code" => rejection.code.as_str())
                        .increment(1);
                    debug!(debate_id = %id, speaker = %speech.speaker, code = %rejection.code, "speech rejected");
                    return Err(rejection);
                }
            };

            state.timers.disarm(TimerKind::Speech);
            let entry = TranscriptEntry {
                round: state.current_round,
                speaker: speech.speaker.clone(),
                side,
                timestamp: now_rfc3339(),
                message: speech.message.clone(),
            };
            if let Err(error) = self.inner.transcripts.append(&id, &entry) {
                error!(debate_id = %id, %error, "failed to persist speech");
            }
            info!(debate_id = %id, round = entry.round, side = %side, speaker = %entry.speaker, "speech accepted");
            state.transcript.push(entry);
            self.arm(&mut state, TimerKind::Inactivity);
            metrics::counter!(SPEECHES_ACCEPTED_TOTAL).increment(1);

            let outcome = arbiter::advance(&mut state, side);
            if side == Side::Opposing {
                if let Err(error) = self.inner.sessions.update_round(&id, state.current_round) {
                    error!(debate_id = %id, %error, "failed to persist round");
                }
            }
            match outcome {
                TurnOutcome::Completed => self.begin_end(&mut state, EndReason::Completed),
                TurnOutcome::Continue { .. } => {
                    self.broadcast_turn(&state, false);
                    self.arm(&mut state, TimerKind::Speech);
                    None
                }
            }
        };

        if let Some(job) = job {
            self.finish_end(shared, job).await;
        }
        Ok(())
    }

    /// A participant's connection is gone.
    ///
    /// Ends an active session; a waiting session only loses the live
    /// connection and keeps the slot.
    pub async fn disconnect(&self, id: &SessionId, conn_id: &ConnectionId, cause: DisconnectCause) {
        let Some(shared) = self.inner.registry.get(id) else {
            return;
        };

        let job = {
            let mut state = shared.lock();
            let Some(participant) = state
                .participants
                .iter_mut()
                .find(|p| p.conn.as_ref().is_some_and(|c| &c.id == conn_id))
            else {
                return;
            };
            participant.conn = None;
            let identifier = participant.identifier.clone();

            match state.status {
                SessionStatus::Active => self.begin_end(
                    &mut state,
                    EndReason::Disconnected { identifier, cause },
                ),
                SessionStatus::Waiting => {
                    info!(debate_id = %id, participant = %identifier, cause = cause.as_str(), "bot left before start");
                    None
                }
                SessionStatus::Completed | SessionStatus::Timeout => None,
            }
        };

        if let Some(job) = job {
            self.finish_end(shared, job).await;
        }
    }
}
