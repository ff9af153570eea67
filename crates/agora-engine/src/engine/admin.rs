use serde::Serialize;
use tracing::{info, warn};

use agora_core::{DebateResult, EndReason, SessionId, SessionStatus, Side, TranscriptEntry};
use agora_store::{ParticipantRow, SessionRow, StoreError};
use agora_telemetry::metrics::SESSIONS_ENDED_TOTAL;

use super::DebateEngine;
use crate::error::EngineError;
use crate::result::{self, ResultInput};

/// Everything stored about one session.
#[derive(Clone, Debug, Serialize)]
pub struct SessionDetail {
    pub debate: SessionRow,
    pub bots: Vec<ParticipantRow>,
    pub debate_log: Vec<TranscriptEntry>,
    pub result: Option<DebateResult>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// `waiting` sessions loaded back with empty slots.
    pub resumed: usize,
    /// `active` sessions closed as interrupted.
    pub interrupted: usize,
}

impl DebateEngine {
    pub fn session_detail(&self, id: &SessionId) -> Result<SessionDetail, EngineError> {
        let debate = self
            .inner
            .sessions
            .get(id)
            .map_err(|e| EngineError::from_lookup(id.as_str(), e))?;
        Ok(SessionDetail {
            debate,
            bots: self.inner.participants.list(id)?,
            debate_log: self.inner.transcripts.list(id)?,
            result: self.inner.results.get(id)?,
        })
    }

    /// Newest first, optionally filtered by status.
    pub fn list_sessions(
        &self,
        status: Option<SessionStatus>,
        limit: u32,
    ) -> Result<Vec<SessionRow>, EngineError> {
        Ok(self.inner.sessions.list(status, limit)?)
    }

    /// Reconcile persisted sessions after a restart.
    ///
    /// `waiting` sessions come back with empty slots and a fresh join-wait
    /// deadline (their participants' connections died with the process).
    /// `active` sessions cannot resume; they are closed as `timeout` with a
    /// locally scored result.
    pub fn recover(&self) -> Result<RecoveryReport, EngineError> {
        let mut report = RecoveryReport::default();

        for row in self.inner.sessions.list_oldest_first(SessionStatus::Waiting)? {
            let _ = self.rehydrate(&row);
            report.resumed += 1;
        }

        for row in self.inner.sessions.list_oldest_first(SessionStatus::Active)? {
            let participants = self.inner.participants.list(&row.id)?;
            let on = |side: Side| {
                participants
                    .iter()
                    .find(|p| p.side == Some(side))
                    .map(|p| p.identifier.clone())
            };
            let input = ResultInput {
                topic: row.topic.clone(),
                supporting: on(Side::Supporting),
                opposing: on(Side::Opposing),
                transcript: self.inner.transcripts.list(&row.id)?,
                reason: EndReason::ServerRestart,
            };
            let result = result::fallback_result(&input, &self.inner.config);
            match self
                .inner
                .results
                .finalize(&row.id, SessionStatus::Timeout, Some(&result))
            {
                Ok(()) => {}
                Err(StoreError::Conflict(_)) => {
                    warn!(debate_id = %row.id, "interrupted debate already had a result");
                    self.inner.sessions.update_status(&row.id, SessionStatus::Timeout)?;
                }
                Err(error) => return Err(error.into()),
            }
            metrics::counter!(SESSIONS_ENDED_TOTAL, "reason_kind" => "server_restart").increment(1);
            info!(debate_id = %row.id, speeches = input.transcript.len(), "closed debate interrupted by restart");
            report.interrupted += 1;
        }

        info!(resumed = report.resumed, interrupted = report.interrupted, "recovery finished");
        Ok(report)
    }
}
