//! In-memory state of one live debate session.

use std::sync::Arc;

use agora_core::protocol::{DebateEnd, DebateWaiting, ServerMessage, TurnState};
use agora_core::{DebateResult, SessionId, SessionStatus, Side, TranscriptEntry};
use agora_store::SessionRow;

use crate::config::EngineConfig;
use crate::connection::ClientConnection;
use crate::timers::TimerSet;

/// A joined participant. The connection is `None` once it went away.
pub(crate) struct Participant {
    pub uuid: String,
    pub identifier: String,
    pub key: String,
    pub side: Option<Side>,
    pub conn: Option<Arc<ClientConnection>>,
}

impl Participant {
    pub fn live_conn(&self) -> Option<&Arc<ClientConnection>> {
        self.conn.as_ref().filter(|c| !c.is_closed())
    }
}

pub(crate) struct SessionState {
    pub id: SessionId,
    pub topic: String,
    pub total_rounds: u32,
    pub current_round: u32,
    pub status: SessionStatus,
    pub created_at: String,
    /// Join order; at most two.
    pub participants: Vec<Participant>,
    pub transcript: Vec<TranscriptEntry>,
    pub last_speaker: Option<Side>,
    pub timers: TimerSet,
    pub start_scheduled: bool,
    /// Set when a terminal transition has been claimed.
    pub finalizing: bool,
    /// Last frame observers saw; set once the session is over.
    pub final_message: Option<ServerMessage>,
}

impl SessionState {
    /// Fresh state for a `waiting` row; persisted participants are not carried.
    pub fn from_row(row: &SessionRow) -> Self {
        Self {
            id: row.id.clone(),
            topic: row.topic.clone(),
            total_rounds: row.total_rounds,
            current_round: row.current_round.max(1),
            status: row.status,
            created_at: row.created_at.clone(),
            participants: Vec::with_capacity(2),
            transcript: Vec::new(),
            last_speaker: None,
            timers: TimerSet::default(),
            start_scheduled: false,
            finalizing: false,
            final_message: None,
        }
    }

    pub fn is_full(&self) -> bool {
        self.participants.len() >= 2
    }

    pub fn joined_identifiers(&self) -> Vec<String> {
        self.participants.iter().map(|p| p.identifier.clone()).collect()
    }

    pub fn participant(&self, identifier: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.identifier == identifier)
    }

    pub fn participant_on(&self, side: Side) -> Option<&Participant> {
        self.participants.iter().find(|p| p.side == Some(side))
    }

    pub fn identifier_on(&self, side: Side) -> Option<&str> {
        self.participant_on(side).map(|p| p.identifier.as_str())
    }

    /// The side expected to speak next: supporting opens every round.
    pub fn next_side(&self) -> Side {
        self.last_speaker.map_or(Side::Supporting, Side::opposite)
    }

    pub fn live_connections(&self) -> Vec<Arc<ClientConnection>> {
        self.participants
            .iter()
            .filter_map(|p| p.live_conn().cloned())
            .collect()
    }

    /// Shared turn context, without any recipient-specific fields.
    pub fn turn_state(&self, config: &EngineConfig, with_log: bool) -> TurnState {
        TurnState {
            debate_id: self.id.to_string(),
            topic: self.topic.clone(),
            supporting_side: self.identifier_on(Side::Supporting).unwrap_or_default().to_string(),
            opposing_side: self.identifier_on(Side::Opposing).unwrap_or_default().to_string(),
            total_rounds: self.total_rounds,
            current_round: self.current_round,
            your_side: None,
            your_identifier: None,
            next_speaker: self.identifier_on(self.next_side()).unwrap_or_default().to_string(),
            timeout_seconds: config.speech_timeout.as_secs(),
            min_content_length: config.min_content_length,
            max_content_length: config.max_content_length,
            debate_log: with_log.then(|| self.transcript.clone()),
        }
    }

    pub fn waiting_snapshot(&self, status: &str) -> DebateWaiting {
        DebateWaiting {
            debate_id: self.id.to_string(),
            topic: self.topic.clone(),
            total_rounds: self.total_rounds,
            status: status.to_string(),
            joined_bots: self.joined_identifiers(),
        }
    }

    pub fn end_message(&self, result: DebateResult) -> DebateEnd {
        DebateEnd {
            debate_id: self.id.to_string(),
            topic: self.topic.clone(),
            supporting_side: self.identifier_on(Side::Supporting).unwrap_or_default().to_string(),
            opposing_side: self.identifier_on(Side::Opposing).unwrap_or_default().to_string(),
            total_rounds: self.total_rounds,
            status: self.status.as_str().to_string(),
            debate_log: self.transcript.clone(),
            debate_result: result,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn waiting_state(total_rounds: u32) -> SessionState {
        SessionState::from_row(&SessionRow {
            id: SessionId::new(),
            topic: "Is Rust memory-safe?".into(),
            total_rounds,
            current_round: 1,
            status: SessionStatus::Waiting,
            created_by: None,
            created_at: "2026-01-01T00:00:00.000Z".into(),
            updated_at: "2026-01-01T00:00:00.000Z".into(),
            started_at: None,
            ended_at: None,
        })
    }

    /// Two participants, `alpha` supporting and `beta` opposing, active.
    pub fn active_state(total_rounds: u32) -> SessionState {
        let mut state = waiting_state(total_rounds);
        for (name, side) in [("alpha", Side::Supporting), ("beta", Side::Opposing)] {
            state.participants.push(Participant {
                uuid: format!("{name}-uuid"),
                identifier: format!("{name}-1234abcd"),
                key: format!("key-{name}"),
                side: Some(side),
                conn: None,
            });
        }
        state.status = SessionStatus::Active;
        state
    }
}
