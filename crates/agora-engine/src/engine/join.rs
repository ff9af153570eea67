use std::sync::Arc;

use tracing::{error, info, warn};

use agora_core::protocol::{LoginConfirmed, LoginRequest, ServerMessage};
use agora_core::{
    DisconnectCause, EndReason, LoginRejection, RejectReason, SessionId, SessionStatus, Side,
};
use agora_store::{NewParticipant, SessionRow, StoreError};
use agora_telemetry::metrics::{LOGINS_REJECTED_TOTAL, SESSIONS_ACTIVE, SESSIONS_CREATED_TOTAL};

use super::DebateEngine;
use crate::connection::ClientConnection;
use crate::error::EngineError;
use crate::registry::SharedSession;
use crate::session::{Participant, SessionState};
use crate::timers::TimerKind;

/// What a participant learns on a successful join.
#[derive(Clone, Debug)]
pub struct JoinOutcome {
    pub session_id: SessionId,
    pub identifier: String,
    pub debate_key: String,
    pub topic: String,
    /// Identifiers that joined before this participant.
    pub joined_bots: Vec<String>,
}

const NO_AVAILABLE: &str =
    "No available debates found. Please create a debate first or specify a debate_id.";

impl DebateEngine {
    /// Create a `waiting` session and arm its join-wait deadline.
    pub fn create_session(
        &self,
        topic: &str,
        total_rounds: Option<u32>,
        created_by: Option<&str>,
    ) -> Result<SessionRow, EngineError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(EngineError::InvalidRequest("Topic is required".into()));
        }
        let rounds = total_rounds
            .filter(|r| *r > 0)
            .unwrap_or(self.inner.config.default_rounds);

        let row = self.inner.sessions.create(topic, rounds, created_by)?;
        let shared = self.inner.registry.insert(SessionState::from_row(&row));
        self.arm(&mut shared.lock(), TimerKind::JoinWait);

        metrics::counter!(SESSIONS_CREATED_TOTAL).increment(1);
        info!(debate_id = %row.id, total_rounds = rounds, "debate created");
        Ok(row)
    }

    /// Place a participant into a session and send it `login_confirmed`.
    ///
    /// The second join schedules the session start after the settling delay.
    pub fn join(
        &self,
        request: &LoginRequest,
        conn: Arc<ClientConnection>,
    ) -> Result<JoinOutcome, LoginRejection> {
        let outcome = self.try_join(request, conn);
        if let Err(rejection) = &outcome {
            metrics::counter!(LOGINS_REJECTED_TOTAL, "reason" => rejection.reason.as_str())
                .increment(1);
            info!(
                bot_name = %request.bot_name,
                reason = rejection.reason.as_str(),
                debate_id = rejection.debate_id.as_deref().unwrap_or(""),
                "login rejected"
            );
        }
        outcome
    }

    fn try_join(
        &self,
        request: &LoginRequest,
        conn: Arc<ClientConnection>,
    ) -> Result<JoinOutcome, LoginRejection> {
        let shared = self.resolve_session(request.debate_id.as_deref())?;
        let mut state = shared.lock();
        let id = state.id.clone();

        if state.status != SessionStatus::Waiting || state.finalizing {
            return Err(not_ready(&id));
        }
        if state.is_full() {
            return Err(
                LoginRejection::new(RejectReason::DebateFull, "Debate already has two bots")
                    .for_debate(id.as_str()),
            );
        }

        let identifier = display_identifier(
            &request.bot_name,
            &request.bot_uuid,
            self.inner.config.identifier_prefix_len,
        );
        if state
            .participants
            .iter()
            .any(|p| p.uuid == request.bot_uuid || p.identifier == identifier)
        {
            return Err(duplicate(&id, &identifier));
        }

        let debate_key = mint_key();
        match self.inner.participants.insert(&NewParticipant {
            session_id: &id,
            bot_uuid: &request.bot_uuid,
            bot_name: &request.bot_name,
            identifier: &identifier,
            debate_key: &debate_key,
        }) {
            Ok(_) => {}
            Err(StoreError::Conflict(_)) => return Err(duplicate(&id, &identifier)),
            Err(error) => {
                error!(debate_id = %id, %error, "failed to persist participant");
                return Err(
                    LoginRejection::new(RejectReason::InternalError, "Failed to register bot")
                        .for_debate(id.as_str()),
                );
            }
        }

        let joined_bots = state.joined_identifiers();
        state.participants.push(Participant {
            uuid: request.bot_uuid.clone(),
            identifier: identifier.clone(),
            key: debate_key.clone(),
            side: None,
            conn: Some(Arc::clone(&conn)),
        });

        let _ = conn.send_message(&ServerMessage::LoginConfirmed(LoginConfirmed {
            status: "confirmed".into(),
            message: "Wait for other bot".into(),
            debate_id: id.to_string(),
            debate_key: debate_key.clone(),
            bot_identifier: identifier.clone(),
            topic: state.topic.clone(),
            joined_bots: joined_bots.clone(),
        }));
        self.inner.observers.publish(
            &id,
            &ServerMessage::DebateWaiting(state.waiting_snapshot("waiting")),
        );
        info!(debate_id = %id, participant = %identifier, joined = state.participants.len(), "bot joined");

        if state.is_full() && !state.start_scheduled {
            state.start_scheduled = true;
            state.timers.disarm(TimerKind::JoinWait);
            self.schedule_start(id.clone());
        }

        Ok(JoinOutcome {
            session_id: id,
            identifier,
            debate_key,
            topic: state.topic.clone(),
            joined_bots,
        })
    }

    fn resolve_session(&self, requested: Option<&str>) -> Result<SharedSession, LoginRejection> {
        let Some(raw) = requested.map(str::trim).filter(|s| !s.is_empty()) else {
            return self
                .inner
                .registry
                .find_open()
                .ok_or_else(|| LoginRejection::new(RejectReason::NoAvailableDebate, NO_AVAILABLE));
        };

        let id = SessionId::from_raw(raw);
        if let Some(shared) = self.inner.registry.get(&id) {
            return Ok(shared);
        }

        match self.inner.sessions.get(&id) {
            Ok(row) if row.status == SessionStatus::Waiting => Ok(self.rehydrate(&row)),
            Ok(_) => Err(not_ready(&id)),
            Err(StoreError::NotFound(_)) => Err(
                LoginRejection::new(RejectReason::DebateNotFound, "Debate not found").for_debate(raw),
            ),
            Err(error) => {
                error!(debate_id = %id, %error, "failed to load debate");
                Err(LoginRejection::new(RejectReason::InternalError, "Failed to register bot")
                    .for_debate(raw))
            }
        }
    }

    /// Bring a persisted `waiting` session back into memory with empty slots.
    pub(super) fn rehydrate(&self, row: &SessionRow) -> SharedSession {
        let (shared, inserted) = self.inner.registry.get_or_insert_with(&row.id, || {
            if let Err(error) = self.inner.participants.clear(&row.id) {
                warn!(debate_id = %row.id, %error, "failed to clear stale participants");
            }
            SessionState::from_row(row)
        });
        if inserted {
            self.arm(&mut shared.lock(), TimerKind::JoinWait);
            info!(debate_id = %row.id, "waiting debate loaded");
        }
        shared
    }

    fn schedule_start(&self, id: SessionId) {
        let weak = self.downgrade();
        let delay = self.inner.config.start_delay;
        drop(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                DebateEngine { inner }.start(&id).await;
            }
        }));
    }

    /// Assign sides and open round 1. Ends at once if a participant left.
    async fn start(&self, id: &SessionId) {
        let Some(shared) = self.inner.registry.get(id) else {
            return;
        };

        let job = {
            let mut state = shared.lock();
            state.start_scheduled = false;
            if state.status != SessionStatus::Waiting || state.finalizing || !state.is_full() {
                return;
            }
            state.timers.disarm(TimerKind::JoinWait);

            let supporting = usize::from(!rand::random::<bool>());
            for (idx, participant) in state.participants.iter_mut().enumerate() {
                participant.side = Some(if idx == supporting {
                    Side::Supporting
                } else {
                    Side::Opposing
                });
            }
            let (supporting_uuid, opposing_uuid) = (
                state.participants[supporting].uuid.clone(),
                state.participants[1 - supporting].uuid.clone(),
            );
            if let Err(error) = self
                .inner
                .participants
                .assign_sides(id, &supporting_uuid, &opposing_uuid)
            {
                warn!(debate_id = %id, %error, "failed to persist sides");
            }
            if let Err(error) = self.inner.sessions.mark_started(id) {
                warn!(debate_id = %id, %error, "failed to persist start");
            }

            state.status = SessionStatus::Active;
            state.current_round = 1;
            metrics::gauge!(SESSIONS_ACTIVE).increment(1.0);
            info!(
                debate_id = %id,
                supporting = state.identifier_on(Side::Supporting).unwrap_or_default(),
                opposing = state.identifier_on(Side::Opposing).unwrap_or_default(),
                "debate started"
            );

            let departed = state
                .participants
                .iter()
                .find(|p| p.live_conn().is_none())
                .map(|p| p.identifier.clone());
            match departed {
                Some(identifier) => self.begin_end(
                    &mut state,
                    EndReason::Disconnected {
                        identifier,
                        cause: DisconnectCause::ConnectionLost,
                    },
                ),
                None => {
                    self.broadcast_turn(&state, true);
                    for kind in [TimerKind::Speech, TimerKind::Inactivity, TimerKind::MaxDuration] {
                        self.arm(&mut state, kind);
                    }
                    None
                }
            }
        };

        if let Some(job) = job {
            self.finish_end(shared, job).await;
        }
    }

    /// Push the turn context: personalised to each participant, plain to
    /// observers. `debate_start` omits the transcript.
    pub(super) fn broadcast_turn(&self, state: &SessionState, start: bool) {
        let turn = state.turn_state(&self.inner.config, !start);
        let wrap = |t| {
            if start {
                ServerMessage::DebateStart(t)
            } else {
                ServerMessage::DebateUpdate(t)
            }
        };
        for participant in &state.participants {
            if let (Some(conn), Some(side)) = (participant.live_conn(), participant.side) {
                let _ = conn.send_message(&wrap(turn.for_participant(side, &participant.identifier)));
            }
        }
        self.inner.observers.publish(&state.id, &wrap(turn));
    }
}

fn not_ready(id: &SessionId) -> LoginRejection {
    LoginRejection::new(RejectReason::DebateNotReady, "Debate not ready yet, try later")
        .for_debate(id.as_str())
        .retry_after(5)
}

fn duplicate(id: &SessionId, identifier: &str) -> LoginRejection {
    LoginRejection::new(
        RejectReason::DuplicateIdentifier,
        format!("Bot identifier {identifier} is already in this debate"),
    )
    .for_debate(id.as_str())
}

/// `name-xxxxxxxx`: the name plus the first `prefix_len` characters of the uuid.
pub(crate) fn display_identifier(name: &str, uuid: &str, prefix_len: usize) -> String {
    let prefix: String = uuid.chars().take(prefix_len).collect();
    format!("{name}-{prefix}")
}

/// `key-` followed by 32 random hex digits.
pub(crate) fn mint_key() -> String {
    let bytes: [u8; 16] = rand::random();
    let mut key = String::with_capacity(36);
    key.push_str("key-");
    for byte in bytes {
        key.push_str(&format!("{byte:02x}"));
    }
    key
}
