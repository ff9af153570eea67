use serde::Serialize;
use tracing::instrument;

use agora_core::{SessionId, Side};

use crate::database::Database;
use crate::error::{is_constraint_violation, StoreError};
use crate::row_helpers;

/// A joined participant. The secret is never serialized.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ParticipantRow {
    pub session_id: SessionId,
    pub bot_uuid: String,
    pub bot_name: String,
    pub identifier: String,
    #[serde(skip_serializing)]
    pub debate_key: String,
    pub side: Option<Side>,
    pub joined_at: String,
}

#[derive(Clone, Debug)]
pub struct NewParticipant<'a> {
    pub session_id: &'a SessionId,
    pub bot_uuid: &'a str,
    pub bot_name: &'a str,
    pub identifier: &'a str,
    pub debate_key: &'a str,
}

#[derive(Clone)]
pub struct ParticipantRepo {
    db: Database,
}

impl ParticipantRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Record a join. The same unique id twice in one session is a `Conflict`.
    #[instrument(skip(self, p), fields(debate_id = %p.session_id, participant = p.identifier))]
    pub fn insert(&self, p: &NewParticipant<'_>) -> Result<ParticipantRow, StoreError> {
        let now = row_helpers::now();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO participants (session_id, bot_uuid, bot_name, identifier, debate_key, joined_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    p.session_id.as_str(),
                    p.bot_uuid,
                    p.bot_name,
                    p.identifier,
                    p.debate_key,
                    now,
                ],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    StoreError::Conflict(format!(
                        "participant {} already joined {}",
                        p.bot_uuid, p.session_id
                    ))
                } else {
                    e.into()
                }
            })?;

            Ok(ParticipantRow {
                session_id: p.session_id.clone(),
                bot_uuid: p.bot_uuid.to_string(),
                bot_name: p.bot_name.to_string(),
                identifier: p.identifier.to_string(),
                debate_key: p.debate_key.to_string(),
                side: None,
                joined_at: now,
            })
        })
    }

    /// Participants of a session in join order.
    #[instrument(skip(self), fields(debate_id = %session_id))]
    pub fn list(&self, session_id: &SessionId) -> Result<Vec<ParticipantRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT session_id, bot_uuid, bot_name, identifier, debate_key, side, joined_at
                 FROM participants WHERE session_id = ?1 ORDER BY joined_at ASC, rowid ASC",
            )?;
            let mut rows = stmt.query([session_id.as_str()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_participant(row)?);
            }
            Ok(results)
        })
    }

    /// Persist both side assignments atomically.
    #[instrument(skip(self), fields(debate_id = %session_id))]
    pub fn assign_sides(
        &self,
        session_id: &SessionId,
        supporting_uuid: &str,
        opposing_uuid: &str,
    ) -> Result<(), StoreError> {
        self.db.with_tx(|tx| {
            for (uuid, side) in [(supporting_uuid, Side::Supporting), (opposing_uuid, Side::Opposing)] {
                let changed = tx.execute(
                    "UPDATE participants SET side = ?1 WHERE session_id = ?2 AND bot_uuid = ?3",
                    rusqlite::params![side.as_str(), session_id.as_str(), uuid],
                )?;
                if changed == 0 {
                    return Err(StoreError::NotFound(format!(
                        "participant {uuid} in {session_id}"
                    )));
                }
            }
            Ok(())
        })
    }

    /// Drop every participant row of a session. Returns the number removed.
    #[instrument(skip(self), fields(debate_id = %session_id))]
    pub fn clear(&self, session_id: &SessionId) -> Result<usize, StoreError> {
        self.db.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM participants WHERE session_id = ?1",
                [session_id.as_str()],
            )?)
        })
    }
}

fn row_to_participant(row: &rusqlite::Row<'_>) -> Result<ParticipantRow, StoreError> {
    let side: Option<String> = row_helpers::get_opt(row, 5, "participants", "side")?;
    Ok(ParticipantRow {
        session_id: SessionId::from_raw(row_helpers::get::<String>(row, 0, "participants", "session_id")?),
        bot_uuid: row_helpers::get(row, 1, "participants", "bot_uuid")?,
        bot_name: row_helpers::get(row, 2, "participants", "bot_name")?,
        identifier: row_helpers::get(row, 3, "participants", "identifier")?,
        debate_key: row_helpers::get(row, 4, "participants", "debate_key")?,
        side: side
            .map(|s| row_helpers::parse_enum(&s, "participants", "side"))
            .transpose()?,
        joined_at: row_helpers::get(row, 6, "participants", "joined_at")?,
    })
}
