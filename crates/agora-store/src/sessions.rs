use serde::Serialize;
use tracing::instrument;

use agora_core::{SessionId, SessionStatus};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionRow {
    pub id: SessionId,
    pub topic: String,
    pub total_rounds: u32,
    pub current_round: u32,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
}

const SELECT_COLUMNS: &str = "SELECT id, topic, total_rounds, current_round, status, created_by,
        created_at, updated_at, started_at, ended_at
 FROM sessions";

#[derive(Clone)]
pub struct SessionRepo {
    db: Database,
}

impl SessionRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a new session in `waiting` at round 1.
    #[instrument(skip(self, topic))]
    pub fn create(
        &self,
        topic: &str,
        total_rounds: u32,
        created_by: Option<&str>,
    ) -> Result<SessionRow, StoreError> {
        let id = SessionId::new();
        let now = row_helpers::now();

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (id, topic, total_rounds, current_round, status, created_by, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 1, 'waiting', ?4, ?5, ?5)",
                rusqlite::params![id.as_str(), topic, total_rounds, created_by, now],
            )?;

            Ok(SessionRow {
                id,
                topic: topic.to_string(),
                total_rounds,
                current_round: 1,
                status: SessionStatus::Waiting,
                created_by: created_by.map(str::to_string),
                created_at: now.clone(),
                updated_at: now,
                started_at: None,
                ended_at: None,
            })
        })
    }

    /// Get a session by ID.
    #[instrument(skip(self), fields(debate_id = %id))]
    pub fn get(&self, id: &SessionId) -> Result<SessionRow, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} WHERE id = ?1"))?;
            let mut rows = stmt.query([id.as_str()])?;
            match rows.next()? {
                Some(row) => row_to_session(row),
                None => Err(StoreError::NotFound(format!("session {id}"))),
            }
        })
    }

    /// List sessions, newest first, optionally filtered by status.
    #[instrument(skip(self))]
    pub fn list(
        &self,
        status: Option<SessionStatus>,
        limit: u32,
    ) -> Result<Vec<SessionRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut results = Vec::new();
            match status {
                Some(s) => {
                    let mut stmt = conn.prepare(&format!(
                        "{SELECT_COLUMNS} WHERE status = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2"
                    ))?;
                    let mut rows = stmt.query(rusqlite::params![s.as_str(), limit])?;
                    while let Some(row) = rows.next()? {
                        results.push(row_to_session(row)?);
                    }
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "{SELECT_COLUMNS} ORDER BY created_at DESC, rowid DESC LIMIT ?1"
                    ))?;
                    let mut rows = stmt.query([limit])?;
                    while let Some(row) = rows.next()? {
                        results.push(row_to_session(row)?);
                    }
                }
            }
            Ok(results)
        })
    }

    /// All sessions with `status`, oldest first. Used by startup recovery.
    #[instrument(skip(self), fields(status = %status))]
    pub fn list_oldest_first(&self, status: SessionStatus) -> Result<Vec<SessionRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{SELECT_COLUMNS} WHERE status = ?1 ORDER BY created_at ASC, rowid ASC"
            ))?;
            let mut rows = stmt.query([status.as_str()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_session(row)?);
            }
            Ok(results)
        })
    }

    /// Move a `waiting` session to `active` and stamp its start time.
    #[instrument(skip(self), fields(debate_id = %id))]
    pub fn mark_started(&self, id: &SessionId) -> Result<String, StoreError> {
        self.db.with_conn(|conn| {
            let now = row_helpers::now();
            let changed = conn.execute(
                "UPDATE sessions SET status = 'active', started_at = ?1, updated_at = ?1
                 WHERE id = ?2 AND status = 'waiting'",
                rusqlite::params![now, id.as_str()],
            )?;
            if changed == 0 {
                return Err(StoreError::Conflict(format!("session {id} is not waiting")));
            }
            Ok(now)
        })
    }

    #[instrument(skip(self), fields(debate_id = %id, round))]
    pub fn update_round(&self, id: &SessionId, round: u32) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE sessions SET current_round = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![round, row_helpers::now(), id.as_str()],
            )?;
            Ok(())
        })
    }

    /// Set a status without touching the result table.
    #[instrument(skip(self), fields(debate_id = %id, status = %status))]
    pub fn update_status(&self, id: &SessionId, status: SessionStatus) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let now = row_helpers::now();
            let ended_at = status.is_terminal().then(|| now.clone());
            let changed = conn.execute(
                "UPDATE sessions SET status = ?1, updated_at = ?2, ended_at = COALESCE(?3, ended_at)
                 WHERE id = ?4",
                rusqlite::params![status.as_str(), now, ended_at, id.as_str()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("session {id}")));
            }
            Ok(())
        })
    }
}

fn row_to_session(row: &rusqlite::Row<'_>) -> Result<SessionRow, StoreError> {
    let status_str: String = row_helpers::get(row, 4, "sessions", "status")?;

    Ok(SessionRow {
        id: SessionId::from_raw(row_helpers::get::<String>(row, 0, "sessions", "id")?),
        topic: row_helpers::get(row, 1, "sessions", "topic")?,
        total_rounds: row_helpers::get_u32(row, 2, "sessions", "total_rounds")?,
        current_round: row_helpers::get_u32(row, 3, "sessions", "current_round")?,
        status: row_helpers::parse_enum(&status_str, "sessions", "status")?,
        created_by: row_helpers::get_opt(row, 5, "sessions", "created_by")?,
        created_at: row_helpers::get(row, 6, "sessions", "created_at")?,
        updated_at: row_helpers::get(row, 7, "sessions", "updated_at")?,
        started_at: row_helpers::get_opt(row, 8, "sessions", "started_at")?,
        ended_at: row_helpers::get_opt(row, 9, "sessions", "ended_at")?,
    })
}
