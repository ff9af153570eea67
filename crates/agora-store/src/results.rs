use tracing::instrument;

use agora_core::{DebateResult, SessionId, SessionStatus, SpeechMessage};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// Final results. A session has at most one.
#[derive(Clone)]
pub struct ResultRepo {
    db: Database,
}

impl ResultRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Write the terminal status and (optionally) the result in one transaction.
    ///
    /// Fails with `Conflict` if a result already exists for the session; in
    /// that case the status is left untouched.
    #[instrument(skip(self, result), fields(debate_id = %session_id, status = %status))]
    pub fn finalize(
        &self,
        session_id: &SessionId,
        status: SessionStatus,
        result: Option<&DebateResult>,
    ) -> Result<(), StoreError> {
        self.db.with_tx(|tx| {
            let now = row_helpers::now();
            let changed = tx.execute(
                "UPDATE sessions SET status = ?1, updated_at = ?2, ended_at = ?2 WHERE id = ?3",
                rusqlite::params![status.as_str(), now, session_id.as_str()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("session {session_id}")));
            }

            let Some(result) = result else {
                return Ok(());
            };

            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM results WHERE session_id = ?1)",
                [session_id.as_str()],
                |row| row.get(0),
            )?;
            if exists {
                return Err(StoreError::Conflict(format!(
                    "result already recorded for {session_id}"
                )));
            }

            tx.execute(
                "INSERT INTO results
                    (session_id, winner, supporting_score, opposing_score, summary_format, summary_content, reason, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    session_id.as_str(),
                    result.winner.as_str(),
                    result.supporting_score,
                    result.opposing_score,
                    result.summary.format,
                    result.summary.content,
                    result.reason,
                    now,
                ],
            )?;
            Ok(())
        })
    }

    #[instrument(skip(self), fields(debate_id = %session_id))]
    pub fn get(&self, session_id: &SessionId) -> Result<Option<DebateResult>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT winner, supporting_score, opposing_score, summary_format, summary_content, reason
                 FROM results WHERE session_id = ?1",
            )?;
            let mut rows = stmt.query([session_id.as_str()])?;
            let Some(row) = rows.next()? else {
                return Ok(None);
            };
            let winner: String = row_helpers::get(row, 0, "results", "winner")?;
            Ok(Some(DebateResult {
                winner: row_helpers::parse_enum(&winner, "results", "winner")?,
                supporting_score: row_helpers::get_u32(row, 1, "results", "supporting_score")?,
                opposing_score: row_helpers::get_u32(row, 2, "results", "opposing_score")?,
                summary: SpeechMessage {
                    format: row_helpers::get(row, 3, "results", "summary_format")?,
                    content: row_helpers::get(row, 4, "results", "summary_content")?,
                },
                reason: row_helpers::get(row, 5, "results", "reason")?,
            }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::Winner;
    use crate::sessions::SessionRepo;

    fn result(winner: Winner) -> DebateResult {
        DebateResult {
            winner,
            supporting_score: 52,
            opposing_score: 48,
            summary: SpeechMessage::markdown("## Summary"),
            reason: "completed".into(),
        }
    }

    #[test]
    fn finalize_writes_status_and_result() {
        let db = Database::in_memory().unwrap();
        let sessions = SessionRepo::new(db.clone());
        let id = sessions.create("T", 1, None).unwrap().id;
        let repo = ResultRepo::new(db);

        repo.finalize(&id, SessionStatus::Completed, Some(&result(Winner::Supporting)))
            .unwrap();

        let session = sessions.get(&id).unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert!(session.ended_at.is_some());
        assert_eq!(repo.get(&id).unwrap(), Some(result(Winner::Supporting)));
    }

    #[test]
    fn second_finalize_conflicts_and_keeps_first() {
        let db = Database::in_memory().unwrap();
        let sessions = SessionRepo::new(db.clone());
        let id = sessions.create("T", 1, None).unwrap().id;
        let repo = ResultRepo::new(db);

        repo.finalize(&id, SessionStatus::Completed, Some(&result(Winner::Supporting)))
            .unwrap();
        let second = repo.finalize(&id, SessionStatus::Timeout, Some(&result(Winner::Draw)));
        assert!(matches!(second, Err(StoreError::Conflict(_))));

        assert_eq!(sessions.get(&id).unwrap().status, SessionStatus::Completed);
        assert_eq!(repo.get(&id).unwrap().unwrap().winner, Winner::Supporting);
    }

    #[test]
    fn finalize_without_result() {
        let db = Database::in_memory().unwrap();
        let sessions = SessionRepo::new(db.clone());
        let id = sessions.create("T", 1, None).unwrap().id;
        let repo = ResultRepo::new(db);

        repo.finalize(&id, SessionStatus::Timeout, None).unwrap();
        assert_eq!(sessions.get(&id).unwrap().status, SessionStatus::Timeout);
        assert!(repo.get(&id).unwrap().is_none());
    }

    #[test]
    fn finalize_unknown_session() {
        let repo = ResultRepo::new(Database::in_memory().unwrap());
        let err = repo
            .finalize(&SessionId::from_raw("debate_x"), SessionStatus::Timeout, None)
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
