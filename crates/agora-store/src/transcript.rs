use tracing::instrument;

use agora_core::{SessionId, SpeechMessage, TranscriptEntry};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// Append-only transcript storage with a per-session monotonic sequence.
#[derive(Clone)]
pub struct TranscriptRepo {
    db: Database,
}

impl TranscriptRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append an entry; returns its sequence number (starting at 1).
    #[instrument(skip(self, entry), fields(debate_id = %session_id, round = entry.round))]
    pub fn append(&self, session_id: &SessionId, entry: &TranscriptEntry) -> Result<i64, StoreError> {
        self.db.with_tx(|tx| {
            let sequence: i64 = tx.query_row(
                "SELECT COALESCE(MAX(sequence), 0) + 1 FROM transcript_entries WHERE session_id = ?1",
                [session_id.as_str()],
                |row| row.get(0),
            )?;
            tx.execute(
                "INSERT INTO transcript_entries
                    (session_id, sequence, round, speaker, side, timestamp, message_format, message_content)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    session_id.as_str(),
                    sequence,
                    entry.round,
                    entry.speaker,
                    entry.side.as_str(),
                    entry.timestamp,
                    entry.message.format,
                    entry.message.content,
                ],
            )?;
            Ok(sequence)
        })
    }

    /// Full transcript in sequence order.
    #[instrument(skip(self), fields(debate_id = %session_id))]
    pub fn list(&self, session_id: &SessionId) -> Result<Vec<TranscriptEntry>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT round, speaker, side, timestamp, message_format, message_content
                 FROM transcript_entries WHERE session_id = ?1 ORDER BY sequence ASC",
            )?;
            let mut rows = stmt.query([session_id.as_str()])?;
            let mut entries = Vec::new();
            while let Some(row) = rows.next()? {
                let side: String = row_helpers::get(row, 2, "transcript_entries", "side")?;
                entries.push(TranscriptEntry {
                    round: row_helpers::get_u32(row, 0, "transcript_entries", "round")?,
                    speaker: row_helpers::get(row, 1, "transcript_entries", "speaker")?,
                    side: row_helpers::parse_enum(&side, "transcript_entries", "side")?,
                    timestamp: row_helpers::get(row, 3, "transcript_entries", "timestamp")?,
                    message: SpeechMessage {
                        format: row_helpers::get(row, 4, "transcript_entries", "message_format")?,
                        content: row_helpers::get(row, 5, "transcript_entries", "message_content")?,
                    },
                });
            }
            Ok(entries)
        })
    }
}
