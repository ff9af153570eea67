//! SQLite persistence for debate sessions: sessions, participants,
//! append-only transcripts and write-once results.

pub mod database;
pub mod error;
pub mod participants;
pub mod results;
pub mod row_helpers;
pub mod schema;
pub mod sessions;
pub mod transcript;

pub use database::Database;
pub use error::StoreError;
pub use participants::{NewParticipant, ParticipantRepo, ParticipantRow};
pub use results::ResultRepo;
pub use sessions::{SessionRepo, SessionRow};
pub use transcript::TranscriptRepo;
