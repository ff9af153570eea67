/// SQL DDL for the debate store.
/// WAL mode + foreign keys enabled at connection time.
pub const SCHEMA_VERSION: u32 = 1;

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    topic TEXT NOT NULL,
    total_rounds INTEGER NOT NULL,
    current_round INTEGER NOT NULL DEFAULT 1,
    status TEXT NOT NULL DEFAULT 'waiting',
    created_by TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    started_at TEXT,
    ended_at TEXT
);

CREATE TABLE IF NOT EXISTS participants (
    session_id TEXT NOT NULL REFERENCES sessions(id),
    bot_uuid TEXT NOT NULL,
    bot_name TEXT NOT NULL,
    identifier TEXT NOT NULL,
    debate_key TEXT NOT NULL,
    side TEXT,
    joined_at TEXT NOT NULL,
    PRIMARY KEY (session_id, bot_uuid)
);

CREATE TABLE IF NOT EXISTS transcript_entries (
    session_id TEXT NOT NULL REFERENCES sessions(id),
    sequence INTEGER NOT NULL,
    round INTEGER NOT NULL,
    speaker TEXT NOT NULL,
    side TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    message_format TEXT NOT NULL,
    message_content TEXT NOT NULL,
    PRIMARY KEY (session_id, sequence)
);

CREATE TABLE IF NOT EXISTS results (
    session_id TEXT PRIMARY KEY REFERENCES sessions(id),
    winner TEXT NOT NULL,
    supporting_score INTEGER NOT NULL,
    opposing_score INTEGER NOT NULL,
    summary_format TEXT NOT NULL,
    summary_content TEXT NOT NULL,
    reason TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status);
CREATE INDEX IF NOT EXISTS idx_participants_session ON participants(session_id);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
"#;

pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
"#;
