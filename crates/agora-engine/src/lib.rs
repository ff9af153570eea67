//! Debate session engine: participants join, alternate speeches under turn
//! and length rules, and every session ends exactly once with a persisted
//! result that is pushed to participants and observers.

#![deny(unsafe_code)]

mod arbiter;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
mod fanout;
pub mod liveness;
mod registry;
pub mod result;
mod session;
pub mod timers;

pub use config::EngineConfig;
pub use connection::ClientConnection;
pub use engine::{DebateEngine, JoinOutcome, RecoveryReport, SessionDetail};
pub use error::EngineError;
pub use liveness::{run_heartbeat, HeartbeatResult};
pub use result::{fallback_result, fallback_scores, reason_description, synthesize, ResultInput};
pub use timers::TimerKind;
