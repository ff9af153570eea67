//! External scoring for finished debates.
//!
//! [`Judge`] is the seam the engine calls once per session. The production
//! implementation talks to an OpenAI-style chat completions endpoint;
//! [`MockJudge`] scripts outcomes for tests.

pub mod chat;
pub mod error;
pub mod judge;
pub mod mock;
pub mod parse;
pub mod prompt;

pub use chat::{ChatCompletionsJudge, ChatJudgeConfig};
pub use error::JudgeError;
pub use judge::{Judge, JudgeRequest, JudgeVerdict};
pub use mock::{MockJudge, MockOutcome};
