use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use agora_core::Winner;

use crate::error::JudgeError;
use crate::judge::{Judge, JudgeRequest, JudgeVerdict};

/// Pre-programmed outcomes for deterministic testing without API calls.
pub enum MockOutcome {
    Verdict(JudgeVerdict),
    Error(JudgeError),
    /// Wait a duration, then yield the inner outcome.
    Delay(Duration, Box<MockOutcome>),
}

impl MockOutcome {
    pub fn verdict(winner: Winner, supporting_score: u32, opposing_score: u32, summary: &str) -> Self {
        Self::Verdict(JudgeVerdict {
            winner,
            supporting_score,
            opposing_score,
            summary: summary.to_string(),
        })
    }

    pub fn delayed(delay: Duration, inner: MockOutcome) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Mock judge that returns pre-programmed outcomes in sequence.
pub struct MockJudge {
    outcomes: Mutex<VecDeque<MockOutcome>>,
    call_count: AtomicUsize,
    last_request: Mutex<Option<JudgeRequest>>,
}

impl MockJudge {
    pub fn new(outcomes: Vec<MockOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            call_count: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn last_request(&self) -> Option<JudgeRequest> {
        self.last_request.lock().clone()
    }
}

#[async_trait]
impl Judge for MockJudge {
    fn name(&self) -> &str {
        "mock"
    }

    async fn judge(&self, request: &JudgeRequest) -> Result<JudgeVerdict, JudgeError> {
        let idx = self.call_count.fetch_add(1, Ordering::Relaxed);
        *self.last_request.lock() = Some(request.clone());

        let Some(mut outcome) = self.outcomes.lock().pop_front() else {
            return Err(JudgeError::NotConfigured(format!(
                "MockJudge: no outcome configured for call {idx}"
            )));
        };

        loop {
            match outcome {
                MockOutcome::Verdict(v) => return Ok(v),
                MockOutcome::Error(e) => return Err(e),
                MockOutcome::Delay(d, inner) => {
                    tokio::time::sleep(d).await;
                    outcome = *inner;
                }
            }
        }
    }
}
