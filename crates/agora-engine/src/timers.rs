//! Per-session deadline bookkeeping.
//!
//! Each armed deadline is a spawned sleep tagged with a generation number.
//! Re-arming or disarming aborts the previous task; a task that does fire
//! must still present the generation it was armed with, so a firing that
//! raced with a re-arm is recognised as stale and ignored.

use std::fmt;

use tokio::task::JoinHandle;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// A `waiting` session never filled.
    JoinWait,
    /// The expected speaker stayed silent.
    Speech,
    /// No accepted speech for too long.
    Inactivity,
    /// Absolute cap on an active session.
    MaxDuration,
}

impl TimerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::JoinWait => "join_wait",
            Self::Speech => "speech",
            Self::Inactivity => "inactivity",
            Self::MaxDuration => "max_duration",
        }
    }
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct ArmedTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

/// The deadlines of one session.
#[derive(Default)]
pub(crate) struct TimerSet {
    join_wait: Option<ArmedTimer>,
    speech: Option<ArmedTimer>,
    inactivity: Option<ArmedTimer>,
    max_duration: Option<ArmedTimer>,
    next_generation: u64,
}

impl TimerSet {
    fn slot(&mut self, kind: TimerKind) -> &mut Option<ArmedTimer> {
        match kind {
            TimerKind::JoinWait => &mut self.join_wait,
            TimerKind::Speech => &mut self.speech,
            TimerKind::Inactivity => &mut self.inactivity,
            TimerKind::MaxDuration => &mut self.max_duration,
        }
    }

    /// Reserve the generation for a task about to be spawned.
    pub fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// Install a spawned deadline, aborting whatever held the slot.
    pub fn install(&mut self, kind: TimerKind, generation: u64, handle: JoinHandle<()>) {
        if let Some(previous) = self.slot(kind).replace(ArmedTimer { generation, handle }) {
            previous.handle.abort();
        }
    }

    pub fn disarm(&mut self, kind: TimerKind) {
        if let Some(timer) = self.slot(kind).take() {
            timer.handle.abort();
        }
    }

    pub fn disarm_all(&mut self) {
        for kind in ALL_KINDS {
            self.disarm(kind);
        }
    }

    /// Claim a firing. Clears the slot without aborting (the caller *is*
    /// that task) and returns `false` if the generation is stale.
    pub fn claim(&mut self, kind: TimerKind, generation: u64) -> bool {
        let slot = self.slot(kind);
        if slot.as_ref().is_some_and(|t| t.generation == generation) {
            *slot = None;
            true
        } else {
            false
        }
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        match kind {
            TimerKind::JoinWait => self.join_wait.is_some(),
            TimerKind::Speech => self.speech.is_some(),
            TimerKind::Inactivity => self.inactivity.is_some(),
            TimerKind::MaxDuration => self.max_duration.is_some(),
        }
    }

    pub fn armed(&self) -> Vec<TimerKind> {
        ALL_KINDS.into_iter().filter(|k| self.is_armed(*k)).collect()
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        self.disarm_all();
    }
}

const ALL_KINDS: [TimerKind; 4] = [
    TimerKind::JoinWait,
    TimerKind::Speech,
    TimerKind::Inactivity,
    TimerKind::MaxDuration,
];
