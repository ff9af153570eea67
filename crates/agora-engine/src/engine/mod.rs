//! The debate engine: session lifecycle, turn handling, timers and
//! termination, shared by every connection handler.
//!
//! Locking: the registry map lock is never held while a session lock is
//! taken, and no lock is held across an `.await`.

mod admin;
mod finish;
mod join;
mod observe;
mod speech;

use std::sync::{Arc, Weak};

use tracing::debug;

use agora_core::{EndReason, SessionId, SessionStatus};
use agora_judge::Judge;
use agora_store::{Database, ParticipantRepo, ResultRepo, SessionRepo, TranscriptRepo};

use crate::config::EngineConfig;
use crate::fanout::ObserverHub;
use crate::registry::SessionRegistry;
use crate::session::SessionState;
use crate::timers::TimerKind;

pub use admin::{RecoveryReport, SessionDetail};
pub use join::JoinOutcome;

pub(crate) struct EngineInner {
    config: EngineConfig,
    db: Database,
    sessions: SessionRepo,
    participants: ParticipantRepo,
    transcripts: TranscriptRepo,
    results: ResultRepo,
    judge: Option<Arc<dyn Judge>>,
    registry: SessionRegistry,
    observers: ObserverHub,
}

/// Cheap to clone; all clones drive the same sessions.
#[derive(Clone)]
pub struct DebateEngine {
    inner: Arc<EngineInner>,
}

impl DebateEngine {
    pub fn new(db: Database, judge: Option<Arc<dyn Judge>>, config: EngineConfig) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                config,
                sessions: SessionRepo::new(db.clone()),
                participants: ParticipantRepo::new(db.clone()),
                transcripts: TranscriptRepo::new(db.clone()),
                results: ResultRepo::new(db.clone()),
                db,
                judge,
                registry: SessionRegistry::default(),
                observers: ObserverHub::default(),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn database(&self) -> &Database {
        &self.inner.db
    }

    /// Sessions currently held in memory (`waiting` or `active`).
    pub fn live_sessions(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn active_sessions(&self) -> usize {
        self.inner.registry.count_with_status(SessionStatus::Active)
    }

    /// Status of a live session; `None` once it left memory.
    pub fn session_status(&self, id: &SessionId) -> Option<SessionStatus> {
        self.inner.registry.get(id).map(|s| s.lock().status)
    }

    pub fn armed_timers(&self, id: &SessionId) -> Vec<TimerKind> {
        self.inner
            .registry
            .get(id)
            .map(|s| s.lock().timers.armed())
            .unwrap_or_default()
    }

    /// Fire a deadline now, as if it had elapsed.
    pub async fn fire_timer(&self, id: &SessionId, kind: TimerKind) {
        self.on_timer(id, kind, None).await;
    }

    /// Disarm every deadline and close every participant connection.
    /// Persisted state is left for recovery on the next start.
    pub fn shutdown(&self) {
        for shared in self.inner.registry.all() {
            let mut state = shared.lock();
            state.timers.disarm_all();
            for conn in state.live_connections() {
                conn.close();
            }
        }
    }

    fn downgrade(&self) -> Weak<EngineInner> {
        Arc::downgrade(&self.inner)
    }

    /// Spawn the deadline for `kind`, replacing any armed one.
    fn arm(&self, state: &mut SessionState, kind: TimerKind) {
        let config = &self.inner.config;
        let duration = match kind {
            TimerKind::JoinWait => config.waiting_timeout,
            TimerKind::Speech => config.speech_timeout,
            TimerKind::Inactivity => config.inactivity_timeout,
            TimerKind::MaxDuration => config.max_duration,
        };
        let generation = state.timers.next_generation();
        let weak = self.downgrade();
        let id = state.id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if let Some(inner) = weak.upgrade() {
                DebateEngine { inner }.on_timer(&id, kind, Some(generation)).await;
            }
        });
        state.timers.install(kind, generation, handle);
    }

    /// A deadline elapsed. `generation` is `None` for forced firings.
    async fn on_timer(&self, id: &SessionId, kind: TimerKind, generation: Option<u64>) {
        let Some(shared) = self.inner.registry.get(id) else {
            return;
        };

        let fired = {
            let mut state = shared.lock();
            let claimed = match generation {
                Some(generation) => state.timers.claim(kind, generation),
                None => {
                    state.timers.disarm(kind);
                    true
                }
            };
            if !claimed {
                debug!(debate_id = %id, timer = %kind, "stale timer ignored");
                return;
            }

            match kind {
                TimerKind::JoinWait => {
                    if self.expire_waiting(&mut state) {
                        Fired::Expired
                    } else {
                        Fired::Nothing
                    }
                }
                TimerKind::Speech | TimerKind::Inactivity | TimerKind::MaxDuration => {
                    if state.status != SessionStatus::Active {
                        return;
                    }
                    let reason = match kind {
                        TimerKind::Speech => EndReason::SpeechTimeout,
                        TimerKind::Inactivity => EndReason::InactivityTimeout,
                        _ => EndReason::MaxDurationTimeout,
                    };
                    self.begin_end(&mut state, reason).map_or(Fired::Nothing, Fired::Ended)
                }
            }
        };

        match fired {
            Fired::Ended(job) => self.finish_end(shared, job).await,
            Fired::Expired => {
                let _ = self.inner.registry.remove(id);
            }
            Fired::Nothing => {}
        }
    }
}

enum Fired {
    Ended(finish::EndJob),
    Expired,
    Nothing,
}
