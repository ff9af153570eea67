//! Graceful shutdown coordination via `CancellationToken`.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Shared stop signal plus the set of connection tasks to wait for.
#[derive(Clone, Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tasks: TaskTracker,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Tracker for per-connection tasks.
    pub fn tasks(&self) -> &TaskTracker {
        &self.tasks
    }

    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Signal shutdown, then wait up to `timeout` for `handles` and every
    /// tracked task. Returns `false` if the wait timed out.
    pub async fn graceful_shutdown(&self, handles: Vec<JoinHandle<()>>, timeout: Duration) -> bool {
        self.shutdown();
        self.tasks.close();
        info!(
            task_count = handles.len(),
            connections = self.tasks.len(),
            timeout_secs = timeout.as_secs(),
            "waiting for tasks to complete"
        );

        let drain = async {
            let _ = futures::future::join_all(handles).await;
            self.tasks.wait().await;
        };

        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!("shutdown timed out after {timeout:?}, some tasks may still be running");
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_not_shutting_down() {
        let coord = ShutdownCoordinator::new();
        assert!(!coord.is_shutting_down());
    }

    #[test]
    fn token_propagation() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        coord.shutdown();
        coord.shutdown();
        assert!(token.is_cancelled());
        assert!(coord.is_shutting_down());
    }

    #[test]
    fn clones_share_the_signal() {
        let coord = ShutdownCoordinator::new();
        let other = coord.clone();
        other.shutdown();
        assert!(coord.is_shutting_down());
    }

    #[tokio::test]
    async fn waits_for_tracked_tasks() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        let _ = coord.tasks().spawn(async move { token.cancelled().await });
        let handle = tokio::spawn(async {});

        assert!(coord.graceful_shutdown(vec![handle], Duration::from_secs(5)).await);
        assert!(coord.tasks().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_on_stuck_task() {
        let coord = ShutdownCoordinator::new();
        let _ = coord.tasks().spawn(std::future::pending::<()>());

        assert!(!coord.graceful_shutdown(Vec::new(), Duration::from_secs(2)).await);
    }
}
