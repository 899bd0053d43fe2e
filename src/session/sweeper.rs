//! Periodic expiry sweep as an owned background task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::store::SessionStore;

/// Default period between sweeps (1 hour).
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Spawns the expiry sweep loop.
pub struct SessionSweeper;

impl SessionSweeper {
    /// Start sweeping `store` every `interval`. The first sweep runs one
    /// interval after start.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(store: Arc<SessionStore>, interval: Duration) -> SweeperHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        let removed = store.expire_sweep();
                        if removed > 0 {
                            info!(removed, remaining = store.len(), "Session sweep completed");
                        } else {
                            debug!("Session sweep found nothing to remove");
                        }
                    }
                }
            }

            debug!("Session sweeper stopped");
        });

        SweeperHandle {
            stop: Some(stop_tx),
            task,
        }
    }
}

/// Handle to a running sweeper. Dropping it without calling
/// [`SweeperHandle::shutdown`] also stops the loop, without waiting for it.
pub struct SweeperHandle {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for the task to finish.
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }

        if let Err(e) = (&mut self.task).await {
            warn!("Session sweeper task failed: {}", e);
        }
    }

    /// Whether the background task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;
    use crate::session::store::SessionLimits;

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_removes_expired_sessions() {
        let store = Arc::new(SessionStore::with_limits(
            SessionLimits::default().with_max_age(chrono::Duration::milliseconds(1)),
        ));
        store.append("idle", Role::User, "x");
        // Expiry is measured on the wall clock, not the paused tokio clock
        std::thread::sleep(Duration::from_millis(5));

        let handle = SessionSweeper::spawn(Arc::clone(&store), Duration::from_secs(60));
        assert_eq!(store.len(), 1);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(store.is_empty());

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_shutdown_stops_task() {
        let store = Arc::new(SessionStore::new());
        let handle = SessionSweeper::spawn(store, Duration::from_secs(3600));
        assert!(!handle.is_finished());

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_keeps_live_sessions() {
        let store = Arc::new(SessionStore::new());
        store.append("live", Role::User, "x");

        let handle = SessionSweeper::spawn(Arc::clone(&store), Duration::from_secs(1));
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(store.contains("live"));
        handle.shutdown().await;
    }
}
