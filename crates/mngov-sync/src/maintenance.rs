//! Background task driving periodic governance maintenance.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::manager::GovernanceManager;

/// Handle to a running maintenance task.
#[derive(Debug)]
pub struct MaintenanceHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<u64>,
}

impl MaintenanceHandle {
    /// Signals the task to stop and waits for it.
    ///
    /// Returns the number of maintenance passes that ran.
    pub async fn shutdown(self) -> u64 {
        // The receiver only goes away once the task has already exited.
        let _ = self.shutdown.send(true);
        self.join.await.unwrap_or(0)
    }
}

/// Spawns a task calling [`GovernanceManager::do_maintenance`] every `interval`.
///
/// The first pass runs one full interval after spawning.
#[must_use]
pub fn spawn_maintenance(manager: Arc<GovernanceManager>, interval: Duration) -> MaintenanceHandle {
    let (shutdown, mut shutdown_rx) = watch::channel(false);
    let join = tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        let mut passes = 0u64;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match manager.do_maintenance() {
                        Some(report) => {
                            passes += 1;
                            debug!(%report, "governance maintenance pass");
                        }
                        None => debug!("governance maintenance skipped, not synced"),
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!(passes, "governance maintenance shutting down");
                        break;
                    }
                }
            }
        }
        passes
    });
    MaintenanceHandle { shutdown, join }
}
