//! Periodic sweep of finished tasks

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::core::Scheduler;

/// Background task that calls `sweep_completed` on an interval
///
/// The loop stops when the handle is dropped or [`Housekeeper::shutdown`] is
/// called.
pub struct Housekeeper {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl Housekeeper {
    pub(crate) fn spawn<T>(scheduler: Scheduler<T>, interval: Duration, max_age: Duration) -> Self
    where
        T: Clone + Send + 'static,
    {
        debug!(?interval, ?max_age, "Housekeeper::spawn: called");
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = scheduler.sweep_completed(max_age).await;
                        debug!(removed, "Housekeeper: sweep finished");
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("Housekeeper stopped");
        });

        Self { shutdown_tx, join }
    }

    /// Stop the sweep loop and wait for it to exit
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.join.await {
            warn!(error = %e, "Housekeeper task ended abnormally");
        }
    }
}
