//! # Periodic Tasks
//!
//! Each task runs its job on a fixed interval until told to stop. Stopping
//! waits for an in-flight run to finish; it never cancels one midway.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

pub struct PeriodicTask;

impl PeriodicTask {
    /// Spawn `job` every `period`. The first run happens one period after
    /// start.
    pub fn start<F, Fut>(name: &'static str, period: Duration, mut job: F) -> TaskHandle
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval() fires immediately once.
            ticker.tick().await;
            debug!(task = name, period_ms = period.as_millis() as u64, "periodic task started");

            loop {
                tokio::select! {
                    biased;
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => job().await,
                }
            }
            debug!(task = name, "periodic task stopped");
        });

        TaskHandle {
            name,
            shutdown: shutdown_tx,
            join,
        }
    }
}

pub struct TaskHandle {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl TaskHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signal the task and wait for it to exit.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.join.await {
            warn!(task = self.name, error = %e, "periodic task ended abnormally");
        }
    }
}
