//! Stop signal for the relay's background tasks.
//!
//! The listener loops and the periodic resync each hold a receiver and
//! exit when it fires. The HTTP server is stopped separately by its own
//! graceful-shutdown future; `drain` runs after it returns.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Broadcast stop signal plus the drain of the tasks it stops.
#[derive(Debug)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Receiver for one background task.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Fire the signal. Tasks that already exited are not affected.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Receivers still held, i.e. background tasks not yet exited.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Fire the signal and wait up to `timeout` for each task.
    ///
    /// Returns how many tasks did not finish in time; those are left running.
    pub async fn drain(&self, tasks: Vec<JoinHandle<()>>, timeout: Duration) -> usize {
        self.trigger();

        let mut stuck = 0;
        for task in tasks {
            match tokio::time::timeout(timeout, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "Background task failed"),
                Err(_) => stuck += 1,
            }
        }

        if stuck > 0 {
            tracing::warn!(stuck, "Background tasks did not stop in time");
        }
        stuck
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
