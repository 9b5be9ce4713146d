//! Optional background reclamation.
//!
//! `put` already reclaims on every call, but a queue with no producer
//! traffic keeps expired leases until the next `put`. The reaper closes
//! that gap by calling [`UniqueQueue::reclaim_expired`] on a timer.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::queue::UniqueQueue;
use crate::store::KeyValueStore;

#[derive(Debug, Clone, Copy)]
pub struct ReaperConfig {
    /// Time between reclamation passes.
    pub interval: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
        }
    }
}

/// Handle to a running reaper task. Dropping it aborts the task.
pub struct ReaperHandle {
    shutdown: Arc<Notify>,
    task: Option<JoinHandle<u64>>,
}

impl ReaperHandle {
    /// Ask the reaper to stop after its current pass.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// A clonable trigger for [`shutdown`](Self::shutdown), e.g. for a
    /// Ctrl-C handler.
    pub fn shutdown_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Stop the reaper and wait for it. Returns the total number of keys
    /// it reclaimed.
    pub async fn stop(self) -> u64 {
        self.shutdown();
        self.join().await
    }

    /// Wait for the reaper to exit (after someone triggers shutdown).
    pub async fn join(mut self) -> u64 {
        let Some(task) = self.task.take() else {
            return 0;
        };
        match task.await {
            Ok(total) => total,
            Err(e) => {
                warn!("reaper task ended abnormally: {e}");
                0
            }
        }
    }
}

impl Drop for ReaperHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Spawn a tokio task that reclaims expired leases every `config.interval`.
///
/// Store errors are logged and the loop keeps going.
pub fn spawn_reaper<S>(queue: Arc<UniqueQueue<S>>, config: ReaperConfig) -> ReaperHandle
where
    S: KeyValueStore + 'static,
{
    let shutdown = Arc::new(Notify::new());
    let signal = Arc::clone(&shutdown);

    let task = tokio::spawn(async move {
        let mut total = 0u64;
        info!(
            queue = queue.namespace().prefix(),
            interval_ms = config.interval.as_millis() as u64,
            "reaper started"
        );
        loop {
            tokio::select! {
                _ = signal.notified() => {
                    info!(queue = queue.namespace().prefix(), total, "reaper stopping");
                    return total;
                }
                _ = tokio::time::sleep(config.interval) => {}
            }

            match queue.reclaim_expired().await {
                Ok(keys) => total += keys.len() as u64,
                Err(e) => warn!(queue = queue.namespace().prefix(), "reclaim failed: {e}"),
            }
        }
    });

    ReaperHandle {
        shutdown,
        task: Some(task),
    }
}
