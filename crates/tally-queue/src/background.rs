//! # Background Executor
//!
//! A small fixed set of tasks running fire-and-forget jobs (request log
//! writes) off the bill path.
//!
//! ```text
//!  spawn_detached(job) ──try_send──► [ backlog (bounded) ] ──► task 0
//!         │                                                └──► task 1
//!         └── backlog full? job dropped, warn!
//! ```
//!
//! **Best effort.** Jobs are lost if the backlog is full, if the process
//! exits, or if they are still queued when [`BackgroundExecutor::shutdown`]
//! runs out of time. Never put anything here that the bill outcome depends on.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Fixed pool of tasks fed by a bounded backlog.
pub struct BackgroundExecutor {
    tx: std::sync::Mutex<Option<mpsc::Sender<Job>>>,
    handles: std::sync::Mutex<Vec<JoinHandle<()>>>,
    dropped: AtomicU64,
}

impl BackgroundExecutor {
    /// Starts `workers` tasks sharing a backlog of `backlog` jobs.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(workers: usize, backlog: usize) -> Self {
        let (tx, rx) = mpsc::channel::<Job>(backlog.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let handles = (0..workers.max(1))
            .map(|index| tokio::spawn(run_worker(index, rx.clone())))
            .collect();

        debug!(workers, backlog, "Background executor started");

        BackgroundExecutor {
            tx: std::sync::Mutex::new(Some(tx)),
            handles: std::sync::Mutex::new(handles),
            dropped: AtomicU64::new(0),
        }
    }

    /// Queues `job` without waiting. Returns `false` if it was dropped.
    pub fn spawn_detached<F>(&self, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guard = lock(&self.tx);
        let Some(tx) = guard.as_ref() else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        };

        match tx.try_send(Box::pin(job)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(dropped, "Background backlog full, job dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Jobs dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stops accepting jobs and waits up to `grace` for the backlog to run.
    /// Tasks still busy after that are left to finish on their own.
    pub async fn shutdown(&self, grace: Duration) {
        drop(lock(&self.tx).take());
        let handles = std::mem::take(&mut *lock(&self.handles));

        let deadline = tokio::time::Instant::now() + grace;
        for handle in handles {
            if tokio::time::timeout_at(deadline, handle).await.is_err() {
                warn!("Background task still busy after grace period, detaching");
            }
        }

        info!(dropped = self.dropped(), "Background executor stopped");
    }
}

impl std::fmt::Debug for BackgroundExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundExecutor")
            .field("dropped", &self.dropped())
            .finish_non_exhaustive()
    }
}

async fn run_worker(index: usize, rx: Arc<Mutex<mpsc::Receiver<Job>>>) {
    loop {
        let job = rx.lock().await.recv().await;
        let Some(job) = job else { break };

        if let Err(panic) = AssertUnwindSafe(job).catch_unwind().await {
            warn!(worker = index, panic = %crate::worker::panic_message(&panic), "Background job panicked");
        }
    }
    debug!(worker = index, "Background task exiting");
}

fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_jobs_run() {
        let executor = BackgroundExecutor::new(2, 16);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let counter = counter.clone();
            assert!(executor.spawn_detached(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }

        executor.shutdown(Duration::from_secs(1)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_full_backlog_drops() {
        let executor = BackgroundExecutor::new(1, 1);
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        // Occupy the only task, then fill the one backlog slot.
        executor.spawn_detached(async move {
            let _ = release_rx.await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(executor.spawn_detached(async {}));
        assert!(!executor.spawn_detached(async {}));
        assert_eq!(executor.dropped(), 1);

        let _ = release_tx.send(());
        executor.shutdown(Duration::from_secs(1)).await;
        assert!(!executor.spawn_detached(async {}));
    }

    #[tokio::test]
    async fn test_panicking_job_does_not_kill_worker() {
        let executor = BackgroundExecutor::new(1, 4);
        let ran = Arc::new(AtomicUsize::new(0));

        executor.spawn_detached(async { panic!("boom") });
        let after = ran.clone();
        executor.spawn_detached(async move {
            after.fetch_add(1, Ordering::SeqCst);
        });

        executor.shutdown(Duration::from_secs(1)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}
