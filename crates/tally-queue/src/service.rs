//! # Bill Queue Service
//!
//! Owns the channel and the worker pool. Constructed explicitly with
//! [`BillQueueService::start`]; whoever holds the returned `Arc` is
//! responsible for calling [`BillQueueService::shutdown`].
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   start ──► RUNNING ──────── shutdown() ────────► STOPPED               │
//! │               │                  │                                       │
//! │               │ submit → ticket  ├─ 1. running = false (submit fails)   │
//! │               │                  ├─ 2. cancel token                     │
//! │               │                  │      idle workers exit               │
//! │               │                  │      blocked producers interrupted   │
//! │               │                  ├─ 3. join workers (grace each)        │
//! │               │                  │      busy ones finish their item     │
//! │               │                  └─ 4. close + drain leftovers,         │
//! │               │                         resolve them as failed          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tally_core::{BillRequest, CallerType, ProcessorFactory};

use crate::channel::BillChannel;
use crate::config::QueueConfig;
use crate::error::{ChannelError, QueueError, QueueResult};
use crate::events::{EventSink, PipelineEvent};
use crate::item::{BillOutcome, BillTicket, WorkItem};
use crate::worker::{Counters, Worker};

/// Failure message for a put interrupted while waiting for space.
pub const SUBMISSION_INTERRUPTED: &str = "submission interrupted";

/// Failure message for items still queued when the service stopped.
pub const STOPPED_BEFORE_PROCESSING: &str = "service stopped before processing";

/// Bounded queue in front of a fixed pool of bill workers.
pub struct BillQueueService {
    channel: Arc<BillChannel>,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
    shutdown: CancellationToken,
    counters: Arc<Counters>,
    events: Arc<dyn EventSink>,
    config: QueueConfig,
}

impl BillQueueService {
    /// Creates the channel and spawns `config.worker_count` workers, each
    /// with its own processor from `factory`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        config: QueueConfig,
        factory: impl ProcessorFactory + 'static,
        events: Arc<dyn EventSink>,
    ) -> QueueResult<Arc<Self>> {
        config.validate()?;

        let channel = Arc::new(BillChannel::new(config.queue_capacity));
        let factory: Arc<dyn ProcessorFactory> = Arc::new(factory);
        let shutdown = CancellationToken::new();
        let counters = Arc::new(Counters::default());

        let workers = (0..config.worker_count)
            .map(|index| {
                let worker = Worker {
                    index,
                    channel: channel.clone(),
                    factory: factory.clone(),
                    shutdown: shutdown.clone(),
                    events: events.clone(),
                    counters: counters.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        info!(
            queue_capacity = config.queue_capacity,
            worker_count = config.worker_count,
            "Bill queue service started"
        );

        Ok(Arc::new(BillQueueService {
            channel,
            workers: std::sync::Mutex::new(workers),
            running: AtomicBool::new(true),
            shutdown,
            counters,
            events,
            config,
        }))
    }

    /// Queues a bill request and returns its ticket without waiting for
    /// processing.
    ///
    /// Waits only while the channel is full. If shutdown interrupts that
    /// wait, the returned ticket is already failed.
    pub async fn submit(
        &self,
        request: BillRequest,
        user_id: impl Into<String>,
        caller_type: CallerType,
    ) -> QueueResult<BillTicket> {
        self.submit_until(request, user_id.into(), caller_type, std::future::pending::<()>())
            .await
    }

    /// Like [`submit`](Self::submit), but `token` can also interrupt a wait
    /// for space.
    pub async fn submit_cancellable(
        &self,
        request: BillRequest,
        user_id: impl Into<String>,
        caller_type: CallerType,
        token: &CancellationToken,
    ) -> QueueResult<BillTicket> {
        self.submit_until(request, user_id.into(), caller_type, token.cancelled())
            .await
    }

    async fn submit_until<F>(
        &self,
        request: BillRequest,
        user_id: String,
        caller_type: CallerType,
        interrupt: F,
    ) -> QueueResult<BillTicket>
    where
        F: Future<Output = ()>,
    {
        if !self.is_running() {
            self.events.emit(&PipelineEvent::Rejected {
                request_id: None,
                user_id,
                caller_type,
                reason: QueueError::ServiceStopped.to_string(),
            });
            return Err(QueueError::ServiceStopped);
        }

        let (item, ticket) = WorkItem::new(request, user_id, caller_type);
        let request_id = item.id.clone();
        let user_id = item.user_id.clone();
        let submitted_at = item.created_at;

        // Counted before the put so a fast worker never completes more than
        // was submitted. Rolled back unless the put lands, including when
        // the caller drops this future mid-wait.
        let admission = Admission::new(&self.counters);

        let shutdown = &self.shutdown;
        let stop_waiting = async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = interrupt => {}
            }
        };

        match self.channel.put_until(item, stop_waiting).await {
            Ok(()) => {
                admission.accept();
                self.events.emit(&PipelineEvent::Submitted {
                    request_id,
                    user_id,
                    caller_type,
                    submitted_at,
                    queue_size: self.channel.size(),
                });
                Ok(ticket)
            }
            Err(err) => {
                drop(admission);
                let reason = err.reason;
                let item = err.into_inner();

                match reason {
                    ChannelError::Interrupted => {
                        debug!(request_id = %request_id, "Submission interrupted while waiting for space");
                        let waited = item.queue_wait();
                        item.resolve(BillOutcome::failure(SUBMISSION_INTERRUPTED, waited));
                        self.events.emit(&PipelineEvent::Rejected {
                            request_id: Some(request_id),
                            user_id,
                            caller_type,
                            reason: SUBMISSION_INTERRUPTED.to_string(),
                        });
                        Ok(ticket)
                    }
                    ChannelError::Closed => {
                        drop(item);
                        self.events.emit(&PipelineEvent::Rejected {
                            request_id: Some(request_id),
                            user_id,
                            caller_type,
                            reason: QueueError::ServiceStopped.to_string(),
                        });
                        Err(QueueError::ServiceStopped)
                    }
                }
            }
        }
    }

    /// Point-in-time counters. Values may be stale as soon as they return.
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            queue_size: self.channel.size(),
            remaining_capacity: self.channel.remaining_capacity(),
            capacity: self.channel.capacity(),
            worker_count: self.config.worker_count,
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            running: self.is_running(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Stops the service. Safe to call more than once; later calls return
    /// immediately.
    ///
    /// Workers that are idle exit at once. Busy workers finish the item in
    /// hand; any still running after the grace period are detached and
    /// left to finish on their own. Items that never reached a worker are
    /// resolved as failed.
    pub async fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        info!("Bill queue service shutting down");
        self.shutdown.cancel();

        let handles = std::mem::take(&mut *lock(&self.workers));
        let grace = self.config.shutdown_grace();
        let mut detached = 0usize;

        for (index, handle) in handles.into_iter().enumerate() {
            match tokio::time::timeout(grace, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(worker = index, error = %e, "Bill worker ended abnormally"),
                Err(_) => {
                    detached += 1;
                    warn!(worker = index, "Bill worker still busy after grace period, detaching");
                }
            }
        }

        let leftovers = self.channel.close_and_drain().await;
        let drained = leftovers.len();

        for item in leftovers {
            let queue_wait = item.queue_wait();
            self.counters.failed.fetch_add(1, Ordering::Relaxed);

            let event = PipelineEvent::Completed {
                request_id: item.id.clone(),
                user_id: item.user_id.clone(),
                caller_type: item.caller_type,
                submitted_at: item.created_at,
                worker: None,
                queue_wait,
                processing_time: Duration::ZERO,
                error: Some(STOPPED_BEFORE_PROCESSING.to_string()),
            };

            item.resolve(BillOutcome::failure(STOPPED_BEFORE_PROCESSING, Duration::ZERO));
            self.events.emit(&event);
        }

        let stats = self.stats();
        info!(
            detached,
            drained,
            submitted = stats.submitted,
            completed = stats.completed,
            failed = stats.failed,
            "Bill queue service stopped"
        );
    }
}

impl Drop for BillQueueService {
    fn drop(&mut self) {
        // Idle workers would otherwise wait on the channel forever.
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for BillQueueService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BillQueueService")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

/// One provisional count in `submitted`, taken back on drop unless
/// [`accept`](Admission::accept)ed.
struct Admission<'a> {
    counters: &'a Counters,
    accepted: bool,
}

impl<'a> Admission<'a> {
    fn new(counters: &'a Counters) -> Self {
        counters.submitted.fetch_add(1, Ordering::Relaxed);
        Admission {
            counters,
            accepted: false,
        }
    }

    fn accept(mut self) {
        self.accepted = true;
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if !self.accepted {
            self.counters.submitted.fetch_sub(1, Ordering::Relaxed);
        }
    }
}

fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// =============================================================================
// Stats
// =============================================================================

/// Snapshot of queue load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub queue_size: usize,
    pub remaining_capacity: usize,
    pub capacity: usize,
    pub worker_count: usize,
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub running: bool,
}

impl QueueStats {
    /// Share of the channel currently occupied, 0.0 to 100.0.
    pub fn utilization_percent(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.queue_size as f64 * 100.0 / self.capacity as f64
    }

    pub fn load_level(&self) -> LoadLevel {
        LoadLevel::from_utilization(self.utilization_percent())
    }

    /// Requests accepted but not yet resolved.
    pub fn pending(&self) -> u64 {
        self.submitted.saturating_sub(self.completed + self.failed)
    }
}

/// Coarse queue load for admin dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadLevel {
    Low,
    Moderate,
    High,
    Critical,
}

impl LoadLevel {
    pub fn from_utilization(percent: f64) -> Self {
        if percent < 25.0 {
            LoadLevel::Low
        } else if percent < 50.0 {
            LoadLevel::Moderate
        } else if percent < 75.0 {
            LoadLevel::High
        } else {
            LoadLevel::Critical
        }
    }
}
