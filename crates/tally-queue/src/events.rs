//! # Pipeline Events
//!
//! The queue reports what happens to each request through an
//! [`EventSink`]. Sinks must not block: they run on the submitting task or
//! on a worker.
//!
//! ```text
//! submit() ──► Submitted ─┐
//!      └────► Rejected  ──┼──► EventSink ──┬──► TracingEventSink (tracing)
//! worker  ──► Completed ──┘                └──► RequestLogSink  (request_log,
//!                                                via BackgroundExecutor)
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use tally_core::CallerType;
use tally_db::{Database, DbResult};

use crate::background::BackgroundExecutor;

/// Request type recorded in the request log.
pub const CREATE_BILL: &str = "CREATE_BILL";

/// Something that happened to a request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// Accepted into the channel.
    Submitted {
        request_id: String,
        user_id: String,
        caller_type: CallerType,
        submitted_at: DateTime<Utc>,
        queue_size: usize,
    },
    /// A result was delivered to the ticket.
    Completed {
        request_id: String,
        user_id: String,
        caller_type: CallerType,
        submitted_at: DateTime<Utc>,
        /// `None` for items resolved at shutdown without reaching a worker.
        worker: Option<usize>,
        queue_wait: Duration,
        processing_time: Duration,
        /// `None` on success.
        error: Option<String>,
    },
    /// Never entered the channel.
    Rejected {
        request_id: Option<String>,
        user_id: String,
        caller_type: CallerType,
        reason: String,
    },
}

/// Receives pipeline events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &PipelineEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn emit(&self, _event: &PipelineEvent) {}
}

// =============================================================================
// Tracing
// =============================================================================

/// Logs events as structured `tracing` records.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::Submitted {
                request_id,
                user_id,
                caller_type,
                queue_size,
                ..
            } => {
                debug!(
                    request_id = %request_id,
                    user_id = %user_id,
                    caller_type = %caller_type,
                    queue_size,
                    "Bill request queued"
                );
            }
            PipelineEvent::Completed {
                request_id,
                caller_type,
                worker,
                queue_wait,
                processing_time,
                error: None,
                ..
            } => {
                info!(
                    request_id = %request_id,
                    caller_type = %caller_type,
                    worker = ?worker,
                    queue_wait_ms = queue_wait.as_millis() as u64,
                    processing_ms = processing_time.as_millis() as u64,
                    "Bill created"
                );
            }
            PipelineEvent::Completed {
                request_id,
                caller_type,
                worker,
                processing_time,
                error: Some(error),
                ..
            } => {
                warn!(
                    request_id = %request_id,
                    caller_type = %caller_type,
                    worker = ?worker,
                    processing_ms = processing_time.as_millis() as u64,
                    error = %error,
                    "Bill request failed"
                );
            }
            PipelineEvent::Rejected {
                request_id,
                user_id,
                caller_type,
                reason,
            } => {
                warn!(
                    request_id = ?request_id,
                    user_id = %user_id,
                    caller_type = %caller_type,
                    reason = %reason,
                    "Bill request rejected"
                );
            }
        }
    }
}

// =============================================================================
// Request Log
// =============================================================================

/// Persists events to the `request_log` table through a
/// [`BackgroundExecutor`]. Best effort: see the executor's docs.
#[derive(Debug, Clone)]
pub struct RequestLogSink {
    db: Database,
    executor: Arc<BackgroundExecutor>,
}

impl RequestLogSink {
    pub fn new(db: Database, executor: Arc<BackgroundExecutor>) -> Self {
        RequestLogSink { db, executor }
    }
}

impl EventSink for RequestLogSink {
    fn emit(&self, event: &PipelineEvent) {
        let log = self.db.request_log();

        match event.clone() {
            PipelineEvent::Submitted {
                request_id,
                user_id,
                caller_type,
                submitted_at,
                ..
            } => {
                self.executor.spawn_detached(async move {
                    if let Err(e) = log
                        .log_request(&request_id, CREATE_BILL, Some(&user_id), Some(caller_type), submitted_at)
                        .await
                    {
                        warn!(request_id = %request_id, error = %e, "Failed to log request");
                    }
                });
            }
            PipelineEvent::Completed {
                request_id,
                user_id,
                caller_type,
                submitted_at,
                queue_wait,
                processing_time,
                error,
                ..
            } => {
                let response_ms = (queue_wait + processing_time).as_millis() as i64;
                self.executor.spawn_detached(async move {
                    // The Submitted insert may not have run yet (or been dropped).
                    let result: DbResult<bool> = async {
                        log.log_request(&request_id, CREATE_BILL, Some(&user_id), Some(caller_type), submitted_at)
                            .await?;
                        match &error {
                            None => log.mark_completed(&request_id, response_ms).await,
                            Some(message) => log.mark_failed(&request_id, response_ms, message).await,
                        }
                    }
                    .await;

                    if let Err(e) = result {
                        warn!(request_id = %request_id, error = %e, "Failed to update request log");
                    }
                });
            }
            PipelineEvent::Rejected {
                request_id: Some(request_id),
                user_id,
                caller_type,
                reason,
            } => {
                self.executor.spawn_detached(async move {
                    let result: DbResult<bool> = async {
                        log.log_request(&request_id, CREATE_BILL, Some(&user_id), Some(caller_type), Utc::now())
                            .await?;
                        log.mark_failed(&request_id, 0, &reason).await
                    }
                    .await;

                    if let Err(e) = result {
                        warn!(request_id = %request_id, error = %e, "Failed to log rejected request");
                    }
                });
            }
            // Rejected before an id was assigned: nothing to key a row on.
            PipelineEvent::Rejected { request_id: None, .. } => {}
        }
    }
}

// =============================================================================
// Fan-out
// =============================================================================

/// Forwards each event to several sinks, in order.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: &PipelineEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}

/// Collects events in memory. Handy in tests and diagnostics.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: std::sync::Mutex<Vec<PipelineEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events
            .lock()
            .map(|e| e.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &PipelineEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_db::{DbConfig, RequestStatus};

    fn completed(id: &str, error: Option<&str>) -> PipelineEvent {
        PipelineEvent::Completed {
            request_id: id.into(),
            user_id: "u1".into(),
            caller_type: CallerType::Cashier,
            submitted_at: Utc::now(),
            worker: Some(0),
            queue_wait: Duration::from_millis(5),
            processing_time: Duration::from_millis(20),
            error: error.map(String::from),
        }
    }

    #[test]
    fn test_fanout_reaches_every_sink() {
        let a = Arc::new(RecordingSink::default());
        let b = Arc::new(RecordingSink::default());
        let fanout = FanoutSink::new()
            .with(a.clone())
            .with(b.clone())
            .with(Arc::new(TracingEventSink));

        fanout.emit(&completed("r1", None));
        assert_eq!(a.events().len(), 1);
        assert_eq!(b.events(), a.events());
    }

    #[tokio::test]
    async fn test_request_log_sink_writes_rows() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let executor = Arc::new(BackgroundExecutor::new(1, 16));
        let sink = RequestLogSink::new(db.clone(), executor.clone());

        sink.emit(&completed("ok-1", None));
        sink.emit(&completed("bad-1", Some("Insufficient stock")));
        sink.emit(&PipelineEvent::Rejected {
            request_id: Some("int-1".into()),
            user_id: "u2".into(),
            caller_type: CallerType::Customer,
            reason: "submission interrupted".into(),
        });

        executor.shutdown(Duration::from_secs(5)).await;

        let log = db.request_log();
        assert_eq!(log.count_by_status(RequestStatus::Completed).await.unwrap(), 1);
        assert_eq!(log.count_by_status(RequestStatus::Failed).await.unwrap(), 2);
        let stats = log.stats_since(chrono::Duration::hours(1)).await.unwrap();
        assert_eq!(stats.max_response_ms, Some(25));
    }
}
