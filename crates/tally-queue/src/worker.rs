//! # Worker
//!
//! One task draining the channel.
//!
//! ## Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  loop                                                                   │
//! │   ├── take (waits while empty) ◄── shutdown token: exit, claim nothing  │
//! │   ├── start = now                                                      │
//! │   ├── processor.create_bill(request, user, caller)                     │
//! │   │     ├── Ok(bill)  → Success { bill, elapsed }                      │
//! │   │     ├── Err(e)    → Failure { e.to_string(), elapsed }             │
//! │   │     └── panic     → Failure { "bill processing panicked: …" }      │
//! │   └── resolve the item's slot, emit Completed, go again                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Processing is never raced against shutdown: an item that has been taken
//! is always resolved by the worker that took it.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use tally_core::{BillProcessor, ProcessorFactory};

use crate::channel::BillChannel;
use crate::error::ChannelError;
use crate::events::{EventSink, PipelineEvent};
use crate::item::{BillOutcome, WorkItem};

/// Load counters shared by the service and its workers.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub submitted: AtomicU64,
    pub completed: AtomicU64,
    pub failed: AtomicU64,
}

impl Counters {
    pub fn record(&self, outcome: &BillOutcome) {
        if outcome.is_success() {
            self.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

pub(crate) struct Worker {
    pub index: usize,
    pub channel: Arc<BillChannel>,
    pub factory: Arc<dyn ProcessorFactory>,
    pub shutdown: CancellationToken,
    pub events: Arc<dyn EventSink>,
    pub counters: Arc<Counters>,
}

impl Worker {
    pub async fn run(self) {
        let mut processor = self.factory.create(self.index);
        info!(worker = self.index, "Bill worker started");

        loop {
            let item = match self.channel.take_cancellable(&self.shutdown).await {
                Ok(item) => item,
                Err(ChannelError::Interrupted) | Err(ChannelError::Closed) => break,
            };

            let panicked = self.process(processor.as_mut(), item).await;
            if panicked {
                // State inside a processor that unwound mid-call is suspect.
                processor = self.factory.create(self.index);
            }
        }

        info!(worker = self.index, "Bill worker stopped");
    }

    /// Processes one item. Returns true if the processor panicked.
    async fn process(&self, processor: &mut dyn BillProcessor, item: WorkItem) -> bool {
        let started = Instant::now();
        let queue_wait = started.duration_since(item.enqueued_at);

        debug!(
            worker = self.index,
            request_id = %item.id,
            caller_type = %item.caller_type,
            queue_wait_ms = queue_wait.as_millis() as u64,
            "Processing bill request"
        );

        let result = AssertUnwindSafe(processor.create_bill(
            &item.request,
            &item.user_id,
            item.caller_type,
        ))
        .catch_unwind()
        .await;

        let elapsed = started.elapsed();
        let panicked = result.is_err();

        let outcome = match result {
            Ok(Ok(bill)) => BillOutcome::Success { bill, elapsed },
            Ok(Err(e)) => BillOutcome::failure(e.to_string(), elapsed),
            Err(panic) => {
                let message = panic_message(&panic);
                error!(worker = self.index, request_id = %item.id, panic = %message, "Bill processor panicked");
                BillOutcome::failure(format!("bill processing panicked: {message}"), elapsed)
            }
        };

        self.counters.record(&outcome);

        let event = PipelineEvent::Completed {
            request_id: item.id.clone(),
            user_id: item.user_id.clone(),
            caller_type: item.caller_type,
            submitted_at: item.created_at,
            worker: Some(self.index),
            queue_wait,
            processing_time: elapsed,
            error: outcome.error_message().map(str::to_string),
        };

        item.resolve(outcome);
        self.events.emit(&event);

        panicked
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
