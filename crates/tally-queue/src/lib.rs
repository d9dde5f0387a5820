//! # tally-queue: Bill Submission Pipeline
//!
//! Cashiers at the till and customers on the storefront both create bills.
//! Instead of running bill creation inline on whatever task received the
//! request, requests go into one bounded FIFO channel and a fixed pool of
//! workers drains it. Each submitter gets a ticket back immediately.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Bill Queue Service                               │
//! │                                                                         │
//! │   cashier ─┐                                                            │
//! │   customer ┼─ submit ─► ┌───────────────────────┐ ─ take ─► worker 0    │
//! │   cashier ─┘     │      │ BillChannel (bounded) │           worker 1    │
//! │                  │      └───────────────────────┘             ...       │
//! │                  │                                          worker N-1  │
//! │                  ▼                                              │       │
//! │             BillTicket ◄──────── resolve exactly once ──────────┘       │
//! │                                                                         │
//! │   events: Submitted / Completed / Rejected ──► EventSink                │
//! │                                         ├──► TracingEventSink           │
//! │                                         └──► RequestLogSink (background)│
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Guarantees
//! - Requests leave the channel in arrival order, whoever sent them.
//! - Producers wait when the channel is full; nothing is rejected for load.
//! - Every ticket resolves exactly once, including across shutdown.
//! - A failing or panicking bill never takes a worker down.
//!
//! ## Module Organization
//! - [`channel`] - Bounded FIFO with cancellable put/take
//! - [`item`] - Work items, tickets, outcomes
//! - [`service`] - `BillQueueService` lifecycle, submit, stats
//! - [`adapter`] - Submit-and-wait for HTTP handlers
//! - [`events`] - Pipeline events and sinks
//! - [`background`] - Best-effort executor for request logging
//! - [`config`] - Queue configuration
//! - [`error`] - Queue error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tally_db::{sqlite_processor_factory, Database, DbConfig};
//! use tally_queue::{BillQueueService, BillSubmitter, QueueConfig, TracingEventSink};
//!
//! let db = Database::new(DbConfig::from_env("tally.db")).await?;
//! let service = BillQueueService::start(
//!     QueueConfig::from_env()?,
//!     sqlite_processor_factory(db),
//!     Arc::new(TracingEventSink),
//! )?;
//!
//! let response = BillSubmitter::new(service.clone())
//!     .submit_and_wait(request, "cashier-7", CallerType::Cashier)
//!     .await;
//!
//! service.shutdown().await;
//! ```

pub mod adapter;
pub mod background;
pub mod channel;
pub mod config;
pub mod error;
pub mod events;
pub mod item;
pub mod service;
mod worker;

// =============================================================================
// Re-exports
// =============================================================================

pub use adapter::{BillSubmitter, SubmissionResponse};
pub use background::BackgroundExecutor;
pub use channel::{BillChannel, BoundedChannel};
pub use config::QueueConfig;
pub use error::{ChannelError, ConfigError, PutError, QueueError, QueueResult};
pub use events::{
    EventSink, FanoutSink, NoOpSink, PipelineEvent, RecordingSink, RequestLogSink,
    TracingEventSink,
};
pub use item::{BillOutcome, BillTicket, WorkItem};
pub use service::{BillQueueService, LoadLevel, QueueStats};
