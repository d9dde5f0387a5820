//! # Work Items and Tickets
//!
//! A [`WorkItem`] is what travels through the channel; a [`BillTicket`] is
//! what the submitter keeps. They share one single-assignment result slot.
//!
//! ```text
//!   submit()                                   worker
//!      │                                          │
//!      ├── WorkItem ──────► channel ─────────────►│ create_bill(...)
//!      │     (slot writer)                        │
//!      │                                          ▼
//!      └── BillTicket ◄──────── resolve(outcome) exactly once
//!            (slot reader, cloneable)
//! ```
//!
//! The writer side is consumed by [`WorkItem::resolve`], so a slot cannot
//! be written twice. If a work item is dropped unresolved, every reader
//! sees a Failure instead of waiting forever.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

use tally_core::{Bill, BillRequest, CallerType};

pub const ABANDONED_MESSAGE: &str = "request abandoned before processing";

// =============================================================================
// Outcome
// =============================================================================

/// Result of one bill request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BillOutcome {
    Success {
        bill: Bill,
        #[serde(rename = "elapsed_ms", with = "millis")]
        elapsed: Duration,
    },
    Failure {
        message: String,
        #[serde(rename = "elapsed_ms", with = "millis")]
        elapsed: Duration,
    },
}

impl BillOutcome {
    pub fn failure(message: impl Into<String>, elapsed: Duration) -> Self {
        BillOutcome::Failure {
            message: message.into(),
            elapsed,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BillOutcome::Success { .. })
    }

    /// Processing time (or time until failure was decided).
    pub fn elapsed(&self) -> Duration {
        match self {
            BillOutcome::Success { elapsed, .. } | BillOutcome::Failure { elapsed, .. } => *elapsed,
        }
    }

    pub fn bill(&self) -> Option<&Bill> {
        match self {
            BillOutcome::Success { bill, .. } => Some(bill),
            BillOutcome::Failure { .. } => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            BillOutcome::Success { .. } => None,
            BillOutcome::Failure { message, .. } => Some(message),
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

// =============================================================================
// Work Item
// =============================================================================

/// One queued bill request plus the writer half of its result slot.
#[derive(Debug)]
pub struct WorkItem {
    pub id: String,
    pub request: BillRequest,
    pub user_id: String,
    pub caller_type: CallerType,
    pub created_at: DateTime<Utc>,
    pub enqueued_at: Instant,
    slot: watch::Sender<Option<BillOutcome>>,
}

impl WorkItem {
    /// Creates a work item and the ticket that observes it.
    pub fn new(
        request: BillRequest,
        user_id: impl Into<String>,
        caller_type: CallerType,
    ) -> (WorkItem, BillTicket) {
        let id = Uuid::new_v4().to_string();
        let enqueued_at = Instant::now();
        let (slot, rx) = watch::channel(None);

        let ticket = BillTicket {
            request_id: id.clone(),
            caller_type,
            submitted_at: enqueued_at,
            rx,
        };

        let item = WorkItem {
            id,
            request,
            user_id: user_id.into(),
            caller_type,
            created_at: Utc::now(),
            enqueued_at,
            slot,
        };

        (item, ticket)
    }

    /// Time spent waiting since creation.
    pub fn queue_wait(&self) -> Duration {
        self.enqueued_at.elapsed()
    }

    /// Completes the result slot. Consumes the item.
    pub fn resolve(self, outcome: BillOutcome) {
        self.slot.send_replace(Some(outcome));
    }
}

// =============================================================================
// Ticket
// =============================================================================

/// Handle to the eventual [`BillOutcome`] of a submitted request.
///
/// Cheap to clone; every clone observes the same slot.
#[derive(Debug, Clone)]
pub struct BillTicket {
    request_id: String,
    caller_type: CallerType,
    submitted_at: Instant,
    rx: watch::Receiver<Option<BillOutcome>>,
}

impl BillTicket {
    /// A ticket that is already resolved, for submissions that never
    /// reached the channel.
    pub fn resolved(request_id: impl Into<String>, caller_type: CallerType, outcome: BillOutcome) -> Self {
        let (_slot, rx) = watch::channel(Some(outcome));
        BillTicket {
            request_id: request_id.into(),
            caller_type,
            submitted_at: Instant::now(),
            rx,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn caller_type(&self) -> CallerType {
        self.caller_type
    }

    /// Non-blocking read. `None` while the request is still pending.
    pub fn poll(&self) -> Option<BillOutcome> {
        if let Some(outcome) = self.rx.borrow().as_ref() {
            return Some(outcome.clone());
        }
        // has_changed errors only once the writer is gone.
        match self.rx.has_changed() {
            Err(_) => Some(self.abandoned()),
            Ok(_) => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.poll().is_some()
    }

    /// Waits for the outcome.
    pub async fn wait(&self) -> BillOutcome {
        let mut rx = self.rx.clone();
        let resolved = match rx.wait_for(Option::is_some).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        };
        resolved.unwrap_or_else(|| self.abandoned())
    }

    /// Waits at most `limit`. `None` means the request is still pending;
    /// it keeps running and the ticket can be waited on again.
    pub async fn wait_timeout(&self, limit: Duration) -> Option<BillOutcome> {
        tokio::time::timeout(limit, self.wait()).await.ok()
    }

    fn abandoned(&self) -> BillOutcome {
        BillOutcome::failure(ABANDONED_MESSAGE, self.submitted_at.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::{BillLineRequest, PaymentMethod, SalesChannel};

    fn request() -> BillRequest {
        BillRequest::new(
            SalesChannel::InStore,
            PaymentMethod::Card,
            vec![BillLineRequest::new("A", 1)],
        )
    }

    #[tokio::test]
    async fn test_resolve_is_seen_by_every_observer() {
        let (item, ticket) = WorkItem::new(request(), "u1", CallerType::Cashier);
        let other = ticket.clone();
        assert_eq!(item.id, ticket.request_id());
        assert!(ticket.poll().is_none());

        let waiter = tokio::spawn(async move { other.wait().await });
        item.resolve(BillOutcome::failure("out of stock", Duration::from_millis(3)));

        let seen = waiter.await.unwrap();
        assert_eq!(seen.error_message(), Some("out of stock"));
        assert_eq!(ticket.poll(), Some(seen.clone()));
        assert_eq!(ticket.wait().await, seen);
    }

    #[tokio::test]
    async fn test_dropped_item_reports_abandoned() {
        let (item, ticket) = WorkItem::new(request(), "u1", CallerType::Customer);
        drop(item);

        assert_eq!(ticket.poll().unwrap().error_message(), Some(ABANDONED_MESSAGE));
        assert_eq!(ticket.wait().await.error_message(), Some(ABANDONED_MESSAGE));
    }

    #[tokio::test]
    async fn test_wait_timeout_leaves_ticket_pending() {
        let (item, ticket) = WorkItem::new(request(), "u1", CallerType::Cashier);

        assert!(ticket.wait_timeout(Duration::from_millis(20)).await.is_none());
        assert!(!ticket.is_done());

        item.resolve(BillOutcome::failure("late", Duration::ZERO));
        assert!(ticket.wait_timeout(Duration::from_millis(20)).await.is_some());
    }

    #[test]
    fn test_pre_resolved_ticket() {
        let ticket = BillTicket::resolved(
            "r-1",
            CallerType::Cashier,
            BillOutcome::failure("submission interrupted", Duration::ZERO),
        );
        assert!(ticket.is_done());
        assert_eq!(ticket.poll().unwrap().error_message(), Some("submission interrupted"));
    }

    #[test]
    fn test_outcome_json_shape() {
        let outcome = BillOutcome::failure("nope", Duration::from_millis(12));
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "failure");
        assert_eq!(json["elapsed_ms"], 12);
        assert_eq!(json["message"], "nope");
    }
}
