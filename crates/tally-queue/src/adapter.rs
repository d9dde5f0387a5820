//! # Caller Adapter
//!
//! What an HTTP handler calls: submit, wait with a deadline, and turn the
//! result into a response shape.
//!
//! ```text
//! submit_and_wait
//!   ├── ServiceStopped        → Unavailable  (503)
//!   ├── Success within limit  → Created      (201)
//!   ├── Failure within limit  → Rejected     (400)
//!   └── limit elapsed         → Processing   (202)  work keeps running
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use tally_core::{Bill, BillRequest, CallerType};

use crate::item::BillOutcome;
use crate::service::BillQueueService;

/// Result of one submission as seen by the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmissionResponse {
    Created {
        request_id: String,
        bill: Bill,
        processing_ms: u64,
    },
    Rejected {
        request_id: String,
        message: String,
    },
    /// The caller stopped waiting. The request is still queued or running
    /// and can be looked up by id later.
    Processing {
        request_id: String,
    },
    Unavailable {
        message: String,
    },
}

impl SubmissionResponse {
    /// HTTP status code for this response.
    pub fn status_code(&self) -> u16 {
        match self {
            SubmissionResponse::Created { .. } => 201,
            SubmissionResponse::Rejected { .. } => 400,
            SubmissionResponse::Processing { .. } => 202,
            SubmissionResponse::Unavailable { .. } => 503,
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        match self {
            SubmissionResponse::Created { request_id, .. }
            | SubmissionResponse::Rejected { request_id, .. }
            | SubmissionResponse::Processing { request_id } => Some(request_id),
            SubmissionResponse::Unavailable { .. } => None,
        }
    }
}

/// Submits bills and waits for them on behalf of a caller.
#[derive(Debug, Clone)]
pub struct BillSubmitter {
    service: Arc<BillQueueService>,
    timeout: Duration,
}

impl BillSubmitter {
    /// Uses the service's configured caller timeout.
    pub fn new(service: Arc<BillQueueService>) -> Self {
        let timeout = service.config().caller_timeout();
        BillSubmitter { service, timeout }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn submit_and_wait(
        &self,
        request: BillRequest,
        user_id: &str,
        caller_type: CallerType,
    ) -> SubmissionResponse {
        let ticket = match self.service.submit(request, user_id, caller_type).await {
            Ok(ticket) => ticket,
            Err(e) => {
                return SubmissionResponse::Unavailable {
                    message: e.to_string(),
                }
            }
        };

        let request_id = ticket.request_id().to_string();

        match ticket.wait_timeout(self.timeout).await {
            Some(BillOutcome::Success { bill, elapsed }) => SubmissionResponse::Created {
                request_id,
                bill,
                processing_ms: elapsed.as_millis() as u64,
            },
            Some(BillOutcome::Failure { message, .. }) => {
                SubmissionResponse::Rejected { request_id, message }
            }
            None => {
                warn!(
                    request_id = %request_id,
                    caller_type = %caller_type,
                    timeout_secs = self.timeout.as_secs(),
                    "Bill request still processing after caller timeout"
                );
                SubmissionResponse::Processing { request_id }
            }
        }
    }
}
