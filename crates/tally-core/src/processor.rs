//! # Bill Processor Port
//!
//! The business operation the queue workers drive. The queue knows nothing
//! about products or stock: it hands a request to a `BillProcessor` and
//! records whatever comes back.
//!
//! ```text
//! worker N ──► Box<dyn BillProcessor> ──► create_bill(request, user, caller)
//!                     ▲                           │
//!                     │                           ▼
//!        ProcessorFactory::create(N)       Ok(Bill) / Err(BillError)
//! ```
//!
//! Every worker gets its own processor from the factory, so implementations
//! may hold per-worker state (`&mut self`) without locking.

use async_trait::async_trait;

use crate::error::BillError;
use crate::types::{Bill, BillRequest, CallerType};

/// Creates a bill from a request.
///
/// Business failures (validation, stock, payment) and persistence failures
/// are both returned as `BillError`; the caller treats them the same way.
#[async_trait]
pub trait BillProcessor: Send {
    async fn create_bill(
        &mut self,
        request: &BillRequest,
        user_id: &str,
        caller_type: CallerType,
    ) -> Result<Bill, BillError>;
}

/// Builds one processor per worker.
pub trait ProcessorFactory: Send + Sync {
    fn create(&self, worker_index: usize) -> Box<dyn BillProcessor>;
}

impl<F> ProcessorFactory for F
where
    F: Fn(usize) -> Box<dyn BillProcessor> + Send + Sync,
{
    fn create(&self, worker_index: usize) -> Box<dyn BillProcessor> {
        self(worker_index)
    }
}
