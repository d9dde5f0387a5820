//! # SQLite Bill Processor
//!
//! The `BillProcessor` the queue workers run in production: validate the
//! request, then hand it to [`BillRepository::create_bill`].
//!
//! ```rust,ignore
//! let db = Database::new(DbConfig::new("tally.db")).await?;
//! let service = BillQueueService::start(config, sqlite_processor_factory(db), events);
//! ```

use async_trait::async_trait;
use tracing::debug;

use crate::pool::Database;
use crate::repository::bill::BillRepository;
use tally_core::{Bill, BillError, BillProcessor, BillRequest, CallerType, ProcessorFactory};

/// Creates bills against SQLite.
///
/// One instance per worker; all instances share the database pool.
#[derive(Debug, Clone)]
pub struct SqliteBillProcessor {
    bills: BillRepository,
}

impl SqliteBillProcessor {
    pub fn new(db: &Database) -> Self {
        SqliteBillProcessor { bills: db.bills() }
    }
}

#[async_trait]
impl BillProcessor for SqliteBillProcessor {
    async fn create_bill(
        &mut self,
        request: &BillRequest,
        user_id: &str,
        caller_type: CallerType,
    ) -> Result<Bill, BillError> {
        request.validate()?;

        let bill = self.bills.create_bill(request, user_id, caller_type).await?;

        debug!(
            bill_number = %bill.bill_number,
            user_id = %user_id,
            caller_type = %caller_type,
            total_cents = bill.total_cents,
            "Bill created"
        );

        Ok(bill)
    }
}

/// Factory giving every worker its own `SqliteBillProcessor` over `db`.
pub fn sqlite_processor_factory(db: Database) -> impl ProcessorFactory {
    move |_worker: usize| -> Box<dyn BillProcessor> { Box::new(SqliteBillProcessor::new(&db)) }
}
