//! # bill-load
//!
//! Drives the bill queue against a real SQLite database: seeds a small
//! catalogue, starts the service, and lets a crowd of cashiers and online
//! customers hammer it until they are done or Ctrl-C arrives.
//!
//! ```text
//! bill-load [cashiers] [customers] [bills_per_caller]
//!
//! TALLY_DB_PATH        database file        (default ./tally-load.db)
//! TALLY_QUEUE_CAPACITY channel capacity     (default 1000)
//! TALLY_WORKER_COUNT   workers              (default 20)
//! RUST_LOG             log filter           (default info,tally=debug,sqlx=warn)
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

use tally_core::{
    BillLineRequest, BillRequest, CallerType, DeliveryAddress, PaymentMethod, SalesChannel,
};
use tally_db::{sqlite_processor_factory, Database, DbConfig, DbError};
use tally_queue::{
    BackgroundExecutor, BillQueueService, BillSubmitter, FanoutSink, QueueConfig,
    RequestLogSink, SubmissionResponse, TracingEventSink,
};

/// (sku, name, unit price in cents, shelf stock, website stock)
const CATALOGUE: &[(&str, &str, i64, i64, i64)] = &[
    ("COKE-330", "Coca-Cola 330ml", 150, 500, 300),
    ("BREAD-WHT", "White Bread Loaf", 220, 200, 100),
    ("MILK-1L", "Full Cream Milk 1L", 180, 300, 150),
    ("RICE-5KG", "Basmati Rice 5kg", 1250, 80, 40),
    ("SOAP-BAR", "Bath Soap Bar", 95, 400, 250),
];

#[derive(Debug, Default)]
struct Tally {
    created: AtomicU64,
    rejected: AtomicU64,
    processing: AtomicU64,
    unavailable: AtomicU64,
}

impl Tally {
    fn record(&self, response: &SubmissionResponse) {
        let counter = match response {
            SubmissionResponse::Created { .. } => &self.created,
            SubmissionResponse::Rejected { .. } => &self.rejected,
            SubmissionResponse::Processing { .. } => &self.processing,
            SubmissionResponse::Unavailable { .. } => &self.unavailable,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let mut args = std::env::args().skip(1);
    let cashiers = parse_arg(args.next(), 8)?;
    let customers = parse_arg(args.next(), 8)?;
    let bills_per_caller = parse_arg(args.next(), 25)?;

    let queue_config = QueueConfig::from_env()?;
    let db = Database::new(DbConfig::from_env("tally-load.db")).await?;
    seed_catalogue(&db).await?;

    let executor = Arc::new(BackgroundExecutor::new(
        queue_config.background_workers,
        queue_config.background_backlog,
    ));
    let events = FanoutSink::new()
        .with(Arc::new(TracingEventSink))
        .with(Arc::new(RequestLogSink::new(db.clone(), executor.clone())));

    let service = BillQueueService::start(
        queue_config.clone(),
        sqlite_processor_factory(db.clone()),
        Arc::new(events),
    )?;
    let submitter = BillSubmitter::new(service.clone());

    info!(cashiers, customers, bills_per_caller, "Starting load");
    let started = Instant::now();
    let tally = Arc::new(Tally::default());

    let mut callers = Vec::new();
    for (caller_type, count) in [(CallerType::Cashier, cashiers), (CallerType::Customer, customers)] {
        for n in 0..count {
            let submitter = submitter.clone();
            let tally = tally.clone();
            let user_id = format!("{}-{n}", caller_type.as_str().to_lowercase());

            callers.push(tokio::spawn(async move {
                for i in 0..bills_per_caller {
                    let request = sample_request(caller_type, n + i);
                    let response = submitter.submit_and_wait(request, &user_id, caller_type).await;
                    tally.record(&response);
                    if matches!(response, SubmissionResponse::Unavailable { .. }) {
                        break;
                    }
                }
            }));
        }
    }

    tokio::select! {
        _ = futures::future::join_all(callers) => {
            info!("All callers finished");
        }
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "Failed to listen for Ctrl-C");
            }
            info!("Ctrl-C received, stopping");
        }
    }

    service.shutdown().await;
    executor.shutdown(queue_config.shutdown_grace()).await;

    let stats = service.stats();
    let elapsed = started.elapsed();
    println!();
    println!("Finished in {:.2}s", elapsed.as_secs_f64());
    println!(
        "  responses: created {}, rejected {}, processing {}, unavailable {}",
        tally.created.load(Ordering::Relaxed),
        tally.rejected.load(Ordering::Relaxed),
        tally.processing.load(Ordering::Relaxed),
        tally.unavailable.load(Ordering::Relaxed),
    );
    println!(
        "  queue:     submitted {}, completed {}, failed {}",
        stats.submitted, stats.completed, stats.failed
    );
    println!("  bills/s:   {:.1}", stats.completed as f64 / elapsed.as_secs_f64().max(0.001));

    let log_stats = db.request_log().stats_since(chrono::Duration::hours(1)).await?;
    println!(
        "  request log: total {}, completed {}, failed {}, avg {:.1}ms, max {}ms",
        log_stats.total,
        log_stats.completed,
        log_stats.failed,
        log_stats.avg_response_ms.unwrap_or_default(),
        log_stats.max_response_ms.unwrap_or_default(),
    );
    println!("  dropped log writes: {}", executor.dropped());

    for (sku, ..) in CATALOGUE {
        let levels = db.products().stock_levels(sku).await?;
        println!(
            "  {sku:<10} shelf {:>4}  website {:>4}",
            levels.shelf_stock, levels.website_stock
        );
    }

    db.close().await;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tally=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::TRACE)
        .init();
}

fn parse_arg(arg: Option<String>, default: usize) -> Result<usize, Box<dyn std::error::Error>> {
    match arg {
        Some(raw) => Ok(raw.parse().map_err(|_| format!("expected a number, got '{raw}'"))?),
        None => Ok(default),
    }
}

/// Creates the catalogue, or tops stock back up if it already exists.
async fn seed_catalogue(db: &Database) -> Result<(), DbError> {
    let products = db.products();

    for &(sku, name, price, shelf, website) in CATALOGUE {
        match products.create(sku, name, price, shelf, website).await {
            Ok(_) => {}
            Err(DbError::UniqueViolation { .. }) => {
                products.restock(sku, SalesChannel::InStore, shelf).await?;
                products.restock(sku, SalesChannel::Online, website).await?;
            }
            Err(e) => return Err(e),
        }
    }

    info!(products = CATALOGUE.len(), "Catalogue seeded");
    Ok(())
}

fn sample_request(caller_type: CallerType, seed: usize) -> BillRequest {
    let first = CATALOGUE[seed % CATALOGUE.len()];
    let second = CATALOGUE[(seed + 2) % CATALOGUE.len()];
    let items = vec![
        BillLineRequest::new(first.0, 1 + (seed % 3) as i64),
        BillLineRequest::new(second.0, 1),
    ];

    match caller_type {
        CallerType::Cashier if seed % 2 == 0 => {
            BillRequest::new(SalesChannel::InStore, PaymentMethod::Cash, items).with_amount_paid(10_000)
        }
        CallerType::Cashier => BillRequest::new(SalesChannel::InStore, PaymentMethod::Card, items),
        CallerType::Customer => BillRequest::new(SalesChannel::Online, PaymentMethod::Online, items)
            .with_delivery(DeliveryAddress {
                street: format!("{} Main Road", 10 + seed),
                city: "Lahore".into(),
                postal_code: "54000".into(),
                phone: None,
            }),
    }
}
