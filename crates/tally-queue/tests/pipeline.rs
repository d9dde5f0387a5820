//! End-to-end behaviour of the bill queue: ordering, backpressure,
//! failure isolation, shutdown, and the SQLite processor under contention.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::time::timeout;

use tally_core::{
    Bill, BillError, BillLineRequest, BillProcessor, BillRequest, CallerType, DeliveryAddress,
    PaymentMethod, SalesChannel,
};
use tally_db::{sqlite_processor_factory, Database, DbConfig, RequestStatus};
use tally_queue::{
    BackgroundExecutor, BillOutcome, BillQueueService, FanoutSink, NoOpSink, PipelineEvent,
    QueueConfig, QueueError, RecordingSink, RequestLogSink,
};

// =============================================================================
// Test processors
// =============================================================================

/// Records the SKU of every request it sees, in processing order.
///
/// SKU "BAD" fails, "PANIC" panics, "SLOW" sleeps 100ms, and when a gate is
/// set every call first waits for a permit from it.
#[derive(Clone, Default)]
struct Scripted {
    seen: Arc<Mutex<Vec<String>>>,
    created: Arc<Mutex<Vec<usize>>>,
    gate: Option<Arc<Semaphore>>,
}

impl Scripted {
    fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let scripted = Scripted {
            gate: Some(gate.clone()),
            ..Scripted::default()
        };
        (scripted, gate)
    }

    fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }

    fn start(&self, config: QueueConfig) -> Arc<BillQueueService> {
        self.start_with_events(config, Arc::new(NoOpSink))
    }

    fn start_with_events(
        &self,
        config: QueueConfig,
        events: Arc<dyn tally_queue::EventSink>,
    ) -> Arc<BillQueueService> {
        let template = self.clone();
        BillQueueService::start(
            config,
            move |index: usize| {
                template.created.lock().unwrap().push(index);
                Box::new(template.clone()) as Box<dyn BillProcessor>
            },
            events,
        )
        .unwrap()
    }
}

#[async_trait]
impl BillProcessor for Scripted {
    async fn create_bill(
        &mut self,
        request: &BillRequest,
        user_id: &str,
        caller_type: CallerType,
    ) -> Result<Bill, BillError> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        let sku = request.items[0].sku.clone();
        self.seen.lock().unwrap().push(sku.clone());

        match sku.as_str() {
            "BAD" => return Err(BillError::ProductNotFound(sku)),
            "PANIC" => panic!("printer on fire"),
            "SLOW" => tokio::time::sleep(Duration::from_millis(100)).await,
            _ => {}
        }

        Ok(bill_for(request, user_id, caller_type))
    }
}

fn bill_for(request: &BillRequest, user_id: &str, caller_type: CallerType) -> Bill {
    Bill {
        id: uuid::Uuid::new_v4().to_string(),
        bill_number: "BILL-TEST".into(),
        user_id: user_id.into(),
        caller_type,
        channel: request.channel,
        payment_method: request.payment_method,
        subtotal_cents: 0,
        discount_cents: 0,
        total_cents: 0,
        amount_paid_cents: 0,
        change_cents: 0,
        tracking_number: None,
        lines: Vec::new(),
        created_at: Utc::now(),
    }
}

fn request(sku: &str) -> BillRequest {
    BillRequest::new(
        SalesChannel::InStore,
        PaymentMethod::Card,
        vec![BillLineRequest::new(sku, 1)],
    )
}

fn online_request(sku: &str, quantity: i64) -> BillRequest {
    BillRequest::new(
        SalesChannel::Online,
        PaymentMethod::Online,
        vec![BillLineRequest::new(sku, quantity)],
    )
    .with_delivery(DeliveryAddress {
        street: "12 Canal View".into(),
        city: "Lahore".into(),
        postal_code: "54000".into(),
        phone: None,
    })
}

const WAIT: Duration = Duration::from_secs(5);

// =============================================================================
// Ordering
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_interleaved_callers_are_served_in_arrival_order() {
    let processor = Scripted::default();
    let service = processor.start(QueueConfig::default().worker_count(1).queue_capacity(32));

    let mut tickets = Vec::new();
    let mut expected = Vec::new();
    for i in 0..20 {
        let caller = if i % 2 == 0 { CallerType::Cashier } else { CallerType::Customer };
        let sku = format!("SKU-{i:02}");
        tickets.push(service.submit(request(&sku), "u", caller).await.unwrap());
        expected.push(sku);
    }

    for ticket in &tickets {
        assert!(timeout(WAIT, ticket.wait()).await.unwrap().is_success());
    }

    assert_eq!(processor.seen(), expected);
    service.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_slow_head_scenario() {
    let processor = Scripted::default();
    let service = processor.start(QueueConfig::default().worker_count(1).queue_capacity(2));

    let a = service.submit(request("SLOW"), "cashier", CallerType::Cashier).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let b = service.submit(request("B"), "customer", CallerType::Customer).await.unwrap();
    let c = service.submit(request("C"), "cashier", CallerType::Cashier).await.unwrap();

    // A is in the worker's hands; B and C fill the channel.
    assert_eq!(service.stats().queue_size, 2);

    for ticket in [&a, &b, &c] {
        assert!(timeout(WAIT, ticket.wait()).await.unwrap().is_success());
    }
    assert_eq!(processor.seen(), vec!["SLOW", "B", "C"]);
    assert_eq!(service.stats().queue_size, 0);
    assert!(a.poll().unwrap().elapsed() >= Duration::from_millis(100));

    service.shutdown().await;
}

// =============================================================================
// Backpressure
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_full_channel_makes_producers_wait() {
    let (processor, gate) = Scripted::gated();
    let service = processor.start(QueueConfig::default().worker_count(1).queue_capacity(2));

    let held = service.submit(request("A"), "u", CallerType::Cashier).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    service.submit(request("B"), "u", CallerType::Cashier).await.unwrap();
    service.submit(request("C"), "u", CallerType::Customer).await.unwrap();
    assert_eq!(service.stats().remaining_capacity, 0);

    let producer = {
        let service = service.clone();
        tokio::spawn(async move { service.submit(request("D"), "u", CallerType::Customer).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!producer.is_finished(), "producer should wait for space");

    gate.add_permits(1);
    assert!(timeout(WAIT, held.wait()).await.unwrap().is_success());

    let d = timeout(WAIT, producer).await.unwrap().unwrap().unwrap();
    gate.add_permits(3);
    assert!(timeout(WAIT, d.wait()).await.unwrap().is_success());
    assert_eq!(processor.seen(), vec!["A", "B", "C", "D"]);

    service.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_abandoned_submit_is_not_counted() {
    let (processor, gate) = Scripted::gated();
    let service = processor.start(QueueConfig::default().worker_count(1).queue_capacity(1));

    let a = service.submit(request("A"), "u", CallerType::Cashier).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let b = service.submit(request("B"), "u", CallerType::Cashier).await.unwrap();

    // The caller gives up while waiting for space; the future is dropped.
    let gave_up = timeout(
        Duration::from_millis(50),
        service.submit(request("C"), "u", CallerType::Customer),
    )
    .await;
    assert!(gave_up.is_err());
    assert_eq!(service.stats().submitted, 2);

    gate.add_permits(2);
    assert!(timeout(WAIT, a.wait()).await.unwrap().is_success());
    assert!(timeout(WAIT, b.wait()).await.unwrap().is_success());
    service.shutdown().await;

    let stats = service.stats();
    assert_eq!((stats.submitted, stats.completed, stats.failed), (2, 2, 0));
    assert_eq!(stats.pending(), 0);
    assert_eq!(processor.seen(), vec!["A", "B"]);
}

// =============================================================================
// Failure isolation
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failure_does_not_affect_neighbours() {
    let processor = Scripted::default();
    let service = processor.start(QueueConfig::default().worker_count(1).queue_capacity(8));

    let before = service.submit(request("OK-1"), "u", CallerType::Cashier).await.unwrap();
    let bad = service.submit(request("BAD"), "u", CallerType::Cashier).await.unwrap();
    let after = service.submit(request("OK-2"), "u", CallerType::Cashier).await.unwrap();

    assert!(timeout(WAIT, before.wait()).await.unwrap().is_success());
    assert_eq!(
        timeout(WAIT, bad.wait()).await.unwrap().error_message(),
        Some("Product not found: BAD")
    );
    assert!(timeout(WAIT, after.wait()).await.unwrap().is_success());

    service.shutdown().await;
    let stats = service.stats();
    assert_eq!((stats.completed, stats.failed), (2, 1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_panic_becomes_failure_and_worker_survives() {
    let processor = Scripted::default();
    let events = Arc::new(RecordingSink::default());
    let service = processor.start_with_events(
        QueueConfig::default().worker_count(1).queue_capacity(8),
        events.clone(),
    );

    let boom = service.submit(request("PANIC"), "u", CallerType::Customer).await.unwrap();
    let next = service.submit(request("OK"), "u", CallerType::Customer).await.unwrap();

    let outcome = timeout(WAIT, boom.wait()).await.unwrap();
    assert_eq!(
        outcome.error_message(),
        Some("bill processing panicked: printer on fire")
    );
    assert!(timeout(WAIT, next.wait()).await.unwrap().is_success());

    // The processor that panicked was replaced.
    assert_eq!(*processor.created.lock().unwrap(), vec![0, 0]);

    service.shutdown().await;
    let completed = events
        .events()
        .into_iter()
        .filter(|e| matches!(e, PipelineEvent::Completed { .. }))
        .count();
    assert_eq!(completed, 2);
}

// =============================================================================
// Shutdown
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown_resolves_every_ticket() {
    let (processor, gate) = Scripted::gated();
    let service = processor.start(
        QueueConfig::default()
            .worker_count(2)
            .queue_capacity(4)
            .shutdown_grace_secs(5),
    );

    let mut tickets = Vec::new();
    for i in 0..6 {
        let sku = format!("ITEM-{i}");
        tickets.push(service.submit(request(&sku), "u", CallerType::Cashier).await.unwrap());
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    let stopping = {
        let service = service.clone();
        tokio::spawn(async move { service.shutdown().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!service.is_running());

    // Let the two items already in workers' hands finish.
    gate.add_permits(2);
    timeout(WAIT, stopping).await.unwrap().unwrap();

    let mut outcomes = Vec::new();
    for ticket in &tickets {
        outcomes.push(timeout(WAIT, ticket.wait()).await.unwrap());
    }
    let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
    let stopped = outcomes
        .iter()
        .filter(|o| o.error_message() == Some("service stopped before processing"))
        .count();
    assert_eq!((succeeded, stopped), (2, 4));

    let late = service.submit(request("LATE"), "u", CallerType::Cashier).await;
    assert!(matches!(late, Err(QueueError::ServiceStopped)));

    let stats = service.stats();
    assert_eq!(stats.submitted, 6);
    assert_eq!(stats.completed + stats.failed, 6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown_interrupts_blocked_producer() {
    let (processor, gate) = Scripted::gated();
    let service = processor.start(
        QueueConfig::default()
            .worker_count(1)
            .queue_capacity(1)
            .shutdown_grace_secs(1),
    );

    service.submit(request("A"), "u", CallerType::Cashier).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    service.submit(request("B"), "u", CallerType::Cashier).await.unwrap();

    let producer = {
        let service = service.clone();
        tokio::spawn(async move { service.submit(request("C"), "u", CallerType::Customer).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let stopping = {
        let service = service.clone();
        tokio::spawn(async move { service.shutdown().await })
    };

    let ticket = timeout(WAIT, producer).await.unwrap().unwrap().unwrap();
    assert_eq!(
        ticket.poll().and_then(|o| o.error_message().map(String::from)),
        Some("submission interrupted".to_string())
    );

    gate.add_permits(1);
    timeout(WAIT, stopping).await.unwrap().unwrap();
    assert_eq!(processor.seen(), vec!["A"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_worker_past_grace_is_detached_and_still_resolves() {
    let (processor, gate) = Scripted::gated();
    let service = processor.start(
        QueueConfig::default()
            .worker_count(1)
            .queue_capacity(4)
            .shutdown_grace_secs(1),
    );

    let in_hand = service.submit(request("A"), "u", CallerType::Cashier).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    // The worker is stuck on the gate for longer than the grace period.
    timeout(WAIT, service.shutdown()).await.unwrap();
    assert!(!service.is_running());
    assert!(in_hand.poll().is_none(), "detached worker still owns the item");

    gate.add_permits(1);
    let outcome = timeout(WAIT, in_hand.wait()).await.unwrap();
    assert!(outcome.is_success());
    assert_eq!(processor.seen(), vec!["A"]);
}

// =============================================================================
// SQLite end to end
// =============================================================================

async fn seeded_db() -> Database {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let products = db.products();
    products.create("COKE-330", "Coca-Cola 330ml", 150, 100, 50).await.unwrap();
    products.create("LAST-ONE", "Display Model", 9_900, 1, 0).await.unwrap();
    db
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sqlite_bills_deduct_the_right_stock() {
    let db = seeded_db().await;
    let executor = Arc::new(BackgroundExecutor::new(1, 64));
    let events = FanoutSink::new().with(Arc::new(RequestLogSink::new(db.clone(), executor.clone())));

    let service = BillQueueService::start(
        QueueConfig::default().worker_count(4).queue_capacity(16),
        sqlite_processor_factory(db.clone()),
        Arc::new(events),
    )
    .unwrap();

    let till = BillRequest::new(
        SalesChannel::InStore,
        PaymentMethod::Cash,
        vec![BillLineRequest::new("COKE-330", 3)],
    )
    .with_amount_paid(500);
    let cashier = service.submit(till, "cashier-1", CallerType::Cashier).await.unwrap();
    let customer = service
        .submit(online_request("COKE-330", 2), "customer-1", CallerType::Customer)
        .await
        .unwrap();
    let missing = service
        .submit(request("NOPE"), "cashier-1", CallerType::Cashier)
        .await
        .unwrap();

    let BillOutcome::Success { bill, .. } = timeout(WAIT, cashier.wait()).await.unwrap() else {
        panic!("cashier bill should succeed");
    };
    assert_eq!(bill.total_cents, 450);
    assert_eq!(bill.change_cents, 50);
    assert_eq!(bill.caller_type, CallerType::Cashier);
    assert!(bill.tracking_number.is_none());

    let online = timeout(WAIT, customer.wait()).await.unwrap();
    assert!(online.bill().and_then(|b| b.tracking_number.as_ref()).is_some());

    assert_eq!(
        timeout(WAIT, missing.wait()).await.unwrap().error_message(),
        Some("Product not found: NOPE")
    );

    let levels = db.products().stock_levels("COKE-330").await.unwrap();
    assert_eq!((levels.shelf_stock, levels.website_stock), (97, 48));

    service.shutdown().await;
    executor.shutdown(Duration::from_secs(5)).await;

    let log = db.request_log();
    assert_eq!(log.count_by_status(RequestStatus::Completed).await.unwrap(), 2);
    assert_eq!(log.count_by_status(RequestStatus::Failed).await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_last_unit_is_sold_once() {
    let db = seeded_db().await;
    let service = BillQueueService::start(
        QueueConfig::default().worker_count(4).queue_capacity(16),
        sqlite_processor_factory(db.clone()),
        Arc::new(NoOpSink),
    )
    .unwrap();

    let mut tickets = Vec::new();
    for i in 0..8 {
        let caller = if i % 2 == 0 { CallerType::Cashier } else { CallerType::Customer };
        tickets.push(
            service
                .submit(request("LAST-ONE"), format!("user-{i}"), caller)
                .await
                .unwrap(),
        );
    }

    let mut sold = 0;
    for ticket in &tickets {
        let outcome = timeout(WAIT, ticket.wait()).await.unwrap();
        match outcome.error_message() {
            None => sold += 1,
            Some(message) => assert!(message.starts_with("Insufficient stock for LAST-ONE"), "{message}"),
        }
    }
    assert_eq!(sold, 1);

    let levels = db.products().stock_levels("LAST-ONE").await.unwrap();
    assert_eq!(levels.shelf_stock, 0);
    assert_eq!(db.bills().count().await.unwrap(), 1);

    service.shutdown().await;
}
