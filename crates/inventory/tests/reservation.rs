//! Reservation state machine tests against the in-memory store and broker.

use std::sync::Arc;

use chrono::Utc;
use common::{
    EventId, InventoryFailedEvent, InventoryReservedEvent, OrderCreatedEvent, OrderCreatedItem,
    OrderId, OrderStatus, ProductId, topics,
};
use inventory::{
    InMemoryInventoryRepository, InventoryError, InventoryService, ReservationOutcome,
    ReserveOnOrderCreated,
};
use messaging::{
    Consumer, DeadLetter, ExchangeKind, InMemoryBroker, Message, PublisherExt, QueueSpec,
    RetryPolicy, Subscription,
};
use rust_decimal::Decimal;
use uuid::Uuid;

const INVENTORY_EVENTS: &str = "test.inventory.events";

type Service = InventoryService<InMemoryInventoryRepository, InMemoryBroker>;

struct Fixture {
    service: Arc<Service>,
    repo: InMemoryInventoryRepository,
    broker: InMemoryBroker,
}

async fn fixture(stock: &[(&str, u64)]) -> Fixture {
    let repo = InMemoryInventoryRepository::new();
    let broker = InMemoryBroker::new();
    broker
        .declare_exchange(topics::INVENTORY_EXCHANGE, ExchangeKind::Topic)
        .await;
    broker
        .declare_queue(QueueSpec::durable(INVENTORY_EVENTS))
        .await;
    broker
        .bind_queue(INVENTORY_EVENTS, topics::INVENTORY_EXCHANGE, "inventory.#")
        .await
        .unwrap();

    let service = Arc::new(InventoryService::new(repo.clone(), broker.clone()));
    let stock: Vec<(ProductId, u64)> = stock
        .iter()
        .map(|(p, q)| (ProductId::new(*p), *q))
        .collect();
    service.seed(&stock).await.unwrap();

    Fixture {
        service,
        repo,
        broker,
    }
}

fn order_created(lines: &[(&str, u32)]) -> OrderCreatedEvent {
    let now = Utc::now();
    OrderCreatedEvent {
        event_id: EventId::new(),
        order_id: OrderId::new(),
        status: OrderStatus::Pending,
        total_amount: Decimal::from(100),
        created_at: now,
        updated_at: now,
        items: lines
            .iter()
            .map(|(product, quantity)| OrderCreatedItem {
                order_item_id: Uuid::new_v4(),
                product_id: ProductId::new(*product),
                quantity: *quantity,
                price: Decimal::from(10),
            })
            .collect(),
    }
}

async fn levels(fixture: &Fixture, product: &str) -> (u64, u64) {
    let item = fixture
        .service
        .stock(&ProductId::new(product))
        .await
        .unwrap()
        .unwrap();
    (item.available_quantity, item.reserved_quantity)
}

async fn inventory_publishes(broker: &InMemoryBroker) -> usize {
    broker.publish_attempts(topics::INVENTORY_RESERVED).await
        + broker.publish_attempts(topics::INVENTORY_FAILED).await
}

#[tokio::test]
async fn test_sequential_redelivery_is_noop() {
    let f = fixture(&[("p1", 10)]).await;
    let event = order_created(&[("p1", 3)]);

    assert!(matches!(
        f.service.reserve_inventory(&event).await.unwrap(),
        ReservationOutcome::Reserved(_)
    ));
    assert_eq!(
        f.service.reserve_inventory(&event).await.unwrap(),
        ReservationOutcome::Duplicate
    );

    assert_eq!(levels(&f, "p1").await, (7, 3));
    assert_eq!(inventory_publishes(&f.broker).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_redelivery_decrements_once() {
    let f = fixture(&[("p1", 100)]).await;
    let event = order_created(&[("p1", 7)]);

    let attempts = (0..8).map(|_| {
        let service = f.service.clone();
        let event = event.clone();
        tokio::spawn(async move { service.reserve_inventory(&event).await })
    });
    let outcomes: Vec<ReservationOutcome> = futures_util::future::join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    let reserved = outcomes
        .iter()
        .filter(|o| matches!(o, ReservationOutcome::Reserved(_)))
        .count();
    let duplicates = outcomes
        .iter()
        .filter(|o| **o == ReservationOutcome::Duplicate)
        .count();
    assert_eq!(reserved, 1);
    assert_eq!(duplicates, 7);
    assert_eq!(levels(&f, "p1").await, (93, 7));
    assert_eq!(inventory_publishes(&f.broker).await, 1);
    assert_eq!(f.repo.reservation_count().await, 1);
}

#[tokio::test]
async fn test_redelivery_after_rejection_is_evaluated_again() {
    let f = fixture(&[("p1", 1)]).await;
    let event = order_created(&[("p1", 3)]);

    assert!(matches!(
        f.service.reserve_inventory(&event).await.unwrap(),
        ReservationOutcome::Rejected(_)
    ));
    // A rejection commits nothing, so no reservation marker guards the order
    assert!(!f.repo.has_reservation(event.order_id).await);
    assert!(matches!(
        f.service.reserve_inventory(&event).await.unwrap(),
        ReservationOutcome::Rejected(_)
    ));
    assert_eq!(levels(&f, "p1").await, (1, 0));
}

#[tokio::test]
async fn test_second_item_failure_rolls_back_first() {
    let f = fixture(&[("p1", 10), ("p2", 2)]).await;
    let event = order_created(&[("p1", 4), ("p2", 5)]);

    let outcome = f.service.reserve_inventory(&event).await.unwrap();
    let ReservationOutcome::Rejected(reason) = outcome else {
        panic!("expected rejection, got {outcome:?}");
    };
    assert_eq!(
        reason.to_string(),
        "Insufficient stock for product p2: available=2, requested=5"
    );

    assert_eq!(levels(&f, "p1").await, (10, 0));
    assert_eq!(levels(&f, "p2").await, (2, 0));
    assert!(!f.repo.has_reservation(event.order_id).await);
}

#[tokio::test]
async fn test_first_failing_item_stops_processing() {
    let f = fixture(&[("p1", 10)]).await;
    let event = order_created(&[("missing", 1), ("p1", 4)]);

    let outcome = f.service.reserve_inventory(&event).await.unwrap();
    assert!(matches!(outcome, ReservationOutcome::Rejected(_)));
    assert_eq!(levels(&f, "p1").await, (10, 0));

    let messages = f.broker.queued_messages(INVENTORY_EVENTS).await;
    assert_eq!(messages.len(), 1);
    let failed: InventoryFailedEvent = messages[0].decode().unwrap();
    assert_eq!(failed.reason, "Product missing not found in inventory");
}

#[tokio::test]
async fn test_publish_failure_compensates_and_conserves_stock() {
    let f = fixture(&[("p1", 10), ("p2", 6)]).await;
    f.broker.fail_publishes_to(topics::INVENTORY_RESERVED).await;
    let event = order_created(&[("p1", 3), ("p2", 6)]);

    let err = f.service.reserve_inventory(&event).await.unwrap_err();
    assert!(matches!(err, InventoryError::Publish(_)));

    assert_eq!(levels(&f, "p1").await, (10, 0));
    assert_eq!(levels(&f, "p2").await, (6, 0));
    assert!(!f.repo.has_reservation(event.order_id).await);

    // The broker recovers and the retried delivery reserves normally
    f.broker.restore_publishes_to(topics::INVENTORY_RESERVED).await;
    assert!(matches!(
        f.service.reserve_inventory(&event).await.unwrap(),
        ReservationOutcome::Reserved(_)
    ));
    assert_eq!(levels(&f, "p1").await, (7, 3));
    assert_eq!(levels(&f, "p2").await, (0, 6));
}

#[tokio::test]
async fn test_failed_compensation_is_reported_as_unretryable() {
    let f = fixture(&[("p1", 10)]).await;
    f.broker.fail_publishes_to(topics::INVENTORY_RESERVED).await;
    // The reservation transaction may begin, the compensation may not
    f.repo.fail_transactions_after(1);
    let event = order_created(&[("p1", 3)]);

    let err = f.service.reserve_inventory(&event).await.unwrap_err();
    assert!(err.is_unretryable());
    let InventoryError::CompensationFailed {
        order_id, rollback, ..
    } = err
    else {
        panic!("expected compensation failure");
    };
    assert_eq!(order_id, event.order_id);
    assert!(matches!(*rollback, InventoryError::StoreUnavailable(_)));

    f.repo.restore_transactions();
    assert_eq!(levels(&f, "p1").await, (7, 3));
    assert!(f.repo.has_reservation(event.order_id).await);
}

#[tokio::test]
async fn test_saga_scenario() {
    let f = fixture(&[("p1", 10)]).await;

    let first = order_created(&[("p1", 3)]);
    f.service.reserve_inventory(&first).await.unwrap();
    assert_eq!(levels(&f, "p1").await, (7, 3));

    // Drain stock down to a single unit with another order
    let second = order_created(&[("p1", 6)]);
    f.service.reserve_inventory(&second).await.unwrap();
    assert_eq!(levels(&f, "p1").await, (1, 9));

    let third = order_created(&[("p1", 3)]);
    let outcome = f.service.reserve_inventory(&third).await.unwrap();
    assert!(matches!(outcome, ReservationOutcome::Rejected(_)));
    assert_eq!(levels(&f, "p1").await, (1, 9));

    let messages = f.broker.queued_messages(INVENTORY_EVENTS).await;
    let routing: Vec<&str> = messages.iter().map(|m| m.routing_key.as_str()).collect();
    assert_eq!(
        routing,
        vec![
            topics::INVENTORY_RESERVED,
            topics::INVENTORY_RESERVED,
            topics::INVENTORY_FAILED
        ]
    );
    let reserved: InventoryReservedEvent = messages[0].decode().unwrap();
    assert_eq!(reserved.order_id, first.order_id);
    let failed: InventoryFailedEvent = messages[2].decode().unwrap();
    assert_eq!(failed.order_id, third.order_id);
    assert!(failed.reason.contains("Insufficient stock"));
}

#[tokio::test]
async fn test_handler_retries_then_dead_letters_on_persistent_publish_failure() {
    let f = fixture(&[("p1", 10)]).await;
    let dead_letter = DeadLetter::for_service("inventory-service");
    let consumer = Consumer::new(f.broker.clone(), RetryPolicy::default()).subscribe(
        Subscription::to_event::<OrderCreatedEvent, _>(
            QueueSpec::durable("inventory-service.orders.created")
                .with_dead_letter_exchange(dead_letter.exchange.clone()),
            ReserveOnOrderCreated::new(f.service.clone()),
        ),
    );
    consumer.declare().await.unwrap();
    f.broker.fail_publishes_to(topics::INVENTORY_RESERVED).await;

    let event = order_created(&[("p1", 3)]);
    f.broker.publish_event(&event).await.unwrap();

    // One original delivery plus three retries
    assert_eq!(consumer.drain().await.unwrap(), 4);
    assert_eq!(f.broker.publish_attempts(topics::INVENTORY_RESERVED).await, 4);

    let dead: Vec<Message> = f.broker.queued_messages(&dead_letter.queue).await;
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].retry_count(), 3);

    // Every attempt was compensated
    assert_eq!(levels(&f, "p1").await, (10, 0));
    assert!(!f.repo.has_reservation(event.order_id).await);
}

#[tokio::test]
async fn test_failed_compensation_dead_letters_instead_of_acking_redelivery() {
    let f = fixture(&[("p1", 10)]).await;
    let dead_letter = DeadLetter::for_service("inventory-service");
    let consumer = Consumer::new(f.broker.clone(), RetryPolicy::default()).subscribe(
        Subscription::to_event::<OrderCreatedEvent, _>(
            QueueSpec::durable("inventory-service.orders.created")
                .with_dead_letter_exchange(dead_letter.exchange.clone()),
            ReserveOnOrderCreated::new(f.service.clone()),
        ),
    );
    consumer.declare().await.unwrap();
    f.broker.fail_publishes_to(topics::INVENTORY_RESERVED).await;
    f.repo.fail_transactions_after(1);

    let event = order_created(&[("p1", 3)]);
    f.broker.publish_event(&event).await.unwrap();

    assert_eq!(consumer.drain().await.unwrap(), 1);

    // The store recovers, but nothing was republished for a retry to no-op on
    f.repo.restore_transactions();
    assert_eq!(consumer.drain().await.unwrap(), 0);
    assert_eq!(f.broker.published(topics::ORDER_CREATED).await.len(), 1);

    let dead = f.broker.queued_messages(&dead_letter.queue).await;
    assert_eq!(dead.len(), 1);
    let stuck: OrderCreatedEvent = dead[0].decode().unwrap();
    assert_eq!(stuck.order_id, event.order_id);

    assert_eq!(levels(&f, "p1").await, (7, 3));
    assert!(f.repo.has_reservation(event.order_id).await);
    assert_eq!(f.broker.publish_attempts(topics::INVENTORY_RESERVED).await, 1);
}
