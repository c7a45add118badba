//! Notification Sink driven through broker subscriptions.

use std::sync::Arc;

use chrono::Utc;
use common::{
    EventId, InventoryFailedEvent, InventoryReservedEvent, OrderCreatedEvent, OrderId,
    OrderStatus, ReservedItem,
};
use messaging::{
    Consumer, DeadLetter, EnvelopeHandler, InMemoryBroker, Message, Publisher, PublisherExt,
    QueueSpec, RetryPolicy, Subscription,
};
use notifications::{
    InMemoryNotificationRepository, NotificationService, NotificationType, RecordNotification,
};
use rust_decimal::Decimal;

struct Fixture {
    broker: InMemoryBroker,
    repo: InMemoryNotificationRepository,
    consumer: Consumer,
}

async fn fixture() -> Fixture {
    let broker = InMemoryBroker::new();
    let repo = InMemoryNotificationRepository::new();
    let service = Arc::new(NotificationService::new(repo.clone()));
    let dlx = DeadLetter::for_service("notification-service").exchange;

    let consumer = Consumer::new(broker.clone(), RetryPolicy::default())
        .subscribe(Subscription::to_event::<OrderCreatedEvent, _>(
            QueueSpec::durable("notification-service.orders.created")
                .with_dead_letter_exchange(dlx.clone()),
            RecordNotification::new(service.clone()),
        ))
        .subscribe(Subscription::to_event::<InventoryReservedEvent, _>(
            QueueSpec::durable("notification-service.inventory.reserved")
                .with_dead_letter_exchange(dlx.clone()),
            RecordNotification::new(service.clone()),
        ))
        .subscribe(Subscription::to_event::<InventoryFailedEvent, _>(
            QueueSpec::durable("notification-service.inventory.failed")
                .with_dead_letter_exchange(dlx),
            RecordNotification::new(service),
        ));
    consumer.declare().await.unwrap();

    Fixture {
        broker,
        repo,
        consumer,
    }
}

fn order_created(order_id: OrderId) -> OrderCreatedEvent {
    let now = Utc::now();
    OrderCreatedEvent {
        event_id: EventId::new(),
        order_id,
        status: OrderStatus::Pending,
        total_amount: Decimal::from(250),
        created_at: now,
        updated_at: now,
        items: vec![],
    }
}

#[tokio::test]
async fn test_records_each_event_type() {
    let f = fixture().await;
    let order_id = OrderId::new();

    f.broker.publish_event(&order_created(order_id)).await.unwrap();
    f.broker
        .publish_event(&InventoryReservedEvent::new(
            order_id,
            vec![ReservedItem {
                product_id: "p1".into(),
                quantity: 3,
            }],
        ))
        .await
        .unwrap();
    f.broker
        .publish_event(&InventoryFailedEvent::new(OrderId::new(), "Insufficient stock"))
        .await
        .unwrap();

    assert_eq!(f.consumer.drain().await.unwrap(), 3);
    assert_eq!(f.repo.record_count().await, 3);

    let service = NotificationService::new(f.repo.clone());
    let records = service.for_order(order_id).await.unwrap();
    let kinds: Vec<NotificationType> = records.iter().map(|r| r.notification_type).collect();
    assert_eq!(
        kinds,
        vec![
            NotificationType::OrderCreated,
            NotificationType::InventoryReserved
        ]
    );
    assert_eq!(records[0].payload["totalAmount"], "250");
    assert_eq!(records[1].payload["items"][0]["productId"], "p1");
}

#[tokio::test]
async fn test_redelivered_event_is_acked_without_second_record() {
    let f = fixture().await;
    let event = InventoryFailedEvent::new(OrderId::new(), "Product p9 not found in inventory");

    f.broker.publish_event(&event).await.unwrap();
    f.broker.publish_event(&event).await.unwrap();

    assert_eq!(f.consumer.drain().await.unwrap(), 2);
    assert_eq!(f.repo.record_count().await, 1);
    assert_eq!(
        f.broker
            .queue_len("notification-service.dead-letter.queue")
            .await,
        0
    );
}

#[tokio::test]
async fn test_store_outage_retries_then_dead_letters() {
    let f = fixture().await;
    f.repo.set_fail_on_insert(true);

    f.broker
        .publish_event(&InventoryFailedEvent::new(OrderId::new(), "x"))
        .await
        .unwrap();

    assert_eq!(f.consumer.drain().await.unwrap(), 4);
    assert_eq!(f.repo.record_count().await, 0);
    let dead = f
        .broker
        .queued_messages("notification-service.dead-letter.queue")
        .await;
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].retry_count(), 3);
}

#[tokio::test]
async fn test_store_recovers_within_retry_budget() {
    let f = fixture().await;
    f.repo.set_fail_on_insert(true);
    let event = InventoryFailedEvent::new(OrderId::new(), "x");
    f.broker.publish_event(&event).await.unwrap();

    // First attempt fails and schedules a retry
    let delivery = f
        .broker
        .try_receive("notification-service.inventory.failed")
        .await
        .unwrap()
        .unwrap();
    let handler = f.consumer.subscriptions()[2].handler.clone();
    let envelope = EnvelopeHandler::new(f.broker.clone(), RetryPolicy::default());
    envelope.dispatch(&delivery, handler.as_ref()).await.unwrap();

    f.repo.set_fail_on_insert(false);
    assert_eq!(f.consumer.drain().await.unwrap(), 1);

    let service = NotificationService::new(f.repo.clone());
    assert_eq!(service.for_order(event.order_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_undecodable_body_is_dead_lettered() {
    let f = fixture().await;
    f.broker
        .publish(Message::new(
            "inventory.events",
            "inventory.failed",
            b"not json".to_vec(),
        ))
        .await
        .unwrap();

    assert_eq!(f.consumer.drain().await.unwrap(), 4);
    assert_eq!(f.repo.record_count().await, 0);
    assert_eq!(
        f.broker
            .queue_len("notification-service.dead-letter.queue")
            .await,
        1
    );
}
