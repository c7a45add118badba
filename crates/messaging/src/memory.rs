//! In-process broker with topic routing, durable queues and dead-lettering.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use crate::envelope::Acknowledge;
use crate::{
    Binding, ExchangeKind, Message, MessagingError, Publisher, QueueSpec, Result,
    routing_key_matches,
};

/// Header recording which queue dead-lettered a message.
pub const DEATH_QUEUE_HEADER: &str = "x-first-death-queue";

struct QueueState {
    spec: QueueSpec,
    /// Never held across an await, so a dropped delivery can requeue itself
    /// synchronously.
    messages: std::sync::Mutex<VecDeque<Message>>,
    notify: Notify,
}

impl QueueState {
    fn messages(&self) -> MutexGuard<'_, VecDeque<Message>> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push_back(&self, message: Message) {
        self.messages().push_back(message);
        self.notify.notify_one();
    }

    fn push_front(&self, message: Message) {
        self.messages().push_front(message);
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<Message> {
        self.messages().pop_front()
    }
}

#[derive(Default)]
struct BrokerState {
    exchanges: HashMap<String, ExchangeKind>,
    bindings: Vec<Binding>,
    queues: HashMap<String, Arc<QueueState>>,
    /// Successfully published messages, in publish order.
    published: Vec<Message>,
    /// Publish attempts per routing key, including failed ones.
    attempts: HashMap<String, usize>,
    /// Routing keys whose publishes are refused.
    failing: HashSet<String>,
}

/// In-memory broker implementation.
///
/// Provides the delivery contract the services depend on: topic and fanout
/// exchanges, durable queues, per-queue dead-letter exchanges, and explicit
/// ack/nack of deliveries. Cloning is cheap; clones share the same broker.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl InMemoryBroker {
    /// Creates a new empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares an exchange. Redeclaring an existing exchange is a no-op.
    pub async fn declare_exchange(&self, name: &str, kind: ExchangeKind) {
        let mut state = self.state.lock().await;
        state.exchanges.entry(name.to_string()).or_insert(kind);
    }

    /// Declares a queue. Redeclaring keeps any messages already queued.
    pub async fn declare_queue(&self, spec: QueueSpec) {
        let mut state = self.state.lock().await;
        state
            .queues
            .entry(spec.name.clone())
            .or_insert_with(|| {
                Arc::new(QueueState {
                    spec,
                    messages: std::sync::Mutex::new(VecDeque::new()),
                    notify: Notify::new(),
                })
            });
    }

    /// Binds a queue to an exchange under a routing pattern.
    pub async fn bind_queue(&self, queue: &str, exchange: &str, routing_key: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.exchanges.contains_key(exchange) {
            return Err(MessagingError::UnknownExchange(exchange.to_string()));
        }
        if !state.queues.contains_key(queue) {
            return Err(MessagingError::UnknownQueue(queue.to_string()));
        }

        let binding = Binding {
            queue: queue.to_string(),
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
        };
        if !state.bindings.contains(&binding) {
            state.bindings.push(binding);
        }
        Ok(())
    }

    /// Waits for the next message on a queue.
    pub async fn receive(&self, queue: &str) -> Result<Delivery> {
        let queue_state = self.queue(queue).await?;
        loop {
            if let Some(message) = queue_state.pop() {
                return Ok(self.delivery(message, queue_state));
            }
            queue_state.notify.notified().await;
        }
    }

    /// Takes the next message on a queue if one is waiting.
    pub async fn try_receive(&self, queue: &str) -> Result<Option<Delivery>> {
        let queue_state = self.queue(queue).await?;
        let message = queue_state.pop();
        Ok(message.map(|m| self.delivery(m, queue_state)))
    }

    /// Returns the number of messages waiting on a queue.
    pub async fn queue_len(&self, queue: &str) -> usize {
        match self.queue(queue).await {
            Ok(q) => q.messages().len(),
            Err(_) => 0,
        }
    }

    /// Returns copies of the messages waiting on a queue, oldest first.
    pub async fn queued_messages(&self, queue: &str) -> Vec<Message> {
        match self.queue(queue).await {
            Ok(q) => q.messages().iter().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Returns every accepted publish with the given routing key, in order.
    pub async fn published(&self, routing_key: &str) -> Vec<Message> {
        self.state
            .lock()
            .await
            .published
            .iter()
            .filter(|m| m.routing_key == routing_key)
            .cloned()
            .collect()
    }

    /// Returns the number of publish attempts with the given routing key,
    /// including refused ones.
    pub async fn publish_attempts(&self, routing_key: &str) -> usize {
        self.state
            .lock()
            .await
            .attempts
            .get(routing_key)
            .copied()
            .unwrap_or(0)
    }

    /// Refuses every subsequent publish with the given routing key.
    pub async fn fail_publishes_to(&self, routing_key: &str) {
        self.state
            .lock()
            .await
            .failing
            .insert(routing_key.to_string());
    }

    /// Accepts publishes with the given routing key again.
    pub async fn restore_publishes_to(&self, routing_key: &str) {
        self.state.lock().await.failing.remove(routing_key);
    }

    async fn queue(&self, name: &str) -> Result<Arc<QueueState>> {
        self.state
            .lock()
            .await
            .queues
            .get(name)
            .cloned()
            .ok_or_else(|| MessagingError::UnknownQueue(name.to_string()))
    }

    fn delivery(&self, message: Message, queue: Arc<QueueState>) -> Delivery {
        Delivery {
            message,
            queue,
            broker: self.clone(),
            settled: AtomicBool::new(false),
        }
    }

    /// Copies a message to every queue bound to its exchange that matches its
    /// routing key. Returns the number of queues it reached.
    async fn route(&self, message: Message) -> Result<usize> {
        let targets: Vec<Arc<QueueState>> = {
            let state = self.state.lock().await;
            let kind = state
                .exchanges
                .get(&message.exchange)
                .copied()
                .ok_or_else(|| MessagingError::UnknownExchange(message.exchange.clone()))?;

            let mut names: Vec<&str> = state
                .bindings
                .iter()
                .filter(|b| b.exchange == message.exchange)
                .filter(|b| {
                    kind == ExchangeKind::Fanout
                        || routing_key_matches(&b.routing_key, &message.routing_key)
                })
                .map(|b| b.queue.as_str())
                .collect();
            names.sort_unstable();
            names.dedup();

            names
                .into_iter()
                .filter_map(|name| state.queues.get(name).cloned())
                .collect()
        };

        if targets.is_empty() {
            tracing::debug!(
                exchange = %message.exchange,
                routing_key = %message.routing_key,
                "message unroutable, dropped"
            );
        }

        let reached = targets.len();
        for queue in targets {
            queue.push_back(message.clone());
        }
        Ok(reached)
    }
}

#[async_trait]
impl Publisher for InMemoryBroker {
    async fn publish(&self, message: Message) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            *state
                .attempts
                .entry(message.routing_key.clone())
                .or_insert(0) += 1;

            if state.failing.contains(&message.routing_key) {
                return Err(MessagingError::Publish {
                    exchange: message.exchange,
                    routing_key: message.routing_key,
                    reason: "broker refused the message".to_string(),
                });
            }
        }

        self.route(message.clone()).await?;
        self.state.lock().await.published.push(message);
        Ok(())
    }
}

/// A message taken off a queue, awaiting ack or nack.
///
/// A delivery dropped without being settled goes back to the front of its
/// queue, so a cancelled or panicking consumer never loses a message.
pub struct Delivery {
    message: Message,
    queue: Arc<QueueState>,
    broker: InMemoryBroker,
    settled: AtomicBool,
}

impl Delivery {
    /// Name of the queue the message was taken from.
    pub fn queue(&self) -> &str {
        &self.queue.spec.name
    }

    fn settle(&self) -> Result<()> {
        if self.settled.swap(true, Ordering::SeqCst) {
            return Err(MessagingError::AlreadySettled);
        }
        Ok(())
    }
}

#[async_trait]
impl Acknowledge for Delivery {
    fn message(&self) -> &Message {
        &self.message
    }

    async fn ack(&self) -> Result<()> {
        self.settle()
    }

    async fn reject(&self) -> Result<()> {
        self.settle()?;

        let Some(dead_letter_exchange) = self.queue.spec.dead_letter_exchange.clone() else {
            tracing::warn!(queue = %self.queue(), "rejected message discarded, no dead-letter exchange");
            return Ok(());
        };

        let mut dead = self
            .message
            .clone()
            .with_header(DEATH_QUEUE_HEADER, self.queue().to_string());
        dead.exchange = dead_letter_exchange;
        self.broker.route(dead).await?;
        Ok(())
    }

    async fn requeue(&self) -> Result<()> {
        self.settle()?;
        self.queue.push_front(self.message.clone());
        Ok(())
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if !self.settled.swap(true, Ordering::SeqCst) {
            tracing::warn!(queue = %self.queue(), "unsettled delivery dropped, requeueing");
            self.queue.push_front(self.message.clone());
        }
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("queue", &self.queue())
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn broker_with_queue() -> InMemoryBroker {
        let broker = InMemoryBroker::new();
        broker
            .declare_exchange("orders.events", ExchangeKind::Topic)
            .await;
        broker
            .declare_exchange("svc.dead-letter", ExchangeKind::Fanout)
            .await;
        broker
            .declare_queue(QueueSpec::durable("svc.orders").with_dead_letter_exchange("svc.dead-letter"))
            .await;
        broker.declare_queue(QueueSpec::durable("svc.dlq")).await;
        broker
            .bind_queue("svc.orders", "orders.events", "order.created")
            .await
            .unwrap();
        broker
            .bind_queue("svc.dlq", "svc.dead-letter", "")
            .await
            .unwrap();
        broker
    }

    fn message() -> Message {
        Message::new("orders.events", "order.created", b"{}".to_vec())
    }

    #[tokio::test]
    async fn test_publish_routes_to_bound_queue() {
        let broker = broker_with_queue().await;
        broker.publish(message()).await.unwrap();

        assert_eq!(broker.queue_len("svc.orders").await, 1);
        assert_eq!(broker.published("order.created").await.len(), 1);
        assert_eq!(broker.publish_attempts("order.created").await, 1);
    }

    #[tokio::test]
    async fn test_unmatched_routing_key_is_dropped() {
        let broker = broker_with_queue().await;
        broker
            .publish(Message::new("orders.events", "order.deleted", b"{}".to_vec()))
            .await
            .unwrap();

        assert_eq!(broker.queue_len("svc.orders").await, 0);
    }

    #[tokio::test]
    async fn test_publish_to_unknown_exchange_fails() {
        let broker = InMemoryBroker::new();
        let result = broker.publish(message()).await;
        assert!(matches!(result, Err(MessagingError::UnknownExchange(_))));
    }

    #[tokio::test]
    async fn test_refused_publish_is_counted_but_not_routed() {
        let broker = broker_with_queue().await;
        broker.fail_publishes_to("order.created").await;

        let result = broker.publish(message()).await;
        assert!(matches!(result, Err(MessagingError::Publish { .. })));
        assert_eq!(broker.publish_attempts("order.created").await, 1);
        assert!(broker.published("order.created").await.is_empty());
        assert_eq!(broker.queue_len("svc.orders").await, 0);

        broker.restore_publishes_to("order.created").await;
        broker.publish(message()).await.unwrap();
        assert_eq!(broker.queue_len("svc.orders").await, 1);
    }

    #[tokio::test]
    async fn test_ack_removes_message() {
        let broker = broker_with_queue().await;
        broker.publish(message()).await.unwrap();

        let delivery = broker.try_receive("svc.orders").await.unwrap().unwrap();
        delivery.ack().await.unwrap();

        assert_eq!(broker.queue_len("svc.orders").await, 0);
        assert!(matches!(
            delivery.ack().await,
            Err(MessagingError::AlreadySettled)
        ));
    }

    #[tokio::test]
    async fn test_reject_routes_to_dead_letter_queue() {
        let broker = broker_with_queue().await;
        broker.publish(message()).await.unwrap();

        let delivery = broker.try_receive("svc.orders").await.unwrap().unwrap();
        delivery.reject().await.unwrap();

        assert_eq!(broker.queue_len("svc.orders").await, 0);
        let dead = broker.queued_messages("svc.dlq").await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].routing_key, "order.created");
        assert_eq!(
            dead[0].header(DEATH_QUEUE_HEADER).and_then(|v| v.as_str()),
            Some("svc.orders")
        );
    }

    #[tokio::test]
    async fn test_requeue_puts_message_back_first() {
        let broker = broker_with_queue().await;
        broker.publish(message().with_header("n", 1)).await.unwrap();
        broker.publish(message().with_header("n", 2)).await.unwrap();

        let first = broker.try_receive("svc.orders").await.unwrap().unwrap();
        first.requeue().await.unwrap();

        let again = broker.try_receive("svc.orders").await.unwrap().unwrap();
        assert_eq!(again.message().header("n"), Some(&serde_json::json!(1)));
    }

    #[tokio::test]
    async fn test_dropped_delivery_is_requeued() {
        let broker = broker_with_queue().await;
        broker.publish(message().with_header("n", 1)).await.unwrap();
        broker.publish(message().with_header("n", 2)).await.unwrap();

        let delivery = broker.try_receive("svc.orders").await.unwrap().unwrap();
        assert_eq!(broker.queue_len("svc.orders").await, 1);
        drop(delivery);

        assert_eq!(broker.queue_len("svc.orders").await, 2);
        let again = broker.try_receive("svc.orders").await.unwrap().unwrap();
        assert_eq!(again.message().header("n"), Some(&serde_json::json!(1)));
    }

    #[tokio::test]
    async fn test_settled_delivery_is_not_requeued_on_drop() {
        let broker = broker_with_queue().await;
        broker.publish(message()).await.unwrap();

        let delivery = broker.try_receive("svc.orders").await.unwrap().unwrap();
        delivery.reject().await.unwrap();
        drop(delivery);

        assert_eq!(broker.queue_len("svc.orders").await, 0);
        assert_eq!(broker.queue_len("svc.dlq").await, 1);
    }

    #[tokio::test]
    async fn test_receive_waits_for_publish() {
        let broker = broker_with_queue().await;
        let consumer = broker.clone();
        let waiting = tokio::spawn(async move { consumer.receive("svc.orders").await });

        tokio::task::yield_now().await;
        broker.publish(message()).await.unwrap();

        let delivery = waiting.await.unwrap().unwrap();
        assert_eq!(delivery.queue(), "svc.orders");
    }

    #[tokio::test]
    async fn test_bind_requires_declared_queue() {
        let broker = InMemoryBroker::new();
        broker
            .declare_exchange("orders.events", ExchangeKind::Topic)
            .await;
        let result = broker.bind_queue("missing", "orders.events", "#").await;
        assert!(matches!(result, Err(MessagingError::UnknownQueue(_))));
    }
}
