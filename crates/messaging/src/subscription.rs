//! Declarative subscription table entries.

use std::sync::Arc;

use common::IntegrationEvent;

use crate::handler::Decoding;
use crate::{EventHandler, MessageHandler, QueueSpec};

/// One row of a service's subscription table: which queue to declare, what it
/// is bound to, and who handles what arrives on it.
#[derive(Clone)]
pub struct Subscription {
    pub exchange: String,
    pub routing_key: String,
    pub queue: QueueSpec,
    pub handler: Arc<dyn MessageHandler>,
}

impl Subscription {
    /// Creates a subscription for raw messages.
    pub fn new(
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        queue: QueueSpec,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            queue,
            handler,
        }
    }

    /// Creates a subscription bound to the exchange and routing key of `E`.
    pub fn to_event<E, H>(queue: QueueSpec, handler: H) -> Self
    where
        E: IntegrationEvent,
        H: EventHandler<E> + 'static,
    {
        Self::new(
            E::EXCHANGE,
            E::ROUTING_KEY,
            queue,
            Arc::new(Decoding::<E, H>::new(handler)),
        )
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("exchange", &self.exchange)
            .field("routing_key", &self.routing_key)
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}
