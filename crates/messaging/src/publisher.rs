//! Publishing side of the broker contract.

use std::sync::Arc;

use async_trait::async_trait;
use common::IntegrationEvent;

use crate::{Message, Result};

/// Publishes messages to the broker.
///
/// A returned `Ok` means the broker accepted the message; any error means the
/// caller must assume it was not delivered.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publishes a message to its exchange with its routing key.
    async fn publish(&self, message: Message) -> Result<()>;
}

/// Extension trait providing typed publishing.
#[async_trait]
pub trait PublisherExt: Publisher {
    /// Serializes and publishes an event to the exchange its type declares.
    async fn publish_event<E: IntegrationEvent>(&self, event: &E) -> Result<()> {
        let message = Message::from_event(event)?;
        self.publish(message).await
    }
}

// Blanket implementation for all publishers
impl<T: Publisher + ?Sized> PublisherExt for T {}

#[async_trait]
impl<T: Publisher + ?Sized> Publisher for Arc<T> {
    async fn publish(&self, message: Message) -> Result<()> {
        (**self).publish(message).await
    }
}
