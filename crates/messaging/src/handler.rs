//! Consumer-side handler traits.

use std::marker::PhantomData;

use async_trait::async_trait;
use common::IntegrationEvent;

use crate::{BoxError, Message};

/// Handles raw messages taken off a queue.
///
/// Returning an error hands the message to the retry/dead-letter policy.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Processes one message.
    async fn handle(&self, message: &Message) -> Result<(), BoxError>;
}

/// Handles a decoded event of one type.
#[async_trait]
pub trait EventHandler<E: IntegrationEvent>: Send + Sync {
    /// Processes one event.
    async fn handle(&self, event: E) -> Result<(), BoxError>;
}

/// Adapts an [`EventHandler`] to a [`MessageHandler`] by decoding the JSON body.
///
/// A body that does not decode is a handler failure like any other, so it is
/// retried and eventually dead-lettered instead of being dropped.
pub(crate) struct Decoding<E, H> {
    inner: H,
    _event: PhantomData<fn() -> E>,
}

impl<E, H> Decoding<E, H> {
    pub(crate) fn new(inner: H) -> Self {
        Self {
            inner,
            _event: PhantomData,
        }
    }
}

#[async_trait]
impl<E, H> MessageHandler for Decoding<E, H>
where
    E: IntegrationEvent,
    H: EventHandler<E>,
{
    async fn handle(&self, message: &Message) -> Result<(), BoxError> {
        let event: E = message.decode()?;
        self.inner.handle(event).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use common::{InventoryFailedEvent, OrderId};

    use super::*;

    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl EventHandler<InventoryFailedEvent> for Counting {
        async fn handle(&self, _event: InventoryFailedEvent) -> Result<(), BoxError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_decoding_handler_passes_event_through() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = Decoding::new(Counting(calls.clone()));
        let message =
            Message::from_event(&InventoryFailedEvent::new(OrderId::new(), "nope")).unwrap();

        handler.handle(&message).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_undecodable_body_is_a_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = Decoding::new(Counting(calls.clone()));
        let message = Message::new("inventory.events", "inventory.failed", b"not json".to_vec());

        assert!(handler.handle(&message).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
