//! Broker entry points for the Notification Sink.

use std::sync::Arc;

use async_trait::async_trait;
use messaging::{BoxError, EventHandler};

use crate::{Notifiable, NotificationRepository, NotificationService};

/// Records every event of the subscribed type.
///
/// Duplicates complete normally so the redelivered message is acked.
pub struct RecordNotification<R: NotificationRepository> {
    service: Arc<NotificationService<R>>,
}

impl<R: NotificationRepository> RecordNotification<R> {
    /// Creates the handler around a shared service.
    pub fn new(service: Arc<NotificationService<R>>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<R, E> EventHandler<E> for RecordNotification<R>
where
    R: NotificationRepository,
    E: Notifiable,
{
    async fn handle(&self, event: E) -> Result<(), BoxError> {
        self.service.notify(&event).await?;
        Ok(())
    }
}
