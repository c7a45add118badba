//! Notification Sink.
//!
//! Records every saga event it receives exactly once, keyed by the event id
//! carried on the envelope. A redelivered copy of an event is recognized as
//! a duplicate and acknowledged without effect.

pub mod error;
pub mod handler;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod repository;
pub mod service;

pub use error::{NotificationError, Result};
pub use handler::RecordNotification;
pub use memory::InMemoryNotificationRepository;
pub use postgres::PostgresNotificationRepository;
pub use record::{Notifiable, NotificationRecord, NotificationType};
pub use repository::NotificationRepository;
pub use service::NotificationService;
