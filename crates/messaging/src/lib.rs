//! Broker delivery contract for the order saga services.
//!
//! This crate models only what the services rely on from a durable, topic-routed
//! broker: publishing a JSON body to an exchange with a routing key, durable
//! queues with a dead-letter exchange, and ack/nack of individual deliveries.
//! On top of that it provides:
//! - the retry-then-dead-letter policy applied at every consumer boundary
//!   ([`EnvelopeHandler`])
//! - the declarative subscription table mapping a routing key to a handler
//!   ([`Subscription`])
//! - worker tasks pulling from queues ([`Consumer`])

pub mod consumer;
pub mod envelope;
pub mod error;
pub mod handler;
pub mod memory;
pub mod message;
pub mod publisher;
pub mod subscription;
pub mod topology;

pub use consumer::{Consumer, ConsumerHandle};
pub use envelope::{
    Acknowledge, DEFAULT_MAX_RETRIES, Disposition, EnvelopeHandler, Outcome, RETRY_COUNT_HEADER,
    RetryPolicy,
};
pub use error::{BoxError, MessagingError, Result, Unretryable};
pub use handler::{EventHandler, MessageHandler};
pub use memory::{Delivery, InMemoryBroker};
pub use message::{Headers, Message};
pub use publisher::{Publisher, PublisherExt};
pub use subscription::Subscription;
pub use topology::{Binding, DeadLetter, ExchangeKind, QueueSpec, routing_key_matches};
