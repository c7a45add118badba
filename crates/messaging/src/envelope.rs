//! Retry-then-dead-letter policy applied at every consumer boundary.
//!
//! The retry count travels on the message itself in the `x-retry-count`
//! header. Each failed attempt republishes an identical body with the counter
//! incremented and acks the original, so the policy keeps no state between
//! messages and any number of workers can apply it.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures_util::FutureExt;

use crate::{BoxError, Message, MessageHandler, Publisher, Result, Unretryable};

/// Header carrying the number of times a message has been retried.
pub const RETRY_COUNT_HEADER: &str = "x-retry-count";

/// Retries allowed before a message is dead-lettered.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Settlement operations on a delivery taken from a queue.
#[async_trait]
pub trait Acknowledge: Send + Sync {
    /// The delivered message.
    fn message(&self) -> &Message;

    /// Acknowledges the delivery, removing it from the queue.
    async fn ack(&self) -> Result<()>;

    /// Negatively acknowledges without requeue; the broker dead-letters it.
    async fn reject(&self) -> Result<()>;

    /// Negatively acknowledges with requeue; the message is delivered again as is.
    async fn requeue(&self) -> Result<()>;
}

/// What to do with a message whose handler failed.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// Republish `message` (retry header set to `attempt`) and ack the original.
    Retry { attempt: u32, message: Message },
    /// Reject the original so it lands in the dead-letter queue.
    DeadLetter { retries: u32 },
}

/// Bounded retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
}

impl RetryPolicy {
    /// Creates a policy allowing `max_retries` republishes per message.
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// Returns the retry limit.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Decides the fate of a message whose handler just failed.
    pub fn decide(&self, message: &Message) -> Disposition {
        let retries = message.retry_count();
        if retries < self.max_retries {
            let attempt = retries + 1;
            let retry = message.clone().with_header(RETRY_COUNT_HEADER, attempt);
            Disposition::Retry {
                attempt,
                message: retry,
            }
        } else {
            Disposition::DeadLetter { retries }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES)
    }
}

/// How a delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Handler succeeded.
    Acked,
    /// Handler failed; a copy was republished with this retry count.
    Retried { attempt: u32 },
    /// Handler failed with retries exhausted.
    DeadLettered,
    /// Handler failed and the retry copy could not be published; the
    /// original went back on the queue unchanged.
    Requeued,
}

/// Wraps a consumer's handler with the retry/dead-letter policy.
#[derive(Clone)]
pub struct EnvelopeHandler<P: Publisher> {
    publisher: P,
    policy: RetryPolicy,
}

impl<P: Publisher> EnvelopeHandler<P> {
    /// Creates an envelope handler republishing through `publisher`.
    pub fn new(publisher: P, policy: RetryPolicy) -> Self {
        Self { publisher, policy }
    }

    /// Returns the retry policy in effect.
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Runs `handler` on a delivery and settles it according to the result.
    ///
    /// A panicking handler counts as a failed attempt.
    pub async fn dispatch<D: Acknowledge>(
        &self,
        delivery: &D,
        handler: &dyn MessageHandler,
    ) -> Result<Outcome> {
        let result = AssertUnwindSafe(handler.handle(delivery.message()))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(panic_error(payload)));

        match result {
            Ok(()) => {
                delivery.ack().await?;
                metrics::counter!("messages_processed_total").increment(1);
                Ok(Outcome::Acked)
            }
            Err(error) => self.on_failure(delivery, &error).await,
        }
    }

    /// Settles a delivery whose handler failed.
    ///
    /// Retries are republished to the message's original exchange and
    /// routing key, so every other queue bound to that key also receives the
    /// copy with the raised `x-retry-count`. Consumers must be idempotent, and
    /// a sibling queue's retry budget is shared with the failing one.
    /// An [`Unretryable`] error dead-letters the message without retrying.
    #[tracing::instrument(
        skip(self, delivery, error),
        fields(
            routing_key = %delivery.message().routing_key,
            retry_count = delivery.message().retry_count(),
        )
    )]
    pub async fn on_failure<D: Acknowledge>(
        &self,
        delivery: &D,
        error: &BoxError,
    ) -> Result<Outcome> {
        let disposition = if error.is::<Unretryable>() {
            Disposition::DeadLetter {
                retries: delivery.message().retry_count(),
            }
        } else {
            self.policy.decide(delivery.message())
        };

        match disposition {
            Disposition::Retry { attempt, message } => {
                tracing::warn!(
                    attempt,
                    max_retries = self.policy.max_retries(),
                    %error,
                    "retrying message"
                );

                if let Err(publish_error) = self.publisher.publish(message).await {
                    tracing::error!(
                        error = %publish_error,
                        "failed to republish message for retry, requeueing original"
                    );
                    delivery.requeue().await?;
                    return Ok(Outcome::Requeued);
                }

                delivery.ack().await?;
                metrics::counter!("messages_retried_total").increment(1);
                Ok(Outcome::Retried { attempt })
            }
            Disposition::DeadLetter { retries } => {
                tracing::error!(retries, %error, "message failed after retries, routing to dead-letter");
                delivery.reject().await?;
                metrics::counter!("messages_dead_lettered_total").increment(1);
                Ok(Outcome::DeadLettered)
            }
        }
    }
}

fn panic_error(payload: Box<dyn Any + Send>) -> BoxError {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    format!("handler panicked: {detail}").into()
}
