//! Consumer workers pulling from subscribed queues.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::{
    DeadLetter, EnvelopeHandler, ExchangeKind, InMemoryBroker, Outcome, QueueSpec, Result,
    RetryPolicy, Subscription,
};

/// Runs a service's subscription table against the broker.
///
/// Every delivery goes through the [`EnvelopeHandler`], so handlers only
/// report success or failure and never settle messages themselves.
pub struct Consumer {
    broker: InMemoryBroker,
    envelope: Arc<EnvelopeHandler<InMemoryBroker>>,
    subscriptions: Vec<Subscription>,
}

impl Consumer {
    /// Creates a consumer with an empty subscription table.
    pub fn new(broker: InMemoryBroker, policy: RetryPolicy) -> Self {
        let envelope = Arc::new(EnvelopeHandler::new(broker.clone(), policy));
        Self {
            broker,
            envelope,
            subscriptions: Vec::new(),
        }
    }

    /// Adds a row to the subscription table.
    pub fn subscribe(mut self, subscription: Subscription) -> Self {
        self.subscriptions.push(subscription);
        self
    }

    /// Returns the subscription table.
    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }

    /// Declares the exchanges, queues, bindings and dead-letter plumbing the
    /// subscription table needs. Safe to call repeatedly.
    pub async fn declare(&self) -> Result<()> {
        for subscription in &self.subscriptions {
            self.broker
                .declare_exchange(&subscription.exchange, ExchangeKind::Topic)
                .await;

            if let Some(dlx) = &subscription.queue.dead_letter_exchange {
                let dead_letter = DeadLetter {
                    exchange: dlx.clone(),
                    queue: format!("{dlx}.queue"),
                };
                self.broker
                    .declare_exchange(&dead_letter.exchange, ExchangeKind::Fanout)
                    .await;
                self.broker
                    .declare_queue(QueueSpec::durable(&dead_letter.queue))
                    .await;
                self.broker
                    .bind_queue(&dead_letter.queue, &dead_letter.exchange, "")
                    .await?;
            }

            self.broker.declare_queue(subscription.queue.clone()).await;
            self.broker
                .bind_queue(
                    &subscription.queue.name,
                    &subscription.exchange,
                    &subscription.routing_key,
                )
                .await?;

            tracing::info!(
                queue = %subscription.queue.name,
                exchange = %subscription.exchange,
                routing_key = %subscription.routing_key,
                "subscription declared"
            );
        }
        Ok(())
    }

    /// Processes messages already waiting on the subscribed queues until all of
    /// them are empty, including retries and messages published by handlers
    /// onto other subscribed queues. Returns the number of deliveries handled.
    pub async fn drain(&self) -> Result<usize> {
        let mut handled = 0;
        loop {
            let mut progressed = false;
            for subscription in &self.subscriptions {
                while let Some(delivery) = self.broker.try_receive(&subscription.queue.name).await?
                {
                    self.envelope
                        .dispatch(&delivery, subscription.handler.as_ref())
                        .await?;
                    handled += 1;
                    progressed = true;
                }
            }
            if !progressed {
                return Ok(handled);
            }
        }
    }

    /// Spawns `workers_per_queue` worker tasks for every subscription.
    pub fn spawn(self, workers_per_queue: usize) -> ConsumerHandle {
        let (shutdown, stop) = watch::channel(false);
        let mut handles = Vec::new();
        for subscription in self.subscriptions {
            for worker in 0..workers_per_queue.max(1) {
                let broker = self.broker.clone();
                let envelope = self.envelope.clone();
                let subscription = subscription.clone();
                let stop = stop.clone();
                handles.push(tokio::spawn(async move {
                    run_worker(broker, envelope, subscription, worker, stop).await;
                }));
            }
        }
        ConsumerHandle { shutdown, handles }
    }
}

async fn run_worker(
    broker: InMemoryBroker,
    envelope: Arc<EnvelopeHandler<InMemoryBroker>>,
    subscription: Subscription,
    worker: usize,
    mut stop: watch::Receiver<bool>,
) {
    let queue = subscription.queue.name.clone();
    tracing::debug!(%queue, worker, "consumer worker started");

    loop {
        // Only the wait is cancelled on shutdown; a delivery in hand is
        // always dispatched and settled first.
        let received = tokio::select! {
            Ok(_) = stop.wait_for(|stopped| *stopped) => {
                tracing::debug!(%queue, worker, "consumer worker shutting down");
                return;
            }
            received = broker.receive(&queue) => received,
        };

        let delivery = match received {
            Ok(delivery) => delivery,
            Err(error) => {
                tracing::error!(%queue, worker, %error, "consumer worker stopped");
                return;
            }
        };

        let started = Instant::now();
        match envelope
            .dispatch(&delivery, subscription.handler.as_ref())
            .await
        {
            Ok(Outcome::Acked) => {}
            Ok(outcome) => tracing::debug!(%queue, worker, ?outcome, "delivery settled after failure"),
            Err(error) => tracing::error!(%queue, worker, %error, "failed to settle delivery"),
        }
        metrics::histogram!("message_handling_seconds", "queue" => queue.clone())
            .record(started.elapsed().as_secs_f64());
    }
}

/// Handle to running consumer workers.
pub struct ConsumerHandle {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl ConsumerHandle {
    /// Number of running worker tasks.
    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Stops all workers and waits for them to finish.
    ///
    /// Idle workers stop at once. A worker in the middle of a delivery
    /// finishes and settles it before stopping.
    pub async fn shutdown(self) {
        self.shutdown.send_replace(true);
        for result in futures_util::future::join_all(self.handles).await {
            if let Err(error) = result {
                tracing::error!(%error, "consumer worker ended abnormally");
            }
        }
    }
}
