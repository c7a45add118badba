//! Exchange, queue and binding declarations.

/// Routing behaviour of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeKind {
    /// Routes by matching the routing key against binding patterns.
    Topic,
    /// Routes to every bound queue regardless of routing key.
    Fanout,
}

/// Declaration of a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSpec {
    pub name: String,
    pub durable: bool,
    /// Exchange that receives messages rejected without requeue.
    pub dead_letter_exchange: Option<String>,
}

impl QueueSpec {
    /// Declares a durable queue without dead-lettering.
    pub fn durable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            durable: true,
            dead_letter_exchange: None,
        }
    }

    /// Routes rejected messages to the given exchange.
    pub fn with_dead_letter_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.dead_letter_exchange = Some(exchange.into());
        self
    }
}

/// Binding of a queue to an exchange under a routing pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub queue: String,
    pub exchange: String,
    pub routing_key: String,
}

/// Per-service dead-letter exchange and queue names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    /// Fanout exchange named in the `dead_letter_exchange` of the service's queues.
    pub exchange: String,
    /// Queue collecting dead-lettered messages for manual inspection.
    pub queue: String,
}

impl DeadLetter {
    /// Dead-letter names for a service, e.g. `inventory-service.dead-letter`.
    pub fn for_service(service: &str) -> Self {
        Self {
            exchange: format!("{service}.dead-letter"),
            queue: format!("{service}.dead-letter.queue"),
        }
    }
}

/// Matches a routing key against a topic binding pattern.
///
/// Words are separated by `.`; `*` matches exactly one word and `#` matches
/// zero or more words.
pub fn routing_key_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    matches_words(&pattern, &key)
}

fn matches_words(pattern: &[&str], key: &[&str]) -> bool {
    match (pattern.split_first(), key.split_first()) {
        (None, None) => true,
        (Some((&"#", rest)), _) => {
            matches_words(rest, key)
                || key
                    .split_first()
                    .is_some_and(|(_, key_rest)| matches_words(pattern, key_rest))
        }
        (Some((&"*", rest)), Some((_, key_rest))) => matches_words(rest, key_rest),
        (Some((word, rest)), Some((key_word, key_rest))) => {
            word == key_word && matches_words(rest, key_rest)
        }
        _ => false,
    }
}
