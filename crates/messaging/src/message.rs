//! Transport envelope: body plus routing metadata and headers.

use std::collections::BTreeMap;

use common::IntegrationEvent;
use serde::de::DeserializeOwned;

use crate::Result;
use crate::envelope::RETRY_COUNT_HEADER;

/// Message headers. Values are JSON so integer counters survive a round trip.
pub type Headers = BTreeMap<String, serde_json::Value>;

/// A message as it travels through the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Exchange the message was published to.
    pub exchange: String,
    /// Routing key the message was published with.
    pub routing_key: String,
    /// Serialized JSON body.
    pub body: Vec<u8>,
    /// Transport headers.
    pub headers: Headers,
}

impl Message {
    /// Creates a message with no headers.
    pub fn new(exchange: impl Into<String>, routing_key: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            body,
            headers: Headers::new(),
        }
    }

    /// Serializes an event into a message addressed to its exchange and routing key.
    pub fn from_event<E: IntegrationEvent>(event: &E) -> Result<Self> {
        let body = serde_json::to_vec(event)?;
        Ok(Self::new(E::EXCHANGE, E::ROUTING_KEY, body))
    }

    /// Deserializes the body.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Returns a copy of the message with a header set.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Looks up a header value.
    pub fn header(&self, key: &str) -> Option<&serde_json::Value> {
        self.headers.get(key)
    }

    /// Number of times this message has been republished after a failure.
    ///
    /// An absent or non-integer header counts as zero.
    pub fn retry_count(&self) -> u32 {
        self.header(RETRY_COUNT_HEADER)
            .and_then(serde_json::Value::as_u64)
            .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
            .unwrap_or(0)
    }
}
