//! Publish/subscribe capability consumed by the pinger and the response listener
//!
//! Connection setup, retries and wire framing belong to the bus client behind
//! this trait; the monitor only publishes payloads and consumes subscriptions.

mod memory;

pub use memory::MemoryBus;

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;

/// Bus errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BusError {
    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("Bus closed")]
    Closed,
}

pub type BusResult<T> = std::result::Result<T, BusError>;

/// A message delivered to a subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Live subscription to one topic
#[derive(Debug)]
pub struct Subscription {
    topic: String,
    receiver: mpsc::UnboundedReceiver<BusMessage>,
}

impl Subscription {
    pub fn new(topic: impl Into<String>, receiver: mpsc::UnboundedReceiver<BusMessage>) -> Self {
        Self {
            topic: topic.into(),
            receiver,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next message, or `None` once the bus side is gone.
    pub async fn recv(&mut self) -> Option<BusMessage> {
        self.receiver.recv().await
    }
}

/// Publish/subscribe message bus
#[async_trait]
pub trait MessageBus: Send + Sync + fmt::Debug {
    /// Publish one payload to a topic
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> BusResult<()>;

    /// Subscribe to a topic
    async fn subscribe(&self, topic: &str) -> BusResult<Subscription>;
}
