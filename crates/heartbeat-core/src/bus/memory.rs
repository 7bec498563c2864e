//! In-process bus delivering each publish to every live subscriber of the exact topic.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

use super::{BusError, BusMessage, BusResult, MessageBus, Subscription};

#[derive(Debug, Default)]
pub struct MemoryBus {
    subscribers: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<BusMessage>>>>,
    offline: AtomicBool,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every publish fails.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of live subscriptions on a topic
    pub fn subscriber_count(&self, topic: &str) -> usize {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match subscribers.get_mut(topic) {
            Some(senders) => {
                senders.retain(|s| !s.is_closed());
                senders.len()
            }
            None => 0,
        }
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> BusResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(BusError::Publish(format!("bus offline, topic {}", topic)));
        }

        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(senders) = subscribers.get_mut(topic) {
            let message = BusMessage {
                topic: topic.to_string(),
                payload,
            };
            senders.retain(|sender| sender.send(message.clone()).is_ok());
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> BusResult<Subscription> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(topic.to_string())
            .or_default()
            .push(sender);
        Ok(Subscription::new(topic, receiver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_exact_topic_only() {
        let bus = MemoryBus::new();
        let mut alpha = bus.subscribe("alpha/ping").await.unwrap();
        let mut beta = bus.subscribe("beta/ping").await.unwrap();

        bus.publish("alpha/ping", b"hello".to_vec()).await.unwrap();

        let message = alpha.recv().await.unwrap();
        assert_eq!(message.topic, "alpha/ping");
        assert_eq!(message.payload, b"hello");
        assert!(beta.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_fan_out_to_all_subscribers() {
        let bus = MemoryBus::new();
        let mut first = bus.subscribe("t").await.unwrap();
        let mut second = bus.subscribe("t").await.unwrap();

        bus.publish("t", b"x".to_vec()).await.unwrap();

        assert!(first.recv().await.is_some());
        assert!(second.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_pruned() {
        let bus = MemoryBus::new();
        let sub = bus.subscribe("t").await.unwrap();
        assert_eq!(bus.subscriber_count("t"), 1);

        drop(sub);
        bus.publish("t", b"x".to_vec()).await.unwrap();
        assert_eq!(bus.subscriber_count("t"), 0);
    }

    #[tokio::test]
    async fn test_offline_bus_fails_publish() {
        let bus = MemoryBus::new();
        bus.set_offline(true);

        assert!(matches!(
            bus.publish("t", vec![]).await,
            Err(BusError::Publish(_))
        ));
    }
}
