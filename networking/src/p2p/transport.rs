use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use libp2p_identity::PeerId;
use tokio::sync::mpsc;

/// Pub/sub system the topic registry drives.
pub trait PubsubTransport: Send + Sync {
    /// Creates the shared handle for a topic. Called once per topic by the registry.
    ///
    /// The registry holds its topic map lock across this call, so it must not
    /// block or wait on the network; queue the work and return.
    fn join(&self, topic: &str) -> anyhow::Result<Arc<dyn TopicHandle>>;

    /// Peers known to be subscribed to `topic`, joined or not.
    fn list_peers(&self, topic: &str) -> Vec<PeerId>;
}

/// One joined topic.
#[async_trait]
pub trait TopicHandle: Send + Sync {
    fn topic(&self) -> &str;

    fn list_peers(&self) -> Vec<PeerId>;

    async fn publish(&self, data: Vec<u8>) -> anyhow::Result<()>;

    fn subscribe(&self) -> anyhow::Result<Subscription>;

    /// Subscriptions created from this handle that are still alive.
    fn active_subscriptions(&self) -> usize;

    /// Also runs under the registry's map lock and must not block.
    fn close(&self) -> anyhow::Result<()>;
}

/// Gossip message delivered to a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundGossip {
    pub topic: String,
    pub source: Option<PeerId>,
    /// Payload exactly as received, still compressed.
    pub data: Vec<u8>,
}

/// Live subscription to a topic; dropping it releases the topic.
#[derive(Debug)]
pub struct Subscription {
    topic: String,
    receiver: mpsc::Receiver<InboundGossip>,
    counter: SubscriptionCounter,
}

impl Subscription {
    pub fn new(
        topic: String,
        receiver: mpsc::Receiver<InboundGossip>,
        counter: &SubscriptionCounter,
    ) -> Self {
        counter.0.fetch_add(1, Ordering::AcqRel);
        Self {
            topic,
            receiver,
            counter: counter.clone(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn next(&mut self) -> Option<InboundGossip> {
        self.receiver.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.counter.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Shared count of live subscriptions on one topic handle.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionCounter(Arc<AtomicUsize>);

impl SubscriptionCounter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_tracks_live_subscriptions() {
        let counter = SubscriptionCounter::default();
        let (_tx, rx) = mpsc::channel(1);
        let (_tx2, rx2) = mpsc::channel(1);

        let first = Subscription::new("a".into(), rx, &counter);
        let second = Subscription::new("a".into(), rx2, &counter);
        assert_eq!(counter.get(), 2);

        drop(first);
        assert_eq!(counter.get(), 1);
        drop(second);
        assert_eq!(counter.get(), 0);
    }
}
