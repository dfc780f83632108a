use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use libp2p_identity::PeerId;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{NetworkError, Result};
use crate::p2p::fork::ForkContext;
use crate::p2p::transport::{PubsubTransport, Subscription, TopicHandle};

/// How often `publish` re-checks a topic for peers.
pub const PEER_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Joined topics, one handle per topic string.
///
/// The mutex only guards the map. It is never held across an await point.
pub struct TopicRegistry {
    transport: Arc<dyn PubsubTransport>,
    fork_context: Arc<ForkContext>,
    topics: Mutex<HashMap<String, Arc<dyn TopicHandle>>>,
    poll_interval: Duration,
}

impl TopicRegistry {
    pub fn new(transport: Arc<dyn PubsubTransport>, fork_context: Arc<ForkContext>) -> Self {
        Self {
            transport,
            fork_context,
            topics: Mutex::new(HashMap::new()),
            poll_interval: PEER_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Returns the existing handle or joins the topic on the transport.
    pub fn join(&self, topic: &str) -> Result<Arc<dyn TopicHandle>> {
        let mut topics = self.topics.lock();
        if let Some(handle) = topics.get(topic) {
            return Ok(Arc::clone(handle));
        }

        let handle = self.transport.join(topic)?;
        topics.insert(topic.to_owned(), Arc::clone(&handle));
        debug!(topic, "Joined topic");
        Ok(handle)
    }

    /// Closes and forgets a topic. Leaving a topic that was never joined is a no-op.
    pub fn leave(&self, topic: &str) -> Result<()> {
        let mut topics = self.topics.lock();
        let Some(handle) = topics.get(topic) else {
            return Ok(());
        };

        if handle.active_subscriptions() > 0 {
            return Err(NetworkError::TopicInUse(topic.to_owned()));
        }

        handle.close()?;
        topics.remove(topic);
        info!(topic, "Left topic");
        Ok(())
    }

    /// Publishes once the topic has at least one peer.
    pub async fn publish(
        &self,
        topic: &str,
        data: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let handle = self.join(topic)?;

        loop {
            if !handle.list_peers().is_empty() {
                handle.publish(data).await?;
                return Ok(());
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(NetworkError::Cancelled),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    /// Subscribes after genesis is known.
    pub async fn subscribe(&self, topic: &str, cancel: &CancellationToken) -> Result<Subscription> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(NetworkError::Cancelled),
            ready = self.fork_context.wait_until_ready() => { ready?; }
        }

        let handle = self.join(topic)?;
        let subscription = handle.subscribe()?;
        info!(topic, "Subscribed to topic");
        Ok(subscription)
    }

    /// Peers subscribed to `topic` whether or not we joined it.
    pub fn topic_peers(&self, topic: &str) -> Vec<PeerId> {
        self.transport.list_peers(topic)
    }

    pub fn joined_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.topics.lock().keys().cloned().collect();
        topics.sort();
        topics
    }
}
