use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use containers::Attestation;
use metrics::SharedMetrics;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::encoding::GossipEncoding;
use crate::error::{NetworkError, Result};
use crate::gossipsub::{GossipTopic, PubsubMessage};
use crate::p2p::fork::ForkContext;
use crate::p2p::topics::TopicRegistry;
use crate::types::SubnetId;

pub const MAX_SUBNET_DISCOVERY_ATTEMPTS: usize = 3;

/// Finds and connects peers subscribed to an attestation subnet.
#[async_trait]
pub trait SubnetDiscovery: Send + Sync {
    /// `Ok(true)` when at least one matching peer was found.
    async fn find_peers_with_subnet(&self, subnet: SubnetId) -> anyhow::Result<bool>;
}

/// Publishes outgoing gossip.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<TopicRegistry>,
    encoding: Arc<dyn GossipEncoding>,
    fork_context: Arc<ForkContext>,
    discovery: Arc<dyn SubnetDiscovery>,
    subnet_locks: Arc<Vec<RwLock<()>>>,
    slot_duration: Duration,
    slots_per_epoch: u32,
    metrics: Option<SharedMetrics>,
}

impl Broadcaster {
    pub fn new(
        registry: Arc<TopicRegistry>,
        encoding: Arc<dyn GossipEncoding>,
        fork_context: Arc<ForkContext>,
        discovery: Arc<dyn SubnetDiscovery>,
        config: &chain::ChainConfig,
    ) -> Self {
        let subnet_locks = (0..config.attestation_subnet_count)
            .map(|_| RwLock::new(()))
            .collect();

        Self {
            registry,
            encoding,
            fork_context,
            discovery,
            subnet_locks: Arc::new(subnet_locks),
            slot_duration: config.slot_duration(),
            slots_per_epoch: u32::try_from(config.slots_per_epoch).unwrap_or(u32::MAX),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Publishes a message on its fixed topic within two slots.
    pub async fn broadcast(&self, message: &PubsubMessage, cancel: &CancellationToken) -> Result<()> {
        let result = match tokio::time::timeout(
            self.slot_duration.saturating_mul(2),
            self.publish_mapped(message, cancel),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(NetworkError::DeadlineExceeded),
        };

        if let Some(metrics) = &self.metrics {
            let outcome = if result.is_ok() { "ok" } else { "error" };
            metrics.inc_gossip_publish(message.type_name(), outcome);
        }
        result
    }

    async fn publish_mapped(&self, message: &PubsubMessage, cancel: &CancellationToken) -> Result<()> {
        let kind = message
            .topic_kind()
            .ok_or(NetworkError::MessageNotMapped(message.type_name()))?;
        let fork_digest = self.fork_context.fork_digest()?;
        let topic = GossipTopic::new(fork_digest, kind).with_suffix(&self.encoding.protocol_suffix());
        let data = self.encoding.encode_gossip(message)?;

        self.registry.publish(&topic, data, cancel).await?;
        debug!(topic, kind = message.type_name(), "Published gossip");
        Ok(())
    }

    /// Publishes an attestation on its subnet in the background.
    ///
    /// Only errors detectable before spawning are returned. Everything after
    /// that is logged and metered. The task runs under a one-epoch deadline
    /// and is not tied to any caller cancellation.
    pub fn broadcast_attestation(
        &self,
        subnet: SubnetId,
        attestation: Attestation,
    ) -> Result<JoinHandle<()>> {
        if subnet >= self.subnet_locks.len() as u64 {
            return Err(NetworkError::UnknownSubnet(subnet));
        }
        let fork_digest = self.fork_context.fork_digest()?;
        let topic = GossipTopic::attestation(fork_digest, subnet)
            .with_suffix(&self.encoding.protocol_suffix());

        let this = self.clone();
        let deadline = self.slot_duration.saturating_mul(self.slots_per_epoch);

        Ok(tokio::spawn(async move {
            let cancel = CancellationToken::new();
            let task = this.publish_attestation(subnet, &topic, attestation, &cancel);

            if tokio::time::timeout(deadline, task).await.is_err() {
                warn!(subnet, "Attestation broadcast timed out");
                this.meter_failure("deadline");
            }
        }))
    }

    async fn publish_attestation(
        &self,
        subnet: SubnetId,
        topic: &str,
        attestation: Attestation,
        cancel: &CancellationToken,
    ) {
        let lock = &self.subnet_locks[subnet as usize];

        let has_peer = {
            let _guard = lock.read().await;
            !self.registry.topic_peers(topic).is_empty()
        };

        if !has_peer {
            if let Some(metrics) = &self.metrics {
                metrics.inc_attestation_broadcast_attempt(subnet);
            }
            let _guard = lock.write().await;
            self.discover_subnet_peers(subnet).await;
        }

        let data = match self
            .encoding
            .encode_gossip(&PubsubMessage::Attestation(attestation))
        {
            Ok(data) => data,
            Err(error) => {
                warn!(subnet, %error, "Failed to encode attestation");
                self.meter_failure("encode");
                return;
            }
        };

        match self.registry.publish(topic, data, cancel).await {
            Ok(()) => {
                debug!(subnet, "Published attestation");
                if let Some(metrics) = &self.metrics {
                    metrics.inc_gossip_publish("attestation", "ok");
                }
            }
            Err(error) => {
                warn!(subnet, %error, "Failed to publish attestation");
                self.meter_failure("publish");
            }
        }
    }

    async fn discover_subnet_peers(&self, subnet: SubnetId) {
        for attempt in 1..=MAX_SUBNET_DISCOVERY_ATTEMPTS {
            match self.discovery.find_peers_with_subnet(subnet).await {
                Ok(true) => {
                    debug!(subnet, attempt, "Found subnet peers");
                    if let Some(metrics) = &self.metrics {
                        metrics.inc_subnet_discovery("found");
                        metrics.inc_saved_attestation_broadcast(subnet);
                    }
                    return;
                }
                Ok(false) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.inc_subnet_discovery("empty");
                    }
                }
                Err(error) => {
                    warn!(subnet, attempt, %error, "Subnet discovery failed");
                    if let Some(metrics) = &self.metrics {
                        metrics.inc_subnet_discovery("error");
                    }
                    self.meter_failure("discovery");
                    return;
                }
            }
        }
        debug!(subnet, "No subnet peers found");
    }

    fn meter_failure(&self, stage: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.inc_attestation_broadcast_failure(stage);
        }
    }
}
