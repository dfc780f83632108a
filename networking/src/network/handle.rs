use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use containers::{BlocksByRangeRequest, SignedBeaconBlock, Status};
use libp2p::Multiaddr;
use libp2p_identity::PeerId;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use crate::p2p::transport::{
    InboundGossip, PubsubTransport, Subscription, SubscriptionCounter, TopicHandle,
};
use crate::sync::fetcher::BlocksByRangeRequester;

/// Buffered inbound messages per subscription before new ones are dropped.
pub const SUBSCRIPTION_BUFFER: usize = 256;

#[derive(Debug)]
pub enum NetworkCommand {
    Join(String),
    Leave(String),
    Publish {
        topic: String,
        data: Vec<u8>,
        reply: oneshot::Sender<Result<()>>,
    },
    RequestBlocksByRange {
        peer: PeerId,
        request: BlocksByRangeRequest,
        reply: oneshot::Sender<Result<Vec<SignedBeaconBlock>>>,
    },
    Dial(Multiaddr),
}

/// State the swarm task writes and handles read.
#[derive(Debug, Default)]
pub struct SharedState {
    topic_peers: RwLock<HashMap<String, HashSet<PeerId>>>,
    subscribers: Mutex<HashMap<String, Vec<mpsc::Sender<InboundGossip>>>>,
    local_status: RwLock<Status>,
}

impl SharedState {
    pub fn add_topic_peer(&self, topic: &str, peer: PeerId) {
        self.topic_peers
            .write()
            .entry(topic.to_owned())
            .or_default()
            .insert(peer);
    }

    pub fn remove_topic_peer(&self, topic: &str, peer: &PeerId) {
        let mut topic_peers = self.topic_peers.write();
        if let Some(peers) = topic_peers.get_mut(topic) {
            peers.remove(peer);
            if peers.is_empty() {
                topic_peers.remove(topic);
            }
        }
    }

    pub fn remove_peer(&self, peer: &PeerId) {
        self.topic_peers.write().retain(|_, peers| {
            peers.remove(peer);
            !peers.is_empty()
        });
    }

    pub fn topic_peers(&self, topic: &str) -> Vec<PeerId> {
        self.topic_peers
            .read()
            .get(topic)
            .map(|peers| peers.iter().copied().collect())
            .unwrap_or_default()
    }

    fn add_subscriber(&self, topic: &str, sender: mpsc::Sender<InboundGossip>) {
        self.subscribers
            .lock()
            .entry(topic.to_owned())
            .or_default()
            .push(sender);
    }

    fn drop_subscribers(&self, topic: &str) {
        self.subscribers.lock().remove(topic);
    }

    /// Hands a message to every live subscription on its topic.
    pub fn deliver(&self, message: InboundGossip) -> usize {
        let mut subscribers = self.subscribers.lock();
        let Some(senders) = subscribers.get_mut(&message.topic) else {
            return 0;
        };

        senders.retain(|sender| !sender.is_closed());
        let mut delivered = 0;
        for sender in senders.iter() {
            match sender.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(err) => trace!(topic = %message.topic, ?err, "Subscription full, dropping message"),
            }
        }
        delivered
    }

    pub fn local_status(&self) -> Status {
        *self.local_status.read()
    }

    pub fn set_local_status(&self, status: Status) {
        *self.local_status.write() = status;
    }
}

/// Cloneable front end to the swarm task.
#[derive(Clone, Debug)]
pub struct NetworkHandle {
    commands: mpsc::UnboundedSender<NetworkCommand>,
    shared: Arc<SharedState>,
}

impl NetworkHandle {
    pub fn new(commands: mpsc::UnboundedSender<NetworkCommand>, shared: Arc<SharedState>) -> Self {
        Self { commands, shared }
    }

    fn send(&self, command: NetworkCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| anyhow!("network service stopped"))
    }

    pub fn dial(&self, addr: Multiaddr) -> Result<()> {
        self.send(NetworkCommand::Dial(addr))
    }

    pub fn set_local_status(&self, status: Status) {
        self.shared.set_local_status(status);
    }

    pub async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.send(NetworkCommand::Publish {
            topic: topic.to_owned(),
            data,
            reply,
        })?;
        response
            .await
            .map_err(|_| anyhow!("network service dropped publish of {topic}"))?
    }
}

impl PubsubTransport for NetworkHandle {
    fn join(&self, topic: &str) -> Result<Arc<dyn TopicHandle>> {
        self.send(NetworkCommand::Join(topic.to_owned()))?;
        Ok(Arc::new(NetworkTopic {
            topic: topic.to_owned(),
            handle: self.clone(),
            counter: SubscriptionCounter::default(),
        }))
    }

    fn list_peers(&self, topic: &str) -> Vec<PeerId> {
        self.shared.topic_peers(topic)
    }
}

#[async_trait]
impl BlocksByRangeRequester for NetworkHandle {
    async fn request_blocks_by_range(
        &self,
        peer: PeerId,
        request: BlocksByRangeRequest,
    ) -> Result<Vec<SignedBeaconBlock>> {
        let (reply, response) = oneshot::channel();
        self.send(NetworkCommand::RequestBlocksByRange {
            peer,
            request,
            reply,
        })?;
        response
            .await
            .map_err(|_| anyhow!("network service dropped range request to {peer}"))?
    }
}

/// A topic joined through the swarm.
struct NetworkTopic {
    topic: String,
    handle: NetworkHandle,
    counter: SubscriptionCounter,
}

#[async_trait]
impl TopicHandle for NetworkTopic {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn list_peers(&self) -> Vec<PeerId> {
        self.handle.shared.topic_peers(&self.topic)
    }

    async fn publish(&self, data: Vec<u8>) -> Result<()> {
        self.handle.publish(&self.topic, data).await
    }

    fn subscribe(&self) -> Result<Subscription> {
        let (sender, receiver) = mpsc::channel(SUBSCRIPTION_BUFFER);
        self.handle.shared.add_subscriber(&self.topic, sender);
        Ok(Subscription::new(self.topic.clone(), receiver, &self.counter))
    }

    fn active_subscriptions(&self) -> usize {
        self.counter.get()
    }

    fn close(&self) -> Result<()> {
        self.handle.shared.drop_subscribers(&self.topic);
        self.handle.send(NetworkCommand::Leave(self.topic.clone()))?;
        debug!(topic = %self.topic, "Closed topic");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use containers::Slot;

    fn handle() -> (NetworkHandle, mpsc::UnboundedReceiver<NetworkCommand>, Arc<SharedState>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(SharedState::default());
        (NetworkHandle::new(tx, Arc::clone(&shared)), rx, shared)
    }

    #[test]
    fn join_and_close_issue_commands() {
        let (handle, mut commands, _) = handle();

        let topic = handle.join("/eth2/00000000/beacon_block/ssz_snappy").unwrap();
        topic.close().unwrap();

        assert!(matches!(commands.try_recv(), Ok(NetworkCommand::Join(t)) if t.ends_with("beacon_block/ssz_snappy")));
        assert!(matches!(commands.try_recv(), Ok(NetworkCommand::Leave(_))));
    }

    #[test]
    fn topic_peers_follow_subscription_events() {
        let (handle, _commands, shared) = handle();
        let peer = PeerId::random();

        shared.add_topic_peer("a", peer);
        assert_eq!(handle.list_peers("a"), vec![peer]);

        shared.remove_peer(&peer);
        assert!(handle.list_peers("a").is_empty());
    }

    #[tokio::test]
    async fn inbound_gossip_reaches_subscribers() {
        let (handle, _commands, shared) = handle();
        let topic = handle.join("a").unwrap();
        let mut subscription = topic.subscribe().unwrap();
        assert_eq!(topic.active_subscriptions(), 1);

        let message = InboundGossip {
            topic: "a".into(),
            source: None,
            data: vec![9],
        };
        assert_eq!(shared.deliver(message.clone()), 1);
        assert_eq!(subscription.next().await, Some(message));

        drop(subscription);
        assert_eq!(topic.active_subscriptions(), 0);
        assert_eq!(
            shared.deliver(InboundGossip {
                topic: "a".into(),
                source: None,
                data: vec![],
            }),
            0
        );
    }

    #[tokio::test]
    async fn range_request_round_trips_through_service() {
        let (handle, mut commands, _) = handle();
        let peer = PeerId::random();

        let service = tokio::spawn(async move {
            match commands.recv().await {
                Some(NetworkCommand::RequestBlocksByRange { request, reply, .. }) => {
                    let mut block = SignedBeaconBlock::default();
                    block.message.slot = request.start_slot;
                    let _ = reply.send(Ok(vec![block]));
                }
                other => panic!("unexpected command {other:?}"),
            }
        });

        let blocks = handle
            .request_blocks_by_range(peer, BlocksByRangeRequest::new(Slot(64), 32, 1))
            .await
            .unwrap();
        service.await.unwrap();

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].slot(), Slot(64));
    }

    #[tokio::test]
    async fn stopped_service_is_an_error() {
        let (handle, commands, _) = handle();
        drop(commands);

        assert!(handle.publish("a", vec![1]).await.is_err());
        assert!(handle.join("a").is_err());
    }
}
