use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use containers::{Bytes32, ForkDigest, compute_fork_digest};
use libp2p_identity::PeerId;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::p2p::broadcaster::SubnetDiscovery;
use crate::p2p::fork::{ForkContext, GenesisInfo};
use crate::p2p::transport::{
    InboundGossip, PubsubTransport, Subscription, SubscriptionCounter, TopicHandle,
};
use crate::types::SubnetId;

pub const GENESIS_ROOT: [u8; 32] = [0x4b; 32];

pub fn ready_fork_context() -> Arc<ForkContext> {
    let context = ForkContext::new(chain::config::GENESIS_FORK_VERSION);
    context.set_genesis(GenesisInfo {
        genesis_time: 1_606_824_023,
        genesis_validators_root: Bytes32::from(GENESIS_ROOT),
    });
    Arc::new(context)
}

pub fn expected_digest() -> ForkDigest {
    compute_fork_digest(chain::config::GENESIS_FORK_VERSION, Bytes32::from(GENESIS_ROOT))
}

/// In-memory pub/sub shared by the transport and every handle it hands out.
#[derive(Default)]
pub struct MockState {
    peers: Mutex<HashMap<String, Vec<PeerId>>>,
    joins: Mutex<Vec<String>>,
    published: Mutex<Vec<(String, Vec<u8>)>>,
    closed: Mutex<Vec<String>>,
}

impl MockState {
    pub fn add_peer(&self, topic: &str) {
        self.peers
            .lock()
            .entry(topic.to_owned())
            .or_default()
            .push(PeerId::random());
    }

    pub fn joins(&self) -> Vec<String> {
        self.joins.lock().clone()
    }

    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().clone()
    }

    pub fn closed(&self) -> Vec<String> {
        self.closed.lock().clone()
    }
}

pub struct MockTransport {
    pub state: Arc<MockState>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Arc::new(MockState::default()),
        })
    }
}

impl PubsubTransport for MockTransport {
    fn join(&self, topic: &str) -> anyhow::Result<Arc<dyn TopicHandle>> {
        self.state.joins.lock().push(topic.to_owned());
        Ok(Arc::new(MockTopic {
            topic: topic.to_owned(),
            state: Arc::clone(&self.state),
            counter: SubscriptionCounter::default(),
            senders: Mutex::new(Vec::new()),
        }))
    }

    fn list_peers(&self, topic: &str) -> Vec<PeerId> {
        self.state.peers.lock().get(topic).cloned().unwrap_or_default()
    }
}

pub struct MockTopic {
    topic: String,
    state: Arc<MockState>,
    counter: SubscriptionCounter,
    senders: Mutex<Vec<mpsc::Sender<InboundGossip>>>,
}

#[async_trait]
impl TopicHandle for MockTopic {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn list_peers(&self) -> Vec<PeerId> {
        self.state.peers.lock().get(&self.topic).cloned().unwrap_or_default()
    }

    async fn publish(&self, data: Vec<u8>) -> anyhow::Result<()> {
        self.state.published.lock().push((self.topic.clone(), data));
        Ok(())
    }

    fn subscribe(&self) -> anyhow::Result<Subscription> {
        let (sender, receiver) = mpsc::channel(8);
        self.senders.lock().push(sender);
        Ok(Subscription::new(self.topic.clone(), receiver, &self.counter))
    }

    fn active_subscriptions(&self) -> usize {
        self.counter.get()
    }

    fn close(&self) -> anyhow::Result<()> {
        self.state.closed.lock().push(self.topic.clone());
        Ok(())
    }
}

/// Discovery replaying scripted outcomes. A successful lookup adds a peer to `topic`.
pub struct MockDiscovery {
    outcomes: Mutex<VecDeque<Result<bool, String>>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Duration,
    state: Arc<MockState>,
    topic: String,
}

impl MockDiscovery {
    pub fn new(outcomes: Vec<Result<bool, String>>, state: Arc<MockState>, topic: String) -> Arc<Self> {
        Self::with_delay(outcomes, state, topic, Duration::ZERO)
    }

    /// Each lookup takes `delay` before answering.
    pub fn with_delay(
        outcomes: Vec<Result<bool, String>>,
        state: Arc<MockState>,
        topic: String,
        delay: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            delay,
            state,
            topic,
        })
    }

    /// Most lookups ever running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SubnetDiscovery for MockDiscovery {
    async fn find_peers_with_subnet(&self, _subnet: SubnetId) -> anyhow::Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let outcome = self.outcomes.lock().pop_front().unwrap_or(Ok(false));
        match outcome {
            Ok(true) => {
                self.state.add_peer(&self.topic);
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(message) => Err(anyhow!(message)),
        }
    }
}
