use std::{
    collections::HashMap,
    net::IpAddr,
    num::{NonZeroU8, NonZeroUsize},
    sync::Arc,
};

use anyhow::{Result, anyhow};
use containers::SignedBeaconBlock;
use futures::StreamExt;
use libp2p::{
    Multiaddr, SwarmBuilder,
    connection_limits::{self, ConnectionLimits},
    gossipsub::{Event, IdentTopic, IdentityTransform, MessageAuthenticity, PublishError},
    identify,
    multiaddr::Protocol,
    request_response::OutboundRequestId,
    swarm::{Config, Swarm, SwarmEvent},
};
use libp2p_identity::{Keypair, PeerId};
use metrics::SharedMetrics;
use tokio::select;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{debug, info, trace, warn};

use crate::{
    bootnodes::StaticBootnodes,
    gossipsub::{self, config::GossipsubConfig},
    network::behaviour::{BeaconNetworkBehaviour, BeaconNetworkBehaviourEvent},
    network::handle::{NetworkCommand, NetworkHandle, SharedState},
    p2p::transport::InboundGossip,
    req_resp::{self, Eth2Request, Eth2Response, ReqRespMessage},
    sync::peer_manager::SharedPeerManager,
    types::{ConnectionState, MAX_REQUEST_BLOCKS},
};

type RangeReply = oneshot::Sender<Result<Vec<SignedBeaconBlock>>>;

#[derive(Debug, Clone)]
pub struct NetworkServiceConfig {
    pub gossipsub_config: GossipsubConfig,
    pub socket_address: IpAddr,
    pub socket_port: u16,
    pub bootnodes: StaticBootnodes,
}

impl NetworkServiceConfig {
    pub fn new(
        gossipsub_config: GossipsubConfig,
        socket_address: IpAddr,
        socket_port: u16,
        bootnodes: Vec<String>,
    ) -> Self {
        NetworkServiceConfig {
            gossipsub_config,
            socket_address,
            socket_port,
            bootnodes: StaticBootnodes::parse(&bootnodes),
        }
    }
}

#[derive(Debug)]
pub enum NetworkEvent {
    PeerConnectedIncoming(PeerId),
    PeerConnectedOutgoing(PeerId),
    PeerDisconnected(PeerId),
    Status(PeerId),
}

/// Owns the swarm. Everything else talks to it through a [`NetworkHandle`].
pub struct NetworkService {
    network_config: Arc<NetworkServiceConfig>,
    swarm: Swarm<BeaconNetworkBehaviour>,
    commands: mpsc::UnboundedReceiver<NetworkCommand>,
    shared: Arc<SharedState>,
    peer_manager: SharedPeerManager,
    pending_range_requests: HashMap<OutboundRequestId, RangeReply>,
    metrics: Option<SharedMetrics>,
}

impl NetworkService {
    pub fn new(
        network_config: Arc<NetworkServiceConfig>,
        local_key: Keypair,
        peer_manager: SharedPeerManager,
    ) -> Result<(Self, NetworkHandle)> {
        let behaviour = Self::build_behaviour(&local_key, &network_config)?;

        let config = Config::with_tokio_executor()
            .with_notify_handler_buffer_size(NonZeroUsize::new(7).unwrap_or(NonZeroUsize::MIN))
            .with_per_connection_event_buffer_size(4)
            .with_dial_concurrency_factor(NonZeroU8::MIN);

        let multiaddr = Self::multiaddr(&network_config);
        let swarm = SwarmBuilder::with_existing_identity(local_key)
            .with_tokio()
            .with_quic()
            .with_behaviour(|_| behaviour)?
            .with_swarm_config(|_| config)
            .build();

        let (command_tx, commands) = mpsc::unbounded_channel();
        let shared = Arc::new(SharedState::default());
        let handle = NetworkHandle::new(command_tx, Arc::clone(&shared));

        let mut service = Self {
            network_config,
            swarm,
            commands,
            shared,
            peer_manager,
            pending_range_requests: HashMap::new(),
            metrics: None,
        };

        service.listen(&multiaddr)?;

        Ok((service, handle))
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn start(&mut self) -> Result<()> {
        self.connect_to_peers(self.network_config.bootnodes.to_multiaddrs());

        // Periodic reconnect attempts to bootnodes
        let mut reconnect_interval = interval(Duration::from_secs(30));
        reconnect_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            select! {
                _ = reconnect_interval.tick() => {
                    self.connect_to_peers(self.network_config.bootnodes.to_multiaddrs());
                }
                Some(command) = self.commands.recv() => {
                    self.dispatch_command(command);
                }
                event = self.swarm.select_next_some() => {
                    if let Some(event) = self.parse_swarm_event(event) {
                        debug!(?event, "Swarm event");
                    }
                }
            }
        }
    }

    fn parse_swarm_event(
        &mut self,
        event: SwarmEvent<BeaconNetworkBehaviourEvent>,
    ) -> Option<NetworkEvent> {
        match event {
            SwarmEvent::Behaviour(BeaconNetworkBehaviourEvent::Gossipsub(event)) => {
                self.handle_gossipsub_event(event);
                None
            }
            SwarmEvent::Behaviour(BeaconNetworkBehaviourEvent::ReqResp(event)) => {
                self.handle_request_response_event(event)
            }
            SwarmEvent::Behaviour(BeaconNetworkBehaviourEvent::Identify(event)) => {
                self.handle_identify_event(event);
                None
            }
            SwarmEvent::Behaviour(_) => None,
            SwarmEvent::ConnectionEstablished {
                peer_id, endpoint, ..
            } => {
                let connected = {
                    let mut manager = self.peer_manager.write();
                    manager
                        .add_peer(peer_id, ConnectionState::Connected)
                        .connection_state = ConnectionState::Connected;
                    manager.connected_count()
                };
                self.record_peer_count(connected);

                info!(peer = %peer_id, "Connected to peer (total: {})", connected);

                if endpoint.is_dialer() {
                    self.send_status_request(peer_id);
                    Some(NetworkEvent::PeerConnectedOutgoing(peer_id))
                } else {
                    Some(NetworkEvent::PeerConnectedIncoming(peer_id))
                }
            }
            SwarmEvent::ConnectionClosed {
                peer_id,
                num_established,
                ..
            } => {
                if num_established > 0 {
                    return None;
                }

                let connected = {
                    let mut manager = self.peer_manager.write();
                    manager.update_connection_state(&peer_id, ConnectionState::Disconnected);
                    manager.connected_count()
                };
                self.shared.remove_peer(&peer_id);
                self.record_peer_count(connected);

                info!(peer = %peer_id, "Disconnected from peer (total: {})", connected);
                Some(NetworkEvent::PeerDisconnected(peer_id))
            }
            SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                warn!(?peer_id, ?error, "Failed to connect to peer");
                if let Some(peer_id) = peer_id {
                    self.peer_manager
                        .write()
                        .update_connection_state(&peer_id, ConnectionState::Disconnected);
                }
                None
            }
            SwarmEvent::NewListenAddr { address, .. } => {
                info!(%address, "Listening on");
                None
            }
            SwarmEvent::NewExternalAddrCandidate { address } => {
                debug!(?address, "New external address candidate");
                self.swarm.add_external_address(address);
                None
            }
            _ => {
                trace!(?event, "Unhandled swarm event");
                None
            }
        }
    }

    fn handle_gossipsub_event(&mut self, event: Event) {
        match event {
            Event::Subscribed { peer_id, topic } => {
                debug!(peer = %peer_id, topic = %topic, "A peer subscribed to topic");
                self.shared.add_topic_peer(topic.as_str(), peer_id);
            }
            Event::Unsubscribed { peer_id, topic } => {
                debug!(peer = %peer_id, topic = %topic, "A peer unsubscribed from topic");
                self.shared.remove_topic_peer(topic.as_str(), &peer_id);
            }
            Event::Message {
                propagation_source,
                message,
                ..
            } => {
                let delivered = self.shared.deliver(InboundGossip {
                    topic: message.topic.to_string(),
                    source: message.source.or(Some(propagation_source)),
                    data: message.data,
                });
                trace!(topic = %message.topic, delivered, "Gossip received");
            }
            _ => {
                trace!(?event, "Unhandled gossipsub event");
            }
        }
    }

    fn handle_request_response_event(&mut self, event: ReqRespMessage) -> Option<NetworkEvent> {
        use libp2p::request_response::{Event, Message};

        match event {
            Event::Message { peer, message, .. } => match message {
                Message::Response {
                    request_id,
                    response,
                } => match response {
                    Eth2Response::BlocksByRange(blocks) => {
                        debug!(peer = %peer, num_blocks = blocks.len(), "Received BlocksByRange response");
                        self.complete_range_request(request_id, Ok(blocks));
                        None
                    }
                    Eth2Response::Status(status) => {
                        debug!(peer = %peer, head_slot = %status.head_slot, "Received Status response");
                        self.peer_manager.write().update_status(&peer, status);
                        Some(NetworkEvent::Status(peer))
                    }
                    Eth2Response::Empty => {
                        self.complete_range_request(request_id, Ok(Vec::new()));
                        None
                    }
                },
                Message::Request {
                    request, channel, ..
                } => {
                    let response = match request {
                        Eth2Request::Status(status) => {
                            debug!(peer = %peer, head_slot = %status.head_slot, "Received Status request");
                            self.peer_manager.write().update_status(&peer, status);
                            Eth2Response::Status(self.shared.local_status())
                        }
                        Eth2Request::BlocksByRange(request) => {
                            // No local block store to serve from.
                            debug!(
                                peer = %peer,
                                start_slot = %request.start_slot,
                                count = request.count,
                                "Received BlocksByRange request"
                            );
                            Eth2Response::BlocksByRange(Vec::new())
                        }
                    };

                    if let Err(response) = self
                        .swarm
                        .behaviour_mut()
                        .req_resp
                        .send_response(channel, response)
                    {
                        warn!(peer = %peer, ?response, "Failed to send response");
                    }
                    None
                }
            },
            Event::OutboundFailure {
                peer,
                request_id,
                error,
                ..
            } => {
                warn!(peer = %peer, ?error, "Request failed");
                self.complete_range_request(request_id, Err(anyhow!("request to {peer} failed: {error}")));
                None
            }
            Event::InboundFailure { peer, error, .. } => {
                warn!(peer = %peer, ?error, "Inbound request failed");
                None
            }
            Event::ResponseSent { peer, .. } => {
                trace!(peer = %peer, "Response sent");
                None
            }
        }
    }

    fn handle_identify_event(&mut self, event: identify::Event) {
        match event {
            identify::Event::Received { peer_id, info, .. } => {
                debug!(
                    peer = %peer_id,
                    agent_version = %info.agent_version,
                    protocol_version = %info.protocol_version,
                    listen_addrs = info.listen_addrs.len(),
                    "Received peer info"
                );
            }
            identify::Event::Error { peer_id, error, .. } => {
                warn!(peer = %peer_id, ?error, "Identify error");
            }
            _ => {}
        }
    }

    fn complete_range_request(
        &mut self,
        request_id: OutboundRequestId,
        result: Result<Vec<SignedBeaconBlock>>,
    ) {
        if let Some(reply) = self.pending_range_requests.remove(&request_id) {
            if reply.send(result).is_err() {
                trace!(?request_id, "Range request caller went away");
            }
        }
    }

    fn dispatch_command(&mut self, command: NetworkCommand) {
        match command {
            NetworkCommand::Join(topic) => {
                match self
                    .swarm
                    .behaviour_mut()
                    .gossipsub
                    .subscribe(&IdentTopic::new(topic.clone()))
                {
                    Ok(_) => info!(topic, "Subscribed to topic"),
                    Err(err) => warn!(topic, ?err, "Subscribe failed"),
                }
            }
            NetworkCommand::Leave(topic) => {
                let unsubscribed = self
                    .swarm
                    .behaviour_mut()
                    .gossipsub
                    .unsubscribe(&IdentTopic::new(topic.clone()));
                info!(topic, ?unsubscribed, "Unsubscribed from topic");
            }
            NetworkCommand::Publish { topic, data, reply } => {
                let result = match self
                    .swarm
                    .behaviour_mut()
                    .gossipsub
                    .publish(IdentTopic::new(topic.clone()), data)
                {
                    Ok(_) => Ok(()),
                    // We also receive our own messages back from peers.
                    Err(PublishError::Duplicate) => {
                        debug!(topic, "Duplicate publish ignored");
                        Ok(())
                    }
                    Err(err) => Err(anyhow!("publish to {topic} failed: {err:?}")),
                };
                if reply.send(result).is_err() {
                    trace!("Publish caller went away");
                }
            }
            NetworkCommand::RequestBlocksByRange {
                peer,
                request,
                reply,
            } => {
                if request.count > MAX_REQUEST_BLOCKS {
                    let _ = reply.send(Err(anyhow!(
                        "range request of {} blocks exceeds {MAX_REQUEST_BLOCKS}",
                        request.count
                    )));
                    return;
                }

                debug!(
                    peer = %peer,
                    start_slot = %request.start_slot,
                    count = request.count,
                    step = request.step,
                    "Sending BlocksByRange request"
                );
                let request_id = self
                    .swarm
                    .behaviour_mut()
                    .req_resp
                    .send_request(&peer, Eth2Request::BlocksByRange(request));
                self.pending_range_requests.insert(request_id, reply);
            }
            NetworkCommand::Dial(addr) => self.connect_to_peers(vec![addr]),
        }
    }

    fn connect_to_peers(&mut self, peers: Vec<Multiaddr>) {
        for peer in peers {
            let Some(Protocol::P2p(peer_id)) = peer
                .iter()
                .find(|protocol| matches!(protocol, Protocol::P2p(_)))
            else {
                trace!(%peer, "Skipping address without peer id");
                continue;
            };
            if peer_id == self.local_peer_id() {
                continue;
            }

            let current_state = self
                .peer_manager
                .read()
                .get_peer(&peer_id)
                .map(|peer| peer.connection_state);
            if !matches!(
                current_state,
                Some(ConnectionState::Disconnected) | None
            ) {
                trace!(?peer_id, "Already connected");
                continue;
            }

            if let Err(err) = self.swarm.dial(peer.clone()) {
                warn!(?err, "Failed to dial peer");
                continue;
            }

            info!(peer = %peer_id, "Dialing peer");
            let mut manager = self.peer_manager.write();
            manager.add_peer(peer_id, ConnectionState::Connecting).connection_state =
                ConnectionState::Connecting;
        }
    }

    fn record_peer_count(&self, connected: usize) {
        if let Some(metrics) = &self.metrics {
            metrics.set_peers(i64::try_from(connected).unwrap_or(i64::MAX));
        }
    }

    pub fn local_peer_id(&self) -> PeerId {
        *self.swarm.local_peer_id()
    }

    fn send_status_request(&mut self, peer_id: PeerId) {
        let request = Eth2Request::Status(self.shared.local_status());

        debug!(peer = %peer_id, "Sending Status request for handshake");
        let _request_id = self
            .swarm
            .behaviour_mut()
            .req_resp
            .send_request(&peer_id, request);
    }

    fn build_behaviour(
        local_key: &Keypair,
        cfg: &NetworkServiceConfig,
    ) -> Result<BeaconNetworkBehaviour> {
        let identify = Self::build_identify(local_key);
        let gossipsub = gossipsub::GossipsubBehaviour::new_with_transform(
            MessageAuthenticity::Anonymous,
            cfg.gossipsub_config.config.clone(),
            IdentityTransform,
        )
        .map_err(|err| anyhow!("Failed to create gossipsub behaviour: {err:?}"))?;

        let req_resp = req_resp::build_default();

        let connection_limits = connection_limits::Behaviour::new(
            ConnectionLimits::default()
                .with_max_pending_incoming(Some(5))
                .with_max_pending_outgoing(Some(16))
                .with_max_established_per_peer(Some(2)),
        );

        Ok(BeaconNetworkBehaviour {
            identify,
            req_resp,
            gossipsub,
            connection_limits,
        })
    }

    fn build_identify(local_key: &Keypair) -> identify::Behaviour {
        let identify_config = identify::Config::new("eth2/1.0.0".into(), local_key.public())
            .with_agent_version(format!("beacon_node/{}", env!("CARGO_PKG_VERSION")))
            .with_cache_size(0);

        identify::Behaviour::new(identify_config)
    }

    fn multiaddr(cfg: &NetworkServiceConfig) -> Multiaddr {
        let mut addr: Multiaddr = cfg.socket_address.into();
        addr.push(Protocol::Udp(cfg.socket_port));
        addr.push(Protocol::QuicV1);
        addr
    }

    fn listen(&mut self, addr: &Multiaddr) -> Result<()> {
        self.swarm
            .listen_on(addr.clone())
            .map_err(|e| anyhow!("Failed to listen on {addr:?}: {e:?}"))?;
        Ok(())
    }
}
