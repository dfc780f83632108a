use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chain::ChainConfig;
use clap::Parser;
use containers::ssz::SszReadDefault;
use containers::{Bytes32, Checkpoint, SignedBeaconBlock, Slot, Status};
use libp2p_identity::Keypair;
use metrics::Metrics;
use metrics::server::{MetricsServerConfig, run_metrics_server};
use networking::discovery::{DiscoveryConfig, DiscoveryService};
use networking::encoding::{GossipEncoding, SszSnappyEncoding};
use networking::gossipsub::{
    GossipKind, GossipTopic, GossipsubConfig, GossipsubParameters, MessageIdentifier,
    PubsubMessage,
};
use networking::network::{NetworkHandle, NetworkService, NetworkServiceConfig};
use networking::p2p::{Broadcaster, ForkContext, GenesisInfo, SubnetDiscovery, TopicRegistry};
use networking::sync::{
    ChainInfo, NonSkippedSlotFinder, PeerEpochOracle, PeerManager, RangeFetcher, SearchConfig,
    SyncMode,
};
use networking::types::SubnetId;
use networking::NetworkError;
use parking_lot::RwLock;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(name = "beacon_node", version, about = "Beacon chain p2p sync and gossip node")]
struct Args {
    #[arg(short, long, default_value = "127.0.0.1")]
    address: IpAddr,

    /// QUIC port for libp2p.
    #[arg(short, long, default_value_t = 9000)]
    port: u16,

    /// UDP port for discv5.
    #[arg(long, default_value_t = 9001)]
    discovery_port: u16,

    #[arg(short, long)]
    bootnodes: Vec<String>,

    /// Chain config YAML; mainnet values when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    genesis_time: Option<u64>,

    #[arg(long)]
    genesis_validators_root: Option<Bytes32>,

    #[arg(long, default_value = "127.0.0.1")]
    metrics_address: IpAddr,

    #[arg(long, default_value_t = 5054)]
    metrics_port: u16,

    #[arg(long)]
    disable_metrics: bool,

    #[arg(long)]
    disable_discovery: bool,

    /// SSZ-encoded signed beacon block to gossip once genesis is known.
    #[arg(long)]
    publish_block: Option<PathBuf>,
}

/// What the node has seen of the chain so far: only gossiped block slots.
#[derive(Default)]
struct ObservedChain {
    head_slot: AtomicU64,
}

impl ObservedChain {
    fn observe(&self, slot: Slot) {
        self.head_slot.fetch_max(slot.0, Ordering::Relaxed);
    }
}

impl ChainInfo for ObservedChain {
    fn finalized_checkpoint(&self) -> Checkpoint {
        Checkpoint::default()
    }

    fn head_slot(&self) -> Slot {
        Slot(self.head_slot.load(Ordering::Relaxed))
    }
}

/// Used when discv5 is disabled: subnet lookups never find anyone.
struct NoSubnetDiscovery;

#[async_trait]
impl SubnetDiscovery for NoSubnetDiscovery {
    async fn find_peers_with_subnet(&self, _subnet: SubnetId) -> anyhow::Result<bool> {
        Ok(false)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ChainConfig::load_from_file(path)
            .map_err(|err| anyhow!("failed to load chain config from {path:?}: {err}"))?,
        None => ChainConfig::default(),
    };
    info!(
        slots_per_epoch = config.slots_per_epoch,
        seconds_per_slot = config.seconds_per_slot,
        "Loaded chain config"
    );

    let metrics = Arc::new(Metrics::new().context("failed to register metrics")?);
    if !args.disable_metrics {
        let server_config = MetricsServerConfig {
            metrics_address: args.metrics_address,
            metrics_port: args.metrics_port,
        };
        let metrics = Arc::clone(&metrics);
        task::spawn(async move {
            if let Err(err) = run_metrics_server(server_config, metrics).await {
                warn!(?err, "Metrics server exited");
            }
        });
    }

    let fork_context = Arc::new(ForkContext::new(config.genesis_fork_version));
    if let (Some(genesis_time), Some(genesis_validators_root)) =
        (args.genesis_time, args.genesis_validators_root)
    {
        fork_context.set_genesis(GenesisInfo {
            genesis_time,
            genesis_validators_root,
        });
    } else {
        info!("Genesis not configured, gossip subscriptions wait until it is known");
    }

    let gossipsub_config = GossipsubConfig::new(
        GossipsubParameters::default(),
        MessageIdentifier::from_config(&config),
    )?;
    let network_config = Arc::new(NetworkServiceConfig::new(
        gossipsub_config,
        args.address,
        args.port,
        args.bootnodes.clone(),
    ));

    let block_to_publish = match &args.publish_block {
        Some(path) => {
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("failed to read block from {path:?}"))?;
            let block = SignedBeaconBlock::from_ssz_default(&bytes)
                .map_err(|err| anyhow!("invalid block in {path:?}: {err:?}"))?;
            Some(block)
        }
        None => None,
    };

    let keypair = Keypair::generate_secp256k1();
    let peer_manager = Arc::new(RwLock::new(PeerManager::new(config.slots_per_epoch)));
    let (network_service, network) = NetworkService::new(
        Arc::clone(&network_config),
        keypair.clone(),
        Arc::clone(&peer_manager),
    )?;
    let mut network_service = network_service.with_metrics(Arc::clone(&metrics));

    let network_task = task::spawn(async move { network_service.start().await });

    let subnet_discovery: Arc<dyn SubnetDiscovery> = if args.disable_discovery {
        Arc::new(NoSubnetDiscovery)
    } else {
        let discovery_config = DiscoveryConfig::new(args.address, args.discovery_port, args.port)
            .with_bootnodes(network_config.bootnodes.enrs().to_vec());
        let discovery = Arc::new(
            DiscoveryService::new(
                discovery_config,
                &keypair,
                network.clone(),
                config.attestation_subnet_count,
            )
            .await?,
        );
        discovery.find_random_peers();
        task::spawn(Arc::clone(&discovery).run());
        discovery
    };

    let cancel = CancellationToken::new();
    let registry = Arc::new(TopicRegistry::new(
        Arc::new(network.clone()),
        Arc::clone(&fork_context),
    ));
    let chain = Arc::new(ObservedChain::default());

    let broadcaster = Broadcaster::new(
        Arc::clone(&registry),
        Arc::new(SszSnappyEncoding),
        Arc::clone(&fork_context),
        subnet_discovery,
        &config,
    )
    .with_metrics(Arc::clone(&metrics));
    if let Some(block) = block_to_publish {
        task::spawn(publish_block(
            broadcaster,
            Arc::clone(&fork_context),
            block,
            cancel.clone(),
        ));
    }

    let finder = NonSkippedSlotFinder::new(
        PeerEpochOracle::new(chain.clone(), peer_manager, config.clone()),
        RangeFetcher::new(Arc::new(network.clone())),
        SearchConfig::default(),
        SyncMode::StopOnFinalized,
    )
    .with_metrics(Arc::clone(&metrics));
    task::spawn(search_next_block(
        finder,
        Arc::clone(&chain),
        config.epoch_duration(),
        cancel.clone(),
    ));

    task::spawn(log_block_gossip(
        registry,
        fork_context,
        network,
        chain,
        cancel.clone(),
    ));

    tokio::select! {
        result = network_task => {
            cancel.cancel();
            match result {
                Ok(Ok(())) => info!("Network service finished"),
                Ok(Err(err)) => return Err(err.context("network service failed")),
                Err(err) => return Err(anyhow!("network service task panicked: {err}")),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            cancel.cancel();
        }
    }

    Ok(())
}

async fn publish_block(
    broadcaster: Broadcaster,
    fork_context: Arc<ForkContext>,
    block: SignedBeaconBlock,
    cancel: CancellationToken,
) {
    tokio::select! {
        _ = cancel.cancelled() => return,
        ready = fork_context.wait_until_ready() => if let Err(err) = ready {
            warn!(%err, "Genesis never became known");
            return;
        },
    }

    let slot = block.slot();
    match broadcaster.broadcast(&PubsubMessage::BeaconBlock(block), &cancel).await {
        Ok(()) => info!(%slot, "Published beacon block"),
        Err(err) => warn!(%slot, %err, "Failed to publish beacon block"),
    }
}

/// Once per epoch, looks for the next block peers can serve past our head.
async fn search_next_block(
    finder: NonSkippedSlotFinder,
    chain: Arc<ObservedChain>,
    epoch_duration: std::time::Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(epoch_duration);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = interval.tick() => {}
        }

        let head = chain.head_slot();
        match finder.find_after(head, &cancel).await {
            Ok(next) => info!(%head, %next, "Next non-skipped slot"),
            Err(NetworkError::SlotTooHigh) => debug!(%head, "Peers offer nothing past our head"),
            Err(NetworkError::NoPeersAvailable) => debug!("No peers to search with"),
            Err(NetworkError::Cancelled) => return,
            Err(err) => warn!(%head, %err, "Slot search failed"),
        }
    }
}

async fn log_block_gossip(
    registry: Arc<TopicRegistry>,
    fork_context: Arc<ForkContext>,
    network: NetworkHandle,
    chain: Arc<ObservedChain>,
    cancel: CancellationToken,
) {
    let encoding = SszSnappyEncoding;

    let topic = tokio::select! {
        _ = cancel.cancelled() => return,
        ready = fork_context.wait_until_ready() => match ready.and_then(|_| fork_context.fork_digest()) {
            Ok(fork_digest) => {
                network.set_local_status(Status {
                    fork_digest,
                    ..Status::default()
                });
                GossipTopic::new(fork_digest, GossipKind::BeaconBlock)
                    .with_suffix(&encoding.protocol_suffix())
            }
            Err(err) => {
                warn!(%err, "Fork digest unavailable");
                return;
            }
        },
    };

    let mut subscription = match registry.subscribe(&topic, &cancel).await {
        Ok(subscription) => subscription,
        Err(err) => {
            warn!(%err, topic, "Failed to subscribe");
            return;
        }
    };

    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            message = subscription.next() => match message {
                Some(message) => message,
                None => break,
            },
        };

        match encoding.decode_gossip(&GossipKind::BeaconBlock, &message.data) {
            Ok(PubsubMessage::BeaconBlock(block)) => {
                chain.observe(block.slot());
                info!(
                    slot = %block.slot(),
                    root = %block.block_root(),
                    source = ?message.source,
                    "Received beacon block"
                );
            }
            Ok(other) => warn!(kind = other.type_name(), "Unexpected message on block topic"),
            Err(err) => warn!(%err, "Failed to decode block gossip"),
        }
    }

    drop(subscription);
    if let Err(err) = registry.leave(&topic) {
        warn!(%err, topic, "Failed to leave topic");
    }
}
