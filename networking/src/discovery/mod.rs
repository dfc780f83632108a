pub mod config;

use std::net::IpAddr;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use discv5::enr::{CombinedKey, NodeId};
use discv5::{ConfigBuilder, Discv5, Enr, Event as Discv5Event, ListenConfig};
use enr::Builder as EnrBuilder;
use libp2p::Multiaddr;
use libp2p::multiaddr::Protocol;
use libp2p_identity::{Keypair, PeerId};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use crate::network::NetworkHandle;
use crate::p2p::broadcaster::SubnetDiscovery;
use crate::types::SubnetId;

pub use config::DiscoveryConfig;

/// ENR key holding the SSZ bitvector of subscribed attestation subnets.
pub const ATTNETS_ENR_KEY: &str = "attnets";
/// ENR key holding the QUIC port libp2p listens on.
pub const QUIC_ENR_KEY: &str = "quic";

/// Discovery service that wraps discv5 for peer discovery.
pub struct DiscoveryService {
    discv5: Arc<Discv5>,
    local_enr: Enr,
    event_receiver: Mutex<mpsc::Receiver<Discv5Event>>,
    network: NetworkHandle,
    subnet_query_peers: usize,
}

impl DiscoveryService {
    pub async fn new(
        config: DiscoveryConfig,
        keypair: &Keypair,
        network: NetworkHandle,
        attestation_subnet_count: u64,
    ) -> Result<Self> {
        let enr_key = keypair_to_enr_key(keypair)?;

        let local_enr = build_enr(
            &enr_key,
            config.listen_address,
            config.udp_port,
            config.libp2p_port,
            attestation_subnet_count,
        )?;

        info!(
            enr = %local_enr,
            node_id = %local_enr.node_id(),
            "Built local ENR"
        );

        let listen_config = ListenConfig::from_ip(config.listen_address, config.udp_port);
        let discv5_config = ConfigBuilder::new(listen_config).build();

        let mut discv5 = Discv5::new(local_enr.clone(), enr_key, discv5_config)
            .map_err(|e| anyhow!("Failed to create discv5: {e}"))?;

        for bootnode in &config.bootnodes {
            if let Err(e) = discv5.add_enr(bootnode.clone()) {
                warn!(enr = %bootnode, error = ?e, "Failed to add bootnode ENR");
            } else {
                info!(enr = %bootnode, "Added bootnode ENR");
            }
        }

        discv5
            .start()
            .await
            .map_err(|e| anyhow!("Failed to start discv5: {e}"))?;

        let event_receiver = discv5
            .event_stream()
            .await
            .map_err(|e| anyhow!("Failed to get discv5 event stream: {e}"))?;

        info!("Discovery service started");

        Ok(Self {
            discv5: Arc::new(discv5),
            local_enr,
            event_receiver: Mutex::new(event_receiver),
            network,
            subnet_query_peers: config.subnet_query_peers,
        })
    }

    pub fn local_enr(&self) -> &Enr {
        &self.local_enr
    }

    /// Next ENR discv5 reports, or `None` once discv5 shuts down.
    pub async fn recv(&self) -> Option<Enr> {
        let mut events = self.event_receiver.lock().await;
        loop {
            match events.recv().await? {
                Discv5Event::Discovered(enr) => {
                    debug!(node_id = %enr.node_id(), "Discovered peer via discv5");
                    return Some(enr);
                }
                Discv5Event::SocketUpdated(addr) => {
                    info!(?addr, "discv5 socket updated");
                }
                Discv5Event::SessionEstablished(enr, addr) => {
                    debug!(node_id = %enr.node_id(), ?addr, "discv5 session established");
                }
                Discv5Event::NodeInserted { node_id, replaced } => {
                    debug!(%node_id, ?replaced, "Node inserted into routing table");
                }
                _ => {}
            }
        }
    }

    /// Dials every peer discv5 reports until it shuts down.
    pub async fn run(self: Arc<Self>) {
        while let Some(enr) = self.recv().await {
            self.dial(&enr);
        }
        info!("Discovery event stream closed");
    }

    fn dial(&self, enr: &Enr) -> bool {
        let Some(addr) = Self::enr_to_multiaddr(enr) else {
            debug!(node_id = %enr.node_id(), "ENR has no dialable address");
            return false;
        };
        match self.network.dial(addr) {
            Ok(()) => true,
            Err(error) => {
                warn!(?error, "Failed to hand discovered peer to network");
                false
            }
        }
    }

    pub fn enr_to_multiaddr(enr: &Enr) -> Option<Multiaddr> {
        let ip = enr
            .ip4()
            .map(IpAddr::V4)
            .or_else(|| enr.ip6().map(IpAddr::V6))?;

        let libp2p_port = enr
            .quic4()
            .or_else(|| enr.quic6())
            .or_else(|| enr.tcp4())
            .or_else(|| enr.tcp6())?;

        let peer_id = enr_to_peer_id(enr)?;

        let mut multiaddr: Multiaddr = ip.into();
        multiaddr.push(Protocol::Udp(libp2p_port));
        multiaddr.push(Protocol::QuicV1);
        multiaddr.push(Protocol::P2p(peer_id));

        Some(multiaddr)
    }

    pub fn find_random_peers(&self) {
        let random_node_id = generate_random_node_id();
        debug!(%random_node_id, "Starting random peer discovery lookup");

        let discv5 = Arc::clone(&self.discv5);
        tokio::spawn(async move {
            match discv5.find_node(random_node_id).await {
                Ok(nodes) => {
                    debug!(count = nodes.len(), "Random lookup completed");
                }
                Err(e) => {
                    warn!(error = ?e, "Random lookup failed");
                }
            }
        });
    }

    pub fn connected_peers(&self) -> usize {
        self.discv5.connected_peers()
    }

    /// Looks up nodes advertising `subnet` and dials the ones found.
    ///
    /// Not metered here; callers count attempts per outcome.
    pub async fn find_peers_with_subnet(&self, subnet: SubnetId) -> Result<bool> {
        let predicate = Box::new(move |enr: &Enr| enr_has_subnet(enr, subnet));
        let nodes = self
            .discv5
            .find_node_predicate(generate_random_node_id(), predicate, self.subnet_query_peers)
            .await
            .map_err(|e| anyhow!("Subnet {subnet} lookup failed: {e:?}"))?;

        let dialed = nodes.iter().filter(|enr| self.dial(enr)).count();
        debug!(subnet, found = nodes.len(), dialed, "Subnet lookup completed");
        Ok(dialed > 0)
    }
}

#[async_trait]
impl SubnetDiscovery for DiscoveryService {
    async fn find_peers_with_subnet(&self, subnet: SubnetId) -> Result<bool> {
        DiscoveryService::find_peers_with_subnet(self, subnet).await
    }
}

/// Whether the ENR's `attnets` bitvector has the bit for `subnet` set.
pub fn enr_has_subnet(enr: &Enr, subnet: SubnetId) -> bool {
    enr.get_raw_rlp(ATTNETS_ENR_KEY)
        .and_then(rlp_bytes)
        .is_some_and(|bits| bitvector_has(bits, subnet))
}

fn bitvector_has(bits: &[u8], index: u64) -> bool {
    let Ok(byte) = usize::try_from(index / 8) else {
        return false;
    };
    bits.get(byte)
        .is_some_and(|value| value & (1 << (index % 8)) != 0)
}

/// Payload of an RLP byte string.
fn rlp_bytes(raw: &[u8]) -> Option<&[u8]> {
    let (&header, rest) = raw.split_first()?;
    match header {
        0x00..=0x7f => Some(&raw[..1]),
        0x80..=0xb7 => rest.get(..usize::from(header - 0x80)),
        0xb8..=0xbf => {
            let len_of_len = usize::from(header - 0xb7);
            let len_bytes = rest.get(..len_of_len)?;
            let len = len_bytes
                .iter()
                .try_fold(0usize, |acc, b| acc.checked_mul(256)?.checked_add(usize::from(*b)))?;
            rest.get(len_of_len..len_of_len.checked_add(len)?)
        }
        _ => None,
    }
}

fn keypair_to_enr_key(keypair: &Keypair) -> Result<CombinedKey> {
    match keypair.key_type() {
        libp2p_identity::KeyType::Secp256k1 => {
            let secp_keypair = keypair
                .clone()
                .try_into_secp256k1()
                .map_err(|_| anyhow!("Failed to convert to secp256k1"))?;

            let secret_bytes = secp_keypair.secret().to_bytes();
            let secret_key = k256::ecdsa::SigningKey::from_slice(&secret_bytes)
                .map_err(|e| anyhow!("Failed to create signing key: {e}"))?;

            Ok(CombinedKey::Secp256k1(secret_key))
        }
        other => Err(anyhow!("Unsupported key type for discv5: {other:?}")),
    }
}

fn build_enr(
    key: &CombinedKey,
    ip: IpAddr,
    udp_port: u16,
    libp2p_port: u16,
    attestation_subnet_count: u64,
) -> Result<Enr> {
    let mut builder = EnrBuilder::default();

    match ip {
        IpAddr::V4(ipv4) => {
            builder.ip4(ipv4);
            builder.udp4(udp_port);
        }
        IpAddr::V6(ipv6) => {
            builder.ip6(ipv6);
            builder.udp6(udp_port);
        }
    }
    builder.add_value(QUIC_ENR_KEY, &libp2p_port);

    // Not subscribed to any subnet long-term.
    let attnets = vec![0u8; usize::try_from(attestation_subnet_count.div_ceil(8))?];
    builder.add_value(ATTNETS_ENR_KEY, &attnets.as_slice());

    builder
        .build(key)
        .map_err(|e| anyhow!("Failed to build ENR: {e}"))
}

fn enr_to_peer_id(enr: &Enr) -> Option<PeerId> {
    match enr.public_key() {
        discv5::enr::CombinedPublicKey::Secp256k1(pk) => {
            let compressed = pk.to_sec1_bytes();
            let libp2p_pk =
                libp2p_identity::secp256k1::PublicKey::try_from_bytes(&compressed).ok()?;
            let public = libp2p_identity::PublicKey::from(libp2p_pk);
            Some(PeerId::from_public_key(&public))
        }
        _ => None,
    }
}

pub fn parse_enr(enr_str: &str) -> Result<Enr> {
    enr_str
        .parse()
        .map_err(|e| anyhow!("Failed to parse ENR: {e}"))
}

fn generate_random_node_id() -> NodeId {
    let random_bytes: [u8; 32] = rand::random();
    NodeId::new(&random_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::net::Ipv4Addr;

    fn enr_with_attnets(bits: &[u8]) -> (Enr, PeerId) {
        let keypair = Keypair::generate_secp256k1();
        let key = keypair_to_enr_key(&keypair).unwrap();
        let mut builder = EnrBuilder::default();
        builder.ip4(Ipv4Addr::new(10, 0, 0, 7));
        builder.udp4(9000);
        builder.add_value(QUIC_ENR_KEY, &9001u16);
        builder.add_value(ATTNETS_ENR_KEY, &bits);
        (builder.build(&key).unwrap(), keypair.public().to_peer_id())
    }

    #[rstest]
    #[case(0, true)]
    #[case(3, true)]
    #[case(4, false)]
    #[case(9, true)]
    #[case(63, true)]
    #[case(64, false)]
    fn subnet_bits(#[case] subnet: u64, #[case] expected: bool) {
        let (enr, _) = enr_with_attnets(&[0b0000_1001, 0b0000_0010, 0, 0, 0, 0, 0, 0b1000_0000]);
        assert_eq!(enr_has_subnet(&enr, subnet), expected);
    }

    #[test]
    fn missing_attnets_matches_nothing() {
        let keypair = Keypair::generate_secp256k1();
        let key = keypair_to_enr_key(&keypair).unwrap();
        let enr = EnrBuilder::default().build(&key).unwrap();

        assert!(!enr_has_subnet(&enr, 0));
    }

    #[test]
    fn rlp_short_and_long_strings() {
        assert_eq!(rlp_bytes(&[0x05]), Some(&[0x05][..]));
        assert_eq!(rlp_bytes(&[0x82, 0xaa, 0xbb]), Some(&[0xaa, 0xbb][..]));
        assert_eq!(rlp_bytes(&[0x83, 0xaa]), None);

        let mut long = vec![0xb8, 60];
        long.extend(std::iter::repeat_n(0x11, 60));
        assert_eq!(rlp_bytes(&long).map(<[u8]>::len), Some(60));

        assert_eq!(rlp_bytes(&[0xc0]), None);
    }

    #[test]
    fn enr_multiaddr_uses_quic_port_and_peer_id() {
        let (enr, peer_id) = enr_with_attnets(&[0; 8]);
        let addr = DiscoveryService::enr_to_multiaddr(&enr).unwrap();

        let expected: Multiaddr = format!("/ip4/10.0.0.7/udp/9001/quic-v1/p2p/{peer_id}")
            .parse()
            .unwrap();
        assert_eq!(addr, expected);
    }

    #[test]
    fn local_enr_advertises_no_subnets() {
        let keypair = Keypair::generate_secp256k1();
        let key = keypair_to_enr_key(&keypair).unwrap();
        let enr = build_enr(&key, IpAddr::V4(Ipv4Addr::LOCALHOST), 9000, 9001, 64).unwrap();

        assert!((0..64).all(|subnet| !enr_has_subnet(&enr, subnet)));
        assert_eq!(enr.get_raw_rlp(ATTNETS_ENR_KEY).and_then(rlp_bytes).map(<[u8]>::len), Some(8));
        assert_eq!(enr.quic4(), Some(9001));
    }
}
