use std::net::IpAddr;

use discv5::Enr;

/// Peers a subnet lookup tries to collect before it stops.
pub const DEFAULT_SUBNET_QUERY_PEERS: usize = 16;

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub enabled: bool,
    pub udp_port: u16,
    pub libp2p_port: u16,
    pub listen_address: IpAddr,
    pub bootnodes: Vec<Enr>,
    pub subnet_query_peers: usize,
}

impl DiscoveryConfig {
    pub fn new(listen_address: IpAddr, udp_port: u16, libp2p_port: u16) -> Self {
        Self {
            enabled: true,
            udp_port,
            libp2p_port,
            listen_address,
            bootnodes: Vec::new(),
            subnet_query_peers: DEFAULT_SUBNET_QUERY_PEERS,
        }
    }

    pub fn with_bootnodes(mut self, bootnodes: Vec<Enr>) -> Self {
        self.bootnodes = bootnodes;
        self
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            udp_port: 0,
            libp2p_port: 0,
            listen_address: IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED),
            bootnodes: Vec::new(),
            subnet_query_peers: DEFAULT_SUBNET_QUERY_PEERS,
        }
    }
}
