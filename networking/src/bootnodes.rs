use std::fs::File;

use derive_more::Display;
use discv5::Enr;
use libp2p::Multiaddr;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::discovery::DiscoveryService;

/// A bootnode given on the command line or in a bootnodes file.
#[derive(Debug, Clone, Serialize, Deserialize, Display)]
#[serde(untagged)]
pub enum Bootnode {
    Multiaddr(Multiaddr),
    Enr(Enr),
}

impl Bootnode {
    pub fn addrs(&self) -> Vec<Multiaddr> {
        match self {
            Self::Multiaddr(addr) => vec![addr.clone()],
            Self::Enr(enr) => DiscoveryService::enr_to_multiaddr(enr).into_iter().collect(),
        }
    }
}

/// Accepts a multiaddr, an ENR, or a path to a YAML list of either.
pub fn parse_bootnode_argument(arg: &str) -> Vec<Bootnode> {
    if let Ok(value) = arg.parse::<Multiaddr>() {
        return vec![Bootnode::Multiaddr(value)];
    }

    if let Ok(record) = arg.parse::<Enr>() {
        return vec![Bootnode::Enr(record)];
    }

    let Ok(file) = File::open(arg) else {
        warn!(
            "value {arg:?} provided as bootnode is not recognized - it is not valid multiaddr, ENR nor path to file containing bootnodes."
        );
        return Vec::new();
    };

    let bootnodes: Vec<Bootnode> = match serde_yaml::from_reader(file) {
        Ok(value) => value,
        Err(err) => {
            warn!("failed to read bootnodes from {arg:?}: {err:?}");
            return Vec::new();
        }
    };

    if bootnodes.is_empty() {
        warn!("provided file with bootnodes {arg:?} is empty");
    }

    bootnodes
}

/// Bootnodes known at startup: dial targets for the swarm, ENRs for discv5.
#[derive(Debug, Clone, Default)]
pub struct StaticBootnodes {
    addrs: Vec<Multiaddr>,
    enrs: Vec<Enr>,
}

impl StaticBootnodes {
    pub fn parse(args: &[String]) -> Self {
        let mut bootnodes = Self::default();

        for bootnode in args.iter().flat_map(|arg| parse_bootnode_argument(arg)) {
            let addrs = bootnode.addrs();
            if addrs.is_empty() {
                warn!("bootnode {bootnode} doesn't have valid address to dial");
            }
            bootnodes.addrs.extend(addrs);

            if let Bootnode::Enr(enr) = bootnode {
                bootnodes.enrs.push(enr);
            }
        }

        bootnodes
    }

    pub fn to_multiaddrs(&self) -> Vec<Multiaddr> {
        self.addrs.clone()
    }

    pub fn enrs(&self) -> &[Enr] {
        &self.enrs
    }
}
