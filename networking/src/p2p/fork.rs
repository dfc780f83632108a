use containers::{Bytes32, ForkDigest, Version, compute_fork_digest};
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::{NetworkError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenesisInfo {
    pub genesis_time: u64,
    pub genesis_validators_root: Bytes32,
}

/// Fork version and genesis data the gossip topics are namespaced by.
///
/// Genesis is set exactly once; everything that needs it either fails with
/// `ForkDigestUnavailable` or waits on `wait_until_ready`.
#[derive(Debug)]
pub struct ForkContext {
    genesis: watch::Sender<Option<GenesisInfo>>,
    fork_version: RwLock<Version>,
}

impl ForkContext {
    pub fn new(fork_version: Version) -> Self {
        let (genesis, _) = watch::channel(None);
        Self {
            genesis,
            fork_version: RwLock::new(fork_version),
        }
    }

    /// Records genesis; later calls are ignored.
    pub fn set_genesis(&self, info: GenesisInfo) {
        let updated = self.genesis.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(info);
            true
        });

        if updated {
            info!(
                genesis_time = info.genesis_time,
                genesis_validators_root = %info.genesis_validators_root,
                "Genesis known"
            );
        } else {
            warn!("Genesis already set, ignoring update");
        }
    }

    pub fn set_fork_version(&self, version: Version) {
        *self.fork_version.write() = version;
    }

    pub fn genesis(&self) -> Option<GenesisInfo> {
        *self.genesis.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.genesis().is_some()
    }

    /// Digest of the current fork, recomputed on every call.
    pub fn fork_digest(&self) -> Result<ForkDigest> {
        let genesis = self.genesis().ok_or(NetworkError::ForkDigestUnavailable)?;
        let version = *self.fork_version.read();
        Ok(compute_fork_digest(version, genesis.genesis_validators_root))
    }

    /// Resolves once genesis time and validators root are known.
    pub async fn wait_until_ready(&self) -> Result<GenesisInfo> {
        let mut receiver = self.genesis.subscribe();
        let genesis = receiver
            .wait_for(Option::is_some)
            .await
            .map_err(|_| NetworkError::Cancelled)?;
        (*genesis).ok_or(NetworkError::Cancelled)
    }
}
