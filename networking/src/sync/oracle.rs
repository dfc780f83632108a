use std::sync::Arc;

use chain::ChainConfig;
use containers::{Checkpoint, Epoch, Slot};
use libp2p_identity::PeerId;

/// Local chain view needed to bound a sync search.
pub trait ChainInfo: Send + Sync {
    fn finalized_checkpoint(&self) -> Checkpoint;

    fn head_slot(&self) -> Slot;
}

/// Majority view over remote peers' reported chain status.
pub trait PeerRegistry: Send + Sync {
    /// Epoch most connected peers have finalized at or beyond `our_finalized`,
    /// with up to `max_peers` peers supporting it.
    fn best_finalized(&self, max_peers: usize, our_finalized: Epoch) -> (Epoch, Vec<PeerId>);

    /// Head epoch above `our_head` reported by at least `min_peers` peers,
    /// or `(Epoch(0), vec![])` when no such majority exists.
    fn best_non_finalized(&self, min_peers: usize, our_head: Epoch) -> (Epoch, Vec<PeerId>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Sync up to the epoch the network has finalized.
    #[default]
    StopOnFinalized,
    /// Sync up to the network's head.
    StopOnHead,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadAndTarget {
    pub head_epoch: Epoch,
    pub target_epoch: Epoch,
    pub peers: Vec<PeerId>,
}

impl HeadAndTarget {
    /// False when the peers offer nothing beyond our own head.
    pub fn has_target(&self) -> bool {
        self.target_epoch > self.head_epoch
    }
}

/// Decides how far a sync should reach and which peers back that decision.
#[derive(Clone)]
pub struct PeerEpochOracle {
    chain: Arc<dyn ChainInfo>,
    peers: Arc<dyn PeerRegistry>,
    config: ChainConfig,
}

impl PeerEpochOracle {
    pub fn new(chain: Arc<dyn ChainInfo>, peers: Arc<dyn PeerRegistry>, config: ChainConfig) -> Self {
        Self {
            chain,
            peers,
            config,
        }
    }

    pub fn compute_head_and_target(&self, mode: SyncMode) -> HeadAndTarget {
        let (head_epoch, (target_epoch, peers)) = match mode {
            SyncMode::StopOnFinalized => {
                let head_epoch = self.chain.finalized_checkpoint().epoch;
                let best = self
                    .peers
                    .best_finalized(self.config.max_peers_to_sync, head_epoch);
                (head_epoch, best)
            }
            SyncMode::StopOnHead => {
                let head_epoch = self.chain.head_slot().epoch(self.config.slots_per_epoch);
                let best = self
                    .peers
                    .best_non_finalized(self.config.minimum_sync_peers * 2, head_epoch);
                (head_epoch, best)
            }
        };

        HeadAndTarget {
            head_epoch,
            target_epoch,
            peers,
        }
    }

    /// First slot of the epoch most peers have finalized.
    pub fn best_finalized_slot(&self) -> Slot {
        let our_finalized = self.chain.finalized_checkpoint().epoch;
        let (epoch, _) = self
            .peers
            .best_finalized(self.config.max_peers_to_sync, our_finalized);
        epoch.start_slot(self.config.slots_per_epoch)
    }

    /// First slot of the head epoch a quorum of peers is ahead at.
    pub fn best_non_finalized_slot(&self) -> Slot {
        let our_head = self.chain.head_slot().epoch(self.config.slots_per_epoch);
        let (epoch, _) = self
            .peers
            .best_non_finalized(self.config.minimum_sync_peers * 2, our_head);
        epoch.start_slot(self.config.slots_per_epoch)
    }

    pub fn slots_per_epoch(&self) -> u64 {
        self.config.slots_per_epoch
    }
}
