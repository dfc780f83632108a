use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chain::MAINNET_CONFIG;
use containers::{
    BlocksByRangeRequest, Checkpoint, Epoch, SignedBeaconBlock, Slot, Status,
};
use libp2p_identity::PeerId;
use networking::sync::{
    BlocksByRangeRequester, ChainInfo, NonSkippedSlotFinder, PeerEpochOracle, PeerManager,
    RangeFetcher, SearchConfig, SyncMode,
};
use networking::types::ConnectionState;
use parking_lot::RwLock;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio_util::sync::CancellationToken;

struct LocalChain {
    finalized_epoch: u64,
    head_slot: u64,
}

impl ChainInfo for LocalChain {
    fn finalized_checkpoint(&self) -> Checkpoint {
        Checkpoint {
            epoch: Epoch(self.finalized_epoch),
            ..Checkpoint::default()
        }
    }

    fn head_slot(&self) -> Slot {
        Slot(self.head_slot)
    }
}

/// Every peer serves the same chain with blocks only at `slots`.
struct SparseChain {
    slots: Vec<u64>,
}

#[async_trait]
impl BlocksByRangeRequester for SparseChain {
    async fn request_blocks_by_range(
        &self,
        _peer: PeerId,
        request: BlocksByRangeRequest,
    ) -> Result<Vec<SignedBeaconBlock>> {
        let start = request.start_slot.0;
        let end = start + request.count * request.step;
        Ok(self
            .slots
            .iter()
            .filter(|&&slot| slot >= start && slot < end && (slot - start) % request.step == 0)
            .map(|&slot| {
                let mut block = SignedBeaconBlock::default();
                block.message.slot = Slot(slot);
                block
            })
            .collect())
    }
}

fn peers_at(finalized_epoch: u64, count: usize) -> Arc<RwLock<PeerManager>> {
    let mut manager = PeerManager::new(MAINNET_CONFIG.slots_per_epoch);
    for _ in 0..count {
        let peer_id = PeerId::random();
        manager.add_peer(peer_id, ConnectionState::Connected);
        manager.update_status(
            &peer_id,
            Status {
                finalized_epoch: Epoch(finalized_epoch),
                head_slot: Epoch(finalized_epoch + 2).start_slot(MAINNET_CONFIG.slots_per_epoch),
                ..Status::default()
            },
        );
    }
    Arc::new(RwLock::new(manager))
}

fn finder(chain: LocalChain, peers: Arc<RwLock<PeerManager>>, slots: Vec<u64>) -> NonSkippedSlotFinder {
    let oracle = PeerEpochOracle::new(Arc::new(chain), peers, MAINNET_CONFIG);
    let fetcher = RangeFetcher::new(Arc::new(SparseChain { slots }));
    NonSkippedSlotFinder::with_rng(
        oracle,
        fetcher,
        SearchConfig::default(),
        SyncMode::StopOnFinalized,
        StdRng::seed_from_u64(7),
    )
}

#[tokio::test]
async fn finds_next_block_in_dense_stage() {
    let finder = finder(
        LocalChain {
            finalized_epoch: 2,
            head_slot: 100,
        },
        peers_at(10, 10),
        vec![200, 310],
    );

    let next = finder.find_after(Slot(100), &CancellationToken::new()).await.unwrap();
    assert_eq!(next, Slot(200));
}

#[tokio::test]
async fn finds_block_beyond_dense_window() {
    let finder = finder(
        LocalChain {
            finalized_epoch: 0,
            head_slot: 0,
        },
        peers_at(20, 8),
        vec![650],
    );

    let next = finder.find_after(Slot(0), &CancellationToken::new()).await.unwrap();
    assert_eq!(next, Slot(650));
}

#[tokio::test]
async fn caught_up_node_has_nothing_to_find() {
    let finder = finder(
        LocalChain {
            finalized_epoch: 10,
            head_slot: 352,
        },
        peers_at(10, 10),
        vec![400],
    );

    let result = finder.find_after(Slot(352), &CancellationToken::new()).await;
    assert!(matches!(result, Err(networking::NetworkError::SlotTooHigh)));
}
