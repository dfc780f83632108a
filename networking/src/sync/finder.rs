use std::sync::Arc;

use containers::{BlocksByRangeRequest, Slot};
use libp2p_identity::PeerId;
use metrics::SharedMetrics;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{NetworkError, Result};
use crate::sync::config::SearchConfig;
use crate::sync::fetcher::RangeFetcher;
use crate::sync::oracle::{PeerEpochOracle, SyncMode};
use crate::sync::sampler::PeerSampler;

/// Finds the next slot after a given slot that actually holds a block.
///
/// Runs in three stages, rotating through a random sample of the peers
/// that back the current target epoch:
///
/// 1. dense: every slot of the next `dense_epochs` epochs, one request per
///    epoch, stopping at the end of the target epoch;
/// 2. sparse: one probe per stride up to the target epoch, every
///    `slots_per_epoch`-th slot from a random offset; the first hit narrows
///    the upper bound;
/// 3. exact: two full epochs just below the upper bound.
pub struct NonSkippedSlotFinder {
    oracle: PeerEpochOracle,
    fetcher: RangeFetcher,
    search: SearchConfig,
    mode: SyncMode,
    rng: Mutex<StdRng>,
    metrics: Option<SharedMetrics>,
}

impl NonSkippedSlotFinder {
    pub fn new(
        oracle: PeerEpochOracle,
        fetcher: RangeFetcher,
        search: SearchConfig,
        mode: SyncMode,
    ) -> Self {
        Self::with_rng(oracle, fetcher, search, mode, StdRng::from_entropy())
    }

    pub fn with_rng(
        oracle: PeerEpochOracle,
        fetcher: RangeFetcher,
        search: SearchConfig,
        mode: SyncMode,
        rng: StdRng,
    ) -> Self {
        Self {
            oracle,
            fetcher,
            search,
            mode,
            rng: Mutex::new(rng),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn find_after(&self, slot: Slot, cancel: &CancellationToken) -> Result<Slot> {
        let result = self.search(slot, cancel).await;
        if let Some(metrics) = &self.metrics {
            let outcome = match &result {
                Ok(_) => "found",
                Err(NetworkError::SlotTooHigh) => "slot_too_high",
                Err(NetworkError::NoPeersAvailable) => "no_peers",
                Err(NetworkError::InvalidRange { .. }) => "invalid_range",
                Err(_) => "error",
            };
            metrics.inc_sync_search(outcome);
        }
        result
    }

    async fn search(&self, slot: Slot, cancel: &CancellationToken) -> Result<Slot> {
        let head_and_target = self.oracle.compute_head_and_target(self.mode);
        if !head_and_target.has_target() {
            return Err(NetworkError::SlotTooHigh);
        }
        let target_epoch = head_and_target.target_epoch;

        let peers = {
            let mut rng = self.rng.lock();
            PeerSampler::new(self.search.peer_fraction).filter(&head_and_target.peers, &mut *rng)?
        };

        let spe = self.oracle.slots_per_epoch();
        let mut rotation = PeerRotation::new(&peers);

        debug!(
            slot = slot.0,
            head_epoch = head_and_target.head_epoch.0,
            target_epoch = target_epoch.0,
            peers = peers.len(),
            "Searching for non-skipped slot"
        );

        let end = target_epoch.end_slot(spe);

        // Dense, never past the target epoch.
        let dense_end = slot
            .0
            .saturating_add(self.search.dense_epochs.saturating_mul(spe))
            .min(end.0.saturating_add(1));
        let floor = Slot(dense_end);
        let mut start = slot.0.saturating_add(1);
        while start < dense_end {
            let request = BlocksByRangeRequest::new(Slot(start), spe, 1);
            if let Some(next) = self.fetcher.fetch(rotation.next_peer(), request, slot, cancel).await? {
                if next > end {
                    return Err(NetworkError::InvalidRange {
                        found: next,
                        lower: floor,
                        upper: end,
                    });
                }
                debug!(slot = slot.0, next = next.0, "Found non-skipped slot in dense range");
                return Ok(next);
            }
            start = start.saturating_add(spe.max(1));
        }

        // The dense window already covered the whole target epoch.
        if floor > end {
            return Err(NetworkError::InvalidRange {
                found: Slot::default(),
                lower: floor,
                upper: end,
            });
        }

        // Sparse
        let mut upper_bound = target_epoch.next().start_slot(spe);
        let stride = self.search.sparse_stride(spe);
        let mut start = floor.0.saturating_add(1);
        while start < upper_bound.0 {
            let offset = if spe > 0 {
                self.rng.lock().gen_range(0..spe)
            } else {
                0
            };
            let request = BlocksByRangeRequest::new(Slot(start.saturating_add(offset)), spe / 2, spe);
            let next = self.fetcher.fetch(rotation.next_peer(), request, floor, cancel).await?;
            match next {
                Some(next) if next <= upper_bound => {
                    upper_bound = next;
                    break;
                }
                _ => {}
            }
            start = start.saturating_add(stride);
        }

        // Exact
        if upper_bound.0 > spe {
            upper_bound = Slot(upper_bound.0 - spe);
        }
        let exact_start = upper_bound.epoch_start(spe);
        let request = BlocksByRangeRequest::new(exact_start, spe.saturating_mul(2), 1);
        let next = self.fetcher.fetch(rotation.next_peer(), request, floor, cancel).await?;

        match next {
            Some(next) if next <= end => {
                info!(slot = slot.0, next = next.0, "Found non-skipped slot");
                Ok(next)
            }
            other => Err(NetworkError::InvalidRange {
                found: other.unwrap_or_default(),
                lower: floor,
                upper: end,
            }),
        }
    }
}

/// Round-robin over a non-empty peer list.
struct PeerRotation<'a> {
    peers: &'a [PeerId],
    index: usize,
}

impl<'a> PeerRotation<'a> {
    fn new(peers: &'a [PeerId]) -> Self {
        Self { peers, index: 0 }
    }

    fn next_peer(&mut self) -> PeerId {
        let peer = self.peers[self.index % self.peers.len()];
        self.index += 1;
        peer
    }
}
