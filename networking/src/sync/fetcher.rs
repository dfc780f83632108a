use std::sync::Arc;

use async_trait::async_trait;
use containers::{BlocksByRangeRequest, SignedBeaconBlock, Slot};
use libp2p_identity::PeerId;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::{NetworkError, Result};
use crate::types::MAX_REQUEST_BLOCKS;

/// Issues blocks-by-range requests to a single remote peer.
#[async_trait]
pub trait BlocksByRangeRequester: Send + Sync {
    async fn request_blocks_by_range(
        &self,
        peer: PeerId,
        request: BlocksByRangeRequest,
    ) -> anyhow::Result<Vec<SignedBeaconBlock>>;
}

#[derive(Clone)]
pub struct RangeFetcher {
    requester: Arc<dyn BlocksByRangeRequester>,
}

impl RangeFetcher {
    pub fn new(requester: Arc<dyn BlocksByRangeRequester>) -> Self {
        Self { requester }
    }

    /// Requests `count` blocks starting at `start_slot` every `step` slots and
    /// returns the first returned block slot strictly after `after`.
    ///
    /// `count` is capped at `MAX_REQUEST_BLOCKS`. Transport errors propagate unchanged.
    pub async fn fetch(
        &self,
        peer: PeerId,
        request: BlocksByRangeRequest,
        after: Slot,
        cancel: &CancellationToken,
    ) -> Result<Option<Slot>> {
        let request = BlocksByRangeRequest {
            count: request.count.min(MAX_REQUEST_BLOCKS),
            ..request
        };
        trace!(
            peer = %peer,
            start_slot = request.start_slot.0,
            count = request.count,
            step = request.step,
            "Requesting blocks by range"
        );

        let blocks = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(NetworkError::Cancelled),
            blocks = self.requester.request_blocks_by_range(peer, request) => blocks?,
        };

        Ok(blocks
            .iter()
            .map(SignedBeaconBlock::slot)
            .find(|slot| *slot > after))
    }
}
