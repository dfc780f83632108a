use std::collections::HashSet;

use libp2p_identity::PeerId;
use rand::Rng;
use rand::seq::SliceRandom;

use crate::error::{NetworkError, Result};

/// Spreads requests over a random subset of peers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeerSampler {
    fraction: f64,
}

impl PeerSampler {
    pub fn new(fraction: f64) -> Self {
        Self { fraction }
    }

    /// Deduplicates, shuffles and keeps `ceil(fraction * len)` peers (at least one).
    pub fn filter<R: Rng + ?Sized>(&self, peers: &[PeerId], rng: &mut R) -> Result<Vec<PeerId>> {
        let mut seen = HashSet::with_capacity(peers.len());
        let mut unique: Vec<PeerId> = peers
            .iter()
            .filter(|peer| seen.insert(**peer))
            .copied()
            .collect();

        if unique.is_empty() {
            return Err(NetworkError::NoPeersAvailable);
        }

        unique.shuffle(rng);
        unique.truncate(self.limit(unique.len()));
        Ok(unique)
    }

    fn limit(&self, len: usize) -> usize {
        let fraction = if self.fraction.is_finite() {
            self.fraction.clamp(0.0, 1.0)
        } else {
            1.0
        };
        ((len as f64 * fraction).ceil() as usize).clamp(1, len)
    }
}
