/// Sync search configuration.
///
/// Shapes the non-skipped slot search: how many epochs are scanned densely
/// and how far apart the sparse probes are.

/// Epochs scanned slot by slot before switching to sparse probing.
pub const DEFAULT_DENSE_SEARCH_EPOCHS: u64 = 10;

/// Fraction of the best peers a single search is spread over.
pub const DEFAULT_PEER_FRACTION: f64 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchConfig {
    pub dense_epochs: u64,
    /// Slots between sparse probes. `None` means `slots_per_epoch² / 2`.
    pub sparse_stride: Option<u64>,
    pub peer_fraction: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            dense_epochs: DEFAULT_DENSE_SEARCH_EPOCHS,
            sparse_stride: None,
            peer_fraction: DEFAULT_PEER_FRACTION,
        }
    }
}

impl SearchConfig {
    pub fn sparse_stride(&self, slots_per_epoch: u64) -> u64 {
        self.sparse_stride
            .unwrap_or_else(|| slots_per_epoch.saturating_mul(slots_per_epoch) / 2)
            .max(1)
    }
}
