/// Sync search for the beacon node.
///
/// Locates the next slot that actually holds a block when the chain ahead
/// may contain empty slots, using a shifting set of untrusted peers:
///
/// - **Peer Manager**: tracks peer chain status and votes on the network's
///   finalized and head epochs
/// - **Oracle**: turns those votes into a head/target epoch pair
/// - **Sampler**: spreads a search over a random subset of the voting peers
/// - **Fetcher**: one bounded blocks-by-range request to one peer
/// - **Finder**: the dense, sparse and exact search stages
pub mod config;
pub mod fetcher;
pub mod finder;
pub mod oracle;
pub mod peer_manager;
pub mod sampler;

pub use config::SearchConfig;
pub use fetcher::{BlocksByRangeRequester, RangeFetcher};
pub use finder::NonSkippedSlotFinder;
pub use oracle::{ChainInfo, HeadAndTarget, PeerEpochOracle, PeerRegistry, SyncMode};
pub use peer_manager::{PeerManager, SharedPeerManager, SyncPeer};
pub use sampler::PeerSampler;

#[cfg(test)]
mod tests;
