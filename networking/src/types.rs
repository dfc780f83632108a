use serde::Serialize;

/// Index of an attestation subnet.
pub type SubnetId = u64;

/// Largest gossip or req/resp payload accepted, compressed or not.
pub const GOSSIP_MAX_SIZE: usize = 10 * 1024 * 1024;

/// Maximum number of blocks in one blocks-by-range request.
pub const MAX_REQUEST_BLOCKS: u64 = 1024;

/// Peer connection state machine.
///
/// Tracks the lifecycle of a connection to a peer:
/// DISCONNECTED -> CONNECTING -> CONNECTED -> DISCONNECTING -> DISCONNECTED
///
/// These states map directly to libp2p connection events.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No active connection to this peer.
    Disconnected,
    /// QUIC connection in progress.
    Connecting,
    /// Transport established, can exchange protocol messages.
    Connected,
    /// Graceful shutdown in progress.
    Disconnecting,
}
