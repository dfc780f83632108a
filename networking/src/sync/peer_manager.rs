/// Peer manager for sync operations.
///
/// Tracks peer connection state and last reported chain status, and answers
/// majority questions about where the network's chain is.
use std::collections::{BTreeMap, HashMap};

use containers::{Epoch, Status};
use libp2p_identity::PeerId;
use parking_lot::RwLock;

use crate::sync::oracle::PeerRegistry;
use crate::types::ConnectionState;

/// Sync-specific peer state.
#[derive(Debug, Clone)]
pub struct SyncPeer {
    pub peer_id: PeerId,
    pub connection_state: ConnectionState,
    pub status: Option<Status>,
}

impl SyncPeer {
    pub fn new(peer_id: PeerId, connection_state: ConnectionState) -> Self {
        Self {
            peer_id,
            connection_state,
            status: None,
        }
    }

    /// Check if peer is connected.
    pub fn is_connected(&self) -> bool {
        self.connection_state == ConnectionState::Connected
    }
}

#[derive(Debug, Clone)]
pub struct PeerManager {
    peers: HashMap<PeerId, SyncPeer>,
    slots_per_epoch: u64,
}

pub type SharedPeerManager = std::sync::Arc<RwLock<PeerManager>>;

impl PeerManager {
    pub fn new(slots_per_epoch: u64) -> Self {
        Self {
            peers: HashMap::new(),
            slots_per_epoch,
        }
    }

    /// Add a peer to the manager.
    pub fn add_peer(&mut self, peer_id: PeerId, connection_state: ConnectionState) -> &mut SyncPeer {
        self.peers
            .entry(peer_id)
            .or_insert_with(|| SyncPeer::new(peer_id, connection_state))
    }

    /// Remove a peer from the manager.
    pub fn remove_peer(&mut self, peer_id: &PeerId) -> Option<SyncPeer> {
        self.peers.remove(peer_id)
    }

    /// Get a peer by ID.
    pub fn get_peer(&self, peer_id: &PeerId) -> Option<&SyncPeer> {
        self.peers.get(peer_id)
    }

    /// Update peer connection state.
    pub fn update_connection_state(&mut self, peer_id: &PeerId, state: ConnectionState) {
        if let Some(peer) = self.peers.get_mut(peer_id) {
            peer.connection_state = state;
        }
    }

    /// Update peer chain status.
    pub fn update_status(&mut self, peer_id: &PeerId, status: Status) {
        if let Some(peer) = self.peers.get_mut(peer_id) {
            peer.status = Some(status);
        }
    }

    pub fn connected_count(&self) -> usize {
        self.peers.values().filter(|peer| peer.is_connected()).count()
    }

    /// Get all tracked peers.
    pub fn get_all_peers(&self) -> impl Iterator<Item = &SyncPeer> {
        self.peers.values()
    }

    fn connected_statuses(&self) -> impl Iterator<Item = (PeerId, &Status)> {
        self.peers
            .values()
            .filter(|peer| peer.is_connected())
            .filter_map(|peer| peer.status.as_ref().map(|status| (peer.peer_id, status)))
    }

    /// Most voted epoch, ties broken towards the higher epoch.
    fn most_voted(votes: &BTreeMap<Epoch, usize>) -> Option<(Epoch, usize)> {
        votes
            .iter()
            .max_by(|(a_epoch, a_count), (b_epoch, b_count)| {
                a_count.cmp(b_count).then(a_epoch.cmp(b_epoch))
            })
            .map(|(epoch, count)| (*epoch, *count))
    }
}

impl PeerRegistry for PeerManager {
    fn best_finalized(&self, max_peers: usize, our_finalized: Epoch) -> (Epoch, Vec<PeerId>) {
        let mut votes = BTreeMap::new();
        for (_, status) in self.connected_statuses() {
            if status.finalized_epoch >= our_finalized {
                *votes.entry(status.finalized_epoch).or_insert(0usize) += 1;
            }
        }

        let Some((target, _)) = Self::most_voted(&votes) else {
            return (Epoch(0), Vec::new());
        };

        let mut peers: Vec<PeerId> = self
            .connected_statuses()
            .filter(|(_, status)| status.finalized_epoch >= target)
            .map(|(peer_id, _)| peer_id)
            .collect();
        peers.truncate(max_peers);

        (target, peers)
    }

    fn best_non_finalized(&self, min_peers: usize, our_head: Epoch) -> (Epoch, Vec<PeerId>) {
        let mut votes = BTreeMap::new();
        for (_, status) in self.connected_statuses() {
            let head_epoch = status.head_epoch(self.slots_per_epoch);
            if head_epoch > our_head {
                *votes.entry(head_epoch).or_insert(0usize) += 1;
            }
        }

        let Some((target, count)) = Self::most_voted(&votes) else {
            return (Epoch(0), Vec::new());
        };
        if count < min_peers {
            return (Epoch(0), Vec::new());
        }

        let peers = self
            .connected_statuses()
            .filter(|(_, status)| status.head_epoch(self.slots_per_epoch) >= target)
            .map(|(peer_id, _)| peer_id)
            .collect();

        (target, peers)
    }
}

impl PeerRegistry for RwLock<PeerManager> {
    fn best_finalized(&self, max_peers: usize, our_finalized: Epoch) -> (Epoch, Vec<PeerId>) {
        self.read().best_finalized(max_peers, our_finalized)
    }

    fn best_non_finalized(&self, min_peers: usize, our_head: Epoch) -> (Epoch, Vec<PeerId>) {
        self.read().best_non_finalized(min_peers, our_head)
    }
}
