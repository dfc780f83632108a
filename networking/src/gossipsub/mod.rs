pub mod config;
pub mod message;
pub mod message_id;
pub mod topic;

#[cfg(test)]
mod tests;

use libp2p::gossipsub::{AllowAllSubscriptionFilter, Behaviour, IdentityTransform};

pub type GossipsubBehaviour = Behaviour<IdentityTransform, AllowAllSubscriptionFilter>;

pub use config::{GossipsubConfig, GossipsubParameters};
pub use message::PubsubMessage;
pub use message_id::{MessageIdentifier, compute_message_id};
pub use topic::{
    BEACON_AGGREGATE_AND_PROOF_TOPIC, BEACON_ATTESTATION_PREFIX, BEACON_BLOCK_TOPIC, GossipKind,
    GossipTopic, SSZ_SNAPPY_ENCODING_POSTFIX, TOPIC_PREFIX, VOLUNTARY_EXIT_TOPIC, core_topics,
};
