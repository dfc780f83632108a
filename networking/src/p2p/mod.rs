//! Gossip publishing: joined topics, fork context and the outgoing broadcaster.

pub mod broadcaster;
pub mod fork;
pub mod topics;
pub mod transport;

#[cfg(test)]
mod tests;

pub use broadcaster::{Broadcaster, MAX_SUBNET_DISCOVERY_ATTEMPTS, SubnetDiscovery};
pub use fork::{ForkContext, GenesisInfo};
pub use topics::{PEER_POLL_INTERVAL, TopicRegistry};
pub use transport::{InboundGossip, PubsubTransport, Subscription, SubscriptionCounter, TopicHandle};
