use std::time::Duration;

use anyhow::{Result, anyhow};
use libp2p::gossipsub::{Config, ConfigBuilder, Message, ValidationMode};

use crate::gossipsub::message_id::{MessageIdentifier, compute_message_id};
use crate::types::GOSSIP_MAX_SIZE;

/// Mesh tuning for the gossip router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GossipsubParameters {
    pub d: usize,
    pub d_low: usize,
    pub d_high: usize,
    pub d_lazy: usize,
    pub heartbeat_interval: Duration,
    pub fanout_ttl: Duration,
    pub history_length: usize,
    pub history_gossip: usize,
    pub seen_ttl: Duration,
}

impl Default for GossipsubParameters {
    fn default() -> Self {
        let heartbeat_interval = Duration::from_millis(700);
        Self {
            d: 8,
            d_low: 5,
            d_high: 12,
            d_lazy: 6,
            heartbeat_interval,
            fanout_ttl: Duration::from_secs(60),
            history_length: 6,
            history_gossip: 3,
            // 550 heartbeats
            seen_ttl: heartbeat_interval * 550,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GossipsubConfig {
    pub parameters: GossipsubParameters,
    pub config: Config,
}

impl GossipsubConfig {
    pub fn new(parameters: GossipsubParameters, identifier: MessageIdentifier) -> Result<Self> {
        let config = ConfigBuilder::default()
            .heartbeat_interval(parameters.heartbeat_interval)
            .fanout_ttl(parameters.fanout_ttl)
            .history_length(parameters.history_length)
            .history_gossip(parameters.history_gossip)
            .duplicate_cache_time(parameters.seen_ttl)
            .mesh_n(parameters.d)
            .mesh_n_low(parameters.d_low)
            .mesh_n_high(parameters.d_high)
            .gossip_lazy(parameters.d_lazy)
            .max_transmit_size(GOSSIP_MAX_SIZE)
            .validation_mode(ValidationMode::Anonymous)
            .message_id_fn(move |message: &Message| compute_message_id(&identifier, message))
            .build()
            .map_err(|err| anyhow!("Failed to build gossipsub config: {err:?}"))?;

        Ok(Self { parameters, config })
    }
}
