pub mod server;

use anyhow::Result;
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    peers: IntGauge,
    gossip_publishes: IntCounterVec,
    attestation_broadcast_attempts: IntCounterVec,
    saved_attestation_broadcasts: IntCounterVec,
    attestation_broadcast_failures: IntCounterVec,
    subnet_discovery_attempts: IntCounterVec,
    sync_searches: IntCounterVec,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let peers = IntGauge::with_opts(Opts::new(
            "network_peers_connected",
            "Number of connected peers",
        ))?;
        registry.register(Box::new(peers.clone()))?;

        // Gossip
        let gossip_publishes = IntCounterVec::new(
            Opts::new("p2p_gossip_publishes_total", "Gossip publish outcomes by message kind"),
            &["kind", "result"],
        )?;
        registry.register(Box::new(gossip_publishes.clone()))?;

        let attestation_broadcast_attempts = IntCounterVec::new(
            Opts::new(
                "p2p_attestation_broadcast_attempts_total",
                "Attestation broadcasts attempted, by subnet",
            ),
            &["subnet"],
        )?;
        registry.register(Box::new(attestation_broadcast_attempts.clone()))?;

        let saved_attestation_broadcasts = IntCounterVec::new(
            Opts::new(
                "p2p_saved_attestation_broadcasts_total",
                "Attestation broadcasts that needed subnet peer discovery first, by subnet",
            ),
            &["subnet"],
        )?;
        registry.register(Box::new(saved_attestation_broadcasts.clone()))?;

        let attestation_broadcast_failures = IntCounterVec::new(
            Opts::new(
                "p2p_attestation_broadcast_failures_total",
                "Attestation broadcasts that failed, by stage",
            ),
            &["stage"],
        )?;
        registry.register(Box::new(attestation_broadcast_failures.clone()))?;

        let subnet_discovery_attempts = IntCounterVec::new(
            Opts::new(
                "p2p_subnet_discovery_attempts_total",
                "Subnet peer discovery lookups by result",
            ),
            &["result"],
        )?;
        registry.register(Box::new(subnet_discovery_attempts.clone()))?;

        // Sync
        let sync_searches = IntCounterVec::new(
            Opts::new(
                "sync_non_skipped_slot_searches_total",
                "Non-skipped slot searches by result",
            ),
            &["result"],
        )?;
        registry.register(Box::new(sync_searches.clone()))?;

        Ok(Self {
            registry,
            peers,
            gossip_publishes,
            attestation_broadcast_attempts,
            saved_attestation_broadcasts,
            attestation_broadcast_failures,
            subnet_discovery_attempts,
            sync_searches,
        })
    }

    pub fn gather(&self) -> Result<String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::<u8>::new();
        TextEncoder::new().encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    pub fn set_peers(&self, v: i64) {
        self.peers.set(v);
    }

    pub fn inc_gossip_publish(&self, kind: &str, result: &str) {
        self.gossip_publishes.with_label_values(&[kind, result]).inc();
    }

    pub fn inc_attestation_broadcast_attempt(&self, subnet: u64) {
        self.attestation_broadcast_attempts
            .with_label_values(&[&subnet.to_string()])
            .inc();
    }

    pub fn inc_saved_attestation_broadcast(&self, subnet: u64) {
        self.saved_attestation_broadcasts
            .with_label_values(&[&subnet.to_string()])
            .inc();
    }

    pub fn inc_attestation_broadcast_failure(&self, stage: &str) {
        self.attestation_broadcast_failures
            .with_label_values(&[stage])
            .inc();
    }

    pub fn inc_subnet_discovery(&self, result: &str) {
        self.subnet_discovery_attempts.with_label_values(&[result]).inc();
    }

    pub fn inc_sync_search(&self, result: &str) {
        self.sync_searches.with_label_values(&[result]).inc();
    }
}

pub type SharedMetrics = Arc<Metrics>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exposes_registered_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.inc_attestation_broadcast_attempt(5);
        metrics.inc_saved_attestation_broadcast(5);
        metrics.inc_gossip_publish("beacon_block", "ok");
        metrics.set_peers(3);

        let text = metrics.gather().unwrap();
        assert!(text.contains("p2p_attestation_broadcast_attempts_total{subnet=\"5\"} 1"));
        assert!(text.contains("p2p_saved_attestation_broadcasts_total{subnet=\"5\"} 1"));
        assert!(text.contains("network_peers_connected 3"));
    }
}
