use std::sync::Arc;
use std::time::Duration;

use chain::MAINNET_CONFIG;
use containers::{
    Attestation, SignedBeaconBlock, SignedVoluntaryExit, ValidatorIndex, VoluntaryExit, Epoch,
};
use metrics::Metrics;
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use super::mocks::{MockDiscovery, MockState, MockTransport, expected_digest, ready_fork_context};
use crate::encoding::{GossipEncoding, SszSnappyEncoding};
use crate::error::NetworkError;
use crate::gossipsub::{GossipKind, GossipTopic, PubsubMessage};
use crate::p2p::broadcaster::{Broadcaster, MAX_SUBNET_DISCOVERY_ATTEMPTS};
use crate::p2p::fork::ForkContext;
use crate::p2p::topics::TopicRegistry;

const SUBNET: u64 = 3;

fn attestation_topic() -> String {
    GossipTopic::attestation(expected_digest(), SUBNET).with_suffix("/ssz_snappy")
}

fn block_topic() -> String {
    GossipTopic::new(expected_digest(), GossipKind::BeaconBlock).with_suffix("/ssz_snappy")
}

struct Fixture {
    state: Arc<MockState>,
    discovery: Arc<MockDiscovery>,
    broadcaster: Broadcaster,
}

fn fixture_with(fork_context: Arc<ForkContext>, outcomes: Vec<Result<bool, String>>) -> Fixture {
    build_fixture(fork_context, outcomes, Duration::ZERO)
}

fn build_fixture(
    fork_context: Arc<ForkContext>,
    outcomes: Vec<Result<bool, String>>,
    lookup_delay: Duration,
) -> Fixture {
    let transport = MockTransport::new();
    let state = Arc::clone(&transport.state);
    let discovery =
        MockDiscovery::with_delay(outcomes, Arc::clone(&state), attestation_topic(), lookup_delay);
    let registry = Arc::new(TopicRegistry::new(transport, Arc::clone(&fork_context)));
    let broadcaster = Broadcaster::new(
        registry,
        Arc::new(SszSnappyEncoding),
        fork_context,
        discovery.clone(),
        &MAINNET_CONFIG,
    );

    Fixture {
        state,
        discovery,
        broadcaster,
    }
}

fn fixture(outcomes: Vec<Result<bool, String>>) -> Fixture {
    fixture_with(ready_fork_context(), outcomes)
}

fn attestation() -> Attestation {
    Attestation {
        validator_index: ValidatorIndex(17),
        ..Attestation::default()
    }
}

#[tokio::test]
async fn broadcast_publishes_block_on_its_topic() {
    let Fixture { state, broadcaster, .. } = fixture(vec![]);
    state.add_peer(&block_topic());
    let message = PubsubMessage::BeaconBlock(SignedBeaconBlock::default());

    broadcaster
        .broadcast(&message, &CancellationToken::new())
        .await
        .unwrap();

    let expected = SszSnappyEncoding.encode_gossip(&message).unwrap();
    assert_eq!(state.published(), vec![(block_topic(), expected)]);
}

#[tokio::test]
async fn broadcast_voluntary_exit_uses_exit_topic() {
    let Fixture { state, broadcaster, .. } = fixture(vec![]);
    let topic = GossipTopic::new(expected_digest(), GossipKind::VoluntaryExit).with_suffix("/ssz_snappy");
    state.add_peer(&topic);
    let message = PubsubMessage::VoluntaryExit(SignedVoluntaryExit {
        message: VoluntaryExit {
            epoch: Epoch(4),
            validator_index: ValidatorIndex(9),
        },
        ..SignedVoluntaryExit::default()
    });

    broadcaster
        .broadcast(&message, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(state.published().len(), 1);
    assert_eq!(state.published()[0].0, topic);
}

#[tokio::test]
async fn broadcast_unmapped_kind_publishes_nothing() {
    let Fixture { state, broadcaster, .. } = fixture(vec![]);

    let result = broadcaster
        .broadcast(&PubsubMessage::Attestation(attestation()), &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(NetworkError::MessageNotMapped(_))));
    assert!(state.joins().is_empty());
    assert!(state.published().is_empty());
}

#[tokio::test]
async fn broadcast_before_genesis_fails() {
    let Fixture { state, broadcaster, .. } =
        fixture_with(Arc::new(ForkContext::new([0; 4])), vec![]);

    let result = broadcaster
        .broadcast(
            &PubsubMessage::BeaconBlock(SignedBeaconBlock::default()),
            &CancellationToken::new(),
        )
        .await;

    assert!(matches!(result, Err(NetworkError::ForkDigestUnavailable)));
    assert!(state.published().is_empty());
}

#[tokio::test(start_paused = true)]
async fn broadcast_without_peers_hits_two_slot_deadline() {
    let Fixture { state, broadcaster, .. } = fixture(vec![]);
    let started = tokio::time::Instant::now();

    let result = broadcaster
        .broadcast(
            &PubsubMessage::BeaconBlock(SignedBeaconBlock::default()),
            &CancellationToken::new(),
        )
        .await;

    assert!(matches!(result, Err(NetworkError::DeadlineExceeded)));
    assert_eq!(started.elapsed(), MAINNET_CONFIG.slot_duration() * 2);
    assert!(state.published().is_empty());
}

#[tokio::test]
async fn attestation_discovers_subnet_peer_then_publishes_once() {
    let Fixture {
        state,
        discovery,
        broadcaster,
    } = fixture(vec![Ok(false), Ok(true)]);

    broadcaster
        .broadcast_attestation(SUBNET, attestation())
        .unwrap()
        .await
        .unwrap();

    assert_eq!(discovery.calls(), 2);
    let published = state.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, attestation_topic());
    assert_eq!(
        published[0].1,
        SszSnappyEncoding
            .encode_gossip(&PubsubMessage::Attestation(attestation()))
            .unwrap()
    );
}

#[tokio::test]
async fn attestation_with_subnet_peer_skips_discovery() {
    let Fixture {
        state,
        discovery,
        broadcaster,
    } = fixture(vec![]);
    state.add_peer(&attestation_topic());

    broadcaster
        .broadcast_attestation(SUBNET, attestation())
        .unwrap()
        .await
        .unwrap();

    assert_eq!(discovery.calls(), 0);
    assert_eq!(state.published().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn attestation_discovery_is_bounded() {
    let Fixture {
        state,
        discovery,
        broadcaster,
    } = fixture(vec![Ok(false); 5]);

    let task = broadcaster.broadcast_attestation(SUBNET, attestation()).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(discovery.calls(), MAX_SUBNET_DISCOVERY_ATTEMPTS);
    assert!(state.published().is_empty());

    state.add_peer(&attestation_topic());
    task.await.unwrap();

    assert_eq!(discovery.calls(), MAX_SUBNET_DISCOVERY_ATTEMPTS);
    assert_eq!(state.published().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn attestation_discovery_error_stops_retries_but_still_publishes() {
    let Fixture {
        state,
        discovery,
        broadcaster,
    } = fixture(vec![Err("lookup failed".into()), Ok(true)]);

    let task = broadcaster.broadcast_attestation(SUBNET, attestation()).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(discovery.calls(), 1);

    state.add_peer(&attestation_topic());
    task.await.unwrap();

    assert_eq!(discovery.calls(), 1);
    assert_eq!(state.published().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_attestations_share_one_discovery_at_a_time() {
    let Fixture {
        state,
        discovery,
        broadcaster,
    } = build_fixture(
        ready_fork_context(),
        vec![Ok(false), Ok(false), Ok(false), Ok(true)],
        Duration::from_secs(1),
    );

    let first = broadcaster.broadcast_attestation(SUBNET, attestation()).unwrap();
    let second = broadcaster.broadcast_attestation(SUBNET, attestation()).unwrap();
    first.await.unwrap();
    second.await.unwrap();

    // One task exhausts its attempts, the other finds the peer afterwards.
    assert_eq!(discovery.max_in_flight(), 1);
    assert_eq!(discovery.calls(), MAX_SUBNET_DISCOVERY_ATTEMPTS + 1);
    let published = state.published();
    assert_eq!(published.len(), 2);
    assert!(published.iter().all(|(topic, _)| *topic == attestation_topic()));
}

#[tokio::test(start_paused = true)]
async fn attestation_task_gives_up_after_an_epoch() {
    let Fixture { state, broadcaster, .. } = fixture(vec![]);
    let started = tokio::time::Instant::now();

    broadcaster
        .broadcast_attestation(SUBNET, attestation())
        .unwrap()
        .await
        .unwrap();

    assert_eq!(started.elapsed(), MAINNET_CONFIG.epoch_duration());
    assert!(state.published().is_empty());
}

#[tokio::test]
async fn attestation_rejects_unknown_subnet() {
    let Fixture { discovery, broadcaster, .. } = fixture(vec![]);

    let result = broadcaster.broadcast_attestation(MAINNET_CONFIG.attestation_subnet_count, attestation());

    assert!(matches!(result, Err(NetworkError::UnknownSubnet(64))));
    assert_eq!(discovery.calls(), 0);
}

#[tokio::test]
async fn attestation_before_genesis_fails_without_spawning() {
    let Fixture { discovery, broadcaster, .. } =
        fixture_with(Arc::new(ForkContext::new([0; 4])), vec![]);

    let result = broadcaster.broadcast_attestation(SUBNET, attestation());

    assert!(matches!(result, Err(NetworkError::ForkDigestUnavailable)));
    assert_eq!(discovery.calls(), 0);
}

#[tokio::test]
async fn attestation_outcomes_are_metered() {
    let metrics = Arc::new(Metrics::new().unwrap());
    let Fixture { broadcaster, .. } = fixture(vec![Ok(false), Ok(true)]);
    let broadcaster = broadcaster.with_metrics(Arc::clone(&metrics));

    broadcaster
        .broadcast_attestation(SUBNET, attestation())
        .unwrap()
        .await
        .unwrap();

    let text = metrics.gather().unwrap();
    assert!(text.contains(r#"p2p_attestation_broadcast_attempts_total{subnet="3"} 1"#));
    assert!(text.contains(r#"p2p_saved_attestation_broadcasts_total{subnet="3"} 1"#));
    // One count per lookup.
    assert!(text.contains(r#"p2p_subnet_discovery_attempts_total{result="empty"} 1"#));
    assert!(text.contains(r#"p2p_subnet_discovery_attempts_total{result="found"} 1"#));
}
