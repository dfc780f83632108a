use std::collections::HashSet;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rstest::rstest;

use super::mocks::peers;
use crate::error::NetworkError;
use crate::sync::sampler::PeerSampler;

#[rstest]
#[case(10, 0.75, 8)]
#[case(4, 0.75, 3)]
#[case(1, 0.75, 1)]
#[case(3, 0.0, 1)]
#[case(5, 1.0, 5)]
#[case(5, 2.5, 5)]
fn test_filter_keeps_ceil_fraction(#[case] n: usize, #[case] fraction: f64, #[case] expected: usize) {
    let mut rng = StdRng::seed_from_u64(7);
    let input = peers(n);

    let sampled = PeerSampler::new(fraction).filter(&input, &mut rng).unwrap();

    assert_eq!(sampled.len(), expected);
    assert!(sampled.iter().all(|peer| input.contains(peer)));
}

#[test]
fn test_filter_removes_duplicates() {
    let mut rng = StdRng::seed_from_u64(1);
    let base = peers(3);
    let input: Vec<_> = base.iter().chain(base.iter()).chain(base.iter()).copied().collect();

    let sampled = PeerSampler::new(1.0).filter(&input, &mut rng).unwrap();

    let unique: HashSet<_> = sampled.iter().collect();
    assert_eq!(sampled.len(), 3);
    assert_eq!(unique.len(), 3);
}

#[test]
fn test_filter_empty_is_error() {
    let mut rng = StdRng::seed_from_u64(1);
    let err = PeerSampler::new(0.75).filter(&[], &mut rng).unwrap_err();
    assert!(matches!(err, NetworkError::NoPeersAvailable));
}
