//! Probing strategy: sizes unknown to the receiver.

use std::sync::Barrier;
use std::time::Duration;

use ghostline::{ExchangeEngine, Package, ProbingEngine, Rank, Transport};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::{init_tracing, neighbors, payload, ring_package, run_ranks};

/// Two messages of 16 and 4096 bytes from two peers, the larger one sent
/// first, land in buffers of exactly their size matched to the right peer.
#[test]
fn test_out_of_order_sizes_allocate_exactly() {
    init_tracing();

    let engine = ProbingEngine::new().with_yield_between_sweeps(true);
    let rank2_sent = Barrier::new(2);

    let results = run_ranks(3, |mut comm| {
        let rank = comm.rank();
        match rank.get() {
            0 => {
                let mut package: Package<Vec<u8>> = Package::new(
                    Vec::new(),
                    vec![(Rank::new(1), Vec::new()), (Rank::new(2), Vec::new())],
                );
                let before = comm.buffer_stats().snapshot();
                let handle = engine.post(&mut comm, &mut package).expect("post");
                let after_post = comm.buffer_stats().snapshot();
                engine.wait(&mut comm, handle).expect("wait");

                assert_eq!(after_post.allocations - before.allocations, 2);
                assert_eq!(after_post.bytes_allocated - before.bytes_allocated, 16 + 4096);
                Some(package)
            }
            1 => {
                rank2_sent.wait();
                let mut package = Package::new(vec![(Rank::new(0), vec![1u8; 16])], Vec::new());
                engine.exchange(&mut comm, &mut package).expect("exchange");
                None
            }
            _ => {
                let mut package = Package::new(vec![(Rank::new(0), vec![2u8; 4096])], Vec::new());
                let handle = engine.post(&mut comm, &mut package).expect("post");
                rank2_sent.wait();
                engine.wait(&mut comm, handle).expect("wait");
                None
            }
        }
    });

    let package = results[0].as_ref().expect("rank 0 package");
    let from_rank1 = package.recv(0).expect("from rank 1");
    let from_rank2 = package.recv(1).expect("from rank 2");
    assert_eq!(from_rank1.peer(), Rank::new(1));
    assert_eq!(from_rank1.byte_len(), Some(16));
    assert_eq!(from_rank1.body(), &vec![1u8; 16]);
    assert_eq!(from_rank2.byte_len(), Some(4096));
    assert_eq!(from_rank2.body(), &vec![2u8; 4096]);
}

/// Sizes drawn per sender and round, including empty messages, with random
/// delays shuffling the arrival order.
#[test]
fn test_randomized_ring_sizes() {
    init_tracing();

    const RANKS: usize = 5;
    const ROUNDS: usize = 20;

    let mut rng = ChaCha8Rng::seed_from_u64(0x6805_7115);
    let sizes: Vec<Vec<usize>> = (0..ROUNDS)
        .map(|_| (0..RANKS).map(|_| rng.random_range(0..=2048)).collect())
        .collect();
    let delays: Vec<Vec<u64>> = (0..ROUNDS)
        .map(|_| (0..RANKS).map(|_| rng.random_range(0..300)).collect())
        .collect();

    let engine = ProbingEngine::new().with_yield_between_sweeps(true);

    run_ranks(RANKS, |mut comm| {
        let rank = comm.rank();
        let (left, right) = neighbors(rank, RANKS);
        let mut package = ring_package::<Vec<u8>>(rank, RANKS);

        for round in 0..ROUNDS {
            let len = sizes[round][rank.index()];
            let round_id = round as u64;
            *package.send_mut(0).expect("right") = payload(rank, round_id, true, len);
            *package.send_mut(1).expect("left") = payload(rank, round_id, false, len);

            std::thread::sleep(Duration::from_micros(delays[round][rank.index()]));
            let report = engine.exchange(&mut comm, &mut package).expect("exchange");
            assert!(report.probe_sweeps >= 1);

            let left_len = sizes[round][left.index()];
            let right_len = sizes[round][right.index()];
            let from_left = package.recv(0).expect("from left");
            let from_right = package.recv(1).expect("from right");
            assert_eq!(from_left.byte_len(), Some(left_len));
            assert_eq!(from_right.byte_len(), Some(right_len));
            assert_eq!(from_left.body(), &payload(left, round_id, true, left_len));
            assert_eq!(from_right.body(), &payload(right, round_id, false, right_len));
        }

        assert_eq!(comm.outstanding(), 0);
        assert_eq!(comm.buffer_stats().snapshot().live(), 0);
        // two sends and two receives per round
        assert_eq!(comm.metrics().requests_created(), (ROUNDS * 4) as u64);
    });
}
