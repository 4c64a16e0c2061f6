//! Persistent strategy: negotiate once, restart afterwards.

use ghostline::{ExchangeEngine, ExchangeError, Package, PersistentEngine, Rank, Tag, Transport};

use super::{init_tracing, neighbors, ring_package, run_ranks};

fn ghosts(rank: Rank, round: u64, width: usize) -> Vec<f64> {
    (0..width)
        .map(|i| rank.get() as f64 + round as f64 / 8.0 + i as f64 * 100.0)
        .collect()
}

/// The second round with unchanged sizes allocates no buffer and creates no
/// request; it only starts and waits.
#[test]
fn test_second_round_allocates_nothing() {
    init_tracing();

    let engine = PersistentEngine::new();
    run_ranks(4, |mut comm| {
        let rank = comm.rank();
        let (left, _) = neighbors(rank, 4);
        let mut package = ring_package::<Vec<f64>>(rank, 4);

        *package.send_mut(0).expect("right") = ghosts(rank, 0, 3);
        *package.send_mut(1).expect("left") = ghosts(rank, 0, 3);
        let first = engine.exchange(&mut comm, &mut package).expect("round 1");
        assert!(first.negotiated);

        let buffers = comm.buffer_stats().snapshot();
        let metrics = comm.metrics();

        *package.send_mut(0).expect("right") = ghosts(rank, 1, 3);
        *package.send_mut(1).expect("left") = ghosts(rank, 1, 3);
        let second = engine.exchange(&mut comm, &mut package).expect("round 2");
        assert!(!second.negotiated);
        assert_eq!(second.bytes_sent, 48);
        assert_eq!(second.bytes_received, 48);

        assert_eq!(comm.buffer_stats().snapshot(), buffers);
        let after = comm.metrics();
        assert_eq!(after.requests_created(), metrics.requests_created());
        assert_eq!(after.blocking_recvs, metrics.blocking_recvs);
        assert_eq!(after.starts - metrics.starts, 4);

        assert_eq!(package.recv(0).expect("from left").body(), &ghosts(left, 1, 3));
        engine.retire(&mut comm, &mut package).expect("retire");
        assert_eq!(comm.buffer_stats().snapshot().live(), 0);
    });
}

/// Retiring a package lets the next round negotiate different sizes.
#[test]
fn test_retire_then_renegotiate() {
    init_tracing();

    let engine = PersistentEngine::new();
    run_ranks(2, |mut comm| {
        let peer = Rank::new(1 - comm.rank().get());
        let mut package = Package::new(vec![(peer, vec![1u8; 8])], vec![(peer, Vec::new())]);

        engine.exchange(&mut comm, &mut package).expect("round 1");
        assert_eq!(package.recv(0).expect("recv").byte_len(), Some(8));
        engine.retire(&mut comm, &mut package).expect("retire");
        assert!(!package.is_bound());

        *package.send_mut(0).expect("send") = vec![2u8; 64];
        let report = engine.exchange(&mut comm, &mut package).expect("round 2");
        assert!(report.negotiated);
        assert_eq!(package.recv(0).expect("recv").body(), &vec![2u8; 64]);
        engine.retire(&mut comm, &mut package).expect("retire");
    });
}

/// A control message that is not an 8-byte size is rejected.
#[test]
fn test_malformed_size_announcement() {
    init_tracing();

    let engine = PersistentEngine::new();
    let results = run_ranks(2, |mut comm| {
        if comm.rank().get() == 1 {
            comm.send(Rank::new(0), Tag::CONTROL, &[1, 2, 3]).expect("send");
            return None;
        }

        let mut package: Package<Vec<u8>> =
            Package::new(Vec::new(), vec![(Rank::new(1), Vec::new())]);
        let err = engine.post(&mut comm, &mut package).expect_err("bad announcement");
        Some(err)
    });

    assert!(matches!(
        results[0],
        Some(ExchangeError::MalformedSizeAnnouncement { peer, len: 3 }) if peer == Rank::new(1)
    ));
}

/// Bodies that reject the received bytes surface as unpack errors.
#[test]
fn test_unpack_error_names_peer() {
    let mut comm = ghostline::LocalCluster::new(1).into_endpoints().remove(0);
    let me = Rank::new(0);

    // 12 bytes cannot decode into f64 values
    comm.send(me, Tag::CONTROL, &12u64.to_le_bytes()).expect("announce");
    comm.send(me, Tag::DATA, &[0u8; 12]).expect("data");

    let engine = PersistentEngine::new();
    let mut package: Package<Vec<f64>> = Package::new(Vec::new(), vec![(me, Vec::new())]);
    let err = engine.exchange(&mut comm, &mut package).expect_err("misaligned");
    assert!(matches!(err, ExchangeError::Unpack { peer, .. } if peer == me));

    // the round is closed and the binding can still be released
    assert_eq!(comm.outstanding(), 0);
    assert_eq!(package.rounds_completed(), 0);
    assert!(package.is_bound());
    engine.retire(&mut comm, &mut package).expect("retire");
    assert_eq!(comm.buffer_stats().snapshot().live(), 0);
}
