//! Behavior shared by both strategies.

use ghostline::{
    Engine, ExchangeConfig, ExchangeEngine, ExchangeError, LocalCluster, Package, Rank, Strategy,
    Transport,
};

use super::{engines, init_tracing, neighbors, payload, ring_package, run_ranks};

/// Rank 0 sends 100 bytes to rank 1 and receives one message back.
#[test]
fn test_hundred_byte_scenario() {
    init_tracing();

    for engine in engines() {
        let received = run_ranks(2, |mut comm| {
            let rank = comm.rank();
            let peer = Rank::new(1 - rank.get());
            let outbound: Vec<u8> = (0..100u32).map(|i| (i * 7 + rank.get()) as u8).collect();
            let mut package = Package::new(vec![(peer, outbound)], vec![(peer, Vec::new())]);

            let handle = engine.post(&mut comm, &mut package).expect("post");
            engine.wait(&mut comm, handle).expect("wait");
            engine.retire(&mut comm, &mut package).expect("retire");

            package.recv(0).expect("recv").body().clone()
        });

        let sent_by_rank0: Vec<u8> = (0..100u32).map(|i| (i * 7) as u8).collect();
        assert_eq!(received[1], sent_by_rank0, "{} engine", engine.strategy());
        assert_eq!(received[0].len(), 100);
    }
}

/// Immediately after post, the transport holds one request per message.
#[test]
fn test_outstanding_equals_message_count() {
    init_tracing();

    for engine in engines() {
        run_ranks(3, |mut comm| {
            let me = comm.rank();
            let others: Vec<Rank> = Rank::all(3).filter(|&r| r != me).collect();
            let mut package = Package::new(
                others.iter().map(|&r| (r, vec![me.get() as u8; 10])).collect(),
                others.iter().map(|&r| (r, Vec::new())).collect(),
            );

            for _ in 0..3 {
                let handle = engine.post(&mut comm, &mut package).expect("post");
                assert_eq!(handle.outstanding(), 4);
                assert_eq!(comm.outstanding(), 4);
                engine.wait(&mut comm, handle).expect("wait");
                assert_eq!(comm.outstanding(), 0);
            }

            for (i, &peer) in others.iter().enumerate() {
                assert_eq!(package.recv(i).expect("recv").body(), &vec![peer.get() as u8; 10]);
            }
            engine.retire(&mut comm, &mut package).expect("retire");
        });
    }
}

/// Round-trip fidelity around a ring over several rounds.
#[test]
fn test_ring_fidelity() {
    init_tracing();

    for engine in engines() {
        run_ranks(5, |mut comm| {
            let rank = comm.rank();
            let (left, right) = neighbors(rank, 5);
            let mut package = ring_package::<Vec<u8>>(rank, 5);

            for round in 0..5 {
                *package.send_mut(0).expect("right") = payload(rank, round, true, 48);
                *package.send_mut(1).expect("left") = payload(rank, round, false, 48);

                let report = engine.exchange(&mut comm, &mut package).expect("exchange");
                assert_eq!(report.bytes_received, 96);
                assert_eq!(report.negotiated, engine.strategy() == Strategy::Persistent && round == 0);

                assert_eq!(package.recv(0).expect("from left").body(), &payload(left, round, true, 48));
                assert_eq!(package.recv(1).expect("from right").body(), &payload(right, round, false, 48));
            }
            assert_eq!(package.rounds_completed(), 5);
            engine.retire(&mut comm, &mut package).expect("retire");
        });
    }
}

/// A side with no messages issues no requests and never blocks.
#[test]
fn test_empty_sides_issue_nothing() {
    init_tracing();

    for engine in engines() {
        run_ranks(2, |mut comm| {
            let rank = comm.rank();
            let mut package = if rank.get() == 0 {
                Package::new(vec![(Rank::new(1), vec![9u8; 32])], Vec::new())
            } else {
                Package::new(Vec::new(), vec![(Rank::new(0), Vec::new())])
            };

            for _ in 0..3 {
                let handle = engine.post(&mut comm, &mut package).expect("post");
                assert_eq!(handle.outstanding(), 1);
                let report = engine.wait(&mut comm, handle).expect("wait");
                if package.recv_count() == 0 {
                    assert_eq!(report.probe_sweeps, 0);
                }
            }

            let metrics = comm.metrics();
            if rank.get() == 0 {
                assert_eq!(metrics.recvs_posted, 0);
                assert_eq!(metrics.probes, 0);
                assert_eq!(metrics.blocking_recvs, 0);
            } else {
                assert_eq!(metrics.sends_posted, 0);
                assert_eq!(metrics.blocking_sends, 0);
                assert_eq!(package.recv(0).expect("recv").body(), &vec![9u8; 32]);
            }
            engine.retire(&mut comm, &mut package).expect("retire");
        });
    }
}

#[test]
fn test_fully_empty_package() {
    let mut comm = LocalCluster::new(1).into_endpoints().remove(0);
    for engine in engines() {
        let mut package: Package<Vec<u8>> = Package::new(Vec::new(), Vec::new());
        let handle = engine.post(&mut comm, &mut package).expect("post");
        assert_eq!(handle.outstanding(), 0);
        let report = engine.wait(&mut comm, handle).expect("wait");
        assert_eq!((report.sends, report.recvs), (0, 0));
        assert_eq!(report.bytes_sent + report.bytes_received, 0);
        engine.retire(&mut comm, &mut package).expect("retire");
    }
    assert_eq!(comm.metrics().requests_created(), 0);
}

/// Posting again after dropping an un-awaited handle is refused.
#[test]
fn test_dropped_handle_blocks_next_post() {
    let mut comm = LocalCluster::new(1).into_endpoints().remove(0);
    let me = Rank::new(0);

    for engine in engines() {
        let mut package = Package::new(vec![(me, vec![1u8; 4])], vec![(me, Vec::new())]);
        drop(engine.post(&mut comm, &mut package).expect("post"));

        let err = engine.post(&mut comm, &mut package).expect_err("round in flight");
        assert!(matches!(err, ExchangeError::RoundInFlight));
    }
}

/// A package bound by the persistent strategy cannot be posted by the
/// probing one until it is retired.
#[test]
fn test_bound_package_needs_retire_before_probing() {
    let mut comm = LocalCluster::new(1).into_endpoints().remove(0);
    let me = Rank::new(0);
    let [probing, persistent] = engines();
    let mut package = Package::new(vec![(me, vec![3u8; 8])], vec![(me, Vec::new())]);

    persistent.exchange(&mut comm, &mut package).expect("persistent round");
    assert!(package.is_bound());

    let err = probing.exchange(&mut comm, &mut package).expect_err("bound");
    assert!(matches!(
        err,
        ExchangeError::StrategyMismatch {
            bound: Strategy::Persistent,
            engine: Strategy::Probing
        }
    ));
    assert!(matches!(
        probing.retire(&mut comm, &mut package),
        Err(ExchangeError::StrategyMismatch { .. })
    ));

    persistent.retire(&mut comm, &mut package).expect("retire");
    let report = probing.exchange(&mut comm, &mut package).expect("probing round");
    assert_eq!(report.strategy, Strategy::Probing);
    assert_eq!(package.recv(0).expect("recv").body(), &vec![3u8; 8]);
    assert_eq!(comm.buffer_stats().snapshot().live(), 0);
}

/// Strategy chosen from a JSON document drives every rank.
#[test]
fn test_engine_from_json_config() {
    init_tracing();

    let config = ExchangeConfig::from_json(r#"{"strategy": "persistent"}"#).expect("config");
    let engine = Engine::from_config(&config);

    let reports = run_ranks(2, |mut comm| {
        let peer = Rank::new(1 - comm.rank().get());
        let mut package = Package::new(vec![(peer, vec![0.5f64; 4])], vec![(peer, Vec::new())]);
        let first = engine.exchange(&mut comm, &mut package).expect("round 1");
        let second = engine.exchange(&mut comm, &mut package).expect("round 2");
        engine.retire(&mut comm, &mut package).expect("retire");
        (first, second)
    });

    for (first, second) in reports {
        assert_eq!(first.strategy, Strategy::Persistent);
        assert!(first.negotiated);
        assert!(!second.negotiated);
        assert_eq!(second.bytes_received, 32);
    }
}
