//! Common utilities for multi-rank exchange tests.
//!
//! Provides a one-thread-per-rank harness, the engines under test, and
//! deterministic payloads whose expected value every rank can recompute.

pub mod persistent;
pub mod probing;
pub mod scenarios;
pub mod tcp;

use ghostline::{Engine, ExchangeConfig, LocalCluster, LocalTransport, Rank};

/// Install a test subscriber once per process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// One engine per strategy.
pub fn engines() -> [Engine; 2] {
    [
        Engine::from_config(&ExchangeConfig::probing().with_yield_between_sweeps(true)),
        Engine::from_config(&ExchangeConfig::persistent()),
    ]
}

/// Run `rank_fn` on every rank of a `size`-rank in-process cluster, one
/// thread each, and collect the results in rank order.
pub fn run_ranks<R, F>(size: usize, rank_fn: F) -> Vec<R>
where
    R: Send,
    F: Fn(LocalTransport) -> R + Sync,
{
    let endpoints = LocalCluster::new(size).into_endpoints();
    let rank_fn = &rank_fn;
    std::thread::scope(|scope| {
        let workers: Vec<_> = endpoints
            .into_iter()
            .map(|comm| scope.spawn(move || rank_fn(comm)))
            .collect();
        workers
            .into_iter()
            .map(|worker| worker.join().expect("rank thread panicked"))
            .collect()
    })
}

/// Left and right neighbors of `rank` on a ring of `size` ranks.
pub fn neighbors(rank: Rank, size: usize) -> (Rank, Rank) {
    let size = size as u32;
    (
        Rank::new((rank.get() + size - 1) % size),
        Rank::new((rank.get() + 1) % size),
    )
}

/// Bytes `sender` packs in `round` for the message heading `rightwards` or
/// leftwards.
pub fn payload(sender: Rank, round: u64, rightwards: bool, len: usize) -> Vec<u8> {
    let seed = sender.index() * 31 + round as usize * 7 + usize::from(rightwards) * 128;
    (0..len).map(|i| (seed + i) as u8).collect()
}

/// Ring package: send right then left, receive from left then right.
///
/// With that order the n-th message from a peer is the one meant for the
/// n-th receive from it, even when both neighbors are the same rank.
pub fn ring_package<M: Default>(rank: Rank, size: usize) -> ghostline::Package<M> {
    let (left, right) = neighbors(rank, size);
    ghostline::Package::builder()
        .send(right, M::default())
        .send(left, M::default())
        .recv(left, M::default())
        .recv(right, M::default())
        .build()
}
