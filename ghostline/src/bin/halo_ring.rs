//! Periodic 1-D halo exchange driver.
//!
//! Every rank owns `--cells` values of a ring-shaped domain and, each round,
//! swaps its boundary values with both neighbors, then checks that the ghost
//! values it received are exactly what the neighbors packed.
//!
//! ```text
//!   ... ─ rank r-1 ─┐   ┌─ rank r ─────────────────┐   ┌─ rank r+1 ─ ...
//!                   └─► │ ghost | cells ... | ghost │ ◄─┘
//! ```
//!
//! Runs every rank as a thread of this process by default. Pass `--rank`
//! and `--addrs` to run one rank per process over TCP:
//!
//! ```text
//! halo-ring --rank 0 --addrs 127.0.0.1:7000,127.0.0.1:7001 &
//! halo-ring --rank 1 --addrs 127.0.0.1:7000,127.0.0.1:7001
//! ```
//!
//! `RUST_LOG=ghostline=debug` shows every posted and awaited round.

use std::net::SocketAddr;
use std::process;
use std::time::Duration;

use clap::Parser;
use ghostline::{
    Engine, ExchangeConfig, ExchangeEngine, ExchangeError, LocalCluster, Package, Rank, Strategy,
    TcpConfig, TcpTransport, Transport, TransportError,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CLI arguments
#[derive(Parser, Debug)]
#[command(name = "halo-ring")]
#[command(about = "Periodic 1-D halo exchange over ghostline", long_about = None)]
struct Args {
    /// Number of ranks to run as threads (ignored with --addrs)
    #[arg(long, default_value = "4")]
    ranks: usize,

    /// Exchange rounds to run
    #[arg(long, default_value = "10")]
    rounds: u64,

    /// Cells owned by each rank
    #[arg(long, default_value = "64")]
    cells: usize,

    /// Exchange strategy: probing or persistent (defaults to GHOSTLINE_STRATEGY)
    #[arg(long)]
    strategy: Option<Strategy>,

    /// Vary the ghost width every round (probing strategy only)
    #[arg(long)]
    vary_sizes: bool,

    /// Rank of this process in a TCP run
    #[arg(long, requires = "addrs")]
    rank: Option<u32>,

    /// Comma-separated listen addresses of every rank, in rank order
    #[arg(long, requires = "rank")]
    addrs: Option<String>,
}

/// Reasons a ring run stops.
#[derive(Debug, thiserror::Error)]
enum RingError {
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("rank {rank} round {round}: ghost values from rank {peer} do not match")]
    GhostMismatch { rank: Rank, round: u64, peer: Rank },

    #[error("halo package has no message slot {slot}")]
    MissingSlot { slot: usize },

    #[error("invalid arguments: {0}")]
    Usage(String),

    #[error("rank thread panicked")]
    Panicked,
}

type RingResult<T> = Result<T, RingError>;

/// Totals for one rank over the whole run.
#[derive(Debug, Default)]
struct Summary {
    rounds: u64,
    bytes_sent: u64,
    bytes_received: u64,
    probe_sweeps: u64,
    elapsed: Duration,
}

/// Ghost width sent by `rank` in `round`.
fn ghost_width(args: &Args, rank: Rank, round: u64) -> usize {
    let width = if args.vary_sizes {
        1 + (round as usize + rank.index()) % 4
    } else {
        1
    };
    width.min(args.cells)
}

/// Value of cell `cell` of `rank` in `round`.
fn cell_value(rank: Rank, round: u64, cell: usize) -> f64 {
    rank.get() as f64 * 1e6 + round as f64 * 1e3 + cell as f64
}

/// Boundary values `rank` sends: the first `width` cells leftwards, the
/// last `width` rightwards.
fn boundary(rank: Rank, round: u64, cells: usize, width: usize, rightwards: bool) -> Vec<f64> {
    let start = if rightwards { cells - width } else { 0 };
    (start..start + width)
        .map(|cell| cell_value(rank, round, cell))
        .collect()
}

fn run_rank<T: Transport + ?Sized>(
    comm: &mut T,
    engine: &Engine,
    args: &Args,
) -> RingResult<Summary> {
    let rank = comm.rank();
    let size = comm.size() as u32;
    let left = Rank::new((rank.get() + size - 1) % size);
    let right = Rank::new((rank.get() + 1) % size);

    // Send right before left and receive left before right, so the order
    // also matches when both neighbors are the same rank.
    let mut package = Package::builder()
        .send(right, Vec::new())
        .send(left, Vec::new())
        .recv(left, Vec::new())
        .recv(right, Vec::new())
        .build();

    let mut summary = Summary::default();
    for round in 0..args.rounds {
        let width = ghost_width(args, rank, round);
        *package.send_mut(0).ok_or(RingError::MissingSlot { slot: 0 })? =
            boundary(rank, round, args.cells, width, true);
        *package.send_mut(1).ok_or(RingError::MissingSlot { slot: 1 })? =
            boundary(rank, round, args.cells, width, false);

        let handle = engine.post(comm, &mut package)?;
        // interior update would overlap here
        let report = engine.wait(comm, handle)?;

        let from_left = boundary(left, round, args.cells, ghost_width(args, left, round), true);
        let from_right = boundary(right, round, args.cells, ghost_width(args, right, round), false);
        let got_left = package.recv(0).ok_or(RingError::MissingSlot { slot: 0 })?.body();
        let got_right = package.recv(1).ok_or(RingError::MissingSlot { slot: 1 })?.body();
        if *got_left != from_left {
            return Err(RingError::GhostMismatch { rank, round, peer: left });
        }
        if *got_right != from_right {
            return Err(RingError::GhostMismatch { rank, round, peer: right });
        }

        summary.rounds += 1;
        summary.bytes_sent += report.bytes_sent;
        summary.bytes_received += report.bytes_received;
        summary.probe_sweeps += report.probe_sweeps;
        summary.elapsed += report.elapsed;
    }

    engine.retire(comm, &mut package)?;
    tracing::info!(
        %rank,
        rounds = summary.rounds,
        bytes_sent = summary.bytes_sent,
        bytes_received = summary.bytes_received,
        probe_sweeps = summary.probe_sweeps,
        exchange_us = summary.elapsed.as_micros() as u64,
        "rank finished"
    );
    Ok(summary)
}

fn parse_addrs(list: &str) -> RingResult<Vec<SocketAddr>> {
    list.split(',')
        .map(|addr| {
            addr.trim()
                .parse()
                .map_err(|e| RingError::Usage(format!("invalid address {addr:?}: {e}")))
        })
        .collect()
}

fn run(args: &Args) -> RingResult<()> {
    let mut config = ExchangeConfig::from_env()?;
    if let Some(strategy) = args.strategy {
        config.strategy = strategy;
    }
    if args.vary_sizes && config.strategy == Strategy::Persistent {
        return Err(RingError::Usage(
            "--vary-sizes needs the probing strategy".to_string(),
        ));
    }
    if args.cells == 0 {
        return Err(RingError::Usage("--cells must be at least 1".to_string()));
    }
    let engine = Engine::from_config(&config);

    if let (Some(rank), Some(addrs)) = (args.rank, &args.addrs) {
        let addrs = parse_addrs(addrs)?;
        tracing::info!(rank, ranks = addrs.len(), strategy = %config.strategy, "starting tcp rank");
        let mut comm = TcpTransport::establish(Rank::new(rank), &addrs, TcpConfig::default())?;
        run_rank(&mut comm, &engine, args)?;
        return Ok(());
    }

    if args.ranks == 0 {
        return Err(RingError::Usage("--ranks must be at least 1".to_string()));
    }
    tracing::info!(ranks = args.ranks, strategy = %config.strategy, "starting local ring");
    let endpoints = LocalCluster::new(args.ranks).into_endpoints();
    let results: Vec<RingResult<Summary>> = std::thread::scope(|scope| {
        let workers: Vec<_> = endpoints
            .into_iter()
            .map(|mut comm| {
                let engine = &engine;
                scope.spawn(move || run_rank(&mut comm, engine, args))
            })
            .collect();
        workers
            .into_iter()
            .map(|worker| {
                worker
                    .join()
                    .unwrap_or_else(|_| Err(RingError::Panicked))
            })
            .collect()
    });

    let mut total = Summary::default();
    for result in results {
        let summary = result?;
        total.rounds = total.rounds.max(summary.rounds);
        total.bytes_sent += summary.bytes_sent;
        total.bytes_received += summary.bytes_received;
        total.probe_sweeps += summary.probe_sweeps;
    }
    tracing::info!(
        rounds = total.rounds,
        bytes_sent = total.bytes_sent,
        bytes_received = total.bytes_received,
        probe_sweeps = total.probe_sweeps,
        "ring complete"
    );
    Ok(())
}

fn main() {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    if let Err(e) = run(&args) {
        tracing::error!(error = %e, "halo exchange failed");
        process::exit(1);
    }
}
