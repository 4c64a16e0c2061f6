//! # ghostline
//!
//! Non-blocking halo exchange for grid-based simulators.
//!
//! Neighboring ranks of a decomposed domain swap boundary ("ghost") values
//! every iteration. ghostline turns a fixed set of typed messages bound to
//! neighbor ranks into a posted round that can overlap computation and be
//! awaited later:
//!
//! ```text
//!  build once           every iteration
//!  ───────────          ─────────────────────────────────────────────────────
//!  Package ──────────►  engine.post(comm, &mut package) ─► Handle
//!   sends: (rank, M)                 ... interior computation ...
//!   recvs: (rank, M)    engine.wait(comm, handle)        ─► RoundReport
//! ```
//!
//! Two strategies discover how large an incoming message is:
//!
//! | Strategy | Inbound size | Per-round cost |
//! |----------|--------------|----------------|
//! | [`ProbingEngine`] | probed when the message arrives | allocation + request per message |
//! | [`PersistentEngine`] | negotiated once on the control tag | restart of bound requests |
//!
//! The strategy is chosen at startup through [`ExchangeConfig`] and
//! [`Engine::from_config`].
//!
//! ## Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              ghostline (this crate)                         │
//! │   Marshal, Invoice, Package, Handle, engines, config        │
//! ├─────────────────────────────────────────────────────────────┤
//! │              ghostline-transport                            │
//! │   Communicator, LocalCluster, TcpTransport, wire format     │
//! ├─────────────────────────────────────────────────────────────┤
//! │              ghostline-core                                 │
//! │   Rank, Tag, RequestId, CommBuffer, Transport trait         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use ghostline::{Engine, ExchangeConfig, ExchangeEngine, LocalCluster, Package, Rank, Transport};
//!
//! let engine = Engine::from_config(&ExchangeConfig::default());
//! let endpoints = LocalCluster::new(2).into_endpoints();
//!
//! std::thread::scope(|scope| {
//!     for mut comm in endpoints {
//!         let engine = &engine;
//!         scope.spawn(move || {
//!             let peer = Rank::new(1 - comm.rank().get());
//!             let ghosts = vec![comm.rank().get() as f64; 3];
//!             let mut package = Package::new(vec![(peer, ghosts)], vec![(peer, Vec::new())]);
//!
//!             let handle = engine.post(&mut comm, &mut package).expect("post");
//!             let report = engine.wait(&mut comm, handle).expect("wait");
//!
//!             assert_eq!(report.bytes_received, 24);
//!             assert_eq!(package.recv(0).expect("recv").body(), &vec![peer.get() as f64; 3]);
//!         });
//!     }
//! });
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

// Re-export the layers below for convenience
pub use ghostline_core::{
    BufferSnapshot, BufferStats, CommBuffer, Rank, RequestId, Tag, Transport, TransportError,
    TransportMetrics, TransportResult,
};
pub use ghostline_transport::{LocalCluster, LocalTransport, TcpConfig, TcpTransport};

// =============================================================================
// Modules
// =============================================================================

/// Strategy selection and configuration loading.
pub mod config;

/// Probing and persistent exchange engines.
pub mod engine;

/// Error types.
pub mod error;

/// Completion handles and round reports.
pub mod handle;

/// Message descriptors.
pub mod invoice;

/// Packing message bodies into bytes.
pub mod marshal;

/// Topology containers reused every round.
pub mod package;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::{ExchangeConfig, Strategy};
pub use engine::{Engine, ExchangeEngine, PersistentEngine, ProbingEngine};
pub use error::{ExchangeError, ExchangeResult, MarshalError};
pub use handle::{Handle, RoundReport};
pub use invoice::{Direction, Invoice};
pub use marshal::Marshal;
pub use package::{Package, PackageBuilder};
