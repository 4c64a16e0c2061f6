//! # ghostline-core
//!
//! Core abstractions shared by the ghostline transports and exchange engine.
//!
//! - **Addressing**: [`Rank`], [`Tag`], [`RequestId`]
//! - **Buffers**: [`CommBuffer`], an exact-size byte buffer whose allocation
//!   and release are counted in [`BufferStats`]
//! - **Transport contract**: the [`Transport`] trait every point-to-point
//!   backend implements (non-blocking send/receive, probe, persistent
//!   requests, joint wait)
//!
//! ## Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              ghostline                                      │
//! │   Package / Invoice / Handle, Probing + Persistent engines  │
//! ├─────────────────────────────────────────────────────────────┤
//! │              ghostline-transport                            │
//! │   Communicator, LocalCluster, TcpTransport, wire format     │
//! ├─────────────────────────────────────────────────────────────┤
//! │              ghostline-core (this crate)                    │
//! │   Rank, Tag, RequestId, CommBuffer, Transport trait         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

mod buffer;
mod error;
mod metrics;
mod transport;
mod types;

pub use buffer::{BufferSnapshot, BufferStats, CommBuffer};
pub use error::{TransportError, TransportResult};
pub use metrics::TransportMetrics;
pub use transport::Transport;
pub use types::{Rank, RankParseError, RequestId, Tag};
