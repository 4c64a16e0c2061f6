//! # ghostline transports
//!
//! Point-to-point transports implementing [`ghostline_core::Transport`].
//!
//! This crate provides:
//! - **Communicator**: request bookkeeping and message matching shared by
//!   every backend, generic over the [`Link`] that moves bytes to a peer
//! - **Local**: ranks living in one process ([`LocalCluster`]), one thread
//!   per rank
//! - **TCP**: a full mesh of TCP connections driven by a private tokio
//!   runtime ([`TcpTransport`])
//! - **Wire format**: framed packets with CRC32C checksums

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

// Re-export core types for convenience
pub use ghostline_core::{
    BufferSnapshot, BufferStats, CommBuffer, Rank, RequestId, Tag, Transport, TransportError,
    TransportMetrics, TransportResult,
};

// =============================================================================
// Modules
// =============================================================================

/// Request bookkeeping and matching over a [`Link`].
pub mod communicator;

/// In-process transport for ranks sharing an address space.
pub mod local;

/// Per-rank queues of arrived, unclaimed messages.
pub mod mailbox;

/// TCP mesh transport.
pub mod tcp;

/// Framed wire format with CRC32C checksums.
pub mod wire;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use communicator::{Communicator, Link};
pub use local::{LocalCluster, LocalLink, LocalTransport};
pub use mailbox::Mailbox;
pub use tcp::{TcpConfig, TcpLink, TcpTransport};
pub use wire::{encode_frame, FrameHeader, WireError, HEADER_SIZE, MAX_PAYLOAD_SIZE};
