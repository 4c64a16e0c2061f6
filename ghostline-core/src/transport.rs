//! The point-to-point transport contract.
//!
//! The exchange engines are written against this trait only. Implementations
//! live in `ghostline-transport` (in-process ranks and a TCP mesh); a binding
//! to a system MPI library would implement the same operations.
//!
//! # Request lifecycle
//!
//! ```text
//!  isend/irecv ──► Active ──► Complete ──take()──► retired
//!
//!  send_init/recv_init ──► Inactive ──start_all()──► Active ──► Complete
//!                             ▲                                   │
//!                             └──────────── wait_all() ───────────┘
//!                             │
//!                           free()
//! ```
//!
//! [`Transport::cancel`] retires a request from any state. A receive that
//! has not matched yet is withdrawn without consuming a message.
//!
//! Buffers move into the transport when a request is created and come back
//! out through [`Transport::take`] (non-persistent) or stay bound to the
//! request until [`Transport::free`] (persistent).

use std::sync::Arc;

use crate::{BufferStats, CommBuffer, Rank, RequestId, Tag, TransportMetrics, TransportResult};

/// Point-to-point messaging between the ranks of a fixed group.
///
/// Messages sent from one rank to another with the same tag are delivered
/// in order. A posted receive claims the oldest matching message; probes
/// only see messages no posted receive has claimed.
pub trait Transport {
    /// Rank of this endpoint.
    fn rank(&self) -> Rank;

    /// Number of ranks in the group.
    fn size(&self) -> usize;

    /// Counters for buffers allocated through [`Transport::allocate`].
    fn buffer_stats(&self) -> &Arc<BufferStats>;

    /// Allocate an exact-size zeroed buffer.
    fn allocate(&self, len: usize) -> CommBuffer {
        CommBuffer::zeroed(len, self.buffer_stats())
    }

    /// Post a non-blocking send of the whole buffer.
    fn isend(&mut self, peer: Rank, tag: Tag, buffer: CommBuffer) -> TransportResult<RequestId>;

    /// Post a non-blocking receive of at most `buffer.len()` bytes.
    fn irecv(&mut self, peer: Rank, tag: Tag, buffer: CommBuffer) -> TransportResult<RequestId>;

    /// Check for a pending message without receiving it.
    ///
    /// Returns its length in bytes if one is waiting.
    fn iprobe(&mut self, peer: Rank, tag: Tag) -> TransportResult<Option<usize>>;

    /// Send `bytes` and return once the transport no longer needs them.
    fn send(&mut self, peer: Rank, tag: Tag, bytes: &[u8]) -> TransportResult<()>;

    /// Block until a message from `peer` with `tag` arrives.
    fn recv(&mut self, peer: Rank, tag: Tag) -> TransportResult<Vec<u8>>;

    /// Block until every request in every group has completed.
    ///
    /// Completed persistent requests become inactive again.
    fn wait_all(&mut self, groups: &[&[RequestId]]) -> TransportResult<()>;

    /// Retire a completed non-persistent request and return its buffer.
    ///
    /// For receives the buffer is truncated to the received length.
    fn take(&mut self, request: RequestId) -> TransportResult<CommBuffer>;

    /// Create an inactive persistent send bound to `buffer`.
    fn send_init(&mut self, peer: Rank, tag: Tag, buffer: CommBuffer)
        -> TransportResult<RequestId>;

    /// Create an inactive persistent receive bound to `buffer`.
    fn recv_init(&mut self, peer: Rank, tag: Tag, buffer: CommBuffer)
        -> TransportResult<RequestId>;

    /// Activate persistent requests for one more transfer each.
    fn start_all(&mut self, requests: &[RequestId]) -> TransportResult<()>;

    /// Mutable access to the buffer bound to an inactive persistent request.
    fn buffer_mut(&mut self, request: RequestId) -> TransportResult<&mut CommBuffer>;

    /// Bytes delivered by the last completed transfer of a persistent receive.
    fn received(&self, request: RequestId) -> TransportResult<&[u8]>;

    /// Release an inactive persistent request together with its buffer.
    fn free(&mut self, request: RequestId) -> TransportResult<()>;

    /// Withdraw a request in any state and release its buffer.
    ///
    /// A posted receive that has not matched is removed before it can
    /// consume a message, so a message still on its way stays queued for a
    /// later receive or probe. Used to clean up after a failed round.
    fn cancel(&mut self, request: RequestId) -> TransportResult<()>;

    /// Requests posted or started and not yet waited on or retired.
    fn outstanding(&self) -> usize;

    /// Operation counters.
    fn metrics(&self) -> TransportMetrics;
}
