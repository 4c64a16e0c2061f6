//! Exact-size communication buffers with allocation accounting.
//!
//! A [`CommBuffer`] is allocated once its size is known and released exactly
//! once when it is dropped. Every allocation and release is recorded in the
//! [`BufferStats`] of the transport that produced it, which lets tests check
//! that a round neither leaks nor re-allocates storage.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared allocation counters for buffers handed out by one transport.
#[derive(Debug, Default)]
pub struct BufferStats {
    allocations: AtomicU64,
    releases: AtomicU64,
    bytes_allocated: AtomicU64,
}

impl BufferStats {
    /// Create a fresh set of counters.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Point-in-time copy of the counters.
    pub fn snapshot(&self) -> BufferSnapshot {
        BufferSnapshot {
            allocations: self.allocations.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            bytes_allocated: self.bytes_allocated.load(Ordering::Relaxed),
        }
    }
}

/// Copy of [`BufferStats`] at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferSnapshot {
    /// Buffers allocated so far.
    pub allocations: u64,
    /// Buffers released so far.
    pub releases: u64,
    /// Total bytes ever allocated.
    pub bytes_allocated: u64,
}

impl BufferSnapshot {
    /// Buffers currently alive.
    pub fn live(&self) -> u64 {
        self.allocations.saturating_sub(self.releases)
    }
}

/// Owned, exact-size byte buffer used as the body of one message.
///
/// The buffer is zero-initialised at allocation. Dropping it records the
/// release, so every exit path (including error propagation) frees it once.
///
/// # Examples
///
/// ```
/// use ghostline_core::{BufferStats, CommBuffer};
///
/// let stats = BufferStats::new();
/// {
///     let mut buf = CommBuffer::zeroed(16, &stats);
///     buf[0] = 0xAB;
///     assert_eq!(buf.len(), 16);
///     assert_eq!(stats.snapshot().live(), 1);
/// }
/// assert_eq!(stats.snapshot().live(), 0);
/// ```
#[derive(Debug)]
pub struct CommBuffer {
    data: Vec<u8>,
    stats: Arc<BufferStats>,
}

impl CommBuffer {
    /// Allocate `len` zeroed bytes, recording the allocation in `stats`.
    pub fn zeroed(len: usize, stats: &Arc<BufferStats>) -> Self {
        stats.allocations.fetch_add(1, Ordering::Relaxed);
        stats
            .bytes_allocated
            .fetch_add(len as u64, Ordering::Relaxed);
        Self {
            data: vec![0u8; len],
            stats: Arc::clone(stats),
        }
    }

    /// Allocate a buffer holding a copy of `bytes`.
    pub fn from_slice(bytes: &[u8], stats: &Arc<BufferStats>) -> Self {
        let mut buf = Self::zeroed(bytes.len(), stats);
        buf.data.copy_from_slice(bytes);
        buf
    }

    /// Shorten the visible length without releasing capacity.
    ///
    /// Has no effect if `len` is not smaller than the current length.
    pub fn truncate(&mut self, len: usize) {
        self.data.truncate(len);
    }

    /// Borrow the contents.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Borrow the contents mutably.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Deref for CommBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for CommBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Drop for CommBuffer {
    fn drop(&mut self) {
        self.stats.releases.fetch_add(1, Ordering::Relaxed);
    }
}
