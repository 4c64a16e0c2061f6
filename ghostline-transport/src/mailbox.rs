//! Per-rank queues of arrived, unclaimed messages.
//!
//! Every rank owns one [`Mailbox`]. Producers (peer ranks in the same
//! process, or TCP reader tasks) push payloads into it; the owning
//! [`Communicator`](crate::Communicator) is the single consumer and matches
//! them against posted receives, probes and blocking receives.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::{Rank, Tag};

/// Arrival queues for one rank, guarded for cross-thread delivery.
#[derive(Debug, Default)]
pub struct Mailbox {
    inbox: Mutex<Inbox>,
    arrived: Condvar,
}

/// Mailbox contents visible while the lock is held.
#[derive(Debug, Default)]
pub struct Inbox {
    /// Messages per (source, tag), oldest first.
    queues: HashMap<(Rank, Tag), VecDeque<Vec<u8>>>,
    /// Peers that will never deliver again.
    disconnected: HashSet<Rank>,
    /// Peers whose connection failed, with the reason.
    failed: HashMap<Rank, String>,
}

impl Mailbox {
    /// Create an empty mailbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message from `source` and wake the consumer.
    pub fn deliver(&self, source: Rank, tag: Tag, payload: Vec<u8>) {
        let mut inbox = self.lock();
        inbox
            .queues
            .entry((source, tag))
            .or_default()
            .push_back(payload);
        drop(inbox);
        self.arrived.notify_all();
    }

    /// Record that `source` closed its side cleanly.
    pub fn disconnect(&self, source: Rank) {
        self.lock().disconnected.insert(source);
        self.arrived.notify_all();
    }

    /// Record that the connection to `source` failed.
    pub fn fail(&self, source: Rank, reason: impl Into<String>) {
        let mut inbox = self.lock();
        inbox.disconnected.insert(source);
        inbox.failed.insert(source, reason.into());
        drop(inbox);
        self.arrived.notify_all();
    }

    /// Lock the mailbox.
    ///
    /// A producer that panicked while holding the lock cannot leave a queue
    /// half-updated, so poisoning is ignored.
    pub fn lock(&self) -> MutexGuard<'_, Inbox> {
        self.inbox.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Release the lock until the next delivery or disconnect.
    pub fn wait<'a>(&self, guard: MutexGuard<'a, Inbox>) -> MutexGuard<'a, Inbox> {
        self.arrived
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Inbox {
    /// Remove the oldest message from `source` with `tag`.
    pub fn pop(&mut self, source: Rank, tag: Tag) -> Option<Vec<u8>> {
        let queue = self.queues.get_mut(&(source, tag))?;
        let message = queue.pop_front();
        if queue.is_empty() {
            self.queues.remove(&(source, tag));
        }
        message
    }

    /// Length of the oldest message from `source` with `tag`.
    pub fn peek_len(&self, source: Rank, tag: Tag) -> Option<usize> {
        self.queues
            .get(&(source, tag))
            .and_then(|queue| queue.front())
            .map(Vec::len)
    }

    /// Whether `source` will never deliver again.
    pub fn is_disconnected(&self, source: Rank) -> bool {
        self.disconnected.contains(&source)
    }

    /// Failure reason recorded for `source`, if its connection broke.
    pub fn failure(&self, source: Rank) -> Option<&str> {
        self.failed.get(&source).map(String::as_str)
    }

    /// Number of queued messages across all sources and tags.
    pub fn queued(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }
}
