//! Completion handles and round reports.

use std::time::Duration;

use serde::Serialize;

use crate::config::Strategy;
use crate::package::Package;

/// A posted round that has not been awaited yet.
///
/// The handle holds the exclusive borrow of its package, so the package can
/// be neither reposted nor read until the handle is passed to
/// [`ExchangeEngine::wait`](crate::ExchangeEngine::wait). Dropping a handle
/// leaves the round unfinished: the package then refuses further posts with
/// [`ExchangeError::RoundInFlight`](crate::ExchangeError::RoundInFlight).
#[must_use = "a posted round must be awaited with `wait`"]
#[derive(Debug)]
pub struct Handle<'p, M> {
    pub(crate) package: &'p mut Package<M>,
    pub(crate) strategy: Strategy,
}

impl<'p, M> Handle<'p, M> {
    pub(crate) fn new(package: &'p mut Package<M>, strategy: Strategy) -> Self {
        Self { package, strategy }
    }

    /// Strategy of the engine that posted this round.
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Requests issued for this round: one per outbound plus one per inbound
    /// message.
    pub fn outstanding(&self) -> usize {
        self.package.round.sends.len() + self.package.round.recvs.len()
    }
}

/// Summary of one completed round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundReport {
    /// Strategy that ran the round.
    pub strategy: Strategy,
    /// Outbound messages sent.
    pub sends: usize,
    /// Inbound messages received.
    pub recvs: usize,
    /// Payload bytes packed and sent.
    pub bytes_sent: u64,
    /// Payload bytes received and unpacked.
    pub bytes_received: u64,
    /// Probe sweeps needed to resolve every inbound size.
    /// Always zero for the persistent strategy.
    pub probe_sweeps: u64,
    /// Whether sizes were negotiated during this round.
    pub negotiated: bool,
    /// Time from post to the end of wait.
    pub elapsed: Duration,
}
