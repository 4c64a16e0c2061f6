//! The fixed set of messages exchanged with a rank's neighbors.
//!
//! A [`Package`] is built once per decomposition and reused every round. Its
//! topology (how many messages, to and from which ranks) never changes after
//! construction; only the message bodies do.
//!
//! ```text
//!            Package
//!  ┌──────────────────────────┐
//!  │ sends: [Invoice → r1]    │──post──► requests of the round ──wait──► unpacked recvs
//!  │        [Invoice → r3]    │
//!  │ recvs: [Invoice ← r1]    │   persistent strategy only:
//!  │        [Invoice ← r3]    │   binding = requests kept across rounds
//!  └──────────────────────────┘
//! ```

use std::time::Instant;

use ghostline_core::{Rank, RequestId, Transport, TransportResult};

use crate::config::Strategy;
use crate::error::{ExchangeError, ExchangeResult};
use crate::invoice::{Direction, Invoice};

/// Outbound and inbound messages bound to fixed neighbor ranks.
///
/// # Examples
///
/// ```
/// use ghostline::{Package, Rank};
///
/// let package = Package::builder()
///     .send(Rank::new(1), vec![0u8; 100])
///     .recv(Rank::new(1), Vec::<u8>::new())
///     .build();
///
/// assert_eq!(package.send_count(), 1);
/// assert_eq!(package.src_ranks(), &[Rank::new(1)]);
/// assert!(!package.is_bound());
/// ```
#[derive(Debug)]
pub struct Package<M> {
    pub(crate) sends: Vec<Invoice<M>>,
    pub(crate) recvs: Vec<Invoice<M>>,
    dest_ranks: Vec<Rank>,
    src_ranks: Vec<Rank>,
    pub(crate) round: Round,
    pub(crate) binding: Option<Binding>,
    rounds_completed: u64,
}

/// Request tokens and accounting of the round in flight.
#[derive(Debug, Default)]
pub(crate) struct Round {
    pub(crate) in_flight: bool,
    pub(crate) sends: Vec<RequestId>,
    pub(crate) recvs: Vec<RequestId>,
    pub(crate) bytes_sent: u64,
    pub(crate) probe_sweeps: u64,
    pub(crate) negotiated: bool,
    pub(crate) started: Option<Instant>,
}

/// Persistent requests created by size negotiation, in invoice order.
#[derive(Debug, Default)]
pub(crate) struct Binding {
    pub(crate) sends: Vec<RequestId>,
    pub(crate) recvs: Vec<RequestId>,
}

impl<M> Package<M> {
    /// Create a package from `(peer, body)` pairs.
    pub fn new(sends: Vec<(Rank, M)>, recvs: Vec<(Rank, M)>) -> Self {
        let dest_ranks = sends.iter().map(|(peer, _)| *peer).collect();
        let src_ranks = recvs.iter().map(|(peer, _)| *peer).collect();

        Self {
            sends: invoices(sends, Direction::Outbound),
            recvs: invoices(recvs, Direction::Inbound),
            dest_ranks,
            src_ranks,
            round: Round::default(),
            binding: None,
            rounds_completed: 0,
        }
    }

    /// Start building a package one message at a time.
    pub fn builder() -> PackageBuilder<M> {
        PackageBuilder {
            sends: Vec::new(),
            recvs: Vec::new(),
        }
    }

    /// Number of outbound messages.
    pub fn send_count(&self) -> usize {
        self.sends.len()
    }

    /// Number of inbound messages.
    pub fn recv_count(&self) -> usize {
        self.recvs.len()
    }

    /// Destination rank of every outbound message, in order.
    pub fn dest_ranks(&self) -> &[Rank] {
        &self.dest_ranks
    }

    /// Source rank of every inbound message, in order.
    pub fn src_ranks(&self) -> &[Rank] {
        &self.src_ranks
    }

    /// Outbound message `index`.
    pub fn send(&self, index: usize) -> Option<&Invoice<M>> {
        self.sends.get(index)
    }

    /// Body of outbound message `index`, to refill before the next round.
    pub fn send_mut(&mut self, index: usize) -> Option<&mut M> {
        self.sends.get_mut(index).map(Invoice::body_mut)
    }

    /// Inbound message `index`.
    pub fn recv(&self, index: usize) -> Option<&Invoice<M>> {
        self.recvs.get(index)
    }

    /// Body of inbound message `index`.
    pub fn recv_mut(&mut self, index: usize) -> Option<&mut M> {
        self.recvs.get_mut(index).map(Invoice::body_mut)
    }

    /// All outbound messages.
    pub fn sends(&self) -> &[Invoice<M>] {
        &self.sends
    }

    /// All inbound messages.
    pub fn recvs(&self) -> &[Invoice<M>] {
        &self.recvs
    }

    /// Rounds posted and awaited so far.
    pub fn rounds_completed(&self) -> u64 {
        self.rounds_completed
    }

    /// Whether persistent requests are bound to this package.
    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    /// Fail unless no round is in flight and `strategy` may use the package.
    pub(crate) fn ensure_idle(&self, strategy: Strategy) -> ExchangeResult<()> {
        if self.round.in_flight {
            return Err(ExchangeError::RoundInFlight);
        }
        if self.is_bound() && strategy != Strategy::Persistent {
            return Err(ExchangeError::StrategyMismatch {
                bound: Strategy::Persistent,
                engine: strategy,
            });
        }
        Ok(())
    }

    /// Mark a new round in flight for `strategy`.
    pub(crate) fn begin_round(&mut self, strategy: Strategy) -> ExchangeResult<()> {
        self.ensure_idle(strategy)?;

        self.round.in_flight = true;
        self.round.sends.clear();
        self.round.recvs.clear();
        self.round.bytes_sent = 0;
        self.round.probe_sweeps = 0;
        self.round.negotiated = false;
        self.round.started = Some(Instant::now());
        Ok(())
    }

    /// Close the round in flight.
    pub(crate) fn finish_round(&mut self) {
        self.round.in_flight = false;
        self.rounds_completed += 1;
    }

    /// Close a round that failed without counting it.
    pub(crate) fn abort_round(&mut self) {
        self.round.in_flight = false;
        self.round.sends.clear();
        self.round.recvs.clear();
    }

    /// Free the persistent requests bound to this package, if any.
    pub(crate) fn unbind<T: Transport + ?Sized>(&mut self, comm: &mut T) -> TransportResult<()> {
        let Some(binding) = self.binding.take() else {
            return Ok(());
        };
        for &id in binding.sends.iter().chain(&binding.recvs) {
            comm.free(id)?;
        }
        self.round.sends.clear();
        self.round.recvs.clear();
        Ok(())
    }
}

fn invoices<M>(pairs: Vec<(Rank, M)>, direction: Direction) -> Vec<Invoice<M>> {
    pairs
        .into_iter()
        .map(|(peer, body)| Invoice::new(peer, direction, body))
        .collect()
}

/// Builder returned by [`Package::builder`].
#[derive(Debug)]
pub struct PackageBuilder<M> {
    sends: Vec<(Rank, M)>,
    recvs: Vec<(Rank, M)>,
}

impl<M> PackageBuilder<M> {
    /// Add an outbound message to `peer`.
    pub fn send(mut self, peer: Rank, body: M) -> Self {
        self.sends.push((peer, body));
        self
    }

    /// Add an inbound message from `peer`.
    pub fn recv(mut self, peer: Rank, body: M) -> Self {
        self.recvs.push((peer, body));
        self
    }

    /// Finish the package.
    pub fn build(self) -> Package<M> {
        Package::new(self.sends, self.recvs)
    }
}
