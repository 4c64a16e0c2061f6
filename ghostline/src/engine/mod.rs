//! Exchange engines.
//!
//! Both strategies run the same two-phase round over a [`Transport`]:
//!
//! ```text
//!   post(package) ─► Handle ──(caller computes)──► wait(handle) ─► RoundReport
//!      │                                              │
//!      ├ pack + send every outbound message           ├ joint wait on sends and recvs
//!      └ get a receive going for every inbound one    └ unpack every inbound message
//! ```
//!
//! They differ in how an inbound message's size is learned:
//! [`ProbingEngine`] probes for it every round, [`PersistentEngine`]
//! negotiates it once and then reuses bound requests.

mod persistent;
mod probing;

pub use persistent::PersistentEngine;
pub use probing::ProbingEngine;

use ghostline_core::{RequestId, Transport};

use crate::config::{ExchangeConfig, Strategy};
use crate::error::{ExchangeError, ExchangeResult};
use crate::handle::{Handle, RoundReport};
use crate::marshal::Marshal;
use crate::package::Package;

/// A halo-exchange strategy.
///
/// `comm` is the communication context of the calling rank. Every rank
/// listed in a package must post matching rounds with the same strategy.
pub trait ExchangeEngine {
    /// Which strategy this engine implements.
    fn strategy(&self) -> Strategy;

    /// Issue one round: pack and send every outbound message and arrange a
    /// receive for every inbound message.
    fn post<'p, T, M>(
        &self,
        comm: &mut T,
        package: &'p mut Package<M>,
    ) -> ExchangeResult<Handle<'p, M>>
    where
        T: Transport + ?Sized,
        M: Marshal;

    /// Block until every request of the round completes, then unpack every
    /// inbound message.
    fn wait<T, M>(&self, comm: &mut T, handle: Handle<'_, M>) -> ExchangeResult<RoundReport>
    where
        T: Transport + ?Sized,
        M: Marshal;

    /// Post a round and wait for it immediately.
    fn exchange<T, M>(&self, comm: &mut T, package: &mut Package<M>) -> ExchangeResult<RoundReport>
    where
        T: Transport + ?Sized,
        M: Marshal,
    {
        let handle = self.post(comm, package)?;
        self.wait(comm, handle)
    }

    /// Release whatever transport resources the package still holds.
    ///
    /// Must be called before dropping a package the persistent strategy has
    /// bound. The package may be posted again afterwards; the persistent
    /// strategy then negotiates sizes afresh.
    fn retire<T, M>(&self, comm: &mut T, package: &mut Package<M>) -> ExchangeResult<()>
    where
        T: Transport + ?Sized;
}

/// Take the package back from `handle`.
///
/// A handle posted by another strategy cannot be awaited here; its round is
/// abandoned instead.
fn claim<'p, T, M>(
    comm: &mut T,
    handle: Handle<'p, M>,
    engine: Strategy,
) -> ExchangeResult<&'p mut Package<M>>
where
    T: Transport + ?Sized,
{
    let package = handle.package;
    if handle.strategy != engine {
        abandon(comm, package);
        return Err(ExchangeError::StrategyMismatch {
            bound: handle.strategy,
            engine,
        });
    }
    Ok(package)
}

/// Withdraw every request a failed round left with the transport, including
/// a persistent binding, and mark the package idle.
fn abandon<T, M>(comm: &mut T, package: &mut Package<M>)
where
    T: Transport + ?Sized,
{
    // the round lists of a bound package are copies of the binding
    let ids: Vec<RequestId> = match package.binding.take() {
        Some(binding) => binding.sends.into_iter().chain(binding.recvs).collect(),
        None => package
            .round
            .sends
            .iter()
            .chain(&package.round.recvs)
            .copied()
            .collect(),
    };
    release(comm, ids);
    package.abort_round();
    tracing::debug!(rank = %comm.rank(), "round abandoned");
}

/// Cancel `ids`, ignoring ones the transport no longer knows.
fn release<T, I>(comm: &mut T, ids: I)
where
    T: Transport + ?Sized,
    I: IntoIterator<Item = RequestId>,
{
    for id in ids {
        if let Err(error) = comm.cancel(id) {
            tracing::debug!(%id, %error, "request already released");
        }
    }
}

/// Close the round and summarize it.
fn finish<M>(package: &mut Package<M>, strategy: Strategy, bytes_received: u64) -> RoundReport {
    package.finish_round();
    let round = &package.round;
    RoundReport {
        strategy,
        sends: package.sends.len(),
        recvs: package.recvs.len(),
        bytes_sent: round.bytes_sent,
        bytes_received,
        probe_sweeps: round.probe_sweeps,
        negotiated: round.negotiated,
        elapsed: round.started.map(|t| t.elapsed()).unwrap_or_default(),
    }
}

/// Engine selected by configuration at startup.
///
/// # Examples
///
/// ```
/// use ghostline::{Engine, ExchangeConfig, ExchangeEngine, LocalCluster, Package, Rank, Strategy};
///
/// let engine = Engine::from_config(&ExchangeConfig::persistent());
/// assert_eq!(engine.strategy(), Strategy::Persistent);
///
/// // A single rank exchanging with itself.
/// let mut comm = LocalCluster::new(1).into_endpoints().remove(0);
/// let me = Rank::new(0);
/// let mut package = Package::new(vec![(me, b"halo".to_vec())], vec![(me, Vec::new())]);
///
/// let handle = engine.post(&mut comm, &mut package).expect("post");
/// assert_eq!(handle.outstanding(), 2);
/// let report = engine.wait(&mut comm, handle).expect("wait");
///
/// assert_eq!(report.bytes_received, 4);
/// assert_eq!(package.recv(0).expect("recv").body(), b"halo");
/// engine.retire(&mut comm, &mut package).expect("retire");
/// ```
#[derive(Debug, Clone)]
pub enum Engine {
    /// Probe for sizes every round.
    Probing(ProbingEngine),
    /// Negotiate sizes once, restart bound requests every round.
    Persistent(PersistentEngine),
}

impl Engine {
    /// Build the engine `config` asks for.
    pub fn from_config(config: &ExchangeConfig) -> Self {
        let engine = match config.strategy {
            Strategy::Probing => Engine::Probing(
                ProbingEngine::new().with_yield_between_sweeps(config.yield_between_sweeps),
            ),
            Strategy::Persistent => Engine::Persistent(PersistentEngine::new()),
        };
        tracing::debug!(strategy = %engine.strategy(), "exchange engine selected");
        engine
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::from_config(&ExchangeConfig::default())
    }
}

impl ExchangeEngine for Engine {
    fn strategy(&self) -> Strategy {
        match self {
            Engine::Probing(engine) => engine.strategy(),
            Engine::Persistent(engine) => engine.strategy(),
        }
    }

    fn post<'p, T, M>(
        &self,
        comm: &mut T,
        package: &'p mut Package<M>,
    ) -> ExchangeResult<Handle<'p, M>>
    where
        T: Transport + ?Sized,
        M: Marshal,
    {
        match self {
            Engine::Probing(engine) => engine.post(comm, package),
            Engine::Persistent(engine) => engine.post(comm, package),
        }
    }

    fn wait<T, M>(&self, comm: &mut T, handle: Handle<'_, M>) -> ExchangeResult<RoundReport>
    where
        T: Transport + ?Sized,
        M: Marshal,
    {
        match self {
            Engine::Probing(engine) => engine.wait(comm, handle),
            Engine::Persistent(engine) => engine.wait(comm, handle),
        }
    }

    fn retire<T, M>(&self, comm: &mut T, package: &mut Package<M>) -> ExchangeResult<()>
    where
        T: Transport + ?Sized,
    {
        match self {
            Engine::Probing(engine) => engine.retire(comm, package),
            Engine::Persistent(engine) => engine.retire(comm, package),
        }
    }
}
