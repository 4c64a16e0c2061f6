//! Size discovery by probing.
//!
//! Outbound messages are packed into exact-size buffers and sent on the data
//! tag. Inbound messages are not announced: `post` sweeps over the unresolved
//! ones, probing each peer, and as soon as a probe reports a pending message
//! it allocates a buffer of exactly the probed length and posts the receive.
//! The sweep repeats until every inbound message has a receive. This is an
//! active wait that burns CPU instead of paying a size round-trip, which pays
//! off when sizes change from round to round.

use ghostline_core::{RequestId, Tag, Transport};

use crate::config::Strategy;
use crate::error::{ExchangeError, ExchangeResult};
use crate::handle::{Handle, RoundReport};
use crate::invoice::Invoice;
use crate::marshal::Marshal;
use crate::package::Package;

use super::{abandon, claim, finish, release, ExchangeEngine};

/// Engine that probes for every inbound message size each round.
#[derive(Debug, Clone, Default)]
pub struct ProbingEngine {
    yield_between_sweeps: bool,
}

impl ProbingEngine {
    /// Create an engine that spins between probe sweeps.
    pub fn new() -> Self {
        Self::default()
    }

    /// Yield the thread between sweeps that leave messages unresolved.
    pub fn with_yield_between_sweeps(mut self, yield_between_sweeps: bool) -> Self {
        self.yield_between_sweeps = yield_between_sweeps;
        self
    }
}

/// Pack and send every outbound message.
fn send_all<T, M>(comm: &mut T, package: &mut Package<M>) -> ExchangeResult<()>
where
    T: Transport + ?Sized,
    M: Marshal,
{
    let rank = comm.rank();
    for invoice in &mut package.sends {
        let buffer = invoice.pack(comm);
        let len = buffer.len();
        let id = comm.isend(invoice.peer(), Tag::DATA, buffer)?;
        tracing::trace!(%rank, peer = %invoice.peer(), len, %id, "posted send");
        package.round.bytes_sent += len as u64;
        package.round.sends.push(id);
    }
    Ok(())
}

impl ProbingEngine {
    /// Probe until every slot of `resolved` holds a posted receive.
    fn sweep<T, M>(
        &self,
        comm: &mut T,
        recvs: &[Invoice<M>],
        resolved: &mut [Option<RequestId>],
        sweeps: &mut u64,
    ) -> ExchangeResult<()>
    where
        T: Transport + ?Sized,
    {
        let rank = comm.rank();
        let mut unresolved = resolved.iter().filter(|slot| slot.is_none()).count();
        while unresolved > 0 {
            *sweeps += 1;

            for (slot, invoice) in resolved.iter_mut().zip(recvs) {
                if slot.is_some() {
                    continue;
                }
                let Some(len) = comm.iprobe(invoice.peer(), Tag::DATA)? else {
                    continue;
                };

                let buffer = comm.allocate(len);
                let id = comm.irecv(invoice.peer(), Tag::DATA, buffer)?;
                tracing::trace!(%rank, peer = %invoice.peer(), len, %id, "probed and posted receive");
                *slot = Some(id);
                unresolved -= 1;
            }

            if unresolved > 0 && self.yield_between_sweeps {
                std::thread::yield_now();
            }
        }
        Ok(())
    }
}

impl ExchangeEngine for ProbingEngine {
    fn strategy(&self) -> Strategy {
        Strategy::Probing
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
        package.begin_round(Strategy::Probing)?;

        let mut resolved: Vec<Option<RequestId>> = vec![None; package.recvs.len()];
        let mut posted = send_all(comm, package);
        if posted.is_ok() {
            posted = self.sweep(
                comm,
                &package.recvs,
                &mut resolved,
                &mut package.round.probe_sweeps,
            );
        }
        package.round.recvs.extend(resolved.into_iter().flatten());
        if let Err(error) = posted {
            abandon(comm, package);
            return Err(error);
        }

        tracing::debug!(
            rank = %comm.rank(),
            sends = package.round.sends.len(),
            recvs = package.round.recvs.len(),
            bytes_sent = package.round.bytes_sent,
            sweeps = package.round.probe_sweeps,
            "probing round posted"
        );
        Ok(Handle::new(package, Strategy::Probing))
    }

    fn wait<T, M>(&self, comm: &mut T, handle: Handle<'_, M>) -> ExchangeResult<RoundReport>
    where
        T: Transport + ?Sized,
        M: Marshal,
    {
        let package = claim(comm, handle, Strategy::Probing)?;

        let round = &package.round;
        if let Err(error) = comm.wait_all(&[round.sends.as_slice(), round.recvs.as_slice()]) {
            abandon(comm, package);
            return Err(error.into());
        }

        let sends = std::mem::take(&mut package.round.sends);
        let recvs = std::mem::take(&mut package.round.recvs);
        let mut failure: Option<ExchangeError> = None;

        for id in sends {
            // releases the packed buffer
            if let Err(error) = comm.take(id) {
                release(comm, [id]);
                failure.get_or_insert(error.into());
            }
        }

        let mut bytes_received = 0u64;
        for (invoice, id) in package.recvs.iter_mut().zip(recvs) {
            let unpacked = match comm.take(id) {
                Ok(buffer) => {
                    bytes_received += buffer.len() as u64;
                    invoice.unpack(&buffer)
                }
                Err(error) => {
                    release(comm, [id]);
                    Err(error.into())
                }
            };
            if let Err(error) = unpacked {
                failure.get_or_insert(error);
            }
        }

        if let Some(error) = failure {
            package.abort_round();
            tracing::debug!(rank = %comm.rank(), %error, "probing round failed");
            return Err(error);
        }

        let report = finish(package, Strategy::Probing, bytes_received);
        tracing::debug!(
            rank = %comm.rank(),
            bytes_received,
            elapsed_us = report.elapsed.as_micros() as u64,
            "probing round complete"
        );
        Ok(report)
    }

    fn retire<T, M>(&self, _comm: &mut T, package: &mut Package<M>) -> ExchangeResult<()>
    where
        T: Transport + ?Sized,
    {
        // nothing survives a probing round
        package.ensure_idle(Strategy::Probing)
    }
}
