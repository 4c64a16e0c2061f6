//! Size negotiation once, persistent requests afterwards.
//!
//! The first post of a package runs a handshake on the control tag:
//!
//! ```text
//!   for each send:  pack ─► isend(size as u64 LE, CONTROL)
//!   for each recv:  recv(CONTROL) ─► allocate(size) ─► recv_init(DATA)
//!   wait on the size sends ─► send_init(packed buffer, DATA) for each send
//! ```
//!
//! The requests created there stay bound to the package. Every post,
//! including the first, starts all receives and then all sends; every wait
//! unpacks straight out of the bound receive buffers, which are reused in
//! place by the next round. Message sizes must not change while the package
//! is bound; a body that packs to a different size fails the post with
//! [`ExchangeError::SizeChanged`]. [`ExchangeEngine::retire`] frees the
//! requests.

use ghostline_core::{CommBuffer, Rank, RequestId, Tag, Transport};
use ghostline_transport::MAX_PAYLOAD_SIZE;

use crate::config::Strategy;
use crate::error::{ExchangeError, ExchangeResult};
use crate::handle::{Handle, RoundReport};
use crate::marshal::Marshal;
use crate::package::{Binding, Package};

use super::{abandon, claim, finish, release, ExchangeEngine};

/// Engine that negotiates sizes once and restarts bound requests each round.
#[derive(Debug, Clone, Default)]
pub struct PersistentEngine;

impl PersistentEngine {
    /// Create the engine.
    pub fn new() -> Self {
        Self
    }
}

/// Decode a size announcement.
fn announced_len(peer: Rank, bytes: &[u8]) -> ExchangeResult<usize> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| ExchangeError::MalformedSizeAnnouncement {
            peer,
            len: bytes.len(),
        })?;
    let size = u64::from_le_bytes(raw);
    match usize::try_from(size) {
        Ok(len) if len <= MAX_PAYLOAD_SIZE => Ok(len),
        _ => Err(ExchangeError::OversizedAnnouncement {
            peer,
            size,
            limit: MAX_PAYLOAD_SIZE,
        }),
    }
}

/// Exchange sizes with every peer of the package and bind its requests.
///
/// On failure every request created here is cancelled again.
fn negotiate<T, M>(comm: &mut T, package: &mut Package<M>) -> ExchangeResult<Binding>
where
    T: Transport + ?Sized,
    M: Marshal,
{
    let mut announcements = Vec::with_capacity(package.sends.len());
    let mut binding = Binding::default();
    match bind(comm, package, &mut announcements, &mut binding) {
        Ok(()) => Ok(binding),
        Err(error) => {
            release(
                comm,
                announcements
                    .into_iter()
                    .chain(binding.sends)
                    .chain(binding.recvs),
            );
            Err(error)
        }
    }
}

fn bind<T, M>(
    comm: &mut T,
    package: &mut Package<M>,
    announcements: &mut Vec<RequestId>,
    binding: &mut Binding,
) -> ExchangeResult<()>
where
    T: Transport + ?Sized,
    M: Marshal,
{
    let rank = comm.rank();
    let mut packed = Vec::with_capacity(package.sends.len());

    for invoice in &mut package.sends {
        let buffer = invoice.pack(comm);
        let size = (buffer.len() as u64).to_le_bytes();
        let announcement = CommBuffer::from_slice(&size, comm.buffer_stats());
        announcements.push(comm.isend(invoice.peer(), Tag::CONTROL, announcement)?);
        package.round.bytes_sent += buffer.len() as u64;
        packed.push(buffer);
    }

    for invoice in &package.recvs {
        let bytes = comm.recv(invoice.peer(), Tag::CONTROL)?;
        let len = announced_len(invoice.peer(), &bytes)?;
        tracing::trace!(%rank, peer = %invoice.peer(), len, "size announced");
        let buffer = comm.allocate(len);
        binding
            .recvs
            .push(comm.recv_init(invoice.peer(), Tag::DATA, buffer)?);
    }

    comm.wait_all(&[announcements.as_slice()])?;
    while let Some(&id) = announcements.last() {
        drop(comm.take(id)?);
        announcements.pop();
    }

    for (invoice, buffer) in package.sends.iter().zip(packed) {
        binding
            .sends
            .push(comm.send_init(invoice.peer(), Tag::DATA, buffer)?);
    }

    tracing::info!(
        %rank,
        sends = binding.sends.len(),
        recvs = binding.recvs.len(),
        bytes_out = package.round.bytes_sent,
        "persistent sizes negotiated"
    );
    Ok(())
}

/// Refresh the bound send buffers from the package bodies.
///
/// Starts nothing, so a failure leaves the binding usable.
fn repack<T, M>(comm: &mut T, package: &mut Package<M>) -> ExchangeResult<()>
where
    T: Transport + ?Sized,
    M: Marshal,
{
    let Some(binding) = &package.binding else {
        return Ok(());
    };
    for (invoice, &id) in package.sends.iter_mut().zip(&binding.sends) {
        let buffer = comm.buffer_mut(id)?;
        invoice.repack(buffer)?;
        package.round.bytes_sent += buffer.len() as u64;
    }
    Ok(())
}

/// Negotiate if the package is unbound, then start every bound request.
fn start<T, M>(comm: &mut T, package: &mut Package<M>) -> ExchangeResult<()>
where
    T: Transport + ?Sized,
    M: Marshal,
{
    let binding = match package.binding.take() {
        Some(binding) => binding,
        None => {
            package.round.negotiated = true;
            negotiate(comm, package)?
        }
    };
    let binding = package.binding.insert(binding);
    package.round.sends.clone_from(&binding.sends);
    package.round.recvs.clone_from(&binding.recvs);

    comm.start_all(&binding.recvs)?;
    comm.start_all(&binding.sends)?;
    Ok(())
}

impl ExchangeEngine for PersistentEngine {
    fn strategy(&self) -> Strategy {
        Strategy::Persistent
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
        package.begin_round(Strategy::Persistent)?;

        if let Err(error) = repack(comm, package) {
            package.abort_round();
            return Err(error);
        }
        if let Err(error) = start(comm, package) {
            abandon(comm, package);
            return Err(error);
        }

        tracing::debug!(
            rank = %comm.rank(),
            sends = package.round.sends.len(),
            recvs = package.round.recvs.len(),
            bytes_sent = package.round.bytes_sent,
            negotiated = package.round.negotiated,
            "persistent round started"
        );
        Ok(Handle::new(package, Strategy::Persistent))
    }

    fn wait<T, M>(&self, comm: &mut T, handle: Handle<'_, M>) -> ExchangeResult<RoundReport>
    where
        T: Transport + ?Sized,
        M: Marshal,
    {
        let package = claim(comm, handle, Strategy::Persistent)?;

        let round = &package.round;
        if let Err(error) = comm.wait_all(&[round.sends.as_slice(), round.recvs.as_slice()]) {
            abandon(comm, package);
            return Err(error.into());
        }

        // every bound request is inactive again, so a failed unpack keeps the
        // binding usable
        let mut failure: Option<ExchangeError> = None;
        let mut bytes_received = 0u64;
        for (invoice, &id) in package.recvs.iter_mut().zip(&package.round.recvs) {
            let unpacked = comm
                .received(id)
                .map_err(ExchangeError::from)
                .and_then(|bytes| {
                    bytes_received += bytes.len() as u64;
                    invoice.unpack(bytes)
                });
            if let Err(error) = unpacked {
                failure.get_or_insert(error);
            }
        }

        if let Some(error) = failure {
            package.abort_round();
            tracing::debug!(rank = %comm.rank(), %error, "persistent round failed");
            return Err(error);
        }

        let report = finish(package, Strategy::Persistent, bytes_received);
        tracing::debug!(
            rank = %comm.rank(),
            bytes_received,
            elapsed_us = report.elapsed.as_micros() as u64,
            "persistent round complete"
        );
        Ok(report)
    }

    fn retire<T, M>(&self, comm: &mut T, package: &mut Package<M>) -> ExchangeResult<()>
    where
        T: Transport + ?Sized,
    {
        package.ensure_idle(Strategy::Persistent)?;
        if package.is_bound() {
            tracing::debug!(rank = %comm.rank(), "releasing persistent requests");
        }
        package.unbind(comm)?;
        Ok(())
    }
}
