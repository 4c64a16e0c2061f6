//! One message of a package, bound to one peer.

use ghostline_core::{CommBuffer, Rank, Transport};

use crate::error::{ExchangeError, ExchangeResult};
use crate::marshal::Marshal;

/// Which way an [`Invoice`] travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Packed here and sent to the peer.
    Outbound,
    /// Received from the peer and unpacked here.
    Inbound,
}

/// A message descriptor: a body bound to a peer and a direction.
///
/// The byte buffer carrying the body does not live here. It is allocated
/// once its size is known (when packing outbound, when probed or negotiated
/// inbound), owned by the transport while the round is in flight, and
/// released exactly once by drop.
#[derive(Debug)]
pub struct Invoice<M> {
    peer: Rank,
    direction: Direction,
    body: M,
    len: Option<usize>,
}

impl<M> Invoice<M> {
    pub(crate) fn new(peer: Rank, direction: Direction, body: M) -> Self {
        Self {
            peer,
            direction,
            body,
            len: None,
        }
    }

    /// Remote rank.
    pub fn peer(&self) -> Rank {
        self.peer
    }

    /// Outbound or inbound.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// The message body.
    pub fn body(&self) -> &M {
        &self.body
    }

    /// Byte length of the last packed or received payload.
    ///
    /// `None` until the first round has packed (outbound) or delivered
    /// (inbound) this message.
    pub fn byte_len(&self) -> Option<usize> {
        self.len
    }

    pub(crate) fn body_mut(&mut self) -> &mut M {
        &mut self.body
    }
}

impl<M: Marshal> Invoice<M> {
    /// Allocate an exact-size buffer from `comm` and pack the body into it.
    pub(crate) fn pack<T: Transport + ?Sized>(&mut self, comm: &T) -> CommBuffer {
        let mut buffer = comm.allocate(self.body.packed_len());
        self.body.pack(&mut buffer);
        self.len = Some(buffer.len());
        buffer
    }

    /// Pack into a buffer that already has the negotiated size.
    ///
    /// Leaves `buffer` untouched if the body no longer packs to its length.
    pub(crate) fn repack(&mut self, buffer: &mut [u8]) -> ExchangeResult<()> {
        let packed = self.body.packed_len();
        if packed != buffer.len() {
            return Err(ExchangeError::SizeChanged {
                peer: self.peer,
                negotiated: buffer.len(),
                packed,
            });
        }
        self.body.pack(buffer);
        self.len = Some(buffer.len());
        Ok(())
    }

    /// Hand received bytes to the body.
    pub(crate) fn unpack(&mut self, bytes: &[u8]) -> ExchangeResult<()> {
        self.body
            .unpack(bytes)
            .map_err(|source| ExchangeError::Unpack {
                peer: self.peer,
                source,
            })?;
        self.len = Some(bytes.len());
        Ok(())
    }
}
