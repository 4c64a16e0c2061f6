//! In-process transport: every rank is a thread of the same process.
//!
//! Delivery pushes the payload straight into the destination's [`Mailbox`].
//! Dropping an endpoint marks its rank disconnected everywhere, so a rank
//! that exits early fails its peers' receives instead of hanging them.

use std::sync::Arc;

use crate::communicator::{Communicator, Link};
use crate::mailbox::Mailbox;
use crate::{Rank, Tag, TransportResult};

/// Link to peers sharing this process.
#[derive(Debug)]
pub struct LocalLink {
    rank: Rank,
    mailboxes: Arc<[Arc<Mailbox>]>,
}

impl Link for LocalLink {
    fn deliver(&mut self, peer: Rank, tag: Tag, payload: &[u8]) -> TransportResult<()> {
        // The communicator has already range-checked `peer`.
        self.mailboxes[peer.index()].deliver(self.rank, tag, payload.to_vec());
        Ok(())
    }
}

impl Drop for LocalLink {
    fn drop(&mut self) {
        for (index, mailbox) in self.mailboxes.iter().enumerate() {
            if index != self.rank.index() {
                mailbox.disconnect(self.rank);
            }
        }
    }
}

/// Endpoint of one in-process rank.
pub type LocalTransport = Communicator<LocalLink>;

/// A group of in-process ranks.
///
/// # Examples
///
/// ```
/// use ghostline_transport::{LocalCluster, Rank, Tag, Transport};
///
/// let endpoints = LocalCluster::new(2).into_endpoints();
/// std::thread::scope(|scope| {
///     for mut comm in endpoints {
///         scope.spawn(move || {
///             let peer = Rank::new(1 - comm.rank().get());
///             comm.send(peer, Tag::DATA, &[comm.rank().get() as u8]).expect("send");
///             let got = comm.recv(peer, Tag::DATA).expect("recv");
///             assert_eq!(got, vec![peer.get() as u8]);
///         });
///     }
/// });
/// ```
#[derive(Debug)]
pub struct LocalCluster {
    endpoints: Vec<LocalTransport>,
}

impl LocalCluster {
    /// Create `size` connected endpoints, indexed by rank.
    pub fn new(size: usize) -> Self {
        let mailboxes: Arc<[Arc<Mailbox>]> =
            (0..size).map(|_| Arc::new(Mailbox::new())).collect();

        let endpoints = Rank::all(size)
            .map(|rank| {
                let link = LocalLink {
                    rank,
                    mailboxes: Arc::clone(&mailboxes),
                };
                Communicator::new(rank, size, link, Arc::clone(&mailboxes[rank.index()]))
            })
            .collect();

        tracing::debug!(size, "local cluster created");
        Self { endpoints }
    }

    /// Number of ranks.
    pub fn size(&self) -> usize {
        self.endpoints.len()
    }

    /// Hand out the endpoints, one per rank, in rank order.
    pub fn into_endpoints(self) -> Vec<LocalTransport> {
        self.endpoints
    }
}
