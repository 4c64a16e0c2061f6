//! Request bookkeeping and message matching shared by every backend.
//!
//! A [`Communicator`] owns the receiving side of one rank: its [`Mailbox`],
//! the table of requests it has issued, and the queue of posted receives in
//! posting order. Moving bytes to a peer is delegated to a [`Link`], which is
//! the only part that differs between the in-process and TCP transports.
//!
//! Sends are eager: the payload is handed to the link when the send is
//! posted or started, so outbound requests complete immediately and their
//! buffers can be released as soon as the round is waited on.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::mailbox::{Inbox, Mailbox};
use crate::{
    BufferStats, CommBuffer, Rank, RequestId, Tag, Transport, TransportError, TransportMetrics,
    TransportResult,
};

/// Moves payloads from this rank to a peer.
///
/// Self-sends never reach the link; the communicator delivers them into its
/// own mailbox.
pub trait Link: Send {
    /// Hand `payload` to `peer`. Must not block on the peer consuming it.
    fn deliver(&mut self, peer: Rank, tag: Tag, payload: &[u8]) -> TransportResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Send,
    Recv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Persistent request not currently started.
    Inactive,
    /// Receive posted and not yet matched.
    Active,
    /// Transfer done; waiting to be retired or waited on.
    Complete,
}

#[derive(Debug)]
struct Request {
    direction: Direction,
    peer: Rank,
    tag: Tag,
    buffer: CommBuffer,
    persistent: bool,
    state: State,
    /// Bytes delivered by the last completed receive.
    received: usize,
}

/// Requests issued by one rank plus the posted-receive queue.
#[derive(Debug, Default)]
struct RequestTable {
    requests: HashMap<RequestId, Request>,
    posted: VecDeque<RequestId>,
    next_id: u64,
}

impl RequestTable {
    fn insert(&mut self, request: Request) -> RequestId {
        self.next_id += 1;
        let id = RequestId::new(self.next_id);
        if request.state == State::Active {
            self.posted.push_back(id);
        }
        self.requests.insert(id, request);
        id
    }

    fn get(&self, id: RequestId) -> TransportResult<&Request> {
        self.requests
            .get(&id)
            .ok_or(TransportError::UnknownRequest(id))
    }

    fn get_mut(&mut self, id: RequestId) -> TransportResult<&mut Request> {
        self.requests
            .get_mut(&id)
            .ok_or(TransportError::UnknownRequest(id))
    }

    /// Match posted receives, oldest first, against queued messages.
    ///
    /// Returns the number of payload bytes delivered.
    fn match_posted(&mut self, inbox: &mut Inbox) -> TransportResult<u64> {
        let mut delivered = 0u64;
        let mut i = 0;
        while i < self.posted.len() {
            let id = self.posted[i];
            let request = self
                .requests
                .get_mut(&id)
                .ok_or(TransportError::UnknownRequest(id))?;

            let Some(message) = inbox.pop(request.peer, request.tag) else {
                i += 1;
                continue;
            };

            if message.len() > request.buffer.len() {
                return Err(TransportError::Truncated {
                    peer: request.peer,
                    tag: request.tag,
                    len: message.len(),
                    capacity: request.buffer.len(),
                });
            }

            request.buffer[..message.len()].copy_from_slice(&message);
            request.received = message.len();
            request.state = State::Complete;
            delivered += message.len() as u64;
            self.posted.remove(i);
        }
        Ok(delivered)
    }
}

/// Fails if `peer` can no longer satisfy an outstanding receive.
fn ensure_reachable(inbox: &Inbox, peer: Rank) -> TransportResult<()> {
    if !inbox.is_disconnected(peer) {
        return Ok(());
    }
    match inbox.failure(peer) {
        Some(reason) => Err(TransportError::Connection {
            peer,
            message: reason.to_string(),
        }),
        None => Err(TransportError::PeerDisconnected { peer }),
    }
}

/// Outbound half: group membership plus the link.
#[derive(Debug)]
struct Router<L> {
    rank: Rank,
    size: usize,
    link: L,
    inbox: Arc<Mailbox>,
}

impl<L: Link> Router<L> {
    fn check(&self, peer: Rank) -> TransportResult<()> {
        if peer.index() >= self.size {
            return Err(TransportError::InvalidPeer {
                peer,
                size: self.size,
            });
        }
        Ok(())
    }

    fn transmit(&mut self, peer: Rank, tag: Tag, payload: &[u8]) -> TransportResult<()> {
        if peer == self.rank {
            self.inbox.deliver(self.rank, tag, payload.to_vec());
            return Ok(());
        }
        self.link.deliver(peer, tag, payload)
    }
}

/// A rank's endpoint: [`Transport`] over any [`Link`].
///
/// # Examples
///
/// ```
/// use ghostline_transport::{LocalCluster, Rank, Tag, Transport};
///
/// let mut ranks = LocalCluster::new(1).into_endpoints();
/// let comm = &mut ranks[0];
///
/// let mut buf = comm.allocate(3);
/// buf.copy_from_slice(b"abc");
/// let send = comm.isend(Rank::new(0), Tag::DATA, buf).expect("isend");
///
/// assert_eq!(comm.iprobe(Rank::new(0), Tag::DATA).expect("probe"), Some(3));
/// let recv_buf = comm.allocate(3);
/// let recv = comm.irecv(Rank::new(0), Tag::DATA, recv_buf).expect("irecv");
///
/// comm.wait_all(&[&[send], &[recv]]).expect("wait");
/// drop(comm.take(send).expect("take send"));
/// assert_eq!(comm.take(recv).expect("take recv").as_slice(), b"abc");
/// ```
#[derive(Debug)]
pub struct Communicator<L> {
    router: Router<L>,
    table: RequestTable,
    buffers: Arc<BufferStats>,
    metrics: TransportMetrics,
}

impl<L: Link> Communicator<L> {
    /// Create the endpoint of `rank` in a group of `size` ranks.
    ///
    /// `inbox` must be the mailbox the link's peers deliver into.
    pub fn new(rank: Rank, size: usize, link: L, inbox: Arc<Mailbox>) -> Self {
        Self {
            router: Router {
                rank,
                size,
                link,
                inbox,
            },
            table: RequestTable::default(),
            buffers: BufferStats::new(),
            metrics: TransportMetrics::default(),
        }
    }

    /// The link used for outbound traffic.
    pub fn link(&self) -> &L {
        &self.router.link
    }

    /// Messages that have arrived and are not claimed by any receive yet.
    pub fn queued(&self) -> usize {
        self.router.inbox.lock().queued()
    }

    fn persistent(&mut self, id: RequestId) -> TransportResult<&mut Request> {
        let request = self.table.get_mut(id)?;
        if !request.persistent {
            return Err(TransportError::NotPersistent(id));
        }
        Ok(request)
    }
}

impl<L: Link> Transport for Communicator<L> {
    fn rank(&self) -> Rank {
        self.router.rank
    }

    fn size(&self) -> usize {
        self.router.size
    }

    fn buffer_stats(&self) -> &Arc<BufferStats> {
        &self.buffers
    }

    fn isend(&mut self, peer: Rank, tag: Tag, buffer: CommBuffer) -> TransportResult<RequestId> {
        self.router.check(peer)?;
        self.router.transmit(peer, tag, &buffer)?;
        self.metrics.sends_posted += 1;
        self.metrics.bytes_sent += buffer.len() as u64;
        tracing::trace!(rank = %self.router.rank, %peer, %tag, len = buffer.len(), "isend");

        Ok(self.table.insert(Request {
            direction: Direction::Send,
            peer,
            tag,
            buffer,
            persistent: false,
            state: State::Complete,
            received: 0,
        }))
    }

    fn irecv(&mut self, peer: Rank, tag: Tag, buffer: CommBuffer) -> TransportResult<RequestId> {
        self.router.check(peer)?;
        self.metrics.recvs_posted += 1;
        tracing::trace!(rank = %self.router.rank, %peer, %tag, capacity = buffer.len(), "irecv");

        Ok(self.table.insert(Request {
            direction: Direction::Recv,
            peer,
            tag,
            buffer,
            persistent: false,
            state: State::Active,
            received: 0,
        }))
    }

    fn iprobe(&mut self, peer: Rank, tag: Tag) -> TransportResult<Option<usize>> {
        self.router.check(peer)?;
        let mailbox = Arc::clone(&self.router.inbox);
        let mut inbox = mailbox.lock();

        self.metrics.bytes_received += self.table.match_posted(&mut inbox)?;
        self.metrics.probes += 1;

        match inbox.peek_len(peer, tag) {
            Some(len) => {
                self.metrics.probe_hits += 1;
                Ok(Some(len))
            }
            None => {
                ensure_reachable(&inbox, peer)?;
                Ok(None)
            }
        }
    }

    fn send(&mut self, peer: Rank, tag: Tag, bytes: &[u8]) -> TransportResult<()> {
        self.router.check(peer)?;
        self.router.transmit(peer, tag, bytes)?;
        self.metrics.blocking_sends += 1;
        self.metrics.bytes_sent += bytes.len() as u64;
        Ok(())
    }

    fn recv(&mut self, peer: Rank, tag: Tag) -> TransportResult<Vec<u8>> {
        self.router.check(peer)?;
        let mailbox = Arc::clone(&self.router.inbox);
        let mut inbox = mailbox.lock();

        loop {
            self.metrics.bytes_received += self.table.match_posted(&mut inbox)?;
            if let Some(message) = inbox.pop(peer, tag) {
                self.metrics.blocking_recvs += 1;
                self.metrics.bytes_received += message.len() as u64;
                return Ok(message);
            }
            ensure_reachable(&inbox, peer)?;
            inbox = mailbox.wait(inbox);
        }
    }

    fn wait_all(&mut self, groups: &[&[RequestId]]) -> TransportResult<()> {
        let mailbox = Arc::clone(&self.router.inbox);
        let mut inbox = mailbox.lock();

        loop {
            self.metrics.bytes_received += self.table.match_posted(&mut inbox)?;

            let mut pending = false;
            for &id in groups.iter().flat_map(|group| group.iter()) {
                let request = self.table.get(id)?;
                if request.state == State::Active {
                    ensure_reachable(&inbox, request.peer)?;
                    pending = true;
                }
            }

            if !pending {
                break;
            }
            inbox = mailbox.wait(inbox);
        }
        drop(inbox);

        for &id in groups.iter().flat_map(|group| group.iter()) {
            let request = self.table.get_mut(id)?;
            if request.persistent && request.state == State::Complete {
                request.state = State::Inactive;
            }
        }
        Ok(())
    }

    fn take(&mut self, id: RequestId) -> TransportResult<CommBuffer> {
        let request = self.table.get(id)?;
        if request.persistent {
            return Err(TransportError::Persistent(id));
        }
        if request.state != State::Complete {
            return Err(TransportError::NotComplete(id));
        }

        let mut request = self
            .table
            .requests
            .remove(&id)
            .ok_or(TransportError::UnknownRequest(id))?;
        if request.direction == Direction::Recv {
            request.buffer.truncate(request.received);
        }
        Ok(request.buffer)
    }

    fn send_init(
        &mut self,
        peer: Rank,
        tag: Tag,
        buffer: CommBuffer,
    ) -> TransportResult<RequestId> {
        self.router.check(peer)?;
        self.metrics.persistent_created += 1;

        Ok(self.table.insert(Request {
            direction: Direction::Send,
            peer,
            tag,
            buffer,
            persistent: true,
            state: State::Inactive,
            received: 0,
        }))
    }

    fn recv_init(
        &mut self,
        peer: Rank,
        tag: Tag,
        buffer: CommBuffer,
    ) -> TransportResult<RequestId> {
        self.router.check(peer)?;
        self.metrics.persistent_created += 1;

        Ok(self.table.insert(Request {
            direction: Direction::Recv,
            peer,
            tag,
            buffer,
            persistent: true,
            state: State::Inactive,
            received: 0,
        }))
    }

    fn start_all(&mut self, requests: &[RequestId]) -> TransportResult<()> {
        for &id in requests {
            let request = self.table.get_mut(id)?;
            if !request.persistent {
                return Err(TransportError::NotPersistent(id));
            }
            if request.state != State::Inactive {
                return Err(TransportError::RequestActive(id));
            }

            match request.direction {
                Direction::Send => {
                    self.router
                        .transmit(request.peer, request.tag, &request.buffer)?;
                    self.metrics.bytes_sent += request.buffer.len() as u64;
                    request.state = State::Complete;
                }
                Direction::Recv => {
                    request.received = 0;
                    request.state = State::Active;
                    self.table.posted.push_back(id);
                }
            }
            self.metrics.starts += 1;
        }
        Ok(())
    }

    fn buffer_mut(&mut self, id: RequestId) -> TransportResult<&mut CommBuffer> {
        let request = self.persistent(id)?;
        if request.state != State::Inactive {
            return Err(TransportError::RequestActive(id));
        }
        Ok(&mut request.buffer)
    }

    fn received(&self, id: RequestId) -> TransportResult<&[u8]> {
        let request = self.table.get(id)?;
        if !request.persistent {
            return Err(TransportError::NotPersistent(id));
        }
        if request.direction != Direction::Recv {
            return Err(TransportError::NotReceive(id));
        }
        if request.state == State::Active {
            return Err(TransportError::RequestActive(id));
        }
        Ok(&request.buffer[..request.received])
    }

    fn free(&mut self, id: RequestId) -> TransportResult<()> {
        let request = self.persistent(id)?;
        if request.state == State::Active {
            return Err(TransportError::RequestActive(id));
        }
        self.table.requests.remove(&id);
        Ok(())
    }

    fn cancel(&mut self, id: RequestId) -> TransportResult<()> {
        let request = self
            .table
            .requests
            .remove(&id)
            .ok_or(TransportError::UnknownRequest(id))?;
        if request.state == State::Active {
            self.table.posted.retain(|&posted| posted != id);
        }
        self.metrics.cancelled += 1;
        tracing::trace!(rank = %self.router.rank, %id, peer = %request.peer, "request cancelled");
        Ok(())
    }

    fn outstanding(&self) -> usize {
        self.table
            .requests
            .values()
            .filter(|request| !request.persistent || request.state != State::Inactive)
            .count()
    }

    fn metrics(&self) -> TransportMetrics {
        self.metrics
    }
}
