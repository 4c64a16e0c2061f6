//! Error types for transport operations.

use std::io;

use crate::{Rank, RequestId, Tag};

/// Errors reported by a [`Transport`](crate::Transport).
///
/// Transport failures have no recovery path in the exchange layer; callers
/// are expected to abort the run when one surfaces.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// Peer rank is outside the communicating group.
    #[error("invalid peer rank {peer} (group size {size})")]
    InvalidPeer {
        /// The rejected rank.
        peer: Rank,
        /// Size of the group.
        size: usize,
    },

    /// Incoming message is longer than the posted receive buffer.
    #[error("message from rank {peer} ({tag}) truncated: {len} bytes into a {capacity}-byte buffer")]
    Truncated {
        /// Sending rank.
        peer: Rank,
        /// Message tag.
        tag: Tag,
        /// Length of the incoming message.
        len: usize,
        /// Length of the posted buffer.
        capacity: usize,
    },

    /// Request id was never issued or has already been retired.
    #[error("unknown request {0}")]
    UnknownRequest(RequestId),

    /// Operation requires an inactive request but this one is in flight.
    #[error("request {0} is still active")]
    RequestActive(RequestId),

    /// Operation requires a request that has been started and completed.
    #[error("request {0} has not completed")]
    NotComplete(RequestId),

    /// Operation only applies to persistent requests.
    #[error("request {0} is not persistent")]
    NotPersistent(RequestId),

    /// Operation does not apply to persistent requests.
    #[error("request {0} is persistent and must be freed, not taken")]
    Persistent(RequestId),

    /// Operation only applies to receive requests.
    #[error("request {0} is not a receive")]
    NotReceive(RequestId),

    /// Peer went away while a receive from it was still outstanding.
    #[error("peer rank {peer} disconnected")]
    PeerDisconnected {
        /// The disconnected rank.
        peer: Rank,
    },

    /// Connection to a peer could not be established or failed.
    #[error("connection to rank {peer} failed: {message}")]
    Connection {
        /// Rank of the peer.
        peer: Rank,
        /// Details about the failure.
        message: String,
    },

    /// Malformed data on the wire.
    #[error("protocol error: {message}")]
    Protocol {
        /// Details about the violation.
        message: String,
    },

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<io::Error> for TransportError {
    fn from(error: io::Error) -> Self {
        TransportError::Io(error.to_string())
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
