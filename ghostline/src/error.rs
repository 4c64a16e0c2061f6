//! Error types for the exchange engine.

use ghostline_core::{Rank, TransportError};

use crate::config::Strategy;

/// Errors raised by [`Marshal::unpack`](crate::Marshal::unpack).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarshalError {
    /// Payload length is not a whole number of elements.
    #[error("payload of {len} bytes is not a multiple of the {element}-byte element size")]
    MisalignedLength {
        /// Length of the received payload.
        len: usize,
        /// Size of one encoded element.
        element: usize,
    },

    /// Payload could not be decoded.
    #[error("malformed payload: {message}")]
    Malformed {
        /// What was wrong with it.
        message: String,
    },
}

/// Errors raised while posting or awaiting an exchange round.
///
/// A round that fails releases every request it still holds with the
/// transport and leaves the package idle, so it can be retired. Peers that
/// took part in the round are not told; the exchange as a whole should be
/// treated as failed.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    /// The transport reported a failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// An inbound message arrived but its body rejected the bytes.
    #[error("failed to unpack message from rank {peer}: {source}")]
    Unpack {
        /// Rank the message came from.
        peer: Rank,
        /// Underlying decode failure.
        source: MarshalError,
    },

    /// The package was posted again before its previous round was awaited.
    ///
    /// Only reachable by dropping a [`Handle`](crate::Handle) without passing
    /// it to `wait`.
    #[error("package already has a round in flight")]
    RoundInFlight,

    /// The package or handle belongs to a different strategy than the engine.
    #[error("package is bound to the {bound} strategy but was used with the {engine} engine")]
    StrategyMismatch {
        /// Strategy that owns the package's requests.
        bound: Strategy,
        /// Strategy of the engine that was called.
        engine: Strategy,
    },

    /// A size-negotiation control message had the wrong length.
    #[error("malformed size announcement from rank {peer}: expected 8 bytes, got {len}")]
    MalformedSizeAnnouncement {
        /// Rank that sent the announcement.
        peer: Rank,
        /// Length of the control message.
        len: usize,
    },

    /// A size announcement exceeded the largest message the transport carries.
    #[error("rank {peer} announced a {size}-byte message, limit is {limit}")]
    OversizedAnnouncement {
        /// Rank that sent the announcement.
        peer: Rank,
        /// Announced size.
        size: u64,
        /// Largest accepted size.
        limit: usize,
    },

    /// An outbound body no longer packs to the size negotiated for it.
    #[error("message to rank {peer} packs to {packed} bytes, {negotiated} were negotiated")]
    SizeChanged {
        /// Destination rank.
        peer: Rank,
        /// Size bound to the persistent request.
        negotiated: usize,
        /// Size the body packs to now.
        packed: usize,
    },

    /// Configuration could not be loaded.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the problem.
        message: String,
    },
}

/// Result type for exchange operations.
pub type ExchangeResult<T> = Result<T, ExchangeError>;
