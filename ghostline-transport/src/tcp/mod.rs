//! Full-mesh TCP transport.
//!
//! Every rank listens on its own address, connects to every lower rank and
//! accepts one connection from every higher rank:
//!
//! ```text
//!   rank 2 ──connect──► rank 0        hello = [rank:4]
//!   rank 2 ──connect──► rank 1
//!   rank 1 ──connect──► rank 0
//! ```
//!
//! Connecting does not need the lower rank to be inside `accept()`, only
//! bound, so ranks may start in any order; connects are retried with
//! exponential backoff until the listener is up.
//!
//! After the handshake each connection is split: a reader task decodes
//! frames into the rank's [`Mailbox`](crate::Mailbox) and a writer task
//! drains a queue of encoded frames. Both run on a private tokio runtime so
//! the synchronous [`Transport`](crate::Transport) API never blocks on the
//! network when posting sends.

mod config;
mod link;

pub use config::TcpConfig;
pub use link::{TcpLink, TcpTransport};
