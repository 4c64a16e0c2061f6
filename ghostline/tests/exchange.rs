//! Multi-rank exchange tests.
//!
//! Every rank runs on its own thread over an in-process cluster (or a TCP
//! mesh on loopback) and posts matching rounds with the engine under test.

#[path = "exchange/mod.rs"]
mod exchange_mod;

// Re-export common helpers for test modules
pub use exchange_mod::*;
