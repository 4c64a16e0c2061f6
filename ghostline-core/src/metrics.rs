//! Per-transport operation counters.

use serde::Serialize;

/// Counters maintained by a transport for the lifetime of the endpoint.
///
/// Counting request creation separately from activation makes the cost
/// model of the two exchange strategies observable: the probing engine
/// creates two requests per message per round, the persistent engine
/// creates them once and only starts them afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransportMetrics {
    /// Non-blocking sends posted.
    pub sends_posted: u64,
    /// Non-blocking receives posted.
    pub recvs_posted: u64,
    /// Probe calls issued.
    pub probes: u64,
    /// Probe calls that found a pending message.
    pub probe_hits: u64,
    /// Persistent requests created.
    pub persistent_created: u64,
    /// Persistent request activations.
    pub starts: u64,
    /// Blocking sends.
    pub blocking_sends: u64,
    /// Blocking receives.
    pub blocking_recvs: u64,
    /// Requests withdrawn with `cancel`.
    pub cancelled: u64,
    /// Payload bytes handed to the network, including self-sends.
    pub bytes_sent: u64,
    /// Payload bytes copied into receive buffers.
    pub bytes_received: u64,
}

impl TransportMetrics {
    /// Requests created by any means (non-blocking or persistent).
    pub fn requests_created(&self) -> u64 {
        self.sends_posted + self.recvs_posted + self.persistent_created
    }
}
