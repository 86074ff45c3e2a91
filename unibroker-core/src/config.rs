use serde::Deserialize;

use crate::egress::OverflowPolicy;
use crate::protocol::DEFAULT_MAX_FRAME_LEN;

/// Broker tuning knobs
///
/// Every field has a default, so a config file only needs to name what it
/// changes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Largest accepted frame body in bytes
    pub max_frame_len: usize,
    /// Upper bound of a single socket read
    pub read_chunk_size: usize,
    /// Frames queued per connection before `overflow_policy` applies (0 = unbounded)
    pub max_egress_depth: usize,
    pub overflow_policy: OverflowPolicy,
    /// Live connections allowed at once (0 = unlimited)
    pub max_connections: usize,
    /// Accepts attempted per cycle
    pub max_accepts_per_cycle: usize,
    /// Deliver a publish back to its sender when the sender is subscribed
    pub deliver_to_self: bool,
    /// Sleep between idle cycles in `Broker::run`
    pub idle_sleep_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            read_chunk_size: 64 * 1024,
            max_egress_depth: 1024,
            overflow_policy: OverflowPolicy::DropConnection,
            max_connections: 256,
            max_accepts_per_cycle: 16,
            deliver_to_self: true,
            idle_sleep_ms: 5,
        }
    }
}

impl BrokerConfig {
    /// Per-connection settings derived from this config
    pub fn endpoint(&self) -> EndpointConfig {
        EndpointConfig {
            max_frame_len: self.max_frame_len,
            read_chunk_size: self.read_chunk_size,
            max_egress_depth: self.max_egress_depth,
            overflow_policy: self.overflow_policy,
        }
    }
}

/// Settings of a single endpoint, broker side or client side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointConfig {
    pub max_frame_len: usize,
    pub read_chunk_size: usize,
    pub max_egress_depth: usize,
    pub overflow_policy: OverflowPolicy,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        BrokerConfig::default().endpoint()
    }
}
