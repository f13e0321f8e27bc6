//! Protocol tuning. Defaults are the reference sizing for small radio meshes.

use serde::{Deserialize, Serialize};

/// Default bound on both the peer table and the routing table.
pub const MAX_PEERS: usize = 20;
/// Default heartbeat period (ms).
pub const HEARTBEAT_INTERVAL_MS: u64 = 30_000;
/// Default liveness window (ms).
pub const PEER_TIMEOUT_MS: u64 = 120_000;
/// Data and RouteRequest are not relayed once they reach this many hops.
pub const MAX_HOP_COUNT: u8 = 5;
/// Discovery is only answered below this hop count.
pub const MAX_DISCOVERY_HOPS: u8 = 3;

/// Engine configuration. Every field falls back to its default when missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MeshConfig {
    /// Capacity of the peer table and of the routing table.
    pub max_peers: usize,
    pub heartbeat_interval_ms: u64,
    /// Peers not heard from for this long are evicted at the next heartbeat.
    pub peer_timeout_ms: u64,
    /// When set, routes not refreshed for this long are evicted at the next
    /// heartbeat. Unset by default: routes live until replaced.
    pub route_timeout_ms: Option<u64>,
    pub max_hop_count: u8,
    pub max_discovery_hops: u8,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            max_peers: MAX_PEERS,
            heartbeat_interval_ms: HEARTBEAT_INTERVAL_MS,
            peer_timeout_ms: PEER_TIMEOUT_MS,
            route_timeout_ms: None,
            max_hop_count: MAX_HOP_COUNT,
            max_discovery_hops: MAX_DISCOVERY_HOPS,
        }
    }
}

impl MeshConfig {
    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_peers == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(ConfigError::ZeroDuration("heartbeat_interval_ms"));
        }
        if self.peer_timeout_ms == 0 {
            return Err(ConfigError::ZeroDuration("peer_timeout_ms"));
        }
        if self.route_timeout_ms == Some(0) {
            return Err(ConfigError::ZeroDuration("route_timeout_ms"));
        }
        if self.peer_timeout_ms < self.heartbeat_interval_ms {
            return Err(ConfigError::TimeoutBelowHeartbeat {
                timeout_ms: self.peer_timeout_ms,
                heartbeat_ms: self.heartbeat_interval_ms,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("max_peers must be at least 1")]
    ZeroCapacity,
    #[error("{0} must be non-zero")]
    ZeroDuration(&'static str),
    #[error("peer timeout {timeout_ms} ms is shorter than heartbeat interval {heartbeat_ms} ms")]
    TimeoutBelowHeartbeat { timeout_ms: u64, heartbeat_ms: u64 },
    #[error("the broadcast address cannot be a node identity")]
    BroadcastAddress,
}
