//! Routing table: best-known next hop per destination, lowest hop count wins.

use serde::Serialize;
use tracing::debug;

use crate::address::PhysicalAddress;
use crate::peer::TableFull;

/// Best-known route to one destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    pub destination: PhysicalAddress,
    /// Neighbor to forward through; equals `destination` for direct neighbors.
    pub next_hop: PhysicalAddress,
    pub hop_count: u8,
    pub last_updated: u64,
}

/// Capacity-limited route list, one entry per destination.
#[derive(Debug, Clone)]
pub struct RoutingTable {
    routes: Vec<Route>,
    capacity: usize,
}

impl RoutingTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            routes: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    pub fn find(&self, destination: &PhysicalAddress) -> Option<&Route> {
        self.routes.iter().find(|r| r.destination == *destination)
    }

    /// Offer a candidate route.
    ///
    /// An unknown destination is inserted if there is room. A known one is
    /// replaced only by a strictly smaller hop count; a candidate that does
    /// not improve the route refreshes `last_updated` only when it comes
    /// through the same next hop.
    pub fn update(
        &mut self,
        destination: PhysicalAddress,
        next_hop: PhysicalAddress,
        hop_count: u8,
        now: u64,
    ) -> Result<(), TableFull> {
        if let Some(route) = self.routes.iter_mut().find(|r| r.destination == destination) {
            if hop_count < route.hop_count {
                debug!(
                    %destination,
                    %next_hop,
                    hop_count,
                    previous = route.hop_count,
                    "route improved"
                );
                route.next_hop = next_hop;
                route.hop_count = hop_count;
                route.last_updated = now;
            } else if route.next_hop == next_hop {
                route.last_updated = now;
            }
            return Ok(());
        }
        if self.routes.len() >= self.capacity {
            return Err(TableFull {
                capacity: self.capacity,
            });
        }
        debug!(%destination, %next_hop, hop_count, "route added");
        self.routes.push(Route {
            destination,
            next_hop,
            hop_count,
            last_updated: now,
        });
        Ok(())
    }

    /// Remove every route with `now - last_updated >= timeout`.
    pub fn evict_stale(&mut self, now: u64, timeout: u64) -> usize {
        let before = self.routes.len();
        self.routes.retain(|r| now.saturating_sub(r.last_updated) < timeout);
        before - self.routes.len()
    }
}
