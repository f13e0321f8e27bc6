//! Peer table: bounded set of directly observed neighbors with liveness metadata.

use serde::Serialize;
use tracing::debug;

use crate::address::PhysicalAddress;

/// One known neighbor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Peer {
    pub address: PhysicalAddress,
    /// Informational only; never used for routing.
    pub signal_strength: i8,
    /// Monotonic ms of the last inbound message from this address.
    pub last_seen: u64,
    pub hop_count: u8,
    pub is_gateway: bool,
    pub is_active: bool,
}

/// Insert refused: the table is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("table full ({capacity} entries)")]
pub struct TableFull {
    pub capacity: usize,
}

/// Capacity-limited peer list, scanned linearly. Insertion order is kept.
#[derive(Debug, Clone)]
pub struct PeerTable {
    peers: Vec<Peer>,
    capacity: usize,
}

impl PeerTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            peers: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.peers.len() >= self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &Peer> {
        self.peers.iter()
    }

    pub fn find(&self, address: &PhysicalAddress) -> Option<&Peer> {
        self.peers.iter().find(|p| p.address == *address)
    }

    fn find_mut(&mut self, address: &PhysicalAddress) -> Option<&mut Peer> {
        self.peers.iter_mut().find(|p| p.address == *address)
    }

    /// Refresh an existing peer, or insert a new active one if there is room.
    /// A full table is left untouched; callers run `evict_stale` and retry.
    pub fn upsert(
        &mut self,
        address: PhysicalAddress,
        hop_count: u8,
        is_gateway: bool,
        signal_strength: i8,
        now: u64,
    ) -> Result<(), TableFull> {
        if let Some(peer) = self.find_mut(&address) {
            peer.last_seen = now;
            peer.hop_count = hop_count;
            peer.is_gateway = is_gateway;
            peer.is_active = true;
            return Ok(());
        }
        if self.is_full() {
            return Err(TableFull {
                capacity: self.capacity,
            });
        }
        self.peers.push(Peer {
            address,
            signal_strength,
            last_seen: now,
            hop_count,
            is_gateway,
            is_active: true,
        });
        Ok(())
    }

    /// Refresh `last_seen` and `hop_count` of a known peer. The gateway flag is
    /// left as recorded at insert time. Returns false if the peer is unknown.
    pub fn touch(&mut self, address: &PhysicalAddress, hop_count: u8, now: u64) -> bool {
        match self.find_mut(address) {
            Some(peer) => {
                peer.last_seen = now;
                peer.hop_count = hop_count;
                peer.is_active = true;
                true
            }
            None => false,
        }
    }

    /// Clear `is_active` on peers outside the liveness window without removing them.
    pub fn mark_inactive(&mut self, now: u64, timeout: u64) -> usize {
        let mut n = 0;
        for peer in self.peers.iter_mut() {
            if peer.is_active && now.saturating_sub(peer.last_seen) >= timeout {
                peer.is_active = false;
                n += 1;
            }
        }
        n
    }

    /// Remove every peer with `now - last_seen >= timeout`. Returns how many were removed.
    pub fn evict_stale(&mut self, now: u64, timeout: u64) -> usize {
        let before = self.peers.len();
        self.peers.retain(|p| {
            let keep = now.saturating_sub(p.last_seen) < timeout;
            if !keep {
                debug!(peer = %p.address, last_seen = p.last_seen, "evicting stale peer");
            }
            keep
        });
        before - self.peers.len()
    }

    /// Gateway peer with the lowest hop count; the earliest entry wins ties.
    pub fn nearest_gateway(&self) -> Option<&Peer> {
        let mut best: Option<&Peer> = None;
        for peer in self.peers.iter().filter(|p| p.is_gateway) {
            if best.map_or(true, |b| peer.hop_count < b.hop_count) {
                best = Some(peer);
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MAX_PEERS, PEER_TIMEOUT_MS};

    fn addr(n: u8) -> PhysicalAddress {
        PhysicalAddress::new([0x02, 0, 0, 0, 0, n])
    }

    #[test]
    fn upsert_inserts_then_refreshes() {
        let mut t = PeerTable::new(4);
        t.upsert(addr(1), 2, false, -40, 100).unwrap();
        let p = t.find(&addr(1)).unwrap();
        assert!(p.is_active);
        assert_eq!(p.hop_count, 2);

        t.upsert(addr(1), 1, true, -40, 500).unwrap();
        assert_eq!(t.len(), 1);
        let p = t.find(&addr(1)).unwrap();
        assert_eq!(p.last_seen, 500);
        assert_eq!(p.hop_count, 1);
        assert!(p.is_gateway);
    }

    #[test]
    fn touch_keeps_gateway_flag() {
        let mut t = PeerTable::new(4);
        t.upsert(addr(1), 0, true, -50, 0).unwrap();
        assert!(t.touch(&addr(1), 3, 10));
        let p = t.find(&addr(1)).unwrap();
        assert!(p.is_gateway);
        assert_eq!(p.hop_count, 3);
        assert_eq!(p.last_seen, 10);
        assert!(!t.touch(&addr(2), 0, 10));
    }

    #[test]
    fn capacity_bound_rejects_extra_peer() {
        let mut t = PeerTable::new(MAX_PEERS);
        for i in 0..MAX_PEERS as u8 {
            t.upsert(addr(i), 1, false, -50, 1_000).unwrap();
        }
        let snapshot: Vec<Peer> = t.iter().cloned().collect();
        let r = t.upsert(addr(200), 0, true, -10, 1_000);
        assert_eq!(r, Err(TableFull { capacity: MAX_PEERS }));
        assert_eq!(t.len(), MAX_PEERS);
        assert!(t.find(&addr(200)).is_none());
        assert_eq!(t.iter().cloned().collect::<Vec<_>>(), snapshot);
    }

    #[test]
    fn full_table_still_refreshes_known_peer() {
        let mut t = PeerTable::new(1);
        t.upsert(addr(1), 1, false, -50, 0).unwrap();
        assert!(t.upsert(addr(1), 0, false, -50, 5).is_ok());
        assert_eq!(t.find(&addr(1)).unwrap().last_seen, 5);
    }

    #[test]
    fn stale_eviction_boundary() {
        let now = 1_000_000;
        let mut t = PeerTable::new(4);
        t.upsert(addr(1), 0, false, -50, now - PEER_TIMEOUT_MS - 1).unwrap();
        t.upsert(addr(2), 0, false, -50, now - PEER_TIMEOUT_MS + 1).unwrap();
        t.upsert(addr(3), 0, false, -50, now - PEER_TIMEOUT_MS).unwrap();
        assert_eq!(t.evict_stale(now, PEER_TIMEOUT_MS), 2);
        assert!(t.find(&addr(1)).is_none());
        assert!(t.find(&addr(2)).is_some());
        assert!(t.find(&addr(3)).is_none());
    }

    #[test]
    fn eviction_preserves_order() {
        let mut t = PeerTable::new(8);
        for (i, seen) in [(1u8, 900u64), (2, 0), (3, 950), (4, 0), (5, 990)] {
            t.upsert(addr(i), 0, false, -50, seen).unwrap();
        }
        t.evict_stale(1_000, 500);
        let order: Vec<u8> = t.iter().map(|p| p.address.as_bytes()[5]).collect();
        assert_eq!(order, vec![1, 3, 5]);
    }

    #[test]
    fn mark_inactive_keeps_entries() {
        let mut t = PeerTable::new(4);
        t.upsert(addr(1), 0, false, -50, 0).unwrap();
        t.upsert(addr(2), 0, false, -50, 900).unwrap();
        assert_eq!(t.mark_inactive(1_000, 500), 1);
        assert_eq!(t.len(), 2);
        assert!(!t.find(&addr(1)).unwrap().is_active);
        assert!(t.find(&addr(2)).unwrap().is_active);
        t.touch(&addr(1), 0, 1_001);
        assert!(t.find(&addr(1)).unwrap().is_active);
    }

    #[test]
    fn nearest_gateway_prefers_fewest_hops_then_first() {
        let mut t = PeerTable::new(8);
        assert!(t.nearest_gateway().is_none());
        t.upsert(addr(1), 0, false, -50, 0).unwrap();
        assert!(t.nearest_gateway().is_none());
        t.upsert(addr(2), 3, true, -50, 0).unwrap();
        t.upsert(addr(3), 1, true, -50, 0).unwrap();
        t.upsert(addr(4), 1, true, -50, 0).unwrap();
        assert_eq!(t.nearest_gateway().unwrap().address, addr(3));
    }
}
