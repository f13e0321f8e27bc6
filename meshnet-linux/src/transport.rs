//! LAN stand-in for the radio link: mesh frames over UDP broadcast.
//!
//! Every datagram is `link_src(6) | link_dst(6) | frame`. Receivers keep
//! datagrams addressed to them or to broadcast, and learn which socket
//! address each link sender lives at so later unicasts can go direct. The
//! learned map is bounded and pruned alongside the engine's peer table.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use meshnet_core::wire::MAX_FRAME_LEN;
use meshnet_core::{MeshError, PhysicalAddress, ADDRESS_LEN};
use tokio::net::UdpSocket;
use tracing::{debug, trace};

const LINK_HEADER: usize = 2 * ADDRESS_LEN;

/// Largest datagram a node sends: link header plus one full frame.
pub const MAX_DATAGRAM_LEN: usize = LINK_HEADER + MAX_FRAME_LEN;

/// Wrap a frame with the link header.
pub fn encode_datagram(src: &PhysicalAddress, dst: &PhysicalAddress, frame: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(LINK_HEADER + frame.len());
    out.extend_from_slice(src.as_bytes());
    out.extend_from_slice(dst.as_bytes());
    out.extend_from_slice(frame);
    out
}

/// Split a datagram into (link source, link destination, frame).
/// None if shorter than the link header.
pub fn decode_datagram(bytes: &[u8]) -> Option<(PhysicalAddress, PhysicalAddress, &[u8])> {
    if bytes.len() < LINK_HEADER {
        return None;
    }
    let src = PhysicalAddress::from_slice(&bytes[..ADDRESS_LEN])?;
    let dst = PhysicalAddress::from_slice(&bytes[ADDRESS_LEN..LINK_HEADER])?;
    Some((src, dst, &bytes[LINK_HEADER..]))
}

pub struct UdpLink {
    socket: UdpSocket,
    local: PhysicalAddress,
    broadcast: SocketAddr,
    neighbors: HashMap<PhysicalAddress, SocketAddr>,
    max_neighbors: usize,
}

impl UdpLink {
    /// Bind the shared port. At most `max_neighbors` socket mappings are kept.
    pub async fn bind(
        local: PhysicalAddress,
        port: u16,
        broadcast_ip: Ipv4Addr,
        max_neighbors: usize,
    ) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", port)).await?;
        socket.set_broadcast(true)?;
        Ok(Self {
            socket,
            local,
            broadcast: SocketAddr::V4(SocketAddrV4::new(broadcast_ip, port)),
            neighbors: HashMap::new(),
            max_neighbors,
        })
    }

    /// Drop socket mappings for addresses `keep` rejects.
    pub fn retain_neighbors(&mut self, keep: impl Fn(&PhysicalAddress) -> bool) {
        let before = self.neighbors.len();
        self.neighbors.retain(|addr, _| keep(addr));
        let pruned = before - self.neighbors.len();
        if pruned > 0 {
            debug!(pruned, "forgot link neighbors");
        }
    }

    // A full map only refreshes known senders; newcomers are reached by broadcast.
    fn learn(&mut self, src: PhysicalAddress, from: SocketAddr) {
        if let Some(known) = self.neighbors.get_mut(&src) {
            *known = from;
        } else if self.neighbors.len() < self.max_neighbors {
            self.neighbors.insert(src, from);
        } else {
            trace!(%src, "neighbor map full");
        }
    }

    /// Fire-and-forget send. Unicasts to a neighbor we have not heard from yet
    /// go out as LAN broadcast; receivers filter on the link destination.
    pub async fn send(&self, to: PhysicalAddress, frame: &[u8]) -> Result<(), MeshError> {
        let target = if to.is_broadcast() {
            self.broadcast
        } else {
            self.neighbors.get(&to).copied().unwrap_or(self.broadcast)
        };
        let datagram = encode_datagram(&self.local, &to, frame);
        self.socket
            .send_to(&datagram, target)
            .await
            .map(|_| ())
            .map_err(|e| MeshError::SendFailed {
                to,
                reason: e.to_string(),
            })
    }

    /// Wait for the next frame addressed to this node. Returns None for
    /// datagrams that are ours, for someone else, or too short.
    pub async fn recv(&mut self, buf: &mut [u8]) -> std::io::Result<Option<Vec<u8>>> {
        let (n, from) = self.socket.recv_from(buf).await?;
        let Some((src, dst, frame)) = decode_datagram(&buf[..n]) else {
            debug!(%from, len = n, "dropping runt datagram");
            return Ok(None);
        };
        if src == self.local {
            return Ok(None);
        }
        self.learn(src, from);
        if dst != self.local && !dst.is_broadcast() {
            trace!(%src, %dst, "datagram for another node");
            return Ok(None);
        }
        Ok(Some(frame.to_vec()))
    }
}
