//! Mesh wire protocol: message kinds, the message struct and typed payload helpers.

use crate::address::{PhysicalAddress, ADDRESS_LEN};

/// Largest payload a single message carries.
pub const MAX_PAYLOAD: usize = 200;

/// Message kind, encoded as the first byte of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    /// Presence announcement; payload `{is_gateway}`.
    Discovery = 0x01,
    /// Periodic liveness broadcast; payload `{peer_count, is_gateway}`.
    Heartbeat = 0x02,
    /// Application data.
    Data = 0x03,
    /// Who can reach `destination`? Payload is the queried address.
    RouteRequest = 0x04,
    /// Answer to a RouteRequest; payload `{destination, hop_count}`.
    RouteReply = 0x05,
    /// Reserved.
    Ack = 0x06,
}

impl MessageKind {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(MessageKind::Discovery),
            0x02 => Some(MessageKind::Heartbeat),
            0x03 => Some(MessageKind::Data),
            0x04 => Some(MessageKind::RouteRequest),
            0x05 => Some(MessageKind::RouteReply),
            0x06 => Some(MessageKind::Ack),
            _ => None,
        }
    }
}

/// One mesh message. Ephemeral; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub source: PhysicalAddress,
    pub destination: PhysicalAddress,
    pub hop_count: u8,
    pub sequence: u16,
    pub payload: Vec<u8>,
}

impl Message {
    /// Gateway flag carried by Discovery (`payload[0]`) and Heartbeat (`payload[1]`).
    /// Other kinds carry none.
    pub fn gateway_flag(&self) -> bool {
        let idx = match self.kind {
            MessageKind::Discovery => 0,
            MessageKind::Heartbeat => 1,
            _ => return false,
        };
        self.payload.get(idx) == Some(&1)
    }
}

pub fn discovery_payload(is_gateway: bool) -> Vec<u8> {
    vec![is_gateway as u8]
}

/// Peer count saturates at 255 on the wire.
pub fn heartbeat_payload(peer_count: usize, is_gateway: bool) -> Vec<u8> {
    vec![peer_count.min(u8::MAX as usize) as u8, is_gateway as u8]
}

pub fn route_request_payload(destination: &PhysicalAddress) -> Vec<u8> {
    destination.as_bytes().to_vec()
}

pub fn parse_route_request(payload: &[u8]) -> Option<PhysicalAddress> {
    PhysicalAddress::from_slice(payload)
}

pub fn route_reply_payload(destination: &PhysicalAddress, hop_count: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(ADDRESS_LEN + 1);
    out.extend_from_slice(destination.as_bytes());
    out.push(hop_count);
    out
}

pub fn parse_route_reply(payload: &[u8]) -> Option<(PhysicalAddress, u8)> {
    let destination = PhysicalAddress::from_slice(payload)?;
    let hop_count = *payload.get(ADDRESS_LEN)?;
    Some((destination, hop_count))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(kind: MessageKind, payload: Vec<u8>) -> Message {
        Message {
            kind,
            source: PhysicalAddress::new([2, 0, 0, 0, 0, 1]),
            destination: crate::address::BROADCAST,
            hop_count: 0,
            sequence: 0,
            payload,
        }
    }

    #[test]
    fn kind_codes() {
        for code in 1..=6u8 {
            assert_eq!(MessageKind::from_code(code).unwrap().code(), code);
        }
        assert!(MessageKind::from_code(0).is_none());
        assert!(MessageKind::from_code(7).is_none());
    }

    #[test]
    fn gateway_flag_position_depends_on_kind() {
        assert!(msg(MessageKind::Discovery, discovery_payload(true)).gateway_flag());
        assert!(!msg(MessageKind::Discovery, discovery_payload(false)).gateway_flag());
        assert!(msg(MessageKind::Heartbeat, heartbeat_payload(1, true)).gateway_flag());
        // Peer count of 1 in byte 0 must not read as a gateway flag.
        assert!(!msg(MessageKind::Heartbeat, heartbeat_payload(1, false)).gateway_flag());
        assert!(!msg(MessageKind::Data, vec![1]).gateway_flag());
        assert!(!msg(MessageKind::Discovery, vec![]).gateway_flag());
    }

    #[test]
    fn heartbeat_peer_count_saturates() {
        assert_eq!(heartbeat_payload(1_000, false), vec![255, 0]);
    }

    #[test]
    fn route_reply_payload_layout() {
        let d = PhysicalAddress::new([2, 0, 0, 0, 0, 9]);
        let p = route_reply_payload(&d, 3);
        assert_eq!(p, vec![2, 0, 0, 0, 0, 9, 3]);
        assert_eq!(parse_route_reply(&p), Some((d, 3)));
        assert_eq!(parse_route_reply(&p[..6]), None);
        assert_eq!(parse_route_request(&route_request_payload(&d)), Some(d));
    }
}
