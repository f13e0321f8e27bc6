//! Physical (link-layer) addresses: 6 bytes, byte-wise equality, `AA:BB:CC:DD:EE:FF` text form.

use std::fmt;
use std::str::FromStr;

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// Length of a physical address in bytes.
pub const ADDRESS_LEN: usize = 6;

/// Fixed-size node address. The all-ones value is reserved for broadcast.
#[derive(Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct PhysicalAddress([u8; ADDRESS_LEN]);

/// Broadcast destination. Never a peer identity.
pub const BROADCAST: PhysicalAddress = PhysicalAddress([0xFF; ADDRESS_LEN]);

impl PhysicalAddress {
    pub const fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        PhysicalAddress(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// Read an address from the first 6 bytes of `bytes`. None if too short.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let head: [u8; ADDRESS_LEN] = bytes.get(..ADDRESS_LEN)?.try_into().ok()?;
        Some(PhysicalAddress(head))
    }

    pub fn is_broadcast(&self) -> bool {
        *self == BROADCAST
    }

    /// Stable address derived from a node name: first 6 bytes of SHA-256(name),
    /// marked locally administered and unicast.
    pub fn from_name(name: &str) -> Self {
        let digest = Sha256::digest(name.as_bytes());
        let mut bytes = [0u8; ADDRESS_LEN];
        bytes.copy_from_slice(&digest[..ADDRESS_LEN]);
        Self::local_unicast(bytes)
    }

    /// Random locally administered unicast address from the OS RNG.
    pub fn random() -> Self {
        let mut bytes = [0u8; ADDRESS_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self::local_unicast(bytes)
    }

    // Clearing the group bit also guarantees the result is never BROADCAST.
    fn local_unicast(mut bytes: [u8; ADDRESS_LEN]) -> Self {
        bytes[0] = (bytes[0] | 0x02) & !0x01;
        PhysicalAddress(bytes)
    }
}

impl From<[u8; ADDRESS_LEN]> for PhysicalAddress {
    fn from(bytes: [u8; ADDRESS_LEN]) -> Self {
        PhysicalAddress(bytes)
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysicalAddress({})", self)
    }
}

/// Error parsing the `AA:BB:CC:DD:EE:FF` form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid physical address: {0:?}")]
pub struct AddressParseError(String);

impl FromStr for PhysicalAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || AddressParseError(s.to_string());
        let mut bytes = [0u8; ADDRESS_LEN];
        let mut parts = s.split(|c: char| c == ':' || c == '-');
        for slot in bytes.iter_mut() {
            let part = parts.next().ok_or_else(err)?;
            if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(err());
            }
            *slot = u8::from_str_radix(part, 16).map_err(|_| err())?;
        }
        if parts.next().is_some() {
            return Err(err());
        }
        Ok(PhysicalAddress(bytes))
    }
}

impl Serialize for PhysicalAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PhysicalAddress {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s: String = Deserialize::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_parse() {
        let a = PhysicalAddress::new([0x01, 0x02, 0x0A, 0xBC, 0x00, 0xFF]);
        assert_eq!(a.to_string(), "01:02:0A:BC:00:FF");
        assert_eq!("01:02:0a:bc:00:ff".parse::<PhysicalAddress>().unwrap(), a);
        assert_eq!("01-02-0A-BC-00-FF".parse::<PhysicalAddress>().unwrap(), a);
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!("01:02:03:04:05".parse::<PhysicalAddress>().is_err());
        assert!("01:02:03:04:05:06:07".parse::<PhysicalAddress>().is_err());
        assert!("01:02:03:04:05:G6".parse::<PhysicalAddress>().is_err());
        assert!("1:02:03:04:05:06".parse::<PhysicalAddress>().is_err());
    }

    #[test]
    fn broadcast_is_all_ones() {
        assert!(BROADCAST.is_broadcast());
        assert_eq!(BROADCAST.to_string(), "FF:FF:FF:FF:FF:FF");
        assert!(!PhysicalAddress::new([0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE]).is_broadcast());
    }

    #[test]
    fn from_name_is_stable_local_unicast() {
        let a = PhysicalAddress::from_name("node-a");
        assert_eq!(a, PhysicalAddress::from_name("node-a"));
        assert_ne!(a, PhysicalAddress::from_name("node-b"));
        assert_eq!(a.as_bytes()[0] & 0x03, 0x02);
        assert!(!a.is_broadcast());
    }

    #[test]
    fn random_is_never_broadcast() {
        for _ in 0..32 {
            let a = PhysicalAddress::random();
            assert!(!a.is_broadcast());
            assert_eq!(a.as_bytes()[0] & 0x01, 0);
        }
    }

    #[test]
    fn from_slice_needs_six_bytes() {
        assert!(PhysicalAddress::from_slice(&[1, 2, 3, 4, 5]).is_none());
        let a = PhysicalAddress::from_slice(&[1, 2, 3, 4, 5, 6, 7]).unwrap();
        assert_eq!(a.as_bytes(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn serializes_as_text() {
        let a = PhysicalAddress::new([0x02, 0, 0, 0, 0, 0x01]);
        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(json, "\"02:00:00:00:00:01\"");
        let back: PhysicalAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, a);
    }
}
