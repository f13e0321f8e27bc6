//! Mesh protocol reference implementation.
//! Host-driven: no I/O; host passes frames and ticks and performs the returned actions.

pub mod address;
pub mod config;
pub mod engine;
pub mod ffi;
pub mod peer;
pub mod protocol;
pub mod routing;
pub mod wire;

pub use address::{AddressParseError, PhysicalAddress, ADDRESS_LEN, BROADCAST};
pub use config::{ConfigError, MeshConfig};
pub use engine::{Action, MeshEngine, MeshError};
pub use peer::{Peer, PeerTable, TableFull};
pub use protocol::{Message, MessageKind, MAX_PAYLOAD};
pub use routing::{Route, RoutingTable};
pub use wire::{decode_frame, encode_frame, FrameDecodeError, FrameEncodeError};
