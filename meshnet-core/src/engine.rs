//! Host-driven API: MeshEngine receives frames and ticks from the host, returns actions.

use tracing::{debug, info, warn};

use crate::address::{PhysicalAddress, BROADCAST};
use crate::config::{ConfigError, MeshConfig};
use crate::peer::{Peer, PeerTable, TableFull};
use crate::protocol::{self, Message, MessageKind, MAX_PAYLOAD};
use crate::routing::{Route, RoutingTable};
use crate::wire::{self, FrameDecodeError};

/// Signal strength recorded for peers when the host has no measurement.
pub const DEFAULT_SIGNAL_STRENGTH: i8 = -50;

/// Action for host to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Transmit an encoded frame to a neighbor, or to everyone in range when
    /// the address is `BROADCAST`. Fire-and-forget.
    Send(PhysicalAddress, Vec<u8>),
    /// Data addressed to this node: `(source, payload)` for the application.
    Deliver(PhysicalAddress, Vec<u8>),
}

/// One mesh node. Owns the peer table, routing table, gateway flag and the
/// outgoing sequence counter. Not reentrant; the host serializes all calls.
pub struct MeshEngine {
    address: PhysicalAddress,
    config: MeshConfig,
    is_gateway: bool,
    sequence: u16,
    last_heartbeat: u64,
    peers: PeerTable,
    routes: RoutingTable,
}

impl MeshEngine {
    /// Engine with the reference configuration.
    pub fn new(address: PhysicalAddress) -> Result<Self, ConfigError> {
        Self::with_config(address, MeshConfig::default())
    }

    pub fn with_config(address: PhysicalAddress, config: MeshConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        if address.is_broadcast() {
            return Err(ConfigError::BroadcastAddress);
        }
        Ok(Self {
            address,
            is_gateway: false,
            sequence: 0,
            last_heartbeat: 0,
            peers: PeerTable::new(config.max_peers),
            routes: RoutingTable::new(config.max_peers),
            config,
        })
    }

    pub fn address(&self) -> PhysicalAddress {
        self.address
    }

    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    pub fn is_gateway(&self) -> bool {
        self.is_gateway
    }

    /// Toggle the gateway flag advertised in Discovery and Heartbeat payloads.
    pub fn set_gateway_mode(&mut self, gateway: bool) {
        if gateway != self.is_gateway {
            info!(gateway, "gateway mode changed");
        }
        self.is_gateway = gateway;
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn peers(&self) -> &PeerTable {
        &self.peers
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    pub fn find_route(&self, destination: &PhysicalAddress) -> Option<&Route> {
        self.routes.find(destination)
    }

    pub fn nearest_gateway(&self) -> Option<&Peer> {
        self.peers.nearest_gateway()
    }

    /// Sequence number the next originated message will carry.
    pub fn sequence_number(&self) -> u16 {
        self.sequence
    }

    /// Periodic housekeeping. Every `heartbeat_interval_ms` this broadcasts a
    /// Heartbeat and evicts stale peers. Routes are aged out here too when
    /// `route_timeout_ms` is configured.
    pub fn on_tick(&mut self, now: u64) -> Vec<Action> {
        let mut actions = Vec::new();
        self.peers.mark_inactive(now, self.config.peer_timeout_ms);
        if now.saturating_sub(self.last_heartbeat) < self.config.heartbeat_interval_ms {
            return actions;
        }

        let payload = protocol::heartbeat_payload(self.peers.len(), self.is_gateway);
        let heartbeat = self.originate(MessageKind::Heartbeat, BROADCAST, 0, payload);
        self.emit(&mut actions, BROADCAST, &heartbeat);
        self.last_heartbeat = now;

        let peers = self.peers.evict_stale(now, self.config.peer_timeout_ms);
        let routes = match self.config.route_timeout_ms {
            Some(timeout) => self.routes.evict_stale(now, timeout),
            None => 0,
        };
        if peers > 0 || routes > 0 {
            info!(peers, routes, "evicted stale entries");
        }
        actions
    }

    /// Broadcast a Discovery announcing the local gateway flag.
    pub fn send_discovery(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        let payload = protocol::discovery_payload(self.is_gateway);
        let msg = self.originate(MessageKind::Discovery, BROADCAST, 0, payload);
        self.emit(&mut actions, BROADCAST, &msg);
        debug!("discovery sent");
        actions
    }

    /// Send application data. Payloads over `MAX_PAYLOAD` are truncated.
    /// Goes through the known next hop, or straight to `destination` when no
    /// route is known.
    pub fn send_data(&mut self, destination: PhysicalAddress, payload: &[u8]) -> Vec<Action> {
        let mut actions = Vec::new();
        if payload.len() > MAX_PAYLOAD {
            debug!(
                len = payload.len(),
                max = MAX_PAYLOAD,
                "truncating outbound payload"
            );
        }
        let payload = payload[..payload.len().min(MAX_PAYLOAD)].to_vec();
        let next_hop = self
            .routes
            .find(&destination)
            .map(|r| r.next_hop)
            .unwrap_or(destination);
        let msg = self.originate(MessageKind::Data, destination, 0, payload);
        self.emit(&mut actions, next_hop, &msg);
        actions
    }

    /// Send data to the nearest known gateway. None if no gateway is known.
    pub fn send_to_gateway(&mut self, payload: &[u8]) -> Option<Vec<Action>> {
        let gateway = self.peers.nearest_gateway()?.address;
        Some(self.send_data(gateway, payload))
    }

    /// Flood a RouteRequest asking who can reach `destination`.
    pub fn send_route_request(&mut self, destination: PhysicalAddress) -> Vec<Action> {
        let mut actions = Vec::new();
        let payload = protocol::route_request_payload(&destination);
        let msg = self.originate(MessageKind::RouteRequest, BROADCAST, 0, payload);
        self.emit(&mut actions, BROADCAST, &msg);
        actions
    }

    /// Process one inbound frame. Never fails: malformed, self-originated and
    /// hop-exhausted traffic is dropped.
    pub fn on_receive(&mut self, bytes: &[u8], now: u64) -> Vec<Action> {
        self.on_receive_with_signal(bytes, DEFAULT_SIGNAL_STRENGTH, now)
    }

    /// Like `on_receive`, recording the link's measured signal strength for new peers.
    pub fn on_receive_with_signal(
        &mut self,
        bytes: &[u8],
        signal_strength: i8,
        now: u64,
    ) -> Vec<Action> {
        let msg = match wire::decode_frame(bytes) {
            Ok(msg) => msg,
            Err(e) => {
                debug!(error = %MeshError::from(e), len = bytes.len(), "dropping frame");
                return Vec::new();
            }
        };
        if msg.source == self.address {
            return Vec::new();
        }
        if msg.source.is_broadcast() {
            debug!("dropping frame with broadcast source");
            return Vec::new();
        }

        self.observe_peer(&msg, signal_strength, now);

        let mut actions = Vec::new();
        match msg.kind {
            MessageKind::Discovery => self.handle_discovery(&msg, now, &mut actions),
            MessageKind::Heartbeat => {}
            MessageKind::Data => self.handle_data(msg, &mut actions),
            MessageKind::RouteRequest => self.handle_route_request(msg, &mut actions),
            MessageKind::RouteReply => self.handle_route_reply(&msg, now),
            MessageKind::Ack => {}
        }
        actions
    }

    // Known peers only get liveness and hop count refreshed; the gateway flag
    // is taken from the first message seen.
    fn observe_peer(&mut self, msg: &Message, signal_strength: i8, now: u64) {
        if self.peers.touch(&msg.source, msg.hop_count, now) {
            return;
        }
        let gateway = msg.gateway_flag();
        let timeout = self.config.peer_timeout_ms;
        let inserted = self
            .peers
            .upsert(msg.source, msg.hop_count, gateway, signal_strength, now)
            .or_else(|_| {
                self.peers.evict_stale(now, timeout);
                self.peers
                    .upsert(msg.source, msg.hop_count, gateway, signal_strength, now)
            });
        match inserted {
            Ok(()) => info!(
                peer = %msg.source,
                gateway,
                hop_count = msg.hop_count,
                "added peer"
            ),
            Err(e) => debug!(peer = %msg.source, error = %MeshError::from(e), "dropping new peer"),
        }
    }

    fn handle_discovery(&mut self, msg: &Message, now: u64, actions: &mut Vec<Action>) {
        debug!(from = %msg.source, hop_count = msg.hop_count, "discovery received");
        if msg.hop_count < self.config.max_discovery_hops {
            let payload = protocol::discovery_payload(self.is_gateway);
            let reply =
                self.originate(MessageKind::Discovery, msg.source, msg.hop_count + 1, payload);
            self.emit(actions, msg.source, &reply);
        }
        self.learn_route(msg.source, msg.source, 1, now);
    }

    fn handle_data(&mut self, mut msg: Message, actions: &mut Vec<Action>) {
        if msg.destination == self.address {
            actions.push(Action::Deliver(msg.source, msg.payload));
            return;
        }
        if msg.hop_count >= self.config.max_hop_count {
            debug!(
                source = %msg.source,
                destination = %msg.destination,
                hop_count = msg.hop_count,
                "hop limit reached, dropping data"
            );
            return;
        }
        msg.hop_count += 1;
        let next_hop = self
            .routes
            .find(&msg.destination)
            .map(|r| r.next_hop)
            .unwrap_or(BROADCAST);
        debug!(
            destination = %msg.destination,
            %next_hop,
            hop_count = msg.hop_count,
            "forwarding data"
        );
        self.emit(actions, next_hop, &msg);
    }

    fn handle_route_request(&mut self, mut msg: Message, actions: &mut Vec<Action>) {
        let Some(target) = protocol::parse_route_request(&msg.payload) else {
            debug!(from = %msg.source, "route request without destination");
            return;
        };
        let hops = if target == self.address {
            Some(1)
        } else {
            self.routes
                .find(&target)
                .map(|r| r.hop_count.saturating_add(1))
        };
        match hops {
            Some(hop_count) => {
                let payload = protocol::route_reply_payload(&target, hop_count);
                let reply = self.originate(MessageKind::RouteReply, msg.source, 0, payload);
                self.emit(actions, msg.source, &reply);
            }
            None if msg.hop_count < self.config.max_hop_count => {
                msg.hop_count += 1;
                self.emit(actions, BROADCAST, &msg);
            }
            None => debug!(%target, "hop limit reached, dropping route request"),
        }
    }

    fn handle_route_reply(&mut self, msg: &Message, now: u64) {
        match protocol::parse_route_reply(&msg.payload) {
            Some((destination, hop_count)) => {
                self.learn_route(destination, msg.source, hop_count, now)
            }
            None => debug!(from = %msg.source, "malformed route reply payload"),
        }
    }

    fn learn_route(
        &mut self,
        destination: PhysicalAddress,
        next_hop: PhysicalAddress,
        hop_count: u8,
        now: u64,
    ) {
        if let Err(e) = self.routes.update(destination, next_hop, hop_count, now) {
            debug!(%destination, error = %MeshError::from(e), "dropping route");
        }
    }

    /// Build a locally originated message with the next sequence number.
    fn originate(
        &mut self,
        kind: MessageKind,
        destination: PhysicalAddress,
        hop_count: u8,
        payload: Vec<u8>,
    ) -> Message {
        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        Message {
            kind,
            source: self.address,
            destination,
            hop_count,
            sequence,
            payload,
        }
    }

    fn emit(&self, actions: &mut Vec<Action>, to: PhysicalAddress, msg: &Message) {
        match wire::encode_frame(msg) {
            Ok(frame) => actions.push(Action::Send(to, frame)),
            Err(e) => warn!(kind = ?msg.kind, error = %e, "failed to encode message"),
        }
    }
}

/// Failure taxonomy. None of these reach callers of the engine's entry
/// points; they are logged and the message or insert is dropped.
#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    #[error("malformed message: {0}")]
    MalformedMessage(#[from] FrameDecodeError),
    #[error(transparent)]
    TableFull(#[from] TableFull),
    #[error("send to {to} failed: {reason}")]
    SendFailed { to: PhysicalAddress, reason: String },
}
