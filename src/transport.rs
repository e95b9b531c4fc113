//! Boundary to the mesh radio.
//!
//! The radio driver itself lives outside this crate; it is consumed through
//! [`MeshConnector`] and [`MeshTransport`]. [`LoopbackMesh`] is an in-process
//! broadcast medium with the same contract, used for local round trips.

use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info};

use crate::error::{ConnectError, SendError};

/// Application port numbers as seen by the radio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortNum {
    TextMessage,
    PrivateApp,
    Other(u32),
}

impl PortNum {
    pub fn number(&self) -> u32 {
        match self {
            PortNum::TextMessage => 1,
            PortNum::PrivateApp => 256,
            PortNum::Other(n) => *n,
        }
    }

    pub fn from_number(n: u32) -> Self {
        match n {
            1 => PortNum::TextMessage,
            256 => PortNum::PrivateApp,
            other => PortNum::Other(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Broadcast,
    Node(String),
}

/// A decoded packet delivered by the radio
#[derive(Debug, Clone)]
pub struct InboundPacket {
    pub from: String,
    pub port: PortNum,
    pub payload: Vec<u8>,
}

/// Callback invoked by the transport for every inbound packet
pub type PacketHandler = Arc<dyn Fn(&InboundPacket) + Send + Sync>;

/// An open connection to a mesh node
pub trait MeshTransport: Send + Sync {
    /// Identifier other nodes see as the origin of our packets
    fn node_id(&self) -> String;

    fn send(&self, payload: &[u8], destination: &Destination, port: PortNum, want_ack: bool) -> Result<(), SendError>;

    fn subscribe(&self, handler: PacketHandler);

    fn disconnect(&self);

    fn is_connected(&self) -> bool;
}

/// Opens transports from a device locator (serial path, host, ...)
pub trait MeshConnector {
    fn connect(&self, device: &str) -> Result<Arc<dyn MeshTransport>, ConnectError>;
}

struct NodeEntry {
    id: String,
    device: String,
    connected: bool,
    handlers: Vec<PacketHandler>,
}

#[derive(Default)]
struct MeshState {
    nodes: Vec<NodeEntry>,
    next_id: u32,
    max_payload: Option<usize>,
}

/// In-process broadcast medium; each `connect` joins a new node
#[derive(Clone, Default)]
pub struct LoopbackMesh {
    state: Arc<Mutex<MeshState>>,
}

impl LoopbackMesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse packets larger than `limit` bytes, like a radio MTU
    pub fn with_max_payload(limit: usize) -> Self {
        let mesh = Self::default();
        mesh.lock().max_payload = Some(limit);
        mesh
    }

    pub fn node_count(&self) -> usize {
        self.lock().nodes.iter().filter(|n| n.connected).count()
    }

    fn lock(&self) -> MutexGuard<'_, MeshState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MeshConnector for LoopbackMesh {
    fn connect(&self, device: &str) -> Result<Arc<dyn MeshTransport>, ConnectError> {
        if device.trim().is_empty() {
            return Err(ConnectError::DeviceNotFound(device.to_string()));
        }

        let mut state = self.lock();
        if state.nodes.iter().any(|n| n.connected && n.device == device) {
            return Err(ConnectError::Failed(format!("{} is already open", device)));
        }

        state.next_id += 1;
        let id = format!("!{:08x}", state.next_id);
        state.nodes.push(NodeEntry {
            id: id.clone(),
            device: device.to_string(),
            connected: true,
            handlers: Vec::new(),
        });
        info!("Loopback node {} attached on {}", id, device);

        Ok(Arc::new(LoopbackNode { id, mesh: self.clone() }))
    }
}

/// One node on a [`LoopbackMesh`]
pub struct LoopbackNode {
    id: String,
    mesh: LoopbackMesh,
}

impl MeshTransport for LoopbackNode {
    fn node_id(&self) -> String {
        self.id.clone()
    }

    fn send(&self, payload: &[u8], destination: &Destination, port: PortNum, _want_ack: bool) -> Result<(), SendError> {
        let recipients: Vec<PacketHandler> = {
            let state = self.mesh.lock();
            let me = state.nodes.iter().find(|n| n.id == self.id);
            if !me.map(|n| n.connected).unwrap_or(false) {
                return Err(SendError::NotConnected);
            }
            if let Some(limit) = state.max_payload {
                if payload.len() > limit {
                    return Err(SendError::TooLarge(payload.len()));
                }
            }
            state
                .nodes
                .iter()
                .filter(|n| n.connected && n.id != self.id)
                .filter(|n| match destination {
                    Destination::Broadcast => true,
                    Destination::Node(id) => &n.id == id,
                })
                .flat_map(|n| n.handlers.iter().cloned())
                .collect()
        };

        debug!("{} -> {:?} port {}: {} bytes", self.id, destination, port.number(), payload.len());

        let packet = InboundPacket { from: self.id.clone(), port, payload: payload.to_vec() };
        for handler in recipients {
            handler(&packet);
        }
        Ok(())
    }

    fn subscribe(&self, handler: PacketHandler) {
        let mut state = self.mesh.lock();
        if let Some(node) = state.nodes.iter_mut().find(|n| n.id == self.id) {
            node.handlers.push(handler);
        }
    }

    fn disconnect(&self) {
        let mut state = self.mesh.lock();
        if let Some(node) = state.nodes.iter_mut().find(|n| n.id == self.id) {
            node.connected = false;
            node.handlers.clear();
            info!("Loopback node {} detached", self.id);
        }
    }

    fn is_connected(&self) -> bool {
        self.mesh
            .lock()
            .nodes
            .iter()
            .any(|n| n.id == self.id && n.connected)
    }
}
