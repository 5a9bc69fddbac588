use std::fmt;

use tracing::debug;
use uabench_transport::{Result as TransportResult, UaStream};

/// Identifier the server assigns to a transport when it is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransportId(pub u64);

impl fmt::Display for TransportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport-{}", self.0)
    }
}

/// Raw access to a live client transport.
///
/// This bypasses all protocol encoding: whatever bytes are handed to
/// [`RawTransport::write_raw`] go to the socket as-is.
pub trait RawTransport: Send {
    /// Human-readable peer description for logs.
    fn peer_label(&self) -> String;

    /// Write pre-encoded bytes and flush.
    fn write_raw(&mut self, bytes: &[u8]) -> TransportResult<()>;

    /// Abrupt teardown without any protocol close exchange.
    fn force_close(&mut self) -> TransportResult<()>;
}

impl RawTransport for UaStream {
    fn peer_label(&self) -> String {
        self.peer_addr().to_string()
    }

    fn write_raw(&mut self, bytes: &[u8]) -> TransportResult<()> {
        UaStream::write_raw(self, bytes)
    }

    fn force_close(&mut self) -> TransportResult<()> {
        UaStream::force_close(self)
    }
}

/// A transport entry in the registry.
pub struct RegisteredTransport {
    id: TransportId,
    transport: Box<dyn RawTransport>,
}

impl RegisteredTransport {
    pub fn id(&self) -> TransportId {
        self.id
    }

    pub fn transport_mut(&mut self) -> &mut dyn RawTransport {
        self.transport.as_mut()
    }

    pub fn peer_label(&self) -> String {
        self.transport.peer_label()
    }
}

impl fmt::Debug for RegisteredTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredTransport")
            .field("id", &self.id)
            .field("peer", &self.transport.peer_label())
            .finish()
    }
}

/// The live transports of a running server, in registration order.
///
/// Owned by the server loop. Deferred tasks borrow it for the duration of
/// a single execution and never keep references past that.
#[derive(Debug, Default)]
pub struct TransportRegistry {
    entries: Vec<RegisteredTransport>,
    next_id: u64,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transport and return its id.
    pub fn insert(&mut self, transport: Box<dyn RawTransport>) -> TransportId {
        self.next_id += 1;
        let id = TransportId(self.next_id);
        debug!(transport = %id, peer = %transport.peer_label(), "transport registered");
        self.entries.push(RegisteredTransport { id, transport });
        id
    }

    /// Remove a transport, returning its handle if it was registered.
    pub fn remove(&mut self, id: TransportId) -> Option<Box<dyn RawTransport>> {
        let idx = self.entries.iter().position(|e| e.id == id)?;
        let entry = self.entries.remove(idx);
        debug!(transport = %id, "transport unregistered");
        Some(entry.transport)
    }

    pub fn get_mut(&mut self, id: TransportId) -> Option<&mut RegisteredTransport> {
        self.entries.iter_mut().find(|e| e.id == id)
    }

    /// The earliest registered transport still active.
    pub fn first_mut(&mut self) -> Option<&mut RegisteredTransport> {
        self.entries.first_mut()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut RegisteredTransport> + '_ {
        self.entries.iter_mut()
    }

    pub fn ids(&self) -> Vec<TransportId> {
        self.entries.iter().map(|e| e.id).collect()
    }

    pub fn contains(&self, id: TransportId) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
