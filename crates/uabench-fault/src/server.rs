//! Single-threaded bench server loop.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use bytes::Bytes;
use tracing::{debug, info, warn};
use uabench_frame::{Chunk, ChunkReader, ErrorMessage, FrameError, StatusCode};
use uabench_transport::{TcpEndpoint, TransportError, UaStream};

use crate::config::BenchConfig;
use crate::deferred::{deferred_queue, DeferredQueue, DeferredScheduler};
use crate::error::{BenchError, Result};
use crate::handshake::accept_hello;
use crate::method::MethodRegistry;
use crate::registry::{TransportId, TransportRegistry};
use crate::simulator::FaultSimulator;
use crate::stack::BenchCallStack;

/// What the server should do after a chunk was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Nothing,
    /// Write these encoded bytes to the requesting transport.
    Send(Bytes),
    /// Write, then close the connection.
    SendAndClose(Bytes),
    /// Close without writing.
    Close,
}

/// Service layer sitting above the connection protocol.
///
/// Called once per complete chunk received on an established connection.
pub trait ServiceStack: Send {
    fn handle_chunk(
        &mut self,
        transport: TransportId,
        chunk: &Chunk,
        methods: &MethodRegistry,
    ) -> Result<Reply>;
}

/// Counters for one loop iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollOutcome {
    pub accepted: usize,
    pub chunks: usize,
    pub closed: usize,
    pub deferred: usize,
}

impl PollOutcome {
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

enum Stage {
    /// Connected, waiting for HEL. Owns the write half until the ACK is out.
    AwaitingHello { writer: UaStream, since: Instant },
    Open(TransportId),
}

struct Connection {
    peer: SocketAddr,
    reader: ChunkReader<UaStream>,
    stage: Stage,
}

impl Connection {
    fn transport(&self) -> Option<TransportId> {
        match self.stage {
            Stage::Open(id) => Some(id),
            Stage::AwaitingHello { .. } => None,
        }
    }
}

enum Disposition {
    Keep,
    Close,
}

/// What is left of a connection after it was serviced.
enum Serviced {
    Keep(Connection),
    Closed {
        peer: SocketAddr,
        transport: Option<TransportId>,
    },
}

impl Serviced {
    fn closed(conn: &Connection) -> Self {
        Serviced::Closed {
            peer: conn.peer,
            transport: conn.transport(),
        }
    }
}

/// OPC-UA bench endpoint with the fault methods registered.
///
/// Each [`BenchServer::poll_once`] accepts new connections, answers every
/// complete chunk, and only then drains the deferred queue.
pub struct BenchServer {
    endpoint: TcpEndpoint,
    config: BenchConfig,
    registry: TransportRegistry,
    queue: DeferredQueue,
    scheduler: DeferredScheduler,
    simulator: FaultSimulator,
    methods: MethodRegistry,
    stack: Box<dyn ServiceStack>,
    connections: Vec<Connection>,
}

impl BenchServer {
    /// Bind `addr` with the bundled [`BenchCallStack`].
    pub fn bind(addr: &str, config: BenchConfig) -> Result<Self> {
        Self::with_stack(addr, config, Box::new(BenchCallStack::new()))
    }

    /// Bind `addr` with a custom service stack.
    pub fn with_stack(
        addr: &str,
        config: BenchConfig,
        stack: Box<dyn ServiceStack>,
    ) -> Result<Self> {
        config.validate()?;
        let endpoint = TcpEndpoint::bind(addr)?;
        endpoint.set_nonblocking(true)?;

        let (scheduler, queue) = deferred_queue();
        let simulator = FaultSimulator::new(scheduler.clone(), config.fault_reason.clone());
        let mut methods = MethodRegistry::new();
        simulator.register_methods(&mut methods);

        info!(
            endpoint = %endpoint.endpoint_url(),
            methods = methods.len(),
            "bench server ready"
        );

        Ok(Self {
            endpoint,
            config,
            registry: TransportRegistry::new(),
            queue,
            scheduler,
            simulator,
            methods,
            stack,
            connections: Vec::new(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.endpoint.local_addr()
    }

    pub fn endpoint_url(&self) -> String {
        self.endpoint.endpoint_url()
    }

    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    pub fn fault_simulator(&self) -> &FaultSimulator {
        &self.simulator
    }

    /// Scheduler for additional methods that need deferred work.
    pub fn scheduler(&self) -> DeferredScheduler {
        self.scheduler.clone()
    }

    pub fn methods(&self) -> &MethodRegistry {
        &self.methods
    }

    pub fn methods_mut(&mut self) -> &mut MethodRegistry {
        &mut self.methods
    }

    /// Transports that completed the handshake.
    pub fn registry(&self) -> &TransportRegistry {
        &self.registry
    }

    /// All open connections, including ones still in the handshake.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Run one loop iteration without blocking.
    pub fn poll_once(&mut self) -> Result<PollOutcome> {
        let mut outcome = PollOutcome {
            accepted: self.accept_pending()?,
            ..PollOutcome::default()
        };

        let (chunks, closed) = self.service_connections();
        outcome.chunks = chunks;
        outcome.closed = closed;

        // Everything read above has been answered; faults go out after.
        outcome.deferred = self.queue.run_ready(&mut self.registry);
        Ok(outcome)
    }

    /// Loop until `stop` is set, sleeping between idle iterations.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<()> {
        info!(endpoint = %self.endpoint_url(), "bench server running");
        while !stop.load(Ordering::SeqCst) {
            if self.poll_once()?.is_idle() {
                std::thread::sleep(self.config.poll_interval());
            }
        }
        info!(
            connections = self.connections.len(),
            "bench server stopped"
        );
        Ok(())
    }

    fn accept_pending(&mut self) -> Result<usize> {
        let mut accepted = 0;
        loop {
            let stream = match self.endpoint.try_accept() {
                Ok(Some(stream)) => stream,
                Ok(None) => break,
                Err(TransportError::Accept(err)) => {
                    warn!(error = %err, "accept failed");
                    break;
                }
                Err(err) => return Err(err.into()),
            };
            accepted += 1;

            let peer = stream.peer_addr();
            if self.connections.len() >= self.config.max_connections {
                warn!(%peer, limit = self.config.max_connections, "connection limit reached");
                let mut stream = stream;
                refuse(&mut stream, StatusCode::BAD_TCP_SERVER_TOO_BUSY, "connection limit reached");
                continue;
            }

            match self.open_connection(stream) {
                Ok(conn) => {
                    info!(%peer, "client connected");
                    self.connections.push(conn);
                }
                Err(err) => warn!(%peer, error = %err, "failed to set up connection"),
            }
        }
        Ok(accepted)
    }

    fn open_connection(&self, stream: UaStream) -> Result<Connection> {
        stream.set_nonblocking(true)?;
        // Bounds how long one write may hold the loop on a peer that
        // stopped reading.
        stream.set_write_timeout(self.config.frame_config().write_timeout)?;
        let reader_stream = stream.try_clone()?;
        let reader = ChunkReader::with_config(reader_stream, self.config.frame_config());
        Ok(Connection {
            peer: stream.peer_addr(),
            reader,
            stage: Stage::AwaitingHello {
                writer: stream,
                since: Instant::now(),
            },
        })
    }

    fn service_connections(&mut self) -> (usize, usize) {
        let Self {
            config,
            registry,
            methods,
            stack,
            connections,
            ..
        } = self;

        let mut chunks = 0;
        let mut closed = 0;
        for conn in std::mem::take(connections) {
            match service(conn, config, registry, methods, &mut **stack, &mut chunks) {
                Serviced::Keep(conn) => connections.push(conn),
                Serviced::Closed { peer, transport } => {
                    if let Some(id) = transport {
                        registry.remove(id);
                    }
                    info!(%peer, "client disconnected");
                    closed += 1;
                }
            }
        }
        (chunks, closed)
    }
}

fn service(
    mut conn: Connection,
    config: &BenchConfig,
    registry: &mut TransportRegistry,
    methods: &MethodRegistry,
    stack: &mut dyn ServiceStack,
    chunks: &mut usize,
) -> Serviced {
    loop {
        let chunk = match conn.reader.poll_chunk() {
            Ok(Some(chunk)) => chunk,
            Ok(None) => return check_handshake_deadline(conn, config),
            Err(FrameError::ConnectionClosed) => {
                debug!(peer = %conn.peer, "peer closed connection");
                return Serviced::closed(&conn);
            }
            Err(FrameError::Io(err)) => {
                debug!(peer = %conn.peer, error = %err, "connection lost");
                return Serviced::closed(&conn);
            }
            Err(err) => {
                warn!(peer = %conn.peer, error = %err, "undecodable chunk");
                let status = match err {
                    FrameError::MessageTooLarge { .. } => StatusCode::BAD_TCP_MESSAGE_TOO_LARGE,
                    FrameError::UnknownMessageType(_) | FrameError::UnknownChunkType(_) => {
                        StatusCode::BAD_TCP_MESSAGE_TYPE_INVALID
                    }
                    _ => StatusCode::BAD_DECODING_ERROR,
                };
                send_error(&mut conn, registry, status, &err.to_string());
                return Serviced::closed(&conn);
            }
        };
        *chunks += 1;

        conn = match conn.stage {
            Stage::AwaitingHello { writer, .. } => {
                let Some(id) = complete_handshake(conn.peer, writer, &chunk, config, registry) else {
                    return Serviced::Closed {
                        peer: conn.peer,
                        transport: None,
                    };
                };
                conn.reader.set_max_message_size(config.max_message_size as usize);
                Connection {
                    peer: conn.peer,
                    reader: conn.reader,
                    stage: Stage::Open(id),
                }
            }
            Stage::Open(id) => match dispatch(conn.peer, id, &chunk, registry, methods, stack) {
                Disposition::Keep => conn,
                Disposition::Close => return Serviced::closed(&conn),
            },
        };
    }
}

fn check_handshake_deadline(conn: Connection, config: &BenchConfig) -> Serviced {
    let expired = matches!(
        &conn.stage,
        Stage::AwaitingHello { since, .. } if since.elapsed() > config.handshake_timeout()
    );
    if expired {
        warn!(peer = %conn.peer, "no HEL within handshake timeout");
        return Serviced::closed(&conn);
    }
    Serviced::Keep(conn)
}

/// Answer the HEL and register the transport once the ACK is out.
fn complete_handshake(
    peer: SocketAddr,
    mut writer: UaStream,
    chunk: &Chunk,
    config: &BenchConfig,
    registry: &mut TransportRegistry,
) -> Option<TransportId> {
    let ack = match accept_hello(chunk, config) {
        Ok(result) => result.acknowledge,
        Err(rejection) => {
            warn!(%peer, status = %rejection.status, "hello rejected");
            write_message(&mut writer, &rejection);
            return None;
        }
    };

    let written = ack
        .to_chunk()
        .and_then(|chunk| chunk.to_bytes())
        .map_err(BenchError::from)
        .and_then(|bytes| writer.write_raw(&bytes).map_err(BenchError::from));
    if let Err(err) = written {
        warn!(%peer, error = %err, "failed to send ACK");
        return None;
    }

    let id = registry.insert(Box::new(writer));
    info!(%peer, transport = %id, "connection established");
    Some(id)
}

fn dispatch(
    peer: SocketAddr,
    id: TransportId,
    chunk: &Chunk,
    registry: &mut TransportRegistry,
    methods: &MethodRegistry,
    stack: &mut dyn ServiceStack,
) -> Disposition {
    let reply = match stack.handle_chunk(id, chunk, methods) {
        Ok(reply) => reply,
        Err(err) => {
            warn!(%peer, transport = %id, error = %err, "service stack failed");
            let status = match err {
                BenchError::Frame(_) => StatusCode::BAD_DECODING_ERROR,
                _ => StatusCode::BAD_TCP_INTERNAL_ERROR,
            };
            let frame = ErrorMessage::new(status, Some(&err.to_string())).to_frame();
            match frame {
                Ok(frame) => Reply::SendAndClose(frame),
                Err(_) => Reply::Close,
            }
        }
    };

    let (bytes, then_close) = match reply {
        Reply::Nothing => return Disposition::Keep,
        Reply::Close => return Disposition::Close,
        Reply::Send(bytes) => (bytes, false),
        Reply::SendAndClose(bytes) => (bytes, true),
    };

    let Some(entry) = registry.get_mut(id) else {
        return Disposition::Close;
    };
    if let Err(err) = entry.transport_mut().write_raw(&bytes) {
        debug!(%peer, transport = %id, error = %err, "failed to write response");
        return Disposition::Close;
    }
    if then_close {
        Disposition::Close
    } else {
        Disposition::Keep
    }
}

fn send_error(
    conn: &mut Connection,
    registry: &mut TransportRegistry,
    status: StatusCode,
    reason: &str,
) {
    let message = ErrorMessage::new(status, Some(reason));
    match &mut conn.stage {
        Stage::AwaitingHello { writer, .. } => write_message(writer, &message),
        Stage::Open(id) => {
            let Some(entry) = registry.get_mut(*id) else {
                return;
            };
            match message.to_frame() {
                Ok(frame) => {
                    if let Err(err) = entry.transport_mut().write_raw(&frame) {
                        debug!(peer = %conn.peer, transport = %id, error = %err, "failed to send ERR");
                    }
                }
                Err(err) => warn!(error = %err, "failed to encode ERR"),
            }
        }
    }
}

fn write_message(stream: &mut UaStream, message: &ErrorMessage) {
    match message.to_frame() {
        Ok(frame) => {
            if let Err(err) = stream.write_raw(&frame) {
                debug!(peer = %stream.peer_addr(), error = %err, "failed to send ERR");
            }
        }
        Err(err) => warn!(error = %err, "failed to encode ERR"),
    }
}

fn refuse(stream: &mut UaStream, status: StatusCode, reason: &str) {
    write_message(stream, &ErrorMessage::new(status, Some(reason)));
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use uabench_frame::{Hello, MessageType};

    use super::*;

    fn bind() -> BenchServer {
        BenchServer::bind("127.0.0.1:0", BenchConfig::default()).unwrap()
    }

    fn poll_until(server: &mut BenchServer, mut done: impl FnMut(&BenchServer) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done(&*server) {
            assert!(Instant::now() < deadline, "server did not reach expected state");
            server.poll_once().unwrap();
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Poll until some connection has been closed.
    fn wait_for_disconnect(server: &mut BenchServer) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while server.poll_once().unwrap().closed == 0 {
            assert!(Instant::now() < deadline, "connection was never closed");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn hello_bytes(server: &BenchServer, protocol_version: u32) -> Bytes {
        let hello = Hello {
            protocol_version,
            receive_buffer_size: 8192,
            send_buffer_size: 8192,
            max_message_size: 0,
            max_chunk_count: 0,
            endpoint_url: Some(server.endpoint_url()),
        };
        hello.to_chunk().unwrap().to_bytes().unwrap()
    }

    /// Complete the handshake and return the raw stream plus a reader on it.
    fn open_client(server: &mut BenchServer) -> (UaStream, ChunkReader<UaStream>) {
        let mut client = TcpEndpoint::connect(&server.local_addr().to_string()).unwrap();
        client.write_raw(&hello_bytes(server, 0)).unwrap();
        let registered = server.registry().len() + 1;
        poll_until(server, |s| s.registry().len() == registered);

        let mut reader = ChunkReader::new(client.try_clone().unwrap());
        assert_eq!(
            reader.read_chunk().unwrap().message_type(),
            MessageType::Acknowledge
        );
        (client, reader)
    }

    #[test]
    fn fault_methods_are_registered() {
        let server = bind();
        for kind in crate::simulator::FaultKind::ALL {
            assert!(server.methods().contains(kind.method_name()));
        }
    }

    #[test]
    fn idle_poll_does_nothing() {
        let mut server = bind();
        assert!(server.poll_once().unwrap().is_idle());
    }

    #[test]
    fn transport_registered_only_after_hello() {
        let mut server = bind();
        let mut client = TcpEndpoint::connect(&server.local_addr().to_string()).unwrap();

        poll_until(&mut server, |s| s.connection_count() == 1);
        assert!(server.registry().is_empty());

        let hello = Hello {
            protocol_version: 0,
            receive_buffer_size: 8192,
            send_buffer_size: 8192,
            max_message_size: 0,
            max_chunk_count: 0,
            endpoint_url: Some(server.endpoint_url()),
        };
        client
            .write_raw(&hello.to_chunk().unwrap().to_bytes().unwrap())
            .unwrap();
        poll_until(&mut server, |s| s.registry().len() == 1);

        let mut reader = ChunkReader::new(client);
        let ack = reader.read_chunk().unwrap();
        assert_eq!(ack.message_type(), MessageType::Acknowledge);
    }

    #[test]
    fn missing_hello_times_out() {
        let config = BenchConfig {
            handshake_timeout_ms: 20,
            ..BenchConfig::default()
        };
        let mut server = BenchServer::bind("127.0.0.1:0", config).unwrap();
        let _client = TcpEndpoint::connect(&server.local_addr().to_string()).unwrap();

        poll_until(&mut server, |s| s.connection_count() == 1);
        std::thread::sleep(Duration::from_millis(40));
        poll_until(&mut server, |s| s.connection_count() == 0);
    }

    #[test]
    fn connection_limit_refuses_with_err() {
        let config = BenchConfig {
            max_connections: 1,
            ..BenchConfig::default()
        };
        let mut server = BenchServer::bind("127.0.0.1:0", config).unwrap();
        let addr = server.local_addr().to_string();
        let _first = TcpEndpoint::connect(&addr).unwrap();
        poll_until(&mut server, |s| s.connection_count() == 1);

        let second = TcpEndpoint::connect(&addr).unwrap();
        second
            .set_read_timeout(Some(Duration::from_millis(20)))
            .unwrap();
        let mut reader = ChunkReader::new(second);
        let chunk = loop {
            server.poll_once().unwrap();
            match reader.read_chunk() {
                Ok(chunk) => break chunk,
                Err(FrameError::Io(err))
                    if matches!(
                        err.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) =>
                {
                    continue
                }
                Err(err) => panic!("unexpected error: {err}"),
            }
        };
        let message = ErrorMessage::decode(&chunk.body).unwrap();
        assert_eq!(message.status, StatusCode::BAD_TCP_SERVER_TOO_BUSY);
        assert_eq!(server.connection_count(), 1);
    }

    #[test]
    fn rejected_hello_is_never_registered() {
        let config = BenchConfig {
            protocol_version: 1,
            ..BenchConfig::default()
        };
        let mut server = BenchServer::bind("127.0.0.1:0", config).unwrap();
        let mut client = TcpEndpoint::connect(&server.local_addr().to_string()).unwrap();
        client.write_raw(&hello_bytes(&server, 0)).unwrap();

        wait_for_disconnect(&mut server);
        assert_eq!(server.connection_count(), 0);
        assert!(server.registry().is_empty());

        let chunk = ChunkReader::new(client).read_chunk().unwrap();
        let message = ErrorMessage::decode(&chunk.body).unwrap();
        assert_eq!(message.status, StatusCode::BAD_PROTOCOL_VERSION_UNSUPPORTED);
    }

    #[test]
    fn hello_and_close_in_one_write_leaves_no_transport() {
        let mut server = bind();
        let mut client = TcpEndpoint::connect(&server.local_addr().to_string()).unwrap();
        let close = Chunk::secured(MessageType::Close, 1, Bytes::new())
            .unwrap()
            .to_bytes()
            .unwrap();
        let mut wire = hello_bytes(&server, 0).to_vec();
        wire.extend_from_slice(&close);
        client.write_raw(&wire).unwrap();

        wait_for_disconnect(&mut server);
        assert_eq!(server.connection_count(), 0);
        assert!(server.registry().is_empty());
    }

    #[test]
    fn garbage_after_handshake_gets_err_and_close() {
        let mut server = bind();
        let (mut client, mut reader) = open_client(&mut server);

        client.write_raw(b"XYZF\x08\x00\x00\x00").unwrap();
        poll_until(&mut server, |s| s.registry().is_empty());
        assert_eq!(server.connection_count(), 0);

        let chunk = reader.read_chunk().unwrap();
        assert_eq!(chunk.message_type(), MessageType::Error);
        let message = ErrorMessage::decode(&chunk.body).unwrap();
        assert_eq!(message.status, StatusCode::BAD_TCP_MESSAGE_TYPE_INVALID);
    }
}
