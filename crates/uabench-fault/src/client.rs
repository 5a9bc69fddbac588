use std::io::ErrorKind;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, warn};
use uabench_frame::{
    Acknowledge, CallRequest, CallResponse, Chunk, ChunkReader, ChunkWriter, ErrorMessage,
    FrameError, MessageType, Variant,
};
use uabench_transport::{endpoint::OPC_TCP_SCHEME, TcpEndpoint, UaStream};

use crate::config::BenchConfig;
use crate::error::{BenchError, Result};
use crate::handshake::handshake_client;

/// Secure channel id the client stamps on its messages.
pub const CLIENT_CHANNEL_ID: u32 = 1;

/// What arrived on a connection while waiting for a fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// An ERR message.
    Error(ErrorMessage),
    /// The connection was closed or reset.
    Closed,
    /// Some other chunk arrived.
    Chunk(MessageType),
    /// Nothing before the timeout.
    Quiet,
}

/// Blocking client for the bench's call framing.
pub struct BenchClient {
    reader: ChunkReader<UaStream>,
    writer: ChunkWriter<UaStream>,
    acknowledge: Acknowledge,
    next_request_id: u32,
}

impl BenchClient {
    /// Connect and complete the HEL/ACK exchange with default settings.
    pub fn connect(addr: &str) -> Result<Self> {
        Self::connect_with_config(addr, &BenchConfig::default())
    }

    pub fn connect_with_config(addr: &str, config: &BenchConfig) -> Result<Self> {
        let stream = TcpEndpoint::connect_timeout(addr, config.handshake_timeout())?;
        let reader_stream = stream.try_clone()?;

        let frame_config = config.frame_config();
        let mut reader = ChunkReader::with_config_ua(reader_stream, frame_config.clone())?;
        let mut writer = ChunkWriter::with_config_ua(stream, frame_config)?;

        let endpoint_url = if addr.starts_with(OPC_TCP_SCHEME) {
            addr.to_string()
        } else {
            format!("{OPC_TCP_SCHEME}{addr}")
        };
        let acknowledge = handshake_client(&mut reader, &mut writer, &endpoint_url, config)?;
        // Never send more than the server said it will take.
        if acknowledge.max_message_size != 0 {
            let limit = (acknowledge.max_message_size as usize).min(writer.config().max_message_size);
            writer.set_max_message_size(limit);
        }
        debug!(endpoint_url, "bench client connected");

        Ok(Self {
            reader,
            writer,
            acknowledge,
            next_request_id: 1,
        })
    }

    /// Limits the server answered the Hello with.
    pub fn acknowledge(&self) -> &Acknowledge {
        &self.acknowledge
    }

    /// Call `method` on `object` and wait for its response.
    ///
    /// A failed call is still `Ok`; check [`CallResponse::status`]. An ERR
    /// message arriving instead is returned as [`BenchError::Rejected`].
    pub fn call(&mut self, object: &str, method: &str, inputs: Vec<Variant>) -> Result<CallResponse> {
        let request_id = self.send_call(object, method, inputs)?;
        let chunk = self.recv_chunk()?;
        match chunk.message_type() {
            MessageType::Message => {
                let response = CallResponse::decode(&chunk.body)?;
                if response.request_id != request_id {
                    return Err(BenchError::Protocol(format!(
                        "response for request {} while waiting for {request_id}",
                        response.request_id
                    )));
                }
                Ok(response)
            }
            MessageType::Error => Err(BenchError::Rejected(ErrorMessage::decode(&chunk.body)?)),
            other => Err(BenchError::UnexpectedMessage {
                expected: MessageType::Message,
                actual: other,
            }),
        }
    }

    /// Send a call request without waiting for the response.
    ///
    /// Returns the request id the response will carry.
    pub fn send_call(&mut self, object: &str, method: &str, inputs: Vec<Variant>) -> Result<u32> {
        let request_id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);

        let request = CallRequest::new(request_id, object, method).with_inputs(inputs);
        self.writer.write_chunk(&request.to_chunk(CLIENT_CHANNEL_ID)?)?;
        Ok(request_id)
    }

    /// Read the next complete chunk, blocking up to the read timeout.
    pub fn recv_chunk(&mut self) -> Result<Chunk> {
        Ok(self.reader.read_chunk()?)
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.reader.get_ref().set_read_timeout(timeout)?;
        Ok(())
    }

    /// Wait up to `timeout` for whatever the server does next.
    pub fn observe(&mut self, timeout: Duration) -> Result<Observation> {
        self.set_read_timeout(Some(timeout))?;
        match self.reader.read_chunk() {
            Ok(chunk) if chunk.message_type() == MessageType::Error => {
                Ok(Observation::Error(ErrorMessage::decode(&chunk.body)?))
            }
            Ok(chunk) => Ok(Observation::Chunk(chunk.message_type())),
            Err(FrameError::ConnectionClosed) => Ok(Observation::Closed),
            Err(FrameError::Io(err)) => match err.kind() {
                ErrorKind::WouldBlock | ErrorKind::TimedOut => Ok(Observation::Quiet),
                ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe => {
                    Ok(Observation::Closed)
                }
                _ => Err(FrameError::Io(err).into()),
            },
            Err(err) => Err(err.into()),
        }
    }

    /// Send `CLO` and drop the connection.
    pub fn close(mut self) -> Result<()> {
        let chunk = Chunk::secured(MessageType::Close, CLIENT_CHANNEL_ID, Bytes::new())?;
        if let Err(err) = self.writer.write_chunk(&chunk) {
            warn!(error = %err, "failed to send CLO");
            return Err(err.into());
        }
        Ok(())
    }
}

impl std::fmt::Debug for BenchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BenchClient")
            .field("peer", &self.reader.get_ref().peer_addr())
            .field("next_request_id", &self.next_request_id)
            .finish()
    }
}
