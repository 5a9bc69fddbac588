use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use uabench_transport::UaStream;

use crate::codec::{decode_chunk, Chunk, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete message chunks from any `Read` stream.
///
/// Handles partial reads internally, so callers always get complete chunks.
pub struct ChunkReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> ChunkReader<T> {
    /// Create a new chunk reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new chunk reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete chunk (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_chunk(&mut self) -> Result<Chunk> {
        loop {
            if let Some(chunk) = decode_chunk(&mut self.buf, self.config.max_message_size)? {
                return Ok(chunk);
            }

            let mut scratch = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut scratch) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&scratch[..read]);
        }
    }

    /// Return the next chunk if one can be assembled without blocking.
    ///
    /// Intended for non-blocking streams: `WouldBlock` yields `Ok(None)`
    /// and any partial data stays buffered for the next call.
    pub fn poll_chunk(&mut self) -> Result<Option<Chunk>> {
        loop {
            if let Some(chunk) = decode_chunk(&mut self.buf, self.config.max_message_size)? {
                return Ok(Some(chunk));
            }

            let mut scratch = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut scratch) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(None),
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&scratch[..read]);
        }
    }

    /// Bytes received but not yet assembled into a chunk.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update maximum message size for subsequent decoding.
    pub fn set_max_message_size(&mut self, max_message_size: usize) {
        self.config.max_message_size = max_message_size;
    }

    /// Current chunk reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl ChunkReader<UaStream> {
    /// Create a chunk reader for `UaStream` and apply read timeout from config.
    pub fn with_config_ua(inner: UaStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn transport_to_frame_error(err: uabench_transport::TransportError) -> FrameError {
    match err {
        uabench_transport::TransportError::Io(io)
        | uabench_transport::TransportError::Accept(io) => FrameError::Io(io),
        uabench_transport::TransportError::Bind { source, .. }
        | uabench_transport::TransportError::Connect { source, .. } => FrameError::Io(source),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}
