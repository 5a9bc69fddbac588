use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use uabench_transport::UaStream;

use crate::codec::{encode_chunk, Chunk, FrameConfig};
use crate::error::{FrameError, Result};
use crate::reader::transport_to_frame_error;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete message chunks to any `Write` stream.
pub struct ChunkWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> ChunkWriter<T> {
    /// Create a new chunk writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new chunk writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Encode and write a complete chunk (blocking).
    pub fn write_chunk(&mut self, chunk: &Chunk) -> Result<()> {
        if chunk.wire_size() > self.config.max_message_size {
            return Err(FrameError::MessageTooLarge {
                size: chunk.wire_size(),
                max: self.config.max_message_size,
            });
        }

        self.buf.clear();
        encode_chunk(chunk, &mut self.buf)?;
        let encoded = self.buf.split().freeze();
        self.write_encoded(&encoded)
    }

    /// Write bytes that already form one or more complete chunks.
    pub fn write_encoded(&mut self, bytes: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        while offset < bytes.len() {
            match self.inner.write(&bytes[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update maximum message size for subsequent writes.
    pub fn set_max_message_size(&mut self, max_message_size: usize) {
        self.config.max_message_size = max_message_size;
    }

    /// Current chunk writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl ChunkWriter<UaStream> {
    /// Create a chunk writer for `UaStream` and apply write timeout from config.
    pub fn with_config_ua(inner: UaStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}
