use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::header::{decode_header, encode_header, ChunkType, Header, MessageType, HEADER_SIZE};

/// Default maximum message size (header included): 16 MiB.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// One complete message chunk: header plus body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub header: Header,
    pub body: Bytes,
}

impl Chunk {
    /// A single-chunk connection-protocol message (`HEL`, `ACK`, `ERR`, ...).
    pub fn single(message_type: MessageType, body: impl Into<Bytes>) -> Result<Self> {
        let body = body.into();
        let header = Header::new(message_type, ChunkType::SINGLE, body_size(&body)?);
        Ok(Self { header, body })
    }

    /// A single-chunk secured message (`OPN`, `CLO`, `MSG`).
    pub fn secured(
        message_type: MessageType,
        secure_channel_id: u32,
        body: impl Into<Bytes>,
    ) -> Result<Self> {
        let body = body.into();
        let header = Header::secured(
            message_type,
            ChunkType::SINGLE,
            secure_channel_id,
            body_size(&body)?,
        );
        Ok(Self { header, body })
    }

    pub fn message_type(&self) -> MessageType {
        self.header.message_type
    }

    /// The total wire size of this chunk (header + body).
    pub fn wire_size(&self) -> usize {
        self.header.encoded_len() + self.body.len()
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.wire_size());
        encode_chunk(self, &mut buf)?;
        Ok(buf.freeze())
    }
}

fn body_size(body: &Bytes) -> Result<u32> {
    u32::try_from(body.len()).map_err(|_| FrameError::MessageTooLarge {
        size: body.len(),
        max: u32::MAX as usize,
    })
}

/// Encode a chunk into the wire format.
///
/// The header's `body_size` must describe the body exactly.
pub fn encode_chunk(chunk: &Chunk, dst: &mut BytesMut) -> Result<()> {
    if chunk.header.body_size as usize != chunk.body.len() {
        return Err(FrameError::BodySizeMismatch {
            announced: chunk.header.body_size,
            actual: chunk.body.len(),
        });
    }
    dst.reserve(chunk.wire_size());
    encode_header(&chunk.header, dst)?;
    dst.put_slice(&chunk.body);
    Ok(())
}

/// Decode a chunk from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete chunk yet.
/// On success, consumes the chunk bytes from the buffer. Unknown tags are
/// reported as soon as the first 8 bytes are available.
pub fn decode_chunk(src: &mut BytesMut, max_message_size: usize) -> Result<Option<Chunk>> {
    if src.len() < HEADER_SIZE {
        return Ok(None); // Need more data
    }

    let tag = [src[0], src[1], src[2]];
    let message_type = MessageType::from_tag(tag).ok_or(FrameError::UnknownMessageType(tag))?;
    if src.len() < message_type.header_len() {
        return Ok(None);
    }

    let header = decode_header(src)?;
    let total = header.encoded_len() + header.body_size as usize;
    if total > max_message_size {
        return Err(FrameError::MessageTooLarge {
            size: total,
            max: max_message_size,
        });
    }
    if src.len() < total {
        return Ok(None); // Need more data
    }

    src.advance(header.encoded_len());
    let body = src.split_to(header.body_size as usize).freeze();

    Ok(Some(Chunk { header, body }))
}

/// Configuration for chunk readers and writers.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum message size in bytes, header included. Default: 16 MiB.
    pub max_message_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
