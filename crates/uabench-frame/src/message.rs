//! Connection-protocol message bodies: Hello, Acknowledge and Error.

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::Chunk;
use crate::error::{FrameError, Result};
use crate::header::{encode_header, ChunkType, Header, MessageType};
use crate::primitives::{get_u32, get_ua_string, put_ua_string, ua_string_len};
use crate::status::StatusCode;

/// Connection protocol version spoken by the bench.
pub const PROTOCOL_VERSION: u32 = 0;

/// An ERR message: status code plus an optional human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMessage {
    pub status: StatusCode,
    pub reason: Option<String>,
}

impl ErrorMessage {
    pub fn new(status: StatusCode, reason: Option<&str>) -> Self {
        Self {
            status,
            reason: reason.map(str::to_string),
        }
    }

    /// Exact byte length of the encoded body.
    pub fn body_len(&self) -> usize {
        4 + ua_string_len(self.reason.as_deref())
    }

    pub fn encode_body(&self, dst: &mut BytesMut) -> Result<()> {
        dst.reserve(self.body_len());
        dst.put_u32_le(self.status.bits());
        put_ua_string(dst, self.reason.as_deref())
    }

    /// Decode an ERR body (the bytes after the header).
    pub fn decode(body: &[u8]) -> Result<Self> {
        let mut src = body;
        let status = StatusCode(get_u32(&mut src)?);
        let reason = get_ua_string(&mut src)?;
        Ok(Self { status, reason })
    }

    /// Header plus body, ready to be written to a transport.
    pub fn to_frame(&self) -> Result<Bytes> {
        let mut body = BytesMut::with_capacity(self.body_len());
        self.encode_body(&mut body)?;

        let body_size = u32::try_from(body.len()).map_err(|_| FrameError::MessageTooLarge {
            size: body.len(),
            max: u32::MAX as usize,
        })?;
        let header = Header::new(MessageType::Error, ChunkType::SINGLE, body_size);

        let mut frame = BytesMut::with_capacity(header.encoded_len() + body.len());
        encode_header(&header, &mut frame)?;
        frame.put_slice(&body);
        Ok(frame.freeze())
    }
}

/// Encode an ERR body: status (4 bytes LE) + length-prefixed reason.
pub fn encode_error(status: StatusCode, reason: Option<&str>) -> Result<Bytes> {
    let message = ErrorMessage::new(status, reason);
    let mut body = BytesMut::with_capacity(message.body_len());
    message.encode_body(&mut body)?;
    Ok(body.freeze())
}

/// Build the complete ERR frame written to the wire for an injected fault.
pub fn build_error_frame(status: StatusCode, reason: Option<&str>) -> Result<Bytes> {
    ErrorMessage::new(status, reason).to_frame()
}

/// HEL body sent by a client to open a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    pub protocol_version: u32,
    pub receive_buffer_size: u32,
    pub send_buffer_size: u32,
    /// `0` means no limit.
    pub max_message_size: u32,
    /// `0` means no limit.
    pub max_chunk_count: u32,
    pub endpoint_url: Option<String>,
}

impl Hello {
    pub fn encode_body(&self, dst: &mut BytesMut) -> Result<()> {
        dst.reserve(20 + ua_string_len(self.endpoint_url.as_deref()));
        dst.put_u32_le(self.protocol_version);
        dst.put_u32_le(self.receive_buffer_size);
        dst.put_u32_le(self.send_buffer_size);
        dst.put_u32_le(self.max_message_size);
        dst.put_u32_le(self.max_chunk_count);
        put_ua_string(dst, self.endpoint_url.as_deref())
    }

    pub fn decode(body: &[u8]) -> Result<Self> {
        let mut src = body;
        Ok(Self {
            protocol_version: get_u32(&mut src)?,
            receive_buffer_size: get_u32(&mut src)?,
            send_buffer_size: get_u32(&mut src)?,
            max_message_size: get_u32(&mut src)?,
            max_chunk_count: get_u32(&mut src)?,
            endpoint_url: get_ua_string(&mut src)?,
        })
    }

    pub fn to_chunk(&self) -> Result<Chunk> {
        let mut body = BytesMut::new();
        self.encode_body(&mut body)?;
        Chunk::single(MessageType::Hello, body.freeze())
    }
}

/// ACK body the server answers a Hello with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acknowledge {
    pub protocol_version: u32,
    pub receive_buffer_size: u32,
    pub send_buffer_size: u32,
    pub max_message_size: u32,
    pub max_chunk_count: u32,
}

impl Acknowledge {
    pub const BODY_LEN: usize = 20;

    pub fn encode_body(&self, dst: &mut BytesMut) {
        dst.reserve(Self::BODY_LEN);
        dst.put_u32_le(self.protocol_version);
        dst.put_u32_le(self.receive_buffer_size);
        dst.put_u32_le(self.send_buffer_size);
        dst.put_u32_le(self.max_message_size);
        dst.put_u32_le(self.max_chunk_count);
    }

    pub fn decode(body: &[u8]) -> Result<Self> {
        let mut src = body;
        Ok(Self {
            protocol_version: get_u32(&mut src)?,
            receive_buffer_size: get_u32(&mut src)?,
            send_buffer_size: get_u32(&mut src)?,
            max_message_size: get_u32(&mut src)?,
            max_chunk_count: get_u32(&mut src)?,
        })
    }

    pub fn to_chunk(&self) -> Result<Chunk> {
        let mut body = BytesMut::with_capacity(Self::BODY_LEN);
        self.encode_body(&mut body);
        Chunk::single(MessageType::Acknowledge, body.freeze())
    }
}
