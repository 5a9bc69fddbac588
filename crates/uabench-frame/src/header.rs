use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Connection-protocol header: type (3) + chunk (1) + size (4) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Header of secured messages: the plain header + secure channel id (4).
pub const SECURE_HEADER_SIZE: usize = HEADER_SIZE + 4;

/// OPC-UA TCP message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Hello,
    Acknowledge,
    Error,
    ReverseHello,
    Open,
    Close,
    Message,
}

impl MessageType {
    pub const ALL: [MessageType; 7] = [
        MessageType::Hello,
        MessageType::Acknowledge,
        MessageType::Error,
        MessageType::ReverseHello,
        MessageType::Open,
        MessageType::Close,
        MessageType::Message,
    ];

    /// The three ASCII bytes written on the wire.
    pub fn tag(self) -> &'static [u8; 3] {
        match self {
            MessageType::Hello => b"HEL",
            MessageType::Acknowledge => b"ACK",
            MessageType::Error => b"ERR",
            MessageType::ReverseHello => b"RHE",
            MessageType::Open => b"OPN",
            MessageType::Close => b"CLO",
            MessageType::Message => b"MSG",
        }
    }

    pub fn from_tag(tag: [u8; 3]) -> Option<Self> {
        Self::ALL.into_iter().find(|t| *t.tag() == tag)
    }

    /// Secured types carry a secure channel id after the message size.
    pub fn is_secured(self) -> bool {
        matches!(
            self,
            MessageType::Open | MessageType::Close | MessageType::Message
        )
    }

    /// Length of the header for this message type.
    pub fn header_len(self) -> usize {
        if self.is_secured() {
            SECURE_HEADER_SIZE
        } else {
            HEADER_SIZE
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Hello => "HEL",
            MessageType::Acknowledge => "ACK",
            MessageType::Error => "ERR",
            MessageType::ReverseHello => "RHE",
            MessageType::Open => "OPN",
            MessageType::Close => "CLO",
            MessageType::Message => "MSG",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OPC-UA chunk types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkType {
    Intermediate,
    Final,
    Abort,
}

impl ChunkType {
    /// A message that is not split across chunks travels as its own final
    /// chunk, so "single" and "final" share the `F` tag.
    pub const SINGLE: ChunkType = ChunkType::Final;

    pub fn tag(self) -> u8 {
        match self {
            ChunkType::Intermediate => b'C',
            ChunkType::Final => b'F',
            ChunkType::Abort => b'A',
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            b'C' => Some(ChunkType::Intermediate),
            b'F' => Some(ChunkType::Final),
            b'A' => Some(ChunkType::Abort),
            _ => None,
        }
    }
}

/// A decoded message header.
///
/// `body_size` counts the bytes after the header. The wire carries the
/// total message size instead; [`encode_header`] and [`decode_header`]
/// convert between the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub message_type: MessageType,
    pub chunk_type: ChunkType,
    pub body_size: u32,
    /// Present exactly when `message_type` is secured.
    pub secure_channel_id: Option<u32>,
}

impl Header {
    /// Header for an unsecured connection-protocol message.
    pub fn new(message_type: MessageType, chunk_type: ChunkType, body_size: u32) -> Self {
        Self {
            message_type,
            chunk_type,
            body_size,
            secure_channel_id: None,
        }
    }

    /// Header for a secured message (`OPN`, `CLO`, `MSG`).
    pub fn secured(
        message_type: MessageType,
        chunk_type: ChunkType,
        secure_channel_id: u32,
        body_size: u32,
    ) -> Self {
        Self {
            message_type,
            chunk_type,
            body_size,
            secure_channel_id: Some(secure_channel_id),
        }
    }

    /// Number of header bytes on the wire.
    pub fn encoded_len(&self) -> usize {
        self.message_type.header_len()
    }

    /// Total message size as written in the size field.
    pub fn message_size(&self) -> Result<u32> {
        let total = self.encoded_len() as u64 + u64::from(self.body_size);
        u32::try_from(total).map_err(|_| FrameError::MessageTooLarge {
            size: total as usize,
            max: u32::MAX as usize,
        })
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        encode_header(self, &mut buf)?;
        Ok(buf.freeze())
    }
}

/// Encode a header into the wire format.
///
/// ```text
/// ┌──────────────┬────────────┬──────────────┬────────────────────┐
/// │ Type (3B)    │ Chunk (1B) │ Size (4B LE) │ Channel id (4B LE) │
/// │ "ERR", "MSG" │ 'F' 'C' 'A'│ header+body  │ OPN/CLO/MSG only   │
/// └──────────────┴────────────┴──────────────┴────────────────────┘
/// ```
pub fn encode_header(header: &Header, dst: &mut BytesMut) -> Result<()> {
    if header.message_type.is_secured() != header.secure_channel_id.is_some() {
        return Err(FrameError::ChannelIdMismatch(header.message_type));
    }
    let size = header.message_size()?;

    dst.reserve(header.encoded_len());
    dst.put_slice(header.message_type.tag());
    dst.put_u8(header.chunk_type.tag());
    dst.put_u32_le(size);
    if let Some(channel_id) = header.secure_channel_id {
        dst.put_u32_le(channel_id);
    }
    Ok(())
}

/// Decode a header from the start of `src`.
///
/// Trailing bytes (the body) are ignored.
pub fn decode_header(src: &[u8]) -> Result<Header> {
    if src.len() < HEADER_SIZE {
        return Err(FrameError::Truncated {
            needed: HEADER_SIZE,
            available: src.len(),
        });
    }

    let tag = [src[0], src[1], src[2]];
    let message_type = MessageType::from_tag(tag).ok_or(FrameError::UnknownMessageType(tag))?;
    let chunk_type = ChunkType::from_tag(src[3]).ok_or(FrameError::UnknownChunkType(src[3]))?;
    let size = u32::from_le_bytes([src[4], src[5], src[6], src[7]]);

    let header_len = message_type.header_len();
    if src.len() < header_len {
        return Err(FrameError::Truncated {
            needed: header_len,
            available: src.len(),
        });
    }
    if (size as usize) < header_len {
        return Err(FrameError::InvalidMessageSize { size, header_len });
    }

    let secure_channel_id = message_type
        .is_secured()
        .then(|| u32::from_le_bytes([src[8], src[9], src[10], src[11]]));

    Ok(Header {
        message_type,
        chunk_type,
        body_size: size - header_len as u32,
        secure_channel_id,
    })
}
