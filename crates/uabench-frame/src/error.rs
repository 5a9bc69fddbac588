use crate::header::MessageType;

/// Errors that can occur during message encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Fewer bytes than the structure being decoded requires.
    #[error("truncated input ({available} bytes, need {needed})")]
    Truncated { needed: usize, available: usize },

    /// The header carries a message type tag this codec does not know.
    #[error("unknown message type {0:?}")]
    UnknownMessageType([u8; 3]),

    /// The header carries a chunk type tag this codec does not know.
    #[error("unknown chunk type 0x{0:02x}")]
    UnknownChunkType(u8),

    /// The message size field is smaller than the header itself.
    #[error("message size {size} is smaller than the {header_len}-byte header")]
    InvalidMessageSize { size: u32, header_len: usize },

    /// A secured message type without a secure channel id, or the reverse.
    #[error("secure channel id presence does not match message type {0}")]
    ChannelIdMismatch(MessageType),

    /// The header body size disagrees with the body that follows it.
    #[error("header announces {announced} body bytes but {actual} follow")]
    BodySizeMismatch { announced: u32, actual: usize },

    /// The message exceeds the configured maximum size.
    #[error("message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// A string length prefix is negative but not the null marker.
    #[error("invalid string length {0}")]
    InvalidStringLength(i32),

    /// A string does not fit the signed 32-bit length prefix.
    #[error("string too long to encode ({0} bytes)")]
    StringTooLong(usize),

    /// A string payload is not valid UTF-8.
    #[error("string is not valid UTF-8")]
    InvalidString(#[from] std::string::FromUtf8Error),

    /// A variant with an encoding this codec does not handle.
    #[error("unsupported variant encoding 0x{0:02x}")]
    UnsupportedVariant(u8),

    /// An I/O error occurred while reading or writing chunks.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete chunk was received.
    #[error("connection closed (incomplete chunk)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
