//! OPC-UA TCP message framing for the test bench.
//!
//! Every message on an `opc.tcp` connection starts with a fixed header:
//! - 3 ASCII bytes of message type (`HEL`, `ACK`, `ERR`, `OPN`, `MSG`, ...)
//! - 1 ASCII byte of chunk type (`F`, `C` or `A`)
//! - a 4-byte little-endian total message size
//! - for `OPN`/`CLO`/`MSG` only, a 4-byte little-endian secure channel id
//!
//! This crate encodes and decodes that header, the connection-protocol
//! bodies (Hello, Acknowledge, Error) and reads/writes whole chunks. It does
//! not implement secure conversation or service message encoding.

pub mod call;
pub mod codec;
pub mod error;
pub mod header;
pub mod message;
pub mod primitives;
pub mod reader;
pub mod status;
pub mod variant;
pub mod writer;

pub use call::{CallRequest, CallResponse};
pub use codec::{decode_chunk, encode_chunk, Chunk, FrameConfig, DEFAULT_MAX_MESSAGE_SIZE};
pub use error::{FrameError, Result};
pub use header::{
    decode_header, encode_header, ChunkType, Header, MessageType, HEADER_SIZE,
    SECURE_HEADER_SIZE,
};
pub use message::{
    build_error_frame, encode_error, Acknowledge, ErrorMessage, Hello, PROTOCOL_VERSION,
};
pub use reader::ChunkReader;
pub use status::StatusCode;
pub use variant::Variant;
pub use writer::ChunkWriter;
