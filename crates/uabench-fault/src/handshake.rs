//! HEL/ACK connection handshake.
//!
//! The server side is a pure function of the received chunk so the
//! non-blocking server loop can run it without owning a reader.

use std::io::{Read, Write};

use tracing::debug;
use uabench_frame::{
    Acknowledge, Chunk, ChunkReader, ChunkWriter, ErrorMessage, Hello, MessageType, StatusCode,
};

use crate::config::BenchConfig;
use crate::error::{BenchError, Result};

/// Longest endpoint URL accepted in a Hello.
pub const MAX_ENDPOINT_URL_LEN: usize = 4096;

/// Negotiated connection parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResult {
    /// Endpoint URL the client asked for.
    pub endpoint_url: Option<String>,
    /// What the server answers with.
    pub acknowledge: Acknowledge,
}

/// Validate a client's HEL chunk and negotiate limits against `config`.
///
/// A rejection is returned as the ERR message to send before closing.
pub fn accept_hello(
    chunk: &Chunk,
    config: &BenchConfig,
) -> std::result::Result<HandshakeResult, ErrorMessage> {
    if chunk.message_type() != MessageType::Hello {
        return Err(reject(
            StatusCode::BAD_TCP_MESSAGE_TYPE_INVALID,
            format!("expected HEL, got {}", chunk.message_type()),
        ));
    }

    let hello = Hello::decode(&chunk.body)
        .map_err(|err| reject(StatusCode::BAD_DECODING_ERROR, format!("malformed HEL: {err}")))?;

    if hello.protocol_version < config.protocol_version {
        return Err(reject(
            StatusCode::BAD_PROTOCOL_VERSION_UNSUPPORTED,
            format!(
                "protocol version {} is older than {}",
                hello.protocol_version, config.protocol_version
            ),
        ));
    }

    if let Some(url) = &hello.endpoint_url {
        if url.len() > MAX_ENDPOINT_URL_LEN {
            return Err(reject(
                StatusCode::BAD_TCP_ENDPOINT_URL_INVALID,
                format!("endpoint url is {} bytes (max {MAX_ENDPOINT_URL_LEN})", url.len()),
            ));
        }
    }

    // The client's send buffer bounds what we receive and vice versa.
    let acknowledge = Acknowledge {
        protocol_version: config.protocol_version,
        receive_buffer_size: config.receive_buffer_size.min(hello.send_buffer_size),
        send_buffer_size: config.send_buffer_size.min(hello.receive_buffer_size),
        max_message_size: config.max_message_size,
        max_chunk_count: config.max_chunk_count,
    };

    debug!(
        endpoint_url = hello.endpoint_url.as_deref().unwrap_or("<none>"),
        receive_buffer_size = acknowledge.receive_buffer_size,
        send_buffer_size = acknowledge.send_buffer_size,
        "hello accepted"
    );

    Ok(HandshakeResult {
        endpoint_url: hello.endpoint_url,
        acknowledge,
    })
}

fn reject(status: StatusCode, reason: String) -> ErrorMessage {
    ErrorMessage {
        status,
        reason: Some(reason),
    }
}

/// Client side: send HEL for `endpoint_url` and wait for the ACK.
///
/// Blocks up to the reader's read timeout.
pub fn handshake_client<R: Read, W: Write>(
    reader: &mut ChunkReader<R>,
    writer: &mut ChunkWriter<W>,
    endpoint_url: &str,
    config: &BenchConfig,
) -> Result<Acknowledge> {
    let hello = Hello {
        protocol_version: config.protocol_version,
        receive_buffer_size: config.receive_buffer_size,
        send_buffer_size: config.send_buffer_size,
        max_message_size: config.max_message_size,
        max_chunk_count: config.max_chunk_count,
        endpoint_url: Some(endpoint_url.to_string()),
    };
    writer.write_chunk(&hello.to_chunk()?)?;

    let chunk = reader.read_chunk()?;
    match chunk.message_type() {
        MessageType::Acknowledge => {
            let ack = Acknowledge::decode(&chunk.body)?;
            if ack.protocol_version > config.protocol_version {
                return Err(BenchError::Handshake(format!(
                    "server chose protocol version {} (client speaks {})",
                    ack.protocol_version, config.protocol_version
                )));
            }
            Ok(ack)
        }
        MessageType::Error => Err(BenchError::Rejected(ErrorMessage::decode(&chunk.body)?)),
        other => Err(BenchError::UnexpectedMessage {
            expected: MessageType::Acknowledge,
            actual: other,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::{Bytes, BytesMut};

    use super::*;

    fn hello(url: Option<&str>) -> Hello {
        Hello {
            protocol_version: 0,
            receive_buffer_size: 16_384,
            send_buffer_size: 32_768,
            max_message_size: 0,
            max_chunk_count: 0,
            endpoint_url: url.map(str::to_string),
        }
    }

    #[test]
    fn negotiates_smaller_buffers() {
        let chunk = hello(Some("opc.tcp://localhost:4840")).to_chunk().unwrap();
        let result = accept_hello(&chunk, &BenchConfig::default()).unwrap();

        assert_eq!(result.endpoint_url.as_deref(), Some("opc.tcp://localhost:4840"));
        assert_eq!(result.acknowledge.receive_buffer_size, 32_768);
        assert_eq!(result.acknowledge.send_buffer_size, 16_384);
        assert_eq!(
            result.acknowledge.max_message_size,
            BenchConfig::default().max_message_size
        );
    }

    #[test]
    fn rejects_non_hello() {
        let chunk = Chunk::secured(MessageType::Message, 1, Bytes::new()).unwrap();
        let err = accept_hello(&chunk, &BenchConfig::default()).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_TCP_MESSAGE_TYPE_INVALID);
    }

    #[test]
    fn rejects_malformed_body() {
        let chunk = Chunk::single(MessageType::Hello, Bytes::from_static(&[0; 6])).unwrap();
        let err = accept_hello(&chunk, &BenchConfig::default()).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_DECODING_ERROR);
    }

    #[test]
    fn rejects_oversized_endpoint_url() {
        let url = "x".repeat(MAX_ENDPOINT_URL_LEN + 1);
        let chunk = hello(Some(&url)).to_chunk().unwrap();
        let err = accept_hello(&chunk, &BenchConfig::default()).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_TCP_ENDPOINT_URL_INVALID);
    }

    #[test]
    fn rejects_older_protocol_version() {
        let config = BenchConfig {
            protocol_version: 1,
            ..BenchConfig::default()
        };
        let chunk = hello(None).to_chunk().unwrap();
        let err = accept_hello(&chunk, &config).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_PROTOCOL_VERSION_UNSUPPORTED);
    }

    fn scripted_reply(chunk: &Chunk) -> ChunkReader<Cursor<Vec<u8>>> {
        ChunkReader::new(Cursor::new(chunk.to_bytes().unwrap().to_vec()))
    }

    #[test]
    fn client_accepts_ack() {
        let ack = Acknowledge {
            protocol_version: 0,
            receive_buffer_size: 8192,
            send_buffer_size: 8192,
            max_message_size: 0,
            max_chunk_count: 0,
        };
        let mut reader = scripted_reply(&ack.to_chunk().unwrap());
        let mut writer = ChunkWriter::new(Vec::new());

        let got = handshake_client(
            &mut reader,
            &mut writer,
            "opc.tcp://127.0.0.1:4840",
            &BenchConfig::default(),
        )
        .unwrap();
        assert_eq!(got, ack);

        let mut sent = BytesMut::from(writer.get_ref().as_slice());
        let hel = uabench_frame::decode_chunk(&mut sent, usize::MAX)
            .unwrap()
            .unwrap();
        assert_eq!(hel.message_type(), MessageType::Hello);
        assert_eq!(
            Hello::decode(&hel.body).unwrap().endpoint_url.as_deref(),
            Some("opc.tcp://127.0.0.1:4840")
        );
    }

    #[test]
    fn client_surfaces_err() {
        let err = ErrorMessage::new(StatusCode::BAD_TCP_SERVER_TOO_BUSY, Some("full"));
        let frame = err.to_frame().unwrap();
        let mut reader = ChunkReader::new(Cursor::new(frame.to_vec()));
        let mut writer = ChunkWriter::new(Vec::new());

        let result = handshake_client(&mut reader, &mut writer, "x", &BenchConfig::default());
        assert!(matches!(
            result,
            Err(BenchError::Rejected(message)) if message == err
        ));
    }

    #[test]
    fn client_rejects_unexpected_message() {
        let chunk = Chunk::secured(MessageType::Message, 1, Bytes::new()).unwrap();
        let mut reader = scripted_reply(&chunk);
        let mut writer = ChunkWriter::new(Vec::new());

        assert!(matches!(
            handshake_client(&mut reader, &mut writer, "x", &BenchConfig::default()),
            Err(BenchError::UnexpectedMessage {
                expected: MessageType::Acknowledge,
                actual: MessageType::Message
            })
        ));
    }
}
