use tracing::{debug, warn};
use uabench_frame::{
    build_error_frame, CallRequest, CallResponse, Chunk, ChunkType, MessageType, StatusCode,
};

use crate::error::Result;
use crate::method::{MethodCall, MethodRegistry};
use crate::registry::TransportId;
use crate::server::{Reply, ServiceStack};

/// Service stack answering the bench's plain call framing.
///
/// `MSG` chunks carry a [`CallRequest`] and are answered with a
/// [`CallResponse`] on the same secure channel id. `CLO` ends the
/// connection. Everything else is refused with `BadServiceUnsupported`.
#[derive(Debug, Default)]
pub struct BenchCallStack {
    calls: u64,
}

impl BenchCallStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls answered so far, failed ones included.
    pub fn calls(&self) -> u64 {
        self.calls
    }

    fn handle_call(
        &mut self,
        transport: TransportId,
        chunk: &Chunk,
        methods: &MethodRegistry,
    ) -> Result<Reply> {
        let request = CallRequest::decode(&chunk.body)?;
        self.calls += 1;

        let call = MethodCall {
            object: request.object,
            method: request.method,
            inputs: request.inputs,
        };
        let response = match methods.call(&call) {
            Ok(outputs) => {
                debug!(%transport, method = %call.method, "method call succeeded");
                CallResponse::good(request.request_id, outputs)
            }
            Err(err) => {
                warn!(%transport, method = %call.method, error = %err, "method call failed");
                CallResponse::failed(request.request_id, err.status_code())
            }
        };

        let channel_id = chunk.header.secure_channel_id.unwrap_or_default();
        Ok(Reply::Send(response.to_bytes(channel_id)?))
    }
}

impl ServiceStack for BenchCallStack {
    fn handle_chunk(
        &mut self,
        transport: TransportId,
        chunk: &Chunk,
        methods: &MethodRegistry,
    ) -> Result<Reply> {
        match (chunk.message_type(), chunk.header.chunk_type) {
            (MessageType::Message, ChunkType::Final) => self.handle_call(transport, chunk, methods),
            (MessageType::Message, ChunkType::Abort) => Ok(Reply::Nothing),
            (MessageType::Close, _) => {
                debug!(%transport, "client closed secure channel");
                Ok(Reply::Close)
            }
            (message_type, chunk_type) => {
                let reason = format!(
                    "{message_type} chunk '{}' not supported by the bench",
                    chunk_type.tag() as char
                );
                Ok(Reply::SendAndClose(build_error_frame(
                    StatusCode::BAD_SERVICE_UNSUPPORTED,
                    Some(&reason),
                )?))
            }
        }
    }
}
