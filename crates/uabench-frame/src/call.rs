//! Bodies of the bench's plain method-call messages.
//!
//! The bench does not speak the OPC-UA Call service. Fault methods are
//! reached through single `MSG` chunks whose body is a [`CallRequest`]; the
//! answer is a `MSG` chunk on the same secure channel id carrying a
//! [`CallResponse`].

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::Chunk;
use crate::error::Result;
use crate::header::MessageType;
use crate::primitives::{get_u32, get_ua_string, put_ua_string};
use crate::status::StatusCode;
use crate::variant::{get_variants, put_variants, Variant};

#[derive(Debug, Clone, PartialEq)]
pub struct CallRequest {
    pub request_id: u32,
    /// Node id of the object owning the method, as text.
    pub object: String,
    pub method: String,
    pub inputs: Vec<Variant>,
}

impl CallRequest {
    pub fn new(request_id: u32, object: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            request_id,
            object: object.into(),
            method: method.into(),
            inputs: Vec::new(),
        }
    }

    pub fn with_inputs(mut self, inputs: Vec<Variant>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn encode_body(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_u32_le(self.request_id);
        put_ua_string(dst, Some(&self.object))?;
        put_ua_string(dst, Some(&self.method))?;
        put_variants(dst, &self.inputs)
    }

    pub fn decode(body: &[u8]) -> Result<Self> {
        let mut src = body;
        Ok(Self {
            request_id: get_u32(&mut src)?,
            object: get_ua_string(&mut src)?.unwrap_or_default(),
            method: get_ua_string(&mut src)?.unwrap_or_default(),
            inputs: get_variants(&mut src)?,
        })
    }

    pub fn to_chunk(&self, secure_channel_id: u32) -> Result<Chunk> {
        let mut body = BytesMut::new();
        self.encode_body(&mut body)?;
        Chunk::secured(MessageType::Message, secure_channel_id, body.freeze())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallResponse {
    pub request_id: u32,
    pub status: StatusCode,
    pub outputs: Vec<Variant>,
}

impl CallResponse {
    pub fn good(request_id: u32, outputs: Vec<Variant>) -> Self {
        Self {
            request_id,
            status: StatusCode::GOOD,
            outputs,
        }
    }

    pub fn failed(request_id: u32, status: StatusCode) -> Self {
        Self {
            request_id,
            status,
            outputs: Vec::new(),
        }
    }

    pub fn encode_body(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_u32_le(self.request_id);
        dst.put_u32_le(self.status.bits());
        put_variants(dst, &self.outputs)
    }

    pub fn decode(body: &[u8]) -> Result<Self> {
        let mut src = body;
        Ok(Self {
            request_id: get_u32(&mut src)?,
            status: StatusCode(get_u32(&mut src)?),
            outputs: get_variants(&mut src)?,
        })
    }

    pub fn to_chunk(&self, secure_channel_id: u32) -> Result<Chunk> {
        let mut body = BytesMut::new();
        self.encode_body(&mut body)?;
        Chunk::secured(MessageType::Message, secure_channel_id, body.freeze())
    }

    /// Encoded chunk bytes, ready for a writer.
    pub fn to_bytes(&self, secure_channel_id: u32) -> Result<Bytes> {
        self.to_chunk(secure_channel_id)?.to_bytes()
    }
}
