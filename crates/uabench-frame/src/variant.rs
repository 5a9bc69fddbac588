//! The small subset of OPC-UA Variant encoding the bench call path needs.

use bytes::{BufMut, BytesMut};

use crate::error::{FrameError, Result};
use crate::primitives::{get_f64, get_i32, get_u32, get_u8, get_ua_string, put_ua_string};

const TYPE_NULL: u8 = 0;
const TYPE_BOOLEAN: u8 = 1;
const TYPE_INT32: u8 = 6;
const TYPE_UINT32: u8 = 7;
const TYPE_DOUBLE: u8 = 11;
const TYPE_STRING: u8 = 12;

/// A scalar method argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Variant {
    Null,
    Boolean(bool),
    Int32(i32),
    UInt32(u32),
    Double(f64),
    String(Option<String>),
}

impl Variant {
    /// Built-in type id used as the encoding byte.
    pub fn type_id(&self) -> u8 {
        match self {
            Variant::Null => TYPE_NULL,
            Variant::Boolean(_) => TYPE_BOOLEAN,
            Variant::Int32(_) => TYPE_INT32,
            Variant::UInt32(_) => TYPE_UINT32,
            Variant::Double(_) => TYPE_DOUBLE,
            Variant::String(_) => TYPE_STRING,
        }
    }

    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_u8(self.type_id());
        match self {
            Variant::Null => {}
            Variant::Boolean(v) => dst.put_u8(u8::from(*v)),
            Variant::Int32(v) => dst.put_i32_le(*v),
            Variant::UInt32(v) => dst.put_u32_le(*v),
            Variant::Double(v) => dst.put_f64_le(*v),
            Variant::String(v) => put_ua_string(dst, v.as_deref())?,
        }
        Ok(())
    }

    /// Decode one scalar variant. Arrays and other built-in types are
    /// rejected with [`FrameError::UnsupportedVariant`].
    pub fn decode(src: &mut &[u8]) -> Result<Self> {
        let mask = get_u8(src)?;
        Ok(match mask {
            TYPE_NULL => Variant::Null,
            TYPE_BOOLEAN => Variant::Boolean(get_u8(src)? != 0),
            TYPE_INT32 => Variant::Int32(get_i32(src)?),
            TYPE_UINT32 => Variant::UInt32(get_u32(src)?),
            TYPE_DOUBLE => Variant::Double(get_f64(src)?),
            TYPE_STRING => Variant::String(get_ua_string(src)?),
            other => return Err(FrameError::UnsupportedVariant(other)),
        })
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Variant::Null => f.write_str("null"),
            Variant::Boolean(v) => write!(f, "{v}"),
            Variant::Int32(v) => write!(f, "{v}"),
            Variant::UInt32(v) => write!(f, "{v}"),
            Variant::Double(v) => write!(f, "{v}"),
            Variant::String(Some(v)) => write!(f, "{v:?}"),
            Variant::String(None) => f.write_str("null"),
        }
    }
}

/// Encode a variant array: i32 count followed by the elements.
pub fn put_variants(dst: &mut BytesMut, values: &[Variant]) -> Result<()> {
    let count = i32::try_from(values.len()).map_err(|_| FrameError::MessageTooLarge {
        size: values.len(),
        max: i32::MAX as usize,
    })?;
    dst.put_i32_le(count);
    for value in values {
        value.encode(dst)?;
    }
    Ok(())
}

/// Decode a variant array. A null array (`-1`) decodes as empty.
pub fn get_variants(src: &mut &[u8]) -> Result<Vec<Variant>> {
    let count = get_i32(src)?;
    if count < -1 {
        return Err(FrameError::InvalidStringLength(count));
    }
    let count = count.max(0) as usize;
    // Each element needs at least its encoding byte.
    if src.len() < count {
        return Err(FrameError::Truncated {
            needed: count,
            available: src.len(),
        });
    }
    (0..count).map(|_| Variant::decode(src)).collect()
}
