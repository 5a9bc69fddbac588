//! Little-endian primitives shared by the message bodies.
//!
//! Decoders take `&mut &[u8]` and advance the slice past what they read.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{FrameError, Result};

/// Length prefix marking a null string.
pub const NULL_LENGTH: i32 = -1;

fn ensure(src: &[u8], needed: usize) -> Result<()> {
    if src.len() < needed {
        return Err(FrameError::Truncated {
            needed,
            available: src.len(),
        });
    }
    Ok(())
}

pub fn get_u8(src: &mut &[u8]) -> Result<u8> {
    ensure(src, 1)?;
    Ok(src.get_u8())
}

pub fn get_u32(src: &mut &[u8]) -> Result<u32> {
    ensure(src, 4)?;
    Ok(src.get_u32_le())
}

pub fn get_i32(src: &mut &[u8]) -> Result<i32> {
    ensure(src, 4)?;
    Ok(src.get_i32_le())
}

pub fn get_f64(src: &mut &[u8]) -> Result<f64> {
    ensure(src, 8)?;
    Ok(src.get_f64_le())
}

/// Encode an OPC-UA String: i32 length (`-1` for null) + UTF-8 bytes.
pub fn put_ua_string(dst: &mut BytesMut, value: Option<&str>) -> Result<()> {
    match value {
        None => dst.put_i32_le(NULL_LENGTH),
        Some(s) => {
            let len = i32::try_from(s.len()).map_err(|_| FrameError::StringTooLong(s.len()))?;
            dst.reserve(4 + s.len());
            dst.put_i32_le(len);
            dst.put_slice(s.as_bytes());
        }
    }
    Ok(())
}

/// Encoded size of an OPC-UA String.
pub fn ua_string_len(value: Option<&str>) -> usize {
    4 + value.map_or(0, str::len)
}

/// Decode an OPC-UA String. Returns `None` for the null string.
pub fn get_ua_string(src: &mut &[u8]) -> Result<Option<String>> {
    let len = get_i32(src)?;
    if len == NULL_LENGTH {
        return Ok(None);
    }
    if len < 0 {
        return Err(FrameError::InvalidStringLength(len));
    }

    let len = len as usize;
    ensure(src, len)?;
    let text = String::from_utf8(src[..len].to_vec())?;
    src.advance(len);
    Ok(Some(text))
}
