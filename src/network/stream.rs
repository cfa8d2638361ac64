//! Binary stream helpers
//!
//! Integers follow the stream convention (little-endian). Strings and blobs
//! carry a packed length: one byte when shorter than 255, otherwise 0xFF and
//! a 3-byte little-endian length.

use bytes::{Buf, BufMut, Bytes};

/// Largest length a packed length prefix can carry.
pub const MAX_PACKED_LEN: usize = 0x00FF_FFFF;

const PACKED_ESCAPE: u8 = 0xFF;

/// Errors raised while reading or writing wire data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("truncated input: need {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("{0} unexpected trailing bytes")]
    TrailingBytes(usize),

    #[error("string too long: {0} bytes (max {MAX_PACKED_LEN})")]
    StringTooLong(usize),

    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    #[error("unknown message id {0}")]
    UnknownMessage(u8),

    #[error("message {id} body is {actual} bytes, expected {expected}")]
    LengthMismatch { id: u8, expected: usize, actual: usize },

    #[error("message body of {len} bytes does not fit a {width}-byte length prefix")]
    BodyTooLarge { len: usize, width: u8 },

    #[error("packet would grow to {size} bytes (max {max})")]
    PacketOverflow { size: usize, max: usize },

    #[error("unknown record kind {0}")]
    UnknownKind(u8),

    #[error("unsupported address {0}")]
    UnsupportedAddress(String),
}

/// Fail with [`WireError::Truncated`] unless `needed` bytes are available.
pub fn ensure_remaining<B: Buf>(input: &B, needed: usize) -> Result<(), WireError> {
    if input.remaining() < needed {
        return Err(WireError::Truncated {
            needed,
            remaining: input.remaining(),
        });
    }
    Ok(())
}

/// Fail with [`WireError::TrailingBytes`] if anything is left.
pub fn ensure_consumed<B: Buf>(input: &B) -> Result<(), WireError> {
    match input.remaining() {
        0 => Ok(()),
        n => Err(WireError::TrailingBytes(n)),
    }
}

pub fn put_packed_len<B: BufMut>(out: &mut B, len: usize) -> Result<(), WireError> {
    if len > MAX_PACKED_LEN {
        return Err(WireError::StringTooLong(len));
    }
    if len < PACKED_ESCAPE as usize {
        out.put_u8(len as u8);
    } else {
        out.put_u8(PACKED_ESCAPE);
        out.put_uint_le(len as u64, 3);
    }
    Ok(())
}

pub fn get_packed_len<B: Buf>(input: &mut B) -> Result<usize, WireError> {
    ensure_remaining(input, 1)?;
    let first = input.get_u8();
    if first != PACKED_ESCAPE {
        return Ok(first as usize);
    }
    ensure_remaining(input, 3)?;
    Ok(input.get_uint_le(3) as usize)
}

pub fn put_blob<B: BufMut>(out: &mut B, data: &[u8]) -> Result<(), WireError> {
    put_packed_len(out, data.len())?;
    out.put_slice(data);
    Ok(())
}

pub fn get_blob<B: Buf>(input: &mut B) -> Result<Bytes, WireError> {
    let len = get_packed_len(input)?;
    ensure_remaining(input, len)?;
    Ok(input.copy_to_bytes(len))
}

pub fn put_string<B: BufMut>(out: &mut B, s: &str) -> Result<(), WireError> {
    put_blob(out, s.as_bytes())
}

pub fn get_string<B: Buf>(input: &mut B) -> Result<String, WireError> {
    let raw = get_blob(input)?;
    String::from_utf8(raw.to_vec()).map_err(|_| WireError::InvalidUtf8)
}

pub fn get_u8<B: Buf>(input: &mut B) -> Result<u8, WireError> {
    ensure_remaining(input, 1)?;
    Ok(input.get_u8())
}

pub fn get_u16<B: Buf>(input: &mut B) -> Result<u16, WireError> {
    ensure_remaining(input, 2)?;
    Ok(input.get_u16_le())
}

pub fn get_u32<B: Buf>(input: &mut B) -> Result<u32, WireError> {
    ensure_remaining(input, 4)?;
    Ok(input.get_u32_le())
}

pub fn get_i32<B: Buf>(input: &mut B) -> Result<i32, WireError> {
    ensure_remaining(input, 4)?;
    Ok(input.get_i32_le())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_short_string_single_length_byte() {
        let mut buf = BytesMut::new();
        put_string(&mut buf, "cellapp").unwrap();
        assert_eq!(buf[0], 7);
        assert_eq!(&buf[1..], b"cellapp");

        let mut input = buf.freeze();
        assert_eq!(get_string(&mut input).unwrap(), "cellapp");
    }

    #[test]
    fn test_long_string_escaped_length() {
        let long = "x".repeat(300);
        let mut buf = BytesMut::new();
        put_string(&mut buf, &long).unwrap();
        assert_eq!(buf[0], 0xFF);
        assert_eq!(&buf[1..4], &[0x2C, 0x01, 0x00]);
        assert_eq!(buf.len(), 4 + 300);

        let mut input = buf.freeze();
        assert_eq!(get_string(&mut input).unwrap(), long);
    }

    #[test]
    fn test_length_254_and_255_boundary() {
        let mut buf = BytesMut::new();
        put_packed_len(&mut buf, 254).unwrap();
        assert_eq!(&buf[..], &[254]);

        let mut buf = BytesMut::new();
        put_packed_len(&mut buf, 255).unwrap();
        assert_eq!(&buf[..], &[0xFF, 0xFF, 0x00, 0x00]);
        let mut input = buf.freeze();
        assert_eq!(get_packed_len(&mut input).unwrap(), 255);
    }

    #[test]
    fn test_truncated_string() {
        let mut input: &[u8] = &[5, b'a', b'b'];
        assert_eq!(
            get_string(&mut input).unwrap_err(),
            WireError::Truncated { needed: 5, remaining: 2 }
        );
    }

    #[test]
    fn test_invalid_utf8() {
        let mut input: &[u8] = &[2, 0xC3, 0x28];
        assert_eq!(get_string(&mut input).unwrap_err(), WireError::InvalidUtf8);
    }

    #[test]
    fn test_ensure_consumed() {
        let input: &[u8] = &[1, 2];
        assert_eq!(ensure_consumed(&input).unwrap_err(), WireError::TrailingBytes(2));
        let empty: &[u8] = &[];
        assert!(ensure_consumed(&empty).is_ok());
    }
}
