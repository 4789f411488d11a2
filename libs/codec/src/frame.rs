//! Length-prefixed framing
//!
//! Each message on a stream socket is a big-endian `u32` byte count followed
//! by exactly that many payload bytes. Decoding works on a growing read
//! buffer so callers can feed it whatever the socket returned so far.

use crate::CodecError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

pub const FRAME_HEADER_LEN: usize = 4;

/// Append one framed `payload` to `dst`
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<(), CodecError> {
    let len = u32::try_from(payload.len()).map_err(|_| CodecError::FrameTooLarge {
        size: payload.len(),
        max: u32::MAX as usize,
    })?;

    dst.reserve(FRAME_HEADER_LEN + payload.len());
    dst.put_u32(len);
    dst.extend_from_slice(payload);
    Ok(())
}

/// Split one complete frame off the front of `src`.
///
/// Returns `Ok(None)` while the buffer holds less than a full frame; the
/// partial bytes stay in `src` for the next call.
pub fn decode_frame(src: &mut BytesMut, max_size: usize) -> Result<Option<Bytes>, CodecError> {
    if src.len() < FRAME_HEADER_LEN {
        return Ok(None);
    }

    let len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
    if len > max_size {
        return Err(CodecError::FrameTooLarge {
            size: len,
            max: max_size,
        });
    }

    if src.len() < FRAME_HEADER_LEN + len {
        src.reserve(FRAME_HEADER_LEN + len - src.len());
        return Ok(None);
    }

    src.advance(FRAME_HEADER_LEN);
    Ok(Some(src.split_to(len).freeze()))
}
