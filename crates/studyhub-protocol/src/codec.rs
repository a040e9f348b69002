//! Length-prefixed MessagePack codec for hub frames.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::frames::Frame;

/// Hard ceiling on a frame body (16 MiB), whatever the caller's limit.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Bytes taken by the big-endian body length in front of every frame.
pub const LENGTH_PREFIX_SIZE: usize = 4;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame body of {size} bytes exceeds the {limit} byte limit")]
    FrameTooLarge { size: usize, limit: usize },

    /// The buffer ends before the frame does; holds the missing byte count.
    #[error("truncated frame, {0} more bytes expected")]
    Incomplete(usize),

    #[error("cannot encode frame: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("malformed frame body: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Body length announced by the prefix at the start of `data`, checked
/// against `limit`. `None` while the prefix itself is still partial.
fn body_length(data: &[u8], limit: usize) -> Result<Option<usize>, ProtocolError> {
    let Some(prefix) = data.get(..LENGTH_PREFIX_SIZE) else {
        return Ok(None);
    };
    let size = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
    let limit = limit.min(MAX_FRAME_SIZE);
    if size > limit {
        return Err(ProtocolError::FrameTooLarge { size, limit });
    }
    Ok(Some(size))
}

/// Serialize a frame behind its length prefix.
///
/// Frames are encoded as MessagePack maps so fields travel by name.
///
/// # Errors
///
/// Fails when serialization fails or the body exceeds [`MAX_FRAME_SIZE`].
pub fn encode(frame: &Frame) -> Result<Bytes, ProtocolError> {
    let body = rmp_serde::to_vec_named(frame)?;
    if body.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: body.len(),
            limit: MAX_FRAME_SIZE,
        });
    }

    let mut out = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + body.len());
    out.put_u32(body.len() as u32);
    out.extend_from_slice(&body);
    Ok(out.freeze())
}

/// Decode the frame at the start of `data`. Trailing bytes are ignored.
///
/// # Errors
///
/// Fails on a truncated, oversized or malformed frame.
pub fn decode(data: &[u8]) -> Result<Frame, ProtocolError> {
    let Some(size) = body_length(data, MAX_FRAME_SIZE)? else {
        return Err(ProtocolError::Incomplete(LENGTH_PREFIX_SIZE - data.len()));
    };
    let end = LENGTH_PREFIX_SIZE + size;
    let body = data
        .get(LENGTH_PREFIX_SIZE..end)
        .ok_or(ProtocolError::Incomplete(end.saturating_sub(data.len())))?;
    Ok(rmp_serde::from_slice(body)?)
}

/// Pop the next complete frame off a read buffer.
///
/// `Ok(None)` means more bytes are needed; the buffer is left untouched.
///
/// # Errors
///
/// Fails on an oversized or malformed frame.
pub fn decode_from(buf: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
    decode_from_with_limit(buf, MAX_FRAME_SIZE)
}

/// [`decode_from`] with a tighter body limit.
///
/// An oversized prefix is rejected before its body is buffered, which is
/// how the server enforces its configured message size.
///
/// # Errors
///
/// Fails when the announced body exceeds `limit` or is malformed.
pub fn decode_from_with_limit(
    buf: &mut BytesMut,
    limit: usize,
) -> Result<Option<Frame>, ProtocolError> {
    let Some(size) = body_length(buf, limit)? else {
        return Ok(None);
    };
    if buf.len() < LENGTH_PREFIX_SIZE + size {
        return Ok(None);
    }

    buf.advance(LENGTH_PREFIX_SIZE);
    let body = buf.split_to(size);
    Ok(Some(rmp_serde::from_slice(&body)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hub_frames_survive_the_wire() {
        let frames = [
            Frame::join_group(1, 7),
            Frame::send_message_with_ack(2, "user-c", "hi"),
            Frame::mark_read(None, 99),
            Frame::event("User_alice", "ReceiveMessage", br#"{"content":"hi"}"#.to_vec()),
            Frame::connected("conn_1", None, 30_000),
        ];

        for frame in frames {
            let wire = encode(&frame).unwrap();
            assert_eq!(decode(&wire).unwrap(), frame);
        }
    }

    #[test]
    fn test_truncated_input() {
        let encoded = encode(&Frame::join_group(1, 7)).unwrap();

        assert!(matches!(decode(&encoded[..2]), Err(ProtocolError::Incomplete(2))));
        assert!(matches!(
            decode(&encoded[..5]),
            Err(ProtocolError::Incomplete(n)) if n == encoded.len() - 5
        ));
    }

    #[test]
    fn test_oversized_body_rejected_on_encode() {
        let frame = Frame::event("User_a", "ReceiveMessage", vec![0u8; MAX_FRAME_SIZE + 1]);

        assert!(matches!(
            encode(&frame),
            Err(ProtocolError::FrameTooLarge { limit: MAX_FRAME_SIZE, .. })
        ));
    }

    #[test]
    fn test_partial_frame_stays_buffered() {
        let first = Frame::join_group(1, 7);
        let second = Frame::leave_group(2, 7);

        let mut buf = BytesMut::with_capacity(64);
        buf.extend_from_slice(&encode(&first).unwrap());
        buf.extend_from_slice(&encode(&second).unwrap()[..3]);

        assert_eq!(decode_from(&mut buf).unwrap(), Some(first));
        // Partial prefix of the second frame stays buffered.
        assert_eq!(decode_from(&mut buf).unwrap(), None);
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn test_decode_respects_limit() {
        let frame = Frame::send_message("user-b", "x".repeat(512));
        let mut buf = BytesMut::from(&encode(&frame).unwrap()[..]);

        let err = decode_from_with_limit(&mut buf, 64).unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge { limit: 64, .. }));
        // Nothing consumed on error.
        assert_eq!(buf.len(), encode(&frame).unwrap().len());
    }
}
