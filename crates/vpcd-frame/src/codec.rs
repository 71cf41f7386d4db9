use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: a single big-endian u16 payload length.
pub const HEADER_SIZE: usize = 2;

/// Largest payload the 16-bit length prefix can describe.
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

/// A framed VPCD message.
///
/// A zero-length frame is valid and distinct from end of stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The message payload.
    pub payload: Bytes,
}

impl Frame {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Bytes this frame occupies on the connection.
    pub fn wire_size(&self) -> usize {
        self.len() + HEADER_SIZE
    }
}

/// Append the length prefix and `payload` to `dst`.
///
/// Layout:
/// ```text
/// ┌──────────────┬──────────────────┐
/// │ Length       │ Payload          │
/// │ (2B BE)      │ (Length bytes)   │
/// └──────────────┴──────────────────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD,
        });
    }
    let len = payload.len() as u16;
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u16(len);
    dst.put_slice(payload);
    Ok(())
}

/// Take one complete frame off the front of `src`.
///
/// `Ok(None)` leaves `src` untouched until more bytes arrive.
pub fn decode_frame(src: &mut BytesMut) -> Result<Option<Frame>> {
    let Some(&[hi, lo]) = src.get(..HEADER_SIZE) else {
        return Ok(None);
    };
    let needed = HEADER_SIZE + usize::from(u16::from_be_bytes([hi, lo]));
    if src.len() < needed {
        src.reserve(needed - src.len());
        return Ok(None);
    }

    let mut frame = src.split_to(needed);
    frame.advance(HEADER_SIZE);
    Ok(Some(Frame::new(frame.freeze())))
}

/// Socket timeouts for [`FrameReader`](crate::FrameReader) and
/// [`FrameWriter`](crate::FrameWriter). `None` waits indefinitely.
#[derive(Debug, Clone, Default)]
pub struct FrameConfig {
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
}
