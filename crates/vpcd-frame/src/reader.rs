use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use tracing::debug;
use vpcd_transport::VpcdStream;

use crate::codec::{decode_frame, Frame, FrameConfig, HEADER_SIZE, MAX_PAYLOAD};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 1024;
const READ_CHUNK_SIZE: usize = 4 * 1024;

/// Pulls whole VPCD frames off a byte stream.
///
/// Short reads are buffered until a frame is complete. The stream ending,
/// whether between frames or inside one, is reported as
/// [`FrameError::ConnectionClosed`].
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Reader without timeouts.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Block until the next frame has arrived.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = decode_frame(&mut self.buf)? {
                return Ok(frame);
            }

            // Never read past the frame in progress by more than one chunk.
            let wanted = self.missing_bytes().clamp(1, READ_CHUNK_SIZE);
            let mut scratch = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut scratch[..wanted]) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            };

            if read == 0 {
                if !self.buf.is_empty() {
                    debug!(
                        buffered = self.buf.len(),
                        "stream ended inside a frame; discarding partial frame"
                    );
                    self.buf.clear();
                }
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&scratch[..read]);
        }
    }

    fn missing_bytes(&self) -> usize {
        if self.buf.len() < HEADER_SIZE {
            return HEADER_SIZE - self.buf.len();
        }
        let payload_len = u16::from_be_bytes([self.buf[0], self.buf[1]]) as usize;
        (HEADER_SIZE + payload_len.min(MAX_PAYLOAD)).saturating_sub(self.buf.len())
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Give back the stream. Bytes of an unfinished frame are lost.
    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameReader<VpcdStream> {
    /// Reader over a socket, with `config.read_timeout` applied to it.
    pub fn with_config_stream(inner: VpcdStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn transport_to_frame_error(err: vpcd_transport::TransportError) -> FrameError {
    match err.io_source() {
        Some(io) => FrameError::Io(std::io::Error::new(io.kind(), err.to_string())),
        None => FrameError::Io(std::io::Error::other(err.to_string())),
    }
}
