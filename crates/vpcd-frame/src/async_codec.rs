//! `tokio_util::codec` adapter for VPCD framing.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::codec::{decode_frame, encode_frame, Frame};
use crate::error::{FrameError, Result};

/// Codec for use with `tokio_util::codec::Framed`.
#[derive(Debug, Clone, Copy, Default)]
pub struct VpcdCodec;

impl VpcdCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for VpcdCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        decode_frame(src)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if let Some(frame) = decode_frame(src)? {
            return Ok(Some(frame));
        }
        if !src.is_empty() {
            debug!(
                buffered = src.len(),
                "stream ended inside a frame; discarding partial frame"
            );
            src.clear();
        }
        Ok(None)
    }
}

impl Encoder<Frame> for VpcdCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        encode_frame(frame.payload.as_ref(), dst)
    }
}

impl Encoder<Bytes> for VpcdCodec {
    type Error = FrameError;

    fn encode(&mut self, payload: Bytes, dst: &mut BytesMut) -> Result<()> {
        encode_frame(payload.as_ref(), dst)
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;

    #[tokio::test]
    async fn framed_roundtrip_over_duplex() {
        let (client, server) = tokio::io::duplex(1024);
        let mut sink = FramedWrite::new(client, VpcdCodec::new());
        let mut stream = FramedRead::new(server, VpcdCodec::new());

        sink.send(Frame::new(vec![0x01])).await.unwrap();
        sink.send(Bytes::from_static(&[0x00, 0xA4, 0x00, 0x0C]))
            .await
            .unwrap();

        let first = stream.next().await.unwrap().unwrap();
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(first.payload.as_ref(), &[0x01]);
        assert_eq!(second.payload.as_ref(), &[0x00, 0xA4, 0x00, 0x0C]);
    }

    #[tokio::test]
    async fn truncated_frame_at_eof_ends_stream() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut stream = FramedRead::new(server, VpcdCodec::new());

        tokio::io::AsyncWriteExt::write_all(&mut client, &[0x00, 0x05, 0x00, 0xA4])
            .await
            .unwrap();
        drop(client);

        assert!(stream.next().await.is_none());
    }

    #[test]
    fn decode_eof_returns_complete_frame() {
        let mut codec = VpcdCodec::new();
        let mut buf = BytesMut::from(&[0x00, 0x02, 0x90, 0x00][..]);

        let frame = codec.decode_eof(&mut buf).unwrap().unwrap();
        assert_eq!(frame.payload.as_ref(), &[0x90, 0x00]);
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }
}
