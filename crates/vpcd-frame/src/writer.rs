use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use vpcd_transport::VpcdStream;

use crate::codec::{encode_frame, Frame, FrameConfig, HEADER_SIZE};
use crate::control::{ControlCommand, CONTROL_LEN};
use crate::error::{FrameError, Result};
use crate::reader::transport_to_frame_error;

/// Puts VPCD frames on a byte stream.
///
/// A frame is encoded into an internal buffer, written in full and flushed
/// before `send` returns, so the peer never waits on a half-sent response.
pub struct FrameWriter<T> {
    inner: T,
    scratch: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Writer without timeouts.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            scratch: BytesMut::with_capacity(HEADER_SIZE + 256),
            config,
        }
    }

    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.send(&frame.payload)
    }

    /// Frame `payload` and write it out.
    ///
    /// A write timeout on the socket surfaces as [`FrameError::Io`]; the
    /// frame may then be partially written and the connection is unusable.
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        self.scratch.clear();
        encode_frame(payload, &mut self.scratch)?;

        let mut pending = &self.scratch[..];
        while !pending.is_empty() {
            match self.inner.write(pending) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => pending = &pending[n..],
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        }
        self.flush()
    }

    pub fn send_control(&mut self, command: ControlCommand) -> Result<()> {
        self.send(&[command.code()])
    }

    /// Send a command or response APDU.
    ///
    /// One-byte APDUs are refused: the peer would decode them as control commands.
    pub fn send_apdu(&mut self, apdu: &[u8]) -> Result<()> {
        if apdu.len() == CONTROL_LEN {
            return Err(FrameError::AmbiguousApdu);
        }
        self.send(apdu)
    }

    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                other => return other.map_err(FrameError::from),
            }
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameWriter<VpcdStream> {
    /// Writer over a socket, with `config.write_timeout` applied to it.
    pub fn with_config_stream(inner: VpcdStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BytesMut;

    use super::*;
    use crate::codec::{decode_frame, MAX_PAYLOAD};
    use crate::reader::FrameReader;

    fn memory_writer() -> FrameWriter<Cursor<Vec<u8>>> {
        FrameWriter::new(Cursor::new(Vec::new()))
    }

    fn wire_of(writer: FrameWriter<Cursor<Vec<u8>>>) -> Vec<u8> {
        writer.into_inner().into_inner()
    }

    #[test]
    fn response_apdu_is_length_prefixed() {
        let mut writer = memory_writer();
        writer.send(&[0x90, 0x00]).unwrap();

        assert_eq!(wire_of(writer), vec![0x00, 0x02, 0x90, 0x00]);
    }

    #[test]
    fn consecutive_responses_decode_back() {
        let mut writer = memory_writer();
        writer.send(&[0x3B, 0x00]).unwrap();
        writer.send(&[0x6F, 0x00]).unwrap();
        writer.send(&[]).unwrap();

        let mut wire = BytesMut::from(wire_of(writer).as_slice());
        let mut payloads = Vec::new();
        while let Some(frame) = decode_frame(&mut wire).unwrap() {
            payloads.push(frame.payload.to_vec());
        }
        assert_eq!(payloads, vec![vec![0x3B, 0x00], vec![0x6F, 0x00], vec![]]);
    }

    #[test]
    fn oversized_response_writes_nothing() {
        let mut writer = memory_writer();

        let err = writer.send(&vec![0u8; MAX_PAYLOAD + 1]).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
        assert!(wire_of(writer).is_empty());
    }

    #[test]
    fn control_commands_are_one_byte_frames() {
        let mut writer = memory_writer();
        writer.send_control(ControlCommand::PowerOn).unwrap();
        writer.send_control(ControlCommand::Reset).unwrap();

        assert_eq!(wire_of(writer), vec![0x00, 0x01, 0x01, 0x00, 0x01, 0x02]);
    }

    #[test]
    fn one_byte_apdu_is_refused() {
        let mut writer = memory_writer();

        let err = writer.send_apdu(&[0x00]).unwrap_err();
        assert!(matches!(err, FrameError::AmbiguousApdu));

        writer.send_apdu(&[0x00, 0xA4, 0x00, 0x0C]).unwrap();
        assert_eq!(wire_of(writer).len(), 6);
    }

    #[test]
    fn write_frame_matches_send() {
        let frame = Frame::new(vec![0x62, 0x82]);
        let mut by_frame = memory_writer();
        let mut by_payload = memory_writer();

        by_frame.write_frame(&frame).unwrap();
        by_payload.send(&[0x62, 0x82]).unwrap();

        assert_eq!(wire_of(by_frame), wire_of(by_payload));
    }

    #[test]
    fn get_atr_request_reads_back_as_control() {
        let mut writer = memory_writer();
        writer.send_control(ControlCommand::GetAtr).unwrap();

        let mut reader = FrameReader::new(Cursor::new(wire_of(writer)));
        assert_eq!(reader.read_frame().unwrap().payload.as_ref(), &[0x04]);
    }

    /// Fails each operation once with the given kind, then behaves.
    struct Flaky {
        write_failure: Option<ErrorKind>,
        flush_failure: Option<ErrorKind>,
        zero_writes: bool,
        flushed: bool,
        data: Vec<u8>,
    }

    impl Flaky {
        fn new() -> Self {
            Self {
                write_failure: None,
                flush_failure: None,
                zero_writes: false,
                flushed: false,
                data: Vec::new(),
            }
        }
    }

    impl Write for Flaky {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if let Some(kind) = self.write_failure.take() {
                return Err(kind.into());
            }
            if self.zero_writes {
                return Ok(0);
            }
            // Accept at most three bytes per call to exercise short writes.
            let n = buf.len().min(3);
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            if let Some(kind) = self.flush_failure.take() {
                return Err(kind.into());
            }
            self.flushed = true;
            Ok(())
        }
    }

    #[test]
    fn short_writes_and_interrupts_are_retried() {
        let mut sink = Flaky::new();
        sink.write_failure = Some(ErrorKind::Interrupted);
        sink.flush_failure = Some(ErrorKind::Interrupted);

        let mut writer = FrameWriter::new(sink);
        writer.send(&[0x00, 0xB0, 0x00, 0x00, 0x10]).unwrap();

        let sink = writer.into_inner();
        assert!(sink.flushed);
        assert_eq!(sink.data, vec![0x00, 0x05, 0x00, 0xB0, 0x00, 0x00, 0x10]);
    }

    #[test]
    fn write_timeout_is_not_retried() {
        let mut sink = Flaky::new();
        sink.write_failure = Some(ErrorKind::WouldBlock);

        let mut writer = FrameWriter::new(sink);
        let err = writer.send(&[0x90, 0x00]).unwrap_err();
        assert!(err.is_timeout());
        assert!(writer.get_ref().data.is_empty());
    }

    #[test]
    fn zero_length_write_means_closed() {
        let mut sink = Flaky::new();
        sink.zero_writes = true;

        let mut writer = FrameWriter::new(sink);
        let err = writer.send(&[0x90, 0x00]).unwrap_err();
        assert!(err.is_end_of_stream());
    }

    #[test]
    fn socket_writer_accepts_write_timeout() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let client = std::net::TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (_card, _) = listener.accept().unwrap();

        let config = FrameConfig {
            write_timeout: Some(std::time::Duration::from_millis(10)),
            ..FrameConfig::default()
        };
        let writer = FrameWriter::with_config_stream(VpcdStream::from_tcp(client), config)
            .expect("timeout should apply");
        assert_eq!(
            writer.config().write_timeout,
            Some(std::time::Duration::from_millis(10))
        );
    }
}
