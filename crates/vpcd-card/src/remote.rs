//! Remote card reached over VPCD.
//!
//! Here this process plays the reader: it sends control and APDU frames and
//! reads the card's answers. Used both to relay a session to a virtual card
//! elsewhere and to drive a card that connected to us.

use std::net::SocketAddr;
use std::time::Duration;

use tracing::{debug, info};
use vpcd_frame::{ControlCommand, FrameError, FrameReader, FrameWriter};
use vpcd_transport::{ShutdownHandle, TcpTransport, VpcdStream};

use crate::backend::CardBackend;
use crate::error::{BackendError, Result};

/// [`CardBackend`] that forwards everything to a remote VPCD card.
pub struct RemoteCard {
    reader: FrameReader<VpcdStream>,
    writer: FrameWriter<VpcdStream>,
    shutdown: ShutdownHandle,
    peer: Option<SocketAddr>,
    ejected: bool,
}

impl RemoteCard {
    /// Dial a remote card at `host:port` and power it on.
    pub fn connect(host: &str, port: u16, timeout: Option<Duration>) -> Result<Self> {
        let stream = TcpTransport::connect(host, port, timeout)?;
        let mut card = Self::from_stream(stream)?;
        info!(host, port, "connected to remote card");
        card.power_on()?;
        Ok(card)
    }

    /// Wrap an established connection to a card. No command is sent.
    pub fn from_stream(stream: VpcdStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr();
        let shutdown = stream.shutdown_handle()?;
        let read_half = stream.try_clone()?;

        Ok(Self {
            reader: FrameReader::new(read_half),
            writer: FrameWriter::new(stream),
            shutdown,
            peer,
            ejected: false,
        })
    }

    /// Address of the remote card, when known.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    fn control(&mut self, command: ControlCommand) -> Result<()> {
        self.ensure_live()?;
        debug!(command = command.name(), "sending control command");
        self.writer.send_control(command)?;
        Ok(())
    }

    fn read_response(&mut self) -> Result<Vec<u8>> {
        match self.reader.read_frame() {
            Ok(frame) => Ok(frame.payload.to_vec()),
            Err(FrameError::ConnectionClosed) => Err(BackendError::RemoteClosed),
            Err(err) => Err(err.into()),
        }
    }

    fn ensure_live(&self) -> Result<()> {
        if self.ejected {
            return Err(BackendError::Ejected);
        }
        Ok(())
    }
}

impl CardBackend for RemoteCard {
    fn name(&self) -> &'static str {
        "relay"
    }

    fn power_on(&mut self) -> Result<()> {
        self.control(ControlCommand::PowerOn)
    }

    fn power_off(&mut self) -> Result<()> {
        if self.ejected {
            return Ok(());
        }
        self.control(ControlCommand::PowerOff)
    }

    fn reset(&mut self) -> Result<()> {
        self.control(ControlCommand::Reset)
    }

    fn atr(&mut self) -> Result<Vec<u8>> {
        self.control(ControlCommand::GetAtr)?;
        self.read_response()
    }

    fn transmit(&mut self, apdu: &[u8]) -> Result<Vec<u8>> {
        self.ensure_live()?;
        debug!(apdu = %hex::encode(apdu), "relaying APDU");
        self.writer.send_apdu(apdu)?;
        self.read_response()
    }

    fn eject(&mut self) -> Result<()> {
        if self.ejected {
            return Ok(());
        }
        self.ejected = true;
        debug!(peer = ?self.peer, "closing remote card connection");
        self.shutdown.shutdown()?;
        Ok(())
    }
}

impl std::fmt::Debug for RemoteCard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCard")
            .field("peer", &self.peer)
            .field("ejected", &self.ejected)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;

    use super::*;

    /// A scripted remote card: records every frame, answers APDUs and GET_ATR.
    fn spawn_card(
        frames_to_read: usize,
    ) -> (u16, std::thread::JoinHandle<Vec<Vec<u8>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut seen = Vec::new();
            for _ in 0..frames_to_read {
                let mut len = [0u8; 2];
                if stream.read_exact(&mut len).is_err() {
                    break;
                }
                let mut payload = vec![0u8; u16::from_be_bytes(len) as usize];
                stream.read_exact(&mut payload).unwrap();

                let reply: Option<&[u8]> = match payload.as_slice() {
                    [0x04] => Some(&[0x3B, 0x80, 0x80, 0x01, 0x01][..]),
                    [_] => None,
                    _ => Some(&[0x90, 0x00][..]),
                };
                if let Some(reply) = reply {
                    let mut out = (reply.len() as u16).to_be_bytes().to_vec();
                    out.extend_from_slice(reply);
                    stream.write_all(&out).unwrap();
                }
                seen.push(payload);
            }
            seen
        });

        (port, handle)
    }

    #[test]
    fn connect_powers_on_then_relays() {
        let (port, card) = spawn_card(4);

        let mut remote = RemoteCard::connect("127.0.0.1", port, Some(Duration::from_secs(2))).unwrap();
        assert!(remote.peer_addr().is_some());

        assert_eq!(remote.atr().unwrap(), vec![0x3B, 0x80, 0x80, 0x01, 0x01]);
        assert_eq!(
            remote.transmit(&[0x00, 0xA4, 0x00, 0x0C]).unwrap(),
            vec![0x90, 0x00]
        );
        remote.reset().unwrap();
        remote.eject().unwrap();

        let seen = card.join().unwrap();
        assert_eq!(
            seen,
            vec![
                vec![0x01],
                vec![0x04],
                vec![0x00, 0xA4, 0x00, 0x0C],
                vec![0x02],
            ]
        );
    }

    #[test]
    fn closed_card_is_backend_error() {
        // The card reads the power-on frame and hangs up.
        let (port, card) = spawn_card(1);

        let mut remote = RemoteCard::connect("127.0.0.1", port, None).unwrap();
        card.join().unwrap();

        let err = remote.transmit(&[0x00, 0xB0, 0x00, 0x00]).unwrap_err();
        assert!(matches!(
            err,
            BackendError::RemoteClosed | BackendError::Frame(_)
        ));
    }

    #[test]
    fn single_byte_apdu_is_refused() {
        let (port, _card) = spawn_card(1);

        let mut remote = RemoteCard::connect("127.0.0.1", port, None).unwrap();
        let err = remote.transmit(&[0x00]).unwrap_err();
        assert!(matches!(err, BackendError::Frame(FrameError::AmbiguousApdu)));
    }

    #[test]
    fn eject_is_idempotent_and_final() {
        let (port, _card) = spawn_card(1);

        let mut remote = RemoteCard::connect("127.0.0.1", port, None).unwrap();
        remote.eject().unwrap();
        remote.eject().unwrap();
        remote.power_off().unwrap();

        assert!(matches!(remote.atr(), Err(BackendError::Ejected)));
    }

    #[test]
    fn connect_refused_is_transport_error() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let err = RemoteCard::connect("127.0.0.1", port, Some(Duration::from_secs(1))).unwrap_err();
        assert!(matches!(err, BackendError::Transport(_)));
    }
}
