use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, info, warn};
use vpcd_card::CardBackend;
use vpcd_frame::{
    ControlCommand, Frame, FrameConfig, FrameError, FrameReader, FrameWriter, Request,
    MAX_PAYLOAD,
};
use vpcd_transport::{TcpTransport, VpcdStream};

use crate::cancel::CancelToken;
use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::event::{EventSink, ExitReason, StatusEvent};
use crate::state::{SessionState, StateHandle};

/// One VPCD connection lifecycle bound to one card backend.
///
/// `run` blocks the calling thread until the session ends. The backend is
/// ejected exactly once on every exit path, and the last event delivered to
/// the sink is always [`StatusEvent::Disconnected`].
pub struct Session {
    config: SessionConfig,
    backend: Box<dyn CardBackend>,
    sink: Arc<dyn EventSink>,
    cancel: CancelToken,
    state: StateHandle,
    ejected: bool,
}

impl Session {
    pub fn new(
        config: SessionConfig,
        backend: Box<dyn CardBackend>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            config,
            backend,
            sink,
            cancel: CancelToken::new(),
            state: StateHandle::default(),
            ejected: false,
        }
    }

    /// Token that cancels this session from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Shared view of the session state.
    pub fn state_handle(&self) -> StateHandle {
        self.state.clone()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Serve until cancelled, closed by the peer, or failed.
    pub fn run(mut self) -> ExitReason {
        info!(
            backend = self.backend.name(),
            listen = self.config.listen,
            "starting vpcd session"
        );

        let reason = match self.serve() {
            Ok(reason) => reason,
            Err(err) if self.cancel.is_cancelled() => {
                debug!(error = %err, "session ended by cancellation");
                ExitReason::Cancelled
            }
            Err(err) => {
                self.emit(StatusEvent::Error {
                    message: err.to_string(),
                });
                ExitReason::Failed(err.kind().to_string())
            }
        };

        self.teardown(&reason);
        reason
    }

    fn serve(&mut self) -> Result<ExitReason> {
        self.state.advance(SessionState::Connecting);
        if self.config.listen {
            self.serve_listening()
        } else {
            self.serve_client()
        }
    }

    fn serve_client(&mut self) -> Result<ExitReason> {
        info!(
            host = %self.config.hostname,
            port = self.config.port,
            "connecting to vpcd"
        );
        if self.cancel.is_cancelled() {
            return Ok(ExitReason::Cancelled);
        }
        let stream = TcpTransport::connect(
            &self.config.hostname,
            self.config.port,
            self.config.connect_timeout,
        )?;
        let address = describe_peer(stream.peer_addr(), &self.config.hostname);

        if !self.cancel.register(stream.shutdown_handle()?) {
            return Ok(ExitReason::Cancelled);
        }
        self.state.advance(SessionState::Connected);
        info!(%address, "connected to vpcd");
        self.emit(StatusEvent::Connected { address });

        self.serve_connection(stream)?;

        if self.cancel.is_cancelled() {
            return Ok(ExitReason::Cancelled);
        }
        info!("end of stream, finishing");
        Ok(ExitReason::PeerClosed)
    }

    fn serve_listening(&mut self) -> Result<ExitReason> {
        let transport = TcpTransport::bind(&self.config.listen_address, self.config.port)?;
        let port = transport.local_addr().port();
        let addresses = interface_addresses();
        info!(port, addresses = %addresses.join(", "), "listening for vpcd");
        self.emit(StatusEvent::Listening { port, addresses });

        loop {
            self.state.advance(SessionState::Listening);
            debug!("waiting for connections");
            let Some(stream) = self.accept_client(&transport)? else {
                return Ok(ExitReason::Cancelled);
            };
            let address = describe_peer(stream.peer_addr(), "unknown peer");

            if !self.cancel.register(stream.shutdown_handle()?) {
                return Ok(ExitReason::Cancelled);
            }
            self.state.advance(SessionState::Connected);
            info!(%address, "client connected");
            self.emit(StatusEvent::Connected {
                address: address.clone(),
            });

            self.serve_connection(stream)?;

            if self.cancel.is_cancelled() {
                return Ok(ExitReason::Cancelled);
            }
            info!(%address, "end of stream, closing client connection");
            self.emit(StatusEvent::ClientDisconnected { address });
        }
    }

    /// Wait for the next client, polling so cancellation is noticed.
    fn accept_client(&self, transport: &TcpTransport) -> Result<Option<VpcdStream>> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(None);
            }
            if let Some(stream) = transport.accept_timeout(self.config.accept_poll_interval)? {
                return Ok(Some(stream));
            }
        }
    }

    /// Process frames until the peer closes the connection.
    ///
    /// On every return the connection is unregistered from the cancel token
    /// and shut down, so the peer sees end of stream even after a failure.
    fn serve_connection(&mut self, stream: VpcdStream) -> Result<()> {
        let result = self.exchange_frames(&stream);
        self.cancel.clear();
        if let Err(err) = stream.shutdown() {
            debug!(error = %err, "connection shutdown failed");
        }
        result
    }

    fn exchange_frames(&mut self, stream: &VpcdStream) -> Result<()> {
        stream.set_nodelay(true)?;
        let frame_config = FrameConfig {
            read_timeout: self.config.io_timeout,
            write_timeout: self.config.io_timeout,
        };
        let mut reader = FrameReader::with_config_stream(stream.try_clone()?, frame_config.clone())?;
        let mut writer = FrameWriter::with_config_stream(stream.try_clone()?, frame_config)?;

        loop {
            let frame = match reader.read_frame() {
                Ok(frame) => frame,
                Err(err) if err.is_end_of_stream() => return Ok(()),
                Err(err) if self.cancel.is_cancelled() => {
                    debug!(error = %err, "read aborted by cancellation");
                    return Ok(());
                }
                Err(err) => return Err(err.into()),
            };

            if let Some(response) = self.dispatch(frame)? {
                if response.len() > MAX_PAYLOAD {
                    return Err(SessionError::Protocol(format!(
                        "response of {} bytes does not fit a frame",
                        response.len()
                    )));
                }
                writer.send(&response)?;
            }
        }
    }

    /// Handle one frame. Returns the payload to send back, if any.
    fn dispatch(&mut self, frame: Frame) -> Result<Option<Vec<u8>>> {
        let request = Request::parse(frame).map_err(|err| match err {
            FrameError::UnhandledCommand(code) => {
                SessionError::Protocol(format!("unhandled command 0x{code:02x}"))
            }
            other => other.into(),
        })?;

        match request {
            Request::Control(command) => self.control(command),
            Request::Apdu(apdu) => self.transmit(&apdu).map(Some),
        }
    }

    fn control(&mut self, command: ControlCommand) -> Result<Option<Vec<u8>>> {
        debug!(command = command.name(), "control command");
        match command {
            ControlCommand::PowerOff => {
                self.backend.power_off()?;
                info!("powered down the card (cold reset)");
                self.emit(StatusEvent::PoweredOff);
                Ok(None)
            }
            ControlCommand::PowerOn => {
                self.backend.power_on()?;
                self.emit(StatusEvent::PoweredOn);
                let atr = hex::encode_upper(self.backend.atr()?);
                info!(%atr, "powered up the card");
                self.emit(StatusEvent::Atr { atr });
                Ok(None)
            }
            ControlCommand::Reset => {
                self.backend.reset()?;
                info!("reset the card (warm reset)");
                self.emit(StatusEvent::Reset);
                Ok(None)
            }
            ControlCommand::GetAtr => Ok(Some(self.backend.atr()?)),
        }
    }

    fn transmit(&mut self, apdu: &[u8]) -> Result<Vec<u8>> {
        self.emit(StatusEvent::CommandApdu {
            apdu: hex::encode_upper(apdu),
        });
        let response = self.backend.transmit(apdu)?;
        self.emit(StatusEvent::ResponseApdu {
            apdu: hex::encode_upper(&response),
        });
        Ok(response)
    }

    fn teardown(&mut self, reason: &ExitReason) {
        self.state.advance(SessionState::Closing);
        self.cancel.clear();
        self.eject();
        self.emit(StatusEvent::Disconnected {
            reason: reason.clone(),
        });
        self.state.advance(SessionState::Closed);
        info!(%reason, "vpcd session closed");
    }

    fn eject(&mut self) {
        if self.ejected {
            return;
        }
        self.ejected = true;
        if let Err(err) = self.backend.eject() {
            warn!(backend = self.backend.name(), error = %err, "failed to eject card backend");
        }
    }

    fn emit(&self, event: StatusEvent) {
        self.sink.emit(event);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Only reached without teardown when `run` was never called or unwound.
        self.eject();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("backend", &self.backend.name())
            .field("state", &self.state.get())
            .finish()
    }
}

fn describe_peer(addr: Option<SocketAddr>, fallback: &str) -> String {
    addr.map(|addr| addr.to_string())
        .unwrap_or_else(|| fallback.to_string())
}

#[cfg(unix)]
fn interface_addresses() -> Vec<String> {
    match vpcd_transport::local_addresses() {
        Ok(addrs) => addrs.iter().map(ToString::to_string).collect(),
        Err(err) => {
            warn!(error = %err, "could not enumerate local addresses");
            Vec::new()
        }
    }
}

#[cfg(not(unix))]
fn interface_addresses() -> Vec<String> {
    Vec::new()
}
