use std::fmt;
use std::io;

use vpcd_card::BackendError;
use vpcd_frame::FrameError;
use vpcd_session::{ExitReason, SessionError};
use vpcd_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CliError {}

/// Process exit code for a finished session.
pub fn exit_code(reason: &ExitReason) -> i32 {
    match reason {
        ExitReason::Cancelled | ExitReason::PeerClosed => SUCCESS,
        ExitReason::Failed(_) => FAILURE,
    }
}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::AddrInUse
        | io::ErrorKind::AddrNotAvailable => TRANSPORT_ERROR,
        _ => FAILURE,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Resolve { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        TransportError::Bind { ref source, .. }
        | TransportError::Connect { ref source, .. }
            if source.kind() == io::ErrorKind::TimedOut =>
        {
            CliError::new(TIMEOUT, format!("{context}: {err}"))
        }
        TransportError::Io(source) | TransportError::Accept(source) => io_error(context, source),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::PayloadTooLarge { .. } | FrameError::AmbiguousApdu => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::UnhandledCommand(_) | FrameError::ConnectionClosed => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
    }
}

pub fn backend_error(context: &str, err: BackendError) -> CliError {
    match err {
        BackendError::Transport(err) => transport_error(context, err),
        BackendError::Frame(err) => frame_error(context, err),
        BackendError::Io(source) => io_error(context, source),
        other => CliError::new(FAILURE, format!("{context}: {other}")),
    }
}

pub fn session_error(context: &str, err: SessionError) -> CliError {
    match err {
        SessionError::Transport(err) => transport_error(context, err),
        SessionError::Frame(err) => frame_error(context, err),
        SessionError::Backend(err) => backend_error(context, err),
        SessionError::Protocol(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        SessionError::Spawn(_) => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_reason_codes() {
        assert_eq!(exit_code(&ExitReason::Cancelled), SUCCESS);
        assert_eq!(exit_code(&ExitReason::PeerClosed), SUCCESS);
        assert_eq!(exit_code(&ExitReason::Failed("x".to_string())), FAILURE);
    }

    #[test]
    fn refused_connection_is_transport_error() {
        let err = TransportError::Connect {
            addr: "127.0.0.1:1".to_string(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        assert_eq!(transport_error("connect", err).code, TRANSPORT_ERROR);
    }

    #[test]
    fn connect_timeout_maps_to_124() {
        let err = BackendError::Transport(TransportError::Connect {
            addr: "10.0.2.2:35963".to_string(),
            source: io::Error::from(io::ErrorKind::TimedOut),
        });
        let cli = backend_error("relay", err);
        assert_eq!(cli.code, TIMEOUT);
        assert!(cli.message.starts_with("relay: "));
    }

    #[test]
    fn ambiguous_apdu_is_invalid_data() {
        assert_eq!(
            frame_error("transmit", FrameError::AmbiguousApdu).code,
            DATA_INVALID
        );
    }

    #[test]
    fn spawn_failure_is_internal() {
        let err = SessionError::Spawn(io::Error::other("no threads"));
        assert_eq!(session_error("start", err).code, INTERNAL);
    }
}
