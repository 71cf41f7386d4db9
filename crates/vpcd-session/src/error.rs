use vpcd_card::BackendError;
use vpcd_frame::FrameError;
use vpcd_transport::TransportError;

/// Errors that end a VPCD session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Dialing, binding or accepting failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Reading or writing frames failed.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The reader side broke the protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The card backend failed.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// The session worker thread could not be started.
    #[error("failed to spawn session worker: {0}")]
    Spawn(std::io::Error),
}

impl SessionError {
    /// Short category of this error, without the underlying detail.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::Transport(_) => "transport error",
            SessionError::Frame(_) => "frame error",
            SessionError::Protocol(_) => "protocol error",
            SessionError::Backend(_) => "backend error",
            SessionError::Spawn(_) => "spawn error",
        }
    }

    /// Whether this is a transport-level I/O failure.
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            SessionError::Transport(_) | SessionError::Frame(FrameError::Io(_))
        )
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_omits_the_detail() {
        let err = SessionError::Protocol("unhandled command 0x03".to_string());
        assert_eq!(err.kind(), "protocol error");
        assert_eq!(err.to_string(), "protocol error: unhandled command 0x03");

        let err = SessionError::Backend(BackendError::Card("tag lost".to_string()));
        assert_eq!(err.kind(), "backend error");
        assert!(!err.kind().contains("tag lost"));
    }
}
