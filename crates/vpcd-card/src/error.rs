use vpcd_frame::FrameError;
use vpcd_transport::TransportError;

/// Errors raised by a card backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The card or tag failed at the I/O level (tag lost, radio timeout).
    #[error("card I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Framing failure while talking to a remote card.
    #[error("remote card framing error: {0}")]
    Frame(#[from] FrameError),

    /// The remote card could not be reached.
    #[error("remote card transport error: {0}")]
    Transport(#[from] TransportError),

    /// The remote card closed its connection.
    #[error("remote card closed the connection")]
    RemoteClosed,

    /// The backend was used after `eject`.
    #[error("card backend already ejected")]
    Ejected,

    /// A backend-specific failure reported by the card implementation.
    #[error("card fault: {0}")]
    Card(String),
}

pub type Result<T> = std::result::Result<T, BackendError>;
