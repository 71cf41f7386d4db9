/// Errors that can occur in VPCD transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The configured host name did not resolve to any socket address.
    #[error("failed to resolve {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        source: std::io::Error,
    },

    /// Failed to bind the listening socket.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// Dialing the reader or remote card failed or timed out.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// `accept` on the listening socket failed.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// Socket option or stream I/O failure.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was shut down locally.
    #[error("transport shut down")]
    Shutdown,
}

impl TransportError {
    /// The underlying I/O error, if this error wraps one.
    pub fn io_source(&self) -> Option<&std::io::Error> {
        match self {
            TransportError::Resolve { source, .. }
            | TransportError::Bind { source, .. }
            | TransportError::Connect { source, .. }
            | TransportError::Accept(source)
            | TransportError::Io(source) => Some(source),
            TransportError::Shutdown => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
