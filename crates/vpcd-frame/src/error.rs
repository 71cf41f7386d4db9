/// Failures while framing or unframing VPCD messages.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload does not fit the 16-bit length prefix.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A one-byte frame carried an unknown control code.
    #[error("unhandled command 0x{0:02x}")]
    UnhandledCommand(u8),

    /// A one-byte APDU cannot be sent: the peer would read it as a control command.
    #[error("a 1-byte APDU is indistinguishable from a control command")]
    AmbiguousApdu,

    /// The socket failed, including read and write timeouts.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer hung up, between frames or in the middle of one.
    #[error("connection closed")]
    ConnectionClosed,
}

impl FrameError {
    /// Whether this error means the peer is gone rather than misbehaving.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, FrameError::ConnectionClosed)
    }

    /// Whether this error is a read or write timeout on the stream.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            FrameError::Io(err)
                if err.kind() == std::io::ErrorKind::WouldBlock
                    || err.kind() == std::io::ErrorKind::TimedOut
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
