use std::time::Duration;

use vpcd_transport::DEFAULT_ACCEPT_POLL_INTERVAL;

/// Well-known VPCD port.
pub const DEFAULT_PORT: u16 = 35963;

/// Host-side address as seen from an emulator guest.
pub const DEFAULT_HOSTNAME: &str = "10.0.2.2";

/// Address a listening session binds to.
pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0";

/// Bound on dialing the reader side.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Session configuration. Read-only once a session starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Host to dial in client mode.
    pub hostname: String,
    /// Port to dial, or to listen on. 0 picks an ephemeral port when listening.
    pub port: u16,
    /// Accept reader connections instead of dialing out.
    pub listen: bool,
    /// Local address to bind in listen mode.
    pub listen_address: String,
    /// Upper bound on establishing the outgoing connection.
    pub connect_timeout: Option<Duration>,
    /// How often a pending accept wakes up to observe cancellation.
    pub accept_poll_interval: Duration,
    /// Read/write timeout on an established connection. `None` waits forever.
    pub io_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            hostname: DEFAULT_HOSTNAME.to_string(),
            port: DEFAULT_PORT,
            listen: false,
            listen_address: DEFAULT_LISTEN_ADDRESS.to_string(),
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            accept_poll_interval: DEFAULT_ACCEPT_POLL_INTERVAL,
            io_timeout: None,
        }
    }
}

impl SessionConfig {
    /// Dial `hostname:port`.
    pub fn client(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            port,
            ..Self::default()
        }
    }

    /// Listen on `port` on all interfaces.
    pub fn listener(port: u16) -> Self {
        Self {
            port,
            listen: true,
            ..Self::default()
        }
    }

    /// Override the listen bind address.
    pub fn with_listen_address(mut self, address: impl Into<String>) -> Self {
        self.listen_address = address.into();
        self
    }

    /// Override the accept poll interval.
    pub fn with_accept_poll_interval(mut self, interval: Duration) -> Self {
        self.accept_poll_interval = interval;
        self
    }

    /// Override the established-connection I/O timeout.
    pub fn with_io_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.io_timeout = timeout;
        self
    }
}
