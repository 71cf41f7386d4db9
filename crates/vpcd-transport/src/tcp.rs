use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::VpcdStream;

/// How long a single accept poll blocks before giving the caller a chance to
/// observe cancellation.
pub const DEFAULT_ACCEPT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// TCP transport.
///
/// Provides bind/accept for the listening card side and connect for the
/// dialing card side. Accepting is bounded by a poll interval so a caller
/// blocked waiting for a reader can still be cancelled.
pub struct TcpTransport {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpTransport {
    /// Bind and listen on `host:port`. Port 0 picks an ephemeral port.
    pub fn bind(host: &str, port: u16) -> Result<Self> {
        let addrs = resolve(host, port)?;
        let listener = TcpListener::bind(&addrs[..]).map_err(|e| TransportError::Bind {
            addr: format!("{host}:{port}"),
            source: e,
        })?;
        let local_addr = listener.local_addr().map_err(|e| TransportError::Bind {
            addr: format!("{host}:{port}"),
            source: e,
        })?;

        info!(%local_addr, "listening for vpcd connections");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept an incoming connection (blocking, no bound).
    pub fn accept(&self) -> Result<VpcdStream> {
        let (stream, addr) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(%addr, "accepted connection");
        prepare_accepted(stream)
    }

    /// Wait up to `timeout` for an incoming connection.
    ///
    /// Returns `Ok(None)` when nothing arrived in time.
    pub fn accept_timeout(&self, timeout: Duration) -> Result<Option<VpcdStream>> {
        match poll_accept(&self.listener, timeout) {
            Ok(Some((stream, addr))) => {
                debug!(%addr, "accepted connection");
                prepare_accepted(stream).map(Some)
            }
            Ok(None) => Ok(None),
            // The pending connection was reset between poll and accept.
            Err(err)
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::WouldBlock
                        | std::io::ErrorKind::ConnectionAborted
                        | std::io::ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(err) => Err(TransportError::Accept(err)),
        }
    }

    /// Connect to a listening VPCD endpoint (blocking).
    ///
    /// Every resolved address is tried in order; the last failure is reported.
    pub fn connect(host: &str, port: u16, timeout: Option<Duration>) -> Result<VpcdStream> {
        let addrs = resolve(host, port)?;
        let mut last_err = None;

        for addr in addrs {
            let attempt = match timeout {
                Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => {
                    debug!(%addr, "connected to vpcd endpoint");
                    return Ok(VpcdStream::from_tcp(stream));
                }
                Err(err) => {
                    debug!(%addr, error = %err, "connect attempt failed");
                    last_err = Some(err);
                }
            }
        }

        Err(TransportError::Connect {
            addr: format!("{host}:{port}"),
            source: last_err.unwrap_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses to connect to")
            }),
        })
    }

    /// The address this transport is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "tcp"
    }
}

impl std::fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport")
            .field("local_addr", &self.local_addr)
            .finish()
    }
}

/// Resolve `host:port` into socket addresses.
pub fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>> {
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| TransportError::Resolve {
            host: host.to_string(),
            port,
            source: e,
        })?
        .collect();

    if addrs.is_empty() {
        return Err(TransportError::Resolve {
            host: host.to_string(),
            port,
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses found"),
        });
    }

    Ok(addrs)
}

fn prepare_accepted(stream: TcpStream) -> Result<VpcdStream> {
    // Listening sockets may be non-blocking on some platforms; accepted
    // streams must block for the frame reader.
    stream.set_nonblocking(false)?;
    Ok(VpcdStream::from_tcp(stream))
}

#[cfg(unix)]
fn poll_accept(
    listener: &TcpListener,
    timeout: Duration,
) -> std::io::Result<Option<(TcpStream, SocketAddr)>> {
    use std::os::fd::AsRawFd;

    let mut pfd = libc::pollfd {
        fd: listener.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    };
    let millis = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

    // SAFETY: `pfd` is a valid, writable pollfd and we pass a count of one.
    // The descriptor stays open for the duration of the call because
    // `listener` is borrowed.
    let rc = unsafe { libc::poll(&mut pfd, 1, millis) };

    if rc < 0 {
        return Err(std::io::Error::last_os_error());
    }
    if rc == 0 || (pfd.revents & libc::POLLIN) == 0 {
        return Ok(None);
    }

    listener.accept().map(Some)
}

#[cfg(not(unix))]
fn poll_accept(
    listener: &TcpListener,
    timeout: Duration,
) -> std::io::Result<Option<(TcpStream, SocketAddr)>> {
    // Without poll(2), retry a non-blocking accept until the deadline.
    const STEP: Duration = Duration::from_millis(25);

    listener.set_nonblocking(true)?;
    let deadline = std::time::Instant::now() + timeout;
    let result = loop {
        match listener.accept() {
            Ok(accepted) => break Ok(Some(accepted)),
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                if std::time::Instant::now() >= deadline {
                    break Ok(None);
                }
                std::thread::sleep(STEP);
            }
            Err(err) => break Err(err),
        }
    };
    listener.set_nonblocking(false)?;
    result
}
