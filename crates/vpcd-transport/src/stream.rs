use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use tracing::debug;

use crate::error::Result;

/// A connected VPCD stream. Implements `Read` and `Write`.
///
/// This is the fundamental I/O type returned by transport operations. It
/// wraps one TCP connection, whichever side initiated it.
pub struct VpcdStream {
    inner: TcpStream,
    peer: Option<SocketAddr>,
}

impl Read for VpcdStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for VpcdStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl VpcdStream {
    /// Wrap an established TCP stream.
    pub fn from_tcp(stream: TcpStream) -> Self {
        let peer = stream.peer_addr().ok();
        Self {
            inner: stream,
            peer,
        }
    }

    /// Address of the remote end, if the OS reported one at connect time.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// `None` blocks reads until data or end of stream.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_read_timeout(timeout).map_err(Into::into)
    }

    /// `None` blocks writes until the peer drains its window.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_write_timeout(timeout).map_err(Into::into)
    }

    /// Disable Nagle's algorithm. Frames are tiny and strictly request/response.
    pub fn set_nodelay(&self, nodelay: bool) -> Result<()> {
        self.inner.set_nodelay(nodelay).map_err(Into::into)
    }

    /// Second handle on the same socket, for a dedicated read side.
    pub fn try_clone(&self) -> Result<Self> {
        let cloned = self.inner.try_clone()?;
        Ok(Self {
            inner: cloned,
            peer: self.peer,
        })
    }

    /// Create a handle that can close this connection from another thread.
    pub fn shutdown_handle(&self) -> Result<ShutdownHandle> {
        Ok(ShutdownHandle {
            inner: self.inner.try_clone()?,
            peer: self.peer,
        })
    }

    /// Shut down both directions of the connection.
    pub fn shutdown(&self) -> Result<()> {
        shutdown_quietly(&self.inner, self.peer)
    }
}

/// Closes a [`VpcdStream`] out from under a thread blocked reading it.
///
/// Shutting down the socket makes a pending `read` on any clone of the same
/// connection return end-of-stream (or an error), which is how a blocked
/// session is unblocked.
pub struct ShutdownHandle {
    inner: TcpStream,
    peer: Option<SocketAddr>,
}

impl ShutdownHandle {
    /// Shut down both directions of the connection.
    pub fn shutdown(&self) -> Result<()> {
        shutdown_quietly(&self.inner, self.peer)
    }
}

impl std::fmt::Debug for ShutdownHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownHandle")
            .field("peer", &self.peer)
            .finish()
    }
}

fn shutdown_quietly(stream: &TcpStream, peer: Option<SocketAddr>) -> Result<()> {
    match stream.shutdown(Shutdown::Both) {
        Ok(()) => {
            debug!(?peer, "connection shut down");
            Ok(())
        }
        // Already closed by the peer.
        Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
        Err(err) => Err(err.into()),
    }
}

impl std::fmt::Debug for VpcdStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VpcdStream")
            .field("type", &"tcp")
            .field("peer", &self.peer)
            .finish()
    }
}
