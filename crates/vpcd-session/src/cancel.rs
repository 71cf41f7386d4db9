use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};
use vpcd_transport::ShutdownHandle;

/// Cancels a running session from another thread.
///
/// Cancelling shuts down the registered connection, which unblocks a pending
/// frame read. A pending accept observes the flag at its next poll.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<Mutex<CancelState>>,
}

#[derive(Debug, Default)]
struct CancelState {
    cancelled: bool,
    connection: Option<ShutdownHandle>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        let connection = {
            let mut state = self.lock();
            if state.cancelled {
                return;
            }
            state.cancelled = true;
            state.connection.take()
        };

        debug!("session cancellation requested");
        if let Some(connection) = connection {
            if let Err(err) = connection.shutdown() {
                warn!(error = %err, "failed to shut down connection on cancel");
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.lock().cancelled
    }

    /// Track the active connection. Returns `false`, without keeping the
    /// handle, when cancellation already happened.
    pub(crate) fn register(&self, connection: ShutdownHandle) -> bool {
        let mut state = self.lock();
        if state.cancelled {
            return false;
        }
        state.connection = Some(connection);
        true
    }

    /// Forget the active connection once it is closed.
    pub(crate) fn clear(&self) {
        self.lock().connection = None;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CancelState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::net::{TcpListener, TcpStream};
    use std::time::Duration;

    use vpcd_transport::VpcdStream;

    use super::*;

    fn pair() -> (VpcdStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        (VpcdStream::from_tcp(server), client)
    }

    #[test]
    fn cancel_unblocks_registered_reader() {
        let (mut stream, _client) = pair();
        let token = CancelToken::new();
        assert!(token.register(stream.shutdown_handle().unwrap()));

        let reader = std::thread::spawn(move || {
            let mut buf = [0u8; 2];
            stream.read(&mut buf)
        });

        std::thread::sleep(Duration::from_millis(50));
        token.cancel();

        let result = reader.join().unwrap();
        assert!(matches!(result, Ok(0) | Err(_)));
        assert!(token.is_cancelled());
    }

    #[test]
    fn register_after_cancel_is_refused() {
        let (stream, _client) = pair();
        let token = CancelToken::new();
        token.cancel();

        assert!(!token.register(stream.shutdown_handle().unwrap()));
    }

    #[test]
    fn cancel_is_idempotent_and_shared() {
        let token = CancelToken::new();
        let clone = token.clone();

        clone.cancel();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn cleared_connection_is_not_shut_down() {
        let (mut stream, mut client) = pair();
        let token = CancelToken::new();
        token.register(stream.shutdown_handle().unwrap());
        token.clear();
        token.cancel();

        std::io::Write::write_all(&mut client, b"\x00\x01").unwrap();
        let mut buf = [0u8; 2];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [0x00, 0x01]);
    }
}
