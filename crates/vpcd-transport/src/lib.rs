//! TCP transport for the VPCD protocol.
//!
//! The virtual reader daemon and the card side talk over a plain TCP
//! connection, either direction:
//! - the card side dials out to a listening daemon ([`TcpTransport::connect`])
//! - or the card side listens and the daemon dials in ([`TcpTransport::bind`])
//!
//! This is the lowest layer. Framing lives in `vpcd-frame`, everything else
//! builds on the [`VpcdStream`] type provided here.

pub mod error;
pub mod stream;

#[cfg(unix)]
pub mod interfaces;
pub mod tcp;

pub use error::{Result, TransportError};
pub use stream::{ShutdownHandle, VpcdStream};
pub use tcp::{resolve, TcpTransport, DEFAULT_ACCEPT_POLL_INTERVAL};

#[cfg(unix)]
pub use interfaces::local_addresses;
