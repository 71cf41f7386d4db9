//! VPCD session engine.
//!
//! A [`Session`] drives one VPCD connection (dialed or accepted) against one
//! card backend, reporting progress as [`StatusEvent`]s. A [`Supervisor`]
//! runs sessions on a worker thread and guarantees at most one is live.

pub mod cancel;
pub mod config;
pub mod error;
pub mod event;
pub mod session;
pub mod state;
pub mod supervisor;

pub use cancel::CancelToken;
pub use config::{SessionConfig, DEFAULT_HOSTNAME, DEFAULT_PORT};
pub use error::{Result, SessionError};
pub use event::{ChannelSink, EventSink, ExitReason, StatusEvent, TracingSink};
pub use session::Session;
pub use state::{SessionState, StateHandle};
pub use supervisor::Supervisor;
