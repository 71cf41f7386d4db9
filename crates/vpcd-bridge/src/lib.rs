//! Bridge a smart card to a virtual smart card reader.
//!
//! The VPCD protocol lets a PC/SC reader driver on one machine talk to a card
//! that lives somewhere else: a contactless tag, a simulator, or another VPCD
//! card. This crate re-exports the layers that make up the bridge.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP dialing, listening and cancellable accept
//! - [`frame`]: Length-prefixed VPCD framing and control commands
//! - [`card`]: The card backend capability and its implementations
//! - [`session`]: Session state machine, status events and supervisor
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use vpcd_bridge::card::dummy_backend;
//! use vpcd_bridge::session::{SessionConfig, Supervisor, TracingSink};
//!
//! let mut supervisor = Supervisor::new();
//! supervisor
//!     .start(
//!         SessionConfig::listener(35963),
//!         Box::new(dummy_backend()),
//!         Arc::new(TracingSink),
//!     )
//!     .expect("session should start");
//! let reason = supervisor.wait();
//! println!("{reason:?}");
//! ```

/// Re-export transport types.
pub mod transport {
    pub use vpcd_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use vpcd_frame::*;
}

/// Re-export card backends.
pub mod card {
    pub use vpcd_card::*;
}

/// Re-export session types.
pub mod session {
    pub use vpcd_session::*;
}
