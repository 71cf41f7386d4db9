//! Card backends for the VPCD bridge.
//!
//! A [`CardBackend`] is what a VPCD session talks to: a contactless tag
//! ([`ProximityBackend`]), an in-process simulator ([`SimulatorBackend`]) or
//! another VPCD card reached over TCP ([`RemoteCard`]).

pub mod atr;
pub mod backend;
pub mod error;
pub mod proximity;
pub mod remote;
pub mod simulator;

pub use atr::{synthesize_atr, translate_to_mbli, type_b_historical_bytes};
pub use backend::CardBackend;
pub use error::{BackendError, Result};
pub use proximity::{ProximityBackend, ProximityTag, TypeBInfo, SELECT_MF};
pub use remote::RemoteCard;
pub use simulator::{dummy_backend, CardSimulator, DummyCard, SimulatorBackend, DUMMY_ATR};
