//! VPCD message framing.
//!
//! Every message on a VPCD connection is framed with a 2-byte big-endian
//! payload length followed by the payload. One-byte payloads are control
//! commands; everything else is an APDU.
//!
//! No partial reads, no buffer management in user code.

#[cfg(feature = "async")]
pub mod async_codec;
pub mod codec;
pub mod control;
pub mod error;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub use async_codec::VpcdCodec;
pub use codec::{decode_frame, encode_frame, Frame, FrameConfig, HEADER_SIZE, MAX_PAYLOAD};
pub use control::{ControlCommand, Request, CONTROL_LEN};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
