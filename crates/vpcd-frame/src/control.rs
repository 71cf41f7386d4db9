//! VPCD control commands and request classification.
//!
//! A frame whose payload is exactly one byte is a control command from the
//! reader side. Every other length, zero included, carries a command APDU.

use bytes::Bytes;

use crate::codec::Frame;
use crate::error::{FrameError, Result};

/// Payload length that marks a frame as a control command.
pub const CONTROL_LEN: usize = 1;

/// Control commands sent by the reader side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ControlCommand {
    /// Remove power from the card.
    PowerOff = 0x00,
    /// Apply power to the card.
    PowerOn = 0x01,
    /// Warm reset.
    Reset = 0x02,
    /// Ask for the Answer-To-Reset. The only control command with a reply.
    GetAtr = 0x04,
}

impl ControlCommand {
    /// Wire code of this command.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Human-readable name for logs.
    pub fn name(self) -> &'static str {
        match self {
            ControlCommand::PowerOff => "POWER_OFF",
            ControlCommand::PowerOn => "POWER_ON",
            ControlCommand::Reset => "RESET",
            ControlCommand::GetAtr => "GET_ATR",
        }
    }

    /// Whether the card side answers this command with a frame.
    pub fn expects_response(self) -> bool {
        matches!(self, ControlCommand::GetAtr)
    }
}

impl TryFrom<u8> for ControlCommand {
    type Error = FrameError;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            0x00 => Ok(ControlCommand::PowerOff),
            0x01 => Ok(ControlCommand::PowerOn),
            0x02 => Ok(ControlCommand::Reset),
            0x04 => Ok(ControlCommand::GetAtr),
            other => Err(FrameError::UnhandledCommand(other)),
        }
    }
}

impl std::fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded request from the reader side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Control(ControlCommand),
    Apdu(Bytes),
}

impl Request {
    /// Classify a received frame.
    ///
    /// Fails with [`FrameError::UnhandledCommand`] for an unknown control code.
    pub fn parse(frame: Frame) -> Result<Self> {
        if frame.len() == CONTROL_LEN {
            return ControlCommand::try_from(frame.payload[0]).map(Request::Control);
        }
        Ok(Request::Apdu(frame.payload))
    }
}
