//! Status events and the sinks that receive them.
//!
//! Events are delivered synchronously from the session thread in the order
//! they happen. Sinks must hand them off quickly: a sink that blocks stalls
//! the card.

use std::sync::mpsc;

use serde::Serialize;
use tracing::{debug, error, info};

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// Cancelled from outside.
    Cancelled,
    /// The reader side closed the connection (client mode).
    PeerClosed,
    /// The session failed.
    Failed(String),
}

impl ExitReason {
    pub fn is_failure(&self) -> bool {
        matches!(self, ExitReason::Failed(_))
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::Cancelled => f.write_str("cancelled"),
            ExitReason::PeerClosed => f.write_str("peer closed"),
            ExitReason::Failed(message) => write!(f, "failed: {message}"),
        }
    }
}

/// Something an observer may want to show or log.
///
/// APDUs and ATRs are carried as uppercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StatusEvent {
    /// Listen mode is ready. `addresses` lists non-loopback interface addresses.
    Listening { port: u16, addresses: Vec<String> },
    /// A reader connection is established.
    Connected { address: String },
    PoweredOn,
    PoweredOff,
    Reset,
    /// ATR reported after power-on.
    Atr { atr: String },
    /// Command APDU about to be sent to the card.
    CommandApdu { apdu: String },
    /// Response APDU returned by the card.
    ResponseApdu { apdu: String },
    /// The session hit an error. Always followed by `Disconnected`.
    Error { message: String },
    /// A listen-mode client went away; the session keeps listening.
    ClientDisconnected { address: String },
    /// Terminal event, emitted exactly once.
    Disconnected { reason: ExitReason },
}

impl StatusEvent {
    /// Stable short name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            StatusEvent::Listening { .. } => "listening",
            StatusEvent::Connected { .. } => "connected",
            StatusEvent::PoweredOn => "powered_on",
            StatusEvent::PoweredOff => "powered_off",
            StatusEvent::Reset => "reset",
            StatusEvent::Atr { .. } => "atr",
            StatusEvent::CommandApdu { .. } => "command_apdu",
            StatusEvent::ResponseApdu { .. } => "response_apdu",
            StatusEvent::Error { .. } => "error",
            StatusEvent::ClientDisconnected { .. } => "client_disconnected",
            StatusEvent::Disconnected { .. } => "disconnected",
        }
    }

    /// One-line human description.
    pub fn describe(&self) -> String {
        match self {
            StatusEvent::Listening { port, addresses } if addresses.is_empty() => {
                format!("listening on port {port}")
            }
            StatusEvent::Listening { port, addresses } => {
                format!("listening on port {port}; local addresses: {}", addresses.join(", "))
            }
            StatusEvent::Connected { address } => format!("connected to {address}"),
            StatusEvent::PoweredOn => "powered up the card".to_string(),
            StatusEvent::PoweredOff => "powered down the card (cold reset)".to_string(),
            StatusEvent::Reset => "reset the card (warm reset)".to_string(),
            StatusEvent::Atr { atr } => format!("ATR {atr}"),
            StatusEvent::CommandApdu { apdu } => format!("C-APDU {apdu}"),
            StatusEvent::ResponseApdu { apdu } => format!("R-APDU {apdu}"),
            StatusEvent::Error { message } => format!("error: {message}"),
            StatusEvent::ClientDisconnected { address } => {
                format!("client {address} disconnected; waiting for connections")
            }
            StatusEvent::Disconnected { reason } => format!("disconnected ({reason})"),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StatusEvent::Disconnected { .. })
    }
}

impl std::fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Receives status events from a session.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: StatusEvent);
}

impl<F> EventSink for F
where
    F: Fn(StatusEvent) + Send + Sync,
{
    fn emit(&self, event: StatusEvent) {
        self(event)
    }
}

/// Hands events to a receiver over an unbounded channel. Never blocks.
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<StatusEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiver that drains it.
    pub fn pair() -> (Self, mpsc::Receiver<StatusEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: StatusEvent) {
        if let Err(mpsc::SendError(event)) = self.tx.send(event) {
            debug!(event = event.kind(), "status receiver gone; event not delivered");
        }
    }
}

/// Writes every event to the `tracing` log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: StatusEvent) {
        match &event {
            StatusEvent::Error { message } => error!(%message, "session error"),
            StatusEvent::CommandApdu { apdu } => debug!(%apdu, "C-APDU"),
            StatusEvent::ResponseApdu { apdu } => debug!(%apdu, "R-APDU"),
            other => info!(event = other.kind(), "{}", other.describe()),
        }
    }
}
