//! Serve the built-in dummy card to a VPCD reader.
//!
//! Run with: cargo run -p vpcd-bridge --example dummy-card -- 127.0.0.1 35963
//!
//! Without arguments it dials the emulator host address on the default port.

use std::sync::Arc;

use vpcd_bridge::card::dummy_backend;
use vpcd_bridge::session::{
    SessionConfig, StatusEvent, Supervisor, DEFAULT_HOSTNAME, DEFAULT_PORT,
};

fn main() {
    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| DEFAULT_HOSTNAME.to_string());
    let port = args
        .next()
        .and_then(|port| port.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    let sink = |event: StatusEvent| println!("[{}] {event}", event.kind());

    let mut supervisor = Supervisor::new();
    if let Err(err) = supervisor.start(
        SessionConfig::client(host, port),
        Box::new(dummy_backend()),
        Arc::new(sink),
    ) {
        eprintln!("failed to start session: {err}");
        std::process::exit(1);
    }

    if supervisor.wait().is_some_and(|reason| reason.is_failure()) {
        std::process::exit(1);
    }
}
