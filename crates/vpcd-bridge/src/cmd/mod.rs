use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use vpcd_session::{DEFAULT_HOSTNAME, DEFAULT_PORT};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod reader;
pub mod run;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve a card backend to a virtual smart card reader.
    Run(RunArgs),
    /// Act as the reader: wait for a card, power it on and exchange APDUs.
    Reader(ReaderArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Run(args) => run::run(args, format),
        Command::Reader(args) => reader::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Card backend served by `run`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// Built-in simulated card answering every APDU with 6F00.
    Dummy,
    /// Forward to a remote VPCD card.
    Relay,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Reader host to dial.
    #[arg(long, env = "VPCD_HOST", default_value = DEFAULT_HOSTNAME)]
    pub host: String,
    /// Port to dial, or to listen on with --listen.
    #[arg(long, short = 'p', env = "VPCD_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// Accept reader connections instead of dialing out.
    #[arg(long, env = "VPCD_LISTEN")]
    pub listen: bool,
    /// Local address to bind with --listen.
    #[arg(long, default_value = "0.0.0.0")]
    pub listen_address: String,
    /// Card backend to serve.
    #[arg(long, value_enum, default_value = "dummy")]
    pub backend: BackendKind,
    /// Remote card host for the relay backend.
    #[arg(long, required_if_eq("backend", "relay"))]
    pub relay_host: Option<String>,
    /// Remote card port for the relay backend.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub relay_port: u16,
    /// Bound on dialing out (e.g. 10s, 500ms).
    #[arg(long, env = "VPCD_CONNECT_TIMEOUT", default_value = "10s")]
    pub connect_timeout: String,
    /// Read/write timeout on an established connection. Waits forever when unset.
    #[arg(long)]
    pub io_timeout: Option<String>,
}

#[derive(Args, Debug)]
pub struct ReaderArgs {
    /// Local address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: String,
    /// Port to listen on. 0 picks a free port.
    #[arg(long, short = 'p', default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// Command APDU in hex, sent after power-on. Repeatable.
    #[arg(long, value_name = "HEX")]
    pub apdu: Vec<String>,
    /// Give up when no card connects in time (e.g. 30s).
    #[arg(long)]
    pub timeout: Option<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `500ms`, `5s` or bare seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = match input.strip_suffix("ms") {
        Some(num) => (num, true),
        None => (input.strip_suffix('s').unwrap_or(input), false),
    };

    let value: u64 = number
        .trim()
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_duration(" 10s ").unwrap(), Duration::from_secs(10));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        for bad in ["", "0s", "0", "bad", "5m", "-1s"] {
            let err = parse_duration(bad).expect_err(bad);
            assert_eq!(err.code, USAGE);
        }
    }
}
