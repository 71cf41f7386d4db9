use std::sync::Arc;

use tracing::{info, warn};
use vpcd_card::{dummy_backend, CardBackend, RemoteCard};
use vpcd_session::{CancelToken, ChannelSink, ExitReason, SessionConfig, Supervisor};

use crate::cmd::{parse_duration, BackendKind, RunArgs};
use crate::exit::{backend_error, exit_code, session_error, CliError, CliResult, INTERNAL, USAGE};
use crate::output::{print_record, OutputFormat};

pub fn run(args: RunArgs, format: OutputFormat) -> CliResult<i32> {
    let config = session_config(&args)?;
    let backend = open_backend(&args, config.connect_timeout)?;

    let mut supervisor = Supervisor::new();
    let (sink, events) = ChannelSink::pair();
    supervisor
        .start(config, backend, Arc::new(sink))
        .map_err(|err| session_error("session start failed", err))?;

    let token = supervisor
        .cancel_token()
        .ok_or_else(|| CliError::new(INTERNAL, "session did not start"))?;
    install_ctrlc_handler(token)?;

    // The sink is dropped with the session, which ends this loop even if the
    // terminal event never arrives.
    for event in events.iter() {
        print_record(&event, format);
        if event.is_terminal() {
            break;
        }
    }

    let reason = supervisor.wait().unwrap_or_else(|| {
        warn!("session ended without an exit reason");
        ExitReason::Failed("session ended without an exit reason".to_string())
    });
    info!(%reason, "session finished");
    Ok(exit_code(&reason))
}

fn session_config(args: &RunArgs) -> CliResult<SessionConfig> {
    let mut config = if args.listen {
        SessionConfig::listener(args.port).with_listen_address(args.listen_address.clone())
    } else {
        if args.port == 0 {
            return Err(CliError::new(USAGE, "--port 0 is only valid with --listen"));
        }
        SessionConfig::client(args.host.clone(), args.port)
    };

    config.connect_timeout = Some(parse_duration(&args.connect_timeout)?);
    let io_timeout = args.io_timeout.as_deref().map(parse_duration).transpose()?;
    Ok(config.with_io_timeout(io_timeout))
}

fn open_backend(
    args: &RunArgs,
    connect_timeout: Option<std::time::Duration>,
) -> CliResult<Box<dyn CardBackend>> {
    match args.backend {
        BackendKind::Dummy => Ok(Box::new(dummy_backend())),
        BackendKind::Relay => {
            let host = args
                .relay_host
                .as_deref()
                .ok_or_else(|| CliError::new(USAGE, "--relay-host is required for --backend relay"))?;
            let card = RemoteCard::connect(host, args.relay_port, connect_timeout)
                .map_err(|err| backend_error("remote card unreachable", err))?;
            Ok(Box::new(card))
        }
    }
}

fn install_ctrlc_handler(token: CancelToken) -> CliResult<()> {
    ctrlc::set_handler(move || {
        info!("interrupt received, cancelling session");
        token.cancel();
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn args(listen: bool, port: u16) -> RunArgs {
        RunArgs {
            host: "127.0.0.1".to_string(),
            port,
            listen,
            listen_address: "127.0.0.1".to_string(),
            backend: BackendKind::Dummy,
            relay_host: None,
            relay_port: vpcd_session::DEFAULT_PORT,
            connect_timeout: "3s".to_string(),
            io_timeout: None,
        }
    }

    #[test]
    fn client_config_from_args() {
        let config = session_config(&args(false, 4000)).expect("config should build");
        assert!(!config.listen);
        assert_eq!(config.hostname, "127.0.0.1");
        assert_eq!(config.port, 4000);
        assert_eq!(config.connect_timeout, Some(Duration::from_secs(3)));
        assert_eq!(config.io_timeout, None);
    }

    #[test]
    fn listen_config_uses_listen_address() {
        let mut run_args = args(true, 0);
        run_args.io_timeout = Some("250ms".to_string());
        let config = session_config(&run_args).expect("config should build");
        assert!(config.listen);
        assert_eq!(config.listen_address, "127.0.0.1");
        assert_eq!(config.io_timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn dialing_port_zero_is_a_usage_error() {
        let err = session_config(&args(false, 0)).expect_err("port 0 cannot be dialed");
        assert_eq!(err.code, USAGE);
    }

    #[test]
    fn relay_to_closed_port_fails_before_session() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut run_args = args(true, 0);
        run_args.backend = BackendKind::Relay;
        run_args.relay_host = Some("127.0.0.1".to_string());
        run_args.relay_port = port;

        let err = open_backend(&run_args, Some(Duration::from_secs(1)))
            .err()
            .expect("relay should fail");
        assert!(err.message.starts_with("remote card unreachable"));
    }
}
