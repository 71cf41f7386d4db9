use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use vpcd_card::{CardBackend, RemoteCard};
use vpcd_transport::{TcpTransport, VpcdStream};

use crate::cmd::{parse_duration, ReaderArgs};
use crate::exit::{
    backend_error, transport_error, CliError, CliResult, DATA_INVALID, INTERNAL, SUCCESS, TIMEOUT,
};
use crate::output::{print_record, OutputFormat, ReaderRecord};

const ACCEPT_POLL: Duration = Duration::from_millis(200);
const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(10);

pub fn run(args: ReaderArgs, format: OutputFormat) -> CliResult<i32> {
    let apdus = args
        .apdu
        .iter()
        .map(String::as_str)
        .map(parse_apdu)
        .collect::<CliResult<Vec<_>>>()?;
    let timeout = args.timeout.as_deref().map(parse_duration).transpose()?;

    let transport = TcpTransport::bind(&args.bind, args.port)
        .map_err(|err| transport_error("bind failed", err))?;
    print_record(
        &ReaderRecord::WaitingForCard {
            port: transport.local_addr().port(),
        },
        format,
    );

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(Arc::clone(&running))?;

    let Some(stream) = wait_for_card(&transport, timeout, &running)? else {
        info!("interrupted before a card connected");
        return Ok(SUCCESS);
    };

    stream
        .set_read_timeout(Some(EXCHANGE_TIMEOUT))
        .and_then(|()| stream.set_write_timeout(Some(EXCHANGE_TIMEOUT)))
        .map_err(|err| transport_error("socket setup failed", err))?;
    let mut card =
        RemoteCard::from_stream(stream).map_err(|err| backend_error("card setup failed", err))?;
    let address = card
        .peer_addr()
        .map_or_else(|| "unknown".to_string(), |addr| addr.to_string());
    print_record(&ReaderRecord::CardConnected { address }, format);

    let result = exchange(&mut card, &apdus, format);
    if let Err(err) = card.eject() {
        warn!(error = %err, "failed to close card connection");
    }
    result.map(|()| SUCCESS)
}

fn exchange(card: &mut RemoteCard, apdus: &[Vec<u8>], format: OutputFormat) -> CliResult<()> {
    card.power_on()
        .map_err(|err| backend_error("power on failed", err))?;
    let atr = card
        .atr()
        .map_err(|err| backend_error("ATR request failed", err))?;
    print_record(
        &ReaderRecord::Atr {
            atr: hex::encode_upper(atr),
        },
        format,
    );

    for apdu in apdus {
        let response = card
            .transmit(apdu)
            .map_err(|err| backend_error("transmit failed", err))?;
        print_record(
            &ReaderRecord::Exchange {
                command: hex::encode_upper(apdu),
                response: hex::encode_upper(response),
            },
            format,
        );
    }

    card.power_off()
        .map_err(|err| backend_error("power off failed", err))
}

fn wait_for_card(
    transport: &TcpTransport,
    timeout: Option<Duration>,
    running: &AtomicBool,
) -> CliResult<Option<VpcdStream>> {
    let deadline = timeout.map(|timeout| Instant::now() + timeout);

    while running.load(Ordering::SeqCst) {
        if let Some(stream) = transport
            .accept_timeout(ACCEPT_POLL)
            .map_err(|err| transport_error("accept failed", err))?
        {
            return Ok(Some(stream));
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(CliError::new(
                TIMEOUT,
                format!("no card connected within {:?}", timeout.unwrap_or_default()),
            ));
        }
        debug!("still waiting for a card");
    }
    Ok(None)
}

/// Decode a hex command APDU. Whitespace between bytes is allowed.
fn parse_apdu(text: &str) -> CliResult<Vec<u8>> {
    let compact: String = text.split_whitespace().collect();
    let apdu = hex::decode(&compact)
        .map_err(|err| CliError::new(DATA_INVALID, format!("invalid APDU {text:?}: {err}")))?;

    // A single byte would be read as a control command on the wire.
    if apdu.len() == 1 {
        return Err(CliError::new(
            DATA_INVALID,
            format!("invalid APDU {text:?}: one-byte APDUs cannot be sent"),
        ));
    }
    Ok(apdu)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
