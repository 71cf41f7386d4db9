use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use vpcd_session::StatusEvent;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

/// Something the CLI prints on stdout, one record per line or table.
pub trait Record: Serialize {
    fn kind(&self) -> &'static str;

    /// Key/value pairs for the table view.
    fn fields(&self) -> Vec<(&'static str, String)>;

    /// One-line human rendering.
    fn summary(&self) -> String;
}

impl Record for StatusEvent {
    fn kind(&self) -> &'static str {
        StatusEvent::kind(self)
    }

    fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            StatusEvent::Listening { port, addresses } => vec![
                ("port", port.to_string()),
                ("addresses", addresses.join(", ")),
            ],
            StatusEvent::Connected { address } | StatusEvent::ClientDisconnected { address } => {
                vec![("address", address.clone())]
            }
            StatusEvent::Atr { atr } => vec![("atr", atr.clone())],
            StatusEvent::CommandApdu { apdu } | StatusEvent::ResponseApdu { apdu } => {
                vec![("apdu", apdu.clone())]
            }
            StatusEvent::Error { message } => vec![("message", message.clone())],
            StatusEvent::Disconnected { reason } => vec![("reason", reason.to_string())],
            StatusEvent::PoweredOn | StatusEvent::PoweredOff | StatusEvent::Reset => Vec::new(),
        }
    }

    fn summary(&self) -> String {
        self.describe()
    }
}

/// What the `reader` command observes while driving a card.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ReaderRecord {
    WaitingForCard { port: u16 },
    CardConnected { address: String },
    Atr { atr: String },
    Exchange { command: String, response: String },
}

impl Record for ReaderRecord {
    fn kind(&self) -> &'static str {
        match self {
            ReaderRecord::WaitingForCard { .. } => "waiting_for_card",
            ReaderRecord::CardConnected { .. } => "card_connected",
            ReaderRecord::Atr { .. } => "atr",
            ReaderRecord::Exchange { .. } => "exchange",
        }
    }

    fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            ReaderRecord::WaitingForCard { port } => vec![("port", port.to_string())],
            ReaderRecord::CardConnected { address } => vec![("address", address.clone())],
            ReaderRecord::Atr { atr } => vec![("atr", atr.clone())],
            ReaderRecord::Exchange { command, response } => vec![
                ("command", command.clone()),
                ("response", response.clone()),
            ],
        }
    }

    fn summary(&self) -> String {
        match self {
            ReaderRecord::WaitingForCard { port } => format!("waiting for a card on port {port}"),
            ReaderRecord::CardConnected { address } => format!("card connected from {address}"),
            ReaderRecord::Atr { atr } => format!("ATR {atr}"),
            ReaderRecord::Exchange { command, response } => format!("{command} -> {response}"),
        }
    }
}

#[derive(Serialize)]
struct JsonLine<'a, R> {
    timestamp: String,
    #[serde(flatten)]
    record: &'a R,
}

pub fn print_record<R: Record>(record: &R, format: OutputFormat) {
    println!("{}", render(record, format));
}

fn render<R: Record>(record: &R, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => {
            let line = JsonLine {
                timestamp: now_unix_seconds(),
                record,
            };
            serde_json::to_string(&line)
                .unwrap_or_else(|_| format!("{{\"event\":\"{}\"}}", record.kind()))
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["EVENT", record.kind()]);
            for (key, value) in record.fields() {
                table.add_row(vec![key.to_string(), value]);
            }
            table.to_string()
        }
        OutputFormat::Pretty => record.summary(),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
