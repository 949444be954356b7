use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use ipcchan_endpoint::Description;
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct DeliveryOutput<'a> {
    kind: &'static str,
    channel: &'a str,
    payload: &'a Value,
    timestamp: String,
}

/// Print a message received on a listened channel.
pub fn print_message(channel: &str, payload: &Value, format: OutputFormat) {
    print_delivery("message", channel, payload, format);
}

/// Print the answer to a request.
pub fn print_response(channel: &str, payload: &Value, format: OutputFormat) {
    print_delivery("response", channel, payload, format);
}

fn print_delivery(kind: &'static str, channel: &str, payload: &Value, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = DeliveryOutput {
                kind,
                channel,
                payload,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["KIND", "CHANNEL", "PAYLOAD"])
                .add_row(vec![kind.to_string(), channel.to_string(), payload.to_string()]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let body = serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string());
            println!("{kind} on {channel}:\n{body}");
        }
    }
}

/// Print a main endpoint's channel and window tables.
pub fn print_description(description: &Description, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(description).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut channels = Table::new();
            channels
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CHANNEL", "KIND"]);
            for id in &description.message_channels {
                channels.add_row(vec![id.as_str(), "message"]);
            }
            for id in &description.request_channels {
                channels.add_row(vec![id.as_str(), "request"]);
            }
            println!("{channels}");

            let mut windows = Table::new();
            windows
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["WINDOW", "STATE"]);
            for window in &description.windows {
                windows.add_row(vec![window.id.to_string(), window.state.to_string()]);
            }
            println!("{windows}");
        }
        OutputFormat::Pretty => {
            println!("Channels:");
            println!("  message: {}", join_or_none(&description.message_channels));
            println!("  request: {}", join_or_none(&description.request_channels));
            println!("Windows:");
            if description.windows.is_empty() {
                println!("  (none)");
            }
            for window in &description.windows {
                println!("  {} ({})", window.id, window.state);
            }
        }
    }
}

fn join_or_none(ids: &[String]) -> String {
    if ids.is_empty() {
        "(none)".to_string()
    } else {
        ids.join(", ")
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
