use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use tickwire_frame::{packet_name, Packet};

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    /// Payload bytes only, no framing or metadata.
    Raw,
}

impl OutputFormat {
    /// Tables for a terminal, JSON lines when piped.
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One received packet as the CLI reports it.
#[derive(Serialize)]
struct PacketReport<'a> {
    kind: &'static str,
    channel: &'a str,
    packet_id: u32,
    packet_name: &'static str,
    payload_size: usize,
    payload: String,
    timestamp: u64,
}

impl<'a> PacketReport<'a> {
    fn new(packet: &Packet, channel: &'a str) -> Self {
        Self {
            kind: "packet-received",
            channel,
            packet_id: packet.id,
            packet_name: packet_name(packet.id),
            payload_size: packet.payload.len(),
            payload: payload_preview(&packet.payload),
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0, |since| since.as_secs()),
        }
    }

    fn packet_label(&self) -> String {
        format!("{} ({})", self.packet_id, self.packet_name)
    }
}

pub fn print_packet(packet: &Packet, channel: &str, format: OutputFormat) {
    if format == OutputFormat::Raw {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(&packet.payload);
        let _ = stdout.flush();
        return;
    }

    let report = PacketReport::new(packet, channel);
    match format {
        OutputFormat::Json => match serde_json::to_string(&report) {
            Ok(line) => println!("{line}"),
            Err(err) => tracing::warn!(error = %err, "failed to encode packet report"),
        },
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CHANNEL", "PACKET", "SIZE", "PAYLOAD"])
                .add_row(vec![
                    report.channel.to_string(),
                    report.packet_label(),
                    report.payload_size.to_string(),
                    report.payload.clone(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => println!(
            "channel={} packet={} size={} payload={}",
            report.channel,
            report.packet_label(),
            report.payload_size,
            report.payload
        ),
    }
}

fn payload_preview(payload: &[u8]) -> String {
    std::str::from_utf8(payload).map_or_else(
        |_| format!("<binary {} bytes>", payload.len()),
        str::to_string,
    )
}
