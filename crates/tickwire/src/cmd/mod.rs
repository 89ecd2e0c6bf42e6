use clap::{Args, Subcommand};
use std::path::PathBuf;

use tickwire_frame::{DEFAULT_MAX_PAYLOAD, USER_PACKET_START};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a blocking echo peer.
    Serve(ServeArgs),
    /// Connect a channel, send one packet and optionally wait for the reply.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on (e.g. 127.0.0.1:7400).
    pub addr: String,
    /// Exit after echoing N packets (heartbeats are not counted).
    #[arg(long)]
    pub count: Option<usize>,
    /// Largest packet body accepted from a peer, in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_PAYLOAD)]
    pub max_payload: usize,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Address to connect to (e.g. 127.0.0.1:7400 or [::1]:7400).
    pub addr: String,
    /// Packet id to send.
    #[arg(long, default_value_t = USER_PACKET_START)]
    pub id: u32,
    /// JSON payload.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
    /// Wait for a packet with the same id and print it.
    #[arg(long)]
    pub wait: bool,
    /// Limit for connecting, sending and waiting (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
    /// Read replies on the tick thread instead of the runtime.
    #[arg(long)]
    pub sync_receive: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Split `host:port`, accepting bracketed IPv6 hosts.
pub fn split_host_port(input: &str) -> CliResult<(&str, u16)> {
    let (host, port) = input.rsplit_once(':').ok_or_else(|| {
        CliError::new(USAGE, format!("address must be host:port, got '{input}'"))
    })?;
    let port = port
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid port in '{input}'")))?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    Ok((host, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_host_port_handles_ipv4_and_ipv6() {
        assert_eq!(split_host_port("127.0.0.1:7400").unwrap(), ("127.0.0.1", 7400));
        assert_eq!(split_host_port("[::1]:80").unwrap(), ("::1", 80));
        assert!(split_host_port("localhost").is_err());
        assert!(split_host_port("127.0.0.1:http").is_err());
    }
}
