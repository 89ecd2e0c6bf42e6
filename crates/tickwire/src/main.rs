mod cmd;
mod exit;
mod logging;
mod output;

use std::process::ExitCode;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "tickwire",
    version,
    about = "Drive heartbeat-monitored packet channels from the command line"
)]
struct Cli {
    /// How received packets are printed (defaults to a table on a terminal, JSON otherwise).
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Diagnostics format on stderr.
    #[arg(
        long,
        value_name = "FORMAT",
        default_value = "text",
        env = "TICKWIRE_LOG_FORMAT",
        global = true
    )]
    log_format: LogFormat,

    /// Minimum diagnostics level on stderr.
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "info",
        env = "TICKWIRE_LOG_LEVEL",
        global = true
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let code = cmd::run(cli.command, format).unwrap_or_else(|err| {
        tracing::debug!(code = err.code, "command failed");
        eprintln!("error: {err}");
        err.code
    });
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from([
            "tickwire",
            "send",
            "127.0.0.1:7400",
            "--id",
            "300",
            "--data",
            "hello",
            "--wait",
        ])
        .expect("send args should parse");

        match cli.command {
            Command::Send(args) => {
                assert_eq!(args.id, 300);
                assert!(args.wait);
                assert!(!args.sync_receive);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_conflicting_payload_args() {
        let err = Cli::try_parse_from([
            "tickwire",
            "send",
            "127.0.0.1:7400",
            "--json",
            "{\"x\":1}",
            "--data",
            "hello",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn parses_serve_subcommand_with_globals() {
        let cli = Cli::try_parse_from([
            "tickwire",
            "serve",
            "127.0.0.1:0",
            "--count",
            "2",
            "--log-level",
            "debug",
            "--format",
            "pretty",
        ])
        .expect("serve args should parse");
        assert!(matches!(cli.command, Command::Serve(ref args) if args.count == Some(2)));
        assert!(matches!(cli.log_level, LogLevel::Debug));
    }
}
