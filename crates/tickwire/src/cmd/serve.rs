use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tickwire_frame::{FrameConfig, FrameError, PacketReader, PacketWriter};

use crate::cmd::ServeArgs;
use crate::exit::{frame_error, io_error, CliError, CliResult, SUCCESS};
use crate::output::{print_packet, OutputFormat};

enum ReadDisposition {
    Disconnected,
    DropPeer(String),
    Fatal(CliError),
}

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let listener = TcpListener::bind(&args.addr).map_err(|err| io_error("bind failed", err))?;
    let local = listener
        .local_addr()
        .map_err(|err| io_error("bind failed", err))?;
    tracing::info!(addr = %local, "echo peer listening");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let config = FrameConfig {
        max_payload_size: args.max_payload,
        ..FrameConfig::default()
    };
    let mut echoed = 0usize;

    while running.load(Ordering::SeqCst) {
        let (stream, remote) = listener
            .accept()
            .map_err(|err| io_error("accept failed", err))?;
        tracing::info!(%remote, "peer connected");
        let remote = remote.to_string();

        let read_stream = stream
            .try_clone()
            .map_err(|err| io_error("stream setup failed", err))?;
        let mut reader = PacketReader::with_config(read_stream, config.clone());
        let mut writer = PacketWriter::with_config(stream, config.clone());

        while running.load(Ordering::SeqCst) {
            let packet = match reader.read_packet() {
                Ok(packet) => packet,
                Err(err) => match classify_read_error(err) {
                    ReadDisposition::Disconnected => break,
                    ReadDisposition::DropPeer(reason) => {
                        tracing::warn!(%remote, reason = %reason, "dropping peer");
                        break;
                    }
                    ReadDisposition::Fatal(cli_err) => return Err(cli_err),
                },
            };

            if let Err(err) = writer.write_packet(&packet) {
                tracing::warn!(%remote, error = %err, "echo send failed");
                break;
            }
            if packet.is_heartbeat() {
                tracing::debug!(%remote, "heartbeat echoed");
                continue;
            }

            tracing::info!(
                packet_id = packet.id,
                size = packet.payload.len(),
                "echoed packet"
            );
            print_packet(&packet, &remote, format);
            echoed += 1;
            if args.count.is_some_and(|count| echoed >= count) {
                return Ok(SUCCESS);
            }
        }
        tracing::info!(%remote, "peer disconnected");
    }

    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}

fn classify_read_error(err: FrameError) -> ReadDisposition {
    match err {
        FrameError::ConnectionClosed => ReadDisposition::Disconnected,
        FrameError::Io(ref source)
            if matches!(
                source.kind(),
                std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::ConnectionAborted
            ) =>
        {
            ReadDisposition::Disconnected
        }
        FrameError::InvalidMagic
        | FrameError::InvalidHeaderLength { .. }
        | FrameError::PayloadTooLarge { .. } => ReadDisposition::DropPeer(err.to_string()),
        other => ReadDisposition::Fatal(frame_error("receive failed", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_and_reset_peers_disconnect() {
        assert!(matches!(
            classify_read_error(FrameError::ConnectionClosed),
            ReadDisposition::Disconnected
        ));
        let reset = std::io::Error::from(std::io::ErrorKind::ConnectionReset);
        assert!(matches!(
            classify_read_error(FrameError::Io(reset)),
            ReadDisposition::Disconnected
        ));
    }

    #[test]
    fn malformed_wire_data_drops_only_the_peer() {
        let disposition = classify_read_error(FrameError::PayloadTooLarge { size: 10, max: 1 });
        match disposition {
            ReadDisposition::DropPeer(reason) => assert!(reason.contains("10")),
            _ => panic!("expected drop-peer disposition"),
        }
    }

    #[test]
    fn other_io_errors_are_fatal() {
        let denied = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        assert!(matches!(
            classify_read_error(FrameError::Io(denied)),
            ReadDisposition::Fatal(_)
        ));
    }
}
