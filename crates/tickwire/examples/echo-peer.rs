//! Minimal echo peer. Accepts one connection and echoes packets back.
//!
//! Run with:
//!   cargo run --example echo-peer
//!
//! In another terminal:
//!   cargo run --features cli -- send 127.0.0.1:7400 --data hello --wait

use std::net::TcpListener;

use tickwire::frame::{FrameError, PacketReader, PacketWriter};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind("127.0.0.1:7400")?;
    eprintln!("Listening on {}", listener.local_addr()?);

    // Accept one peer and echo packets until it disconnects.
    let (stream, remote) = listener.accept()?;
    eprintln!("Peer connected: {remote}");

    let mut reader = PacketReader::new(stream.try_clone()?);
    let mut writer = PacketWriter::new(stream);
    loop {
        match reader.read_packet() {
            Ok(packet) => {
                eprintln!(
                    "Received {} bytes as packet {}",
                    packet.payload.len(),
                    packet.id
                );
                writer.write_packet(&packet)?;
            }
            Err(FrameError::ConnectionClosed) => {
                eprintln!("Peer disconnected");
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}
