use std::io::{ErrorKind, Read};
use std::net::TcpStream;

use bytes::Bytes;

use crate::codec::{decode_header, FrameConfig, HEADER_SIZE};
use crate::error::{FrameError, Result};
use crate::packet::Packet;
use crate::receive::ReceiveState;

/// Reads complete packets from any blocking `Read` stream.
///
/// Each read asks for exactly the bytes the current header or body phase
/// still needs, so nothing past the current packet is ever consumed.
pub struct PacketReader<T> {
    inner: T,
    state: ReceiveState,
    config: FrameConfig,
}

impl<T: Read> PacketReader<T> {
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            state: ReceiveState::new(HEADER_SIZE),
            config,
        }
    }

    /// Read the next complete packet (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_packet(&mut self) -> Result<Packet> {
        loop {
            if self.state.is_full() {
                match self.state.header().copied() {
                    None => {
                        let header =
                            decode_header(self.state.filled(), self.config.max_payload_size)?;
                        self.state.prepare_for_packet(header);
                    }
                    Some(header) => {
                        let payload = Bytes::copy_from_slice(self.state.filled());
                        self.state.prepare_for_header();
                        return Ok(Packet::new(header.packet_id, payload));
                    }
                }
                continue;
            }

            let read = match self.inner.read(self.state.unfilled_mut()) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                if self.state.header().is_some() || !self.state.filled().is_empty() {
                    tracing::debug!(
                        buffered = self.state.filled().len(),
                        "connection closed mid-packet"
                    );
                }
                return Err(FrameError::ConnectionClosed);
            }

            self.state.advance(read);
        }
    }
}

impl PacketReader<TcpStream> {
    /// Wrap a TCP stream, applying the configured read timeout.
    pub fn with_config_tcp(inner: TcpStream, config: FrameConfig) -> Result<Self> {
        inner.set_read_timeout(config.read_timeout)?;
        Ok(Self::with_config(inner, config))
    }
}
