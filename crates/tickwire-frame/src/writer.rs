use std::io::{ErrorKind, Write};
use std::net::TcpStream;

use bytes::BytesMut;

use crate::codec::{encode_packet, FrameConfig};
use crate::error::{FrameError, Result};
use crate::packet::Packet;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete packets to any blocking `Write` stream.
///
/// Each packet is encoded into a reusable scratch buffer and pushed out
/// whole, resuming after partial writes, before the stream is flushed.
pub struct PacketWriter<T> {
    inner: T,
    scratch: BytesMut,
    max_payload_size: usize,
}

impl<T: Write> PacketWriter<T> {
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            scratch: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            max_payload_size: config.max_payload_size,
        }
    }

    /// Write a complete packet (blocking).
    pub fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        let size = packet.payload.len();
        if size > self.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size,
                max: self.max_payload_size,
            });
        }

        self.scratch.clear();
        encode_packet(packet, &mut self.scratch)?;
        self.push_scratch()
    }

    /// Frame `payload` under packet id `id` and write it.
    pub fn send(&mut self, id: u32, payload: &[u8]) -> Result<()> {
        self.write_packet(&Packet::new(id, payload.to_vec()))
    }

    /// Write already framed bytes as-is, e.g. hand-built wire data.
    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.scratch.clear();
        self.scratch.extend_from_slice(bytes);
        self.push_scratch()
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    fn push_scratch(&mut self) -> Result<()> {
        let mut written = 0;
        while written < self.scratch.len() {
            let Some(n) = retry(|| self.inner.write(&self.scratch[written..]))? else {
                continue;
            };
            if n == 0 {
                return Err(FrameError::ConnectionClosed);
            }
            written += n;
        }
        while retry(|| self.inner.flush())?.is_none() {}
        Ok(())
    }
}

/// Runs one stream call, mapping transient `Interrupted`/`WouldBlock` to `None`.
fn retry<R>(mut op: impl FnMut() -> std::io::Result<R>) -> Result<Option<R>> {
    match op() {
        Ok(value) => Ok(Some(value)),
        Err(err) if matches!(err.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock) => {
            Ok(None)
        }
        Err(err) => Err(FrameError::Io(err)),
    }
}

impl PacketWriter<TcpStream> {
    /// Wrap a TCP stream, applying the configured write timeout.
    pub fn with_config_tcp(inner: TcpStream, config: FrameConfig) -> Result<Self> {
        inner.set_write_timeout(config.write_timeout)?;
        Ok(Self::with_config(inner, config))
    }
}
