//! The pluggable serialization capability a channel is built around.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use bytes::BytesMut;

use crate::codec::{decode_header, encode_packet, PacketHeader, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
use crate::error::{FrameError, Result};
use crate::packet::Packet;

/// Opaque diagnostic data a helper may attach to a decode.
pub type CustomErrorData = Arc<dyn Any + Send + Sync>;

/// Outcome of a helper decode call.
///
/// `value` is `None` when the helper could not produce a value.
/// `custom_error` carries out-of-band data the channel republishes as a
/// custom-error event, whether or not `value` is present.
pub struct Decoded<T> {
    pub value: Option<T>,
    pub custom_error: Option<CustomErrorData>,
}

impl<T> Decoded<T> {
    /// A plain successful decode.
    pub fn ok(value: T) -> Self {
        Self {
            value: Some(value),
            custom_error: None,
        }
    }

    /// A decode that produced nothing.
    pub fn none() -> Self {
        Self {
            value: None,
            custom_error: None,
        }
    }

    /// Attach custom error data.
    pub fn with_custom_error(mut self, data: CustomErrorData) -> Self {
        self.custom_error = Some(data);
        self
    }
}

impl<T: fmt::Debug> fmt::Debug for Decoded<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decoded")
            .field("value", &self.value)
            .field("custom_error", &self.custom_error.is_some())
            .finish()
    }
}

/// Serialization capability consumed by a channel.
///
/// A helper owns the wire format: it decides the fixed header length, how
/// headers and bodies are decoded and how outbound packets are encoded.
/// Implementations are shared between the tick thread and I/O completion
/// threads, so they must be `Send + Sync`.
pub trait ChannelHelper: Send + Sync + 'static {
    /// Fixed length of every packet header in bytes.
    fn packet_header_length(&self) -> usize;

    /// Called before each connect attempt to reset per-connection state.
    fn prepare_for_connecting(&self) {}

    /// Packet to send when the heartbeat interval elapses, if any.
    fn heartbeat(&self) -> Option<Packet>;

    /// Append the wire encoding of `packet` to `dst`.
    fn serialize(&self, packet: &Packet, dst: &mut BytesMut) -> Result<()>;

    /// Decode a complete header prefix.
    fn deserialize_header(&self, src: &[u8]) -> Result<Decoded<PacketHeader>>;

    /// Decode a complete body for `header`.
    fn deserialize_packet(&self, header: &PacketHeader, src: &[u8]) -> Result<Decoded<Packet>>;

    /// Called once when the owning channel is shut down.
    fn shutdown(&self) {}
}

/// Default helper speaking the "TW" length-prefixed wire format.
#[derive(Debug, Clone)]
pub struct FramedHelper {
    max_payload_size: usize,
}

impl FramedHelper {
    /// Create a helper with the default maximum body size.
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD)
    }

    /// Create a helper rejecting bodies larger than `max_payload_size`.
    pub fn with_max_payload(max_payload_size: usize) -> Self {
        Self { max_payload_size }
    }

    /// Largest body this helper accepts.
    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }
}

impl Default for FramedHelper {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelHelper for FramedHelper {
    fn packet_header_length(&self) -> usize {
        HEADER_SIZE
    }

    fn heartbeat(&self) -> Option<Packet> {
        Some(Packet::heartbeat())
    }

    fn serialize(&self, packet: &Packet, dst: &mut BytesMut) -> Result<()> {
        if packet.payload.len() > self.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: packet.payload.len(),
                max: self.max_payload_size,
            });
        }
        encode_packet(packet, dst)
    }

    fn deserialize_header(&self, src: &[u8]) -> Result<Decoded<PacketHeader>> {
        decode_header(src, self.max_payload_size).map(Decoded::ok)
    }

    fn deserialize_packet(&self, header: &PacketHeader, src: &[u8]) -> Result<Decoded<Packet>> {
        if src.len() != header.body_length {
            return Err(FrameError::BodyLengthMismatch {
                len: src.len(),
                declared: header.body_length,
            });
        }
        Ok(Decoded::ok(Packet::new(
            header.packet_id,
            bytes::Bytes::copy_from_slice(src),
        )))
    }
}
