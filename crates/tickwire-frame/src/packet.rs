//! Application packets and reserved packet ids.
//!
//! Packet ids 0-255 are reserved for built-in use.
//! Packet ids 256 and up are available for application-defined packets.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Keep-alive packet sent when a channel has been silent for a heartbeat interval.
pub const HEARTBEAT: u32 = 0;

/// First application-defined packet id.
pub const USER_PACKET_START: u32 = 256;

/// An application-level message: a numeric type id plus an opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Packet type id used for handler dispatch.
    pub id: u32,
    /// Serialized message body.
    pub payload: Bytes,
}

impl Packet {
    /// Create a new packet.
    pub fn new(id: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            id,
            payload: payload.into(),
        }
    }

    /// Create the built-in heartbeat packet.
    pub fn heartbeat() -> Self {
        Self::new(HEARTBEAT, Bytes::new())
    }

    /// Create a packet whose payload is the JSON encoding of `value`.
    pub fn json<T: Serialize>(id: u32, value: &T) -> Result<Self> {
        let payload = serde_json::to_vec(value)?;
        Ok(Self::new(id, payload))
    }

    /// Decode the payload as JSON.
    pub fn decode_json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.payload)?)
    }

    /// Whether this is the built-in heartbeat packet.
    pub fn is_heartbeat(&self) -> bool {
        self.id == HEARTBEAT
    }
}

/// Returns a human-readable name for a packet id.
pub fn packet_name(id: u32) -> &'static str {
    match id {
        HEARTBEAT => "HEARTBEAT",
        1..=255 => "RESERVED",
        _ => "USER",
    }
}

/// Returns true if the packet id is in the reserved range.
pub fn is_reserved(id: u32) -> bool {
    id < USER_PACKET_START
}
