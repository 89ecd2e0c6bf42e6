use bytes::{BufMut, BytesMut};

use crate::error::{FrameError, Result};
use crate::packet::Packet;

/// Packet header: magic (2) + body length (4) + packet id (4) = 10 bytes.
pub const HEADER_SIZE: usize = 10;

/// Magic bytes: "TW" (0x54 0x57).
pub const MAGIC: [u8; 2] = [0x54, 0x57];

/// Default maximum body size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Decoded packet header.
///
/// The header announces how many more bytes complete the packet. A zero
/// `body_length` means the packet has no body phase at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Packet type id of the packet that follows.
    pub packet_id: u32,
    /// Number of body bytes following the header.
    pub body_length: usize,
}

impl PacketHeader {
    /// Create a new header.
    pub fn new(packet_id: u32, body_length: usize) -> Self {
        Self {
            packet_id,
            body_length,
        }
    }
}

/// Encode a packet into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬───────────┬───────────┬─────────────────┐
/// │ Magic (2B)   │ Length    │ Packet id │ Body            │
/// │ 0x54 0x57    │ (4B LE)   │ (4B LE)   │ (Length bytes)  │
/// │ "TW"         │           │           │                 │
/// └──────────────┴───────────┴───────────┴─────────────────┘
/// ```
pub fn encode_packet(packet: &Packet, dst: &mut BytesMut) -> Result<()> {
    let len = packet.payload.len();
    if len > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: len,
            max: u32::MAX as usize,
        });
    }
    dst.reserve(HEADER_SIZE + len);
    dst.put_slice(&MAGIC);
    dst.put_u32_le(len as u32);
    dst.put_u32_le(packet.id);
    dst.put_slice(&packet.payload);
    Ok(())
}

/// Decode a complete header prefix.
///
/// `src` must hold exactly [`HEADER_SIZE`] bytes.
pub fn decode_header(src: &[u8], max_payload: usize) -> Result<PacketHeader> {
    if src.len() != HEADER_SIZE {
        return Err(FrameError::InvalidHeaderLength {
            len: src.len(),
            expected: HEADER_SIZE,
        });
    }

    if src[0..2] != MAGIC {
        return Err(FrameError::InvalidMagic);
    }

    let mut len = [0u8; 4];
    len.copy_from_slice(&src[2..6]);
    let body_length = u32::from_le_bytes(len) as usize;

    let mut id = [0u8; 4];
    id.copy_from_slice(&src[6..10]);
    let packet_id = u32::from_le_bytes(id);

    if body_length > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: body_length,
            max: max_payload,
        });
    }

    Ok(PacketHeader {
        packet_id,
        body_length,
    })
}

/// Configuration for the packet codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum body size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_then_decode_header() {
        let mut buf = BytesMut::new();
        let packet = Packet::new(300, &b"hello, tickwire!"[..]);

        encode_packet(&packet, &mut buf).unwrap();

        assert_eq!(buf.len(), HEADER_SIZE + packet.payload.len());
        let header = decode_header(&buf[..HEADER_SIZE], DEFAULT_MAX_PAYLOAD).unwrap();
        assert_eq!(header, PacketHeader::new(300, 16));
        assert_eq!(&buf[HEADER_SIZE..], b"hello, tickwire!");
    }

    #[test]
    fn test_decode_short_header() {
        let result = decode_header(&[0x54, 0x57, 0x00], DEFAULT_MAX_PAYLOAD);
        assert!(matches!(
            result,
            Err(FrameError::InvalidHeaderLength { len: 3, .. })
        ));
    }

    #[test]
    fn test_decode_invalid_magic() {
        let buf = [0xFF; HEADER_SIZE];
        let result = decode_header(&buf, DEFAULT_MAX_PAYLOAD);
        assert!(matches!(result, Err(FrameError::InvalidMagic)));
    }

    #[test]
    fn test_decode_payload_too_large() {
        let mut buf = BytesMut::new();
        buf.put_slice(&MAGIC);
        buf.put_u32_le(1024 * 1024 * 32); // 32 MiB
        buf.put_u32_le(1);

        let result = decode_header(&buf, DEFAULT_MAX_PAYLOAD);
        assert!(matches!(result, Err(FrameError::PayloadTooLarge { .. })));
    }

    #[test]
    fn test_empty_body_header() {
        let mut buf = BytesMut::new();
        encode_packet(&Packet::heartbeat(), &mut buf).unwrap();

        assert_eq!(buf.len(), HEADER_SIZE);
        let header = decode_header(&buf, DEFAULT_MAX_PAYLOAD).unwrap();
        assert_eq!(header.body_length, 0);
        assert_eq!(header.packet_id, 0);
    }

    #[test]
    fn test_back_to_back_packets_keep_order() {
        let mut buf = BytesMut::new();
        encode_packet(&Packet::new(1, &b"first"[..]), &mut buf).unwrap();
        encode_packet(&Packet::new(2, &b"second"[..]), &mut buf).unwrap();

        let first = decode_header(&buf[..HEADER_SIZE], DEFAULT_MAX_PAYLOAD).unwrap();
        assert_eq!(first, PacketHeader::new(1, 5));
        let offset = HEADER_SIZE + first.body_length;
        let second =
            decode_header(&buf[offset..offset + HEADER_SIZE], DEFAULT_MAX_PAYLOAD).unwrap();
        assert_eq!(second, PacketHeader::new(2, 6));
        assert_eq!(&buf[offset + HEADER_SIZE..], b"second");
    }
}
