//! Header/body packet framing for tickwire channels.
//!
//! Every packet on the wire is a fixed-length header followed by an optional
//! body. The default framing (see [`FramedHelper`]) is:
//! - A 2-byte magic number ("TW") for stream synchronization
//! - A 4-byte little-endian body length
//! - A 4-byte little-endian packet id
//!
//! The wire format itself is pluggable through [`ChannelHelper`]; channels
//! only rely on the fixed header length and the helper's decode results.

pub mod codec;
pub mod error;
pub mod helper;
pub mod packet;
pub mod reader;
pub mod receive;
pub mod writer;

pub use codec::{
    decode_header, encode_packet, FrameConfig, PacketHeader, DEFAULT_MAX_PAYLOAD, HEADER_SIZE,
    MAGIC,
};
pub use error::{FrameError, Result};
pub use helper::{ChannelHelper, CustomErrorData, Decoded, FramedHelper};
pub use packet::{packet_name, Packet, HEARTBEAT, USER_PACKET_START};
pub use reader::PacketReader;
pub use receive::ReceiveState;
pub use writer::PacketWriter;
