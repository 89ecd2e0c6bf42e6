/// Errors that can occur during packet encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The packet header contains an invalid magic number.
    #[error("invalid packet magic (expected 0x5457 \"TW\")")]
    InvalidMagic,

    /// The header slice handed to the decoder has the wrong length.
    #[error("invalid header length ({len} bytes, expected {expected})")]
    InvalidHeaderLength { len: usize, expected: usize },

    /// The body slice does not match the length declared by its header.
    #[error("body length mismatch ({len} bytes, header declared {declared})")]
    BodyLengthMismatch { len: usize, declared: usize },

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A JSON payload could not be encoded or decoded.
    #[error("json payload error: {0}")]
    Json(#[from] serde_json::Error),

    /// An I/O error occurred while reading or writing packets.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete packet was received.
    #[error("connection closed (incomplete packet)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
