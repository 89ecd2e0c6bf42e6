//! Heartbeat-monitored packet channels for tick-driven game clients.
//!
//! tickwire frames an application packet protocol over TCP, keeps
//! connections alive with heartbeats, and reports everything that happens to
//! a connection as events delivered alongside a polled update loop.
//!
//! # Crate Structure
//!
//! - [`frame`]: packet model, header/body framing and the pluggable `ChannelHelper`
//! - [`channel`]: channels, TCP transport, heartbeats and the channel manager (behind `channel` feature)

/// Re-export frame types.
pub mod frame {
    pub use tickwire_frame::*;
}

/// Re-export channel types (requires `channel` feature).
#[cfg(feature = "channel")]
pub mod channel {
    pub use tickwire_channel::*;
}
