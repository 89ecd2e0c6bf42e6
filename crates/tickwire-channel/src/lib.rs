//! Heartbeat-monitored packet channels over TCP.
//!
//! A [`NetworkChannel`] owns one socket at a time and is driven by a polled
//! tick ([`NetworkChannel::update`]). Socket I/O runs as tasks on a tokio
//! runtime; everything the application sees (packet handlers, lifecycle
//! events) is delivered either on the tick thread or through event
//! subscribers.
//!
//! Channels are created through a [`ChannelManager`], which validates the
//! [`ChannelHelper`](tickwire_frame::ChannelHelper), fans ticks out and
//! republishes channel events.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use tickwire_channel::{ChannelConfig, ChannelManager, ServiceType};
//! use tickwire_frame::{FramedHelper, Packet};
//!
//! let runtime = tokio::runtime::Runtime::new().unwrap();
//! let manager = ChannelManager::new(runtime.handle().clone());
//! let channel = manager
//!     .create_channel(
//!         "game",
//!         ServiceType::Tcp,
//!         Arc::new(FramedHelper::new()),
//!         ChannelConfig::default(),
//!     )
//!     .unwrap();
//!
//! channel.handlers().register(300, |name, packet| {
//!     println!("{name}: {} bytes", packet.payload.len());
//! });
//! channel.connect("127.0.0.1", 7000, None).unwrap();
//!
//! loop {
//!     manager.update(0.016, 0.016);
//!     if channel.is_connected() {
//!         channel.send(Packet::new(300, &b"hello"[..])).unwrap();
//!     }
//!     std::thread::sleep(std::time::Duration::from_millis(16));
//! }
//! ```

pub mod channel;
pub mod config;
mod core;
pub mod error;
pub mod event;
pub mod handler;
pub mod heartbeat;
pub mod manager;
mod sync;
mod tcp;

pub use channel::{AddressFamily, ChannelState, NetworkChannel, ServiceType};
pub use config::{ChannelConfig, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_OPERATION_TIMEOUT};
pub use error::{ChannelError, ManagerError, NetworkErrorKind, Result};
pub use event::{ChannelEvent, EventHandler, SubscriptionId, UserData};
pub use handler::{PacketHandler, PacketHandlers};
pub use heartbeat::HeartbeatState;
pub use manager::ChannelManager;
