use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;
use tickwire_frame::{packet_name, Packet};
use tracing::{trace, warn};

use crate::sync::{read, write};

/// Callback invoked with the channel name and a received packet.
pub type PacketHandler = Arc<dyn Fn(&str, &Packet) + Send + Sync>;

/// Packet-id keyed handler registry.
///
/// Received packets are dispatched on the tick thread. A packet whose id has
/// no handler goes to the fallback handler; without one it is logged and
/// dropped.
pub struct PacketHandlers {
    handlers: RwLock<HashMap<u32, PacketHandler>>,
    fallback: RwLock<Option<PacketHandler>>,
}

impl PacketHandlers {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            fallback: RwLock::new(None),
        }
    }

    /// Register a handler for `id`.
    ///
    /// Returns false and keeps the existing handler if `id` is already taken.
    pub fn register<F>(&self, id: u32, handler: F) -> bool
    where
        F: Fn(&str, &Packet) + Send + Sync + 'static,
    {
        let mut handlers = write(&self.handlers);
        if handlers.contains_key(&id) {
            return false;
        }
        handlers.insert(id, Arc::new(handler));
        true
    }

    /// Register a handler receiving the payload decoded as JSON.
    ///
    /// Payloads that fail to decode are logged and skipped.
    pub fn on_json<T, F>(&self, id: u32, handler: F) -> bool
    where
        T: DeserializeOwned,
        F: Fn(&str, T) + Send + Sync + 'static,
    {
        self.register(id, move |channel, packet| match packet.decode_json::<T>() {
            Ok(value) => handler(channel, value),
            Err(err) => warn!(
                channel,
                packet_id = packet.id,
                error = %err,
                "dropping packet with undecodable payload"
            ),
        })
    }

    /// Remove the handler for `id`.
    pub fn unregister(&self, id: u32) -> bool {
        write(&self.handlers).remove(&id).is_some()
    }

    /// Handle packets that have no registered handler.
    pub fn set_fallback<F>(&self, handler: F)
    where
        F: Fn(&str, &Packet) + Send + Sync + 'static,
    {
        *write(&self.fallback) = Some(Arc::new(handler));
    }

    /// Whether `id` has a registered handler.
    pub fn contains(&self, id: u32) -> bool {
        read(&self.handlers).contains_key(&id)
    }

    /// Route `packet` to its handler; returns false when no handler took it.
    pub fn dispatch(&self, channel: &str, packet: &Packet) -> bool {
        let handler = read(&self.handlers).get(&packet.id).cloned();
        if let Some(handler) = handler {
            handler(channel, packet);
            return true;
        }

        let fallback = read(&self.fallback).clone();
        match fallback {
            Some(fallback) => {
                fallback(channel, packet);
                true
            }
            None if packet.is_heartbeat() => {
                trace!(channel, "heartbeat received");
                false
            }
            None => {
                warn!(
                    channel,
                    packet_id = packet.id,
                    packet_name = packet_name(packet.id),
                    size = packet.payload.len(),
                    "unhandled packet"
                );
                false
            }
        }
    }
}

impl Default for PacketHandlers {
    fn default() -> Self {
        Self::new()
    }
}
