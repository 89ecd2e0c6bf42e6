use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use tickwire_frame::ChannelHelper;
use tokio::runtime::Handle;
use tracing::{debug, error, info};

use crate::channel::{NetworkChannel, ServiceType};
use crate::config::ChannelConfig;
use crate::error::ManagerError;
use crate::event::{ChannelEvent, EventHub, SubscriptionId};
use crate::sync::{read, write};

struct Entry {
    channel: Arc<NetworkChannel>,
    subscription: SubscriptionId,
}

/// Name-keyed registry of channels.
///
/// The manager forwards ticks to every channel and republishes each
/// channel's events to its own subscribers.
pub struct ChannelManager {
    runtime: Handle,
    channels: RwLock<BTreeMap<String, Entry>>,
    events: Arc<EventHub>,
}

impl ChannelManager {
    /// Create a manager whose channels run their I/O on `runtime`.
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            channels: RwLock::new(BTreeMap::new()),
            events: Arc::new(EventHub::new()),
        }
    }

    pub fn count(&self) -> usize {
        read(&self.channels).len()
    }

    pub fn has_channel(&self, name: &str) -> bool {
        read(&self.channels).contains_key(name)
    }

    pub fn channel(&self, name: &str) -> Option<Arc<NetworkChannel>> {
        read(&self.channels)
            .get(name)
            .map(|entry| Arc::clone(&entry.channel))
    }

    /// All channels, ordered by name.
    pub fn channels(&self) -> Vec<Arc<NetworkChannel>> {
        read(&self.channels)
            .values()
            .map(|entry| Arc::clone(&entry.channel))
            .collect()
    }

    /// Create and register a channel.
    ///
    /// Fails when the helper reports a zero header length or `name` is
    /// already taken.
    pub fn create_channel(
        &self,
        name: impl Into<String>,
        service_type: ServiceType,
        helper: Arc<dyn ChannelHelper>,
        config: ChannelConfig,
    ) -> Result<Arc<NetworkChannel>, ManagerError> {
        let name = name.into();
        let header_length = helper.packet_header_length();
        if header_length == 0 {
            return Err(ManagerError::InvalidHeaderLength(header_length));
        }

        let mut channels = write(&self.channels);
        if channels.contains_key(&name) {
            return Err(ManagerError::AlreadyExists(name));
        }

        let channel = Arc::new(NetworkChannel::new(
            name.clone(),
            service_type,
            helper,
            config,
            self.runtime.clone(),
        ));
        let events = Arc::clone(&self.events);
        let subscription = channel.subscribe(move |channel, event| {
            if events.publish(channel, event) > 0 {
                return;
            }
            if let ChannelEvent::Error(err) = event {
                error!(
                    channel,
                    kind = %err.kind,
                    socket_error = ?err.socket_error,
                    "{}",
                    err.message
                );
            }
        });
        channels.insert(
            name.clone(),
            Entry {
                channel: Arc::clone(&channel),
                subscription,
            },
        );
        info!(channel = %name, %service_type, header_length, "channel created");
        Ok(channel)
    }

    /// Unsubscribe, shut down and remove `name`. Returns false if unknown.
    ///
    /// The name stays registered until the channel is shut down, so no
    /// event is ever republished for a name `has_channel` rejects.
    pub fn destroy_channel(&self, name: &str) -> bool {
        let channel = {
            let channels = read(&self.channels);
            let Some(entry) = channels.get(name) else {
                return false;
            };
            entry.channel.unsubscribe(entry.subscription);
            Arc::clone(&entry.channel)
        };
        channel.shutdown();

        let mut channels = write(&self.channels);
        let removed = channels
            .get(name)
            .is_some_and(|entry| Arc::ptr_eq(&entry.channel, &channel));
        if removed {
            channels.remove(name);
            debug!(channel = %name, "channel destroyed");
        }
        removed
    }

    /// Tick every channel in name order.
    pub fn update(&self, elapsed_seconds: f32, real_elapsed_seconds: f32) {
        for channel in self.channels() {
            channel.update(elapsed_seconds, real_elapsed_seconds);
        }
    }

    /// Receive events from every channel, tagged with the channel name.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&str, &ChannelEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Unsubscribe and shut down every channel, then clear the registry.
    pub fn shutdown(&self) {
        let channels: Vec<Arc<NetworkChannel>> = read(&self.channels)
            .values()
            .map(|entry| {
                entry.channel.unsubscribe(entry.subscription);
                Arc::clone(&entry.channel)
            })
            .collect();
        if channels.is_empty() {
            return;
        }

        info!(count = channels.len(), "shutting down channels");
        for channel in &channels {
            channel.shutdown();
        }
        write(&self.channels).retain(|_, entry| {
            !channels
                .iter()
                .any(|channel| Arc::ptr_eq(channel, &entry.channel))
        });
    }
}

impl Drop for ChannelManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
