//! Channel lifecycle events and the subscriber list that delivers them.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tickwire_frame::CustomErrorData;

use crate::error::ChannelError;
use crate::sync::{read, write};

/// Opaque value handed to `connect` and returned with the connected event.
pub type UserData = Arc<dyn Any + Send + Sync>;

/// Something that happened on a channel.
#[derive(Clone)]
pub enum ChannelEvent {
    /// The connect handshake completed; the channel is active.
    Connected { user_data: Option<UserData> },
    /// The channel's socket was closed.
    Closed,
    /// A heartbeat was sent while earlier ones were still unanswered.
    MissedHeartbeat { miss_count: u32 },
    /// A transport failure. The channel is no longer active unless the
    /// error rejected a single `send` request.
    Error(ChannelError),
    /// Out-of-band diagnostic data produced by the helper while decoding.
    CustomError(CustomErrorData),
}

impl ChannelEvent {
    /// Short name of the event kind, for logs and CLI output.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Closed => "closed",
            Self::MissedHeartbeat { .. } => "missed-heartbeat",
            Self::Error(_) => "error",
            Self::CustomError(_) => "custom-error",
        }
    }
}

impl fmt::Debug for ChannelEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected { user_data } => f
                .debug_struct("Connected")
                .field("user_data", &user_data.is_some())
                .finish(),
            Self::Closed => f.write_str("Closed"),
            Self::MissedHeartbeat { miss_count } => f
                .debug_struct("MissedHeartbeat")
                .field("miss_count", miss_count)
                .finish(),
            Self::Error(err) => f.debug_tuple("Error").field(err).finish(),
            Self::CustomError(_) => f.write_str("CustomError(..)"),
        }
    }
}

/// Callback receiving the channel name and the event.
pub type EventHandler = Arc<dyn Fn(&str, &ChannelEvent) + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Ordered list of event subscribers.
pub(crate) struct EventHub {
    next_id: AtomicU64,
    subscribers: RwLock<Vec<(SubscriptionId, EventHandler)>>,
}

impl EventHub {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&str, &ChannelEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        write(&self.subscribers).push((id, Arc::new(handler)));
        id
    }

    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = write(&self.subscribers);
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        subscribers.len() != before
    }

    pub(crate) fn clear(&self) {
        write(&self.subscribers).clear();
    }

    #[cfg(test)]
    pub(crate) fn has_subscribers(&self) -> bool {
        !read(&self.subscribers).is_empty()
    }

    /// Deliver `event` to every subscriber; returns how many received it.
    ///
    /// Handlers run after the subscriber lock is released, so they may
    /// subscribe, unsubscribe, or call back into the channel.
    pub(crate) fn publish(&self, channel: &str, event: &ChannelEvent) -> usize {
        let handlers: Vec<EventHandler> = read(&self.subscribers)
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in &handlers {
            handler(channel, event);
        }
        handlers.len()
    }
}
