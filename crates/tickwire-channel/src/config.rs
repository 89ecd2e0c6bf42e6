use std::time::Duration;

use tickwire_frame::DEFAULT_MAX_PAYLOAD;

/// Default heartbeat interval.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Default limit for an outstanding connect or send.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-channel behavior knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    /// Silence after which a heartbeat is sent. `Duration::ZERO` disables heartbeats.
    pub heartbeat_interval: Duration,
    /// Whether receiving a packet also restarts the heartbeat timer.
    /// The miss count is cleared on receipt either way.
    pub reset_heartbeat_on_receive: bool,
    /// How long a connect or send may stay outstanding, measured in real
    /// tick time. `Duration::ZERO` disables the check.
    pub timeout: Duration,
    /// Largest payload `send` accepts.
    pub max_packet_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            reset_heartbeat_on_receive: true,
            timeout: DEFAULT_OPERATION_TIMEOUT,
            max_packet_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}
