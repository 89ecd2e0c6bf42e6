use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tickwire_frame::{ChannelHelper, Packet};
use tokio::runtime::Handle;
use tracing::debug;

use crate::config::ChannelConfig;
use crate::core::ChannelCore;
use crate::error::{ChannelError, NetworkErrorKind, Result};
use crate::event::{ChannelEvent, SubscriptionId, UserData};
use crate::handler::PacketHandlers;
use crate::tcp::TcpTransport;

/// Connection lifecycle of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Active,
    /// Teardown of the current socket. Close runs entirely under the
    /// connection lock, so [`NetworkChannel::state`] never reports it;
    /// subscribers of the closed event already see `Disconnected`.
    Closing,
}

impl ChannelState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::Closing => "closing",
        }
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport flavor a channel is built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceType {
    /// TCP with receives continuously issued on the runtime.
    Tcp,
    /// TCP whose receive side is drained during `update` on the tick thread.
    TcpWithSyncReceive,
}

impl ServiceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::TcpWithSyncReceive => "tcp-sync-receive",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address family of the channel's current socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    Unknown,
    IPv4,
    IPv6,
}

impl AddressFamily {
    pub fn of(addr: &SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(_) => Self::IPv4,
            SocketAddr::V6(_) => Self::IPv6,
        }
    }
}

/// Socket mechanics behind a channel.
///
/// The transport owns the socket; everything a transport learns is fed
/// back through `ChannelCore`.
pub(crate) trait Transport: Send + Sync {
    /// Dispose any previous socket and start connecting to `addr`.
    fn connect(
        &self,
        core: &Arc<ChannelCore>,
        addr: SocketAddr,
        user_data: Option<UserData>,
    ) -> Result<()>;

    /// Push queued packets toward the socket.
    fn process_send(&self, core: &ChannelCore) -> Result<()>;

    /// Pull received bytes into the channel, for transports that read on the tick.
    fn process_receive(&self, core: &ChannelCore) -> Result<()>;

    /// Release socket halves still held for a disposed socket.
    fn release(&self);
}

/// A named, heartbeat-monitored packet connection.
///
/// All methods take `&self` and may be called from any thread; `update` is
/// meant to be driven by a single tick thread.
pub struct NetworkChannel {
    core: Arc<ChannelCore>,
    transport: Box<dyn Transport>,
    service_type: ServiceType,
    shut_down: AtomicBool,
}

impl NetworkChannel {
    pub(crate) fn new(
        name: String,
        service_type: ServiceType,
        helper: Arc<dyn ChannelHelper>,
        config: ChannelConfig,
        runtime: Handle,
    ) -> Self {
        let transport: Box<dyn Transport> = match service_type {
            ServiceType::Tcp => Box::new(TcpTransport::new(runtime, false)),
            ServiceType::TcpWithSyncReceive => Box::new(TcpTransport::new(runtime, true)),
        };
        Self {
            core: Arc::new(ChannelCore::new(name, helper, &config)),
            transport,
            service_type,
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        self.core.name()
    }

    pub fn service_type(&self) -> ServiceType {
        self.service_type
    }

    pub fn address_family(&self) -> AddressFamily {
        self.core.with_connection(|conn| conn.family)
    }

    pub fn state(&self) -> ChannelState {
        self.core.with_connection(|conn| conn.state)
    }

    /// Whether the connect handshake completed and the socket is still usable.
    pub fn is_connected(&self) -> bool {
        self.core.is_active()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.core.with_connection(|conn| conn.local_addr)
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.core.with_connection(|conn| conn.remote_addr)
    }

    /// Packets queued but not yet handed to the socket.
    pub fn send_packet_count(&self) -> usize {
        self.core.queued_count()
    }

    /// Packets fully written since the last connect.
    pub fn sent_packet_count(&self) -> u64 {
        self.core.sent_count()
    }

    /// Packets received but not yet dispatched to handlers.
    pub fn receive_packet_count(&self) -> usize {
        self.core.backlog_count()
    }

    /// Packets received since the last connect.
    pub fn received_packet_count(&self) -> u64 {
        self.core.received_count()
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.core.heartbeat_interval()
    }

    /// Change the heartbeat interval; zero disables heartbeats.
    pub fn set_heartbeat_interval(&self, interval: Duration) {
        self.core.set_heartbeat_interval(interval);
    }

    pub fn reset_heartbeat_on_receive(&self) -> bool {
        self.core.reset_heartbeat_on_receive()
    }

    pub fn set_reset_heartbeat_on_receive(&self, reset: bool) {
        self.core.set_reset_heartbeat_on_receive(reset);
    }

    /// Heartbeats sent without any packet received in between.
    pub fn miss_heartbeat_count(&self) -> u32 {
        self.core.heartbeat_state().miss_count()
    }

    /// Seconds of real time since the heartbeat timer last restarted.
    pub fn heartbeat_elapsed_seconds(&self) -> f32 {
        self.core.heartbeat_state().elapsed_seconds()
    }

    /// Restart the heartbeat timer and clear the miss count.
    pub fn reset_heartbeat(&self) {
        self.core.reset_heartbeat();
    }

    /// Handlers that receive this channel's packets during `update`.
    pub fn handlers(&self) -> &PacketHandlers {
        &self.core.handlers
    }

    /// Receive this channel's lifecycle events.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&str, &ChannelEvent) + Send + Sync + 'static,
    {
        self.core.events.subscribe(handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.core.events.unsubscribe(id)
    }

    /// Start connecting to `address:port`.
    ///
    /// `address` must be a literal IPv4 or IPv6 address. Any previous socket
    /// is closed first. Completion is reported through a connected or error
    /// event; `user_data` comes back with the connected event.
    pub fn connect(&self, address: &str, port: u16, user_data: Option<UserData>) -> Result<()> {
        let ip: IpAddr = match address.trim().parse() {
            Ok(ip) => ip,
            Err(_) => {
                let err = ChannelError::new(
                    NetworkErrorKind::AddressFamilyUnsupported,
                    format!("'{address}' is not an IPv4 or IPv6 address"),
                );
                self.core.report(&err);
                return Err(err);
            }
        };
        self.connect_addr(SocketAddr::new(ip, port), user_data)
    }

    /// Start connecting to `addr`. See [`connect`](Self::connect).
    pub fn connect_addr(&self, addr: SocketAddr, user_data: Option<UserData>) -> Result<()> {
        debug!(
            channel = %self.name(),
            %addr,
            service_type = %self.service_type,
            "connect requested"
        );
        self.transport.connect(&self.core, addr, user_data)
    }

    /// Queue `packet` for sending on the next `update`.
    pub fn send(&self, packet: Packet) -> Result<()> {
        self.core.send(packet)
    }

    /// Close the socket. Safe to call repeatedly and from any thread.
    pub fn close(&self) {
        self.core.close();
        self.transport.release();
    }

    /// Drive the channel by one tick.
    ///
    /// `real_elapsed_seconds` is unscaled wall-clock time and drives
    /// heartbeat and timeout accounting; `elapsed_seconds` is accepted for
    /// symmetry with the host scheduler.
    pub fn update(&self, _elapsed_seconds: f32, real_elapsed_seconds: f32) {
        self.core.tick_timeout(real_elapsed_seconds);
        if !self.core.is_active() {
            return;
        }

        if let Err(err) = self.transport.process_send(&self.core) {
            self.core.fail(err);
            return;
        }
        if let Err(err) = self.transport.process_receive(&self.core) {
            self.core.fail(err);
            return;
        }
        if !self.core.is_active() {
            return;
        }

        self.core.dispatch_received();
        self.core.tick_heartbeat(real_elapsed_seconds);
    }

    /// Close, release the helper and drop every subscriber.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.close();
        self.core.helper().shutdown();
        self.core.events.clear();
        debug!(channel = %self.name(), "channel shut down");
    }
}

impl fmt::Debug for NetworkChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkChannel")
            .field("name", &self.name())
            .field("service_type", &self.service_type)
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for NetworkChannel {
    fn drop(&mut self) {
        self.close();
    }
}
