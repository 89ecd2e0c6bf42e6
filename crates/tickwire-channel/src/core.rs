//! Transport-independent channel state shared between the tick thread and
//! I/O completions.
//!
//! Lock order: `connection` first, then `send_buffer` before `send_queue`,
//! `receive` before `heartbeat` or `received`. `pending` is only taken with
//! nothing but `connection` held. Events are always published after every
//! lock is released.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tickwire_frame::{ChannelHelper, CustomErrorData, Packet, ReceiveState};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::channel::{AddressFamily, ChannelState};
use crate::config::ChannelConfig;
use crate::error::{ChannelError, NetworkErrorKind, Result};
use crate::event::{ChannelEvent, EventHub, UserData};
use crate::handler::PacketHandlers;
use crate::heartbeat::{Heartbeat, HeartbeatState};
use crate::sync::lock;

pub(crate) struct Connection {
    pub(crate) state: ChannelState,
    /// Disposal signal of the current socket. Cancelled sockets keep their
    /// token here until `close` so the closed event still fires once.
    pub(crate) token: Option<CancellationToken>,
    pub(crate) family: AddressFamily,
    pub(crate) local_addr: Option<SocketAddr>,
    pub(crate) remote_addr: Option<SocketAddr>,
}

#[derive(Default)]
struct SendBuffer {
    staging: BytesMut,
    in_flight: Option<InFlight>,
}

struct InFlight {
    len: usize,
    position: usize,
    packets: u64,
}

impl SendBuffer {
    fn reset(&mut self) {
        self.staging.clear();
        self.in_flight = None;
    }
}

/// An outstanding connect or send and how long it has been waiting.
struct Pending {
    kind: NetworkErrorKind,
    waited: f32,
}

pub(crate) struct ChannelCore {
    name: String,
    helper: Arc<dyn ChannelHelper>,
    max_packet_size: usize,
    timeout_seconds: f32,
    connection: Mutex<Connection>,
    send_queue: Mutex<VecDeque<Packet>>,
    send_buffer: Mutex<SendBuffer>,
    receive: Mutex<ReceiveState>,
    received: Mutex<VecDeque<Packet>>,
    heartbeat: Mutex<Heartbeat>,
    pending: Mutex<Option<Pending>>,
    sent_count: AtomicU64,
    received_count: AtomicU64,
    pub(crate) events: EventHub,
    pub(crate) handlers: PacketHandlers,
}

impl ChannelCore {
    pub(crate) fn new(
        name: String,
        helper: Arc<dyn ChannelHelper>,
        config: &ChannelConfig,
    ) -> Self {
        let header_length = helper.packet_header_length();
        Self {
            name,
            helper,
            max_packet_size: config.max_packet_size,
            timeout_seconds: config.timeout.as_secs_f32(),
            connection: Mutex::new(Connection {
                state: ChannelState::Disconnected,
                token: None,
                family: AddressFamily::Unknown,
                local_addr: None,
                remote_addr: None,
            }),
            send_queue: Mutex::new(VecDeque::new()),
            send_buffer: Mutex::new(SendBuffer::default()),
            receive: Mutex::new(ReceiveState::new(header_length)),
            received: Mutex::new(VecDeque::new()),
            heartbeat: Mutex::new(Heartbeat::new(
                config.heartbeat_interval,
                config.reset_heartbeat_on_receive,
            )),
            pending: Mutex::new(None),
            sent_count: AtomicU64::new(0),
            received_count: AtomicU64::new(0),
            events: EventHub::new(),
            handlers: PacketHandlers::new(),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn helper(&self) -> &Arc<dyn ChannelHelper> {
        &self.helper
    }

    pub(crate) fn with_connection<R>(&self, f: impl FnOnce(&Connection) -> R) -> R {
        f(&*lock(&self.connection))
    }

    pub(crate) fn is_active(&self) -> bool {
        lock(&self.connection).state == ChannelState::Active
    }

    pub(crate) fn queued_count(&self) -> usize {
        lock(&self.send_queue).len()
    }

    pub(crate) fn sent_count(&self) -> u64 {
        self.sent_count.load(Ordering::Relaxed)
    }

    pub(crate) fn backlog_count(&self) -> usize {
        lock(&self.received).len()
    }

    pub(crate) fn received_count(&self) -> u64 {
        self.received_count.load(Ordering::Relaxed)
    }

    pub(crate) fn heartbeat_state(&self) -> HeartbeatState {
        lock(&self.heartbeat).state
    }

    pub(crate) fn heartbeat_interval(&self) -> Duration {
        lock(&self.heartbeat).interval
    }

    pub(crate) fn set_heartbeat_interval(&self, interval: Duration) {
        lock(&self.heartbeat).interval = interval;
    }

    pub(crate) fn reset_heartbeat_on_receive(&self) -> bool {
        lock(&self.heartbeat).reset_on_receive
    }

    pub(crate) fn set_reset_heartbeat_on_receive(&self, reset: bool) {
        lock(&self.heartbeat).reset_on_receive = reset;
    }

    pub(crate) fn reset_heartbeat(&self) {
        lock(&self.heartbeat).state.reset(true);
    }

    /// Install a fresh socket token and start waiting for the connect.
    pub(crate) fn begin_connecting(
        &self,
        family: AddressFamily,
        remote: SocketAddr,
    ) -> CancellationToken {
        let token = CancellationToken::new();
        let mut conn = lock(&self.connection);
        conn.token = Some(token.clone());
        conn.state = ChannelState::Connecting;
        conn.family = family;
        conn.remote_addr = Some(remote);
        conn.local_addr = None;
        *lock(&self.pending) = Some(Pending {
            kind: NetworkErrorKind::Connect,
            waited: 0.0,
        });
        token
    }

    /// Activate the channel once the socket owning `token` is connected.
    ///
    /// Returns false when that socket was closed in the meantime.
    pub(crate) fn complete_connect(
        &self,
        token: &CancellationToken,
        local: SocketAddr,
        user_data: Option<UserData>,
    ) -> bool {
        let remote = {
            let mut conn = lock(&self.connection);
            if token.is_cancelled() {
                return false;
            }
            self.sent_count.store(0, Ordering::Relaxed);
            self.received_count.store(0, Ordering::Relaxed);
            lock(&self.send_buffer).reset();
            lock(&self.send_queue).clear();
            {
                let mut receive = lock(&self.receive);
                receive.prepare_for_header();
                lock(&self.received).clear();
                lock(&self.heartbeat).state.reset(true);
            }
            *lock(&self.pending) = None;
            conn.local_addr = Some(local);
            conn.state = ChannelState::Active;
            conn.remote_addr
        };

        info!(channel = %self.name, %local, remote = ?remote, "channel connected");
        self.events
            .publish(&self.name, &ChannelEvent::Connected { user_data });
        true
    }

    /// Close the current socket. Idempotent; fires the closed event once per socket.
    pub(crate) fn close(&self) -> bool {
        self.close_inner(None)
    }

    /// Close only if `token` still belongs to a live socket.
    pub(crate) fn close_for(&self, token: &CancellationToken) -> bool {
        self.close_inner(Some(token))
    }

    fn close_inner(&self, expected: Option<&CancellationToken>) -> bool {
        {
            let mut conn = lock(&self.connection);
            if expected.is_some_and(CancellationToken::is_cancelled) {
                return false;
            }
            let Some(token) = conn.token.take() else {
                return false;
            };
            token.cancel();

            lock(&self.send_buffer).reset();
            lock(&self.send_queue).clear();
            {
                let mut receive = lock(&self.receive);
                receive.prepare_for_header();
                lock(&self.received).clear();
                lock(&self.heartbeat).state.reset(true);
            }
            *lock(&self.pending) = None;
            conn.local_addr = None;
            conn.state = ChannelState::Disconnected;
        }

        debug!(channel = %self.name, "channel closed");
        self.events.publish(&self.name, &ChannelEvent::Closed);
        true
    }

    /// Deactivate after a transport failure and report it.
    pub(crate) fn fail(&self, err: ChannelError) {
        {
            let mut conn = lock(&self.connection);
            if let Some(token) = &conn.token {
                token.cancel();
            }
            conn.state = ChannelState::Disconnected;
            *lock(&self.pending) = None;
        }
        self.report(&err);
    }

    /// Like [`fail`](Self::fail), but ignored once the socket owning `token`
    /// has been disposed.
    pub(crate) fn fail_for(&self, token: &CancellationToken, err: ChannelError) {
        {
            let mut conn = lock(&self.connection);
            if token.is_cancelled() {
                trace!(channel = %self.name, error = %err, "ignoring error from disposed socket");
                return;
            }
            token.cancel();
            conn.state = ChannelState::Disconnected;
            *lock(&self.pending) = None;
        }
        self.report(&err);
    }

    /// Publish `err`, falling back to the log when nobody listens.
    pub(crate) fn report(&self, err: &ChannelError) {
        let delivered = self
            .events
            .publish(&self.name, &ChannelEvent::Error(err.clone()));
        if delivered == 0 {
            error!(
                channel = %self.name,
                kind = %err.kind,
                socket_error = ?err.socket_error,
                "{}",
                err.message
            );
        }
    }

    /// Queue `packet` for the next send drain.
    pub(crate) fn send(&self, packet: Packet) -> Result<()> {
        let rejected = {
            let conn = lock(&self.connection);
            if conn.token.is_none() {
                Some("socket is not connected".to_string())
            } else if conn.state != ChannelState::Active {
                Some("socket is not active".to_string())
            } else if packet.payload.len() > self.max_packet_size {
                Some(format!(
                    "packet is invalid: {} byte payload exceeds maximum of {}",
                    packet.payload.len(),
                    self.max_packet_size
                ))
            } else {
                lock(&self.send_queue).push_back(packet);
                None
            }
        };

        match rejected {
            None => Ok(()),
            Some(message) => {
                let err = ChannelError::new(NetworkErrorKind::Send, message);
                self.report(&err);
                Err(err)
            }
        }
    }

    /// Serialize every queued packet into the send buffer and hand it out.
    ///
    /// Returns `None` while a previous buffer is still being written or when
    /// there is nothing to send.
    pub(crate) fn drain_send_queue(&self) -> Result<Option<Bytes>> {
        let conn = lock(&self.connection);
        if conn.state != ChannelState::Active {
            return Ok(None);
        }

        let bytes = {
            let mut buffer = lock(&self.send_buffer);
            if buffer.in_flight.is_some() {
                return Ok(None);
            }
            let packets: Vec<Packet> = lock(&self.send_queue).drain(..).collect();
            if packets.is_empty() {
                return Ok(None);
            }

            for packet in &packets {
                if let Err(err) = self.helper.serialize(packet, &mut buffer.staging) {
                    buffer.reset();
                    return Err(ChannelError::new(
                        NetworkErrorKind::Serialize,
                        format!("packet {} could not be serialized: {err}", packet.id),
                    ));
                }
            }

            let bytes = buffer.staging.split().freeze();
            if bytes.is_empty() {
                self.sent_count
                    .fetch_add(packets.len() as u64, Ordering::Relaxed);
                return Ok(None);
            }
            buffer.in_flight = Some(InFlight {
                len: bytes.len(),
                position: 0,
                packets: packets.len() as u64,
            });
            bytes
        };

        *lock(&self.pending) = Some(Pending {
            kind: NetworkErrorKind::Send,
            waited: 0.0,
        });
        drop(conn);
        trace!(channel = %self.name, size = bytes.len(), "send buffer drained");
        Ok(Some(bytes))
    }

    /// Record `n` more bytes of the in-flight buffer as written.
    pub(crate) fn advance_send(&self, token: &CancellationToken, n: usize) {
        let conn = lock(&self.connection);
        if token.is_cancelled() {
            return;
        }
        if let Some(in_flight) = lock(&self.send_buffer).in_flight.as_mut() {
            in_flight.position = (in_flight.position + n).min(in_flight.len);
        }
        if let Some(pending) = lock(&self.pending).as_mut() {
            pending.waited = 0.0;
        }
        drop(conn);
    }

    /// Mark the in-flight buffer as flushed so the next drain can proceed.
    pub(crate) fn complete_send(&self, token: &CancellationToken) {
        let conn = lock(&self.connection);
        if token.is_cancelled() {
            return;
        }
        let in_flight = lock(&self.send_buffer).in_flight.take();
        if let Some(in_flight) = in_flight {
            debug_assert_eq!(in_flight.position, in_flight.len);
            self.sent_count
                .fetch_add(in_flight.packets, Ordering::Relaxed);
        }
        let mut pending = lock(&self.pending);
        if pending
            .as_ref()
            .is_some_and(|p| p.kind == NetworkErrorKind::Send)
        {
            *pending = None;
        }
        drop(conn);
    }

    /// Bytes the current receive phase still needs.
    pub(crate) fn receive_remaining(&self) -> usize {
        lock(&self.receive).remaining()
    }

    /// Feed bytes read from the socket owning `token`.
    ///
    /// Every phase that fills up is processed before returning. Bytes from a
    /// disposed socket are dropped.
    pub(crate) fn on_received(&self, token: &CancellationToken, mut data: &[u8]) -> Result<()> {
        let mut custom_errors = Vec::new();
        let result = {
            let conn = lock(&self.connection);
            if token.is_cancelled() || conn.state != ChannelState::Active {
                return Ok(());
            }

            let mut receive = lock(&self.receive);
            let mut result = Ok(());
            while result.is_ok() {
                let consumed = receive.write(data);
                data = &data[consumed..];
                if !receive.is_full() {
                    break;
                }
                result = if receive.is_header_phase() {
                    self.process_packet_header(&mut receive, &mut custom_errors)
                } else {
                    self.process_packet(&mut receive, &mut custom_errors)
                };
            }
            result
        };

        for data in custom_errors {
            self.events
                .publish(&self.name, &ChannelEvent::CustomError(data));
        }
        result
    }

    fn process_packet_header(
        &self,
        receive: &mut ReceiveState,
        custom_errors: &mut Vec<CustomErrorData>,
    ) -> Result<()> {
        let decoded = self
            .helper
            .deserialize_header(receive.filled())
            .map_err(|err| {
                ChannelError::new(
                    NetworkErrorKind::DeserializeHeader,
                    format!("packet header is invalid: {err}"),
                )
            })?;
        custom_errors.extend(decoded.custom_error);

        let header = decoded.value.ok_or_else(|| {
            ChannelError::new(NetworkErrorKind::DeserializeHeader, "packet header is invalid")
        })?;
        trace!(
            channel = %self.name,
            packet_id = header.packet_id,
            size = header.body_length,
            "packet header received"
        );
        receive.prepare_for_packet(header);
        Ok(())
    }

    fn process_packet(
        &self,
        receive: &mut ReceiveState,
        custom_errors: &mut Vec<CustomErrorData>,
    ) -> Result<()> {
        lock(&self.heartbeat).on_packet_received();

        let header = receive.header().copied().ok_or_else(|| {
            ChannelError::new(NetworkErrorKind::DeserializeHeader, "packet header is missing")
        })?;
        let decoded = self
            .helper
            .deserialize_packet(&header, receive.filled())
            .map_err(|err| {
                ChannelError::new(
                    NetworkErrorKind::DeserializeBody,
                    format!("packet {} is invalid: {err}", header.packet_id),
                )
            })?;
        custom_errors.extend(decoded.custom_error);

        let packet = decoded.value.ok_or_else(|| {
            ChannelError::new(
                NetworkErrorKind::DeserializeBody,
                format!("packet {} is invalid", header.packet_id),
            )
        })?;
        lock(&self.received).push_back(packet);
        self.received_count.fetch_add(1, Ordering::Relaxed);
        receive.prepare_for_header();
        Ok(())
    }

    /// Hand every packet received so far to the packet handlers.
    pub(crate) fn dispatch_received(&self) -> usize {
        let count = lock(&self.received).len();
        let mut dispatched = 0;
        for _ in 0..count {
            let Some(packet) = lock(&self.received).pop_front() else {
                break;
            };
            self.handlers.dispatch(&self.name, &packet);
            dispatched += 1;
        }
        dispatched
    }

    /// Advance the outstanding operation's wait time, failing it once it
    /// exceeds the configured timeout.
    pub(crate) fn tick_timeout(&self, real_elapsed_seconds: f32) {
        if self.timeout_seconds <= 0.0 {
            return;
        }
        let expired = {
            let mut pending = lock(&self.pending);
            let Some(current) = pending.as_mut() else {
                return;
            };
            current.waited += real_elapsed_seconds;
            if current.waited <= self.timeout_seconds {
                return;
            }
            pending.take()
        };
        if let Some(expired) = expired {
            self.fail(ChannelError::timed_out(expired.kind, expired.waited));
        }
    }

    /// Advance the heartbeat timer and send a heartbeat when it is due.
    pub(crate) fn tick_heartbeat(&self, real_elapsed_seconds: f32) {
        if !self.is_active() {
            return;
        }
        let Some(prior_misses) = lock(&self.heartbeat).tick(real_elapsed_seconds) else {
            return;
        };
        let Some(packet) = self.helper.heartbeat() else {
            return;
        };

        if self.send(packet).is_ok() {
            trace!(channel = %self.name, prior_misses, "heartbeat queued");
            if prior_misses > 0 {
                self.events.publish(
                    &self.name,
                    &ChannelEvent::MissedHeartbeat {
                        miss_count: prior_misses,
                    },
                );
            }
        }
    }
}
