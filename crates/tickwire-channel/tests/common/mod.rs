#![allow(dead_code)]

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tickwire_channel::{
    ChannelConfig, ChannelEvent, ChannelManager, NetworkChannel, NetworkErrorKind, ServiceType,
};
use tickwire_frame::{FrameConfig, FramedHelper, PacketReader, PacketWriter};
use tokio::runtime::Runtime;

pub const TICK: f32 = 0.01;
pub const WAIT: Duration = Duration::from_secs(5);

pub type Events = Arc<Mutex<Vec<(String, ChannelEvent)>>>;

pub fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("runtime should build")
}

/// Channel settings with heartbeats disabled so tests only see their own traffic.
pub fn quiet_config() -> ChannelConfig {
    ChannelConfig {
        heartbeat_interval: Duration::ZERO,
        ..ChannelConfig::default()
    }
}

pub fn bind() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
    let addr = listener.local_addr().expect("listener should have an address");
    (listener, addr)
}

/// The far end of a channel connection, speaking the default framing.
pub struct Peer {
    pub reader: PacketReader<TcpStream>,
    pub writer: PacketWriter<TcpStream>,
}

impl Peer {
    pub fn accept(listener: &TcpListener) -> Self {
        let (stream, _) = listener.accept().expect("peer should accept");
        let config = FrameConfig {
            read_timeout: Some(WAIT),
            ..FrameConfig::default()
        };
        let read_stream = stream.try_clone().expect("stream should clone");
        Self {
            reader: PacketReader::with_config_tcp(read_stream, config.clone())
                .expect("reader should configure"),
            writer: PacketWriter::with_config_tcp(stream, config).expect("writer should configure"),
        }
    }
}

pub fn create(manager: &ChannelManager, name: &str, service_type: ServiceType) -> Arc<NetworkChannel> {
    manager
        .create_channel(name, service_type, Arc::new(FramedHelper::new()), quiet_config())
        .expect("channel should be created")
}

/// Connect `channel` to a fresh listener and return the accepted peer.
pub fn connect_peer(manager: &ChannelManager, channel: &NetworkChannel) -> Peer {
    let (listener, addr) = bind();
    channel
        .connect(&addr.ip().to_string(), addr.port(), None)
        .expect("connect should start");
    let peer = Peer::accept(&listener);
    assert!(
        wait_until(manager, || channel.is_connected()),
        "channel should become active"
    );
    peer
}

/// Tick `manager` until `condition` holds or the wait budget runs out.
pub fn wait_until(manager: &ChannelManager, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    loop {
        manager.update(TICK, TICK);
        if condition() {
            return true;
        }
        if start.elapsed() >= WAIT {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
}

pub fn record(manager: &ChannelManager) -> Events {
    let events: Events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    manager.subscribe(move |channel, event| {
        sink.lock()
            .unwrap()
            .push((channel.to_string(), event.clone()));
    });
    events
}

pub fn count_kind(events: &Events, kind: &str) -> usize {
    events
        .lock()
        .unwrap()
        .iter()
        .filter(|(_, event)| event.kind_name() == kind)
        .count()
}

pub fn first_error(events: &Events) -> Option<NetworkErrorKind> {
    events.lock().unwrap().iter().find_map(|(_, event)| match event {
        ChannelEvent::Error(err) => Some(err.kind),
        _ => None,
    })
}

/// Keep writing from `peer` until the socket is refused, returning the number
/// of writes the remote accepted first. `None` means it never refused.
pub fn writes_until_refused(peer: &mut Peer, attempts: usize) -> Option<usize> {
    for accepted in 0..attempts {
        if peer.writer.write_raw(b"xxxxxxxx").is_err() {
            return Some(accepted);
        }
        thread::sleep(Duration::from_millis(20));
    }
    None
}
