//! Two channels driven by one tick loop: a lobby and a match connection
//! talking to an in-process echo peer.
//!
//! Run with:
//!   cargo run --example lobby-client

use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tickwire::channel::{ChannelConfig, ChannelEvent, ChannelManager, ServiceType};
use tickwire::frame::{FramedHelper, Packet, PacketReader, PacketWriter, USER_PACKET_START};

const CHAT: u32 = USER_PACKET_START;
const MOVE: u32 = USER_PACKET_START + 1;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;

    thread::spawn(move || {
        for stream in listener.incoming().take(2).flatten() {
            thread::spawn(move || -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
                let mut reader = PacketReader::new(stream.try_clone()?);
                let mut writer = PacketWriter::new(stream);
                loop {
                    let packet = reader.read_packet()?;
                    writer.write_packet(&packet)?;
                }
            });
        }
    });

    let runtime = tokio::runtime::Runtime::new()?;
    let manager = ChannelManager::new(runtime.handle().clone());
    manager.subscribe(|channel, event| match event {
        ChannelEvent::Error(err) => eprintln!("[{channel}] error: {err}"),
        other => eprintln!("[{channel}] {}", other.kind_name()),
    });

    let helper = Arc::new(FramedHelper::new());
    let lobby = manager.create_channel(
        "lobby",
        ServiceType::Tcp,
        helper.clone(),
        ChannelConfig::default(),
    )?;
    let arena = manager.create_channel(
        "arena",
        ServiceType::TcpWithSyncReceive,
        helper,
        ChannelConfig::default(),
    )?;

    let replies = Arc::new(AtomicUsize::new(0));
    for channel in [&lobby, &arena] {
        let chat_replies = Arc::clone(&replies);
        channel.handlers().register(CHAT, move |name, packet| {
            eprintln!("[{name}] chat: {}", String::from_utf8_lossy(&packet.payload));
            chat_replies.fetch_add(1, Ordering::SeqCst);
        });
        let move_replies = Arc::clone(&replies);
        channel.handlers().register(MOVE, move |name, packet| {
            eprintln!("[{name}] move: {} bytes", packet.payload.len());
            move_replies.fetch_add(1, Ordering::SeqCst);
        });
        channel.connect(&addr.ip().to_string(), addr.port(), None)?;
    }

    let started = Instant::now();
    let mut sent = false;
    let frame = Duration::from_millis(16);
    while replies.load(Ordering::SeqCst) < 3 && started.elapsed() < Duration::from_secs(5) {
        manager.update(frame.as_secs_f32(), frame.as_secs_f32());
        if !sent && lobby.is_connected() && arena.is_connected() {
            lobby.send(Packet::new(CHAT, &b"glhf"[..]))?;
            arena.send(Packet::new(MOVE, vec![1, 0, 2, 0]))?;
            arena.send(Packet::new(CHAT, &b"on my way"[..]))?;
            sent = true;
        }
        thread::sleep(frame);
    }

    manager.shutdown();
    Ok(())
}
