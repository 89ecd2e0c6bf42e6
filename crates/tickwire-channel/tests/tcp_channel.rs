mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::*;
use tickwire_channel::{
    AddressFamily, ChannelConfig, ChannelEvent, ChannelManager, ChannelState, NetworkErrorKind,
    ServiceType,
};
use tickwire_frame::{FramedHelper, Packet, HEADER_SIZE, HEARTBEAT};

#[test]
fn sends_reach_the_wire_in_call_order() {
    let rt = runtime();
    let manager = ChannelManager::new(rt.handle().clone());
    let channel = create(&manager, "game", ServiceType::Tcp);
    let mut peer = connect_peer(&manager, &channel);

    for i in 0..20u32 {
        channel
            .send(Packet::new(300 + i, format!("msg-{i}").into_bytes()))
            .unwrap();
        if i % 7 == 0 {
            manager.update(TICK, TICK);
        }
    }
    assert!(wait_until(&manager, || channel.sent_packet_count() == 20));

    for i in 0..20u32 {
        let packet = peer.reader.read_packet().unwrap();
        assert_eq!(packet.id, 300 + i);
        assert_eq!(packet.payload.as_ref(), format!("msg-{i}").as_bytes());
    }
    assert_eq!(channel.send_packet_count(), 0);
}

#[test]
fn received_packets_are_dispatched_on_update() {
    let rt = runtime();
    let manager = ChannelManager::new(rt.handle().clone());
    let channel = create(&manager, "game", ServiceType::Tcp);
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        channel.handlers().register(400, move |name, packet| {
            seen.lock()
                .unwrap()
                .push((name.to_string(), packet.payload.clone()));
        });
    }
    let mut peer = connect_peer(&manager, &channel);

    peer.writer.send(400, b"first").unwrap();
    peer.writer.send(HEARTBEAT, b"").unwrap();
    peer.writer.send(400, b"second").unwrap();

    assert!(wait_until(&manager, || seen.lock().unwrap().len() == 2));
    let seen = seen.lock().unwrap();
    assert_eq!(seen[0].0, "game");
    assert_eq!(seen[0].1.as_ref(), b"first");
    assert_eq!(seen[1].1.as_ref(), b"second");
    assert_eq!(channel.received_packet_count(), 3);
    assert_eq!(channel.receive_packet_count(), 0);
}

#[test]
fn connected_event_carries_user_data() {
    let rt = runtime();
    let manager = ChannelManager::new(rt.handle().clone());
    let events = record(&manager);
    let channel = create(&manager, "game", ServiceType::Tcp);
    let (listener, addr) = bind();

    channel
        .connect("127.0.0.1", addr.port(), Some(Arc::new("lobby-7")))
        .unwrap();
    let _peer = Peer::accept(&listener);
    assert!(wait_until(&manager, || channel.is_connected()));

    let tag = events.lock().unwrap().iter().find_map(|(_, event)| match event {
        ChannelEvent::Connected {
            user_data: Some(data),
        } => data.downcast_ref::<&str>().copied(),
        _ => None,
    });
    assert_eq!(tag, Some("lobby-7"));
    assert_eq!(channel.address_family(), AddressFamily::IPv4);
    assert_eq!(channel.remote_addr(), Some(addr));
    assert!(channel.local_addr().is_some());
}

#[test]
fn remote_close_fires_one_closed_event() {
    let rt = runtime();
    let manager = ChannelManager::new(rt.handle().clone());
    let events = record(&manager);
    let channel = create(&manager, "game", ServiceType::Tcp);
    let peer = connect_peer(&manager, &channel);

    drop(peer);
    assert!(wait_until(&manager, || count_kind(&events, "closed") == 1));

    channel.close();
    channel.close();
    assert_eq!(count_kind(&events, "closed"), 1);
    assert_eq!(channel.state(), ChannelState::Disconnected);
    assert_eq!(channel.send_packet_count(), 0);

    let err = channel.send(Packet::new(300, &b"late"[..])).unwrap_err();
    assert_eq!(err.kind, NetworkErrorKind::Send);
}

#[test]
fn close_twice_yields_single_closed_event() {
    let rt = runtime();
    let manager = ChannelManager::new(rt.handle().clone());
    let events = record(&manager);
    let channel = create(&manager, "game", ServiceType::Tcp);
    let mut peer = connect_peer(&manager, &channel);

    channel.send(Packet::new(300, &b"queued"[..])).unwrap();
    channel.close();
    channel.close();

    assert_eq!(count_kind(&events, "closed"), 1);
    assert_eq!(channel.send_packet_count(), 0);
    assert!(!channel.is_connected());
    assert!(peer.reader.read_packet().is_err());
}

#[test]
fn invalid_send_reports_error_and_stays_active() {
    let rt = runtime();
    let manager = ChannelManager::new(rt.handle().clone());
    let events = record(&manager);
    let channel = manager
        .create_channel(
            "game",
            ServiceType::Tcp,
            Arc::new(FramedHelper::new()),
            ChannelConfig {
                max_packet_size: 8,
                ..quiet_config()
            },
        )
        .unwrap();
    let mut peer = connect_peer(&manager, &channel);

    let err = channel
        .send(Packet::new(300, vec![0u8; 64]))
        .unwrap_err();
    assert_eq!(err.kind, NetworkErrorKind::Send);
    assert_eq!(first_error(&events), Some(NetworkErrorKind::Send));
    assert!(channel.is_connected());

    channel.send(Packet::new(301, &b"fits"[..])).unwrap();
    assert!(wait_until(&manager, || channel.sent_packet_count() == 1));
    assert_eq!(peer.reader.read_packet().unwrap().id, 301);
}

#[test]
fn malformed_header_deactivates_channel() {
    let rt = runtime();
    let manager = ChannelManager::new(rt.handle().clone());
    let events = record(&manager);
    let channel = create(&manager, "game", ServiceType::Tcp);
    let mut peer = connect_peer(&manager, &channel);

    peer.writer.write_raw(&[0xFF; HEADER_SIZE]).unwrap();

    assert!(wait_until(&manager, || first_error(&events).is_some()));
    assert_eq!(first_error(&events), Some(NetworkErrorKind::DeserializeHeader));
    assert!(!channel.is_connected());
    assert!(channel.send(Packet::new(300, &b"x"[..])).is_err());
}

#[test]
fn idle_channel_sends_heartbeats_and_counts_misses() {
    let rt = runtime();
    let manager = ChannelManager::new(rt.handle().clone());
    let events = record(&manager);
    let channel = create(&manager, "game", ServiceType::Tcp);
    channel.set_heartbeat_interval(Duration::from_millis(50));
    assert_eq!(channel.heartbeat_interval(), Duration::from_millis(50));
    let mut peer = connect_peer(&manager, &channel);

    assert!(wait_until(&manager, || count_kind(&events, "missed-heartbeat") >= 2));
    assert!(channel.miss_heartbeat_count() >= 3);
    assert!(channel.is_connected());

    let packet = peer.reader.read_packet().unwrap();
    assert_eq!(packet.id, HEARTBEAT);
    assert!(packet.payload.is_empty());

    peer.writer.send(500, b"alive").unwrap();
    assert!(wait_until(&manager, || channel.received_packet_count() == 1));
    assert!(channel.miss_heartbeat_count() <= 1);
}

#[test]
fn refused_connect_reports_connect_error() {
    let rt = runtime();
    let manager = ChannelManager::new(rt.handle().clone());
    let events = record(&manager);
    let channel = create(&manager, "game", ServiceType::Tcp);
    let (listener, addr) = bind();
    drop(listener);

    channel.connect("127.0.0.1", addr.port(), None).unwrap();
    assert!(wait_until(&manager, || first_error(&events).is_some()));

    assert_eq!(first_error(&events), Some(NetworkErrorKind::Connect));
    assert!(!channel.is_connected());
    assert_eq!(count_kind(&events, "connected"), 0);
}

#[test]
fn unparseable_address_is_rejected() {
    let rt = runtime();
    let manager = ChannelManager::new(rt.handle().clone());
    let events = record(&manager);
    let channel = create(&manager, "game", ServiceType::Tcp);

    let err = channel.connect("game.example", 7000, None).unwrap_err();
    assert_eq!(err.kind, NetworkErrorKind::AddressFamilyUnsupported);
    assert_eq!(
        first_error(&events),
        Some(NetworkErrorKind::AddressFamilyUnsupported)
    );
    assert_eq!(channel.state(), ChannelState::Disconnected);
}

#[test]
fn connect_times_out_against_silent_address() {
    let rt = runtime();
    let manager = ChannelManager::new(rt.handle().clone());
    let events = record(&manager);
    let channel = manager
        .create_channel(
            "game",
            ServiceType::Tcp,
            Arc::new(FramedHelper::new()),
            ChannelConfig {
                timeout: Duration::from_millis(100),
                ..quiet_config()
            },
        )
        .unwrap();

    // TEST-NET-1 is reserved and never answers.
    channel.connect("192.0.2.1", 9, None).unwrap();
    assert!(wait_until(&manager, || first_error(&events).is_some()));

    let recorded = events.lock().unwrap();
    let err = recorded
        .iter()
        .find_map(|(_, event)| match event {
            ChannelEvent::Error(err) => Some(err.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(err.kind, NetworkErrorKind::Connect);
}

#[test]
fn reconnect_replaces_previous_socket() {
    let rt = runtime();
    let manager = ChannelManager::new(rt.handle().clone());
    let events = record(&manager);
    let channel = create(&manager, "game", ServiceType::Tcp);
    let mut first = connect_peer(&manager, &channel);
    let mut second = connect_peer(&manager, &channel);

    assert_eq!(count_kind(&events, "closed"), 1);
    assert_eq!(count_kind(&events, "connected"), 2);
    assert!(first.reader.read_packet().is_err());

    channel.send(Packet::new(300, &b"again"[..])).unwrap();
    assert!(wait_until(&manager, || channel.sent_packet_count() == 1));
    assert_eq!(second.reader.read_packet().unwrap().payload.as_ref(), b"again");
}

#[test]
fn sync_receive_channel_reads_on_update() {
    let rt = runtime();
    let manager = ChannelManager::new(rt.handle().clone());
    let events = record(&manager);
    let channel = create(&manager, "sync", ServiceType::TcpWithSyncReceive);
    assert_eq!(channel.service_type(), ServiceType::TcpWithSyncReceive);
    let echoes = Arc::new(Mutex::new(Vec::new()));
    {
        let echoes = Arc::clone(&echoes);
        channel.handlers().set_fallback(move |_, packet| {
            echoes.lock().unwrap().push(packet.id);
        });
    }
    let mut peer = connect_peer(&manager, &channel);

    channel.send(Packet::new(310, &b"ping"[..])).unwrap();
    assert!(wait_until(&manager, || channel.sent_packet_count() == 1));
    let ping = peer.reader.read_packet().unwrap();
    peer.writer.write_packet(&ping).unwrap();
    peer.writer.send(311, &[7u8; 4096]).unwrap();

    assert!(wait_until(&manager, || echoes.lock().unwrap().len() == 2));
    assert_eq!(*echoes.lock().unwrap(), vec![310, 311]);

    drop(peer);
    assert!(wait_until(&manager, || count_kind(&events, "closed") == 1));
}

#[test]
fn close_releases_socket_for_every_service_type() {
    let rt = runtime();
    let manager = ChannelManager::new(rt.handle().clone());
    let cases = [
        ("async", ServiceType::Tcp),
        ("sync", ServiceType::TcpWithSyncReceive),
    ];
    for (name, service_type) in cases {
        let channel = create(&manager, name, service_type);
        let mut peer = connect_peer(&manager, &channel);

        channel.close();
        for _ in 0..5 {
            manager.update(TICK, TICK);
        }

        assert!(peer.reader.read_packet().is_err());
        assert!(
            writes_until_refused(&mut peer, 50).is_some(),
            "{service_type} socket still open after close"
        );
    }
}

#[test]
fn failed_sync_channel_releases_socket() {
    let rt = runtime();
    let manager = ChannelManager::new(rt.handle().clone());
    let events = record(&manager);
    let channel = create(&manager, "sync", ServiceType::TcpWithSyncReceive);
    let mut peer = connect_peer(&manager, &channel);

    peer.writer.write_raw(&[0xFF; HEADER_SIZE]).unwrap();
    assert!(wait_until(&manager, || first_error(&events).is_some()));
    assert_eq!(first_error(&events), Some(NetworkErrorKind::DeserializeHeader));

    assert!(writes_until_refused(&mut peer, 50).is_some());
}
