// test-only module included via protocol/mod.rs
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::{FramingConfig, OverflowPolicy};
use crate::core::frame::{encode_frame, BUF_SIZE, MAX_PACKET_SIZE};
use crate::error::{ErrorCode, SocketError};
use crate::protocol::{PacketSocket, SocketEvent};
use crate::transport::memory::MemoryTransport;
use crate::transport::{Transport, TransportEvent};
use crate::utils::metrics::Metrics;

type MemSocket = PacketSocket<MemoryTransport>;

fn addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

fn socket_pair() -> (MemSocket, MemSocket) {
    let (a, b) = MemoryTransport::pair();
    (
        PacketSocket::new(a, false).with_metrics(Arc::new(Metrics::new())),
        PacketSocket::new(b, false).with_metrics(Arc::new(Metrics::new())),
    )
}

/// A raw byte feeder on one side, a packet socket on the other
fn raw_and_socket(config: &FramingConfig) -> (MemoryTransport, MemSocket) {
    let (raw, b) = MemoryTransport::pair();
    let socket = PacketSocket::with_config(b, false, config).with_metrics(Arc::new(Metrics::new()));
    (raw, socket)
}

fn packets(socket: &mut MemSocket) -> Vec<Vec<u8>> {
    socket
        .drain_events()
        .filter_map(|event| match event {
            SocketEvent::Packet { payload, .. } => Some(payload.to_vec()),
            _ => None,
        })
        .collect()
}

#[test]
fn test_send_and_receive_single_packet() {
    let (mut client, mut server) = socket_pair();

    assert_eq!(client.send(b"hello").unwrap(), 5);
    assert_eq!(client.pending_output(), 0);

    server.handle_event(TransportEvent::Readable);
    match server.poll_event() {
        Some(SocketEvent::Packet { payload, remote }) => {
            assert_eq!(&payload[..], b"hello");
            assert_eq!(remote, client.local_addr());
        }
        other => panic!("Expected packet, got {other:?}"),
    }
    assert!(server.poll_event().is_none());
    assert_eq!(server.buffered_input(), 0);
}

#[test]
fn test_empty_payload_round_trip() {
    let (mut client, mut server) = socket_pair();
    assert_eq!(client.send(&[]).unwrap(), 0);
    server.on_readable();
    assert_eq!(packets(&mut server), vec![Vec::<u8>::new()]);
}

#[test]
fn test_coalesced_frames_all_delivered_in_order() {
    let (mut raw, mut socket) = raw_and_socket(&FramingConfig::default());

    let mut wire = encode_frame(b"first").unwrap();
    wire.extend(encode_frame(b"second").unwrap());
    wire.extend(encode_frame(b"").unwrap());
    raw.send(&wire).unwrap();

    socket.on_readable();
    assert_eq!(
        packets(&mut socket),
        vec![b"first".to_vec(), b"second".to_vec(), Vec::new()]
    );
    assert_eq!(socket.buffered_input(), 0);
}

#[test]
fn test_fragmented_header_and_payload() {
    let (mut raw, mut socket) = raw_and_socket(&FramingConfig::default());

    // Step 1: prefix alone
    raw.send(&[0x00, 0x05]).unwrap();
    socket.on_readable();
    assert!(packets(&mut socket).is_empty());

    // Step 2: first part of the payload
    raw.send(&[1, 2]).unwrap();
    socket.on_readable();
    assert!(packets(&mut socket).is_empty());
    assert_eq!(socket.buffered_input(), 4);

    // Step 3: the rest
    raw.send(&[3, 4, 5]).unwrap();
    socket.on_readable();
    assert_eq!(packets(&mut socket), vec![vec![1, 2, 3, 4, 5]]);
}

#[test]
fn test_split_prefix_byte_by_byte() {
    let (mut raw, mut socket) = raw_and_socket(&FramingConfig::default());
    let wire = encode_frame(b"xy").unwrap();

    for (i, byte) in wire.iter().enumerate() {
        raw.send(&[*byte]).unwrap();
        socket.on_readable();
        let got = packets(&mut socket);
        if i + 1 < wire.len() {
            assert!(got.is_empty(), "packet emitted early at byte {i}");
        } else {
            assert_eq!(got, vec![b"xy".to_vec()]);
        }
    }
}

#[test]
fn test_trailing_partial_frame_kept_at_front() {
    let (mut raw, mut socket) = raw_and_socket(&FramingConfig::default());

    let mut wire = encode_frame(b"done").unwrap();
    wire.extend_from_slice(&[0x00, 0x03, b'a']);
    raw.send(&wire).unwrap();
    socket.on_readable();
    assert_eq!(packets(&mut socket), vec![b"done".to_vec()]);
    assert_eq!(socket.buffered_input(), 3);

    raw.send(b"bc").unwrap();
    socket.on_readable();
    assert_eq!(packets(&mut socket), vec![b"abc".to_vec()]);
}

#[test]
fn test_oversized_send_rejected_without_side_effects() {
    let (mut client, mut server) = socket_pair();

    let too_big = vec![0u8; MAX_PACKET_SIZE + 1];
    let err = client.send(&too_big).unwrap_err();
    assert!(matches!(err, SocketError::MessageTooLarge(n) if n == MAX_PACKET_SIZE + 1));
    assert_eq!(client.pending_output(), 0);
    assert_eq!(client.last_error(), Some(ErrorCode::MessageTooLarge));
    assert_eq!(server.transport().available(), 0);

    // A maximal packet still goes through and fills the receiver exactly
    let max = vec![0x5Au8; MAX_PACKET_SIZE];
    assert_eq!(client.send(&max).unwrap(), MAX_PACKET_SIZE);
    server.on_readable();
    let got = packets(&mut server);
    assert_eq!(got.len(), 1);
    assert_eq!(got[0], max);
    assert_eq!(server.metrics().snapshot().buffer_overflows, 0);
}

#[test]
fn test_backpressure_drops_while_frame_is_draining() {
    let (mut client, mut server) = socket_pair();

    // Step 1: only 3 of 7 bytes make it out
    client.transport_mut().set_write_window(Some(3));
    assert_eq!(client.send(b"hello").unwrap(), 5);
    assert_eq!(client.pending_output(), 4);

    // Step 2: the transport stalls; a second send is shed but reported as sent
    client.transport_mut().set_write_window(Some(0));
    assert_eq!(client.send(b"world").unwrap(), 5);
    assert_eq!(client.pending_output(), 4);
    assert_eq!(server.transport().available(), 3);
    assert_eq!(client.metrics().snapshot().packets_dropped, 1);

    // Step 3: writable again; only the first frame reaches the wire
    client.transport_mut().set_write_window(None);
    client.handle_event(TransportEvent::Writable);
    assert_eq!(client.pending_output(), 0);
    assert_eq!(server.transport().available(), 7);

    server.on_readable();
    assert_eq!(packets(&mut server), vec![b"hello".to_vec()]);

    // Step 4: with the queue empty, sends are accepted again
    client.send(b"again").unwrap();
    server.on_readable();
    assert_eq!(packets(&mut server), vec![b"again".to_vec()]);
}

#[test]
fn test_send_without_progress_discards_frame() {
    let (mut client, server) = socket_pair();
    client.transport_mut().set_write_window(Some(0));

    let err = client.send(b"stalled").unwrap_err();
    assert!(err.is_would_block());
    assert_eq!(client.pending_output(), 0);
    assert_eq!(client.last_error(), Some(ErrorCode::Io(io::ErrorKind::WouldBlock)));
    assert_eq!(server.transport().available(), 0);

    client.transport_mut().set_write_window(None);
    assert_eq!(client.send(b"ok").unwrap(), 2);
}

#[test]
fn test_writable_without_pending_output_is_noop() {
    let (mut client, server) = socket_pair();
    client.on_writable();
    assert_eq!(server.transport().available(), 0);
    assert!(!client.has_events());
}

#[test]
fn test_failed_writable_flush_keeps_pending_frame() {
    let (mut client, server) = socket_pair();

    client.transport_mut().set_write_window(Some(3));
    client.send(b"hello").unwrap();
    assert_eq!(client.pending_output(), 4);

    // The transport dies underneath the half-written frame
    client.transport_mut().close().unwrap();
    client.handle_event(TransportEvent::Writable);

    assert_eq!(client.pending_output(), 4);
    assert!(!client.has_events());
    assert!(!client.is_closed());
    assert_eq!(
        client.last_error(),
        Some(ErrorCode::Io(io::ErrorKind::NotConnected))
    );
    assert_eq!(server.transport().available(), 3);
}

#[test]
fn test_oversized_config_is_clamped() {
    let config = FramingConfig {
        max_packet_size: usize::MAX,
        ..FramingConfig::default()
    };
    let (a, b) = MemoryTransport::pair();
    let mut client = PacketSocket::with_config(a, false, &config);
    let mut server = PacketSocket::with_config(b, false, &config);

    assert_eq!(client.capacity(), BUF_SIZE);
    assert_eq!(client.max_packet_size(), MAX_PACKET_SIZE);
    assert_eq!(client.config().max_packet_size, MAX_PACKET_SIZE);

    let max = vec![0x5A; MAX_PACKET_SIZE];
    assert_eq!(client.send(&max).unwrap(), MAX_PACKET_SIZE);
    assert!(matches!(
        client.send(&vec![0; MAX_PACKET_SIZE + 1]),
        Err(SocketError::MessageTooLarge(_))
    ));

    server.on_readable();
    assert_eq!(packets(&mut server), vec![max]);
}

#[test]
fn test_send_to_requires_connected_peer() {
    let (mut client, mut server) = socket_pair();
    let peer = client.remote_addr().expect("pair has a peer");

    assert_eq!(client.send_to(b"direct", peer).unwrap(), 6);
    server.on_readable();
    assert_eq!(packets(&mut server), vec![b"direct".to_vec()]);

    let stranger = addr(9);
    let err = client.send_to(b"elsewhere", stranger).unwrap_err();
    assert!(matches!(err, SocketError::NotConnected(a) if a == stranger));
    assert_eq!(client.last_error(), Some(ErrorCode::NotConnected));
    assert_eq!(client.pending_output(), 0);
}

#[test]
fn test_send_raw_appends_to_pending_output() {
    let (mut client, mut server) = socket_pair();
    client.transport_mut().set_write_window(Some(0));

    // Raw bytes stay queued even when the flush fails
    assert!(client.send_raw(b"<str").unwrap_err().is_would_block());
    assert!(client.send_raw(b"eam>").unwrap_err().is_would_block());
    assert_eq!(client.pending_output(), 8);

    // A framed send during that time is shed
    assert_eq!(client.send(b"x").unwrap(), 1);
    assert_eq!(client.pending_output(), 8);

    client.transport_mut().set_write_window(None);
    client.on_writable();
    assert_eq!(client.pending_output(), 0);

    let mut buf = [0u8; 16];
    let n = server.transport_mut().recv(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"<stream>");
}

#[test]
fn test_send_raw_rejects_beyond_capacity() {
    let (mut client, _server) = socket_pair();
    client.transport_mut().set_write_window(Some(0));

    let _ = client.send_raw(&[1, 2, 3]);
    let rest = vec![0u8; client.capacity() - 2];
    let err = client.send_raw(&rest).unwrap_err();
    assert!(matches!(err, SocketError::MessageTooLarge(_)));
    assert_eq!(client.pending_output(), 3);
    assert_eq!(client.last_error(), Some(ErrorCode::MessageTooLarge));
}

#[test]
fn test_send_raw_returns_bytes_written() {
    let (mut client, _server) = socket_pair();
    client.transport_mut().set_write_window(Some(4));
    assert_eq!(client.send_raw(b"abcdef").unwrap(), 4);
    assert_eq!(client.pending_output(), 2);
}

#[test]
fn test_overflow_resets_input_and_recovers() {
    let config = FramingConfig {
        max_packet_size: 14,
        ..FramingConfig::default()
    };
    let (mut raw, mut socket) = raw_and_socket(&config);
    assert_eq!(socket.capacity(), 16);

    // A prefix announcing 255 bytes can never complete in a 16 byte buffer
    let mut junk = vec![0x00, 0xFF];
    junk.extend_from_slice(&[0xEE; 14]);
    raw.send(&junk).unwrap();
    socket.on_readable();

    assert!(packets(&mut socket).is_empty());
    assert_eq!(socket.buffered_input(), 0);
    assert_eq!(socket.metrics().snapshot().buffer_overflows, 1);
    assert!(!socket.is_closed());

    // The next frame starts from a clean buffer
    raw.send(&encode_frame(b"clean").unwrap()).unwrap();
    socket.on_readable();
    assert_eq!(packets(&mut socket), vec![b"clean".to_vec()]);
}

#[test]
fn test_overflow_closes_when_configured() {
    let config = FramingConfig {
        max_packet_size: 6,
        overflow_policy: OverflowPolicy::Close,
        ..FramingConfig::default()
    };
    let (mut raw, mut socket) = raw_and_socket(&config);

    raw.send(&[0x01, 0x00, 1, 2, 3, 4, 5, 6]).unwrap();
    socket.on_readable();

    let events: Vec<_> = socket.drain_events().collect();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0],
        SocketEvent::Closed(Some(ErrorCode::BufferOverflow))
    ));
    assert!(socket.is_closed());
    assert!(socket.transport().is_closed());

    // A late close notification from the transport is not repeated
    socket.handle_event(TransportEvent::Closed(None));
    assert!(socket.poll_event().is_none());
}

#[test]
fn test_read_error_is_swallowed() {
    let (mut client, mut server) = socket_pair();
    client.send(b"later").unwrap();

    server.transport_mut().fail_next_recv(io::ErrorKind::ConnectionReset);
    server.on_readable();
    assert!(!server.has_events());
    assert_eq!(server.metrics().snapshot().read_errors, 1);

    server.on_readable();
    assert_eq!(packets(&mut server), vec![b"later".to_vec()]);
}

#[test]
fn test_spurious_readable_does_nothing() {
    let (_client, mut server) = socket_pair();
    server.on_readable();
    assert!(!server.has_events());
    assert_eq!(server.metrics().snapshot().read_errors, 0);
}

#[test]
fn test_lifecycle_notifications_forwarded() {
    let (mut client, _server) = socket_pair();

    client.handle_event(TransportEvent::Connected);
    client.handle_event(TransportEvent::Closed(Some(ErrorCode::Io(
        io::ErrorKind::ConnectionReset,
    ))));
    client.handle_event(TransportEvent::Closed(None));

    let events: Vec<_> = client.drain_events().collect();
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], SocketEvent::Connected));
    assert!(matches!(
        events[1],
        SocketEvent::Closed(Some(ErrorCode::Io(io::ErrorKind::ConnectionReset)))
    ));
}

#[test]
fn test_listener_fans_out_connections() {
    let (transport, connector) = MemoryTransport::listener(addr(5222));
    let metrics = Arc::new(Metrics::new());
    let mut listener = PacketSocket::new(transport, true).with_metrics(metrics.clone());
    assert!(listener.is_listener());
    assert!(listener.transport().is_listening());

    let clients: Vec<_> = (0..3).map(|i| connector.connect(addr(50_000 + i))).collect();
    assert_eq!(clients.len(), 3);

    for _ in 0..3 {
        listener.handle_event(TransportEvent::Readable);
    }
    // Nothing left to accept
    listener.handle_event(TransportEvent::Readable);

    let accepted: Vec<MemSocket> = listener
        .drain_events()
        .map(|event| match event {
            SocketEvent::NewConnection(conn) => conn,
            other => panic!("Expected new connection, got {other:?}"),
        })
        .collect();

    assert_eq!(accepted.len(), 3);
    for (i, conn) in accepted.iter().enumerate() {
        assert!(!conn.is_listener());
        assert_ne!(conn.id(), listener.id());
        assert_eq!(conn.remote_addr(), Some(addr(50_000 + i as u16)));
        assert!(Arc::ptr_eq(conn.metrics(), &metrics));
    }
    assert_ne!(accepted[0].id(), accepted[1].id());
    assert_ne!(accepted[1].id(), accepted[2].id());
    assert_eq!(metrics.snapshot().connections_accepted, 3);
}

#[test]
fn test_accepted_connection_primes_read() {
    let (transport, connector) = MemoryTransport::listener(addr(5222));
    let mut listener = PacketSocket::new(transport, true);

    // The client speaks before the server side ever sees the connection
    let mut client = PacketSocket::new(connector.connect(addr(50_100)), false);
    client.send(b"early bird").unwrap();

    listener.on_readable();
    let mut conn = match listener.poll_event() {
        Some(SocketEvent::NewConnection(conn)) => conn,
        other => panic!("Expected new connection, got {other:?}"),
    };
    assert_eq!(packets(&mut conn), vec![b"early bird".to_vec()]);

    // The accepted socket talks back over the same stream
    conn.send(b"welcome").unwrap();
    client.on_readable();
    assert_eq!(packets(&mut client), vec![b"welcome".to_vec()]);
}

#[test]
fn test_listen_failure_is_not_fatal() {
    let (mut transport, _connector) = MemoryTransport::listener(addr(5222));
    transport.fail_listen(io::ErrorKind::AddrInUse);

    let mut listener = PacketSocket::new(transport, true);
    assert!(listener.is_listener());
    assert!(!listener.transport().is_listening());
    assert_eq!(listener.last_error(), Some(ErrorCode::Io(io::ErrorKind::AddrInUse)));
    assert_eq!(listener.capacity(), BUF_SIZE);

    // Readable on a socket that never listened only logs
    listener.on_readable();
    assert!(!listener.has_events());
}

#[test]
fn test_accept_failure_is_logged_and_ignored() {
    let (transport, connector) = MemoryTransport::listener(addr(5222));
    let metrics = Arc::new(Metrics::new());
    let mut listener = PacketSocket::new(transport, true).with_metrics(metrics.clone());
    let _client = connector.connect(addr(50_200));

    listener.transport_mut().fail_next_accept(io::ErrorKind::ConnectionAborted);
    listener.on_readable();
    assert!(!listener.has_events());
    assert_eq!(metrics.snapshot().accept_errors, 1);

    // The queued connection is still there for the next notification
    listener.on_readable();
    assert!(matches!(
        listener.poll_event(),
        Some(SocketEvent::NewConnection(_))
    ));
}

/// Claims to have written one byte more than it was given
#[derive(Debug, Default)]
struct OverreportingTransport {
    last_error: Option<ErrorCode>,
}

impl Transport for OverreportingTransport {
    fn listen(&mut self, _backlog: u32) -> io::Result<()> {
        Ok(())
    }
    fn accept(&mut self) -> io::Result<(Self, SocketAddr)> {
        Err(io::ErrorKind::WouldBlock.into())
    }
    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len() + 1)
    }
    fn recv(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::ErrorKind::WouldBlock.into())
    }
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
    fn remote_addr(&self) -> Option<SocketAddr> {
        None
    }
    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }
    fn last_error(&self) -> Option<ErrorCode> {
        self.last_error
    }
    fn set_error(&mut self, code: ErrorCode) {
        self.last_error = Some(code);
    }
}

#[test]
fn test_write_overrun_fails_the_send() {
    let mut socket = PacketSocket::new(OverreportingTransport::default(), false);

    let err = socket.send(b"abc").unwrap_err();
    assert!(matches!(
        err,
        SocketError::WriteOverrun {
            written: 6,
            queued: 5
        }
    ));
    assert_eq!(socket.pending_output(), 0);
    assert_eq!(
        socket.last_error(),
        Some(ErrorCode::Io(io::ErrorKind::InvalidData))
    );
}

#[test]
fn test_metrics_track_traffic() {
    let (mut client, mut server) = socket_pair();
    client.send(b"1234").unwrap();
    client.send(b"56").unwrap();
    server.on_readable();
    assert_eq!(packets(&mut server).len(), 2);

    let sent = client.metrics().snapshot();
    assert_eq!(sent.packets_sent, 2);
    assert_eq!(sent.bytes_sent, 6);

    let received = server.metrics().snapshot();
    assert_eq!(received.packets_received, 2);
    assert_eq!(received.bytes_received, 6);
}
