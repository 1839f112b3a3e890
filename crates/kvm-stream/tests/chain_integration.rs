//! Integration tests for full filter chains.
//!
//! These tests assemble the chains a real connection uses and verify the
//! bytes on the wire and the events a consumer sees, first over in-memory
//! pipes and then over a loopback TCP connection.

use std::net::TcpListener;
use std::sync::Arc;
use std::time::{Duration, Instant};

use kvm_stream::cipher::RECORD_OVERHEAD;
use kvm_stream::{
    framed_chain, secure_chain, ChannelEventQueue, Cipher, EventDispatcher, EventKind,
    EventReceiver, MemoryHandle, MemoryPipe, PipeMonitor, Readiness, Role, SecureChain,
    SharedEventQueue, Stream, StreamConfig, StreamState, TcpHandle,
};

const KEY: [u8; 32] = [0x5A; 32];

struct SecurePair {
    left: SecureChain<MemoryHandle>,
    right: SecureChain<MemoryHandle>,
    left_wire: PipeMonitor,
    right_wire: PipeMonitor,
    rx: EventReceiver,
}

fn secure_pair() -> SecurePair {
    let (queue, rx) = ChannelEventQueue::new();
    let events: SharedEventQueue = Arc::new(queue);
    let config = StreamConfig::default();
    let (a, b) = MemoryPipe::pair();
    let left_wire = a.monitor();
    let right_wire = b.monitor();
    SecurePair {
        left: secure_chain(a, Arc::clone(&events), &config, Cipher::from_key(KEY, Role::Initiator)),
        right: secure_chain(b, events, &config, Cipher::from_key(KEY, Role::Responder)),
        left_wire,
        right_wire,
        rx,
    }
}

fn deliver<S: Stream>(stream: &mut S, wire: &PipeMonitor) {
    while wire.pending_inbound() > 0 && stream.state().can_read() {
        stream.handle_readiness(Readiness::Readable);
    }
}

fn read_message<S: Stream>(stream: &mut S) -> Vec<u8> {
    let mut buf = vec![0u8; stream.size()];
    let n = stream.read(&mut buf);
    buf.truncate(n);
    buf
}

#[test]
fn test_ping_wire_bytes_are_length_prefixed_ciphertext() {
    // Arrange
    let mut pair = secure_pair();

    // Act
    pair.left.write(b"PING");
    pair.left.flush();

    // Assert
    let wire = pair.left_wire.transcript();
    let record_len = b"PING".len() + RECORD_OVERHEAD;
    assert_eq!(wire.len(), 4 + record_len);
    assert_eq!(wire[..4], (record_len as u32).to_be_bytes());
    assert!(!wire.windows(4).any(|w| w == b"PING"));
}

#[test]
fn test_peer_chain_decodes_ping() {
    // Arrange
    let mut pair = secure_pair();
    pair.left.write(b"PING");
    pair.left.flush();

    // Act
    deliver(&mut pair.right, &pair.right_wire);

    // Assert
    assert!(pair.right.is_ready());
    assert_eq!(read_message(&mut pair.right), b"PING".to_vec());
    let mut buf = [0u8; 4];
    assert_eq!(pair.right.read(&mut buf), 0);
}

#[test]
fn test_input_ready_reaches_handler_registered_on_outer_target() {
    // Arrange
    let mut pair = secure_pair();
    let mut dispatcher = EventDispatcher::new();
    let seen = std::rc::Rc::new(std::cell::Cell::new(0));
    let counter = std::rc::Rc::clone(&seen);
    dispatcher.add_handler(EventKind::InputReady, pair.right.event_target(), move |_| {
        counter.set(counter.get() + 1);
    });
    pair.left.write(b"hello");
    pair.left.flush();

    // Act
    deliver(&mut pair.right, &pair.right_wire);
    dispatcher.dispatch_pending(&mut pair.rx);

    // Assert
    assert!(seen.get() >= 1);
}

#[test]
fn test_messages_flow_in_both_directions() {
    let mut pair = secure_pair();

    pair.left.write(b"key down");
    pair.left.flush();
    pair.right.write(b"ack");
    pair.right.flush();
    deliver(&mut pair.right, &pair.right_wire);
    deliver(&mut pair.left, &pair.left_wire);

    assert_eq!(read_message(&mut pair.right), b"key down".to_vec());
    assert_eq!(read_message(&mut pair.left), b"ack".to_vec());
}

#[test]
fn test_transport_failure_forces_whole_chain_closed() {
    // Arrange
    let mut pair = secure_pair();
    pair.left_wire.fail_next_write(std::io::ErrorKind::BrokenPipe);
    pair.left.write(b"doomed");

    // Act
    pair.left.flush();

    // Assert
    assert_eq!(pair.left.state(), StreamState::Closed);
    let kinds: Vec<EventKind> = pair.rx.drain().into_iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![EventKind::OutputError, EventKind::Disconnected]);
    let mut buf = [0u8; 8];
    assert_eq!(pair.left.read(&mut buf), 0);
    pair.left.write(b"again");
    let errors = pair.rx.drain();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, EventKind::OutputError);
}

#[test]
fn test_peer_close_reports_input_shutdown_after_buffered_data() {
    // Arrange
    let mut pair = secure_pair();
    pair.left.write(b"last words");
    pair.left.flush();
    pair.left.close();
    drop(pair.left);

    // Act – one notification delivers the data, the next observes EOF.
    pair.right.handle_readiness(Readiness::Readable);
    pair.right.handle_readiness(Readiness::Readable);

    // Assert
    assert_eq!(read_message(&mut pair.right), b"last words".to_vec());
    let kinds: Vec<EventKind> = pair.rx.drain().into_iter().map(|e| e.kind).collect();
    assert!(kinds.contains(&EventKind::InputShutdown));
}

// ── Loopback TCP ──────────────────────────────────────────────────────────────

fn loopback_pair() -> (TcpHandle, TcpHandle) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    let client = TcpHandle::connect(addr).expect("connect");
    let (server, _) = listener.accept().expect("accept");
    (client, TcpHandle::new(server).expect("wrap"))
}

/// Polls `stream` with readability notifications until a message is ready.
fn wait_for_message<S: Stream>(stream: &mut S) -> Vec<u8> {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !stream.is_ready() {
        assert!(Instant::now() < deadline, "timed out waiting for a message");
        stream.handle_readiness(Readiness::Readable);
        std::thread::sleep(Duration::from_millis(2));
    }
    read_message(stream)
}

#[test]
fn test_secure_chain_round_trip_over_loopback_tcp() {
    // Arrange
    let (queue, _rx) = ChannelEventQueue::new();
    let events: SharedEventQueue = Arc::new(queue);
    let config = StreamConfig::default();
    let (client, server) = loopback_pair();
    let mut client = secure_chain(
        client,
        Arc::clone(&events),
        &config,
        Cipher::from_key(KEY, Role::Initiator),
    );
    let mut server = secure_chain(server, events, &config, Cipher::from_key(KEY, Role::Responder));

    // Act
    client.write(b"PING");
    client.flush();
    let request = wait_for_message(&mut server);
    server.write(b"PONG");
    server.flush();
    let reply = wait_for_message(&mut client);

    // Assert
    assert_eq!(request, b"PING".to_vec());
    assert_eq!(reply, b"PONG".to_vec());
    assert!(client.source().starts_with("127.0.0.1:"));
}

#[test]
fn test_large_framed_message_over_loopback_tcp() {
    let (queue, _rx) = ChannelEventQueue::new();
    let events: SharedEventQueue = Arc::new(queue);
    let config = StreamConfig::default();
    let (client, server) = loopback_pair();
    let mut client = framed_chain(client, Arc::clone(&events), &config);
    let mut server = framed_chain(server, events, &config);
    let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 241) as u8).collect();

    // Past the high-water mark the write blocks until the server reads.
    let sent = payload.clone();
    let writer = std::thread::spawn(move || {
        client.write(&sent);
        client.flush();
        client
    });
    let received = wait_for_message(&mut server);
    let client = writer.join().expect("writer thread");

    assert_eq!(received, payload);
    assert!(client.state().can_write());
}
