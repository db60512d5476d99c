//! End-to-end channel behavior over the real platform transport.

#![cfg(unix)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use localsock_channel::{connect, connect_with_config, ChannelError, LocalServer};
use localsock_frame::{FrameError, MessageConfig};
use localsock_transport::{EndpointId, LocalListener, TimeoutSpec, TransportError};

const SHORT: Duration = Duration::from_millis(300);
const LONG: Duration = Duration::from_secs(5);

fn transport_err(err: ChannelError) -> TransportError {
    match err {
        ChannelError::Transport(e) => e,
        other => panic!("expected transport error, got {other:?}"),
    }
}

#[test]
fn request_and_reply_round_trip() {
    let server = LocalServer::bind().unwrap();
    let id = server.id().clone();

    let client = thread::spawn(move || {
        let channel = connect(&id, LONG).unwrap();
        channel.send(&[0x01, 0x02, 0x03], LONG).unwrap();
        let reply = channel.receive(LONG).unwrap();
        assert_eq!(&reply[..], b"ack");
    });

    let channel = server.accept(LONG).unwrap();
    let request = channel.receive(LONG).unwrap();
    assert_eq!(&request[..], &[0x01, 0x02, 0x03]);
    channel.send(b"ack", LONG).unwrap();

    client.join().unwrap();
}

#[test]
fn zero_length_messages_are_delivered() {
    let server = LocalServer::bind().unwrap();
    let id = server.id().clone();

    let client = thread::spawn(move || {
        let channel = connect(&id, LONG).unwrap();
        channel.send(b"", LONG).unwrap();
        let reply = channel.receive(LONG).unwrap();
        assert!(reply.is_empty());
    });

    let channel = server.accept(LONG).unwrap();
    let request = channel.receive(LONG).unwrap();
    assert!(request.is_empty());
    channel.send(b"", LONG).unwrap();

    client.join().unwrap();
}

#[test]
fn large_payload_survives_chunked_transfer() {
    let server = LocalServer::bind().unwrap();
    let id = server.id().clone();
    let payload: Vec<u8> = (0..3 * 1024 * 1024).map(|i| (i % 251) as u8).collect();
    let expected = payload.clone();

    let client = thread::spawn(move || {
        let channel = connect(&id, LONG).unwrap();
        channel.send(&payload, LONG).unwrap();
    });

    let channel = server.accept(LONG).unwrap();
    let received = channel.receive(LONG).unwrap();
    assert_eq!(&received[..], &expected[..]);

    client.join().unwrap();
}

#[test]
fn messages_arrive_in_send_order() {
    let server = LocalServer::bind().unwrap();
    let id = server.id().clone();

    let client = thread::spawn(move || {
        let channel = connect(&id, LONG).unwrap();
        for i in 0..100u32 {
            // Varying sizes so frames straddle read chunk boundaries.
            let payload = vec![(i % 256) as u8; (i as usize * 37) % 4096];
            channel.send(&payload, LONG).unwrap();
        }
    });

    let channel = server.accept(LONG).unwrap();
    for i in 0..100u32 {
        let message = channel.receive(LONG).unwrap();
        assert_eq!(message.len(), (i as usize * 37) % 4096);
        assert!(message.iter().all(|&b| b == (i % 256) as u8));
    }

    client.join().unwrap();
}

#[test]
fn binding_a_taken_identifier_fails() {
    let id = EndpointId::generate();
    let _server = LocalServer::bind_with_config(&id, MessageConfig::default()).unwrap();
    let err = LocalServer::bind_with_config(&id, MessageConfig::default()).unwrap_err();
    assert!(matches!(
        transport_err(err),
        TransportError::EndpointUnavailable { .. }
    ));
}

#[test]
fn closed_identifier_can_be_rebound() {
    let id = EndpointId::generate();
    let server = LocalServer::bind_with_config(&id, MessageConfig::default()).unwrap();
    server.close();
    let rebound = LocalServer::bind_with_config(&id, MessageConfig::default()).unwrap();
    drop(rebound);
}

#[test]
fn connecting_to_absent_endpoint_fails_fast() {
    let id = EndpointId::generate();
    let started = Instant::now();
    let err = connect(&id, LONG).unwrap_err();
    assert!(matches!(
        transport_err(err),
        TransportError::EndpointNotFound { .. }
    ));
    // Absence must not consume the connect timeout.
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[test]
fn accept_timeout_is_bounded_and_repeatable() {
    let server = LocalServer::bind().unwrap();

    let started = Instant::now();
    let err = server.accept(SHORT).unwrap_err();
    let elapsed = started.elapsed();
    assert!(matches!(
        transport_err(err),
        TransportError::AcceptTimeout(t) if t == SHORT
    ));
    assert!(elapsed >= SHORT);
    assert!(elapsed < SHORT * 4, "accept overshot: {elapsed:?}");

    // Still listening after the timeout.
    let id = server.id().clone();
    let client = thread::spawn(move || connect(&id, LONG).unwrap());
    let channel = server.accept(LONG).unwrap();
    drop(channel);
    client.join().unwrap();
}

#[test]
fn receive_timeout_preserves_partial_message() {
    let id = EndpointId::generate();
    let listener = LocalListener::bind(&id).unwrap();

    let feeder = thread::spawn(move || {
        let stream = listener.accept(TimeoutSpec::from(LONG)).unwrap();
        let deadline = localsock_transport::Deadline::start(TimeoutSpec::from(LONG));
        // Prefix plus half the payload, then stall past the client timeout.
        stream
            .send_all(&[0, 0, 0, 6, b'a', b'b', b'c'], &deadline)
            .unwrap();
        thread::sleep(SHORT * 2);
        stream.send_all(b"def", &deadline).unwrap();
        // Keep the connection alive until the client is done reading.
        thread::sleep(SHORT * 2);
    });

    let channel = connect(&id, LONG).unwrap();
    let err = channel.receive(SHORT).unwrap_err();
    assert!(matches!(
        transport_err(err),
        TransportError::ReceiveTimeout(t) if t == SHORT
    ));

    // The next call resumes the same message rather than starting over.
    let message = channel.receive(LONG).unwrap();
    assert_eq!(&message[..], b"abcdef");

    feeder.join().unwrap();
}

#[test]
fn peer_close_is_reported() {
    let server = LocalServer::bind().unwrap();
    let id = server.id().clone();

    let client = thread::spawn(move || {
        let channel = connect(&id, LONG).unwrap();
        channel.send(b"last words", LONG).unwrap();
        channel.close();
    });

    let channel = server.accept(LONG).unwrap();
    let message = channel.receive(LONG).unwrap();
    assert_eq!(&message[..], b"last words");
    let err = channel.receive(LONG).unwrap_err();
    assert!(matches!(
        transport_err(err),
        TransportError::ConnectionClosed
    ));

    client.join().unwrap();
}

#[test]
fn operations_after_local_close_fail() {
    let server = LocalServer::bind().unwrap();
    let id = server.id().clone();
    let client = thread::spawn(move || {
        let channel = connect(&id, LONG).unwrap();
        // Hold the connection open until the server side is done.
        let _ = channel.receive(LONG);
    });

    let channel = server.accept(LONG).unwrap();
    channel.close();
    channel.close(); // idempotent

    let err = channel.send(b"too late", LONG).unwrap_err();
    assert!(matches!(transport_err(err), TransportError::Closed));
    let err = channel.receive(LONG).unwrap_err();
    assert!(matches!(transport_err(err), TransportError::Closed));

    client.join().unwrap();
}

#[test]
fn close_unblocks_a_pending_receive() {
    let server = LocalServer::bind().unwrap();
    let id = server.id().clone();

    let peer = thread::spawn(move || {
        let channel = connect(&id, LONG).unwrap();
        // Stay connected, sending nothing, until the other side gives up.
        let _ = channel.receive(LONG);
    });

    let channel = Arc::new(server.accept(LONG).unwrap());
    let receiver = {
        let channel = Arc::clone(&channel);
        thread::spawn(move || channel.receive(TimeoutSpec::Infinite))
    };

    thread::sleep(Duration::from_millis(150));
    channel.close();

    // The local close is reported as such, not as a peer disconnect.
    let err = receiver.join().unwrap().unwrap_err();
    assert!(matches!(transport_err(err), TransportError::Closed));

    peer.join().unwrap();
}

#[test]
fn close_unblocks_a_pending_accept() {
    let server = Arc::new(LocalServer::bind().unwrap());
    let waiter = {
        let server = Arc::clone(&server);
        thread::spawn(move || server.accept(TimeoutSpec::Infinite))
    };

    thread::sleep(Duration::from_millis(150));
    server.close();

    let err = waiter.join().unwrap().unwrap_err();
    assert!(matches!(transport_err(err), TransportError::Closed));
}

#[test]
fn concurrent_clients_each_get_their_own_channel() {
    let server = LocalServer::bind().unwrap();
    let id = server.id().clone();
    let n = 8;

    let clients: Vec<_> = (0..n)
        .map(|i: u32| {
            let id = id.clone();
            thread::spawn(move || {
                let channel = connect(&id, LONG).unwrap();
                channel.send(&i.to_be_bytes(), LONG).unwrap();
                let reply = channel.receive(LONG).unwrap();
                assert_eq!(&reply[..], &i.to_be_bytes());
            })
        })
        .collect();

    for _ in 0..n {
        let channel = server.accept(LONG).unwrap();
        let message = channel.receive(LONG).unwrap();
        channel.send(&message, LONG).unwrap();
    }

    for client in clients {
        client.join().unwrap();
    }
}

#[test]
fn oversized_outgoing_payload_is_rejected_locally() {
    let server = LocalServer::bind().unwrap();
    let id = server.id().clone();

    let client = thread::spawn(move || {
        let channel = connect_with_config(&id, LONG, MessageConfig { max_payload: 8 }).unwrap();
        let err = channel.send(&[0u8; 9], LONG).unwrap_err();
        assert!(matches!(
            err,
            ChannelError::Frame(FrameError::PayloadTooLarge { size: 9, max: 8 })
        ));
        // Nothing hit the wire; the channel is still usable.
        channel.send(&[0u8; 8], LONG).unwrap();
    });

    let channel = server.accept(LONG).unwrap();
    let message = channel.receive(LONG).unwrap();
    assert_eq!(message.len(), 8);

    client.join().unwrap();
}

#[test]
fn oversized_incoming_frame_fails_the_channel() {
    let id = EndpointId::generate();
    let listener = LocalListener::bind(&id).unwrap();

    let feeder = thread::spawn(move || {
        let stream = listener.accept(TimeoutSpec::from(LONG)).unwrap();
        let deadline = localsock_transport::Deadline::start(TimeoutSpec::from(LONG));
        // Declared length of 9 against a receive ceiling of 8.
        stream.send_all(&[0, 0, 0, 9], &deadline).unwrap();
        thread::sleep(SHORT);
    });

    let channel = connect_with_config(&id, LONG, MessageConfig { max_payload: 8 }).unwrap();
    let err = channel.receive(LONG).unwrap_err();
    assert!(matches!(
        err,
        ChannelError::Frame(FrameError::PayloadTooLarge { size: 9, max: 8 })
    ));
    assert_eq!(
        channel.state(),
        localsock_channel::ConnectionState::Failed
    );

    feeder.join().unwrap();
}
