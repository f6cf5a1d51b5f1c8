//! Application data, replay protection, tampered records and close.

mod common;

use std::time::Instant;

use common::*;

#[test]
fn application_echo() {
    let _ = env_logger::try_init();
    let now = Instant::now();
    let (mut client, mut server) = establish(now);

    let n = client.write(now, &server_session(), b"ping").expect("write");
    assert_eq!(n, 4);

    let ping = take_outbox(&mut client);
    assert_eq!(ping.len(), 1);

    // Epoch 1, sequence 1: the Finished used sequence 0.
    let hdr = parse_records(&ping[0])[0];
    assert_eq!(hdr.ctype, APPLICATION_DATA);
    assert_eq!(hdr.epoch, 1);
    assert_eq!(hdr.seq, 1);

    for d in &ping {
        server.handle_message(now, &client_session(), d).unwrap();
    }
    assert_eq!(server.handler().received, vec![b"ping".to_vec()]);

    // Echo back.
    server.write(now, &client_session(), b"ping").expect("write");
    let echo = take_outbox(&mut server);
    let hdr = parse_records(&echo[0])[0];
    assert_eq!(hdr.epoch, 1);
    assert_eq!(hdr.seq, 1);

    for d in &echo {
        client.handle_message(now, &server_session(), d).unwrap();
    }
    assert_eq!(client.handler().received, vec![b"ping".to_vec()]);
}

#[test]
fn replayed_record_is_dropped_silently() {
    let _ = env_logger::try_init();
    let now = Instant::now();
    let (mut client, mut server) = establish(now);

    client.write(now, &server_session(), b"ping").unwrap();
    let ping = take_outbox(&mut client);

    for d in &ping {
        server.handle_message(now, &client_session(), d).unwrap();
    }
    // Redeliver the identical ciphertext.
    for d in &ping {
        server.handle_message(now, &client_session(), d).unwrap();
    }

    assert_eq!(
        server.handler().received,
        vec![b"ping".to_vec()],
        "read fires exactly once"
    );
    assert!(server.handler().events.is_empty());
    assert!(server.is_connected(&client_session()));
}

#[test]
fn tampered_tag_closes_the_peer() {
    let _ = env_logger::try_init();
    let now = Instant::now();
    let (mut client, mut server) = establish(now);

    client.write(now, &server_session(), b"ping").unwrap();
    let mut datagrams = take_outbox(&mut client);
    let last = datagrams[0].len() - 1;
    datagrams[0][last] ^= 0x01;

    for d in &datagrams {
        server.handle_message(now, &client_session(), d).unwrap();
    }

    // Nothing was delivered; the peer answered with a fatal
    // bad_record_mac alert and is gone.
    assert!(server.handler().received.is_empty());
    assert!(server.handler().events.contains(&(2, 20)));
    assert_eq!(server.peer_count(), 0);

    let alert = take_outbox(&mut server);
    assert_eq!(parse_records(&alert[0])[0].ctype, ALERT);
}

#[test]
fn write_before_connected_is_refused() {
    let _ = env_logger::try_init();
    let now = Instant::now();

    let mut client = new_client();
    client.connect(now, server_session()).unwrap();

    let err = client.write(now, &server_session(), b"early").unwrap_err();
    assert!(matches!(err, dpsk::Error::ProtocolViolation(_)));

    let err = client.write(now, &client_session(), b"nobody").unwrap_err();
    assert_eq!(err, dpsk::Error::UnknownPeer);
}

#[test]
fn close_notify_exchange() {
    let _ = env_logger::try_init();
    let now = Instant::now();
    let (mut client, mut server) = establish(now);

    client.close(now, &server_session()).expect("close");

    let cn = take_outbox(&mut client);
    assert_eq!(parse_records(&cn[0])[0].ctype, ALERT);

    for d in &cn {
        server.handle_message(now, &client_session(), d).unwrap();
    }

    // Server answered with its own close_notify and destroyed the peer.
    assert!(server.handler().events.contains(&(1, 0)));
    assert_eq!(server.peer_count(), 0);

    deliver(&mut server, &mut client, &server_session(), now);
    assert!(client.handler().events.contains(&(1, 0)));
    assert_eq!(client.peer_count(), 0);
}

#[test]
fn unknown_identity_is_fatal() {
    let _ = env_logger::try_init();
    let now = Instant::now();

    let mut client = new_client();
    // Server knows a different identity.
    let mut server = dpsk::Context::new(
        test_config(2),
        TestHandler::with_key(b"Someone_else", b"otherPSK"),
    );

    client.connect(now, server_session()).unwrap();
    deliver(&mut client, &mut server, &client_session(), now);
    deliver(&mut server, &mut client, &server_session(), now);
    deliver(&mut client, &mut server, &client_session(), now);
    deliver(&mut server, &mut client, &server_session(), now);
    deliver(&mut client, &mut server, &client_session(), now);

    // unknown_psk_identity (115), fatal, peer destroyed.
    assert!(server.handler().events.contains(&(2, 115)));
    assert_eq!(server.peer_count(), 0);
}

#[test]
fn records_from_unknown_peers_are_ignored() {
    let _ = env_logger::try_init();
    let now = Instant::now();

    let mut server = new_server();

    // Application data from nowhere: no reply, no state.
    let stray = [
        23, 0xFE, 0xFD, 0, 1, 0, 0, 0, 0, 0, 7, 0, 4, 1, 2, 3, 4,
    ];
    server
        .handle_message(now, &client_session(), &stray)
        .unwrap();

    assert_eq!(server.peer_count(), 0);
    assert!(server.handler().outbox.is_empty());
    assert!(server.handler().events.is_empty());
}
