//! Cookie exchange and full PSK handshake.

mod common;

use std::time::Instant;

use common::*;
use dpsk::Connect;

#[test]
fn empty_cookie_elicits_hello_verify() {
    let _ = env_logger::try_init();
    let now = Instant::now();

    let mut client = new_client();
    let mut server = new_server();

    assert_eq!(
        client.connect(now, server_session()).expect("connect"),
        Connect::Started
    );
    assert_eq!(
        client.connect(now, server_session()).expect("reconnect"),
        Connect::Exists
    );

    let f1 = take_outbox(&mut client);
    assert_eq!(f1.len(), 1, "one datagram with the ClientHello");
    assert_eq!(parse_handshake_types(&f1[0]), vec![CLIENT_HELLO]);

    for d in &f1 {
        server.handle_message(now, &client_session(), d).unwrap();
    }

    // Stateless: no peer was allocated for the cookie exchange.
    assert_eq!(server.peer_count(), 0);

    let f2 = take_outbox(&mut server);
    assert_eq!(f2.len(), 1);
    assert_eq!(parse_handshake_types(&f2[0]), vec![HELLO_VERIFY_REQUEST]);

    // HelloVerifyRequest body: version(2) cookie_length(1) cookie. The
    // record+handshake headers take 25 bytes.
    let cookie_len = f2[0][13 + 12 + 2] as usize;
    assert_eq!(cookie_len, 16, "cookie is exactly 16 bytes");

    // The stateless reply reuses the ClientHello's record sequence.
    assert_eq!(parse_records(&f2[0])[0].seq, parse_records(&f1[0])[0].seq);
}

#[test]
fn cookied_hello_proceeds_to_server_hello() {
    let _ = env_logger::try_init();
    let now = Instant::now();

    let mut client = new_client();
    let mut server = new_server();

    client.connect(now, server_session()).unwrap();
    deliver(&mut client, &mut server, &client_session(), now);
    deliver(&mut server, &mut client, &server_session(), now);

    // The second ClientHello echoes the cookie.
    let f3 = take_outbox(&mut client);
    assert_eq!(parse_handshake_types(&f3[0]), vec![CLIENT_HELLO]);

    for d in &f3 {
        server.handle_message(now, &client_session(), d).unwrap();
    }

    // A peer exists now and flight 4 is not another HelloVerifyRequest.
    assert_eq!(server.peer_count(), 1);

    let f4 = take_outbox(&mut server);
    let types: Vec<u8> = f4.iter().flat_map(|d| parse_handshake_types(d)).collect();
    assert!(!types.contains(&HELLO_VERIFY_REQUEST), "got {:?}", types);
    assert_eq!(types, vec![SERVER_HELLO, SERVER_HELLO_DONE]);
}

#[test]
fn full_handshake_connects_both_sides() {
    let _ = env_logger::try_init();
    let now = Instant::now();

    let mut client = new_client();
    let mut server = new_server();

    client.connect(now, server_session()).unwrap();
    deliver(&mut client, &mut server, &client_session(), now);
    deliver(&mut server, &mut client, &server_session(), now);
    deliver(&mut client, &mut server, &client_session(), now);
    deliver(&mut server, &mut client, &server_session(), now);

    // Flight 5: ClientKeyExchange and CCS in epoch 0, Finished in epoch 1.
    let f5 = take_outbox(&mut client);
    let headers = collect_headers(&f5);
    let types: Vec<u8> = headers.iter().map(|h| h.ctype).collect();
    assert_eq!(types, vec![HANDSHAKE, CHANGE_CIPHER_SPEC, HANDSHAKE]);
    let epochs: Vec<u16> = headers.iter().map(|h| h.epoch).collect();
    assert_eq!(epochs, vec![0, 0, 1]);

    for d in &f5 {
        server.handle_message(now, &client_session(), d).unwrap();
    }

    // Server is connected and has emitted its final flight.
    assert!(server.is_connected(&client_session()));
    assert!(server.handler().events.contains(&(0, 256)));
    assert_eq!(
        server.peer_identity(&client_session()).as_deref(),
        Some(PSK_IDENTITY)
    );

    let f6 = take_outbox(&mut server);
    let headers = collect_headers(&f6);
    let types: Vec<u8> = headers.iter().map(|h| h.ctype).collect();
    assert_eq!(types, vec![CHANGE_CIPHER_SPEC, HANDSHAKE]);

    for d in &f6 {
        client.handle_message(now, &server_session(), d).unwrap();
    }

    assert!(client.is_connected(&server_session()));
    assert!(client.handler().events.contains(&(0, 256)));
}

#[test]
fn reordered_finished_waits_for_ccs() {
    let _ = env_logger::try_init();
    let now = Instant::now();

    let mut client = new_client();
    let mut server = new_server();

    client.connect(now, server_session()).unwrap();
    deliver(&mut client, &mut server, &client_session(), now);
    deliver(&mut server, &mut client, &server_session(), now);
    deliver(&mut client, &mut server, &client_session(), now);
    deliver(&mut server, &mut client, &server_session(), now);
    deliver(&mut client, &mut server, &client_session(), now);

    // Server's final flight, delivered with Finished before the CCS.
    let f6 = take_outbox(&mut server);
    assert_eq!(f6.len(), 1);
    let records = split_records(&f6[0]);
    assert_eq!(records.len(), 2);

    client
        .handle_message(now, &server_session(), &records[1])
        .unwrap();
    assert!(!client.is_connected(&server_session()));

    client
        .handle_message(now, &server_session(), &records[0])
        .unwrap();
    assert!(client.is_connected(&server_session()));
}

#[test]
fn seeded_handshakes_are_reproducible() {
    let now = Instant::now();

    let trace = |now: Instant| -> Vec<Vec<u8>> {
        let mut client = new_client();
        let mut server = new_server();
        let mut all = Vec::new();

        client.connect(now, server_session()).unwrap();
        for _ in 0..3 {
            let from_client = take_outbox(&mut client);
            for d in &from_client {
                server.handle_message(now, &client_session(), d).unwrap();
            }
            let from_server = take_outbox(&mut server);
            for d in &from_server {
                client.handle_message(now, &server_session(), d).unwrap();
            }
            all.extend(from_client);
            all.extend(from_server);
        }

        assert!(client.is_connected(&server_session()));
        all
    };

    assert_eq!(trace(now), trace(now));
}
