//! Shared helpers for the integration tests.
//!
//! This file has no `#[test]` functions; Cargo compiles it as a no-op
//! binary. Import it from other test files via `mod common;`.

#![allow(unused)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use dpsk::{Config, Connect, Context, DtlsHandler, Event, Psk, Session};

pub const PSK_IDENTITY: &[u8] = b"Client_identity";
pub const PSK_KEY: &[u8] = b"secretPSK";

pub const CLIENT_ADDR: &str = "127.0.0.1:40001";
pub const SERVER_ADDR: &str = "127.0.0.1:5684";

pub fn client_session() -> Session {
    Session::new(CLIENT_ADDR.parse().unwrap())
}

pub fn server_session() -> Session {
    Session::new(SERVER_ADDR.parse().unwrap())
}

/// Handler that stages everything for inspection.
#[derive(Default)]
pub struct TestHandler {
    pub outbox: Vec<Vec<u8>>,
    pub received: Vec<Vec<u8>>,
    pub events: Vec<(u8, u16)>,
    pub keys: Vec<(Vec<u8>, Vec<u8>)>,
}

impl TestHandler {
    pub fn with_key(identity: &[u8], key: &[u8]) -> Self {
        TestHandler {
            keys: vec![(identity.to_vec(), key.to_vec())],
            ..Default::default()
        }
    }
}

impl DtlsHandler for TestHandler {
    fn write(&mut self, _session: &Session, datagram: &[u8]) -> isize {
        self.outbox.push(datagram.to_vec());
        datagram.len() as isize
    }

    fn read(&mut self, _session: &Session, data: &[u8]) {
        self.received.push(data.to_vec());
    }

    fn event(&mut self, _session: &Session, event: Event) {
        self.events.push((event.level(), event.code()));
    }

    fn psk(&mut self, _session: &Session, id: Option<&[u8]>) -> Option<Psk> {
        match id {
            None => self
                .keys
                .first()
                .map(|(i, k)| Psk::new(i.clone(), k.clone())),
            Some(id) => self
                .keys
                .iter()
                .find(|(i, _)| i == id)
                .map(|(i, k)| Psk::new(i.clone(), k.clone())),
        }
    }
}

pub fn test_config(seed: u64) -> Arc<Config> {
    Arc::new(Config::builder().rng_seed(seed).build())
}

pub fn new_client() -> Context<TestHandler> {
    Context::new(test_config(1), TestHandler::with_key(PSK_IDENTITY, PSK_KEY))
}

pub fn new_server() -> Context<TestHandler> {
    Context::new(test_config(2), TestHandler::with_key(PSK_IDENTITY, PSK_KEY))
}

/// Drain every datagram the context has written so far.
pub fn take_outbox(ctx: &mut Context<TestHandler>) -> Vec<Vec<u8>> {
    ctx.handler_mut().outbox.drain(..).collect()
}

/// Deliver everything in `from`'s outbox to `to`, with `from_session` as
/// the apparent source address. Returns the number of datagrams moved.
pub fn deliver(
    from: &mut Context<TestHandler>,
    to: &mut Context<TestHandler>,
    from_session: &Session,
    now: Instant,
) -> usize {
    let datagrams = take_outbox(from);
    for d in &datagrams {
        to.handle_message(now, from_session, d).expect("handle_message");
    }
    datagrams.len()
}

/// Parsed DTLS record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecHdr {
    pub ctype: u8,
    pub epoch: u16,
    pub seq: u64,
}

/// Content types.
pub const CHANGE_CIPHER_SPEC: u8 = 20;
pub const ALERT: u8 = 21;
pub const HANDSHAKE: u8 = 22;
pub const APPLICATION_DATA: u8 = 23;

/// Handshake message types.
pub const CLIENT_HELLO: u8 = 1;
pub const SERVER_HELLO: u8 = 2;
pub const HELLO_VERIFY_REQUEST: u8 = 3;
pub const SERVER_HELLO_DONE: u8 = 14;
pub const CLIENT_KEY_EXCHANGE: u8 = 16;
pub const FINISHED: u8 = 20;

/// Parse record headers from a datagram.
pub fn parse_records(datagram: &[u8]) -> Vec<RecHdr> {
    let mut out = Vec::new();
    let mut i = 0usize;
    while i + 13 <= datagram.len() {
        let ctype = datagram[i];
        let epoch = u16::from_be_bytes([datagram[i + 3], datagram[i + 4]]);
        let seq_bytes = [
            0u8,
            0u8,
            datagram[i + 5],
            datagram[i + 6],
            datagram[i + 7],
            datagram[i + 8],
            datagram[i + 9],
            datagram[i + 10],
        ];
        let seq = u64::from_be_bytes(seq_bytes);
        let len = u16::from_be_bytes([datagram[i + 11], datagram[i + 12]]) as usize;
        out.push(RecHdr { ctype, epoch, seq });
        i += 13 + len;
    }
    out
}

/// Collect record headers from a slice of datagrams.
pub fn collect_headers(datagrams: &[Vec<u8>]) -> Vec<RecHdr> {
    datagrams.iter().flat_map(|d| parse_records(d)).collect()
}

/// Cut a datagram into one buffer per record.
pub fn split_records(datagram: &[u8]) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    let mut i = 0usize;
    while i + 13 <= datagram.len() {
        let len = u16::from_be_bytes([datagram[i + 11], datagram[i + 12]]) as usize;
        out.push(datagram[i..i + 13 + len].to_vec());
        i += 13 + len;
    }
    out
}

/// Handshake message types found in plaintext handshake records.
pub fn parse_handshake_types(datagram: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut i = 0usize;
    while i + 13 <= datagram.len() {
        let ctype = datagram[i];
        let epoch = u16::from_be_bytes([datagram[i + 3], datagram[i + 4]]);
        let len = u16::from_be_bytes([datagram[i + 11], datagram[i + 12]]) as usize;

        // Only plaintext (epoch 0) handshake records can be inspected.
        if ctype == HANDSHAKE && epoch == 0 && i + 13 < datagram.len() {
            out.push(datagram[i + 13]);
        }
        i += 13 + len;
    }
    out
}

/// Assert that a resent flight has the same epochs but fresh sequence
/// numbers.
pub fn assert_epochs_and_seq_increased(init: &[RecHdr], resend: &[RecHdr]) {
    assert_eq!(
        init.len(),
        resend.len(),
        "record count must match between initial and resend"
    );
    for (a, b) in init.iter().zip(resend.iter()) {
        assert_eq!(a.ctype, b.ctype, "content type must match on resend");
        assert_eq!(a.epoch, b.epoch, "epoch must match on resend");
        assert!(
            b.seq > a.seq,
            "sequence must increase on resend: {:?} -> {:?}",
            a,
            b
        );
    }
}

/// Drive a full cookie exchange + PSK handshake and return both
/// endpoints connected, with handler event/outbox state cleared.
pub fn establish(now: Instant) -> (Context<TestHandler>, Context<TestHandler>) {
    let mut client = new_client();
    let mut server = new_server();

    let started = client.connect(now, server_session()).expect("connect");
    assert_eq!(started, Connect::Started);

    // ClientHello (empty cookie) -> HelloVerifyRequest
    deliver(&mut client, &mut server, &client_session(), now);
    deliver(&mut server, &mut client, &server_session(), now);
    // ClientHello (cookie) -> ServerHello, ServerHelloDone
    deliver(&mut client, &mut server, &client_session(), now);
    deliver(&mut server, &mut client, &server_session(), now);
    // ClientKeyExchange, CCS, Finished -> CCS, Finished
    deliver(&mut client, &mut server, &client_session(), now);
    deliver(&mut server, &mut client, &server_session(), now);

    assert!(client.is_connected(&server_session()), "client connected");
    assert!(server.is_connected(&client_session()), "server connected");

    client.handler_mut().events.clear();
    server.handler_mut().events.clear();
    client.handler_mut().outbox.clear();
    server.handler_mut().outbox.clear();

    (client, server)
}
