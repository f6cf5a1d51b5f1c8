//! Per-peer DTLS state: record protection, handshake progression and
//! flight retransmission.
//!
//! A peer never does I/O. Records it wants sent are packed into datagrams
//! on `queue_tx`; plaintext and events for the application are staged on
//! `deliveries`. The owning [`Context`](crate::Context) drains both after
//! every entry point.

use std::collections::VecDeque;
use std::mem;
use std::sync::Arc;
use std::time::Instant;

use arrayvec::ArrayVec;
use subtle::ConstantTimeEq;

use crate::buffer::{Buf, BufferPool, ToBuf};
use crate::config::Config;
use crate::crypto::{ccm, prf};
use crate::crypto::{Aad, Nonce, ParamSlot, Role, SecurityParams};
use crate::crypto::{AEAD_OVERHEAD, EXPLICIT_NONCE_LEN};
use crate::error::Error;
use crate::handler::{DtlsHandler, Event};
use crate::message::{Alert, AlertDescription, AlertLevel};
use crate::message::{CipherSuite, ClientHello, ClientKeyExchange, CompressionMethod, Finished};
use crate::message::{ContentType, DTLSRecord, Sequence};
use crate::message::{Cookie, PskIdentity, Random};
use crate::message::{Handshake, Header, HelloVerifyRequest, MessageType, ServerHello};
use crate::rng::SeededRng;
use crate::session::Session;
use crate::timer::ExponentialBackoff;
use crate::transcript::Transcript;
use crate::window::{Freshness, ReplayWindow};

/// Largest usable 48-bit record sequence number.
const MAX_SEQUENCE_NUMBER: u64 = (1 << 48) - 1;

/// How many out-of-order future handshake messages we hold.
const MAX_FUTURE_HANDSHAKES: usize = 2;

/// DTLS engine state for one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PeerState {
    Init,
    // server states
    ServerHello,
    KeyExchange,
    WaitFinished,
    // client states
    ClientHello,
    WaitServerHelloDone,
    WaitServerFinished,
    // common
    Connected,
    Closing,
    Closed,
}

/// One record of the last outbound flight, kept as plaintext so a resend
/// can re-seal it under fresh record sequence numbers.
#[derive(Debug)]
struct FlightEntry {
    content_type: ContentType,
    epoch: u16,
    fragment: Buf,
}

/// Output staged for the application.
#[derive(Debug)]
pub(crate) enum Delivery {
    /// Verified plaintext for the read callback.
    Read(Buf),
    /// Notification for the event callback.
    Event(Event),
}

/// Handshake scratch state.
#[derive(Debug)]
struct HandshakeState {
    /// Next outbound handshake message sequence number.
    next_msg_seq: u16,
    /// Next inbound handshake message sequence number we act on.
    expected_msg_seq: u16,
    /// Running hash over the handshake messages.
    transcript: Transcript,
    /// Client random; reused verbatim in the post-cookie ClientHello so
    /// the echoed cookie still verifies.
    random: Random,
    /// Cookie from HelloVerifyRequest (client only).
    cookie: Option<Cookie>,
    /// Negotiated PSK identity.
    identity: Option<PskIdentity>,
    /// Future handshake messages (message_seq above expected), raw.
    future: Vec<(u16, Buf)>,
    /// Whether the params slot flip already happened this handshake.
    slot_flipped: bool,
}

pub(crate) struct Peer {
    pub(crate) session: Session,
    config: Arc<Config>,
    role: Role,
    state: PeerState,

    /// Outbound sequence space for epoch 0. Kept separate so flight
    /// resends of epoch-0 records keep drawing from it after the epoch
    /// switch.
    seq_epoch0: u64,
    /// Outbound sequence space for epoch 1.
    seq_epoch1: u64,
    /// Epoch outbound records are labeled with.
    write_epoch: u16,

    /// Epoch we accept inbound records in.
    read_epoch: u16,
    /// Anti-replay window for the current read epoch.
    replay: ReplayWindow,
    /// One-slot queue for an epoch read+1 record that arrived before the
    /// ChangeCipherSpec promoting our read keys.
    pending_epoch1: Option<Buf>,

    hs: HandshakeState,

    /// Current and pending security parameters.
    params: [SecurityParams; 2],
    /// Which slot is current; the other is pending during a handshake.
    slot: ParamSlot,

    /// Saved outbound flight for retransmission.
    flight: Vec<FlightEntry>,
    backoff: ExponentialBackoff,
    /// When armed: next retransmit (or, in Closing, the close deadline).
    retransmit_at: Option<Instant>,

    /// Datagrams packed and ready for the write callback.
    queue_tx: VecDeque<Buf>,
    /// Plaintext and events for the application callbacks.
    deliveries: VecDeque<Delivery>,
    buffers: BufferPool,

    last_activity: Instant,
}

impl Peer {
    fn new(session: Session, role: Role, config: Arc<Config>, now: Instant) -> Self {
        let backoff = ExponentialBackoff::new(
            config.retransmit_start_rto(),
            config.retransmit_max_rto(),
            config.retransmit_retries(),
        );

        Peer {
            session,
            config,
            role,
            state: PeerState::Init,
            seq_epoch0: 0,
            seq_epoch1: 0,
            write_epoch: 0,
            read_epoch: 0,
            replay: ReplayWindow::new(),
            pending_epoch1: None,
            hs: HandshakeState {
                next_msg_seq: 0,
                expected_msg_seq: 0,
                transcript: Transcript::new(),
                // unwrap: 32 bytes is the exact Random size
                random: Random::new(&[0; 32]).unwrap(),
                cookie: None,
                identity: None,
                future: Vec::new(),
                slot_flipped: false,
            },
            params: [SecurityParams::new(), SecurityParams::new()],
            slot: ParamSlot::A,
            flight: Vec::new(),
            backoff,
            retransmit_at: None,
            queue_tx: VecDeque::new(),
            deliveries: VecDeque::new(),
            buffers: BufferPool::default(),
            last_activity: now,
        }
    }

    pub fn new_client(session: Session, config: Arc<Config>, now: Instant) -> Self {
        Self::new(session, Role::Client, config, now)
    }

    pub fn new_server(session: Session, config: Arc<Config>, now: Instant) -> Self {
        Self::new(session, Role::Server, config, now)
    }

    pub fn is_closed(&self) -> bool {
        self.state == PeerState::Closed
    }

    pub fn is_connected(&self) -> bool {
        self.state == PeerState::Connected
    }

    /// The PSK identity negotiated during the handshake, once known.
    pub fn identity(&self) -> Option<Vec<u8>> {
        self.hs.identity.as_ref().map(|id| id.to_vec())
    }

    pub fn poll_datagram(&mut self) -> Option<Buf> {
        self.queue_tx.pop_front()
    }

    pub fn poll_delivery(&mut self) -> Option<Delivery> {
        self.deliveries.pop_front()
    }

    fn current_params(&self) -> &SecurityParams {
        &self.params[self.slot.index()]
    }

    fn pending_params_mut(&mut self) -> &mut SecurityParams {
        &mut self.params[self.slot.other().index()]
    }

    /// Flip the params slot. Happens exactly once per handshake, at the
    /// first ChangeCipherSpec boundary; epoch-0 records carry no keys so
    /// a single flip serves both directions.
    fn flip_slot(&mut self) {
        if !self.hs.slot_flipped {
            self.slot = self.slot.other();
            self.hs.slot_flipped = true;
        }
    }

    fn promote_read(&mut self) {
        self.flip_slot();
        self.read_epoch += 1;
        self.replay.reset();
        debug!("{} read epoch is now {}", self.session, self.read_epoch);
    }

    fn promote_write(&mut self) {
        self.flip_slot();
        self.write_epoch += 1;
        debug!("{} write epoch is now {}", self.session, self.write_epoch);
    }

    // === Record creation ===========================================

    fn next_sequence(&mut self, epoch: u16) -> Result<Sequence, Error> {
        let counter = if epoch == 0 {
            &mut self.seq_epoch0
        } else {
            &mut self.seq_epoch1
        };

        if *counter > MAX_SEQUENCE_NUMBER {
            return Err(Error::CryptoFailure("record sequence space exhausted"));
        }

        let sequence = Sequence::new(epoch, *counter);
        *counter += 1;
        Ok(sequence)
    }

    /// Build one record, seal it for epochs >= 1, and pack it into the
    /// outbound datagram queue (appending to the last datagram while it
    /// fits inside the MTU).
    fn create_record<F>(
        &mut self,
        content_type: ContentType,
        epoch: u16,
        save: bool,
        f: F,
    ) -> Result<(), Error>
    where
        F: FnOnce(&mut Buf),
    {
        let mut fragment = self.buffers.pop();
        f(&mut fragment);

        if save {
            let mut clone = self.buffers.pop();
            clone.extend_from_slice(&fragment);
            self.flight.push(FlightEntry {
                content_type,
                epoch,
                fragment: clone,
            });
        }

        let sequence = self.next_sequence(epoch)?;
        let version = self.config.protocol_version();

        if epoch >= 1 {
            let role = self.role;
            let params = self.current_params();
            let key = *params.write_key(role);
            let iv = params.write_iv(role);

            let explicit = sequence.explicit_bytes();
            let nonce = Nonce::new(iv, &explicit);
            let aad = Aad::new(content_type, version, sequence, fragment.len() as u16);

            ccm::seal_in_place(&key, nonce, &aad, &mut fragment)?;

            // Make room at the front for the explicit nonce.
            let ctext_len = fragment.len();
            fragment.resize(EXPLICIT_NONCE_LEN + ctext_len, 0);
            fragment.copy_within(0..ctext_len, EXPLICIT_NONCE_LEN);
            fragment[..EXPLICIT_NONCE_LEN].copy_from_slice(&explicit);
        }

        let record = DTLSRecord {
            content_type,
            version,
            sequence,
            length: fragment.len() as u16,
            fragment: &fragment,
        };

        let record_len = DTLSRecord::HEADER_LEN + fragment.len();
        let can_append = self
            .queue_tx
            .back()
            .map(|b| b.len() + record_len <= self.config.mtu())
            .unwrap_or(false);

        if can_append {
            // unwrap: can_append implies a last datagram exists
            record.serialize(self.queue_tx.back_mut().unwrap());
        } else {
            let mut datagram = self.buffers.pop();
            record.serialize(&mut datagram);
            self.queue_tx.push_back(datagram);
        }

        self.buffers.push(fragment);
        Ok(())
    }

    /// Serialize a handshake message into a record and feed it to the
    /// transcript. All handshake messages a peer sends are saved for
    /// flight retransmission.
    fn send_handshake(&mut self, msg_type: MessageType, body: &[u8]) -> Result<(), Error> {
        let header = Header {
            msg_type,
            length: body.len() as u32,
            message_seq: self.hs.next_msg_seq,
            fragment_offset: 0,
            fragment_length: body.len() as u32,
        };
        self.hs.next_msg_seq += 1;

        self.hs.transcript.add(&header, body);

        let epoch = self.write_epoch;
        self.create_record(ContentType::Handshake, epoch, true, |fragment| {
            header.serialize(fragment);
            fragment.extend_from_slice(body);
        })
    }

    fn send_change_cipher_spec(&mut self) -> Result<(), Error> {
        let epoch = self.write_epoch;
        self.create_record(ContentType::ChangeCipherSpec, epoch, true, |fragment| {
            fragment.push(1);
        })
    }

    fn send_alert(&mut self, alert: Alert) -> Result<(), Error> {
        let epoch = self.write_epoch;
        self.create_record(ContentType::Alert, epoch, false, |fragment| {
            alert.serialize(fragment);
        })
    }

    /// Fatal local failure: send the alert (best effort), close the peer
    /// and notify the application.
    fn fail(&mut self, description: AlertDescription) {
        warn!("{} fatal: {:?}", self.session, description);

        if self.state != PeerState::Closed {
            let _ = self.send_alert(Alert::fatal(description));
        }

        self.state = PeerState::Closed;
        self.deliveries.push_back(Delivery::Event(Event::Alert {
            level: AlertLevel::Fatal,
            description,
        }));
    }

    // === Flights ===================================================

    fn begin_flight(&mut self) {
        for entry in self.flight.drain(..) {
            self.buffers.push(entry.fragment);
        }
        self.backoff.reset();
        self.retransmit_at = None;
    }

    fn arm_retransmit(&mut self, now: Instant) {
        self.retransmit_at = Some(now + self.backoff.rto());
    }

    fn clear_flight(&mut self) {
        for entry in self.flight.drain(..) {
            self.buffers.push(entry.fragment);
        }
        self.retransmit_at = None;
    }

    fn flight_resend(&mut self, reason: &str) {
        if self.flight.is_empty() {
            return;
        }

        debug!("{} resending flight ({})", self.session, reason);

        // Take the entries out of self for the duration of the borrow.
        let records = mem::take(&mut self.flight);

        for entry in &records {
            let result = self.create_record(entry.content_type, entry.epoch, false, |fragment| {
                fragment.extend_from_slice(&entry.fragment);
            });
            if let Err(e) = result {
                warn!("{} resend failed: {}", self.session, e);
                break;
            }
        }

        self.flight = records;
    }

    // === Entry points ==============================================

    /// Client side: send the initial ClientHello (empty cookie).
    pub fn client_start(&mut self, now: Instant, rng: &mut SeededRng) -> Result<(), Error> {
        debug_assert_eq!(self.state, PeerState::Init);

        self.hs.random = Random::generate(rng);
        let random = self.hs.random;
        self.pending_params_mut()
            .client_random
            .copy_from_slice(&random);

        self.begin_flight();
        self.send_client_hello()?;
        self.state = PeerState::ClientHello;
        self.arm_retransmit(now);
        self.last_activity = now;

        Ok(())
    }

    fn send_client_hello(&mut self) -> Result<(), Error> {
        let cookie = self.hs.cookie.unwrap_or_else(Cookie::empty);

        let mut cipher_suites = ArrayVec::new();
        cipher_suites.push(CipherSuite::PskAes128Ccm8);

        let client_hello = ClientHello::new(
            self.config.protocol_version(),
            self.hs.random,
            cookie,
            cipher_suites,
        );

        let mut body = self.buffers.pop();
        client_hello.serialize(&mut body);
        self.send_handshake(MessageType::ClientHello, &body)?;
        self.buffers.push(body);

        Ok(())
    }

    /// Server side: accept a cookie-validated ClientHello and answer with
    /// ServerHello + ServerHelloDone.
    pub fn server_accept(
        &mut self,
        now: Instant,
        header: &Header,
        hello: &ClientHello,
        raw_body: &[u8],
        rng: &mut SeededRng,
    ) -> Result<(), Error> {
        debug_assert_eq!(self.state, PeerState::Init);
        self.last_activity = now;

        if !hello.offers_suite(CipherSuite::PskAes128Ccm8) || !hello.offers_null_compression() {
            self.fail(AlertDescription::HandshakeFailure);
            return Ok(());
        }

        // Continue the message_seq numbering from the cookie exchange.
        self.hs.next_msg_seq = header.message_seq;
        self.hs.expected_msg_seq = header.message_seq + 1;

        // Only the post-cookie ClientHello enters the transcript.
        self.hs.transcript.add(header, raw_body);

        let server_random = Random::generate(rng);
        {
            let params = self.pending_params_mut();
            params.client_random.copy_from_slice(&hello.random);
            params.server_random.copy_from_slice(&server_random);
        }

        self.begin_flight();

        let server_hello = ServerHello::new(
            self.config.protocol_version(),
            server_random,
            CipherSuite::PskAes128Ccm8,
        );
        let mut body = self.buffers.pop();
        server_hello.serialize(&mut body);
        self.send_handshake(MessageType::ServerHello, &body)?;
        self.buffers.push(body);

        self.send_handshake(MessageType::ServerHelloDone, &[])?;

        self.state = PeerState::ServerHello;
        self.arm_retransmit(now);

        Ok(())
    }

    /// Application write. Only valid once connected.
    pub fn send_application_data(&mut self, now: Instant, data: &[u8]) -> Result<usize, Error> {
        if self.state != PeerState::Connected {
            return Err(Error::ProtocolViolation("not connected"));
        }

        let epoch = self.write_epoch;
        let result = self.create_record(ContentType::ApplicationData, epoch, false, |fragment| {
            fragment.extend_from_slice(data);
        });

        if let Err(e) = result {
            self.fail(AlertDescription::InternalError);
            return Err(e);
        }

        self.last_activity = now;
        Ok(data.len())
    }

    /// Orderly close: send close_notify and await the peer's answer (or
    /// the deadline).
    pub fn close(&mut self, now: Instant) -> Result<(), Error> {
        match self.state {
            PeerState::Closed | PeerState::Closing => return Ok(()),
            _ => {}
        }

        let _ = self.send_alert(Alert::close_notify());
        self.state = PeerState::Closing;
        self.backoff.reset();
        self.retransmit_at = Some(now + self.backoff.rto());

        Ok(())
    }

    /// Timer tick: retransmissions, the closing deadline, idle eviction.
    pub fn tick(&mut self, now: Instant) {
        if self.state == PeerState::Closed {
            return;
        }

        if now.duration_since(self.last_activity) >= self.config.peer_idle_timeout() {
            debug!("{} evicting idle peer", self.session);
            self.state = PeerState::Closed;
            return;
        }

        let Some(at) = self.retransmit_at else {
            return;
        };
        if now < at {
            return;
        }

        if self.state == PeerState::Closing {
            debug!("{} close timed out", self.session);
            self.state = PeerState::Closed;
            return;
        }

        if self.backoff.can_retry() {
            self.backoff.attempt();
            self.flight_resend("timeout");
            self.arm_retransmit(now);
        } else {
            debug!("{} handshake timed out", self.session);
            self.deliveries
                .push_back(Delivery::Event(Event::HandshakeTimeout));
            self.state = PeerState::Closed;
        }
    }

    // === Ingress ===================================================

    /// Process one inbound record addressed to this peer.
    pub fn handle_record<H: DtlsHandler>(
        &mut self,
        now: Instant,
        record: &DTLSRecord,
        rng: &mut SeededRng,
        handler: &mut H,
    ) -> Result<(), Error> {
        if self.state == PeerState::Closed {
            return Ok(());
        }

        if record.version != self.config.protocol_version() {
            self.fail(AlertDescription::ProtocolVersion);
            return Ok(());
        }

        let epoch = record.sequence.epoch;

        if epoch == self.read_epoch {
            self.last_activity = now;

            if epoch == 0 {
                let buf = record.fragment.to_buf();
                self.process_plaintext(now, record.content_type, buf, rng, handler)?;
            } else {
                self.handle_protected_record(now, record, rng, handler)?;
            }
        } else if epoch == self.read_epoch + 1 && self.expecting_ccs() {
            // Reordered: a protected record overtook the ChangeCipherSpec.
            // Hold it until the CCS promotes our read keys.
            if self.pending_epoch1.is_none() {
                let mut buf = self.buffers.pop();
                record.serialize(&mut buf);
                self.pending_epoch1 = Some(buf);
                trace!("{} holding early epoch {} record", self.session, epoch);
            }
        } else {
            trace!(
                "{} dropping record with epoch {} (read epoch {})",
                self.session,
                epoch,
                self.read_epoch
            );
        }

        Ok(())
    }

    /// Whether the state machine is waiting for the peer's
    /// ChangeCipherSpec, so epoch read+1 records may legitimately arrive
    /// early.
    fn expecting_ccs(&self) -> bool {
        match self.role {
            Role::Server => self.state == PeerState::KeyExchange,
            Role::Client => self.state == PeerState::WaitServerFinished && self.read_epoch == 0,
        }
    }

    fn handle_protected_record<H: DtlsHandler>(
        &mut self,
        now: Instant,
        record: &DTLSRecord,
        rng: &mut SeededRng,
        handler: &mut H,
    ) -> Result<(), Error> {
        let seq = record.sequence.sequence_number;

        match self.replay.check(seq) {
            Freshness::Replay => {
                trace!("{} replayed record {}", self.session, record.sequence);
                return Ok(());
            }
            Freshness::Stale => {
                trace!("{} stale record {}", self.session, record.sequence);
                return Ok(());
            }
            Freshness::Fresh => {}
        }

        if record.fragment.len() < AEAD_OVERHEAD {
            self.bad_record();
            return Ok(());
        }

        let role = self.role;
        let params = self.current_params();
        let key = *params.read_key(role);
        let iv = params.read_iv(role);

        // unwrap: length checked above
        let explicit: [u8; EXPLICIT_NONCE_LEN] =
            record.fragment[..EXPLICIT_NONCE_LEN].try_into().unwrap();
        let nonce = Nonce::new(iv, &explicit);

        let plaintext_len = record.fragment.len() - AEAD_OVERHEAD;
        let aad = Aad::new(
            record.content_type,
            record.version,
            record.sequence,
            plaintext_len as u16,
        );

        let mut buf = record.fragment[EXPLICIT_NONCE_LEN..].to_buf();

        if ccm::open_in_place(&key, nonce, &aad, &mut buf).is_err() {
            self.bad_record();
            return Ok(());
        }

        // Only authenticated records advance the replay window.
        self.replay.mark(seq);

        // Authenticated non-handshake traffic after Connected confirms
        // the peer got our final flight. A handshake record here may
        // itself be a retransmission and must not cancel the flight.
        if self.state == PeerState::Connected && record.content_type != ContentType::Handshake {
            self.clear_flight();
        }

        self.process_plaintext(now, record.content_type, buf, rng, handler)
    }

    /// AEAD failure policy: fatal on an established peer, silent before.
    fn bad_record(&mut self) {
        let established = matches!(self.state, PeerState::Connected | PeerState::Closing);
        if established {
            self.fail(AlertDescription::BadRecordMac);
        } else {
            debug!("{} dropping undecryptable record", self.session);
        }
    }

    fn process_plaintext<H: DtlsHandler>(
        &mut self,
        now: Instant,
        content_type: ContentType,
        buf: Buf,
        rng: &mut SeededRng,
        handler: &mut H,
    ) -> Result<(), Error> {
        match content_type {
            ContentType::Handshake => self.process_handshake_fragment(now, &buf, handler)?,
            ContentType::ChangeCipherSpec => {
                self.handle_change_cipher_spec(now, &buf, rng, handler)?
            }
            ContentType::Alert => self.handle_peer_alert(&buf),
            ContentType::ApplicationData => {
                if self.state == PeerState::Connected && self.read_epoch >= 1 {
                    self.deliveries.push_back(Delivery::Read(buf));
                } else {
                    debug!(
                        "{} dropping application data in {:?}",
                        self.session, self.state
                    );
                }
            }
            ContentType::Unknown(value) => {
                debug!(
                    "{} dropping record with content type {}",
                    self.session, value
                );
            }
        }

        Ok(())
    }

    /// One record fragment can pack several handshake messages of the
    /// same flight; process them in order.
    fn process_handshake_fragment<H: DtlsHandler>(
        &mut self,
        now: Instant,
        buf: &[u8],
        handler: &mut H,
    ) -> Result<(), Error> {
        let mut rest = buf;

        while !rest.is_empty() {
            let (r, handshake) = match Handshake::parse(rest) {
                Ok(x) => x,
                Err(_) => {
                    debug!("{} malformed handshake fragment", self.session);
                    return Ok(());
                }
            };
            rest = r;

            self.handle_handshake(now, &handshake, handler)?;

            if self.state == PeerState::Closed {
                return Ok(());
            }
        }

        Ok(())
    }

    fn handle_handshake<H: DtlsHandler>(
        &mut self,
        now: Instant,
        handshake: &Handshake,
        handler: &mut H,
    ) -> Result<(), Error> {
        let header = handshake.header;

        if header.msg_type == MessageType::HelloRequest {
            // Renegotiation is not supported.
            trace!("{} ignoring HelloRequest", self.session);
            return Ok(());
        }

        if !header.is_unfragmented() {
            debug!(
                "{} dropping fragmented handshake (offset {}, len {} of {})",
                self.session, header.fragment_offset, header.fragment_length, header.length
            );
            return Ok(());
        }

        if header.message_seq < self.hs.expected_msg_seq {
            // The peer is retransmitting: it evidently lost our answer.
            self.flight_resend("duplicate handshake message");
            return Ok(());
        }

        if header.message_seq > self.hs.expected_msg_seq {
            self.buffer_future_handshake(&header, handshake.body);
            return Ok(());
        }

        self.dispatch_handshake(now, &header, handshake.body, handler)?;

        // Buffered future messages may now be due.
        while self.state != PeerState::Closed {
            let pos = self
                .hs
                .future
                .iter()
                .position(|(seq, _)| *seq == self.hs.expected_msg_seq);
            let Some(pos) = pos else {
                break;
            };

            let (_, raw) = self.hs.future.remove(pos);
            let Ok((_, buffered)) = Handshake::parse(&raw) else {
                continue;
            };
            let header = buffered.header;
            let body = buffered.body;
            self.dispatch_handshake(now, &header, body, handler)?;
        }

        Ok(())
    }

    fn buffer_future_handshake(&mut self, header: &Header, body: &[u8]) {
        if self.hs.future.len() >= MAX_FUTURE_HANDSHAKES {
            debug!("{} future handshake buffer full", self.session);
            return;
        }
        if self
            .hs
            .future
            .iter()
            .any(|(seq, _)| *seq == header.message_seq)
        {
            return;
        }

        let mut raw = self.buffers.pop();
        header.serialize(&mut raw);
        raw.extend_from_slice(body);
        self.hs.future.push((header.message_seq, raw));

        trace!(
            "{} buffered future handshake seq {} (expecting {})",
            self.session,
            header.message_seq,
            self.hs.expected_msg_seq
        );
    }

    fn dispatch_handshake<H: DtlsHandler>(
        &mut self,
        now: Instant,
        header: &Header,
        body: &[u8],
        handler: &mut H,
    ) -> Result<(), Error> {
        // Progress from the peer cancels the retransmit timer. Handlers
        // that send a new flight re-arm it.
        self.retransmit_at = None;
        self.hs.expected_msg_seq = header.message_seq + 1;

        let result = match (self.role, self.state, header.msg_type) {
            (Role::Client, PeerState::ClientHello, MessageType::HelloVerifyRequest) => {
                self.client_handle_hello_verify(now, body)
            }
            (Role::Client, PeerState::ClientHello, MessageType::ServerHello) => {
                self.client_handle_server_hello(header, body)
            }
            (Role::Client, PeerState::WaitServerHelloDone, MessageType::ServerHelloDone) => {
                self.client_handle_server_hello_done(now, header, body, handler)
            }
            (Role::Client, PeerState::WaitServerFinished, MessageType::Finished) => {
                self.client_handle_server_finished(header, body)
            }
            (Role::Server, PeerState::ServerHello, MessageType::ClientKeyExchange) => {
                self.server_handle_client_key_exchange(header, body, handler)
            }
            (Role::Server, PeerState::WaitFinished, MessageType::Finished) => {
                self.server_handle_finished(now, header, body)
            }
            (_, state, msg_type) => {
                debug!(
                    "{} unexpected {:?} in state {:?}",
                    self.session, msg_type, state
                );
                self.fail(AlertDescription::UnexpectedMessage);
                Ok(())
            }
        };

        // An Err out of a handler is an engine-side failure building the
        // response (e.g. record sequence space exhaustion), never bad
        // peer input. That closes this peer; it is not an error of the
        // handle_message call that fed us the record.
        if let Err(e) = result {
            warn!("{} internal failure: {}", self.session, e);
            self.fail(AlertDescription::InternalError);
        }

        Ok(())
    }

    // === Client handshake ==========================================

    fn client_handle_hello_verify(&mut self, now: Instant, body: &[u8]) -> Result<(), Error> {
        let Ok((_, hello_verify)) = HelloVerifyRequest::parse(body) else {
            self.fail(AlertDescription::IllegalParameter);
            return Ok(());
        };

        debug!(
            "{} got HelloVerifyRequest with {} byte cookie",
            self.session,
            hello_verify.cookie.len()
        );

        self.hs.cookie = Some(hello_verify.cookie);

        // Only the post-cookie ClientHello counts for Finished.
        self.hs.transcript.reset();

        self.begin_flight();
        self.send_client_hello()?;
        self.arm_retransmit(now);

        Ok(())
    }

    fn client_handle_server_hello(&mut self, header: &Header, body: &[u8]) -> Result<(), Error> {
        let Ok((_, server_hello)) = ServerHello::parse(body) else {
            self.fail(AlertDescription::IllegalParameter);
            return Ok(());
        };

        if server_hello.server_version != self.config.protocol_version() {
            self.fail(AlertDescription::ProtocolVersion);
            return Ok(());
        }
        if server_hello.cipher_suite != CipherSuite::PskAes128Ccm8 {
            self.fail(AlertDescription::HandshakeFailure);
            return Ok(());
        }
        if server_hello.compression_method != CompressionMethod::Null {
            self.fail(AlertDescription::HandshakeFailure);
            return Ok(());
        }

        self.hs.transcript.add(header, body);
        self.pending_params_mut()
            .server_random
            .copy_from_slice(&server_hello.random);

        self.state = PeerState::WaitServerHelloDone;
        Ok(())
    }

    fn client_handle_server_hello_done<H: DtlsHandler>(
        &mut self,
        now: Instant,
        header: &Header,
        body: &[u8],
        handler: &mut H,
    ) -> Result<(), Error> {
        self.hs.transcript.add(header, body);

        // Ask the application for the local identity/key pair.
        let Some(psk) = handler.psk(&self.session, None) else {
            self.fail(AlertDescription::UnknownPskIdentity);
            return Ok(());
        };
        let Ok(identity) = PskIdentity::try_new(psk.identity()) else {
            self.fail(AlertDescription::InternalError);
            return Ok(());
        };

        if let Err(e) = self.pending_params_mut().derive(psk.key()) {
            warn!("{} key derivation failed: {}", self.session, e);
            self.fail(AlertDescription::InternalError);
            return Ok(());
        }
        self.hs.identity = Some(identity);

        self.begin_flight();

        let mut cke_body = self.buffers.pop();
        ClientKeyExchange::new(identity).serialize(&mut cke_body);
        self.send_handshake(MessageType::ClientKeyExchange, &cke_body)?;
        self.buffers.push(cke_body);

        self.send_change_cipher_spec()?;
        self.promote_write();

        // verify_data covers the transcript up to and excluding our own
        // Finished.
        let verify = prf::verify_data(
            self.current_params().master_secret(),
            &self.hs.transcript.current(),
            Role::Client,
        )?;
        let mut fin_body = self.buffers.pop();
        Finished::new(&verify).serialize(&mut fin_body);
        self.send_handshake(MessageType::Finished, &fin_body)?;
        self.buffers.push(fin_body);

        self.state = PeerState::WaitServerFinished;
        self.arm_retransmit(now);

        Ok(())
    }

    fn client_handle_server_finished(&mut self, header: &Header, body: &[u8]) -> Result<(), Error> {
        let Ok((_, finished)) = Finished::parse(body) else {
            self.fail(AlertDescription::DecryptError);
            return Ok(());
        };

        // The server's verify_data covers the transcript including our
        // Finished.
        let expected = prf::verify_data(
            self.current_params().master_secret(),
            &self.hs.transcript.current(),
            Role::Server,
        )?;

        if !bool::from(finished.verify_data.ct_eq(&expected)) {
            self.fail(AlertDescription::DecryptError);
            return Ok(());
        }

        self.hs.transcript.add(header, body);

        self.clear_flight();
        self.state = PeerState::Connected;
        debug!("{} connected (client)", self.session);
        self.deliveries.push_back(Delivery::Event(Event::Connected));

        Ok(())
    }

    // === Server handshake ==========================================

    fn server_handle_client_key_exchange<H: DtlsHandler>(
        &mut self,
        header: &Header,
        body: &[u8],
        handler: &mut H,
    ) -> Result<(), Error> {
        let Ok((_, key_exchange)) = ClientKeyExchange::parse(body) else {
            self.fail(AlertDescription::IllegalParameter);
            return Ok(());
        };

        self.hs.transcript.add(header, body);

        let Some(psk) = handler.psk(&self.session, Some(&key_exchange.identity)) else {
            self.fail(AlertDescription::UnknownPskIdentity);
            return Ok(());
        };

        if let Err(e) = self.pending_params_mut().derive(psk.key()) {
            warn!("{} key derivation failed: {}", self.session, e);
            self.fail(AlertDescription::InternalError);
            return Ok(());
        }
        self.hs.identity = Some(key_exchange.identity);

        self.state = PeerState::KeyExchange;
        Ok(())
    }

    fn server_handle_finished(
        &mut self,
        now: Instant,
        header: &Header,
        body: &[u8],
    ) -> Result<(), Error> {
        let Ok((_, finished)) = Finished::parse(body) else {
            self.fail(AlertDescription::DecryptError);
            return Ok(());
        };

        let expected = prf::verify_data(
            self.current_params().master_secret(),
            &self.hs.transcript.current(),
            Role::Client,
        )?;

        if !bool::from(finished.verify_data.ct_eq(&expected)) {
            self.fail(AlertDescription::DecryptError);
            return Ok(());
        }

        self.hs.transcript.add(header, body);

        self.begin_flight();
        self.send_change_cipher_spec()?;
        self.promote_write();

        // Our verify_data covers the transcript including the client's
        // Finished.
        let verify = prf::verify_data(
            self.current_params().master_secret(),
            &self.hs.transcript.current(),
            Role::Server,
        )?;
        let mut fin_body = self.buffers.pop();
        Finished::new(&verify).serialize(&mut fin_body);
        self.send_handshake(MessageType::Finished, &fin_body)?;
        self.buffers.push(fin_body);

        // The final flight keeps retransmitting until client traffic in
        // the new epoch confirms delivery.
        self.arm_retransmit(now);

        self.state = PeerState::Connected;
        debug!("{} connected (server)", self.session);
        self.deliveries.push_back(Delivery::Event(Event::Connected));

        Ok(())
    }

    // === ChangeCipherSpec and alerts ===============================

    fn handle_change_cipher_spec<H: DtlsHandler>(
        &mut self,
        now: Instant,
        buf: &[u8],
        rng: &mut SeededRng,
        handler: &mut H,
    ) -> Result<(), Error> {
        if buf != [1] {
            debug!("{} malformed ChangeCipherSpec", self.session);
            return Ok(());
        }

        if !self.expecting_ccs() {
            // Duplicates from resent flights end up here.
            trace!(
                "{} ignoring ChangeCipherSpec in {:?}",
                self.session,
                self.state
            );
            return Ok(());
        }

        // The params that become readable: the pending slot, unless our
        // own ChangeCipherSpec already flipped it (client path).
        let target = if self.hs.slot_flipped {
            self.slot
        } else {
            self.slot.other()
        };
        if !self.params[target.index()].is_ready() {
            self.fail(AlertDescription::UnexpectedMessage);
            return Ok(());
        }

        self.promote_read();

        if self.role == Role::Server {
            self.state = PeerState::WaitFinished;
        }

        // A held epoch read+1 record can be processed now.
        if let Some(held) = self.pending_epoch1.take() {
            if let Ok((_, record)) = DTLSRecord::parse(&held) {
                self.handle_record(now, &record, rng, handler)?;
            }
        }

        Ok(())
    }

    fn handle_peer_alert(&mut self, buf: &[u8]) {
        let Ok((_, alert)) = Alert::parse(buf) else {
            debug!("{} malformed alert", self.session);
            return;
        };

        match alert.level {
            AlertLevel::Fatal => {
                debug!("{} peer fatal alert: {:?}", self.session, alert.description);
                self.state = PeerState::Closed;
                self.deliveries.push_back(Delivery::Event(Event::Alert {
                    level: alert.level,
                    description: alert.description,
                }));
            }
            AlertLevel::Warning => {
                if alert.description == AlertDescription::CloseNotify {
                    if self.state != PeerState::Closing {
                        // Peer-initiated close: answer with our own.
                        let _ = self.send_alert(Alert::close_notify());
                    }
                    self.state = PeerState::Closed;
                }
                self.deliveries.push_back(Delivery::Event(Event::Alert {
                    level: alert.level,
                    description: alert.description,
                }));
            }
        }
    }
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("session", &self.session)
            .field("role", &self.role)
            .field("state", &self.state)
            .field("write_epoch", &self.write_epoch)
            .field("read_epoch", &self.read_epoch)
            .finish()
    }
}
