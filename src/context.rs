//! Process-wide engine state: the peer registry and the entry points the
//! application drives the engine through.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::buffer::Buf;
use crate::config::Config;
use crate::crypto::cookie::CookieService;
use crate::error::Error;
use crate::handler::DtlsHandler;
use crate::message::{ClientHello, ContentType, DTLSRecord, Sequence};
use crate::message::{Handshake, Header, HelloVerifyRequest, MessageType};
use crate::peer::{Delivery, Peer};
use crate::rng::SeededRng;
use crate::session::Session;

/// Result of [`Context::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connect {
    /// A peer for this session already exists; nothing was sent.
    Exists,
    /// A new handshake was started and a ClientHello is on the wire.
    Started,
}

/// The DTLS engine: multiplexes any number of peer sessions over the
/// callbacks of one [`DtlsHandler`].
///
/// The context performs no I/O and owns no clock. The application feeds
/// inbound datagrams to [`handle_message`](Self::handle_message) and calls
/// [`check_retransmit`](Self::check_retransmit) periodically with the
/// current time. The context is not safe for concurrent use; callers
/// serialise access.
pub struct Context<H: DtlsHandler> {
    config: Arc<Config>,
    rng: SeededRng,
    cookie: CookieService,
    peers: HashMap<Session, Peer>,
    handler: H,
}

impl<H: DtlsHandler> Context<H> {
    /// Create a new engine bound to the given callbacks.
    pub fn new(config: Arc<Config>, handler: H) -> Self {
        let mut rng = SeededRng::new(config.rng_seed());
        let cookie = CookieService::new(&mut rng, config.cookie_rotation());

        Context {
            config,
            rng,
            cookie,
            peers: HashMap::new(),
            handler,
        }
    }

    /// Access the handler (application state) bound at creation.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Mutable access to the handler bound at creation.
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Tear down the context, returning the handler. All peer key
    /// material is zeroised.
    pub fn into_handler(mut self) -> H {
        self.peers.clear();
        self.handler
    }

    /// Number of live peers.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Whether the peer for `session` has completed its handshake.
    pub fn is_connected(&self, session: &Session) -> bool {
        self.peers
            .get(session)
            .map(|p| p.is_connected())
            .unwrap_or(false)
    }

    /// The PSK identity the peer authenticated under, once known.
    pub fn peer_identity(&self, session: &Session) -> Option<Vec<u8>> {
        self.peers.get(session).and_then(|p| p.identity())
    }

    /// Establish a DTLS channel with the given remote peer.
    ///
    /// Returns [`Connect::Exists`] if a peer already exists for the
    /// session, [`Connect::Started`] when a ClientHello was sent. The
    /// channel is usable once the handler sees [`Event::Connected`].
    ///
    /// [`Event::Connected`]: crate::Event::Connected
    pub fn connect(&mut self, now: Instant, session: Session) -> Result<Connect, Error> {
        if self.peers.contains_key(&session) {
            return Ok(Connect::Exists);
        }
        if self.peers.len() >= self.config.max_peers() {
            return Err(Error::ResourceExhausted);
        }

        debug!("{} connecting", session);

        let mut peer = Peer::new_client(session, Arc::clone(&self.config), now);
        peer.client_start(now, &mut self.rng)?;
        self.peers.insert(session, peer);
        self.flush(&session);

        Ok(Connect::Started)
    }

    /// Send application data to a connected peer. Returns the number of
    /// payload bytes accepted.
    pub fn write(
        &mut self,
        now: Instant,
        session: &Session,
        data: &[u8],
    ) -> Result<usize, Error> {
        let Some(peer) = self.peers.get_mut(session) else {
            return Err(Error::UnknownPeer);
        };

        let result = peer.send_application_data(now, data);
        self.flush(session);
        result
    }

    /// Close the channel with an orderly close_notify exchange.
    pub fn close(&mut self, now: Instant, session: &Session) -> Result<(), Error> {
        let Some(peer) = self.peers.get_mut(session) else {
            return Err(Error::UnknownPeer);
        };

        let result = peer.close(now);
        self.flush(session);
        result
    }

    /// Feed one received datagram into the engine.
    ///
    /// Everything the protocol requires in response (handshake flights,
    /// alerts, verified plaintext, events) is delivered through the
    /// handler callbacks before this returns.
    pub fn handle_message(
        &mut self,
        now: Instant,
        session: &Session,
        message: &[u8],
    ) -> Result<(), Error> {
        self.cookie.maybe_rotate(now, &mut self.rng);

        let mut input = message;

        while !input.is_empty() {
            let (rest, record) = match DTLSRecord::parse(input) {
                Ok(x) => x,
                Err(_) => {
                    debug!("{} dropping malformed datagram tail", session);
                    break;
                }
            };
            input = rest;

            if self.peers.contains_key(session) {
                // unwrap: presence checked just above
                let peer = self.peers.get_mut(session).unwrap();
                peer.handle_record(now, &record, &mut self.rng, &mut self.handler)?;
            } else {
                self.handle_stateless(now, session, &record);
            }
        }

        self.flush(session);
        Ok(())
    }

    /// Timer tick. Drives flight retransmission, handshake and close
    /// deadlines, idle eviction and cookie secret rotation. Call this
    /// periodically (once a second is plenty).
    pub fn check_retransmit(&mut self, now: Instant) {
        self.cookie.maybe_rotate(now, &mut self.rng);

        let sessions: Vec<Session> = self.peers.keys().copied().collect();
        for session in sessions {
            if let Some(peer) = self.peers.get_mut(&session) {
                peer.tick(now);
            }
            self.flush(&session);
        }
    }

    /// Records from sources we have no peer for. The only thing acted on
    /// is a ClientHello: either it carries a valid cookie (a peer is
    /// born) or it elicits a stateless HelloVerifyRequest. Everything
    /// else is dropped without a trace of state.
    fn handle_stateless(&mut self, now: Instant, session: &Session, record: &DTLSRecord) {
        if record.content_type != ContentType::Handshake || record.sequence.epoch != 0 {
            trace!("{} ignoring record from unknown peer", session);
            return;
        }
        if record.version != self.config.protocol_version() {
            debug!("{} ignoring {} from unknown peer", session, record.version);
            return;
        }

        let Ok((_, handshake)) = Handshake::parse(record.fragment) else {
            trace!("{} malformed handshake from unknown peer", session);
            return;
        };

        if handshake.header.msg_type != MessageType::ClientHello {
            trace!(
                "{} ignoring {:?} from unknown peer",
                session,
                handshake.header.msg_type
            );
            return;
        }
        if !handshake.header.is_unfragmented() {
            debug!("{} dropping fragmented ClientHello", session);
            return;
        }

        let Ok((_, hello)) = ClientHello::parse(handshake.body) else {
            debug!("{} malformed ClientHello", session);
            return;
        };

        if hello.client_version != self.config.protocol_version() {
            debug!(
                "{} ClientHello with version {}, want {}",
                session,
                hello.client_version,
                self.config.protocol_version()
            );
            return;
        }

        if self.cookie.verify(session, &hello, &hello.cookie) {
            self.accept_peer(now, session, &handshake.header, &hello, handshake.body);
        } else {
            self.send_hello_verify(session, record, &handshake.header, &hello);
        }
    }

    /// Answer a cookie-less (or stale-cookie) ClientHello without
    /// allocating anything. Record sequence number and message_seq echo
    /// the ClientHello's, so retransmissions burn no sequence numbers.
    fn send_hello_verify(
        &mut self,
        session: &Session,
        record: &DTLSRecord,
        header: &Header,
        hello: &ClientHello,
    ) {
        let cookie = self.cookie.issue(session, hello);

        debug!("{} sending HelloVerifyRequest", session);

        let hello_verify = HelloVerifyRequest::new(self.config.protocol_version(), cookie);
        let mut body = Buf::new();
        hello_verify.serialize(&mut body);

        let reply_header = Header {
            msg_type: MessageType::HelloVerifyRequest,
            length: body.len() as u32,
            message_seq: header.message_seq,
            fragment_offset: 0,
            fragment_length: body.len() as u32,
        };

        let mut fragment = Buf::new();
        reply_header.serialize(&mut fragment);
        fragment.extend_from_slice(&body);

        let reply = DTLSRecord {
            content_type: ContentType::Handshake,
            version: self.config.protocol_version(),
            sequence: Sequence::new(0, record.sequence.sequence_number),
            length: fragment.len() as u16,
            fragment: &fragment,
        };

        let mut datagram = Buf::new();
        reply.serialize(&mut datagram);

        let sent = self.handler.write(session, &datagram);
        if sent < 0 {
            debug!("{} write callback failed: {}", session, sent);
        }
    }

    fn accept_peer(
        &mut self,
        now: Instant,
        session: &Session,
        header: &Header,
        hello: &ClientHello,
        raw_body: &[u8],
    ) {
        if self.peers.len() >= self.config.max_peers() {
            warn!("{} peer table full, dropping ClientHello", session);
            return;
        }

        debug!("{} cookie verified, creating peer", session);

        let mut peer = Peer::new_server(*session, Arc::clone(&self.config), now);
        if let Err(e) = peer.server_accept(now, header, hello, raw_body, &mut self.rng) {
            warn!("{} accept failed: {}", session, e);
        }
        self.peers.insert(*session, peer);
    }

    /// Drain a peer's staged output into the handler callbacks, then
    /// reap it if it closed.
    fn flush(&mut self, session: &Session) {
        let Some(peer) = self.peers.get_mut(session) else {
            return;
        };

        while let Some(datagram) = peer.poll_datagram() {
            let sent = self.handler.write(&peer.session, &datagram);
            if sent < 0 {
                debug!("{} write callback failed: {}", peer.session, sent);
            }
        }

        while let Some(delivery) = peer.poll_delivery() {
            match delivery {
                Delivery::Read(buf) => self.handler.read(&peer.session, &buf),
                Delivery::Event(event) => self.handler.event(&peer.session, event),
            }
        }

        if peer.is_closed() {
            debug!("{} destroying peer", session);
            self.peers.remove(session);
        }
    }
}

impl<H: DtlsHandler> std::fmt::Debug for Context<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("peers", &self.peers.len())
            .finish()
    }
}
