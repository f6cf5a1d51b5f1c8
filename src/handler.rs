use zeroize::Zeroize;

use crate::message::{AlertDescription, AlertLevel};
use crate::session::Session;

/// Application callbacks the engine is driven through.
///
/// The engine performs no I/O of its own: every datagram it wants on the
/// wire goes through [`write`](Self::write), every verified plaintext
/// through [`read`](Self::read). All callbacks are invoked synchronously
/// from inside engine entry points and must not block or re-enter the
/// engine.
pub trait DtlsHandler {
    /// Transmit one datagram to the remote peer. Returns the number of
    /// bytes sent, or a negative value on error. Short writes are not
    /// retried by the engine.
    fn write(&mut self, session: &Session, datagram: &[u8]) -> isize;

    /// Deliver verified application plaintext received from the peer.
    fn read(&mut self, session: &Session, data: &[u8]);

    /// Alert and engine event notifications. The default does nothing.
    fn event(&mut self, session: &Session, event: Event) {
        let _ = (session, event);
    }

    /// Key lookup. With `id == None`, return the local identity/key pair
    /// to present to the peer. With `Some(id)`, return the key matching
    /// the presented identity, or `None` if there is no such identity (the
    /// engine then sends a fatal `unknown_psk_identity` alert).
    fn psk(&mut self, session: &Session, id: Option<&[u8]>) -> Option<Psk>;
}

/// Notifications delivered through [`DtlsHandler::event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The handshake completed; application data may flow.
    Connected,
    /// An alert was received from the peer, or generated locally on a
    /// fatal condition.
    Alert {
        /// Severity of the alert.
        level: AlertLevel,
        /// Registry code of the alert.
        description: AlertDescription,
    },
    /// The retransmit ceiling was reached before the handshake finished;
    /// the peer has been destroyed.
    HandshakeTimeout,
}

impl Event {
    /// Numeric level: the alert level for alerts, 0 for engine events.
    pub fn level(&self) -> u8 {
        match self {
            Event::Alert { level, .. } => level.as_u8(),
            _ => 0,
        }
    }

    /// Numeric code: alert codes are below 256, engine events above.
    /// `Connected` is 256.
    pub fn code(&self) -> u16 {
        match self {
            Event::Connected => 256,
            Event::Alert { description, .. } => description.as_u8() as u16,
            Event::HandshakeTimeout => 257,
        }
    }
}

/// A pre-shared key and the identity it is provisioned under.
///
/// Key material is zeroised when the value is dropped.
#[derive(Clone, PartialEq, Eq)]
pub struct Psk {
    identity: Vec<u8>,
    key: Vec<u8>,
}

impl Psk {
    /// Create a key entry from an identity and key.
    pub fn new(identity: impl Into<Vec<u8>>, key: impl Into<Vec<u8>>) -> Self {
        Psk {
            identity: identity.into(),
            key: key.into(),
        }
    }

    /// The identity the key is provisioned under.
    pub fn identity(&self) -> &[u8] {
        &self.identity
    }

    /// The key material.
    pub fn key(&self) -> &[u8] {
        &self.key
    }
}

impl Drop for Psk {
    fn drop(&mut self) {
        self.identity.zeroize();
        self.key.zeroize();
    }
}

impl std::fmt::Debug for Psk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Identity is not secret, the key is.
        f.debug_struct("Psk")
            .field("identity", &String::from_utf8_lossy(&self.identity))
            .finish()
    }
}
