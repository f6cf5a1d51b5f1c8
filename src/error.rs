use std::fmt;

/// Errors surfaced by the DTLS engine.
///
/// Record-level conditions that the protocol requires to be ignored
/// (replays, stale sequence numbers, malformed datagrams from unknown
/// sources) are handled internally and never reach the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Input ended before a complete field could be read.
    BufferTooShort,
    /// Malformed record header, wrong protocol version or AEAD tag failure.
    BadRecord,
    /// Record sequence number was already accepted in this epoch.
    Replay,
    /// Record sequence number is older than the replay window covers.
    Stale,
    /// A handshake message arrived that the current state does not allow.
    ProtocolViolation(&'static str),
    /// The presented PSK identity has no matching key.
    UnknownIdentity,
    /// The retransmit ceiling was exceeded before the handshake completed.
    HandshakeTimeout,
    /// The peer table is full.
    ResourceExhausted,
    /// No peer exists for the given session.
    UnknownPeer,
    /// A cryptographic primitive failed.
    CryptoFailure(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BufferTooShort => write!(f, "buffer too short"),
            Error::BadRecord => write!(f, "bad record"),
            Error::Replay => write!(f, "replayed record"),
            Error::Stale => write!(f, "stale record"),
            Error::ProtocolViolation(what) => write!(f, "protocol violation: {}", what),
            Error::UnknownIdentity => write!(f, "unknown psk identity"),
            Error::HandshakeTimeout => write!(f, "handshake timeout"),
            Error::ResourceExhausted => write!(f, "peer table full"),
            Error::UnknownPeer => write!(f, "unknown peer"),
            Error::CryptoFailure(what) => write!(f, "crypto failure: {}", what),
        }
    }
}

impl std::error::Error for Error {}

impl<'a> From<nom::Err<nom::error::Error<&'a [u8]>>> for Error {
    fn from(value: nom::Err<nom::error::Error<&'a [u8]>>) -> Self {
        use nom::error::ErrorKind;
        match value {
            nom::Err::Incomplete(_) => Error::BufferTooShort,
            // Complete-input parsers report truncated input as Eof.
            nom::Err::Error(x) | nom::Err::Failure(x) => match x.code {
                ErrorKind::Eof => Error::BufferTooShort,
                _ => Error::BadRecord,
            },
        }
    }
}
