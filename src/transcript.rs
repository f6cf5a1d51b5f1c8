//! Running hash over the handshake transcript.
//!
//! Every handshake message enters the hash with its full header, but with
//! `fragment_offset` forced to 0 and `fragment_length` equal to `length`,
//! so both sides hash identical bytes regardless of how records were cut.
//! HelloVerifyRequest and the pre-cookie ClientHello never enter the
//! transcript; the client resets the hash when a HelloVerifyRequest makes
//! it restart the exchange.

use sha2::{Digest, Sha256};

use crate::buffer::Buf;
use crate::message::Header;

pub(crate) struct Transcript {
    hash: Sha256,
}

impl Transcript {
    pub fn new() -> Self {
        Self {
            hash: Sha256::new(),
        }
    }

    /// Feed one complete handshake message (normalized header + body).
    pub fn add(&mut self, header: &Header, body: &[u8]) {
        let mut hdr = Buf::new();
        header.serialize_normalized(&mut hdr);
        self.hash.update(&*hdr);
        self.hash.update(body);
    }

    /// Hash of everything fed so far. The running state is kept, so more
    /// messages can be added afterwards.
    pub fn current(&self) -> [u8; 32] {
        self.hash.clone().finalize().into()
    }

    /// Forget everything. Used when a HelloVerifyRequest restarts the
    /// exchange and only the post-cookie ClientHello may be hashed.
    pub fn reset(&mut self) {
        self.hash = Sha256::new();
    }
}

impl std::fmt::Debug for Transcript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transcript").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageType;

    fn header(body_len: usize) -> Header {
        Header {
            msg_type: MessageType::Finished,
            length: body_len as u32,
            message_seq: 3,
            fragment_offset: 0,
            fragment_length: body_len as u32,
        }
    }

    #[test]
    fn same_input_same_hash() {
        let mut a = Transcript::new();
        let mut b = Transcript::new();
        a.add(&header(4), b"abcd");
        b.add(&header(4), b"abcd");
        assert_eq!(a.current(), b.current());
    }

    #[test]
    fn current_does_not_consume() {
        let mut t = Transcript::new();
        t.add(&header(4), b"abcd");
        let h1 = t.current();
        assert_eq!(h1, t.current());
        t.add(&header(2), b"xy");
        assert_ne!(h1, t.current());
    }

    #[test]
    fn fragment_fields_are_normalized() {
        // A header that arrived as a (complete) fragment hashes the same
        // as the header originally issued.
        let mut arrived = header(4);
        arrived.fragment_offset = 0;
        arrived.fragment_length = 4;

        let mut a = Transcript::new();
        a.add(&arrived, b"abcd");

        let mut b = Transcript::new();
        b.add(&header(4), b"abcd");

        assert_eq!(a.current(), b.current());
    }

    #[test]
    fn reset_forgets() {
        let mut a = Transcript::new();
        a.add(&header(4), b"abcd");
        a.reset();
        assert_eq!(a.current(), Transcript::new().current());
    }
}
