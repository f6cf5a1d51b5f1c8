//! Cryptographic state: key schedule output, AEAD formatting and the
//! cookie service.

pub(crate) mod ccm;
pub(crate) mod cookie;
pub(crate) mod prf;

use arrayvec::ArrayVec;
use zeroize::Zeroize;

use crate::error::Error;
use crate::message::{ContentType, ProtocolVersion, Sequence};

/// Explicit nonce transmitted at the front of each protected fragment.
pub(crate) const EXPLICIT_NONCE_LEN: usize = 8;

/// CCM_8 authentication tag length.
pub(crate) const CCM_TAG_LEN: usize = 8;

/// Overhead per AEAD record (explicit nonce + tag).
pub(crate) const AEAD_OVERHEAD: usize = EXPLICIT_NONCE_LEN + CCM_TAG_LEN; // 16

pub(crate) const MASTER_SECRET_LEN: usize = 48;
pub(crate) const ENC_KEY_LEN: usize = 16;
pub(crate) const FIXED_IV_LEN: usize = 4;

/// Key block layout: MAC keys are empty for AEAD suites, so the block is
/// client_write_key || server_write_key || client_write_iv || server_write_iv.
pub(crate) const KEY_BLOCK_LEN: usize = 2 * ENC_KEY_LEN + 2 * FIXED_IV_LEN; // 40

/// Which side of the handshake this endpoint plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
    Client,
    Server,
}

/// Fixed IV portion (the write-direction salt).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Iv(pub [u8; FIXED_IV_LEN]);

/// Full 12-byte CCM nonce: salt || epoch || sequence_number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Nonce(pub [u8; 12]);

impl Nonce {
    /// Combine the fixed salt with the 8-byte explicit nonce.
    pub fn new(iv: Iv, explicit: &[u8; EXPLICIT_NONCE_LEN]) -> Self {
        let mut nonce = [0u8; 12];
        nonce[..FIXED_IV_LEN].copy_from_slice(&iv.0);
        nonce[FIXED_IV_LEN..].copy_from_slice(explicit);
        Self(nonce)
    }
}

/// Additional Authenticated Data for a DTLS 1.2 AEAD record:
/// epoch(2) || seq(6) || type(1) || version(2) || plaintext_length(2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Aad(ArrayVec<u8, 13>);

impl Aad {
    pub fn new(
        content_type: ContentType,
        version: ProtocolVersion,
        sequence: Sequence,
        plaintext_len: u16,
    ) -> Self {
        let mut aad = ArrayVec::new();
        aad.try_extend_from_slice(&sequence.explicit_bytes()).unwrap();
        aad.push(content_type.as_u8());
        aad.try_extend_from_slice(&version.as_u16().to_be_bytes())
            .unwrap();
        aad.try_extend_from_slice(&plaintext_len.to_be_bytes())
            .unwrap();
        Aad(aad)
    }
}

impl AsRef<[u8]> for Aad {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// One set of security parameters.
///
/// Two of these live in every peer: the current set and the pending set
/// filled in by the handshake. The pending set becomes current at
/// ChangeCipherSpec. All key material is zeroised on drop.
pub(crate) struct SecurityParams {
    pub client_random: [u8; 32],
    pub server_random: [u8; 32],
    master_secret: [u8; MASTER_SECRET_LEN],
    client_write_key: [u8; ENC_KEY_LEN],
    server_write_key: [u8; ENC_KEY_LEN],
    client_write_iv: [u8; FIXED_IV_LEN],
    server_write_iv: [u8; FIXED_IV_LEN],
    ready: bool,
}

impl SecurityParams {
    pub fn new() -> Self {
        SecurityParams {
            client_random: [0; 32],
            server_random: [0; 32],
            master_secret: [0; MASTER_SECRET_LEN],
            client_write_key: [0; ENC_KEY_LEN],
            server_write_key: [0; ENC_KEY_LEN],
            client_write_iv: [0; FIXED_IV_LEN],
            server_write_iv: [0; FIXED_IV_LEN],
            ready: false,
        }
    }

    /// Run the key schedule: PSK premaster -> master secret -> key block.
    /// Requires both randoms to be set.
    pub fn derive(&mut self, psk: &[u8]) -> Result<(), Error> {
        let premaster = prf::psk_premaster(psk);
        self.master_secret =
            prf::master_secret(&premaster, &self.client_random, &self.server_random)?;

        let block = prf::key_block(
            &self.master_secret,
            &self.client_random,
            &self.server_random,
        )?;

        // client_write_MAC and server_write_MAC are zero-length for AEAD.
        self.client_write_key.copy_from_slice(&block[..16]);
        self.server_write_key.copy_from_slice(&block[16..32]);
        self.client_write_iv.copy_from_slice(&block[32..36]);
        self.server_write_iv.copy_from_slice(&block[36..40]);
        self.ready = true;

        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn master_secret(&self) -> &[u8; MASTER_SECRET_LEN] {
        &self.master_secret
    }

    /// Key protecting records we send.
    pub fn write_key(&self, role: Role) -> &[u8; ENC_KEY_LEN] {
        match role {
            Role::Client => &self.client_write_key,
            Role::Server => &self.server_write_key,
        }
    }

    /// Key verifying records we receive.
    pub fn read_key(&self, role: Role) -> &[u8; ENC_KEY_LEN] {
        match role {
            Role::Client => &self.server_write_key,
            Role::Server => &self.client_write_key,
        }
    }

    pub fn write_iv(&self, role: Role) -> Iv {
        match role {
            Role::Client => Iv(self.client_write_iv),
            Role::Server => Iv(self.server_write_iv),
        }
    }

    pub fn read_iv(&self, role: Role) -> Iv {
        match role {
            Role::Client => Iv(self.server_write_iv),
            Role::Server => Iv(self.client_write_iv),
        }
    }
}

impl Drop for SecurityParams {
    fn drop(&mut self) {
        self.master_secret.zeroize();
        self.client_write_key.zeroize();
        self.server_write_key.zeroize();
        self.client_write_iv.zeroize();
        self.server_write_iv.zeroize();
        self.client_random.zeroize();
        self.server_random.zeroize();
    }
}

impl std::fmt::Debug for SecurityParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityParams")
            .field("ready", &self.ready)
            .finish()
    }
}

/// Which of the two parameter slots is current. The other one is pending
/// and is flipped in atomically at ChangeCipherSpec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParamSlot {
    A,
    B,
}

impl ParamSlot {
    pub fn index(&self) -> usize {
        match self {
            ParamSlot::A => 0,
            ParamSlot::B => 1,
        }
    }

    pub fn other(&self) -> ParamSlot {
        match self {
            ParamSlot::A => ParamSlot::B,
            ParamSlot::B => ParamSlot::A,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aad_layout() {
        let aad = Aad::new(
            ContentType::ApplicationData,
            ProtocolVersion::Dtls1_2,
            Sequence::new(1, 7),
            5,
        );
        assert_eq!(
            aad.as_ref(),
            &[0, 1, 0, 0, 0, 0, 0, 7, 23, 0xFE, 0xFD, 0, 5]
        );
    }

    #[test]
    fn derive_is_symmetric() {
        let mut client = SecurityParams::new();
        let mut server = SecurityParams::new();

        client.client_random = [1; 32];
        client.server_random = [2; 32];
        server.client_random = [1; 32];
        server.server_random = [2; 32];

        client.derive(b"secretPSK").unwrap();
        server.derive(b"secretPSK").unwrap();

        assert_eq!(client.master_secret(), server.master_secret());
        assert_eq!(
            client.write_key(Role::Client),
            server.read_key(Role::Server)
        );
        assert_eq!(
            client.read_iv(Role::Client).0,
            server.write_iv(Role::Server).0
        );
    }

    #[test]
    fn different_psk_different_keys() {
        let mut a = SecurityParams::new();
        let mut b = SecurityParams::new();
        a.client_random = [1; 32];
        a.server_random = [2; 32];
        b.client_random = [1; 32];
        b.server_random = [2; 32];

        a.derive(b"secretPSK").unwrap();
        b.derive(b"otherPSK").unwrap();

        assert_ne!(a.master_secret(), b.master_secret());
    }
}
