//! TLS 1.2 PRF (RFC 5246 section 5) and the PSK key schedule built on it.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroizing;

use super::{Role, KEY_BLOCK_LEN, MASTER_SECRET_LEN};
use crate::error::Error;
use crate::message::VERIFY_DATA_LEN;

type HmacSha256 = Hmac<Sha256>;

/// PRF(secret, label, seed) = P_SHA256(secret, label + seed)
///
/// P_hash is the iterated HMAC construction:
/// A(1) = HMAC(secret, label + seed), A(i) = HMAC(secret, A(i-1)),
/// output = HMAC(secret, A(1) + label + seed) || HMAC(secret, A(2) + ...) ...
pub(crate) fn prf_tls12(
    secret: &[u8],
    label: &str,
    seed: &[u8],
    output_len: usize,
) -> Result<Zeroizing<Vec<u8>>, Error> {
    let mut result = Zeroizing::new(Vec::with_capacity(output_len));

    let mut input = Zeroizing::new(Vec::with_capacity(label.len() + seed.len()));
    input.extend_from_slice(label.as_bytes());
    input.extend_from_slice(seed);

    // A(1) = HMAC_hash(secret, label + seed)
    let mut hmac =
        HmacSha256::new_from_slice(secret).map_err(|_| Error::CryptoFailure("hmac key"))?;
    hmac.update(&input);
    let mut a = hmac.finalize().into_bytes();

    while result.len() < output_len {
        // P_hash += HMAC_hash(secret, A(i) + label + seed)
        let mut hmac =
            HmacSha256::new_from_slice(secret).map_err(|_| Error::CryptoFailure("hmac key"))?;
        hmac.update(&a);
        hmac.update(&input);
        let output = hmac.finalize().into_bytes();

        let remaining = output_len - result.len();
        let to_copy = remaining.min(output.len());
        result.extend_from_slice(&output[..to_copy]);

        if result.len() < output_len {
            // A(i+1) = HMAC_hash(secret, A(i))
            let mut hmac = HmacSha256::new_from_slice(secret)
                .map_err(|_| Error::CryptoFailure("hmac key"))?;
            hmac.update(&a);
            a = hmac.finalize().into_bytes();
        }
    }

    Ok(result)
}

/// PSK premaster secret: uint16(N) || 0*N || uint16(N) || psk, N = PSK length.
pub(crate) fn psk_premaster(psk: &[u8]) -> Zeroizing<Vec<u8>> {
    let n = psk.len();
    let mut out = Zeroizing::new(Vec::with_capacity(4 + 2 * n));
    out.extend_from_slice(&(n as u16).to_be_bytes());
    out.extend_from_slice(&vec![0u8; n]);
    out.extend_from_slice(&(n as u16).to_be_bytes());
    out.extend_from_slice(psk);
    out
}

/// master_secret = PRF(premaster, "master secret", client_random + server_random)[..48]
pub(crate) fn master_secret(
    premaster: &[u8],
    client_random: &[u8; 32],
    server_random: &[u8; 32],
) -> Result<[u8; MASTER_SECRET_LEN], Error> {
    let mut seed = [0u8; 64];
    seed[..32].copy_from_slice(client_random);
    seed[32..].copy_from_slice(server_random);

    let out = prf_tls12(premaster, "master secret", &seed, MASTER_SECRET_LEN)?;

    let mut master = [0u8; MASTER_SECRET_LEN];
    master.copy_from_slice(&out);
    Ok(master)
}

/// key_block = PRF(master, "key expansion", server_random + client_random)
///
/// Note the reversed random order compared to the master secret.
pub(crate) fn key_block(
    master: &[u8; MASTER_SECRET_LEN],
    client_random: &[u8; 32],
    server_random: &[u8; 32],
) -> Result<Zeroizing<Vec<u8>>, Error> {
    let mut seed = [0u8; 64];
    seed[..32].copy_from_slice(server_random);
    seed[32..].copy_from_slice(client_random);

    prf_tls12(master, "key expansion", &seed, KEY_BLOCK_LEN)
}

/// Finished verify_data = PRF(master, label, transcript_hash)[..12]
pub(crate) fn verify_data(
    master: &[u8; MASTER_SECRET_LEN],
    transcript_hash: &[u8; 32],
    sender: Role,
) -> Result<[u8; VERIFY_DATA_LEN], Error> {
    let label = match sender {
        Role::Client => "client finished",
        Role::Server => "server finished",
    };

    let out = prf_tls12(master, label, transcript_hash, VERIFY_DATA_LEN)?;

    let mut verify = [0u8; VERIFY_DATA_LEN];
    verify.copy_from_slice(&out);
    Ok(verify)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Public TLS 1.2 PRF (SHA-256) test vector.
    #[test]
    fn prf_known_vector() {
        let secret = [
            0x9b, 0xbe, 0x43, 0x6b, 0xa9, 0x40, 0xf0, 0x17, 0xb1, 0x76, 0x52, 0x84, 0x9a, 0x71,
            0xdb, 0x35,
        ];
        let seed = [
            0xa0, 0xba, 0x9f, 0x93, 0x6c, 0xda, 0x31, 0x18, 0x27, 0xa6, 0xf7, 0x96, 0xff, 0xd5,
            0x19, 0x8c,
        ];
        let expected_first = [
            0xe3, 0xf2, 0x29, 0xba, 0x72, 0x7b, 0xe1, 0x7b, 0x8d, 0x12, 0x26, 0x20, 0x55, 0x7c,
            0xd4, 0x53, 0xc2, 0xaa, 0xb2, 0x1d, 0x07, 0xc3, 0xd4, 0x95, 0x32, 0x9b, 0x52, 0xd4,
            0xe6, 0x1e, 0xdb, 0x5a,
        ];

        let out = prf_tls12(&secret, "test label", &seed, 100).unwrap();
        assert_eq!(out.len(), 100);
        assert_eq!(&out[..32], &expected_first);
    }

    #[test]
    fn prf_is_deterministic() {
        let a = prf_tls12(b"secret", "label", b"seed", 48).unwrap();
        let b = prf_tls12(b"secret", "label", b"seed", 48).unwrap();
        assert_eq!(*a, *b);
    }

    #[test]
    fn premaster_layout() {
        let pm = psk_premaster(b"secretPSK");
        // 2 + 9 + 2 + 9
        assert_eq!(pm.len(), 22);
        assert_eq!(&pm[..2], &[0, 9]);
        assert_eq!(&pm[2..11], &[0u8; 9]);
        assert_eq!(&pm[11..13], &[0, 9]);
        assert_eq!(&pm[13..], b"secretPSK");
    }

    #[test]
    fn verify_data_depends_on_sender() {
        let master = [7u8; MASTER_SECRET_LEN];
        let hash = [1u8; 32];

        let client = verify_data(&master, &hash, Role::Client).unwrap();
        let server = verify_data(&master, &hash, Role::Server).unwrap();
        assert_ne!(client, server);
    }
}
