//! AES-128-CCM with 8-byte tags, operating in place on record fragments.

use aes::Aes128;
use ccm::aead::consts::{U12, U8};
use ccm::aead::generic_array::GenericArray;
use ccm::aead::{AeadInPlace, KeyInit};
use ccm::Ccm;

use super::{Aad, Nonce, ENC_KEY_LEN};
use crate::buffer::Buf;
use crate::error::Error;

type Aes128Ccm8 = Ccm<Aes128, U8, U12>;

/// Encrypt `buf` in place and append the 8-byte tag.
pub(crate) fn seal_in_place(
    key: &[u8; ENC_KEY_LEN],
    nonce: Nonce,
    aad: &Aad,
    buf: &mut Buf,
) -> Result<(), Error> {
    let cipher =
        Aes128Ccm8::new_from_slice(key).map_err(|_| Error::CryptoFailure("ccm key"))?;

    let nonce = GenericArray::from_slice(&nonce.0);

    cipher
        .encrypt_in_place(nonce, aad.as_ref(), buf)
        .map_err(|_| Error::CryptoFailure("ccm seal"))
}

/// Verify the tag (constant time) and decrypt `buf` in place, removing the
/// tag. A mismatch is reported as [`Error::BadRecord`].
pub(crate) fn open_in_place(
    key: &[u8; ENC_KEY_LEN],
    nonce: Nonce,
    aad: &Aad,
    buf: &mut Buf,
) -> Result<(), Error> {
    let cipher =
        Aes128Ccm8::new_from_slice(key).map_err(|_| Error::CryptoFailure("ccm key"))?;

    let nonce = GenericArray::from_slice(&nonce.0);

    cipher
        .decrypt_in_place(nonce, aad.as_ref(), buf)
        .map_err(|_| Error::BadRecord)
}
