//! Stateless HelloVerifyRequest cookies.
//!
//! The server never stores an issued cookie. It keeps a small rotating
//! secret and recomputes the expected cookie from the ClientHello on every
//! arrival. The previous secret stays valid for one further rotation
//! period so handshakes that straddle a rotation still complete.

use std::time::{Duration, Instant};

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::message::{ClientHello, Cookie};
use crate::rng::SeededRng;
use crate::session::Session;

/// Length of the secret used for generating Hello Verify cookies.
pub(crate) const COOKIE_SECRET_LEN: usize = 12;

/// Length of an issued cookie (truncated HMAC output).
pub(crate) const COOKIE_LEN: usize = 16;

type CookieMac = Hmac<Sha256>;

pub(crate) struct CookieService {
    secret: [u8; COOKIE_SECRET_LEN],
    previous: Option<[u8; COOKIE_SECRET_LEN]>,
    generated_at: Option<Instant>,
    rotation: Duration,
}

impl CookieService {
    pub fn new(rng: &mut SeededRng, rotation: Duration) -> Self {
        let mut secret = [0u8; COOKIE_SECRET_LEN];
        rng.fill(&mut secret);

        CookieService {
            secret,
            previous: None,
            generated_at: None,
            rotation,
        }
    }

    /// Rotate the secret when it has outlived the rotation period. The
    /// outgoing secret is kept for one grace period.
    pub fn maybe_rotate(&mut self, now: Instant, rng: &mut SeededRng) {
        let generated_at = *self.generated_at.get_or_insert(now);

        if now.duration_since(generated_at) < self.rotation {
            return;
        }

        debug!("Rotating cookie secret");

        let mut fresh = [0u8; COOKIE_SECRET_LEN];
        rng.fill(&mut fresh);

        if let Some(old) = self.previous.as_mut() {
            old.zeroize();
        }
        self.previous = Some(self.secret);
        self.secret = fresh;
        self.generated_at = Some(now);
    }

    /// Compute the cookie for this client as the current secret sees it.
    pub fn issue(&self, session: &Session, hello: &ClientHello) -> Cookie {
        compute(&self.secret, session, hello)
    }

    /// Check a presented cookie against the current secret, then (within
    /// the grace window) the previous one. Empty cookies never verify.
    pub fn verify(&self, session: &Session, hello: &ClientHello, presented: &Cookie) -> bool {
        if presented.is_empty() {
            return false;
        }

        let current = compute(&self.secret, session, hello);
        if bool::from(presented.ct_eq(&current)) {
            return true;
        }

        if let Some(previous) = &self.previous {
            let older = compute(previous, session, hello);
            return bool::from(presented.ct_eq(&older));
        }

        false
    }
}

impl Drop for CookieService {
    fn drop(&mut self) {
        self.secret.zeroize();
        if let Some(previous) = self.previous.as_mut() {
            previous.zeroize();
        }
    }
}

/// Cookie = HMAC-SHA-256(secret, client_addr || client_random || version ||
/// cipher_suites || compression_methods), truncated to 16 bytes.
fn compute(secret: &[u8; COOKIE_SECRET_LEN], session: &Session, hello: &ClientHello) -> Cookie {
    // unwrap: HMAC accepts keys of any length
    let mut mac = CookieMac::new_from_slice(secret).unwrap();

    mac.update(&session.canonical_bytes());
    mac.update(&hello.random);
    mac.update(&hello.client_version.as_u16().to_be_bytes());
    for suite in &hello.cipher_suites {
        mac.update(&suite.as_u16().to_be_bytes());
    }
    for method in &hello.compression_methods {
        mac.update(&[method.as_u8()]);
    }

    let digest = mac.finalize().into_bytes();

    // unwrap: 16 is within the Cookie bound
    Cookie::try_new(&digest[..COOKIE_LEN]).unwrap()
}
