//! Randomness for handshake material.
//!
//! Client and server randoms, cookie secrets and their rotation all draw
//! bytes from one generator owned by the context. By default that is the
//! thread RNG. Setting [`Config::rng_seed`] swaps in a seeded stream
//! instead, which makes every datagram of a handshake reproducible byte
//! for byte. Only byte filling is exposed; nothing in the engine samples
//! other types.
//!
//! [`Config::rng_seed`]: crate::Config::rng_seed

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub(crate) enum SeededRng {
    /// Deterministic stream derived from a configured seed.
    Seeded(StdRng),
    /// The thread RNG, looked up on every fill.
    Thread,
}

impl SeededRng {
    pub fn new(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => SeededRng::Seeded(StdRng::seed_from_u64(seed)),
            None => SeededRng::Thread,
        }
    }

    /// Fill `out` with random bytes.
    pub fn fill(&mut self, out: &mut [u8]) {
        match self {
            SeededRng::Seeded(rng) => rng.fill(out),
            SeededRng::Thread => rand::rng().fill(out),
        }
    }
}

impl std::fmt::Debug for SeededRng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SeededRng::Seeded(_) => f.write_str("SeededRng::Seeded"),
            SeededRng::Thread => f.write_str("SeededRng::Thread"),
        }
    }
}
