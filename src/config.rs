use std::time::Duration;

use crate::message::ProtocolVersion;

/// DTLS engine configuration.
#[derive(Debug, Clone)]
pub struct Config {
    protocol_version: ProtocolVersion,
    mtu: usize,
    max_peers: usize,
    cookie_rotation: Duration,
    retransmit_start_rto: Duration,
    retransmit_max_rto: Duration,
    retransmit_retries: usize,
    peer_idle_timeout: Duration,
    rng_seed: Option<u64>,
}

impl Config {
    /// Create a new configuration builder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder {
            protocol_version: ProtocolVersion::Dtls1_2,
            mtu: 1400,
            max_peers: 32,
            cookie_rotation: Duration::from_secs(3600),
            retransmit_start_rto: Duration::from_secs(1),
            retransmit_max_rto: Duration::from_secs(60),
            retransmit_retries: 7,
            peer_idle_timeout: Duration::from_secs(600),
            rng_seed: None,
        }
    }

    /// The DTLS version spoken on the wire.
    #[inline(always)]
    pub fn protocol_version(&self) -> ProtocolVersion {
        self.protocol_version
    }

    /// Max transmission unit.
    ///
    /// The largest datagram the engine will hand to the write callback.
    #[inline(always)]
    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// Max number of concurrent peers before new sessions are refused.
    #[inline(always)]
    pub fn max_peers(&self) -> usize {
        self.max_peers
    }

    /// How long a cookie secret is used before a new one is generated.
    #[inline(always)]
    pub fn cookie_rotation(&self) -> Duration {
        self.cookie_rotation
    }

    /// Time until the first retransmission of a handshake flight.
    #[inline(always)]
    pub fn retransmit_start_rto(&self) -> Duration {
        self.retransmit_start_rto
    }

    /// Ceiling for the doubling retransmission timeout.
    #[inline(always)]
    pub fn retransmit_max_rto(&self) -> Duration {
        self.retransmit_max_rto
    }

    /// Max number of retransmissions per flight.
    #[inline(always)]
    pub fn retransmit_retries(&self) -> usize {
        self.retransmit_retries
    }

    /// Idle time after which a peer is evicted.
    #[inline(always)]
    pub fn peer_idle_timeout(&self) -> Duration {
        self.peer_idle_timeout
    }

    /// Optional RNG seed for deterministic output.
    #[inline(always)]
    pub fn rng_seed(&self) -> Option<u64> {
        self.rng_seed
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::builder().build()
    }
}

/// Builder for [`Config`].
pub struct ConfigBuilder {
    protocol_version: ProtocolVersion,
    mtu: usize,
    max_peers: usize,
    cookie_rotation: Duration,
    retransmit_start_rto: Duration,
    retransmit_max_rto: Duration,
    retransmit_retries: usize,
    peer_idle_timeout: Duration,
    rng_seed: Option<u64>,
}

impl ConfigBuilder {
    /// Set the DTLS version spoken on the wire.
    ///
    /// Defaults to DTLS 1.2.
    pub fn protocol_version(mut self, version: ProtocolVersion) -> Self {
        self.protocol_version = version;
        self
    }

    /// Set the max transmission unit (MTU).
    ///
    /// Defaults to 1400.
    pub fn mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }

    /// Set the max number of concurrent peers.
    ///
    /// Defaults to 32.
    pub fn max_peers(mut self, max_peers: usize) -> Self {
        self.max_peers = max_peers;
        self
    }

    /// Set the cookie secret rotation period.
    ///
    /// A cookie verifies against the previous secret for one further
    /// rotation period (the grace window). Defaults to 1 hour.
    pub fn cookie_rotation(mut self, period: Duration) -> Self {
        self.cookie_rotation = period;
        self
    }

    /// Set the time until the first retransmission of a flight.
    ///
    /// Doubled for every retry up to the ceiling. Defaults to 1 second.
    pub fn retransmit_start_rto(mut self, rto: Duration) -> Self {
        self.retransmit_start_rto = rto;
        self
    }

    /// Set the ceiling for the doubling retransmission timeout.
    ///
    /// Defaults to 60 seconds.
    pub fn retransmit_max_rto(mut self, rto: Duration) -> Self {
        self.retransmit_max_rto = rto;
        self
    }

    /// Set the max number of retransmissions per flight.
    ///
    /// Defaults to 7.
    pub fn retransmit_retries(mut self, retries: usize) -> Self {
        self.retransmit_retries = retries;
        self
    }

    /// Set the idle time after which a peer is evicted.
    ///
    /// Defaults to 10 minutes.
    pub fn peer_idle_timeout(mut self, timeout: Duration) -> Self {
        self.peer_idle_timeout = timeout;
        self
    }

    /// Seed the engine RNG for deterministic output.
    ///
    /// Intended for testing; leave unset in production.
    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Config {
        Config {
            protocol_version: self.protocol_version,
            mtu: self.mtu,
            max_peers: self.max_peers,
            cookie_rotation: self.cookie_rotation,
            retransmit_start_rto: self.retransmit_start_rto,
            retransmit_max_rto: self.retransmit_max_rto,
            retransmit_retries: self.retransmit_retries,
            peer_idle_timeout: self.peer_idle_timeout,
            rng_seed: self.rng_seed,
        }
    }
}
