use std::fmt;
use std::net::{IpAddr, SocketAddr};

use arrayvec::ArrayVec;

/// Identity of a remote endpoint: address, port and local interface index.
///
/// Equality over all three fields keys the peer registry. A `Session` is
/// created by the application (typically from the source address of a
/// received datagram) and is immutable once a peer exists for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Session {
    addr: SocketAddr,
    ifindex: u32,
}

impl Session {
    /// Create a session for the given remote address (interface index 0).
    pub fn new(addr: SocketAddr) -> Self {
        Session { addr, ifindex: 0 }
    }

    /// Create a session bound to a specific local interface.
    pub fn with_ifindex(addr: SocketAddr, ifindex: u32) -> Self {
        Session { addr, ifindex }
    }

    /// The remote address and port.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The local interface index.
    pub fn ifindex(&self) -> u32 {
        self.ifindex
    }

    /// Canonical byte form used as cookie MAC input.
    ///
    /// Layout: family tag (4 or 6), address octets, port, ifindex. V4 and
    /// V6 addresses are kept distinct so a mapped address cannot reuse a
    /// cookie issued for the other family.
    pub(crate) fn canonical_bytes(&self) -> ArrayVec<u8, 23> {
        let mut out = ArrayVec::new();
        match self.addr.ip() {
            IpAddr::V4(v4) => {
                out.push(4);
                out.try_extend_from_slice(&v4.octets()).unwrap();
            }
            IpAddr::V6(v6) => {
                out.push(6);
                out.try_extend_from_slice(&v6.octets()).unwrap();
            }
        }
        out.try_extend_from_slice(&self.addr.port().to_be_bytes())
            .unwrap();
        out.try_extend_from_slice(&self.ifindex.to_be_bytes())
            .unwrap();
        out
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ifindex == 0 {
            write!(f, "{}", self.addr)
        } else {
            write!(f, "{}%{}", self.addr, self.ifindex)
        }
    }
}

impl From<SocketAddr> for Session {
    fn from(addr: SocketAddr) -> Self {
        Session::new(addr)
    }
}
