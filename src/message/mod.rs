//! Wire format types: records, handshake messages and alerts.

mod alert;
mod client_hello;
mod client_key_exchange;
mod finished;
mod handshake;
mod hello_verify_request;
mod id;
mod record;
mod server_hello;

pub use alert::{Alert, AlertDescription, AlertLevel};
pub(crate) use client_hello::ClientHello;
pub(crate) use client_key_exchange::ClientKeyExchange;
pub(crate) use finished::{Finished, VERIFY_DATA_LEN};
pub(crate) use handshake::{Handshake, Header, MessageType};
pub(crate) use hello_verify_request::HelloVerifyRequest;
pub(crate) use id::{Cookie, PskIdentity, Random, SessionId};
pub(crate) use record::{ContentType, DTLSRecord, Sequence};
pub(crate) use server_hello::ServerHello;

use nom::number::complete::be_u16;
use nom::IResult;

use crate::buffer::Buf;
use crate::codec::put_u16;

/// DTLS protocol version as it appears on the wire.
///
/// DTLS versions are the 1s-complement of the corresponding TLS version:
/// `0xFEFF` for 1.0 and `0xFEFD` for 1.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    /// DTLS 1.0 (`0xFEFF`).
    Dtls1_0,
    /// DTLS 1.2 (`0xFEFD`).
    Dtls1_2,
    /// Anything else seen on the wire.
    Unknown(u16),
}

impl ProtocolVersion {
    pub(crate) fn from_u16(value: u16) -> Self {
        match value {
            0xFEFF => ProtocolVersion::Dtls1_0,
            0xFEFD => ProtocolVersion::Dtls1_2,
            _ => ProtocolVersion::Unknown(value),
        }
    }

    pub(crate) fn as_u16(&self) -> u16 {
        match self {
            ProtocolVersion::Dtls1_0 => 0xFEFF,
            ProtocolVersion::Dtls1_2 => 0xFEFD,
            ProtocolVersion::Unknown(value) => *value,
        }
    }

    pub(crate) fn parse(input: &[u8]) -> IResult<&[u8], ProtocolVersion> {
        let (input, value) = be_u16(input)?;
        Ok((input, Self::from_u16(value)))
    }

    pub(crate) fn serialize(&self, output: &mut Buf) {
        put_u16(output, self.as_u16());
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolVersion::Dtls1_0 => write!(f, "DTLS 1.0"),
            ProtocolVersion::Dtls1_2 => write!(f, "DTLS 1.2"),
            ProtocolVersion::Unknown(v) => write!(f, "DTLS(0x{:04x})", v),
        }
    }
}

/// Cipher suite identifiers.
///
/// The engine negotiates exactly one suite; everything else is carried
/// only so a ClientHello offering several suites can be inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CipherSuite {
    /// TLS_PSK_WITH_AES_128_CCM_8 (IANA 0xC0A8).
    PskAes128Ccm8,
    Unknown(u16),
}

impl CipherSuite {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0xC0A8 => CipherSuite::PskAes128Ccm8,
            _ => CipherSuite::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CipherSuite::PskAes128Ccm8 => 0xC0A8,
            CipherSuite::Unknown(value) => *value,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], CipherSuite> {
        let (input, value) = be_u16(input)?;
        Ok((input, Self::from_u16(value)))
    }
}

/// Compression methods. Only NULL is ever negotiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompressionMethod {
    Null,
    Unknown(u8),
}

impl CompressionMethod {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => CompressionMethod::Null,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            CompressionMethod::Null => 0,
            CompressionMethod::Unknown(value) => *value,
        }
    }
}
