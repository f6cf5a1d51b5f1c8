use core::fmt;

use nom::bytes::complete::take;
use nom::number::complete::{be_u16, be_u8};
use nom::IResult;

use super::ProtocolVersion;
use crate::buffer::Buf;
use crate::codec::{be_u48, put_u16, put_u48, put_u8};

/// A DTLS record as read from or written to a datagram.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct DTLSRecord<'a> {
    pub content_type: ContentType,
    pub version: ProtocolVersion,
    pub sequence: Sequence,
    pub length: u16,
    pub fragment: &'a [u8],
}

/// Epoch-qualified record sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Sequence {
    pub epoch: u16,
    pub sequence_number: u64, // technically u48
}

impl Sequence {
    pub fn new(epoch: u16, sequence_number: u64) -> Self {
        Sequence {
            epoch,
            sequence_number,
        }
    }

    /// The 8-byte `epoch || sequence_number` form used both as the AEAD
    /// explicit nonce and as the leading AAD bytes.
    pub fn explicit_bytes(&self) -> [u8; 8] {
        let mut out = [0u8; 8];
        out[..2].copy_from_slice(&self.epoch.to_be_bytes());
        out[2..].copy_from_slice(&self.sequence_number.to_be_bytes()[2..]);
        out
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[epoch: {}, seq: {}]", self.epoch, self.sequence_number)
    }
}

impl<'a> DTLSRecord<'a> {
    /// Record header length: type(1) + version(2) + epoch(2) + seq(6) + length(2).
    pub const HEADER_LEN: usize = 13;

    pub fn parse(input: &'a [u8]) -> IResult<&'a [u8], DTLSRecord<'a>> {
        let (input, content_type) = ContentType::parse(input)?;
        let (input, version) = ProtocolVersion::parse(input)?;
        let (input, epoch) = be_u16(input)?;
        let (input, sequence_number) = be_u48(input)?;
        let (input, length) = be_u16(input)?;
        let (rest, fragment) = take(length as usize)(input)?;

        let sequence = Sequence {
            epoch,
            sequence_number,
        };

        Ok((
            rest,
            DTLSRecord {
                content_type,
                version,
                sequence,
                length,
                fragment,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Buf) {
        put_u8(output, self.content_type.as_u8());
        self.version.serialize(output);
        put_u16(output, self.sequence.epoch);
        put_u48(output, self.sequence.sequence_number);
        put_u16(output, self.length);
        output.extend_from_slice(self.fragment);
    }
}

/// Record content types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ContentType {
    ChangeCipherSpec,
    Alert,
    Handshake,
    ApplicationData,
    Unknown(u8),
}

impl ContentType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            20 => ContentType::ChangeCipherSpec,
            21 => ContentType::Alert,
            22 => ContentType::Handshake,
            23 => ContentType::ApplicationData,
            _ => ContentType::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            ContentType::ChangeCipherSpec => 20,
            ContentType::Alert => 21,
            ContentType::Handshake => 22,
            ContentType::ApplicationData => 23,
            ContentType::Unknown(value) => *value,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], ContentType> {
        let (input, byte) = be_u8(input)?;
        Ok((input, Self::from_u8(byte)))
    }
}
