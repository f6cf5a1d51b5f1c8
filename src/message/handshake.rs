use nom::bytes::complete::take;
use nom::number::complete::{be_u16, be_u8};
use nom::IResult;

use crate::buffer::Buf;
use crate::codec::{be_u24, put_u16, put_u24, put_u8};

/// Handshake message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MessageType {
    HelloRequest,
    ClientHello,
    ServerHello,
    HelloVerifyRequest,
    ServerHelloDone,
    ClientKeyExchange,
    Finished,
    Unknown(u8),
}

impl MessageType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => MessageType::HelloRequest,
            1 => MessageType::ClientHello,
            2 => MessageType::ServerHello,
            3 => MessageType::HelloVerifyRequest,
            14 => MessageType::ServerHelloDone,
            16 => MessageType::ClientKeyExchange,
            20 => MessageType::Finished,
            _ => MessageType::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            MessageType::HelloRequest => 0,
            MessageType::ClientHello => 1,
            MessageType::ServerHello => 2,
            MessageType::HelloVerifyRequest => 3,
            MessageType::ServerHelloDone => 14,
            MessageType::ClientKeyExchange => 16,
            MessageType::Finished => 20,
            MessageType::Unknown(value) => *value,
        }
    }
}

/// Handshake message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Header {
    pub msg_type: MessageType,
    pub length: u32,
    pub message_seq: u16,
    pub fragment_offset: u32,
    pub fragment_length: u32,
}

impl Header {
    /// Handshake header length: type(1) + length(3) + seq(2) + offset(3) + frag_len(3).
    pub const LEN: usize = 12;

    pub fn parse(input: &[u8]) -> IResult<&[u8], Header> {
        let (input, msg_type) = be_u8(input)?;
        let (input, length) = be_u24(input)?;
        let (input, message_seq) = be_u16(input)?;
        let (input, fragment_offset) = be_u24(input)?;
        let (input, fragment_length) = be_u24(input)?;

        Ok((
            input,
            Header {
                msg_type: MessageType::from_u8(msg_type),
                length,
                message_seq,
                fragment_offset,
                fragment_length,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Buf) {
        put_u8(output, self.msg_type.as_u8());
        put_u24(output, self.length);
        put_u16(output, self.message_seq);
        put_u24(output, self.fragment_offset);
        put_u24(output, self.fragment_length);
    }

    /// Serialize with the fragment fields reset to cover the whole message.
    /// This is the form that enters the handshake transcript.
    pub fn serialize_normalized(&self, output: &mut Buf) {
        let whole = Header {
            fragment_offset: 0,
            fragment_length: self.length,
            ..*self
        };
        whole.serialize(output);
    }

    /// Whether this header describes a complete, unfragmented message.
    /// Fragmented handshake messages are not supported and get dropped.
    pub fn is_unfragmented(&self) -> bool {
        self.fragment_offset == 0 && self.fragment_length == self.length
    }
}

/// A handshake message (header plus body slice) inside a record fragment.
#[derive(Debug)]
pub(crate) struct Handshake<'a> {
    pub header: Header,
    pub body: &'a [u8],
}

impl<'a> Handshake<'a> {
    /// Parse one handshake message; the remainder may hold further
    /// messages from the same flight packed into one record.
    pub fn parse(input: &'a [u8]) -> IResult<&'a [u8], Handshake<'a>> {
        let (input, header) = Header::parse(input)?;
        let (rest, body) = take(header.fragment_length as usize)(input)?;

        Ok((rest, Handshake { header, body }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &[u8] = &[
        0x01, // ClientHello
        0x00, 0x00, 0x2A, // length 42
        0x00, 0x01, // message_seq 1
        0x00, 0x00, 0x00, // fragment_offset 0
        0x00, 0x00, 0x2A, // fragment_length 42
    ];

    #[test]
    fn roundtrip() {
        let (rest, header) = Header::parse(HEADER).unwrap();
        assert!(rest.is_empty());
        assert_eq!(header.msg_type, MessageType::ClientHello);
        assert_eq!(header.length, 42);
        assert_eq!(header.message_seq, 1);
        assert!(header.is_unfragmented());

        let mut out = Buf::new();
        header.serialize(&mut out);
        assert_eq!(&*out, HEADER);
    }

    #[test]
    fn fragment_detected() {
        let mut data = HEADER.to_vec();
        data[11] = 0x10; // fragment_length 16 != length 42
        let (_, header) = Header::parse(&data).unwrap();
        assert!(!header.is_unfragmented());

        let mut normalized = Buf::new();
        header.serialize_normalized(&mut normalized);
        assert_eq!(&*normalized, HEADER);
    }

    #[test]
    fn two_messages_in_one_fragment() {
        let mut data = Vec::new();
        // ServerHelloDone: empty body
        data.extend_from_slice(&[0x0E, 0, 0, 0, 0x00, 0x02, 0, 0, 0, 0, 0, 0]);
        // Finished: 12-byte body
        data.extend_from_slice(&[0x14, 0, 0, 12, 0x00, 0x03, 0, 0, 0, 0, 0, 12]);
        data.extend_from_slice(&[0xAB; 12]);

        let (rest, first) = Handshake::parse(&data).unwrap();
        assert_eq!(first.header.msg_type, MessageType::ServerHelloDone);
        assert!(first.body.is_empty());

        let (rest, second) = Handshake::parse(rest).unwrap();
        assert_eq!(second.header.msg_type, MessageType::Finished);
        assert_eq!(second.body, &[0xAB; 12]);
        assert!(rest.is_empty());
    }
}
