use nom::error::{Error, ErrorKind};
use nom::number::complete::be_u8;
use nom::{Err, IResult};

use super::{CipherSuite, CompressionMethod, ProtocolVersion, Random, SessionId};
use crate::buffer::Buf;
use crate::codec::{put_bytes, put_u16, put_u8, put_vec8, vec8};

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ServerHello {
    pub server_version: ProtocolVersion,
    pub random: Random,
    pub session_id: SessionId,
    pub cipher_suite: CipherSuite,
    pub compression_method: CompressionMethod,
}

impl ServerHello {
    pub fn new(server_version: ProtocolVersion, random: Random, cipher_suite: CipherSuite) -> Self {
        ServerHello {
            server_version,
            random,
            session_id: SessionId::empty(),
            cipher_suite,
            compression_method: CompressionMethod::Null,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], ServerHello> {
        let (input, server_version) = ProtocolVersion::parse(input)?;

        let (input, random_bytes) = nom::bytes::complete::take(32usize)(input)?;
        // unwrap: take() gave exactly 32 bytes
        let random = Random::new(random_bytes).unwrap();

        let (input, session_id_bytes) = vec8(input)?;
        let Ok(session_id) = SessionId::try_new(session_id_bytes) else {
            return Err(Err::Error(Error::new(input, ErrorKind::LengthValue)));
        };

        let (input, cipher_suite) = CipherSuite::parse(input)?;
        let (input, compression) = be_u8(input)?;

        Ok((
            input,
            ServerHello {
                server_version,
                random,
                session_id,
                cipher_suite,
                compression_method: CompressionMethod::from_u8(compression),
            },
        ))
    }

    pub fn serialize(&self, output: &mut Buf) {
        self.server_version.serialize(output);
        put_bytes(output, &self.random);
        put_vec8(output, &self.session_id);
        put_u16(output, self.cipher_suite.as_u16());
        put_u8(output, self.compression_method.as_u8());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MESSAGE: &[u8] = &[
        0xFE, 0xFD, // ProtocolVersion::Dtls1_2
        // Random
        0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F,
        0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1A, 0x1B, 0x1C, 0x1D, 0x1E,
        0x1F, 0x20, //
        0x00, // SessionId length
        0xC0, 0xA8, // TLS_PSK_WITH_AES_128_CCM_8
        0x00, // CompressionMethod::Null
    ];

    #[test]
    fn roundtrip() {
        let random = Random::new(&MESSAGE[2..34]).unwrap();
        let server_hello =
            ServerHello::new(ProtocolVersion::Dtls1_2, random, CipherSuite::PskAes128Ccm8);

        let mut serialized = Buf::new();
        server_hello.serialize(&mut serialized);
        assert_eq!(&*serialized, MESSAGE);

        let (rest, parsed) = ServerHello::parse(&serialized).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, server_hello);
    }

    #[test]
    fn truncated_random_rejected() {
        assert!(ServerHello::parse(&MESSAGE[..20]).is_err());
    }
}
