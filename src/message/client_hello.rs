use arrayvec::ArrayVec;
use nom::error::{Error, ErrorKind};
use nom::number::complete::be_u8;
use nom::{Err, IResult};

use super::{CipherSuite, CompressionMethod, Cookie, ProtocolVersion, Random, SessionId};
use crate::buffer::Buf;
use crate::codec::{put_bytes, put_u16, put_u8, put_vec8, vec16, vec8};

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ClientHello {
    pub client_version: ProtocolVersion,
    pub random: Random,
    pub session_id: SessionId,
    pub cookie: Cookie,
    pub cipher_suites: ArrayVec<CipherSuite, 16>,
    pub compression_methods: ArrayVec<CompressionMethod, 4>,
}

impl ClientHello {
    pub fn new(
        client_version: ProtocolVersion,
        random: Random,
        cookie: Cookie,
        cipher_suites: ArrayVec<CipherSuite, 16>,
    ) -> Self {
        let mut compression_methods = ArrayVec::new();
        compression_methods.push(CompressionMethod::Null);

        ClientHello {
            client_version,
            random,
            session_id: SessionId::empty(),
            cookie,
            cipher_suites,
            compression_methods,
        }
    }

    pub fn offers_suite(&self, suite: CipherSuite) -> bool {
        self.cipher_suites.contains(&suite)
    }

    pub fn offers_null_compression(&self) -> bool {
        self.compression_methods.contains(&CompressionMethod::Null)
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], ClientHello> {
        let (input, client_version) = ProtocolVersion::parse(input)?;

        let (input, random_bytes) = nom::bytes::complete::take(32usize)(input)?;
        // unwrap: take() gave exactly 32 bytes
        let random = Random::new(random_bytes).unwrap();

        let (input, session_id_bytes) = vec8(input)?;
        let Ok(session_id) = SessionId::try_new(session_id_bytes) else {
            return Err(Err::Error(Error::new(input, ErrorKind::LengthValue)));
        };

        let (input, cookie_bytes) = vec8(input)?;
        let Ok(cookie) = Cookie::try_new(cookie_bytes) else {
            return Err(Err::Error(Error::new(input, ErrorKind::LengthValue)));
        };

        let (input, suites_bytes) = vec16(input)?;
        if suites_bytes.is_empty() || suites_bytes.len() % 2 != 0 {
            return Err(Err::Error(Error::new(input, ErrorKind::LengthValue)));
        }
        let mut cipher_suites = ArrayVec::new();
        let mut rest = suites_bytes;
        while !rest.is_empty() {
            let (r, suite) = CipherSuite::parse(rest)?;
            // Keep only as many suites as we can hold; extra ones cannot
            // be ones we would select anyway.
            let _ = cipher_suites.try_push(suite);
            rest = r;
        }

        let (input, compression_bytes) = vec8(input)?;
        if compression_bytes.is_empty() {
            return Err(Err::Error(Error::new(input, ErrorKind::LengthValue)));
        }
        let mut compression_methods = ArrayVec::new();
        let mut rest = compression_bytes;
        while !rest.is_empty() {
            let (r, method) = be_u8(rest)?;
            let _ = compression_methods.try_push(CompressionMethod::from_u8(method));
            rest = r;
        }

        // Extensions (if present) are left in the remainder and ignored:
        // the PSK suite needs none.

        Ok((
            input,
            ClientHello {
                client_version,
                random,
                session_id,
                cookie,
                cipher_suites,
                compression_methods,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Buf) {
        self.client_version.serialize(output);
        put_bytes(output, &self.random);
        put_vec8(output, &self.session_id);
        put_vec8(output, &self.cookie);
        put_u16(output, self.cipher_suites.len() as u16 * 2);
        for suite in &self.cipher_suites {
            put_u16(output, suite.as_u16());
        }
        put_u8(output, self.compression_methods.len() as u8);
        for method in &self.compression_methods {
            put_u8(output, method.as_u8());
        }
    }
}
