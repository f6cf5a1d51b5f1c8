use nom::error::{Error, ErrorKind};
use nom::{Err, IResult};

use super::{Cookie, ProtocolVersion};
use crate::buffer::Buf;
use crate::codec::{put_vec8, vec8};

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct HelloVerifyRequest {
    pub server_version: ProtocolVersion,
    pub cookie: Cookie,
}

impl HelloVerifyRequest {
    pub fn new(server_version: ProtocolVersion, cookie: Cookie) -> Self {
        HelloVerifyRequest {
            server_version,
            cookie,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], HelloVerifyRequest> {
        let (input, server_version) = ProtocolVersion::parse(input)?;

        let (input, cookie_bytes) = vec8(input)?;
        let Ok(cookie) = Cookie::try_new(cookie_bytes) else {
            return Err(Err::Error(Error::new(input, ErrorKind::LengthValue)));
        };

        Ok((
            input,
            HelloVerifyRequest {
                server_version,
                cookie,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Buf) {
        self.server_version.serialize(output);
        put_vec8(output, &self.cookie);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MESSAGE: &[u8] = &[
        0xFE, 0xFD, // ProtocolVersion::Dtls1_2
        0x09, // Cookie length
        0x63, 0x6F, 0x6F, 0x6B, 0x69, 0x65, 0x34, 0x35, 0x36, // Cookie
    ];

    #[test]
    fn roundtrip() {
        let original =
            HelloVerifyRequest::new(ProtocolVersion::Dtls1_2, "cookie456".try_into().unwrap());

        let mut serialized = Buf::new();
        original.serialize(&mut serialized);
        assert_eq!(&*serialized, MESSAGE);

        let (rest, parsed) = HelloVerifyRequest::parse(&serialized).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, original);
    }

    #[test]
    fn truncated_cookie_rejected() {
        assert!(HelloVerifyRequest::parse(&MESSAGE[..5]).is_err());
    }
}
