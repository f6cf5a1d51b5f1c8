use nom::error::{Error, ErrorKind};
use nom::{Err, IResult};

use super::PskIdentity;
use crate::buffer::Buf;
use crate::codec::{put_vec16, vec16};

/// ClientKeyExchange for the PSK key exchange: just the identity the
/// client wants the server to look its key up under.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ClientKeyExchange {
    pub identity: PskIdentity,
}

impl ClientKeyExchange {
    pub fn new(identity: PskIdentity) -> Self {
        ClientKeyExchange { identity }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], ClientKeyExchange> {
        let (input, identity_bytes) = vec16(input)?;
        let Ok(identity) = PskIdentity::try_new(identity_bytes) else {
            return Err(Err::Error(Error::new(input, ErrorKind::LengthValue)));
        };

        Ok((input, ClientKeyExchange { identity }))
    }

    pub fn serialize(&self, output: &mut Buf) {
        put_vec16(output, &self.identity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MESSAGE: &[u8] = &[
        0x00, 0x0F, // identity length
        b'C', b'l', b'i', b'e', b'n', b't', b'_', b'i', b'd', b'e', b'n', b't', b'i', b't', b'y',
    ];

    #[test]
    fn roundtrip() {
        let original = ClientKeyExchange::new("Client_identity".try_into().unwrap());

        let mut serialized = Buf::new();
        original.serialize(&mut serialized);
        assert_eq!(&*serialized, MESSAGE);

        let (rest, parsed) = ClientKeyExchange::parse(&serialized).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, original);
    }

    #[test]
    fn truncated_identity_rejected() {
        assert!(ClientKeyExchange::parse(&MESSAGE[..8]).is_err());
    }
}
