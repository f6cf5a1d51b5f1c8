use nom::number::complete::be_u8;
use nom::IResult;

use crate::buffer::Buf;
use crate::codec::put_u8;

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    /// The connection may continue.
    Warning,
    /// The connection is terminated.
    Fatal,
}

impl AlertLevel {
    pub(crate) fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(AlertLevel::Warning),
            2 => Some(AlertLevel::Fatal),
            _ => None,
        }
    }

    /// The numeric level as it appears on the wire (1 or 2).
    pub fn as_u8(&self) -> u8 {
        match self {
            AlertLevel::Warning => 1,
            AlertLevel::Fatal => 2,
        }
    }
}

/// Alert descriptions from the TLS alert registry that this engine can
/// send or act on. Everything else is carried as `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertDescription {
    /// Orderly close (0).
    CloseNotify,
    /// A message arrived that the state machine does not allow (10).
    UnexpectedMessage,
    /// AEAD verification failed (20).
    BadRecordMac,
    /// No acceptable set of parameters (40).
    HandshakeFailure,
    /// A field was out of range or inconsistent (47).
    IllegalParameter,
    /// A Finished message failed verification (51).
    DecryptError,
    /// The protocol version is not supported (70).
    ProtocolVersion,
    /// An unrelated internal failure (80).
    InternalError,
    /// The presented PSK identity is not known (115).
    UnknownPskIdentity,
    /// Any other registry value.
    Unknown(u8),
}

impl AlertDescription {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => AlertDescription::CloseNotify,
            10 => AlertDescription::UnexpectedMessage,
            20 => AlertDescription::BadRecordMac,
            40 => AlertDescription::HandshakeFailure,
            47 => AlertDescription::IllegalParameter,
            51 => AlertDescription::DecryptError,
            70 => AlertDescription::ProtocolVersion,
            80 => AlertDescription::InternalError,
            115 => AlertDescription::UnknownPskIdentity,
            _ => AlertDescription::Unknown(value),
        }
    }

    /// The registry value as it appears on the wire.
    pub fn as_u8(&self) -> u8 {
        match self {
            AlertDescription::CloseNotify => 0,
            AlertDescription::UnexpectedMessage => 10,
            AlertDescription::BadRecordMac => 20,
            AlertDescription::HandshakeFailure => 40,
            AlertDescription::IllegalParameter => 47,
            AlertDescription::DecryptError => 51,
            AlertDescription::ProtocolVersion => 70,
            AlertDescription::InternalError => 80,
            AlertDescription::UnknownPskIdentity => 115,
            AlertDescription::Unknown(value) => *value,
        }
    }
}

/// A 2-byte alert message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alert {
    /// Severity.
    pub level: AlertLevel,
    /// Registry code.
    pub description: AlertDescription,
}

impl Alert {
    pub(crate) fn fatal(description: AlertDescription) -> Self {
        Alert {
            level: AlertLevel::Fatal,
            description,
        }
    }

    pub(crate) fn close_notify() -> Self {
        Alert {
            level: AlertLevel::Warning,
            description: AlertDescription::CloseNotify,
        }
    }

    pub(crate) fn parse(input: &[u8]) -> IResult<&[u8], Alert> {
        let (input, level) = be_u8(input)?;
        let (input, description) = be_u8(input)?;

        let Some(level) = AlertLevel::from_u8(level) else {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Tag,
            )));
        };

        Ok((
            input,
            Alert {
                level,
                description: AlertDescription::from_u8(description),
            },
        ))
    }

    pub(crate) fn serialize(&self, output: &mut Buf) {
        put_u8(output, self.level.as_u8());
        put_u8(output, self.description.as_u8());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let alert = Alert::fatal(AlertDescription::BadRecordMac);

        let mut out = Buf::new();
        alert.serialize(&mut out);
        assert_eq!(&*out, &[2, 20]);

        let (rest, parsed) = Alert::parse(&out).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, alert);
    }

    #[test]
    fn close_notify_is_warning() {
        let alert = Alert::close_notify();
        assert_eq!(alert.level, AlertLevel::Warning);
        assert_eq!(alert.description.as_u8(), 0);
    }

    #[test]
    fn bad_level_rejected() {
        assert!(Alert::parse(&[3, 0]).is_err());
    }
}
