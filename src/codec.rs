//! Big-endian byte codec used by all wire types.
//!
//! Reads are nom parsers over `&[u8]`; a short buffer surfaces as
//! `nom::Err::Error` which maps to [`Error::BufferTooShort`] at the
//! message boundary. Writes append to a buffer and return the number of
//! bytes written.

use std::ops::RangeFrom;

use nom::bytes::complete::take;
use nom::error::{make_error, ErrorKind, ParseError};
use nom::number::complete::be_u8;
use nom::{Err, IResult, InputIter, InputLength, Slice};

pub(crate) use nom::number::complete::{be_u16, be_u24};
#[cfg(test)]
pub(crate) use nom::number::complete::be_u32;

use crate::buffer::Buf;

/// Parse a big-endian 48-bit unsigned integer.
pub(crate) fn be_u48<I, E: ParseError<I>>(input: I) -> IResult<I, u64, E>
where
    I: Slice<RangeFrom<usize>> + InputIter<Item = u8> + InputLength,
{
    let bound: usize = 6;

    if input.input_len() < bound {
        Err(Err::Error(make_error(input, ErrorKind::Eof)))
    } else {
        let mut res = 0u64;

        for byte in input.iter_elements().take(bound) {
            res = (res << 8) + byte as u64;
        }

        Ok((input.slice(bound..), res))
    }
}

/// Parse a variable-length vector with a 1-byte length prefix.
pub(crate) fn vec8(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (input, len) = be_u8(input)?;
    take(len as usize)(input)
}

/// Parse a variable-length vector with a 2-byte length prefix.
pub(crate) fn vec16(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (input, len) = be_u16(input)?;
    take(len as usize)(input)
}

/// Parse a variable-length vector with a 3-byte length prefix. No PSK
/// message carries one; kept for codec completeness.
#[cfg(test)]
pub(crate) fn vec24(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (input, len) = be_u24(input)?;
    take(len as usize)(input)
}

pub(crate) fn put_u8(out: &mut Buf, v: u8) -> usize {
    out.push(v);
    1
}

pub(crate) fn put_u16(out: &mut Buf, v: u16) -> usize {
    out.extend_from_slice(&v.to_be_bytes());
    2
}

pub(crate) fn put_u24(out: &mut Buf, v: u32) -> usize {
    out.extend_from_slice(&v.to_be_bytes()[1..]);
    3
}

#[cfg(test)]
pub(crate) fn put_u32(out: &mut Buf, v: u32) -> usize {
    out.extend_from_slice(&v.to_be_bytes());
    4
}

pub(crate) fn put_u48(out: &mut Buf, v: u64) -> usize {
    out.extend_from_slice(&v.to_be_bytes()[2..]);
    6
}

pub(crate) fn put_bytes(out: &mut Buf, bytes: &[u8]) -> usize {
    out.extend_from_slice(bytes);
    bytes.len()
}

/// Write a vector with a 1-byte length prefix.
pub(crate) fn put_vec8(out: &mut Buf, bytes: &[u8]) -> usize {
    debug_assert!(bytes.len() <= u8::MAX as usize);
    out.push(bytes.len() as u8);
    out.extend_from_slice(bytes);
    1 + bytes.len()
}

/// Write a vector with a 2-byte length prefix.
pub(crate) fn put_vec16(out: &mut Buf, bytes: &[u8]) -> usize {
    debug_assert!(bytes.len() <= u16::MAX as usize);
    out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    out.extend_from_slice(bytes);
    2 + bytes.len()
}

/// Write a vector with a 3-byte length prefix.
#[cfg(test)]
pub(crate) fn put_vec24(out: &mut Buf, bytes: &[u8]) -> usize {
    debug_assert!(bytes.len() < 1 << 24);
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes()[1..]);
    out.extend_from_slice(bytes);
    3 + bytes.len()
}
