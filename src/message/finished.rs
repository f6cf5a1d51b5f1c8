use nom::bytes::complete::take;
use nom::IResult;
use smallvec::SmallVec;

use crate::buffer::Buf;
use crate::codec::put_bytes;

/// Length of the Finished verify_data for the PSK suite.
pub(crate) const VERIFY_DATA_LEN: usize = 12;

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Finished {
    pub verify_data: SmallVec<[u8; VERIFY_DATA_LEN]>,
}

impl Finished {
    pub fn new(verify_data: &[u8; VERIFY_DATA_LEN]) -> Self {
        Finished {
            verify_data: SmallVec::from_slice(verify_data),
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Finished> {
        let (input, verify_data) = take(VERIFY_DATA_LEN)(input)?;

        Ok((
            input,
            Finished {
                verify_data: SmallVec::from_slice(verify_data),
            },
        ))
    }

    pub fn serialize(&self, output: &mut Buf) {
        put_bytes(output, &self.verify_data);
    }
}
