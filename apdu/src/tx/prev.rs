// Copyright (c) 2022-2023 The MobileCoin Foundation

use encdec::{Decode, Encode};
use ledger_proto::ApduStatic;

use crate::{
    helpers::{Reader, Writer},
    ApduError, Instruction, BTC_APDU_CLA,
};

/// Previous transaction metadata, sent in response to a previous meta request
/// to begin replay of a funding transaction
///
/// ## Encoding:
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                            VERSION                            |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           LOCK_TIME                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                         INPUTS_COUNT                          |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                         OUTPUTS_COUNT                         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                        EXTRA_DATA_LEN                         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, PartialEq, Debug, Encode, Decode)]
#[encdec(error = "ApduError")]
pub struct TxPrevMeta {
    /// Transaction version
    pub version: u32,
    /// Transaction lock time
    pub lock_time: u32,
    /// Number of inputs
    pub inputs_count: u32,
    /// Number of outputs
    pub outputs_count: u32,
    /// Length of trailing extra data (coins with extra data only)
    pub extra_data_len: u32,
}

impl ApduStatic for TxPrevMeta {
    const CLA: u8 = BTC_APDU_CLA;
    const INS: u8 = Instruction::TxPrevMeta as u8;
}

impl TxPrevMeta {
    pub fn new(version: u32, lock_time: u32, inputs_count: u32, outputs_count: u32) -> Self {
        Self {
            version,
            lock_time,
            inputs_count,
            outputs_count,
            extra_data_len: 0,
        }
    }
}

/// Chunk of previous transaction extra data
///
/// ## Encoding:
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                            OFFSET                             |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |           DATA_LEN            |           RESERVED            |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /                         DATA (DATA_LEN)                       /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, PartialEq, Debug)]
pub struct TxPrevExtraData<'a> {
    /// Offset of this chunk within the extra data
    pub offset: u32,
    /// Chunk data
    pub data: &'a [u8],
}

impl<'a> ApduStatic for TxPrevExtraData<'a> {
    const CLA: u8 = BTC_APDU_CLA;
    const INS: u8 = Instruction::TxPrevExtraData as u8;
}

impl<'a> TxPrevExtraData<'a> {
    pub fn new(offset: u32, data: &'a [u8]) -> Self {
        Self { offset, data }
    }
}

impl<'a> Encode for TxPrevExtraData<'a> {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, ApduError> {
        Ok(8 + self.data.len())
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, ApduError> {
        let mut w = Writer::new(buff);

        w.put_u32(self.offset)?;
        w.put_u16(self.data.len() as u16)?;
        w.put_u16(0)?;
        w.put_bytes(self.data)?;

        Ok(w.len())
    }
}

impl<'a> Decode<'a> for TxPrevExtraData<'a> {
    type Output = Self;
    type Error = ApduError;

    fn decode(buff: &'a [u8]) -> Result<(Self::Output, usize), ApduError> {
        let mut r = Reader::new(buff);

        let offset = r.get_u32()?;
        let n = r.get_u16()? as usize;
        let _reserved = r.get_u16()?;
        let data = r.get_bytes(n)?;

        Ok((Self { offset, data }, r.len()))
    }
}

#[cfg(test)]
mod test {
    use rand::random;

    use super::*;
    use crate::test::encode_decode_apdu;

    #[test]
    fn encode_decode_prev_meta() {
        let apdu = TxPrevMeta::new(random(), random(), random(), random());

        let mut buff = [0u8; 256];
        let n = encode_decode_apdu(&mut buff, &apdu);

        assert_eq!(n, 20);
    }

    #[test]
    fn encode_decode_prev_extra_data() {
        let data: [u8; 32] = random();
        let apdu = TxPrevExtraData::new(random(), &data);

        let mut buff = [0u8; 256];
        let n = encode_decode_apdu(&mut buff, &apdu);

        assert_eq!(n, 40);
    }
}
