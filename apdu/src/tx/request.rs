// Copyright (c) 2022-2023 The MobileCoin Foundation

use encdec::{DecodeOwned, Encode};
use heapless::Vec;
use num_enum::TryFromPrimitive;
use strum::{Display, EnumIter, EnumString};

use super::types::*;
use crate::{
    encdec_enum,
    helpers::{Reader, Writer},
    state::TxState,
    ApduError,
};

/// Kind of data requested from the host
#[derive(Copy, Clone, PartialEq, Debug, Display, EnumString, EnumIter, TryFromPrimitive)]
#[repr(u8)]
pub enum RequestType {
    /// Input of the transaction being signed ([`TxInputAck`][super::TxInputAck])
    Input = 0,
    /// Output of the transaction being signed ([`TxOutputAck`][super::TxOutputAck])
    Output = 1,
    /// Previous transaction metadata ([`TxPrevMeta`][super::TxPrevMeta])
    PrevMeta = 2,
    /// Previous transaction input ([`TxPrevInputAck`][super::TxPrevInputAck])
    PrevInput = 3,
    /// Previous transaction output ([`TxPrevOutputAck`][super::TxPrevOutputAck])
    PrevOutput = 4,
    /// Previous transaction extra data chunk ([`TxPrevExtraData`][super::TxPrevExtraData])
    PrevExtraData = 5,
    /// Signing complete, no further data required
    Finished = 6,
}

encdec_enum!(RequestType);

/// Outstanding data request
#[derive(Clone, PartialEq, Debug)]
pub struct DataRequest {
    /// Requested object kind
    pub kind: RequestType,
    /// Index of the requested object
    pub index: u32,
    /// Previous transaction hash (previous transaction requests only)
    pub prev_hash: Option<[u8; 32]>,
    /// Extra data (offset, length) for extra data requests
    pub extra_data: Option<(u32, u32)>,
}

impl DataRequest {
    /// Create a request for an object of the transaction being signed
    pub fn new(kind: RequestType, index: u32) -> Self {
        Self {
            kind,
            index,
            prev_hash: None,
            extra_data: None,
        }
    }

    /// Create a request for an object of a previous transaction
    pub fn prev(kind: RequestType, index: u32, prev_hash: [u8; 32]) -> Self {
        Self {
            kind,
            index,
            prev_hash: Some(prev_hash),
            extra_data: None,
        }
    }

    /// Create a terminal request indicating signing has completed
    pub fn finished() -> Self {
        Self::new(RequestType::Finished, 0)
    }
}

/// Serialized transaction chunk and signature emitted during signing passes
#[derive(Clone, PartialEq, Debug, Default)]
pub struct SerializedChunk {
    /// Input index and DER signature (without sighash byte), where an input was signed
    pub signature: Option<(u32, SignatureBytes)>,
    /// Serialized transaction bytes
    pub bytes: Vec<u8, MAX_SERIALIZED_LEN>,
}

impl SerializedChunk {
    pub fn is_empty(&self) -> bool {
        self.signature.is_none() && self.bytes.is_empty()
    }
}

bitflags::bitflags! {
    /// Flags for optional [`TxRequest`] fields
    pub struct TxRequestFlags: u8 {
        const HAS_PREV_HASH = 1 << 0;
        const HAS_EXTRA_DATA = 1 << 1;
        const HAS_SIGNATURE = 1 << 2;
        const HAS_SERIALIZED = 1 << 3;
    }
}

/// Transaction request response APDU, returned while the engine awaits
/// data from the host and on completion.
///
/// Carries the next data request and any serialized transaction data
/// produced by the previous step.
///
/// ## Encoding:
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   TX_STATE    | REQUEST_TYPE  |     FLAGS     |   RESERVED    |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                         REQUEST_INDEX                         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /              PREV_HASH (32-byte, if HAS_PREV_HASH)            /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |              EXTRA_DATA_OFFSET (if HAS_EXTRA_DATA)            |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |               EXTRA_DATA_LEN (if HAS_EXTRA_DATA)              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |               SIGNATURE_INDEX (if HAS_SIGNATURE)              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |    SIG_LEN    |                  RESERVED                     |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /                        SIGNATURE (SIG_LEN)                    /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   SERIALIZED_LEN (if HAS_SERIALIZED)  |       RESERVED        |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /                   SERIALIZED (SERIALIZED_LEN)                 /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, PartialEq, Debug)]
pub struct TxRequest {
    /// Current transaction engine state
    pub state: TxState,
    /// Outstanding data request
    pub request: DataRequest,
    /// Serialized data produced by the previous step
    pub serialized: Option<SerializedChunk>,
}

impl TxRequest {
    pub fn new(state: TxState, request: DataRequest) -> Self {
        Self {
            state,
            request,
            serialized: None,
        }
    }

    fn flags(&self) -> TxRequestFlags {
        let mut flags = TxRequestFlags::empty();

        flags.set(
            TxRequestFlags::HAS_PREV_HASH,
            self.request.prev_hash.is_some(),
        );
        flags.set(
            TxRequestFlags::HAS_EXTRA_DATA,
            self.request.extra_data.is_some(),
        );

        if let Some(s) = &self.serialized {
            flags.set(TxRequestFlags::HAS_SIGNATURE, s.signature.is_some());
            flags.set(TxRequestFlags::HAS_SERIALIZED, true);
        }

        flags
    }
}

impl Encode for TxRequest {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, ApduError> {
        let mut n = 8;

        if self.request.prev_hash.is_some() {
            n += 32;
        }
        if self.request.extra_data.is_some() {
            n += 8;
        }
        if let Some(s) = &self.serialized {
            if let Some((_i, sig)) = &s.signature {
                n += 8 + sig.len();
            }
            n += 4 + s.bytes.len();
        }

        Ok(n)
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, ApduError> {
        let mut w = Writer::new(buff);

        w.put_u8(self.state as u8)?;
        w.put_u8(self.request.kind as u8)?;
        w.put_u8(self.flags().bits())?;
        w.put_u8(0)?;
        w.put_u32(self.request.index)?;

        if let Some(h) = &self.request.prev_hash {
            w.put_bytes(h)?;
        }

        if let Some((offset, len)) = self.request.extra_data {
            w.put_u32(offset)?;
            w.put_u32(len)?;
        }

        if let Some(s) = &self.serialized {
            if let Some((i, sig)) = &s.signature {
                w.put_u32(*i)?;
                w.put_u8(sig.len() as u8)?;
                w.put_bytes(&[0u8; 3])?;
                w.put_bytes(sig)?;
            }

            w.put_u16(s.bytes.len() as u16)?;
            w.put_u16(0)?;
            w.put_bytes(&s.bytes)?;
        }

        Ok(w.len())
    }
}

impl DecodeOwned for TxRequest {
    type Output = Self;
    type Error = ApduError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), ApduError> {
        let mut r = Reader::new(buff);

        let (state, _) = TxState::decode_owned(r.get_bytes(1)?)?;
        let (kind, _) = RequestType::decode_owned(r.get_bytes(1)?)?;
        let flags = TxRequestFlags::from_bits_truncate(r.get_u8()?);
        let _reserved = r.get_u8()?;
        let index = r.get_u32()?;

        let prev_hash = match flags.contains(TxRequestFlags::HAS_PREV_HASH) {
            true => Some(r.get_array::<32>()?),
            false => None,
        };

        let extra_data = match flags.contains(TxRequestFlags::HAS_EXTRA_DATA) {
            true => Some((r.get_u32()?, r.get_u32()?)),
            false => None,
        };

        let signature = match flags.contains(TxRequestFlags::HAS_SIGNATURE) {
            true => {
                let i = r.get_u32()?;
                let n = r.get_u8()? as usize;
                let _reserved = r.get_bytes(3)?;
                Some((i, r.get_vec::<MAX_SIG_LEN>(n)?))
            }
            false => None,
        };

        let serialized = match flags.contains(TxRequestFlags::HAS_SERIALIZED) {
            true => {
                let n = r.get_u16()? as usize;
                let _reserved = r.get_u16()?;
                let bytes = r.get_vec::<MAX_SERIALIZED_LEN>(n)?;
                Some(SerializedChunk { signature, bytes })
            }
            // Signatures are only carried alongside serialized data
            false if signature.is_some() => return Err(ApduError::InvalidEncoding),
            false => None,
        };

        let request = DataRequest {
            kind,
            index,
            prev_hash,
            extra_data,
        };

        Ok((
            Self {
                state,
                request,
                serialized,
            },
            r.len(),
        ))
    }
}

#[cfg(test)]
mod test {
    use rand::random;

    use super::*;
    use crate::test::encode_decode_apdu;

    #[test]
    fn encode_decode_input_request() {
        let apdu = TxRequest::new(TxState::Input, DataRequest::new(RequestType::Input, random()));

        let mut buff = [0u8; 64];
        let n = encode_decode_apdu(&mut buff, &apdu);

        assert_eq!(n, 8);
    }

    #[test]
    fn encode_decode_prev_request() {
        let mut request = DataRequest::prev(RequestType::PrevExtraData, 0, random());
        request.extra_data = Some((128, 64));

        let apdu = TxRequest::new(TxState::PrevExtraData, request);

        let mut buff = [0u8; 64];
        let n = encode_decode_apdu(&mut buff, &apdu);

        assert_eq!(n, 8 + 32 + 8);
    }

    #[test]
    fn encode_decode_signed_chunk() {
        let mut apdu = TxRequest::new(
            TxState::SignInput,
            DataRequest::new(RequestType::Input, random()),
        );
        apdu.serialized = Some(SerializedChunk {
            signature: Some((random(), Vec::from_slice(&[0x30; 71]).unwrap())),
            bytes: Vec::from_slice(&[0xab; 148]).unwrap(),
        });

        let mut buff = [0u8; 512];
        let n = encode_decode_apdu(&mut buff, &apdu);

        assert_eq!(n, 8 + 8 + 71 + 4 + 148);
    }

    #[test]
    fn encode_decode_finished() {
        let mut apdu = TxRequest::new(TxState::TxComplete, DataRequest::finished());
        apdu.serialized = Some(SerializedChunk {
            signature: None,
            bytes: Vec::from_slice(&[0u8; 4]).unwrap(),
        });

        let mut buff = [0u8; 64];
        encode_decode_apdu(&mut buff, &apdu);
    }
}
