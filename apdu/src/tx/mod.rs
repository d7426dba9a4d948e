// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Transaction related APDUs, used to execute a streamed transaction signing
//! operation via the hardware wallet.
//!
//! A signing operation is started with [`TxInit`], after which the device responds
//! with a [`TxRequest`] describing the next object it needs. The host answers each
//! request with the matching `*Ack` APDU until the device reports completion.
//! While user confirmation is pending the device responds with [`TxInfo`], and the
//! host polls with [`TxInfoReq`].
//!
//! See `ledger_btc_core::engine` for interaction and state machines

use encdec::{Decode, DecodeOwned, Encode};
use ledger_proto::ApduStatic;

use crate::{
    helpers::{arr, Reader, Writer},
    state::{FailureKind, TxState},
    ApduError, Instruction, BTC_APDU_CLA,
};

mod types;
pub use types::*;

mod input;
pub use input::*;

mod output;
pub use output::*;

mod prev;
pub use prev::*;

mod request;
pub use request::*;

/// Transaction initialisation APDU, starts a signing operation
///
/// ## Encoding:
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                         INPUTS_COUNT                          |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                         OUTPUTS_COUNT                         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                            VERSION                            |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           LOCK_TIME                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   COIN_LEN    |                    RESERVED                   |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /                     COIN_NAME (COIN_LEN)                      /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, PartialEq, Debug)]
pub struct TxInit<'a> {
    /// Number of inputs in the transaction
    pub inputs_count: u32,
    /// Number of outputs in the transaction
    pub outputs_count: u32,
    /// Transaction version
    pub version: u32,
    /// Transaction lock time
    pub lock_time: u32,
    /// Coin name (see `ledger_btc_core::coins`)
    pub coin: &'a str,
}

impl<'a> ApduStatic for TxInit<'a> {
    const CLA: u8 = BTC_APDU_CLA;
    const INS: u8 = Instruction::TxInit as u8;
}

impl<'a> TxInit<'a> {
    /// Create a new [`TxInit`] request
    pub fn new(
        coin: &'a str,
        inputs_count: u32,
        outputs_count: u32,
        version: u32,
        lock_time: u32,
    ) -> Result<Self, ApduError> {
        if coin.len() > MAX_COIN_NAME_LEN {
            return Err(ApduError::InvalidLength);
        }

        Ok(Self {
            inputs_count,
            outputs_count,
            version,
            lock_time,
            coin,
        })
    }
}

impl<'a> Encode for TxInit<'a> {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, ApduError> {
        Ok(4 * 5 + self.coin.len())
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, ApduError> {
        if self.coin.len() > MAX_COIN_NAME_LEN {
            return Err(ApduError::InvalidLength);
        }

        let mut w = Writer::new(buff);

        w.put_u32(self.inputs_count)?;
        w.put_u32(self.outputs_count)?;
        w.put_u32(self.version)?;
        w.put_u32(self.lock_time)?;
        w.put_u8(self.coin.len() as u8)?;
        w.put_bytes(&[0u8; 3])?;
        w.put_bytes(self.coin.as_bytes())?;

        Ok(w.len())
    }
}

impl<'a> Decode<'a> for TxInit<'a> {
    type Output = Self;
    type Error = ApduError;

    fn decode(buff: &'a [u8]) -> Result<(Self::Output, usize), ApduError> {
        let mut r = Reader::new(buff);

        let inputs_count = r.get_u32()?;
        let outputs_count = r.get_u32()?;
        let version = r.get_u32()?;
        let lock_time = r.get_u32()?;
        let coin_len = r.get_u8()? as usize;
        let _reserved = r.get_bytes(3)?;

        if coin_len > MAX_COIN_NAME_LEN {
            return Err(ApduError::InvalidLength);
        }

        let coin =
            core::str::from_utf8(r.get_bytes(coin_len)?).map_err(|_| ApduError::InvalidUtf8)?;

        Ok((
            Self {
                inputs_count,
                outputs_count,
                version,
                lock_time,
                coin,
            },
            r.len(),
        ))
    }
}

/// Transaction information request APDU
#[derive(Clone, PartialEq, Debug, Encode, Decode)]
#[encdec(error = "ApduError")]
pub struct TxInfoReq;

impl ApduStatic for TxInfoReq {
    const CLA: u8 = BTC_APDU_CLA;
    const INS: u8 = Instruction::TxGetInfo as u8;
}

/// Cancel transaction operation (0 length APDU)
#[derive(Clone, PartialEq, Debug, Encode, Decode)]
#[encdec(error = "ApduError")]
pub struct TxCancel;

impl ApduStatic for TxCancel {
    const CLA: u8 = BTC_APDU_CLA;
    const INS: u8 = Instruction::TxCancel as u8;
}

/// Transaction information response APDU.
///
/// Returned where no data request is outstanding (idle, awaiting user approval,
/// denied or errored), contains the current transaction engine state and a
/// value where relevant (ie. output index when awaiting output approval).
///
/// ## Encoding:
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   TX_STATE    |                    RESERVED                   |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             VALUE                             |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, PartialEq, Debug, Encode, Decode)]
#[encdec(error = "ApduError")]
pub struct TxInfo {
    /// Current transaction engine state
    pub state: TxState,

    /// Reserved for future use (maintains 32-bit field alignment)
    #[encdec(with = "arr")]
    reserved: [u8; 3],

    /// Value associated with current state (zero otherwise)
    pub value: u32,
}

impl TxInfo {
    pub fn new(state: TxState, value: u32) -> Self {
        Self {
            state,
            reserved: [0u8; 3],
            value,
        }
    }
}

/// Transaction failure, reported alongside an error status
/// when a signing operation is aborted
///
/// ## Encoding:
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     KIND      |     CODE      |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, PartialEq, Debug, Encode, Decode)]
#[encdec(error = "ApduError")]
pub struct TxFailure {
    /// Failure category
    pub kind: FailureKind,
    /// Detailed error code
    pub code: u8,
}

/// Transaction response, either a [`TxInfo`] or a [`TxRequest`]
/// depending on the engine state
#[derive(Clone, PartialEq, Debug)]
pub enum TxResponse {
    Info(TxInfo),
    Request(TxRequest),
}

impl TxResponse {
    /// Fetch engine state from response
    pub fn state(&self) -> TxState {
        match self {
            TxResponse::Info(i) => i.state,
            TxResponse::Request(r) => r.state,
        }
    }
}

impl Encode for TxResponse {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, ApduError> {
        match self {
            TxResponse::Info(i) => i.encode_len(),
            TxResponse::Request(r) => r.encode_len(),
        }
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, ApduError> {
        match self {
            TxResponse::Info(i) => i.encode(buff),
            TxResponse::Request(r) => r.encode(buff),
        }
    }
}

impl DecodeOwned for TxResponse {
    type Output = Self;
    type Error = ApduError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), ApduError> {
        let (state, _) = TxState::decode_owned(buff)?;

        match state.is_request() {
            true => {
                let (r, n) = TxRequest::decode_owned(buff)?;
                Ok((TxResponse::Request(r), n))
            }
            false => {
                let (i, n) = TxInfo::decode(buff)?;
                Ok((TxResponse::Info(i), n))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use rand::random;

    use super::*;
    use crate::test::encode_decode_apdu;

    #[test]
    fn encode_decode_tx_init() {
        let apdu = TxInit::new("Testnet", random(), random(), 2, random()).unwrap();

        let mut buff = [0u8; 256];
        let n = encode_decode_apdu(&mut buff, &apdu);

        assert_eq!(n, 20 + 7);
    }

    #[test]
    fn decode_tx_init_invalid_coin() {
        assert!(TxInit::new("AVeryLongCoinName", 1, 1, 1, 0).is_err());

        let apdu = TxInit::new("Bitcoin", 1, 1, 1, 0).unwrap();

        let mut buff = [0u8; 64];
        let n = apdu.encode(&mut buff).unwrap();

        // COIN_LEN follows the four 32-bit header fields
        buff[16] = (MAX_COIN_NAME_LEN + 1) as u8;
        assert!(matches!(
            TxInit::decode(&buff[..n]),
            Err(ApduError::InvalidLength)
        ));

        // COIN_NAME starts after the reserved bytes
        buff[16] = 7;
        buff[20] = 0xff;
        assert!(matches!(
            TxInit::decode(&buff[..n]),
            Err(ApduError::InvalidUtf8)
        ));
    }

    #[test]
    fn encode_decode_tx_info() {
        let apdu = TxInfo::new(TxState::Pending, random());

        let mut buff = [0u8; 256];
        let n = encode_decode_apdu(&mut buff, &apdu);

        assert_eq!(n, 8);
    }

    #[test]
    fn encode_decode_tx_failure() {
        let apdu = TxFailure {
            kind: FailureKind::NotEnoughFunds,
            code: random(),
        };

        let mut buff = [0u8; 16];
        let n = encode_decode_apdu(&mut buff, &apdu);

        assert_eq!(n, 2);
    }

    #[test]
    fn encode_decode_tx_response() {
        let mut buff = [0u8; 256];

        let info = TxResponse::Info(TxInfo::new(TxState::TxDenied, 0));
        encode_decode_apdu(&mut buff, &info);

        let req = TxResponse::Request(TxRequest::new(
            TxState::Output,
            DataRequest::new(RequestType::Output, random()),
        ));
        encode_decode_apdu(&mut buff, &req);
    }
}
