// Copyright (c) 2022-2023 The MobileCoin Foundation

use encdec::{DecodeOwned, Encode};
use heapless::Vec;
use ledger_proto::ApduStatic;

use super::types::*;
use crate::{
    helpers::{Reader, Writer},
    ApduError, Instruction, BTC_APDU_CLA,
};

/// Input of the transaction being signed
#[derive(Clone, PartialEq, Debug)]
pub struct TxInput {
    /// Hash of the funding transaction (display / big-endian order)
    pub prev_hash: [u8; 32],
    /// Index of the spent output in the funding transaction
    pub prev_index: u32,
    /// Input sequence number
    pub sequence: u32,
    /// Script type used to spend the output
    pub script_type: InputScriptType,
    /// BIP32 path of the spending key
    pub address_n: Bip32Path,
    /// Amount of the spent output (required for segwit / BIP143 inputs)
    pub amount: Option<u64>,
    /// Multisig descriptor for multisig inputs
    pub multisig: Option<Multisig>,
}

impl TxInput {
    /// Create a single-key input with the default sequence
    pub fn new(
        prev_hash: [u8; 32],
        prev_index: u32,
        script_type: InputScriptType,
        address_n: &[u32],
    ) -> Result<Self, ApduError> {
        Ok(Self {
            prev_hash,
            prev_index,
            sequence: 0xffff_ffff,
            script_type,
            address_n: Vec::from_slice(address_n).map_err(|_| ApduError::InvalidLength)?,
            amount: None,
            multisig: None,
        })
    }

    /// Set the spent amount
    pub fn with_amount(mut self, amount: u64) -> Self {
        self.amount = Some(amount);
        self
    }

    /// Attach a multisig descriptor
    pub fn with_multisig(mut self, multisig: Multisig) -> Self {
        self.multisig = Some(multisig);
        self
    }
}

bitflags::bitflags! {
    /// Flags for optional [`TxInputAck`] fields
    pub struct TxInputFlags: u8 {
        const HAS_AMOUNT = 1 << 0;
        const HAS_MULTISIG = 1 << 1;
    }
}

/// Supply an input in response to an input request
/// (phase one, legacy signing re-stream, or segwit passes)
///
/// ## Encoding:
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                          INPUT_INDEX                          |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                                                               |
/// /                      PREV_HASH (32-byte)                      /
/// |                                                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                          PREV_INDEX                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           SEQUENCE                            |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  SCRIPT_TYPE  |     FLAGS     |   PATH_LEN    |   RESERVED    |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                    AMOUNT (u64, if HAS_AMOUNT)                |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /                   PATH (u32 * PATH_LEN)                       /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /                  MULTISIG (if HAS_MULTISIG)                   /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, PartialEq, Debug)]
pub struct TxInputAck {
    /// Index of the requested input
    pub index: u32,
    /// Input object
    pub input: TxInput,
}

impl ApduStatic for TxInputAck {
    const CLA: u8 = BTC_APDU_CLA;
    const INS: u8 = Instruction::TxInput as u8;
}

impl TxInputAck {
    pub fn new(index: u32, input: TxInput) -> Self {
        Self { index, input }
    }
}

impl Encode for TxInputAck {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, ApduError> {
        let i = &self.input;

        let mut n = 4 + 32 + 4 + 4 + 4 + i.address_n.len() * 4;
        if i.amount.is_some() {
            n += 8;
        }
        if let Some(m) = &i.multisig {
            n += m.encode_len();
        }

        Ok(n)
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, ApduError> {
        let i = &self.input;
        let mut w = Writer::new(buff);

        let mut flags = TxInputFlags::empty();
        flags.set(TxInputFlags::HAS_AMOUNT, i.amount.is_some());
        flags.set(TxInputFlags::HAS_MULTISIG, i.multisig.is_some());

        w.put_u32(self.index)?;
        w.put_bytes(&i.prev_hash)?;
        w.put_u32(i.prev_index)?;
        w.put_u32(i.sequence)?;

        w.put_u8(i.script_type as u8)?;
        w.put_u8(flags.bits())?;
        w.put_u8(i.address_n.len() as u8)?;
        w.put_u8(0)?;

        if let Some(a) = i.amount {
            w.put_u64(a)?;
        }

        w.put_path(&i.address_n)?;

        if let Some(m) = &i.multisig {
            m.write(&mut w)?;
        }

        Ok(w.len())
    }
}

impl DecodeOwned for TxInputAck {
    type Output = Self;
    type Error = ApduError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), ApduError> {
        let mut r = Reader::new(buff);

        let index = r.get_u32()?;
        let prev_hash = r.get_array::<32>()?;
        let prev_index = r.get_u32()?;
        let sequence = r.get_u32()?;

        let (script_type, _) = InputScriptType::decode_owned(r.get_bytes(1)?)?;
        let flags = TxInputFlags::from_bits_truncate(r.get_u8()?);
        let path_len = r.get_u8()? as usize;
        let _reserved = r.get_u8()?;

        let amount = match flags.contains(TxInputFlags::HAS_AMOUNT) {
            true => Some(r.get_u64()?),
            false => None,
        };

        let address_n = r.get_path::<MAX_PATH_LEN>(path_len)?;

        let multisig = match flags.contains(TxInputFlags::HAS_MULTISIG) {
            true => Some(Multisig::read(&mut r)?),
            false => None,
        };

        let input = TxInput {
            prev_hash,
            prev_index,
            sequence,
            script_type,
            address_n,
            amount,
            multisig,
        };

        Ok((Self { index, input }, r.len()))
    }
}

/// Input of a previous (funding) transaction, used only for hash replay
#[derive(Clone, PartialEq, Debug)]
pub struct PrevInput {
    /// Hash of the spent transaction (display order)
    pub prev_hash: [u8; 32],
    /// Index of the spent output
    pub prev_index: u32,
    /// Input sequence number
    pub sequence: u32,
    /// Raw scriptSig
    pub script_sig: Vec<u8, MAX_SCRIPT_SIG_LEN>,
}

/// Supply a previous transaction input in response to a previous input request
///
/// ## Encoding:
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                          INPUT_INDEX                          |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /                      PREV_HASH (32-byte)                      /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                          PREV_INDEX                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           SEQUENCE                            |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |         SCRIPT_LEN            |           RESERVED            |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /                    SCRIPT_SIG (SCRIPT_LEN)                    /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, PartialEq, Debug)]
pub struct TxPrevInputAck {
    /// Index of the requested previous input
    pub index: u32,
    /// Previous input object
    pub input: PrevInput,
}

impl ApduStatic for TxPrevInputAck {
    const CLA: u8 = BTC_APDU_CLA;
    const INS: u8 = Instruction::TxPrevInput as u8;
}

impl TxPrevInputAck {
    pub fn new(index: u32, input: PrevInput) -> Self {
        Self { index, input }
    }
}

impl Encode for TxPrevInputAck {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, ApduError> {
        Ok(4 + 32 + 4 + 4 + 4 + self.input.script_sig.len())
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, ApduError> {
        let i = &self.input;
        let mut w = Writer::new(buff);

        w.put_u32(self.index)?;
        w.put_bytes(&i.prev_hash)?;
        w.put_u32(i.prev_index)?;
        w.put_u32(i.sequence)?;
        w.put_u16(i.script_sig.len() as u16)?;
        w.put_u16(0)?;
        w.put_bytes(&i.script_sig)?;

        Ok(w.len())
    }
}

impl DecodeOwned for TxPrevInputAck {
    type Output = Self;
    type Error = ApduError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), ApduError> {
        let mut r = Reader::new(buff);

        let index = r.get_u32()?;
        let prev_hash = r.get_array::<32>()?;
        let prev_index = r.get_u32()?;
        let sequence = r.get_u32()?;
        let script_len = r.get_u16()? as usize;
        let _reserved = r.get_u16()?;
        let script_sig = r.get_vec::<MAX_SCRIPT_SIG_LEN>(script_len)?;

        let input = PrevInput {
            prev_hash,
            prev_index,
            sequence,
            script_sig,
        };

        Ok((Self { index, input }, r.len()))
    }
}
