// Copyright (c) 2022-2023 The MobileCoin Foundation

use encdec::{DecodeOwned, Encode};
use heapless::{String, Vec};
use ledger_proto::ApduStatic;

use super::types::*;
use crate::{
    helpers::{Reader, Writer},
    ApduError, Instruction, BTC_APDU_CLA,
};

/// Output of the transaction being signed
#[derive(Clone, PartialEq, Debug)]
pub struct TxOutput {
    /// Output amount in base units
    pub amount: u64,
    /// Output script type
    pub script_type: OutputScriptType,
    /// Destination address (external outputs)
    pub address: Option<String<MAX_ADDRESS_LEN>>,
    /// BIP32 path (outputs owned by this wallet, empty otherwise)
    pub address_n: Bip32Path,
    /// Multisig descriptor for multisig outputs
    pub multisig: Option<Multisig>,
    /// OP_RETURN payload
    pub op_return_data: Option<Vec<u8, MAX_OP_RETURN_LEN>>,
}

impl TxOutput {
    /// Create an output paying to an address
    pub fn address(amount: u64, address: &str) -> Result<Self, ApduError> {
        let mut a = String::new();
        a.push_str(address).map_err(|_| ApduError::InvalidLength)?;

        Ok(Self {
            amount,
            script_type: OutputScriptType::PayToAddress,
            address: Some(a),
            address_n: Vec::new(),
            multisig: None,
            op_return_data: None,
        })
    }

    /// Create an output paying to a key owned by this wallet
    pub fn path(
        amount: u64,
        script_type: OutputScriptType,
        address_n: &[u32],
    ) -> Result<Self, ApduError> {
        Ok(Self {
            amount,
            script_type,
            address: None,
            address_n: Vec::from_slice(address_n).map_err(|_| ApduError::InvalidLength)?,
            multisig: None,
            op_return_data: None,
        })
    }

    /// Create an OP_RETURN data output
    pub fn op_return(data: &[u8]) -> Result<Self, ApduError> {
        Ok(Self {
            amount: 0,
            script_type: OutputScriptType::PayToOpReturn,
            address: None,
            address_n: Vec::new(),
            multisig: None,
            op_return_data: Some(Vec::from_slice(data).map_err(|_| ApduError::InvalidLength)?),
        })
    }

    /// Attach a multisig descriptor
    pub fn with_multisig(mut self, multisig: Multisig) -> Self {
        self.multisig = Some(multisig);
        self
    }
}

bitflags::bitflags! {
    /// Flags for optional [`TxOutputAck`] fields
    pub struct TxOutputFlags: u8 {
        const HAS_ADDRESS = 1 << 0;
        const HAS_MULTISIG = 1 << 1;
        const HAS_OP_RETURN = 1 << 2;
    }
}

/// Supply an output in response to an output request
///
/// DATA contains the address string where `HAS_ADDRESS` is set,
/// or the OP_RETURN payload where `HAS_OP_RETURN` is set (these are exclusive).
///
/// ## Encoding:
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                          OUTPUT_INDEX                         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                        AMOUNT (u64)                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  SCRIPT_TYPE  |     FLAGS     |   PATH_LEN    |   DATA_LEN    |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /                   PATH (u32 * PATH_LEN)                       /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /                         DATA (DATA_LEN)                       /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /                  MULTISIG (if HAS_MULTISIG)                   /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, PartialEq, Debug)]
pub struct TxOutputAck {
    /// Index of the requested output
    pub index: u32,
    /// Output object
    pub output: TxOutput,
}

impl ApduStatic for TxOutputAck {
    const CLA: u8 = BTC_APDU_CLA;
    const INS: u8 = Instruction::TxOutput as u8;
}

impl TxOutputAck {
    pub fn new(index: u32, output: TxOutput) -> Self {
        Self { index, output }
    }

    fn data(&self) -> Result<&[u8], ApduError> {
        let o = &self.output;
        match (&o.address, &o.op_return_data) {
            (Some(a), None) => Ok(a.as_bytes()),
            (None, Some(d)) => Ok(d.as_slice()),
            (None, None) => Ok(&[]),
            _ => Err(ApduError::InvalidEncoding),
        }
    }
}

impl Encode for TxOutputAck {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, ApduError> {
        let o = &self.output;

        let mut n = 4 + 8 + 4 + o.address_n.len() * 4 + self.data()?.len();
        if let Some(m) = &o.multisig {
            n += m.encode_len();
        }

        Ok(n)
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, ApduError> {
        let o = &self.output;
        let data = self.data()?;
        let mut w = Writer::new(buff);

        let mut flags = TxOutputFlags::empty();
        flags.set(TxOutputFlags::HAS_ADDRESS, o.address.is_some());
        flags.set(TxOutputFlags::HAS_MULTISIG, o.multisig.is_some());
        flags.set(TxOutputFlags::HAS_OP_RETURN, o.op_return_data.is_some());

        w.put_u32(self.index)?;
        w.put_u64(o.amount)?;

        w.put_u8(o.script_type as u8)?;
        w.put_u8(flags.bits())?;
        w.put_u8(o.address_n.len() as u8)?;
        w.put_u8(data.len() as u8)?;

        w.put_path(&o.address_n)?;
        w.put_bytes(data)?;

        if let Some(m) = &o.multisig {
            m.write(&mut w)?;
        }

        Ok(w.len())
    }
}

impl DecodeOwned for TxOutputAck {
    type Output = Self;
    type Error = ApduError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), ApduError> {
        let mut r = Reader::new(buff);

        let index = r.get_u32()?;
        let amount = r.get_u64()?;

        let (script_type, _) = OutputScriptType::decode_owned(r.get_bytes(1)?)?;
        let flags = TxOutputFlags::from_bits_truncate(r.get_u8()?);
        let path_len = r.get_u8()? as usize;
        let data_len = r.get_u8()? as usize;

        if flags.contains(TxOutputFlags::HAS_ADDRESS | TxOutputFlags::HAS_OP_RETURN) {
            return Err(ApduError::InvalidEncoding);
        }

        let address_n = r.get_path::<MAX_PATH_LEN>(path_len)?;
        let data = r.get_bytes(data_len)?;

        let mut address = None;
        let mut op_return_data = None;

        if flags.contains(TxOutputFlags::HAS_ADDRESS) {
            let s = core::str::from_utf8(data).map_err(|_| ApduError::InvalidUtf8)?;

            let mut a = String::new();
            a.push_str(s).map_err(|_| ApduError::InvalidLength)?;
            address = Some(a);
        } else if flags.contains(TxOutputFlags::HAS_OP_RETURN) {
            op_return_data = Some(Vec::from_slice(data).map_err(|_| ApduError::InvalidLength)?);
        }

        let multisig = match flags.contains(TxOutputFlags::HAS_MULTISIG) {
            true => Some(Multisig::read(&mut r)?),
            false => None,
        };

        let output = TxOutput {
            amount,
            script_type,
            address,
            address_n,
            multisig,
            op_return_data,
        };

        Ok((Self { index, output }, r.len()))
    }
}

/// Compiled output, an amount and serialized locking script.
///
/// Used for previous transaction outputs and by the engine for
/// outputs of the transaction being signed once compiled.
#[derive(Clone, PartialEq, Debug)]
pub struct TxOutputBin {
    /// Output amount in base units
    pub amount: u64,
    /// Serialized locking script
    pub script_pubkey: Vec<u8, MAX_SCRIPT_PUBKEY_LEN>,
}

impl TxOutputBin {
    pub fn new(amount: u64, script_pubkey: &[u8]) -> Result<Self, ApduError> {
        Ok(Self {
            amount,
            script_pubkey: Vec::from_slice(script_pubkey).map_err(|_| ApduError::InvalidLength)?,
        })
    }
}

/// Supply a previous transaction output in response to a previous output request
///
/// ## Encoding:
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                          OUTPUT_INDEX                         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                        AMOUNT (u64)                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |          SCRIPT_LEN           |           RESERVED            |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /                 SCRIPT_PUBKEY (SCRIPT_LEN)                    /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, PartialEq, Debug)]
pub struct TxPrevOutputAck {
    /// Index of the requested previous output
    pub index: u32,
    /// Previous output object
    pub output: TxOutputBin,
}

impl ApduStatic for TxPrevOutputAck {
    const CLA: u8 = BTC_APDU_CLA;
    const INS: u8 = Instruction::TxPrevOutput as u8;
}

impl TxPrevOutputAck {
    pub fn new(index: u32, output: TxOutputBin) -> Self {
        Self { index, output }
    }
}

impl Encode for TxPrevOutputAck {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, ApduError> {
        Ok(4 + 8 + 4 + self.output.script_pubkey.len())
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, ApduError> {
        let mut w = Writer::new(buff);

        w.put_u32(self.index)?;
        w.put_u64(self.output.amount)?;
        w.put_u16(self.output.script_pubkey.len() as u16)?;
        w.put_u16(0)?;
        w.put_bytes(&self.output.script_pubkey)?;

        Ok(w.len())
    }
}

impl DecodeOwned for TxPrevOutputAck {
    type Output = Self;
    type Error = ApduError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), ApduError> {
        let mut r = Reader::new(buff);

        let index = r.get_u32()?;
        let amount = r.get_u64()?;
        let script_len = r.get_u16()? as usize;
        let _reserved = r.get_u16()?;
        let script_pubkey = r.get_vec::<MAX_SCRIPT_PUBKEY_LEN>(script_len)?;

        let output = TxOutputBin {
            amount,
            script_pubkey,
        };

        Ok((Self { index, output }, r.len()))
    }
}
