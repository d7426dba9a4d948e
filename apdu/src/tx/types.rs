// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Shared transaction field types and bounds

use heapless::Vec;
use num_enum::TryFromPrimitive;
use strum::{Display, EnumIter, EnumString};

use crate::{
    encdec_enum,
    helpers::{Reader, Writer},
    ApduError,
};

/// Maximum BIP32 derivation path depth
pub const MAX_PATH_LEN: usize = 8;

/// Maximum number of multisig cosigners
pub const MAX_MULTISIG_KEYS: usize = 15;

/// Maximum DER signature length (without sighash byte)
pub const MAX_SIG_LEN: usize = 72;

/// Maximum scriptSig length for previous transaction inputs (standardness limit)
pub const MAX_SCRIPT_SIG_LEN: usize = 1650;

/// Maximum script_pubkey length for previous transaction outputs
pub const MAX_SCRIPT_PUBKEY_LEN: usize = 520;

/// Maximum address string length (bech32 limit)
pub const MAX_ADDRESS_LEN: usize = 90;

/// Maximum OP_RETURN payload
pub const MAX_OP_RETURN_LEN: usize = 80;

/// Maximum previous transaction extra data chunk
pub const MAX_EXTRA_DATA_CHUNK: usize = 128;

/// Maximum serialized chunk returned to the host
pub const MAX_SERIALIZED_LEN: usize = 2048;

/// Maximum coin name length
pub const MAX_COIN_NAME_LEN: usize = 16;

/// Compressed secp256k1 public key
pub type PublicKey = [u8; 33];

/// BIP32 derivation path
pub type Bip32Path = Vec<u32, MAX_PATH_LEN>;

/// DER encoded signature
pub type SignatureBytes = Vec<u8, MAX_SIG_LEN>;

/// Input script types
#[derive(Copy, Clone, PartialEq, Debug, Display, EnumString, EnumIter, TryFromPrimitive)]
#[repr(u8)]
pub enum InputScriptType {
    /// P2PKH
    SpendAddress = 0,
    /// P2SH multisig
    SpendMultisig = 1,
    /// Native segwit (P2WPKH or P2WSH multisig)
    SpendWitness = 3,
    /// Segwit wrapped in P2SH
    SpendP2shWitness = 4,
}

encdec_enum!(InputScriptType);

impl InputScriptType {
    /// Check whether the input spends a segwit output
    pub fn is_segwit(&self) -> bool {
        matches!(self, Self::SpendWitness | Self::SpendP2shWitness)
    }

    /// Check whether a multisig descriptor may accompany this input
    pub fn allows_multisig(&self) -> bool {
        matches!(
            self,
            Self::SpendMultisig | Self::SpendWitness | Self::SpendP2shWitness
        )
    }
}

/// Output script types
#[derive(Copy, Clone, PartialEq, Debug, Display, EnumString, EnumIter, TryFromPrimitive)]
#[repr(u8)]
pub enum OutputScriptType {
    /// P2PKH (or an address of any supported kind)
    PayToAddress = 0,
    /// P2SH multisig
    PayToMultisig = 2,
    /// OP_RETURN data output
    PayToOpReturn = 3,
    /// Native segwit
    PayToWitness = 4,
    /// Segwit wrapped in P2SH
    PayToP2shWitness = 5,
}

encdec_enum!(OutputScriptType);

impl OutputScriptType {
    /// Check whether the output type may be used for change
    pub fn allows_change(&self) -> bool {
        !matches!(self, Self::PayToOpReturn)
    }
}

/// Multisig descriptor, cosigner keys with one signature slot per key
/// (empty where the cosigner has not yet signed)
///
/// ## Encoding:
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |       M       |       N       |           RESERVED            |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                   PUBKEY_0 (33-byte, compressed)              |
/// |                              ...                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   SIG_LEN_0   |                SIG_0 (DER, SIG_LEN_0)         /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /                   ... repeated for N keys                     /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, PartialEq, Debug)]
pub struct Multisig {
    /// Required signature count
    pub m: u8,
    /// Cosigner public keys, in script order
    pub pubkeys: Vec<PublicKey, MAX_MULTISIG_KEYS>,
    /// Signature slots, one per public key
    pub signatures: Vec<SignatureBytes, MAX_MULTISIG_KEYS>,
}

impl Multisig {
    /// Create a new multisig descriptor with empty signature slots
    pub fn new(m: u8, pubkeys: &[PublicKey]) -> Result<Self, ApduError> {
        let pubkeys = Vec::from_slice(pubkeys).map_err(|_| ApduError::InvalidLength)?;

        let mut signatures = Vec::new();
        for _ in 0..pubkeys.len() {
            signatures
                .push(Vec::new())
                .map_err(|_| ApduError::InvalidLength)?;
        }

        Ok(Self {
            m,
            pubkeys,
            signatures,
        })
    }

    /// Number of cosigners
    pub fn n(&self) -> usize {
        self.pubkeys.len()
    }

    pub(crate) fn encode_len(&self) -> usize {
        4 + self
            .pubkeys
            .iter()
            .zip(self.signatures.iter())
            .map(|(_k, s)| 33 + 1 + s.len())
            .sum::<usize>()
    }

    pub(crate) fn write(&self, w: &mut Writer) -> Result<(), ApduError> {
        if self.pubkeys.len() != self.signatures.len() {
            return Err(ApduError::InvalidEncoding);
        }

        w.put_u8(self.m)?;
        w.put_u8(self.pubkeys.len() as u8)?;
        w.put_u16(0)?;

        for (k, s) in self.pubkeys.iter().zip(self.signatures.iter()) {
            w.put_bytes(k)?;
            w.put_u8(s.len() as u8)?;
            w.put_bytes(s)?;
        }

        Ok(())
    }

    pub(crate) fn read(r: &mut Reader) -> Result<Self, ApduError> {
        let m = r.get_u8()?;
        let n = r.get_u8()? as usize;
        let _reserved = r.get_u16()?;

        if n > MAX_MULTISIG_KEYS {
            return Err(ApduError::InvalidLength);
        }

        let mut pubkeys = Vec::new();
        let mut signatures = Vec::new();

        for _ in 0..n {
            let k = r.get_array::<33>()?;
            let l = r.get_u8()? as usize;
            let s = r.get_vec::<MAX_SIG_LEN>(l)?;

            pubkeys.push(k).map_err(|_| ApduError::InvalidLength)?;
            signatures.push(s).map_err(|_| ApduError::InvalidLength)?;
        }

        Ok(Self {
            m,
            pubkeys,
            signatures,
        })
    }
}
