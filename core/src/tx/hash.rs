// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Hashing helpers and transaction commitments

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use super::serialize::write_output;
use crate::{
    apdu::tx::{TxInput, TxOutputBin},
    engine::Error,
};

/// Running SHA256 hasher
#[derive(Clone, Debug, Default)]
pub struct Hasher {
    inner: Sha256,
}

impl Hasher {
    pub fn new() -> Self {
        Self {
            inner: Sha256::new(),
        }
    }

    pub fn update(&mut self, d: &[u8]) {
        self.inner.update(d);
    }

    /// Single SHA256
    pub fn finalize(self) -> [u8; 32] {
        self.inner.finalize().into()
    }

    /// Double SHA256, as used for transaction ids and signature digests
    pub fn finalize_double(self) -> [u8; 32] {
        Sha256::digest(self.inner.finalize()).into()
    }
}

/// Resets the running state, discarding absorbed data
impl Zeroize for Hasher {
    fn zeroize(&mut self) {
        self.inner = Sha256::new();
    }
}

/// SHA256 of the provided data
pub fn sha256(d: &[u8]) -> [u8; 32] {
    Sha256::digest(d).into()
}

/// RIPEMD160(SHA256(d)), as used for public key and script hashes
pub fn hash160(d: &[u8]) -> [u8; 20] {
    Ripemd160::digest(Sha256::digest(d)).into()
}

/// Write the check encoding of an input to the provided hasher
///
/// This covers every input field that affects signing, so that
/// inputs re-supplied in later passes can be matched against phase one.
pub fn hash_input_check(h: &mut Hasher, i: &TxInput) {
    h.update(&i.prev_hash);
    h.update(&i.prev_index.to_le_bytes());
    h.update(&(i.script_type as u32).to_le_bytes());

    h.update(&(i.address_n.len() as u32).to_le_bytes());
    for p in i.address_n.iter() {
        h.update(&p.to_le_bytes());
    }

    h.update(&i.sequence.to_le_bytes());
    h.update(&i.amount.unwrap_or(0).to_le_bytes());

    match &i.multisig {
        Some(m) => {
            h.update(&[m.m, m.pubkeys.len() as u8]);
            for k in m.pubkeys.iter() {
                h.update(k);
            }
        }
        None => h.update(&[0, 0]),
    }
}

/// Write the check encoding of a compiled output to the provided hasher
pub fn hash_output_check(h: &mut Hasher, o: &TxOutputBin) -> Result<(), Error> {
    write_output(h, o)
}

/// Running commitments over the transaction, built during phase one
#[derive(Clone, Debug, Default)]
pub struct CommitmentSet {
    prevouts: Hasher,
    sequence: Hasher,
    outputs: Hasher,
    check: Hasher,
    inputs_check: Hasher,
}

impl CommitmentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an input to the commitment set
    pub fn add_input(&mut self, i: &TxInput) {
        let mut h = i.prev_hash;
        h.reverse();

        self.prevouts.update(&h);
        self.prevouts.update(&i.prev_index.to_le_bytes());

        self.sequence.update(&i.sequence.to_le_bytes());

        hash_input_check(&mut self.check, i);
        hash_input_check(&mut self.inputs_check, i);
    }

    /// Add a compiled output to the commitment set
    pub fn add_output(&mut self, o: &TxOutputBin) -> Result<(), Error> {
        write_output(&mut self.outputs, o)?;
        hash_output_check(&mut self.check, o)
    }

    /// Finalise commitments
    pub fn finalize(self) -> Commitments {
        Commitments {
            hash_prevouts: self.prevouts.finalize_double(),
            hash_sequence: self.sequence.finalize_double(),
            hash_outputs: self.outputs.finalize_double(),
            hash_check: self.check.finalize(),
            hash_inputs_check: self.inputs_check.finalize(),
        }
    }
}

/// Commitment snapshot, taken at the end of phase one
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Commitments {
    /// BIP143 `hashPrevouts`
    pub hash_prevouts: [u8; 32],
    /// BIP143 `hashSequence`
    pub hash_sequence: [u8; 32],
    /// BIP143 `hashOutputs`
    pub hash_outputs: [u8; 32],
    /// Digest over inputs and outputs, checked against later passes
    pub hash_check: [u8; 32],
    /// Digest over inputs only, checked against the witness pass
    pub hash_inputs_check: [u8; 32],
}

impl Zeroize for Commitments {
    fn zeroize(&mut self) {
        self.hash_prevouts.zeroize();
        self.hash_sequence.zeroize();
        self.hash_outputs.zeroize();
        self.hash_check.zeroize();
        self.hash_inputs_check.zeroize();
    }
}
