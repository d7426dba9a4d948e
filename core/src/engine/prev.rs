// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Previous (funding) transaction replay, proving the amount of a legacy input

use zeroize::Zeroize;

use crate::{
    apdu::tx::{PrevInput, TxOutputBin, TxPrevMeta, MAX_EXTRA_DATA_CHUNK},
    coins::CoinInfo,
    tx::{Hasher, Stage, TxStream},
};

use super::{Error, PrevState};

/// Replay progress
#[derive(Clone, PartialEq, Debug)]
pub enum PrevStep {
    /// Next previous transaction object required
    Next(PrevState),
    /// Replay complete and verified, with the amount of the spent output
    Done(u64),
}

/// Previous transaction verifier, streams a funding transaction through
/// a hasher to prove the spent output amount
pub struct PrevTxVerifier {
    prev_hash: [u8; 32],
    prev_index: u32,
    declared_amount: Option<u64>,

    lock_time: u32,
    extra_data_len: u32,

    stream: TxStream,
    hasher: Hasher,

    amount: Option<u64>,
}

impl PrevTxVerifier {
    /// Create a new verifier for the funding transaction `prev_hash`,
    /// spent at output `prev_index`
    pub fn new(prev_hash: [u8; 32], prev_index: u32, declared_amount: Option<u64>) -> Self {
        Self {
            prev_hash,
            prev_index,
            declared_amount,
            lock_time: 0,
            extra_data_len: 0,
            stream: TxStream::new(0, 0, false),
            hasher: Hasher::new(),
            amount: None,
        }
    }

    /// Fetch hash of the transaction being replayed
    pub fn prev_hash(&self) -> &[u8; 32] {
        &self.prev_hash
    }

    /// Fetch the (offset, length) of the next extra data chunk
    pub fn extra_data_request(&self, offset: u32) -> (u32, u32) {
        let remaining = self.extra_data_len.saturating_sub(offset);
        (offset, remaining.min(MAX_EXTRA_DATA_CHUNK as u32))
    }

    /// Apply previous transaction metadata
    #[cfg_attr(feature = "noinline", inline(never))]
    pub fn meta(&mut self, coin: &CoinInfo, m: &TxPrevMeta) -> Result<PrevState, Error> {
        if m.outputs_count == 0 || self.prev_index >= m.outputs_count {
            #[cfg(feature = "log")]
            log::warn!(
                "spent output {} not in previous tx with {} outputs",
                self.prev_index,
                m.outputs_count
            );

            return Err(Error::InvalidPrevOutputs);
        }

        if m.extra_data_len > 0 && !coin.extra_data {
            return Err(Error::ExtraDataNotEnabled);
        }

        self.lock_time = m.lock_time;
        self.extra_data_len = m.extra_data_len;
        self.stream =
            TxStream::new(m.inputs_count, m.outputs_count, false).with_extra_data(m.extra_data_len);

        self.stream.header(&mut self.hasher, m.version)?;

        match m.inputs_count {
            0 => Ok(PrevState::Output(0)),
            _ => Ok(PrevState::Input(0)),
        }
    }

    /// Apply a previous transaction input
    #[cfg_attr(feature = "noinline", inline(never))]
    pub fn input(&mut self, index: u32, i: &PrevInput) -> Result<PrevState, Error> {
        self.stream.input(
            &mut self.hasher,
            &i.prev_hash,
            i.prev_index,
            &i.script_sig,
            i.sequence,
        )?;

        match self.stream.stage() {
            Stage::Inputs => Ok(PrevState::Input(index + 1)),
            _ => Ok(PrevState::Output(0)),
        }
    }

    /// Apply a previous transaction output
    #[cfg_attr(feature = "noinline", inline(never))]
    pub fn output(&mut self, index: u32, o: &TxOutputBin) -> Result<PrevStep, Error> {
        self.stream.output(&mut self.hasher, o)?;

        if index == self.prev_index {
            if let Some(a) = self.declared_amount {
                if a != o.amount {
                    #[cfg(feature = "log")]
                    log::warn!("declared amount {} does not match spent output {}", a, o.amount);

                    return Err(Error::InvalidPrevOutputs);
                }
            }

            self.amount = Some(o.amount);
        }

        match self.stream.stage() {
            Stage::Outputs => Ok(PrevStep::Next(PrevState::Output(index + 1))),
            _ => self.footer(),
        }
    }

    /// Apply a chunk of previous transaction extra data
    #[cfg_attr(feature = "noinline", inline(never))]
    pub fn extra_data(&mut self, offset: u32, data: &[u8]) -> Result<PrevStep, Error> {
        let (o, n) = self.extra_data_request(self.stream.extra_data_written());

        if offset != o || data.len() != n as usize {
            #[cfg(feature = "log")]
            log::warn!(
                "extra data chunk ({}, {}) expected ({}, {})",
                offset,
                data.len(),
                o,
                n
            );

            return Err(Error::InvalidExtraData);
        }

        self.stream.extra_data(&mut self.hasher, data)?;

        match self.stream.stage() {
            Stage::ExtraData => Ok(PrevStep::Next(PrevState::ExtraData(
                self.stream.extra_data_written(),
            ))),
            _ => self.finish(),
        }
    }

    fn footer(&mut self) -> Result<PrevStep, Error> {
        self.stream.footer(&mut self.hasher, self.lock_time)?;

        match self.stream.stage() {
            Stage::ExtraData => Ok(PrevStep::Next(PrevState::ExtraData(0))),
            _ => self.finish(),
        }
    }

    /// Check the computed transaction id against the expected hash
    fn finish(&mut self) -> Result<PrevStep, Error> {
        let h = core::mem::take(&mut self.hasher);

        let mut txid = h.finalize_double();
        txid.reverse();

        if txid != self.prev_hash {
            #[cfg(feature = "log")]
            log::warn!("previous transaction hash mismatch");

            return Err(Error::InvalidPrevHash);
        }

        match self.amount {
            Some(a) => Ok(PrevStep::Done(a)),
            None => Err(Error::InvalidPrevOutputs),
        }
    }
}

impl Zeroize for PrevTxVerifier {
    fn zeroize(&mut self) {
        self.declared_amount = None;
        self.amount = None;
        self.hasher.zeroize();
    }
}

impl Drop for PrevTxVerifier {
    fn drop(&mut self) {
        self.zeroize();
    }
}
