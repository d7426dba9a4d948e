// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Transaction weight estimation, used for fee threshold checks

use super::{script::op_push_len, varint_len};
use crate::apdu::tx::{InputScriptType, TxInput, TxOutputBin};

const TXSIZE_HEADER: u32 = 4;
const TXSIZE_FOOTER: u32 = 4;
const TXSIZE_INPUT: u32 = 40;
const TXSIZE_OUTPUT: u32 = 8;
const TXSIZE_PUBKEY: u32 = 33;
const TXSIZE_SIGNATURE: u32 = 72;
const TXSIZE_MULTISIGSCRIPT: u32 = 3;
const TXSIZE_WITNESSPKHASH: u32 = 22;
const TXSIZE_WITNESSSCRIPT: u32 = 34;
const TXSIZE_SEGWIT_OVERHEAD: u32 = 2;

/// Running transaction weight estimate
#[derive(Clone, PartialEq, Debug)]
pub struct TxWeight {
    weight: u32,
    inputs_count: u32,
    segwit: bool,
}

impl TxWeight {
    /// Start a weight estimate for a transaction with the provided counts
    pub fn new(inputs_count: u32, outputs_count: u32) -> Self {
        let size = TXSIZE_HEADER
            + TXSIZE_FOOTER
            + varint_len(inputs_count) as u32
            + varint_len(outputs_count) as u32;

        Self {
            weight: 4 * size,
            inputs_count,
            segwit: false,
        }
    }

    /// Add an input to the estimate
    pub fn add_input(&mut self, i: &TxInput) {
        let script_size = input_script_size(i);

        let mut w = 4 * TXSIZE_INPUT;
        match i.script_type {
            InputScriptType::SpendAddress | InputScriptType::SpendMultisig => {
                w += 4 * (script_size + varint_len(script_size) as u32);
            }
            InputScriptType::SpendWitness | InputScriptType::SpendP2shWitness => {
                w += match (i.script_type, i.multisig.is_some()) {
                    (InputScriptType::SpendP2shWitness, true) => 4 * (2 + TXSIZE_WITNESSSCRIPT),
                    (InputScriptType::SpendP2shWitness, false) => 4 * (2 + TXSIZE_WITNESSPKHASH),
                    _ => 4,
                };
                // Witness data is discounted
                w += script_size;

                // Marker, flag and witness counts are accounted once
                if !self.segwit {
                    self.segwit = true;
                    self.weight += TXSIZE_SEGWIT_OVERHEAD + self.inputs_count;
                }
            }
        }

        self.weight = self.weight.saturating_add(w);
    }

    /// Add a compiled output to the estimate
    pub fn add_output(&mut self, o: &TxOutputBin) {
        let n = o.script_pubkey.len() as u32;
        let w = 4 * (TXSIZE_OUTPUT + n + varint_len(n) as u32);

        self.weight = self.weight.saturating_add(w);
    }

    /// Fetch estimated weight
    pub fn weight(&self) -> u32 {
        self.weight
    }

    /// Fee threshold above which an explicit confirmation is required
    pub fn fee_threshold(&self, maxfee_kb: u64) -> u64 {
        self.weight as u64 * maxfee_kb / 4000
    }
}

/// Estimated unlocking script (or witness) size for an input
fn input_script_size(i: &TxInput) -> u32 {
    match &i.multisig {
        Some(m) => {
            let ms = TXSIZE_MULTISIGSCRIPT + m.n() as u32 * (1 + TXSIZE_PUBKEY);

            // Includes the OP_0 required by OP_CHECKMULTISIG
            1 + m.m as u32 * (1 + TXSIZE_SIGNATURE) + op_push_len(ms as usize) as u32 + ms
        }
        None => 1 + TXSIZE_SIGNATURE + 1 + TXSIZE_PUBKEY,
    }
}

#[cfg(test)]
mod test {
    use crate::apdu::tx::Multisig;

    use super::*;

    fn input(script_type: InputScriptType) -> TxInput {
        TxInput::new([0u8; 32], 0, script_type, &[0x8000_002c, 0x8000_0000, 0x8000_0000, 0, 0])
            .unwrap()
    }

    #[test]
    fn p2pkh_weight() {
        let mut w = TxWeight::new(1, 1);
        assert_eq!(w.weight(), 4 * 10);

        w.add_input(&input(InputScriptType::SpendAddress));
        // 40 + 107 + 1
        assert_eq!(w.weight(), 4 * 10 + 4 * 148);

        w.add_output(&TxOutputBin::new(1000, &[0u8; 25]).unwrap());
        assert_eq!(w.weight(), 4 * 10 + 4 * 148 + 4 * 34);

        // 192 vbytes at 2,000,000 sat/kB
        assert_eq!(w.weight(), 4 * 192);
        assert_eq!(w.fee_threshold(2_000_000), 384_000);
    }

    #[test]
    fn segwit_weight() {
        let mut w = TxWeight::new(2, 1);
        let base = w.weight();

        w.add_input(&input(InputScriptType::SpendWitness));
        assert_eq!(w.weight(), base + 2 + 2 + 160 + 4 + 107);

        // Segwit overhead is only applied once
        w.add_input(&input(InputScriptType::SpendP2shWitness));
        assert_eq!(
            w.weight(),
            base + 2 + 2 + 160 + 4 + 107 + 160 + 4 * 24 + 107
        );
    }

    #[test]
    fn multisig_weight() {
        let m = Multisig::new(2, &[[0x02; 33]; 3]).unwrap();
        let i = input(InputScriptType::SpendMultisig).with_multisig(m);

        // 1 + 2 * 73 + push(105) + 105
        assert_eq!(input_script_size(&i), 1 + 146 + 2 + 105);

        let mut w = TxWeight::new(1, 1);
        let base = w.weight();
        w.add_input(&i);
        assert_eq!(w.weight(), base + 4 * 40 + 4 * (254 + 3));
    }
}
