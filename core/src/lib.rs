// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Bitcoin hardware wallet core
//!
//! This provides a common [Engine][engine] supporting streamed transaction signing
//! for execution on hardware wallets.
//!
//! Interactions with the [Engine][engine] are performed via [Event][engine::Event]s and [Output][engine::Output]s,
//! see [ledger_btc_apdu] for APDU objects and wire encodings.
//!
//! ## Operations
//!
//! Transactions are streamed to the device one object at a time, the device
//! never holds more than a single input or output of the transaction being
//! signed. Each response is either a [`TxRequest`][ledger_btc_apdu::tx::TxRequest]
//! naming the next object required, along with any serialized transaction data
//! produced by the previous step, or a [`TxInfo`][ledger_btc_apdu::tx::TxInfo]
//! where no request is outstanding (ie. awaiting user approval).
//!
//! Serialized chunks _MUST_ be concatenated by the host in the order received
//! to produce the signed transaction.
//!
//! ### Executing a transaction
//!
//! 1. Issue [`TxInit`][ledger_btc_apdu::tx::TxInit] with the coin name, input and output counts,
//!    version and lock time to start a signing operation
//! 2. Answer phase one requests, these validate and commit to the transaction
//!     1. [`TxInputAck`][ledger_btc_apdu::tx::TxInputAck] for each input
//!     2. For legacy (non-BIP143) inputs the funding transaction is replayed to prove
//!        the spent amount, via [`TxPrevMeta`][ledger_btc_apdu::tx::TxPrevMeta],
//!        [`TxPrevInputAck`][ledger_btc_apdu::tx::TxPrevInputAck],
//!        [`TxPrevOutputAck`][ledger_btc_apdu::tx::TxPrevOutputAck] and
//!        [`TxPrevExtraData`][ledger_btc_apdu::tx::TxPrevExtraData]
//!     3. [`TxOutputAck`][ledger_btc_apdu::tx::TxOutputAck] for each output
//! 3. While the engine is pending user approval (output, fee, lock time and total confirmation),
//!    poll with [`TxInfoReq`][ledger_btc_apdu::tx::TxInfoReq]
//! 4. Answer phase two requests, re-supplying inputs (legacy inputs require all inputs and
//!    outputs to be re-streamed for each signature) and outputs, collecting serialized chunks
//! 5. For segwit transactions answer phase three requests, re-supplying each input to
//!    generate witnesses
//! 6. On [`TxState::TxComplete`][ledger_btc_apdu::state::TxState::TxComplete] the final
//!    chunk carries the lock time and the transaction is complete
//!
//! Any error aborts the signing operation, a [`TxCancel`][ledger_btc_apdu::tx::TxCancel]
//! or new [`TxInit`][ledger_btc_apdu::tx::TxInit] may be issued at any time.
//!

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub use ledger_btc_apdu::{self as apdu};

pub mod coins;

pub mod engine;

pub mod helpers;

pub mod tx;
