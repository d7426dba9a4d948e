// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Application State APDUs
//!

use num_enum::TryFromPrimitive;
use strum::{Display, EnumIter, EnumString, EnumVariantNames};

use crate::{encdec_enum, ApduError};

/// Engine state enumeration
/// used in [`TxInfo`][crate::tx::TxInfo] and [`TxRequest`][crate::tx::TxRequest]
/// to communicate transaction progress
#[derive(
    Copy, Clone, PartialEq, Debug, EnumString, Display, EnumVariantNames, EnumIter, TryFromPrimitive,
)]
#[repr(u8)]
pub enum TxState {
    Init = 0x00,
    Input = 0x01,
    PrevMeta = 0x02,
    PrevInput = 0x03,
    PrevOutput = 0x04,
    PrevExtraData = 0x05,
    Output = 0x06,
    Pending = 0x10,
    SignInput = 0x20,
    SignOutput = 0x21,
    SegwitInput = 0x22,
    FinalOutput = 0x23,
    SegwitWitness = 0x24,
    TxComplete = 0x40,
    TxDenied = 0x41,
    Error = 0xFF,
}

encdec_enum!(TxState);

impl TxState {
    /// Check whether the engine has an outstanding [`DataRequest`][crate::tx::DataRequest]
    /// in this state (and thus responds with a [`TxRequest`][crate::tx::TxRequest])
    pub fn is_request(&self) -> bool {
        !matches!(
            self,
            TxState::Init | TxState::Pending | TxState::TxDenied | TxState::Error
        )
    }
}

/// Failure categories reported to the host when a signing operation is aborted
#[derive(
    Copy, Clone, PartialEq, Debug, EnumString, Display, EnumVariantNames, EnumIter, TryFromPrimitive,
)]
#[repr(u8)]
pub enum FailureKind {
    /// Inconsistent or tampered transaction data
    DataError = 0x01,
    /// Internal processing failure
    ProcessError = 0x02,
    /// Outputs exceed inputs
    NotEnoughFunds = 0x03,
    /// User declined a confirmation
    ActionCancelled = 0x04,
    /// Protocol misuse (unexpected message, index or count)
    Usage = 0x05,
}

encdec_enum!(FailureKind);
