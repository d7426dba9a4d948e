// Copyright (c) 2022-2023 The MobileCoin Foundation

use crate::apdu::{state::FailureKind, tx::TxFailure};

/// [Engine][super::Engine] errors
#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "thiserror", derive(thiserror::Error))]
#[repr(u8)]
pub enum Error {
    /// Invalid argument length
    #[cfg_attr(feature = "thiserror", error("Invalid argument length"))]
    InvalidLength = 0x00,

    /// Unexpected event
    #[cfg_attr(feature = "thiserror", error("Unexpected event"))]
    UnexpectedEvent = 0x01,

    /// Invalid engine state
    #[cfg_attr(feature = "thiserror", error("invalid engine state"))]
    InvalidState = 0x02,

    /// Reply index does not match the outstanding request
    #[cfg_attr(feature = "thiserror", error("unexpected request index"))]
    InvalidIndex = 0x03,

    /// Transaction serialized out of order
    #[cfg_attr(feature = "thiserror", error("serialization out of order"))]
    SerializationOrder = 0x04,

    /// Transaction changed between signing passes
    #[cfg_attr(feature = "thiserror", error("transaction has changed during signing"))]
    TxChanged = 0x10,

    /// Previous transaction hash mismatch
    #[cfg_attr(feature = "thiserror", error("encountered invalid prevhash"))]
    InvalidPrevHash = 0x11,

    /// Previous transaction outputs do not match the spent input
    #[cfg_attr(feature = "thiserror", error("invalid previous transaction outputs"))]
    InvalidPrevOutputs = 0x12,

    /// Amount overflow
    #[cfg_attr(feature = "thiserror", error("value overflow"))]
    ValueOverflow = 0x13,

    /// More than one output qualifies as change
    #[cfg_attr(feature = "thiserror", error("only one change output is allowed"))]
    MultipleChangeOutputs = 0x14,

    /// Input amount required but not provided
    #[cfg_attr(feature = "thiserror", error("expected input with amount"))]
    MissingAmount = 0x15,

    /// Segwit not supported on this coin
    #[cfg_attr(feature = "thiserror", error("segwit not enabled on this coin"))]
    SegwitNotEnabled = 0x16,

    /// Segwit and legacy inputs in one transaction
    #[cfg_attr(feature = "thiserror", error("mixed segwit and legacy inputs"))]
    MixedInputTypes = 0x17,

    /// Unsupported or inconsistent script type
    #[cfg_attr(feature = "thiserror", error("invalid script type"))]
    InvalidScriptType = 0x18,

    /// Invalid multisig parameters
    #[cfg_attr(feature = "thiserror", error("invalid multisig parameters"))]
    InvalidMultisig = 0x19,

    /// Device key missing from multisig descriptor
    #[cfg_attr(feature = "thiserror", error("pubkey not found in multisig script"))]
    MultisigKeyNotFound = 0x1a,

    /// Invalid output address
    #[cfg_attr(feature = "thiserror", error("invalid address"))]
    InvalidAddress = 0x1b,

    /// Invalid OP_RETURN output
    #[cfg_attr(feature = "thiserror", error("invalid OP_RETURN output"))]
    InvalidOpReturn = 0x1c,

    /// Unsupported coin
    #[cfg_attr(feature = "thiserror", error("unknown coin"))]
    UnknownCoin = 0x1d,

    /// Invalid input or output counts
    #[cfg_attr(feature = "thiserror", error("invalid input / output counts"))]
    InvalidCounts = 0x1e,

    /// Extra data not supported on this coin
    #[cfg_attr(feature = "thiserror", error("extra data not enabled on this coin"))]
    ExtraDataNotEnabled = 0x1f,

    /// Invalid extra data chunk
    #[cfg_attr(feature = "thiserror", error("invalid extra data"))]
    InvalidExtraData = 0x20,

    /// Output compilation failed
    #[cfg_attr(feature = "thiserror", error("failed to compile output"))]
    CompileFailed = 0x30,

    /// Signing failed
    #[cfg_attr(feature = "thiserror", error("signing failed"))]
    SigningFailed = 0x31,

    /// Key derivation failed
    #[cfg_attr(feature = "thiserror", error("key derivation failed"))]
    DerivationFailed = 0x32,

    /// Message encoding failed
    #[cfg_attr(feature = "thiserror", error("message encoding failed"))]
    EncodingFailed = 0x33,

    /// Outputs exceed inputs
    #[cfg_attr(feature = "thiserror", error("not enough funds"))]
    NotEnoughFunds = 0x40,

    /// User declined a confirmation
    #[cfg_attr(feature = "thiserror", error("signing cancelled by user"))]
    ActionCancelled = 0x41,
}

impl Error {
    /// Fetch the failure category reported to the host
    pub fn kind(&self) -> FailureKind {
        use Error::*;

        match self {
            InvalidLength | UnexpectedEvent | InvalidState | InvalidIndex | SerializationOrder => {
                FailureKind::Usage
            }
            CompileFailed | SigningFailed | DerivationFailed | EncodingFailed => {
                FailureKind::ProcessError
            }
            NotEnoughFunds => FailureKind::NotEnoughFunds,
            ActionCancelled => FailureKind::ActionCancelled,
            _ => FailureKind::DataError,
        }
    }
}

impl From<&Error> for TxFailure {
    fn from(e: &Error) -> Self {
        TxFailure {
            kind: e.kind(),
            code: e.clone() as u8,
        }
    }
}
