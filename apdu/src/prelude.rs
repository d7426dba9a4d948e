// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Prelude to simplify downstream use of APDU objects
//!

pub use crate::{
    chain::{fragments, ChainBuffer, ResponseChain, TxGetResponse},
    state::{FailureKind, TxState},
    tx::{
        DataRequest, InputScriptType, Multisig, OutputScriptType, PrevInput, RequestType,
        SerializedChunk, TxCancel, TxFailure, TxInfo, TxInfoReq, TxInit, TxInput, TxInputAck,
        TxOutput, TxOutputAck, TxOutputBin, TxPrevExtraData, TxPrevInputAck, TxPrevMeta,
        TxPrevOutputAck, TxRequest, TxResponse,
    },
    Instruction, BTC_APDU_CLA,
};
