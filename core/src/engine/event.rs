// Copyright (c) 2022-2023 The MobileCoin Foundation

use encdec::Decode;

use ledger_proto::{ApduError, ApduStatic};

use crate::apdu::tx::*;

/// [`Engine`][super::Engine] input events, typically decoded from request [APDUs][crate::apdu]
#[derive(Clone, Debug, PartialEq)]
pub enum Event<'a> {
    None,

    /// Initialise transaction
    TxInit {
        coin: &'a str,
        inputs_count: u32,
        outputs_count: u32,
        version: u32,
        lock_time: u32,
    },

    /// Supply an input of the transaction being signed
    TxInput { index: u32, input: TxInput },

    /// Supply an output of the transaction being signed
    TxOutput { index: u32, output: TxOutput },

    /// Supply previous transaction metadata
    TxPrevMeta(TxPrevMeta),

    /// Supply a previous transaction input
    TxPrevInput { index: u32, input: PrevInput },

    /// Supply a previous transaction output
    TxPrevOutput { index: u32, output: TxOutputBin },

    /// Supply a chunk of previous transaction extra data
    TxPrevExtraData { offset: u32, data: &'a [u8] },

    /// Cancel an ongoing transaction
    TxCancel,

    /// Fetch TX info / state
    TxGetInfo,
}

/// Helper for decoding APDUs to events
fn decode_event<'a, T>(buff: &'a [u8]) -> Result<Event<'a>, ApduError>
where
    T: Decode<'a, Error = ApduError>,
    Event<'a>: From<T::Output>,
{
    T::decode(buff).map(|(v, _n)| Event::from(v))
}

impl<'a> Event<'a> {
    /// Parse an incoming APDU to engine event
    #[cfg_attr(feature = "noinline", inline(never))]
    pub fn parse(ins: u8, buff: &'a [u8]) -> Result<Self, ApduError> {
        match ins {
            TxInit::INS => decode_event::<TxInit>(buff),
            TxInputAck::INS => decode_event::<TxInputAck>(buff),
            TxOutputAck::INS => decode_event::<TxOutputAck>(buff),
            TxPrevMeta::INS => decode_event::<TxPrevMeta>(buff),
            TxPrevInputAck::INS => decode_event::<TxPrevInputAck>(buff),
            TxPrevOutputAck::INS => decode_event::<TxPrevOutputAck>(buff),
            TxPrevExtraData::INS => decode_event::<TxPrevExtraData>(buff),
            TxCancel::INS => decode_event::<TxCancel>(buff),
            TxInfoReq::INS => decode_event::<TxInfoReq>(buff),
            _ => Err(ApduError::InvalidEncoding),
        }
    }
}

impl<'a> From<TxInit<'a>> for Event<'a> {
    fn from(a: TxInit<'a>) -> Self {
        Event::TxInit {
            coin: a.coin,
            inputs_count: a.inputs_count,
            outputs_count: a.outputs_count,
            version: a.version,
            lock_time: a.lock_time,
        }
    }
}

impl<'a> From<TxInputAck> for Event<'a> {
    fn from(a: TxInputAck) -> Self {
        Event::TxInput {
            index: a.index,
            input: a.input,
        }
    }
}

impl<'a> From<TxOutputAck> for Event<'a> {
    fn from(a: TxOutputAck) -> Self {
        Event::TxOutput {
            index: a.index,
            output: a.output,
        }
    }
}

impl<'a> From<TxPrevMeta> for Event<'a> {
    fn from(a: TxPrevMeta) -> Self {
        Event::TxPrevMeta(a)
    }
}

impl<'a> From<TxPrevInputAck> for Event<'a> {
    fn from(a: TxPrevInputAck) -> Self {
        Event::TxPrevInput {
            index: a.index,
            input: a.input,
        }
    }
}

impl<'a> From<TxPrevOutputAck> for Event<'a> {
    fn from(a: TxPrevOutputAck) -> Self {
        Event::TxPrevOutput {
            index: a.index,
            output: a.output,
        }
    }
}

impl<'a> From<TxPrevExtraData<'a>> for Event<'a> {
    fn from(a: TxPrevExtraData<'a>) -> Self {
        Event::TxPrevExtraData {
            offset: a.offset,
            data: a.data,
        }
    }
}

impl<'a> From<TxCancel> for Event<'a> {
    fn from(_: TxCancel) -> Self {
        Event::TxCancel
    }
}

impl<'a> From<TxInfoReq> for Event<'a> {
    fn from(_: TxInfoReq) -> Self {
        Event::TxGetInfo
    }
}
