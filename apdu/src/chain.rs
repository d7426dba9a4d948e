// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Chaining for objects exceeding a single short APDU
//!
//! Multisig descriptors, previous transaction scriptSigs and serialized
//! transaction chunks may exceed the [MAX_APDU_PAYLOAD] of a short APDU,
//! so both commands and responses are carried in fragments of at most
//! [MAX_FRAGMENT_LEN] bytes.
//!
//! Commands are split with [fragments]. Each fragment is sent with the
//! object's `INS`, `P1` is [P1_MORE] on all but the final fragment and
//! `P2` carries the fragment sequence number. A fragment with sequence
//! zero always starts a new chain. The device collects fragments in a
//! [ChainBuffer] and decodes the object once the final fragment arrives,
//! objects fitting a single fragment are sent exactly as unchained APDUs.
//!
//! Responses are loaded into a [ResponseChain] and returned as frames
//! of one flags byte followed by up to [MAX_FRAGMENT_LEN] bytes of data,
//! with [RESPONSE_MORE] set while fragments remain. The host fetches the
//! following frames with [TxGetResponse] and reassembles them using
//! [ChainBuffer::push_frame]. [TxGetResponse] is handled by the transport
//! and never reaches the signing engine.

use encdec::{Decode, DecodeOwned, Encode};
use heapless::Vec;
use ledger_proto::{ApduHeader, ApduStatic};

use crate::{ApduError, Instruction, BTC_APDU_CLA};

/// Maximum short APDU payload
pub const MAX_APDU_PAYLOAD: usize = 249;

/// Maximum data carried by a single fragment
pub const MAX_FRAGMENT_LEN: usize = 240;

/// Maximum length of a chained object, covers the largest [`TxRequest`][crate::tx::TxRequest]
pub const MAX_CHAINED_LEN: usize = 2304;

/// `P1` flag marking further command fragments
pub const P1_MORE: u8 = 0x80;

/// Response frame flag marking further response fragments
pub const RESPONSE_MORE: u8 = 0x01;

/// Fetch a response fragment (`SEQ` byte)
#[derive(Copy, Clone, PartialEq, Debug, Encode, DecodeOwned)]
#[encdec(error = "ApduError")]
pub struct TxGetResponse {
    pub seq: u8,
}

impl ApduStatic for TxGetResponse {
    const CLA: u8 = BTC_APDU_CLA;
    const INS: u8 = Instruction::TxGetResponse as u8;
}

/// Command fragment, header and data for a single APDU
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct Fragment<'a> {
    pub header: ApduHeader,
    pub data: &'a [u8],
}

/// Split encoded command data into APDU fragments
pub fn fragments(cla: u8, ins: u8, data: &[u8]) -> impl Iterator<Item = Fragment<'_>> {
    let count = (data.len() + MAX_FRAGMENT_LEN - 1) / MAX_FRAGMENT_LEN;
    let count = count.max(1);

    (0..count).map(move |i| {
        let start = i * MAX_FRAGMENT_LEN;
        let end = (start + MAX_FRAGMENT_LEN).min(data.len());

        Fragment {
            header: ApduHeader {
                cla,
                ins,
                p1: if i + 1 < count { P1_MORE } else { 0 },
                p2: i as u8,
            },
            data: &data[start..end],
        }
    })
}

/// Reassembly buffer for chained command data (device side)
/// or response frames (host side)
#[derive(Clone, Debug, Default)]
pub struct ChainBuffer<const N: usize = MAX_CHAINED_LEN> {
    buff: Vec<u8, N>,
    ins: Option<u8>,
    seq: u8,
    complete: bool,
}

impl<const N: usize> ChainBuffer<N> {
    pub const fn new() -> Self {
        Self {
            buff: Vec::new(),
            ins: None,
            seq: 0,
            complete: false,
        }
    }

    /// Drop any partial chain
    pub fn reset(&mut self) {
        self.buff.clear();
        self.ins = None;
        self.seq = 0;
        self.complete = false;
    }

    /// Push a command fragment, returning the object data on the final fragment
    pub fn push(&mut self, h: &ApduHeader, data: &[u8]) -> Result<Option<&[u8]>, ApduError> {
        if self.complete || h.p2 == 0 {
            self.reset();
        }

        if data.len() > MAX_FRAGMENT_LEN {
            self.reset();
            return Err(ApduError::InvalidLength);
        }

        match self.ins {
            None if h.p2 == 0 => self.ins = Some(h.ins),
            Some(ins) if ins == h.ins && h.p2 == self.seq => (),
            _ => {
                self.reset();
                return Err(ApduError::InvalidEncoding);
            }
        }

        self.append(data, h.p1 & P1_MORE != 0)
    }

    /// Push a response frame, returning the response data on the final frame
    pub fn push_frame(&mut self, frame: &[u8]) -> Result<Option<&[u8]>, ApduError> {
        if self.complete {
            self.reset();
        }

        let (flags, data) = match frame.split_first() {
            Some((f, d)) if d.len() <= MAX_FRAGMENT_LEN => (*f, d),
            _ => {
                self.reset();
                return Err(ApduError::InvalidLength);
            }
        };

        self.append(data, flags & RESPONSE_MORE != 0)
    }

    fn append(&mut self, data: &[u8], more: bool) -> Result<Option<&[u8]>, ApduError> {
        if self.buff.extend_from_slice(data).is_err() {
            self.reset();
            return Err(ApduError::InvalidLength);
        }
        self.seq = self.seq.wrapping_add(1);

        if more {
            return Ok(None);
        }

        self.complete = true;
        Ok(Some(self.buff.as_slice()))
    }
}

/// Encoded response awaiting return in frames (device side)
#[derive(Clone, Debug, Default)]
pub struct ResponseChain<const N: usize = MAX_CHAINED_LEN> {
    buff: Vec<u8, N>,
}

impl<const N: usize> ResponseChain<N> {
    pub const fn new() -> Self {
        Self { buff: Vec::new() }
    }

    /// Load a response written by `f`, replacing any previous response
    pub fn load(
        &mut self,
        f: impl FnOnce(&mut [u8]) -> Result<usize, ApduError>,
    ) -> Result<usize, ApduError> {
        self.buff.clear();
        self.buff
            .resize_default(N)
            .map_err(|_| ApduError::InvalidLength)?;

        match f(&mut self.buff) {
            Ok(n) => {
                self.buff.truncate(n);
                Ok(n)
            }
            Err(e) => {
                self.buff.clear();
                Err(e)
            }
        }
    }

    /// Number of frames required for the loaded response
    pub fn frames(&self) -> usize {
        ((self.buff.len() + MAX_FRAGMENT_LEN - 1) / MAX_FRAGMENT_LEN).max(1)
    }

    /// Write the frame for fragment `seq`, returning the frame length
    pub fn frame(&self, seq: u8, out: &mut [u8]) -> Result<usize, ApduError> {
        let seq = seq as usize;
        if seq >= self.frames() {
            return Err(ApduError::InvalidLength);
        }

        let start = seq * MAX_FRAGMENT_LEN;
        let end = (start + MAX_FRAGMENT_LEN).min(self.buff.len());
        let data = &self.buff[start..end];

        if out.len() < data.len() + 1 {
            return Err(ApduError::InvalidLength);
        }

        out[0] = if seq + 1 < self.frames() { RESPONSE_MORE } else { 0 };
        out[1..][..data.len()].copy_from_slice(data);

        Ok(data.len() + 1)
    }
}
