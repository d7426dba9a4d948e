// Copyright (c) 2022-2023 The MobileCoin Foundation

use encdec::Encode;

use ledger_proto::ApduError;

use crate::apdu::{
    state::TxState,
    tx::{DataRequest, SerializedChunk, TxInfo, TxRequest},
};

use super::{Approval, PrevState, SignState, State};

/// [`Engine`][super::Engine] outputs (in response to events), typically encoded to response [APDUs][crate::apdu]
#[derive(Clone, PartialEq, Debug)]
pub enum Output {
    None,

    /// Engine state, where no data request is outstanding
    State { state: State, value: u32 },

    /// Outstanding data request, with any serialized data produced
    /// by the previous step
    Request {
        state: State,
        request: DataRequest,
        serialized: Option<SerializedChunk>,
    },
}

impl Output {
    /// Encode an [`Output`] object to a response [APDU]
    #[cfg_attr(feature = "noinline", inline(never))]
    pub fn encode(&self, buff: &mut [u8]) -> Result<usize, ApduError> {
        match self {
            Output::None => Ok(0),
            Output::State { state, value } => TxInfo::new(state.state(), *value).encode(buff),
            Output::Request {
                state,
                request,
                serialized,
            } => TxRequest {
                state: state.state(),
                request: request.clone(),
                serialized: serialized.clone(),
            }
            .encode(buff),
        }
    }

    /// Fetch state for outputs containing this
    pub fn state(&self) -> Option<State> {
        match &self {
            Output::State { state, .. } | Output::Request { state, .. } => Some(*state),
            _ => None,
        }
    }

    /// Fetch data request where outstanding
    pub fn request(&self) -> Option<&DataRequest> {
        match &self {
            Output::Request { request, .. } => Some(request),
            _ => None,
        }
    }

    /// Fetch serialized chunk where present
    pub fn serialized(&self) -> Option<&SerializedChunk> {
        match &self {
            Output::Request { serialized, .. } => serialized.as_ref(),
            _ => None,
        }
    }
}

impl PartialEq<State> for Output {
    fn eq(&self, other: &State) -> bool {
        match self.state() {
            Some(s) => s == *other,
            None => false,
        }
    }
}

impl State {
    /// Fetch wire [`TxState`] for an engine [`State`]
    pub fn state(&self) -> TxState {
        match self {
            State::Init => TxState::Init,
            State::Input(_) => TxState::Input,
            State::PrevTx(_, PrevState::Meta) => TxState::PrevMeta,
            State::PrevTx(_, PrevState::Input(_)) => TxState::PrevInput,
            State::PrevTx(_, PrevState::Output(_)) => TxState::PrevOutput,
            State::PrevTx(_, PrevState::ExtraData(_)) => TxState::PrevExtraData,
            State::Output(_) => TxState::Output,
            State::Pending(_) => TxState::Pending,
            State::Sign(_, SignState::Input(_)) => TxState::SignInput,
            State::Sign(_, SignState::Output(_)) => TxState::SignOutput,
            State::SegwitInput(_) => TxState::SegwitInput,
            State::FinalOutput(_) => TxState::FinalOutput,
            State::SegwitWitness(_) => TxState::SegwitWitness,
            State::Complete => TxState::TxComplete,
            State::Deny => TxState::TxDenied,
            State::Error => TxState::Error,
        }
    }

    /// Fetch value associated with a state (input or output index)
    pub fn value(&self) -> u32 {
        match self {
            State::Input(n)
            | State::PrevTx(n, _)
            | State::Output(n)
            | State::Pending(Approval::Output(n))
            | State::Sign(n, _)
            | State::SegwitInput(n)
            | State::FinalOutput(n)
            | State::SegwitWitness(n) => *n,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod test {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn state_encode_decode() {
        let tests = &[
            (State::Init, TxState::Init, 0),
            (State::Input(3), TxState::Input, 3),
            (State::PrevTx(1, PrevState::Meta), TxState::PrevMeta, 1),
            (State::PrevTx(1, PrevState::Input(4)), TxState::PrevInput, 1),
            (State::PrevTx(2, PrevState::Output(0)), TxState::PrevOutput, 2),
            (
                State::PrevTx(2, PrevState::ExtraData(128)),
                TxState::PrevExtraData,
                2,
            ),
            (State::Output(7), TxState::Output, 7),
            (State::Pending(Approval::Output(5)), TxState::Pending, 5),
            (State::Pending(Approval::Total), TxState::Pending, 0),
            (State::Sign(1, SignState::Input(0)), TxState::SignInput, 1),
            (State::Sign(1, SignState::Output(2)), TxState::SignOutput, 1),
            (State::SegwitInput(2), TxState::SegwitInput, 2),
            (State::FinalOutput(0), TxState::FinalOutput, 0),
            (State::SegwitWitness(9), TxState::SegwitWitness, 9),
            (State::Complete, TxState::TxComplete, 0),
            (State::Deny, TxState::TxDenied, 0),
            (State::Error, TxState::Error, 0),
        ];

        for (s, e, v) in tests {
            assert_eq!(s.state(), *e, "state mapping for {s}");
            assert_eq!(s.value(), *v, "value mapping for {s}");
        }
    }

    #[test]
    fn request_states() {
        // Wire states carrying a request must map from engine states that issue requests
        for s in State::iter() {
            let expect_request = !matches!(
                s,
                State::Init | State::Pending(_) | State::Deny | State::Error
            );

            assert_eq!(s.state().is_request(), expect_request, "{s}");
        }
    }
}
