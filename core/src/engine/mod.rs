// Copyright (c) 2022-2023 The MobileCoin Foundation

//! The [Engine] provides functionality required by hardware wallets.
//!
//! This handles [Event] inputs and returns [Output] responses to the caller,
//! see [apdu][crate::apdu] for APDU protocol / encoding specifications.
//!
//! Transactions are signed in three phases. Phase one streams and commits to
//! every input and output (replaying funding transactions for legacy inputs)
//! and collects user confirmations, phase two re-streams inputs and outputs to
//! serialize and sign them, and phase three (segwit transactions only) emits
//! witnesses. Each re-stream is checked against the phase one commitments.

use k256::ecdsa::SigningKey;
use strum::{Display, EnumIter, EnumString, EnumVariantNames};

use crate::{
    apdu::tx::{DataRequest, RequestType, SerializedChunk, TxInput, TxOutput},
    coins::CoinInfo,
};

mod function;
pub use function::Function;

mod event;
pub use event::Event;

mod output;
pub use output::Output;

mod error;
pub use error::Error;

mod session;
pub use session::{Destination, Prompt, Session};

mod prev;
use prev::{PrevStep, PrevTxVerifier};

mod legacy;
use legacy::LegacySigner;

mod sign;

/// Engine internal state enumeration
#[derive(Copy, Clone, PartialEq, Debug, EnumString, Display, EnumVariantNames, EnumIter)]
pub enum State {
    /// Idle state, no transaction running
    Init,
    /// Phase one, awaiting input
    Input(u32),
    /// Replaying the funding transaction of a legacy input
    PrevTx(u32, PrevState),
    /// Phase one, awaiting output
    Output(u32),
    /// Transaction pending user approval
    Pending(Approval),
    /// Phase two, re-streaming the transaction to sign a legacy input
    Sign(u32, SignState),
    /// Phase two, awaiting a segwit (or BIP143) input
    SegwitInput(u32),
    /// Phase two, awaiting output
    FinalOutput(u32),
    /// Phase three, awaiting input for witness generation
    SegwitWitness(u32),
    /// Transaction complete
    Complete,
    /// Transaction denied / aborted
    Deny,
    /// Transaction failed
    Error,
}

/// Previous transaction replay state
#[derive(
    Copy, Clone, PartialEq, Debug, Default, EnumString, Display, EnumVariantNames, EnumIter,
)]
pub enum PrevState {
    #[default]
    Meta,
    Input(u32),
    Output(u32),
    /// Extra data, by offset
    ExtraData(u32),
}

/// Legacy re-stream state
#[derive(Copy, Clone, PartialEq, Debug, EnumString, Display, EnumVariantNames, EnumIter)]
pub enum SignState {
    Input(u32),
    Output(u32),
}

impl Default for SignState {
    fn default() -> Self {
        Self::Input(0)
    }
}

/// User confirmations, in the order they are requested
#[derive(
    Copy, Clone, PartialEq, Debug, Default, EnumString, Display, EnumVariantNames, EnumIter,
)]
pub enum Approval {
    /// Non-change output
    Output(u32),
    /// Fee exceeds the coin threshold
    FeeOverThreshold,
    /// Non-zero lock time
    LockTime,
    /// Total spend and fee
    #[default]
    Total,
}

impl Approval {
    /// Fetch the approval following this one
    pub fn next(&self) -> Option<Approval> {
        match self {
            Approval::Output(_) => Some(Approval::FeeOverThreshold),
            Approval::FeeOverThreshold => Some(Approval::LockTime),
            Approval::LockTime => Some(Approval::Total),
            Approval::Total => None,
        }
    }
}

/// Engine configuration
#[derive(Clone, PartialEq, Debug)]
pub struct Config {
    /// Accept transactions mixing segwit and legacy inputs
    pub allow_mixed_inputs: bool,
}

impl Config {
    pub const fn new() -> Self {
        Self {
            allow_mixed_inputs: cfg!(feature = "mixed-inputs"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

/// [Engine] provides hardware-independent support for bitcoin transaction signing
///
pub struct Engine<DRV: Driver> {
    state: State,
    config: Config,

    session: Option<Session>,

    function: Function,

    drv: DRV,
}

/// [`Driver`] trait provides platform support for [`Engine`] instances
pub trait Driver {
    /// BIP32 derivation for secp256k1 keys
    fn bip32_derive_secp256k1(&self, path: &[u32]) -> Result<SigningKey, Error>;
}

impl<T: Driver> Driver for &mut T {
    fn bip32_derive_secp256k1(&self, path: &[u32]) -> Result<SigningKey, Error> {
        T::bip32_derive_secp256k1(self, path)
    }
}

impl<DRV: Driver> Engine<DRV> {
    /// Create a new transaction engine instance with the provided driver
    pub const fn new(drv: DRV) -> Self {
        Self::new_with_config(drv, Config::new())
    }

    /// Create a new transaction engine instance with the provided driver and configuration
    pub const fn new_with_config(drv: DRV, config: Config) -> Self {
        Self {
            state: State::Init,
            config,
            session: None,
            function: Function::new(),
            drv,
        }
    }

    /// Handle incoming transaction events
    #[cfg_attr(feature = "noinline", inline(never))]
    pub fn update(&mut self, evt: &Event) -> Result<Output, Error> {
        #[cfg(feature = "log")]
        log::debug!("event: {:02x?}", evt);

        let r = self.handle(evt);

        // Errors are terminal for any live session
        if let Err(_e) = &r {
            if self.session.is_some() {
                #[cfg(feature = "log")]
                log::warn!("aborting transaction in state {}: {:?}", self.state, _e);

                self.function.clear();
                self.session = None;
                self.state = State::Error;
            }
        }

        r
    }

    fn handle(&mut self, evt: &Event) -> Result<Output, Error> {
        match (self.state, evt) {
            (_, Event::None) => Ok(Output::None),

            (
                _,
                Event::TxInit {
                    coin,
                    inputs_count,
                    outputs_count,
                    version,
                    lock_time,
                },
            ) => self.tx_init(coin, *inputs_count, *outputs_count, *version, *lock_time),

            (_, Event::TxCancel) => {
                #[cfg(feature = "log")]
                log::info!("transaction cancelled");

                self.reset();
                self.request(None)
            }

            (State::Deny, Event::TxGetInfo) => Err(Error::ActionCancelled),
            (_, Event::TxGetInfo) => self.request(None),

            // Phase one
            (State::Input(n), Event::TxInput { index, input }) => {
                check_index(n, *index)?;
                self.tx_input(n, input)
            }
            (State::PrevTx(n, PrevState::Meta), Event::TxPrevMeta(m)) => {
                let coin = self.session()?.coin;
                let p = self.prev_tx()?.meta(coin, m)?;
                self.prev_step(n, PrevStep::Next(p))
            }
            (State::PrevTx(n, PrevState::Input(j)), Event::TxPrevInput { index, input }) => {
                check_index(j, *index)?;
                let p = self.prev_tx()?.input(j, input)?;
                self.prev_step(n, PrevStep::Next(p))
            }
            (State::PrevTx(n, PrevState::Output(j)), Event::TxPrevOutput { index, output }) => {
                check_index(j, *index)?;
                let s = self.prev_tx()?.output(j, output)?;
                self.prev_step(n, s)
            }
            (State::PrevTx(n, PrevState::ExtraData(o)), Event::TxPrevExtraData { offset, data }) => {
                check_index(o, *offset)?;
                let s = self.prev_tx()?.extra_data(o, data)?;
                self.prev_step(n, s)
            }
            (State::Output(n), Event::TxOutput { index, output }) => {
                check_index(n, *index)?;
                self.tx_output(n, output)
            }

            // Phase two
            (State::Sign(n, SignState::Input(j)), Event::TxInput { index, input }) => {
                check_index(j, *index)?;
                self.sign_input(n, j, input)
            }
            (State::Sign(n, SignState::Output(j)), Event::TxOutput { index, output }) => {
                check_index(j, *index)?;
                self.sign_output(n, j, output)
            }
            (State::SegwitInput(n), Event::TxInput { index, input }) => {
                check_index(n, *index)?;
                self.segwit_input(n, input)
            }
            (State::FinalOutput(n), Event::TxOutput { index, output }) => {
                check_index(n, *index)?;
                self.final_output(n, output)
            }

            // Phase three
            (State::SegwitWitness(n), Event::TxInput { index, input }) => {
                check_index(n, *index)?;
                self.segwit_witness(n, input)
            }

            _e => {
                #[cfg(feature = "log")]
                log::error!("unexpected event: {:02x?}", _e);

                Err(Error::UnexpectedEvent)
            }
        }
    }

    /// Approve a pending confirmation
    pub fn approve(&mut self) {
        let a = match self.state {
            State::Pending(a) => a,
            _ => return,
        };

        #[cfg(feature = "log")]
        log::info!("approved: {}", a);

        let outputs_count = match &mut self.session {
            Some(s) => {
                s.prompt = None;
                s.outputs_count
            }
            None => return,
        };

        match a {
            Approval::Output(n) if n + 1 < outputs_count => self.state = State::Output(n + 1),
            a => self.next_approval(a),
        }
    }

    /// Deny a pending transaction
    pub fn deny(&mut self) {
        self.function.clear();
        self.session = None;
        self.state = State::Deny;
    }

    /// Reset engine state
    pub fn reset(&mut self) {
        self.function.clear();
        self.session = None;
        self.state = State::Init;
    }

    /// Fetch current engine state
    pub fn state(&self) -> State {
        self.state
    }

    /// Fetch the confirmation prompt while pending approval
    pub fn prompt(&self) -> Option<&Prompt> {
        match self.state {
            State::Pending(_) => self.session.as_ref().and_then(|s| s.prompt.as_ref()),
            _ => None,
        }
    }

    /// Fetch progress (percentage) through the signing operation
    pub fn progress(&self) -> Option<usize> {
        if self.state == State::Complete {
            return Some(100);
        }

        let s = self.session.as_ref()?;
        let (i, o) = (s.inputs_count as usize, s.outputs_count as usize);

        let total = 2 * (i + o) + if s.segwit { i } else { 0 };

        let step = match self.state {
            State::Input(n) | State::PrevTx(n, _) => n as usize,
            State::Output(n) | State::Pending(Approval::Output(n)) => i + n as usize,
            State::Pending(_) => i + o,
            State::Sign(n, _) | State::SegwitInput(n) => i + o + n as usize,
            State::FinalOutput(n) => 2 * i + o + n as usize,
            State::SegwitWitness(n) => 2 * (i + o) + n as usize,
            _ => return None,
        };

        Some(compute_tx_progress(step, total))
    }

    fn session(&mut self) -> Result<&mut Session, Error> {
        self.session.as_mut().ok_or(Error::InvalidState)
    }

    fn prev_tx(&mut self) -> Result<&mut PrevTxVerifier, Error> {
        self.function.prev_tx().ok_or(Error::InvalidState)
    }

    /// Initialise a transaction signing session
    #[cfg_attr(feature = "noinline", inline(never))]
    fn tx_init(
        &mut self,
        coin: &str,
        inputs_count: u32,
        outputs_count: u32,
        version: u32,
        lock_time: u32,
    ) -> Result<Output, Error> {
        // Drop any existing session
        self.reset();

        let s = CoinInfo::by_name(coin)
            .ok_or(Error::UnknownCoin)
            .and_then(|c| Session::new(c, inputs_count, outputs_count, version, lock_time));

        let s = match s {
            Ok(s) => s,
            Err(e) => {
                self.state = State::Error;
                return Err(e);
            }
        };

        #[cfg(feature = "log")]
        log::info!(
            "start {} transaction, {} inputs {} outputs",
            s.coin.name,
            inputs_count,
            outputs_count
        );

        self.session = Some(s);
        self.state = State::Input(0);

        self.request(None)
    }

    /// Phase one input, starting a funding transaction replay where required
    #[cfg_attr(feature = "noinline", inline(never))]
    fn tx_input(&mut self, n: u32, i: &TxInput) -> Result<Output, Error> {
        let allow_mixed = self.config.allow_mixed_inputs;

        if self.session()?.add_input(n, i, allow_mixed)? {
            #[cfg(feature = "log")]
            log::debug!("input {} requires previous transaction", n);

            self.function
                .prev_tx_init(PrevTxVerifier::new(i.prev_hash, i.prev_index, i.amount));
            self.state = State::PrevTx(n, PrevState::Meta);
        } else {
            self.next_input(n)?;
        }

        self.request(None)
    }

    /// Apply a replay step for input `n`
    fn prev_step(&mut self, n: u32, step: PrevStep) -> Result<Output, Error> {
        match step {
            PrevStep::Next(p) => self.state = State::PrevTx(n, p),
            PrevStep::Done(amount) => {
                #[cfg(feature = "log")]
                log::debug!("input {} amount {} verified", n, amount);

                self.session()?.add_amount_in(amount)?;
                self.function.clear();
                self.next_input(n)?;
            }
        }

        self.request(None)
    }

    /// Advance to the phase one input following `n`, or to the outputs
    fn next_input(&mut self, n: u32) -> Result<(), Error> {
        let inputs_count = self.session()?.inputs_count;

        self.state = match n + 1 < inputs_count {
            true => State::Input(n + 1),
            false => State::Output(0),
        };

        Ok(())
    }

    /// Phase one output, requesting confirmation for non-change outputs
    #[cfg_attr(feature = "noinline", inline(never))]
    fn tx_output(&mut self, n: u32, o: &TxOutput) -> Result<Output, Error> {
        let s = self.session.as_mut().ok_or(Error::InvalidState)?;

        let prompt = s.add_output(n, o, &self.drv)?;
        let last = n + 1 == s.outputs_count;

        match prompt {
            Some(p) => {
                s.set_prompt(p);
                self.state = State::Pending(Approval::Output(n));
            }
            None if !last => self.state = State::Output(n + 1),
            None => self.next_approval(Approval::Output(n)),
        }

        self.request(None)
    }

    /// Move to the approval following `after`, or start signing
    fn next_approval(&mut self, after: Approval) {
        let s = match self.session.as_mut() {
            Some(s) => s,
            None => {
                self.state = State::Error;
                return;
            }
        };

        match s.next_approval(after) {
            Some(a) => self.state = State::Pending(a),
            None => {
                #[cfg(feature = "log")]
                log::info!("transaction approved, signing");

                s.start_signing();
                self.enter_input(0);
            }
        }
    }

    /// Enter phase two for input `n`, re-streaming for legacy inputs
    fn enter_input(&mut self, n: u32) {
        let s = match self.session.as_ref() {
            Some(s) => s,
            None => {
                self.state = State::Error;
                return;
            }
        };

        if s.next_legacy == Some(n) {
            self.function.legacy_signer_init(LegacySigner::new(
                n,
                s.inputs_count,
                s.outputs_count,
            ));
            self.state = State::Sign(n, SignState::Input(0));
        } else {
            self.state = State::SegwitInput(n);
        }
    }

    /// Advance to the phase two input following `n`, or to the outputs
    fn next_sign_input(&mut self, n: u32) -> Result<(), Error> {
        let inputs_count = self.session()?.inputs_count;

        match n + 1 < inputs_count {
            true => self.enter_input(n + 1),
            false => self.state = State::FinalOutput(0),
        }

        Ok(())
    }

    /// Re-streamed input while signing legacy input `n`
    #[cfg_attr(feature = "noinline", inline(never))]
    fn sign_input(&mut self, n: u32, j: u32, i: &TxInput) -> Result<Output, Error> {
        let s = self.session.as_mut().ok_or(Error::InvalidState)?;
        let signer = self.function.legacy_signer().ok_or(Error::InvalidState)?;

        let next = signer.input(s, &self.drv, j, i)?;
        self.state = State::Sign(n, next);

        self.request(None)
    }

    /// Re-streamed output while signing legacy input `n`,
    /// emitting the signed input after the last output
    #[cfg_attr(feature = "noinline", inline(never))]
    fn sign_output(&mut self, n: u32, j: u32, o: &TxOutput) -> Result<Output, Error> {
        let s = self.session.as_mut().ok_or(Error::InvalidState)?;
        let signer = self.function.legacy_signer().ok_or(Error::InvalidState)?;

        if let Some(next) = signer.output(s, &self.drv, j, o)? {
            self.state = State::Sign(n, next);
            return self.request(None);
        }

        let c = signer.finalize(s, &self.drv)?;
        s.next_legacy = signer.next_legacy();

        #[cfg(feature = "log")]
        log::debug!("signed legacy input {}", n);

        self.function.clear();
        self.next_sign_input(n)?;

        self.request(Some(c))
    }

    /// Phase two segwit (or BIP143) input
    fn segwit_input(&mut self, n: u32, i: &TxInput) -> Result<Output, Error> {
        let s = self.session.as_mut().ok_or(Error::InvalidState)?;
        let c = s.segwit_input(n, i, &self.drv)?;

        self.next_sign_input(n)?;

        self.request(Some(c))
    }

    /// Phase two output
    fn final_output(&mut self, n: u32, o: &TxOutput) -> Result<Output, Error> {
        let s = self.session.as_mut().ok_or(Error::InvalidState)?;
        let c = s.final_output(n, o, &self.drv)?;

        if n + 1 < s.outputs_count {
            self.state = State::FinalOutput(n + 1);
        } else if s.segwit {
            self.state = State::SegwitWitness(0);
        } else {
            self.complete();
        }

        self.request(Some(c))
    }

    /// Phase three input
    fn segwit_witness(&mut self, n: u32, i: &TxInput) -> Result<Output, Error> {
        let s = self.session.as_mut().ok_or(Error::InvalidState)?;
        let c = s.segwit_witness(n, i, &self.drv)?;

        match n + 1 < s.inputs_count {
            true => self.state = State::SegwitWitness(n + 1),
            false => self.complete(),
        }

        self.request(Some(c))
    }

    fn complete(&mut self) {
        #[cfg(feature = "log")]
        log::info!("transaction complete");

        self.function.clear();
        self.session = None;
        self.state = State::Complete;
    }

    /// Build the response for the current state,
    /// a [DataRequest] where one is outstanding
    fn request(&self, serialized: Option<SerializedChunk>) -> Result<Output, Error> {
        let request = match self.state {
            State::Input(n)
            | State::Sign(_, SignState::Input(n))
            | State::SegwitInput(n)
            | State::SegwitWitness(n) => DataRequest::new(RequestType::Input, n),
            State::Output(n) | State::Sign(_, SignState::Output(n)) | State::FinalOutput(n) => {
                DataRequest::new(RequestType::Output, n)
            }
            State::PrevTx(_, p) => {
                let v = self.function.prev_tx_ref().ok_or(Error::InvalidState)?;
                let h = *v.prev_hash();

                match p {
                    PrevState::Meta => DataRequest::prev(RequestType::PrevMeta, 0, h),
                    PrevState::Input(j) => DataRequest::prev(RequestType::PrevInput, j, h),
                    PrevState::Output(j) => DataRequest::prev(RequestType::PrevOutput, j, h),
                    PrevState::ExtraData(o) => {
                        let mut r = DataRequest::prev(RequestType::PrevExtraData, 0, h);
                        r.extra_data = Some(v.extra_data_request(o));
                        r
                    }
                }
            }
            State::Complete => DataRequest::finished(),
            _ => {
                return Ok(Output::State {
                    state: self.state,
                    value: self.state.value(),
                })
            }
        };

        Ok(Output::Request {
            state: self.state,
            request,
            serialized,
        })
    }
}

/// Check a host reply answers the outstanding request
fn check_index(expected: u32, index: u32) -> Result<(), Error> {
    if index != expected {
        #[cfg(feature = "log")]
        log::warn!("reply index {} expected {}", index, expected);

        return Err(Error::InvalidIndex);
    }

    Ok(())
}

fn compute_tx_progress(step: usize, total: usize) -> usize {
    if total == 0 {
        return 0;
    }

    let v = step * 100 / total;

    // Panic in _debug builds_ (testing only) if we exceed
    // 100% when calculating progress
    debug_assert!(v <= 100);

    // Otherwise clamp to a maximum of 100
    v.min(100)
}

#[cfg(test)]
mod test {
    extern crate std;

    use heapless::Vec;
    use strum::IntoEnumIterator;

    use super::*;
    use crate::{
        apdu::tx::{InputScriptType, OutputScriptType, PrevInput, TxOutputBin, TxPrevMeta},
        tx::Hasher,
    };

    const PATH: [u32; 5] = [0x8000_0054, 0x8000_0001, 0x8000_0000, 0, 0];
    const CHANGE: [u32; 5] = [0x8000_0054, 0x8000_0001, 0x8000_0000, 1, 0];
    const EXTERNAL: [u32; 5] = [0x8000_0054, 0x8000_0001, 0x8000_0005, 0, 7];

    /// Driver deriving keys from the hash of the path, for test use
    pub struct TestDriver;

    impl Driver for TestDriver {
        fn bip32_derive_secp256k1(&self, path: &[u32]) -> Result<SigningKey, Error> {
            let mut h = Hasher::new();
            for p in path {
                h.update(&p.to_le_bytes());
            }
            SigningKey::from_bytes(&h.finalize().into()).map_err(|_| Error::DerivationFailed)
        }
    }

    fn tx_init(inputs_count: u32, outputs_count: u32) -> Event<'static> {
        Event::TxInit {
            coin: "Testnet",
            inputs_count,
            outputs_count,
            version: 2,
            lock_time: 0,
        }
    }

    fn segwit_input() -> TxInput {
        TxInput::new([0x11; 32], 1, InputScriptType::SpendWitness, &PATH)
            .unwrap()
            .with_amount(100_000)
    }

    fn outputs() -> [TxOutput; 2] {
        [
            TxOutput::path(60_000, OutputScriptType::PayToWitness, &EXTERNAL).unwrap(),
            TxOutput::path(39_000, OutputScriptType::PayToWitness, &CHANGE).unwrap(),
        ]
    }

    lazy_static::lazy_static! {
        /// Mocked out test values, only for state tests
        pub static ref EVENTS: [Event<'static>; 6] = [
            Event::TxInput{ index: 0, input: segwit_input() },
            Event::TxOutput{ index: 0, output: outputs()[0].clone() },
            Event::TxPrevMeta(TxPrevMeta::new(1, 0, 1, 1)),
            Event::TxPrevInput{ index: 0, input: PrevInput{
                prev_hash: [0x22; 32],
                prev_index: 0,
                sequence: 0xffff_ffff,
                script_sig: Vec::new(),
            }},
            Event::TxPrevOutput{ index: 0, output: TxOutputBin::new(1000, &[0x51]).unwrap() },
            Event::TxPrevExtraData{ offset: 0, data: &[0xaa, 0xbb] },
        ];
    }

    /// Check whether a state accepts an event kind
    fn accepts(state: State, evt: &Event) -> bool {
        matches!(
            (state, evt),
            (
                State::Input(_)
                    | State::Sign(_, SignState::Input(_))
                    | State::SegwitInput(_)
                    | State::SegwitWitness(_),
                Event::TxInput { .. }
            ) | (
                State::Output(_) | State::Sign(_, SignState::Output(_)) | State::FinalOutput(_),
                Event::TxOutput { .. }
            ) | (State::PrevTx(_, PrevState::Meta), Event::TxPrevMeta(_))
                | (State::PrevTx(_, PrevState::Input(_)), Event::TxPrevInput { .. })
                | (State::PrevTx(_, PrevState::Output(_)), Event::TxPrevOutput { .. })
                | (
                    State::PrevTx(_, PrevState::ExtraData(_)),
                    Event::TxPrevExtraData { .. }
                )
        )
    }

    /// Step through a segwit transaction
    #[test]
    fn valid_events() {
        let mut e = Engine::new(TestDriver);
        let [o0, o1] = outputs();

        let r = e.update(&tx_init(1, 2)).unwrap();
        assert_eq!(r.request(), Some(&DataRequest::new(RequestType::Input, 0)));

        // Phase one
        let r = e.update(&Event::TxInput { index: 0, input: segwit_input() }).unwrap();
        assert_eq!(r, State::Output(0));

        let r = e.update(&Event::TxOutput { index: 0, output: o0.clone() }).unwrap();
        assert_eq!(r, State::Pending(Approval::Output(0)));
        assert_eq!(
            e.prompt(),
            Some(&Prompt::Output {
                index: 0,
                amount: 60_000,
                destination: Destination::Path(Vec::from_slice(&EXTERNAL).unwrap()),
            })
        );

        e.approve();
        assert_eq!(e.state(), State::Output(1));

        // Change output requires no confirmation
        let r = e.update(&Event::TxOutput { index: 1, output: o1.clone() }).unwrap();
        assert_eq!(r, State::Pending(Approval::Total));
        assert_eq!(
            e.prompt(),
            Some(&Prompt::Total {
                spending: 61_000,
                fee: 1_000
            })
        );

        e.approve();
        assert_eq!(e.state(), State::SegwitInput(0));

        // Phase two
        let r = e.update(&Event::TxInput { index: 0, input: segwit_input() }).unwrap();
        assert_eq!(r, State::FinalOutput(0));
        assert!(r.serialized().is_some());

        let r = e.update(&Event::TxOutput { index: 0, output: o0 }).unwrap();
        assert_eq!(r, State::FinalOutput(1));

        let r = e.update(&Event::TxOutput { index: 1, output: o1 }).unwrap();
        assert_eq!(r, State::SegwitWitness(0));

        // Phase three
        let r = e.update(&Event::TxInput { index: 0, input: segwit_input() }).unwrap();
        assert_eq!(r, State::Complete);
        assert_eq!(r.request(), Some(&DataRequest::finished()));

        let c = r.serialized().unwrap();
        assert_eq!(c.signature.as_ref().map(|s| s.0), Some(0));

        assert_eq!(e.progress(), Some(100));
    }

    /// Segwit inputs replayed with a lower amount in the witness pass are
    /// signed, but the transaction is never completed
    #[test]
    fn segwit_witness_amount_changed() {
        let mut e = Engine::new(TestDriver);

        let i0 = segwit_input();
        let i1 = TxInput::new([0x11; 32], 2, InputScriptType::SpendWitness, &PATH)
            .unwrap()
            .with_amount(100_000);
        let o = [
            TxOutput::path(150_000, OutputScriptType::PayToWitness, &EXTERNAL).unwrap(),
            TxOutput::path(49_000, OutputScriptType::PayToWitness, &CHANGE).unwrap(),
        ];

        e.update(&tx_init(2, 2)).unwrap();
        e.update(&Event::TxInput { index: 0, input: i0.clone() }).unwrap();
        e.update(&Event::TxInput { index: 1, input: i1.clone() }).unwrap();
        for (index, output) in o.iter().enumerate() {
            e.update(&Event::TxOutput { index: index as u32, output: output.clone() })
                .unwrap();
            while let State::Pending(_) = e.state() {
                e.approve();
            }
        }
        assert_eq!(e.state(), State::SegwitInput(0));

        e.update(&Event::TxInput { index: 0, input: i0.clone() }).unwrap();
        e.update(&Event::TxInput { index: 1, input: i1.clone() }).unwrap();
        for (index, output) in o.iter().enumerate() {
            e.update(&Event::TxOutput { index: index as u32, output: output.clone() })
                .unwrap();
        }
        assert_eq!(e.state(), State::SegwitWitness(0));

        // Lower amount is within the authorized total and is signed
        let lower = i0.with_amount(90_000);
        let r = e.update(&Event::TxInput { index: 0, input: lower }).unwrap();
        assert_eq!(r, State::SegwitWitness(1));
        assert_eq!(r.serialized().and_then(|c| c.signature.as_ref()).map(|s| s.0), Some(0));

        // Inputs check at the last witness withholds the footer
        let r = e.update(&Event::TxInput { index: 1, input: i1 });
        assert_eq!(r, Err(Error::TxChanged));
        assert_eq!(e.state(), State::Error);
    }

    /// Ensure we're handling unexpected events
    #[test]
    fn invalid_events() {
        for evt in &*EVENTS {
            let mut e = Engine::new(TestDriver);

            // Fire the event to every state not accepting it
            for state in State::iter() {
                if accepts(state, evt) {
                    continue;
                }

                e.state = state;

                // Check engine reports event error
                let r = e.update(evt);
                assert_eq!(r, Err(Error::UnexpectedEvent), "event {evt:?} in state {state}");
            }
        }
    }

    #[test]
    fn invalid_index() {
        let mut e = Engine::new(TestDriver);

        e.update(&tx_init(1, 2)).unwrap();

        let r = e.update(&Event::TxInput { index: 1, input: segwit_input() });
        assert_eq!(r, Err(Error::InvalidIndex));

        // Errors abort the session
        assert_eq!(e.state(), State::Error);
        assert_eq!(e.progress(), None);
    }

    #[test]
    fn init_errors() {
        let mut e = Engine::new(TestDriver);

        let r = e.update(&Event::TxInit {
            coin: "Dogecoin",
            inputs_count: 1,
            outputs_count: 1,
            version: 1,
            lock_time: 0,
        });
        assert_eq!(r, Err(Error::UnknownCoin));
        assert_eq!(e.state(), State::Error);

        assert_eq!(e.update(&tx_init(0, 1)), Err(Error::InvalidCounts));

        // A new transaction may always be started
        assert_eq!(e.update(&tx_init(1, 1)).unwrap(), State::Input(0));
    }

    #[test]
    fn deny_and_cancel() {
        let mut e = Engine::new(TestDriver);
        let [o0, _] = outputs();

        e.update(&tx_init(1, 2)).unwrap();
        e.update(&Event::TxInput { index: 0, input: segwit_input() }).unwrap();
        e.update(&Event::TxOutput { index: 0, output: o0 }).unwrap();
        assert!(e.prompt().is_some());

        e.deny();
        assert_eq!(e.state(), State::Deny);
        assert!(e.prompt().is_none());
        assert_eq!(e.update(&Event::TxGetInfo), Err(Error::ActionCancelled));

        let r = e.update(&Event::TxCancel).unwrap();
        assert_eq!(r, State::Init);
        assert_eq!(e.update(&Event::TxGetInfo).unwrap(), State::Init);
    }

    #[test]
    fn legacy_input_replay_request() {
        let mut e = Engine::new(TestDriver);

        e.update(&tx_init(1, 1)).unwrap();

        let i = TxInput::new([0x33; 32], 2, InputScriptType::SpendAddress, &PATH).unwrap();
        let r = e.update(&Event::TxInput { index: 0, input: i }).unwrap();

        assert_eq!(r, State::PrevTx(0, PrevState::Meta));
        assert_eq!(
            r.request(),
            Some(&DataRequest::prev(RequestType::PrevMeta, 0, [0x33; 32]))
        );

        // Spent output must exist in the previous transaction
        let r = e.update(&Event::TxPrevMeta(TxPrevMeta::new(1, 0, 1, 2)));
        assert_eq!(r, Err(Error::InvalidPrevOutputs));
        assert_eq!(e.state(), State::Error);
    }

    #[test]
    fn approval_order() {
        let mut a = Some(Approval::Output(3));
        let mut order = std::vec::Vec::new();

        while let Some(v) = a {
            order.push(v);
            a = v.next();
        }

        assert_eq!(
            order,
            &[
                Approval::Output(3),
                Approval::FeeOverThreshold,
                Approval::LockTime,
                Approval::Total
            ]
        );
    }

    #[test]
    fn tx_progress() {
        let tests = &[
            (0, 0, 0),
            (0, 10, 0),
            (5, 10, 50),
            (9, 10, 90),
            (10, 10, 100),
            (1, 3, 33),
        ];

        for (s, t, e) in tests {
            let p = compute_tx_progress(*s, *t);
            assert_eq!(p, *e, "progress error ({}/{})", *s, *t);
        }
    }
}
