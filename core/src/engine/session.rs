// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Signing session, per-transaction state retained across all signing phases

use heapless::{String, Vec};
use zeroize::Zeroize;

use crate::{
    apdu::tx::{
        Bip32Path, InputScriptType, Multisig, OutputScriptType, PublicKey, SerializedChunk,
        SignatureBytes, TxInput, TxOutput, TxOutputBin, MAX_ADDRESS_LEN, MAX_OP_RETURN_LEN,
    },
    coins::CoinInfo,
    tx::{
        address_to_script, hash160, hash_input_check, hash_output_check, multisig_fingerprint,
        multisig_pubkey_index, multisig_validate,
        script::{
            multisig_script, op_return, p2pkh, p2sh, p2wpkh, p2wsh, script_sig_multisig,
            script_sig_p2pkh, script_sig_p2sh_p2wpkh, script_sig_p2sh_p2wsh, witness_empty,
            witness_p2wpkh, witness_p2wsh_multisig, ScriptPubKey, ScriptSig,
        },
        sha256, write_bytes, CommitmentSet, Commitments, Hasher, TxStream, TxWeight,
    },
};

use super::{
    sign::{multisig_with_signature, public_key, script_code, sign_digest},
    Approval, Driver, Error,
};

/// Maximum address index considered for change outputs
const MAX_CHANGE_INDEX: u32 = 1_000_000;

/// Output destination, as shown to the user
#[derive(Clone, PartialEq, Debug)]
pub enum Destination {
    Address(String<MAX_ADDRESS_LEN>),
    OpReturn(Vec<u8, MAX_OP_RETURN_LEN>),
    Path(Bip32Path),
}

/// Confirmation prompts, exposed while the engine is pending approval
#[derive(Clone, PartialEq, Debug)]
pub enum Prompt {
    /// Confirm a (non-change) output
    Output {
        index: u32,
        amount: u64,
        destination: Destination,
    },
    /// Confirm a fee above the coin threshold
    FeeOverThreshold { fee: u64 },
    /// Confirm a non-zero lock time
    LockTime { lock_time: u32 },
    /// Confirm the total amount leaving the wallet (fee included) and the fee
    Total { spending: u64, fee: u64 },
}

/// Common wallet path prefix across inputs, used to identify change
#[derive(Clone, PartialEq, Debug)]
enum WalletPath {
    Unset,
    Set { prefix: Bip32Path, depth: usize },
    Mismatch,
}

impl WalletPath {
    fn update(&mut self, path: &[u32]) {
        if path.len() < 2 {
            *self = WalletPath::Mismatch;
            return;
        }

        let p = &path[..path.len() - 2];

        *self = match core::mem::replace(self, WalletPath::Mismatch) {
            WalletPath::Unset => match Vec::from_slice(p) {
                Ok(prefix) => WalletPath::Set {
                    prefix,
                    depth: path.len(),
                },
                Err(_) => WalletPath::Mismatch,
            },
            WalletPath::Set { prefix, depth } if depth == path.len() && &prefix[..] == p => {
                WalletPath::Set { prefix, depth }
            }
            _ => WalletPath::Mismatch,
        };
    }

    fn matches(&self, path: &[u32]) -> bool {
        match self {
            WalletPath::Set { prefix, depth } => {
                path.len() == *depth && &path[..path.len() - 2] == &prefix[..]
            }
            _ => false,
        }
    }
}

/// Multisig wallet shared across inputs, used to identify change
#[derive(Clone, PartialEq, Debug)]
enum MultisigWallet {
    Unset,
    Single,
    Set([u8; 32]),
    Mismatch,
}

impl MultisigWallet {
    fn update(&mut self, m: Option<&Multisig>) -> Result<(), Error> {
        let next = match m {
            Some(m) => MultisigWallet::Set(multisig_fingerprint(m)?),
            None => MultisigWallet::Single,
        };

        *self = match (&*self, next) {
            (MultisigWallet::Unset, n) => n,
            (MultisigWallet::Single, MultisigWallet::Single) => MultisigWallet::Single,
            (MultisigWallet::Set(a), MultisigWallet::Set(b)) if *a == b => MultisigWallet::Set(b),
            _ => MultisigWallet::Mismatch,
        };

        Ok(())
    }
}

/// Signing session
pub struct Session {
    pub(super) coin: &'static CoinInfo,

    pub(super) inputs_count: u32,
    pub(super) outputs_count: u32,
    pub(super) version: u32,
    pub(super) lock_time: u32,

    /// Any segwit input present
    pub(super) segwit: bool,
    /// Kind (segwit or not) of the first input
    first_segwit: Option<bool>,

    total_in: u64,
    total_out: u64,
    change_out: Option<u64>,
    /// Remaining BIP143 input amounts authorized in phase one
    authorized_in: u64,

    wallet_path: WalletPath,
    multisig: MultisigWallet,
    weight: TxWeight,

    commit: CommitmentSet,
    pub(super) commitments: Commitments,

    /// Next input requiring a legacy signature
    pub(super) next_legacy: Option<u32>,

    /// Outbound transaction serialization
    stream: TxStream,
    /// Check digest over objects re-supplied in the current pass
    pass_check: Hasher,

    pub(super) prompt: Option<Prompt>,
}

impl Session {
    /// Create a new signing session
    pub fn new(
        coin: &'static CoinInfo,
        inputs_count: u32,
        outputs_count: u32,
        version: u32,
        lock_time: u32,
    ) -> Result<Self, Error> {
        if inputs_count == 0 || outputs_count == 0 {
            return Err(Error::InvalidCounts);
        }

        Ok(Self {
            coin,
            inputs_count,
            outputs_count,
            version,
            lock_time,
            segwit: false,
            first_segwit: None,
            total_in: 0,
            total_out: 0,
            change_out: None,
            authorized_in: 0,
            wallet_path: WalletPath::Unset,
            multisig: MultisigWallet::Unset,
            weight: TxWeight::new(inputs_count, outputs_count),
            commit: CommitmentSet::new(),
            commitments: Commitments::default(),
            next_legacy: None,
            stream: TxStream::new(inputs_count, outputs_count, false),
            pass_check: Hasher::new(),
            prompt: None,
        })
    }

    /// Check whether an input is signed using the BIP143 digest
    pub fn is_bip143(&self, i: &TxInput) -> bool {
        i.script_type.is_segwit() || self.coin.force_bip143
    }

    /// Compute fee (inputs less outputs)
    pub fn fee(&self) -> u64 {
        self.total_in.saturating_sub(self.total_out)
    }

    /// Validate an input, applied to every input in every pass
    pub fn check_input(&self, i: &TxInput) -> Result<(), Error> {
        if i.script_type.is_segwit() && !self.coin.segwit {
            return Err(Error::SegwitNotEnabled);
        }

        match (&i.multisig, i.script_type) {
            (Some(_), t) if !t.allows_multisig() => return Err(Error::InvalidScriptType),
            (None, InputScriptType::SpendMultisig) => return Err(Error::InvalidScriptType),
            (Some(m), _) => multisig_validate(m)?,
            _ => (),
        }

        if self.is_bip143(i) && i.amount.is_none() {
            return Err(Error::MissingAmount);
        }

        Ok(())
    }

    /// Add a phase one input, returning whether the funding transaction
    /// must be replayed to prove the input amount
    #[cfg_attr(feature = "noinline", inline(never))]
    pub fn add_input(&mut self, index: u32, i: &TxInput, allow_mixed: bool) -> Result<bool, Error> {
        self.check_input(i)?;

        let segwit = i.script_type.is_segwit();
        match self.first_segwit {
            None => self.first_segwit = Some(segwit),
            Some(s) if s != segwit && !allow_mixed => return Err(Error::MixedInputTypes),
            _ => (),
        }
        self.segwit |= segwit;

        self.wallet_path.update(&i.address_n);
        self.multisig.update(i.multisig.as_ref())?;

        self.commit.add_input(i);
        self.weight.add_input(i);

        if !self.is_bip143(i) {
            if self.next_legacy.is_none() {
                self.next_legacy = Some(index);
            }
            return Ok(true);
        }

        let amount = i.amount.ok_or(Error::MissingAmount)?;
        self.add_amount_in(amount)?;
        self.authorized_in = self
            .authorized_in
            .checked_add(amount)
            .ok_or(Error::ValueOverflow)?;

        Ok(false)
    }

    /// Add a proven (replayed) input amount
    pub fn add_amount_in(&mut self, amount: u64) -> Result<(), Error> {
        self.total_in = self
            .total_in
            .checked_add(amount)
            .ok_or(Error::ValueOverflow)?;
        Ok(())
    }

    /// Compile an output to an amount and locking script
    #[cfg_attr(feature = "noinline", inline(never))]
    pub fn compile_output(&self, o: &TxOutput, drv: &impl Driver) -> Result<TxOutputBin, Error> {
        let script = match (o.script_type, &o.address, o.address_n.is_empty()) {
            (OutputScriptType::PayToOpReturn, None, true) => {
                if o.amount != 0 || o.multisig.is_some() {
                    return Err(Error::InvalidOpReturn);
                }
                let d = o.op_return_data.as_ref().ok_or(Error::InvalidOpReturn)?;
                op_return(d)
            }
            (OutputScriptType::PayToOpReturn, _, _) => return Err(Error::InvalidOpReturn),
            _ if o.op_return_data.is_some() => return Err(Error::InvalidOpReturn),

            (OutputScriptType::PayToAddress, Some(a), true) if o.multisig.is_none() => {
                address_to_script(self.coin, a).map(|(_k, s)| s)
            }
            (_, Some(_), _) => return Err(Error::InvalidAddress),

            (t, None, false) => self.compile_path_output(t, o, drv),
            (_, None, true) => return Err(Error::InvalidAddress),
        }
        .map_err(compile_error)?;

        TxOutputBin::new(o.amount, &script).map_err(|_| Error::CompileFailed)
    }

    fn compile_path_output(
        &self,
        t: OutputScriptType,
        o: &TxOutput,
        drv: &impl Driver,
    ) -> Result<ScriptPubKey, Error> {
        if matches!(
            t,
            OutputScriptType::PayToWitness | OutputScriptType::PayToP2shWitness
        ) && !self.coin.segwit
        {
            return Err(Error::SegwitNotEnabled);
        }

        let pk = public_key(&drv.bip32_derive_secp256k1(&o.address_n)?)?;

        // Multisig outputs must include the key at the output path
        let ms = match &o.multisig {
            Some(m) => {
                multisig_validate(m)?;
                multisig_pubkey_index(m, &pk)?;
                Some(multisig_script(m)?)
            }
            None => None,
        };

        match (t, ms) {
            (OutputScriptType::PayToAddress, None) => p2pkh(&hash160(&pk)),
            (OutputScriptType::PayToMultisig, Some(ms)) => p2sh(&hash160(&ms)),
            (OutputScriptType::PayToWitness, None) => p2wpkh(&hash160(&pk)),
            (OutputScriptType::PayToWitness, Some(ms)) => p2wsh(&sha256(&ms)),
            (OutputScriptType::PayToP2shWitness, None) => p2sh(&hash160(&p2wpkh(&hash160(&pk))?)),
            (OutputScriptType::PayToP2shWitness, Some(ms)) => p2sh(&hash160(&p2wsh(&sha256(&ms))?)),
            _ => Err(Error::InvalidScriptType),
        }
    }

    /// Check whether an output returns funds to the wallet spending the inputs
    pub fn is_change(&self, o: &TxOutput) -> bool {
        let p = &o.address_n;

        if p.is_empty() || o.address.is_some() || !o.script_type.allows_change() {
            return false;
        }

        if !self.wallet_path.matches(p) {
            return false;
        }

        let (chain, index) = (p[p.len() - 2], p[p.len() - 1]);
        if chain > 1 || index > MAX_CHANGE_INDEX {
            return false;
        }

        match (&o.multisig, &self.multisig) {
            (Some(m), MultisigWallet::Set(fp)) => {
                matches!(multisig_fingerprint(m), Ok(f) if f == *fp)
            }
            (None, MultisigWallet::Single) => true,
            _ => false,
        }
    }

    /// Add a phase one output, returning a prompt where the output
    /// requires user confirmation
    #[cfg_attr(feature = "noinline", inline(never))]
    pub fn add_output(
        &mut self,
        index: u32,
        o: &TxOutput,
        drv: &impl Driver,
    ) -> Result<Option<Prompt>, Error> {
        let bin = self.compile_output(o, drv)?;
        let change = self.is_change(o);

        if change {
            if self.change_out.is_some() {
                return Err(Error::MultipleChangeOutputs);
            }
            self.change_out = Some(o.amount);
        }

        self.total_out = self
            .total_out
            .checked_add(o.amount)
            .ok_or(Error::ValueOverflow)?;

        self.commit.add_output(&bin)?;
        self.weight.add_output(&bin);

        if index + 1 == self.outputs_count {
            self.finish_outputs()?;
        }

        if change {
            #[cfg(feature = "log")]
            log::debug!("output {} is change", index);

            return Ok(None);
        }

        let destination = match (&o.address, &o.op_return_data) {
            (Some(a), _) => Destination::Address(a.clone()),
            (None, Some(d)) => Destination::OpReturn(d.clone()),
            (None, None) => Destination::Path(o.address_n.clone()),
        };

        Ok(Some(Prompt::Output {
            index,
            amount: o.amount,
            destination,
        }))
    }

    /// Complete phase one, snapshotting commitments
    fn finish_outputs(&mut self) -> Result<(), Error> {
        if self.total_out > self.total_in {
            #[cfg(feature = "log")]
            log::warn!("outputs {} exceed inputs {}", self.total_out, self.total_in);

            return Err(Error::NotEnoughFunds);
        }

        self.commitments = core::mem::take(&mut self.commit).finalize();

        Ok(())
    }

    /// Compute the next approval following `after`, updating the current prompt
    pub fn next_approval(&mut self, after: Approval) -> Option<Approval> {
        let mut next = after.next();

        while let Some(a) = next {
            if let Some(p) = self.approval_prompt(a) {
                self.set_prompt(p);
                return Some(a);
            }
            next = a.next();
        }

        self.prompt = None;
        None
    }

    fn approval_prompt(&self, a: Approval) -> Option<Prompt> {
        let fee = self.fee();

        match a {
            Approval::FeeOverThreshold if fee > self.weight.fee_threshold(self.coin.maxfee_kb) => {
                Some(Prompt::FeeOverThreshold { fee })
            }
            Approval::LockTime if self.lock_time != 0 => Some(Prompt::LockTime {
                lock_time: self.lock_time,
            }),
            Approval::Total => Some(Prompt::Total {
                spending: self.total_in - self.change_out.unwrap_or(0),
                fee,
            }),
            _ => None,
        }
    }

    /// Set the current prompt
    pub fn set_prompt(&mut self, p: Prompt) {
        #[cfg(feature = "log")]
        {
            use crate::helpers::fmt_coin_val;
            let mut buff = [0u8; 32];

            match &p {
                Prompt::Output {
                    index,
                    amount,
                    destination,
                } => log::info!(
                    "confirm output {}: {} to {:?}",
                    index,
                    fmt_coin_val(*amount, self.coin, &mut buff),
                    destination
                ),
                Prompt::FeeOverThreshold { fee } => log::info!(
                    "confirm high fee: {}",
                    fmt_coin_val(*fee, self.coin, &mut buff)
                ),
                Prompt::LockTime { lock_time } => log::info!("confirm lock time: {}", lock_time),
                Prompt::Total { spending, fee } => {
                    log::info!("confirm total: {}", fmt_coin_val(*spending, self.coin, &mut buff));
                    log::info!("including fee: {}", fmt_coin_val(*fee, self.coin, &mut buff));
                }
            }
        }

        self.prompt = Some(p);
    }

    /// Start phase two (serialization and signing)
    pub fn start_signing(&mut self) {
        self.stream = TxStream::new(self.inputs_count, self.outputs_count, self.segwit);
        self.pass_check = Hasher::new();
        self.prompt = None;
    }

    /// Add an input to the current pass check
    pub fn pass_input(&mut self, i: &TxInput) {
        hash_input_check(&mut self.pass_check, i);
    }

    /// Compare the current pass check with the provided commitment
    fn check_pass(&mut self, expected: &[u8; 32]) -> Result<(), Error> {
        let h = core::mem::take(&mut self.pass_check).finalize();

        if &h != expected {
            #[cfg(feature = "log")]
            log::warn!("transaction changed between passes");

            return Err(Error::TxChanged);
        }

        Ok(())
    }

    /// Serialize an input with the provided unlocking script,
    /// prefixed by the transaction header for the first input
    pub fn emit_input(
        &mut self,
        index: u32,
        i: &TxInput,
        script_sig: &[u8],
    ) -> Result<SerializedChunk, Error> {
        let mut c = SerializedChunk::default();

        if index == 0 {
            self.stream.header(&mut c.bytes, self.version)?;
        }
        self.stream.input(
            &mut c.bytes,
            &i.prev_hash,
            i.prev_index,
            script_sig,
            i.sequence,
        )?;

        Ok(c)
    }

    /// Sign an input using the BIP143 digest, consuming its authorized amount
    fn sign_bip143(
        &mut self,
        i: &TxInput,
        drv: &impl Driver,
    ) -> Result<(SignatureBytes, PublicKey), Error> {
        let amount = i.amount.ok_or(Error::MissingAmount)?;

        // Amounts may only be signed once and must not exceed phase one.
        // A lower amount is still signed here, the signature commits to it
        // and cannot spend the real output. Any mismatch with phase one is
        // caught by the inputs check at the last witness, so the footer is
        // never released for a changed transaction.
        if amount > self.authorized_in {
            #[cfg(feature = "log")]
            log::warn!("input amount {} exceeds authorized {}", amount, self.authorized_in);

            return Err(Error::TxChanged);
        }
        self.authorized_in -= amount;

        let key = drv.bip32_derive_secp256k1(&i.address_n)?;
        let pk = public_key(&key)?;
        let code = script_code(i, &pk)?;

        let digest = self.bip143_digest(i, &code, amount)?;
        let sig = sign_digest(self.coin, &key, &digest)?;

        Ok((sig, pk))
    }

    /// Compute the BIP143 signature digest for an input
    pub fn bip143_digest(
        &self,
        i: &TxInput,
        script_code: &[u8],
        amount: u64,
    ) -> Result<[u8; 32], Error> {
        let c = &self.commitments;
        let mut h = Hasher::new();

        h.update(&self.version.to_le_bytes());
        h.update(&c.hash_prevouts);
        h.update(&c.hash_sequence);

        let mut p = i.prev_hash;
        p.reverse();
        h.update(&p);
        h.update(&i.prev_index.to_le_bytes());

        write_bytes(&mut h, script_code)?;

        h.update(&amount.to_le_bytes());
        h.update(&i.sequence.to_le_bytes());
        h.update(&c.hash_outputs);
        h.update(&self.lock_time.to_le_bytes());
        h.update(&self.coin.sighash_type().to_le_bytes());

        Ok(h.finalize_double())
    }

    /// Phase two input not requiring a legacy re-stream
    #[cfg_attr(feature = "noinline", inline(never))]
    pub fn segwit_input(
        &mut self,
        index: u32,
        i: &TxInput,
        drv: &impl Driver,
    ) -> Result<SerializedChunk, Error> {
        self.check_input(i)?;

        if !self.is_bip143(i) {
            return Err(Error::TxChanged);
        }

        self.pass_input(i);

        let mut signature = None;
        let script_sig: ScriptSig = match (i.script_type, &i.multisig) {
            (InputScriptType::SpendWitness, _) => ScriptSig::new(),
            (InputScriptType::SpendP2shWitness, Some(m)) => script_sig_p2sh_p2wsh(m)?,
            (InputScriptType::SpendP2shWitness, None) => {
                let pk = public_key(&drv.bip32_derive_secp256k1(&i.address_n)?)?;
                script_sig_p2sh_p2wpkh(&pk)?
            }
            // Non-segwit inputs on BIP143 coins are signed here
            (_, m) => {
                let (sig, pk) = self.sign_bip143(i, drv)?;
                let sighash = self.coin.sighash_byte();

                let s = match m {
                    Some(m) => {
                        script_sig_multisig(&multisig_with_signature(m, &pk, &sig)?, sighash)?
                    }
                    None => script_sig_p2pkh(&sig, sighash, &pk)?,
                };
                signature = Some((index, sig));
                s
            }
        };

        let mut c = self.emit_input(index, i, &script_sig)?;
        c.signature = signature;

        Ok(c)
    }

    /// Phase two output, returns the serialized output
    /// (followed by the lock time for non-segwit transactions)
    #[cfg_attr(feature = "noinline", inline(never))]
    pub fn final_output(
        &mut self,
        index: u32,
        o: &TxOutput,
        drv: &impl Driver,
    ) -> Result<SerializedChunk, Error> {
        let bin = self.compile_output(o, drv)?;

        hash_output_check(&mut self.pass_check, &bin)?;

        // Inputs and outputs must match phase one before emitting the final output
        if index + 1 == self.outputs_count {
            let expected = self.commitments.hash_check;
            self.check_pass(&expected)?;
        }

        let mut c = SerializedChunk::default();
        self.stream.output(&mut c.bytes, &bin)?;

        if index + 1 == self.outputs_count && !self.segwit {
            self.stream.footer(&mut c.bytes, self.lock_time)?;
        }

        Ok(c)
    }

    /// Phase three input, returns the witness for the input
    /// (followed by the lock time for the final input)
    #[cfg_attr(feature = "noinline", inline(never))]
    pub fn segwit_witness(
        &mut self,
        index: u32,
        i: &TxInput,
        drv: &impl Driver,
    ) -> Result<SerializedChunk, Error> {
        self.check_input(i)?;
        self.pass_input(i);

        let mut c = SerializedChunk::default();

        let witness = match (i.script_type.is_segwit(), &i.multisig) {
            (true, m) => {
                let (sig, pk) = self.sign_bip143(i, drv)?;
                let sighash = self.coin.sighash_byte();

                let w = match m {
                    Some(m) => {
                        witness_p2wsh_multisig(&multisig_with_signature(m, &pk, &sig)?, sighash)?
                    }
                    None => witness_p2wpkh(&sig, sighash, &pk)?,
                };
                c.signature = Some((index, sig));
                w
            }
            (false, _) => witness_empty(),
        };

        // Inputs must match phase one before the transaction is completed
        if index + 1 == self.inputs_count {
            let expected = self.commitments.hash_inputs_check;
            self.check_pass(&expected)?;
        }

        self.stream.witness(&mut c.bytes, &witness)?;

        if index + 1 == self.inputs_count {
            self.stream.footer(&mut c.bytes, self.lock_time)?;
        }

        Ok(c)
    }
}

/// Map script capacity failures to compilation errors
fn compile_error(e: Error) -> Error {
    match e {
        Error::InvalidLength => Error::CompileFailed,
        e => e,
    }
}

impl Zeroize for Session {
    fn zeroize(&mut self) {
        self.total_in.zeroize();
        self.total_out.zeroize();
        self.change_out = None;
        self.authorized_in.zeroize();
        self.commitments.zeroize();
        self.pass_check.zeroize();
        self.next_legacy = None;
        self.prompt = None;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.zeroize();
    }
}
