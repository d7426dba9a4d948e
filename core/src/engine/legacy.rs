// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Legacy (pre-BIP143) input signing
//!
//! The legacy signature digest covers the complete transaction, so all inputs
//! and outputs are re-streamed for each legacy input. The re-stream is checked
//! against the phase one commitment before the signature is released.

use zeroize::Zeroize;

use crate::{
    apdu::tx::{PublicKey, SerializedChunk, TxInput, TxOutput},
    tx::{
        hash_input_check, hash_output_check,
        script::{script_sig_multisig, script_sig_p2pkh},
        Hasher, Stage, TxStream,
    },
};

use super::{
    session::Session,
    sign::{multisig_with_signature, public_key, script_code, sign_digest},
    Driver, Error, SignState,
};

/// Legacy signer context, for a single input
pub struct LegacySigner {
    /// Index of the input being signed
    index: u32,

    stream: TxStream,
    /// Signature digest
    digest: Hasher,
    /// Check digest over re-streamed objects
    check: Hasher,

    /// Input being signed and its public key, captured during the re-stream
    signing: Option<(TxInput, PublicKey)>,

    /// Next legacy input following this one
    next_legacy: Option<u32>,
}

impl LegacySigner {
    /// Create a signer for input `index`
    pub fn new(index: u32, inputs_count: u32, outputs_count: u32) -> Self {
        Self {
            index,
            stream: TxStream::new(inputs_count, outputs_count, false),
            digest: Hasher::new(),
            check: Hasher::new(),
            signing: None,
            next_legacy: None,
        }
    }

    /// Fetch the next legacy input discovered during the re-stream
    pub fn next_legacy(&self) -> Option<u32> {
        self.next_legacy
    }

    /// Apply a re-streamed input
    #[cfg_attr(feature = "noinline", inline(never))]
    pub fn input(
        &mut self,
        session: &mut Session,
        drv: &impl Driver,
        n: u32,
        i: &TxInput,
    ) -> Result<SignState, Error> {
        session.check_input(i)?;

        if n == 0 {
            self.stream.header(&mut self.digest, session.version)?;
        }

        hash_input_check(&mut self.check, i);

        if n == self.index {
            if session.is_bip143(i) {
                #[cfg(feature = "log")]
                log::warn!("input {} re-streamed with BIP143 script type", n);

                return Err(Error::TxChanged);
            }

            let pk = public_key(&drv.bip32_derive_secp256k1(&i.address_n)?)?;
            let code = script_code(i, &pk)?;

            self.stream
                .input(&mut self.digest, &i.prev_hash, i.prev_index, &code, i.sequence)?;

            session.pass_input(i);
            self.signing = Some((i.clone(), pk));
        } else {
            if n > self.index && self.next_legacy.is_none() && !session.is_bip143(i) {
                self.next_legacy = Some(n);
            }

            self.stream
                .input(&mut self.digest, &i.prev_hash, i.prev_index, &[], i.sequence)?;
        }

        match self.stream.stage() {
            Stage::Inputs => Ok(SignState::Input(n + 1)),
            _ => Ok(SignState::Output(0)),
        }
    }

    /// Apply a re-streamed output, returns `None` once all outputs are received
    #[cfg_attr(feature = "noinline", inline(never))]
    pub fn output(
        &mut self,
        session: &Session,
        drv: &impl Driver,
        n: u32,
        o: &TxOutput,
    ) -> Result<Option<SignState>, Error> {
        let bin = session.compile_output(o, drv)?;

        hash_output_check(&mut self.check, &bin)?;
        self.stream.output(&mut self.digest, &bin)?;

        match self.stream.stage() {
            Stage::Outputs => Ok(Some(SignState::Output(n + 1))),
            _ => Ok(None),
        }
    }

    /// Check the re-stream and sign the input, returning the serialized input
    #[cfg_attr(feature = "noinline", inline(never))]
    pub fn finalize(
        &mut self,
        session: &mut Session,
        drv: &impl Driver,
    ) -> Result<SerializedChunk, Error> {
        self.stream.footer(&mut self.digest, session.lock_time)?;

        let check = core::mem::take(&mut self.check).finalize();
        if check != session.commitments.hash_check {
            #[cfg(feature = "log")]
            log::warn!("transaction changed during legacy signing of input {}", self.index);

            return Err(Error::TxChanged);
        }

        let (i, pk) = self.signing.take().ok_or(Error::InvalidState)?;

        let mut digest = core::mem::take(&mut self.digest);
        digest.update(&session.coin.sighash_type().to_le_bytes());
        let h = digest.finalize_double();

        let key = drv.bip32_derive_secp256k1(&i.address_n)?;
        let sig = sign_digest(session.coin, &key, &h)?;

        let sighash = session.coin.sighash_byte();
        let script_sig = match &i.multisig {
            Some(m) => script_sig_multisig(&multisig_with_signature(m, &pk, &sig)?, sighash)?,
            None => script_sig_p2pkh(&sig, sighash, &pk)?,
        };

        let mut c = session.emit_input(self.index, &i, &script_sig)?;
        c.signature = Some((self.index, sig));

        Ok(c)
    }
}

impl Zeroize for LegacySigner {
    fn zeroize(&mut self) {
        self.digest.zeroize();
        self.check.zeroize();
        self.signing = None;
    }
}

impl Drop for LegacySigner {
    fn drop(&mut self) {
        self.zeroize();
    }
}
