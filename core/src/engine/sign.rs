// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Key and signature helpers

use k256::{
    ecdsa::{signature::hazmat::PrehashSigner, Signature, SigningKey},
    elliptic_curve::sec1::ToEncodedPoint,
};

use crate::{
    apdu::tx::{Multisig, PublicKey, SignatureBytes, TxInput},
    coins::CoinInfo,
    tx::{
        multisig_pubkey_index,
        script::{multisig_script, p2pkh_script_code, ScriptPubKey},
    },
};

use super::Error;

/// Compute the compressed public key for a signing key
pub fn public_key(k: &SigningKey) -> Result<PublicKey, Error> {
    let p = k.verifying_key().as_affine().to_encoded_point(true);

    p.as_bytes()
        .try_into()
        .map_err(|_| Error::DerivationFailed)
}

/// Sign a 32-byte digest, returning the DER encoded signature
/// (without sighash byte, appended when the script or witness is compiled)
#[cfg_attr(feature = "noinline", inline(never))]
pub fn sign_digest(
    coin: &CoinInfo,
    k: &SigningKey,
    digest: &[u8; 32],
) -> Result<SignatureBytes, Error> {
    let sig: Signature = k.sign_prehash(digest).map_err(|_e| {
        #[cfg(feature = "log")]
        log::error!("signing failed: {:?}", _e);

        Error::SigningFailed
    })?;

    let sig = sig.normalize_s().unwrap_or(sig);

    if !coin.policy.is_canonical(&sig) {
        #[cfg(feature = "log")]
        log::error!("non-canonical signature for {}", coin.name);

        return Err(Error::SigningFailed);
    }

    SignatureBytes::from_slice(sig.to_der().as_bytes()).map_err(|_| Error::SigningFailed)
}

/// Script code committed to by an input signature,
/// the multisig redeem script or the P2PKH script for the signing key
pub fn script_code(i: &TxInput, pubkey: &PublicKey) -> Result<ScriptPubKey, Error> {
    match &i.multisig {
        Some(m) => {
            multisig_pubkey_index(m, pubkey)?;
            multisig_script(m)
        }
        None => p2pkh_script_code(pubkey),
    }
}

/// Insert a signature into the slot for the signing key
pub fn multisig_with_signature(
    m: &Multisig,
    pubkey: &PublicKey,
    sig: &SignatureBytes,
) -> Result<Multisig, Error> {
    let n = multisig_pubkey_index(m, pubkey)?;

    let mut m = m.clone();
    m.signatures[n] = sig.clone();

    Ok(m)
}
