// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Multisig descriptor helpers

use heapless::Vec;

use super::Hasher;
use crate::{
    apdu::tx::{Multisig, PublicKey, MAX_MULTISIG_KEYS},
    engine::Error,
};

/// Check multisig descriptor parameters
pub fn multisig_validate(m: &Multisig) -> Result<(), Error> {
    let n = m.n();

    if m.m == 0 || m.m as usize > n || n > MAX_MULTISIG_KEYS || m.signatures.len() != n {
        #[cfg(feature = "log")]
        log::warn!("invalid multisig {}-of-{}", m.m, n);

        return Err(Error::InvalidMultisig);
    }

    Ok(())
}

/// Compute a fingerprint identifying a multisig wallet,
/// independent of public key ordering
pub fn multisig_fingerprint(m: &Multisig) -> Result<[u8; 32], Error> {
    multisig_validate(m)?;

    let mut keys: Vec<&PublicKey, MAX_MULTISIG_KEYS> = m.pubkeys.iter().collect();
    keys.sort_unstable();

    let mut h = Hasher::new();
    h.update(&[m.m, m.n() as u8]);
    for k in keys {
        h.update(k);
    }

    Ok(h.finalize())
}

/// Locate the signer's public key within a multisig descriptor
pub fn multisig_pubkey_index(m: &Multisig, pubkey: &PublicKey) -> Result<usize, Error> {
    m.pubkeys
        .iter()
        .position(|k| k == pubkey)
        .ok_or(Error::MultisigKeyNotFound)
}
