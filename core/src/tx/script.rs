// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Script and witness compiler

use heapless::Vec;

use super::{hash160, serialize::write_varint, sha256, Sink};
use crate::{
    apdu::tx::{Multisig, PublicKey, SignatureBytes, MAX_SCRIPT_PUBKEY_LEN, MAX_SCRIPT_SIG_LEN},
    engine::Error,
};

/// Locking script (`script_pubkey`)
pub type ScriptPubKey = Vec<u8, MAX_SCRIPT_PUBKEY_LEN>;

/// Unlocking script (`script_sig`)
pub type ScriptSig = Vec<u8, MAX_SCRIPT_SIG_LEN>;

/// Serialized witness stack
pub type Witness = Vec<u8, MAX_SCRIPT_SIG_LEN>;

pub const OP_0: u8 = 0x00;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_1: u8 = 0x51;
pub const OP_RETURN: u8 = 0x6a;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_CHECKMULTISIG: u8 = 0xae;

/// Length of the push opcode(s) for `n` bytes of data
pub fn op_push_len(n: usize) -> usize {
    match n {
        0..=0x4b => 1,
        0x4c..=0xff => 2,
        0x100..=0xffff => 3,
        _ => 5,
    }
}

/// Write push opcode(s) for `n` bytes of data
pub fn op_push(s: &mut impl Sink, n: usize) -> Result<(), Error> {
    match n {
        0..=0x4b => s.write(&[n as u8]),
        0x4c..=0xff => s.write(&[OP_PUSHDATA1, n as u8]),
        0x100..=0xffff => {
            s.write(&[OP_PUSHDATA2])?;
            s.write(&(n as u16).to_le_bytes())
        }
        _ => {
            s.write(&[OP_PUSHDATA4])?;
            s.write(&(n as u32).to_le_bytes())
        }
    }
}

/// Write a data push
pub fn push_data(s: &mut impl Sink, d: &[u8]) -> Result<(), Error> {
    op_push(s, d.len())?;
    s.write(d)
}

/// P2PKH locking script
pub fn p2pkh(h: &[u8; 20]) -> Result<ScriptPubKey, Error> {
    let mut s = ScriptPubKey::new();
    s.write(&[OP_DUP, OP_HASH160])?;
    push_data(&mut s, h)?;
    s.write(&[OP_EQUALVERIFY, OP_CHECKSIG])?;
    Ok(s)
}

/// P2SH locking script
pub fn p2sh(h: &[u8; 20]) -> Result<ScriptPubKey, Error> {
    let mut s = ScriptPubKey::new();
    s.write(&[OP_HASH160])?;
    push_data(&mut s, h)?;
    s.write(&[OP_EQUAL])?;
    Ok(s)
}

/// Segwit locking script for a witness version and program
pub fn witness_program(version: u8, program: &[u8]) -> Result<ScriptPubKey, Error> {
    if version > 16 || program.len() < 2 || program.len() > 40 {
        return Err(Error::InvalidAddress);
    }

    let v = match version {
        0 => OP_0,
        _ => OP_1 + version - 1,
    };

    let mut s = ScriptPubKey::new();
    s.write(&[v])?;
    push_data(&mut s, program)?;
    Ok(s)
}

/// P2WPKH locking script
pub fn p2wpkh(h: &[u8; 20]) -> Result<ScriptPubKey, Error> {
    witness_program(0, h)
}

/// P2WSH locking script
pub fn p2wsh(h: &[u8; 32]) -> Result<ScriptPubKey, Error> {
    witness_program(0, h)
}

/// OP_RETURN locking script
pub fn op_return(data: &[u8]) -> Result<ScriptPubKey, Error> {
    let mut s = ScriptPubKey::new();
    s.write(&[OP_RETURN])?;
    push_data(&mut s, data)?;
    Ok(s)
}

/// Multisig redeem / witness script,
/// `OP_m <pubkey>... OP_n OP_CHECKMULTISIG`
pub fn multisig_script(m: &Multisig) -> Result<ScriptPubKey, Error> {
    let n = m.n();
    if m.m == 0 || m.m as usize > n || n > 16 {
        return Err(Error::InvalidMultisig);
    }

    let mut s = ScriptPubKey::new();

    s.write(&[OP_1 + m.m - 1])?;
    for k in m.pubkeys.iter() {
        push_data(&mut s, k)?;
    }
    s.write(&[OP_1 + n as u8 - 1, OP_CHECKMULTISIG])?;

    Ok(s)
}

/// P2PKH scriptCode, used for P2PKH and P2WPKH signature digests
pub fn p2pkh_script_code(pubkey: &PublicKey) -> Result<ScriptPubKey, Error> {
    p2pkh(&hash160(pubkey))
}

/// Write a signature with appended sighash byte as a script push
fn push_sig(s: &mut impl Sink, sig: &[u8], sighash: u8) -> Result<(), Error> {
    op_push(s, sig.len() + 1)?;
    s.write(sig)?;
    s.write(&[sighash])
}

/// Write a signature with appended sighash byte as a witness item
fn witness_sig(s: &mut impl Sink, sig: &[u8], sighash: u8) -> Result<(), Error> {
    write_varint(s, sig.len() as u32 + 1)?;
    s.write(sig)?;
    s.write(&[sighash])
}

/// P2PKH unlocking script, `<sig> <pubkey>`
pub fn script_sig_p2pkh(sig: &[u8], sighash: u8, pubkey: &PublicKey) -> Result<ScriptSig, Error> {
    let mut s = ScriptSig::new();
    push_sig(&mut s, sig, sighash)?;
    push_data(&mut s, pubkey)?;
    Ok(s)
}

/// P2SH multisig unlocking script, `OP_0 <sig>... <redeem script>`
///
/// Signatures are included in public key order, empty slots are skipped.
pub fn script_sig_multisig(m: &Multisig, sighash: u8) -> Result<ScriptSig, Error> {
    let redeem = multisig_script(m)?;

    let mut s = ScriptSig::new();
    s.write(&[OP_0])?;
    for sig in m.signatures.iter().filter(|s| !s.is_empty()) {
        push_sig(&mut s, sig, sighash)?;
    }
    push_data(&mut s, &redeem)?;

    Ok(s)
}

/// P2SH-P2WPKH unlocking script, pushes the witness program
pub fn script_sig_p2sh_p2wpkh(pubkey: &PublicKey) -> Result<ScriptSig, Error> {
    let p = p2wpkh(&hash160(pubkey))?;
    let mut s = ScriptSig::new();
    push_data(&mut s, &p)?;
    Ok(s)
}

/// P2SH-P2WSH unlocking script, pushes the witness program
pub fn script_sig_p2sh_p2wsh(m: &Multisig) -> Result<ScriptSig, Error> {
    let p = p2wsh(&sha256(&multisig_script(m)?))?;
    let mut s = ScriptSig::new();
    push_data(&mut s, &p)?;
    Ok(s)
}

/// P2WPKH witness, `<sig> <pubkey>`
pub fn witness_p2wpkh(sig: &[u8], sighash: u8, pubkey: &PublicKey) -> Result<Witness, Error> {
    let mut w = Witness::new();
    write_varint(&mut w, 2)?;
    witness_sig(&mut w, sig, sighash)?;
    write_varint(&mut w, pubkey.len() as u32)?;
    w.write(pubkey)?;
    Ok(w)
}

/// P2WSH multisig witness, `<> <sig>... <witness script>`
pub fn witness_p2wsh_multisig(m: &Multisig, sighash: u8) -> Result<Witness, Error> {
    let script = multisig_script(m)?;
    let sigs = m.signatures.iter().filter(|s| !s.is_empty());

    let mut w = Witness::new();
    write_varint(&mut w, 2 + sigs.clone().count() as u32)?;
    write_varint(&mut w, 0)?;
    for sig in sigs {
        witness_sig(&mut w, sig, sighash)?;
    }
    write_varint(&mut w, script.len() as u32)?;
    w.write(&script)?;

    Ok(w)
}

/// Empty witness, for non-segwit inputs of segwit transactions
pub fn witness_empty() -> Witness {
    let mut w = Witness::new();
    let _ = w.push(0x00);
    w
}
