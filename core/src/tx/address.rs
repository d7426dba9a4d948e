// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Address decoding (base58check and bech32 / bech32m)

use alloc::vec::Vec;

use bech32::{FromBase32, Variant};

use super::script::{p2pkh, p2sh, witness_program, ScriptPubKey};
use crate::{coins::CoinInfo, engine::Error};

/// Decoded address kinds
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum AddressKind {
    P2pkh,
    P2sh,
    Witness(u8),
}

/// Decode an address for the provided coin to a locking script
#[cfg_attr(feature = "noinline", inline(never))]
pub fn address_to_script(coin: &CoinInfo, address: &str) -> Result<(AddressKind, ScriptPubKey), Error> {
    // Bech32 addresses are matched by prefix, everything else is base58
    if let Some(hrp) = coin.bech32_prefix {
        let a = address.as_bytes();
        if a.len() > hrp.len()
            && a[..hrp.len()].eq_ignore_ascii_case(hrp.as_bytes())
            && a[hrp.len()] == b'1'
        {
            return decode_segwit(coin, hrp, address);
        }
    }

    decode_base58(coin, address)
}

fn decode_segwit(
    coin: &CoinInfo,
    hrp: &str,
    address: &str,
) -> Result<(AddressKind, ScriptPubKey), Error> {
    if !coin.segwit {
        return Err(Error::SegwitNotEnabled);
    }

    let (h, data, variant) = bech32::decode(address).map_err(|_e| {
        #[cfg(feature = "log")]
        log::warn!("bech32 decode failed: {:?}", _e);

        Error::InvalidAddress
    })?;

    if h != hrp || data.is_empty() {
        return Err(Error::InvalidAddress);
    }

    let version = data[0].to_u8();
    let program = Vec::<u8>::from_base32(&data[1..]).map_err(|_| Error::InvalidAddress)?;

    // BIP173 / BIP350 version and encoding rules
    match (version, variant, program.len()) {
        (0, Variant::Bech32, 20 | 32) => (),
        (1..=16, Variant::Bech32m, 2..=40) => (),
        _ => return Err(Error::InvalidAddress),
    }

    let script = witness_program(version, &program)?;

    Ok((AddressKind::Witness(version), script))
}

/// Length of an address version prefix, in bytes
fn version_len(v: u32) -> usize {
    match v {
        0..=0xff => 1,
        0x100..=0xffff => 2,
        0x1_0000..=0xff_ffff => 3,
        _ => 4,
    }
}

/// Check a decoded payload for the provided version prefix,
/// returning the remaining hash
fn strip_version(v: u32, data: &[u8]) -> Option<[u8; 20]> {
    let n = version_len(v);
    let prefix = &v.to_be_bytes()[4 - n..];

    if data.len() != n + 20 || &data[..n] != prefix {
        return None;
    }

    let mut h = [0u8; 20];
    h.copy_from_slice(&data[n..]);
    Some(h)
}

fn decode_base58(coin: &CoinInfo, address: &str) -> Result<(AddressKind, ScriptPubKey), Error> {
    let data = bs58::decode(address)
        .with_check(None)
        .into_vec()
        .map_err(|_| Error::InvalidAddress)?;

    if let Some(h) = strip_version(coin.address_type, &data) {
        return Ok((AddressKind::P2pkh, p2pkh(&h)?));
    }

    if let Some(h) = strip_version(coin.address_type_p2sh, &data) {
        return Ok((AddressKind::P2sh, p2sh(&h)?));
    }

    #[cfg(feature = "log")]
    log::warn!("address version mismatch for coin {}", coin.name);

    Err(Error::InvalidAddress)
}

#[cfg(test)]
mod test {
    use bech32::{ToBase32, u5};

    use super::*;

    fn coin(name: &str) -> &'static CoinInfo {
        CoinInfo::by_name(name).unwrap()
    }

    fn base58(version: u8, h: &[u8; 20]) -> alloc::string::String {
        let mut d = alloc::vec![version];
        d.extend_from_slice(h);
        bs58::encode(d).with_check().into_string()
    }

    #[test]
    fn decode_base58_addresses() {
        let h = [0x5au8; 20];

        let (k, s) = address_to_script(coin("Testnet"), &base58(111, &h)).unwrap();
        assert_eq!(k, AddressKind::P2pkh);
        assert_eq!(s, p2pkh(&h).unwrap());

        let (k, s) = address_to_script(coin("Testnet"), &base58(196, &h)).unwrap();
        assert_eq!(k, AddressKind::P2sh);
        assert_eq!(s, p2sh(&h).unwrap());

        // Mainnet address on testnet
        assert_eq!(
            address_to_script(coin("Testnet"), &base58(0, &h)),
            Err(Error::InvalidAddress)
        );

        // Corrupt checksum
        let mut a = base58(111, &h);
        a.pop();
        a.push('1');
        assert_eq!(
            address_to_script(coin("Testnet"), &a),
            Err(Error::InvalidAddress)
        );
    }

    #[test]
    fn decode_bech32_addresses() {
        // BIP173 test vector
        let (k, s) =
            address_to_script(coin("Bitcoin"), "BC1QW508D6QEJXTDG4Y5R3ZARVARY0C5XW7KV8F3T4")
                .unwrap();
        assert_eq!(k, AddressKind::Witness(0));
        assert_eq!(
            &s[..],
            &[
                0x00, 0x14, 0x75, 0x1e, 0x76, 0xe8, 0x19, 0x91, 0x96, 0xd4, 0x54, 0x94, 0x1c,
                0x45, 0xd1, 0xb3, 0xa3, 0x23, 0xf1, 0x43, 0x3b, 0xd6
            ]
        );

        // BIP350 taproot test vector
        let (k, s) = address_to_script(
            coin("Bitcoin"),
            "bc1p0xlxvlhemja6c4dqv22uapctqupfhlxm9h8z3k2e72q4k9hcz7vqzk5jj0",
        )
        .unwrap();
        assert_eq!(k, AddressKind::Witness(1));
        assert_eq!(&s[..2], &[0x51, 0x20]);
        assert_eq!(&s[2..6], &[0x79, 0xbe, 0x66, 0x7e]);
    }

    #[test]
    fn reject_bech32_variants() {
        let program = [0x11u8; 20];

        let mut d = alloc::vec![u5::try_from_u8(0).unwrap()];
        d.extend_from_slice(&program.to_base32());

        // Version 0 with bech32m checksum
        let a = bech32::encode("tb", &d, Variant::Bech32m).unwrap();
        assert_eq!(
            address_to_script(coin("Testnet"), &a),
            Err(Error::InvalidAddress)
        );

        // Correct encoding accepted
        let a = bech32::encode("tb", &d, Variant::Bech32).unwrap();
        assert!(address_to_script(coin("Testnet"), &a).is_ok());

        // Wrong network prefix falls through to base58 and fails
        let a = bech32::encode("bc", &d, Variant::Bech32).unwrap();
        assert_eq!(
            address_to_script(coin("Testnet"), &a),
            Err(Error::InvalidAddress)
        );
    }
}
