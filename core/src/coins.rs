// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Coin parameters for supported Bitcoin-like networks

use core::fmt::Debug;

use k256::ecdsa::Signature;

/// Signature canonicality policy, applied to every signature
/// produced by the engine prior to emission
pub trait SignaturePolicy: Sync + Debug {
    /// Check whether a signature is acceptable for the coin
    fn is_canonical(&self, sig: &Signature) -> bool;
}

/// Low-S signature policy (BIP62 / BIP146)
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct LowS;

impl SignaturePolicy for LowS {
    fn is_canonical(&self, sig: &Signature) -> bool {
        // `normalize_s` returns a new signature only when s was high
        sig.normalize_s().is_none()
    }
}

/// Per-coin parameters
#[derive(Debug)]
pub struct CoinInfo {
    /// Coin name, as provided in [`TxInit`][crate::apdu::tx::TxInit]
    pub name: &'static str,
    /// Display ticker
    pub shortcut: &'static str,
    /// Display decimals
    pub decimals: u32,
    /// P2PKH address version
    pub address_type: u32,
    /// P2SH address version
    pub address_type_p2sh: u32,
    /// Maximum fee per kilobyte before the fee requires explicit confirmation
    pub maxfee_kb: u64,
    /// Segwit support
    pub segwit: bool,
    /// Bech32 human readable part
    pub bech32_prefix: Option<&'static str>,
    /// Replay protection fork id (sighash `FORKID` coins)
    pub fork_id: Option<u32>,
    /// Sign every input using the BIP143 digest
    pub force_bip143: bool,
    /// Transactions may carry trailing extra data
    pub extra_data: bool,
    /// SLIP44 coin type
    pub slip44: u32,
    /// Signature canonicality policy
    pub policy: &'static dyn SignaturePolicy,
}

/// `SIGHASH_ALL`
pub const SIGHASH_ALL: u32 = 0x01;

/// `SIGHASH_FORKID`
pub const SIGHASH_FORKID: u32 = 0x40;

impl CoinInfo {
    /// Sighash type committed to by signatures
    pub fn sighash_type(&self) -> u32 {
        match self.fork_id {
            Some(f) => SIGHASH_ALL | SIGHASH_FORKID | (f << 8),
            None => SIGHASH_ALL,
        }
    }

    /// Sighash byte appended to DER signatures
    pub fn sighash_byte(&self) -> u8 {
        (self.sighash_type() & 0xff) as u8
    }

    /// Look up coin information by name
    pub fn by_name(name: &str) -> Option<&'static CoinInfo> {
        COINS.iter().find(|c| c.name == name)
    }
}

/// Supported coins
pub static COINS: &[CoinInfo] = &[
    CoinInfo {
        name: "Bitcoin",
        shortcut: "BTC",
        decimals: 8,
        address_type: 0,
        address_type_p2sh: 5,
        maxfee_kb: 2_000_000,
        segwit: true,
        bech32_prefix: Some("bc"),
        fork_id: None,
        force_bip143: false,
        extra_data: false,
        slip44: 0,
        policy: &LowS,
    },
    CoinInfo {
        name: "Testnet",
        shortcut: "TEST",
        decimals: 8,
        address_type: 111,
        address_type_p2sh: 196,
        maxfee_kb: 10_000_000,
        segwit: true,
        bech32_prefix: Some("tb"),
        fork_id: None,
        force_bip143: false,
        extra_data: false,
        slip44: 1,
        policy: &LowS,
    },
    CoinInfo {
        name: "Litecoin",
        shortcut: "LTC",
        decimals: 8,
        address_type: 48,
        address_type_p2sh: 50,
        maxfee_kb: 67_000_000,
        segwit: true,
        bech32_prefix: Some("ltc"),
        fork_id: None,
        force_bip143: false,
        extra_data: false,
        slip44: 2,
        policy: &LowS,
    },
    CoinInfo {
        name: "Bcash",
        shortcut: "BCH",
        decimals: 8,
        address_type: 0,
        address_type_p2sh: 5,
        maxfee_kb: 500_000,
        segwit: false,
        bech32_prefix: None,
        fork_id: Some(0),
        force_bip143: true,
        extra_data: false,
        slip44: 145,
        policy: &LowS,
    },
    CoinInfo {
        name: "Dash",
        shortcut: "DASH",
        decimals: 8,
        address_type: 76,
        address_type_p2sh: 16,
        maxfee_kb: 100_000,
        segwit: false,
        bech32_prefix: None,
        fork_id: None,
        force_bip143: false,
        extra_data: true,
        slip44: 5,
        policy: &LowS,
    },
];

#[cfg(test)]
mod test {
    use k256::ecdsa::{signature::hazmat::PrehashSigner, SigningKey};

    use super::*;

    #[test]
    fn coin_lookup() {
        let c = CoinInfo::by_name("Testnet").unwrap();
        assert_eq!(c.shortcut, "TEST");
        assert_eq!(c.sighash_type(), 0x01);

        let c = CoinInfo::by_name("Bcash").unwrap();
        assert_eq!(c.sighash_type(), 0x41);
        assert_eq!(c.sighash_byte(), 0x41);

        assert!(CoinInfo::by_name("Dogecoin").is_none());
    }

    #[test]
    fn low_s_policy() {
        let k = SigningKey::from_bytes(&[0x11u8; 32].into()).unwrap();
        let sig: Signature = k.sign_prehash(&[0x22u8; 32]).unwrap();

        let low = sig.normalize_s().unwrap_or(sig);
        assert!(LowS.is_canonical(&low));

        // Negate s to produce the high-S form of the same signature
        let (r, s) = (low.r(), low.s());
        let high = Signature::from_scalars(r.to_bytes(), (-*s).to_bytes()).unwrap();
        assert!(!LowS.is_canonical(&high));
    }
}
