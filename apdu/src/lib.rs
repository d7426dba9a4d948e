// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Protocol / APDU definitions for streamed Bitcoin transaction signing
//!
//! This module provides a protocol specification and reference implementation for communication
//! between a host and a hardware wallet executing a streamed (input-by-input, output-by-output)
//! transaction signing operation.
//!
//! APDUs use a primitive binary encoding to simplify implementation with unsupported languages and platforms.
//! Encodings are intended to be _roughly_ equivalent to packed c structures while maintaining
//! 32-bit field alignment to reduce the need for unaligned access on constrained platforms.
//! All field encodings are little-endian.
//!
//! Note that Bitcoin transaction fields (prev hashes, scripts) are carried as opaque bytes,
//! the device applies Bitcoin serialization rules itself.

#![no_std]

pub use ledger_proto::{ApduError, ApduStatic};

pub mod chain;
pub mod prelude;
pub mod state;
pub mod tx;

mod helpers;

/// Bitcoin signing APDU Class
pub const BTC_APDU_CLA: u8 = 0xe1;

/// Protocol version
pub const BTC_PROTO_VERSION: u8 = 0x01;

/// APDU instruction codes
#[derive(Copy, Clone, Debug, PartialEq)]
#[repr(u8)]
pub enum Instruction {
    /// Start a signing operation
    TxInit = 0x20,

    /// Supply an input of the transaction being signed
    TxInput = 0x21,

    /// Supply an output of the transaction being signed
    TxOutput = 0x22,

    /// Supply the metadata of a previous transaction
    TxPrevMeta = 0x23,

    /// Supply an input of a previous transaction
    TxPrevInput = 0x24,

    /// Supply an output of a previous transaction
    TxPrevOutput = 0x25,

    /// Supply a chunk of previous transaction extra data
    TxPrevExtraData = 0x26,

    /// Cancel the signing operation
    TxCancel = 0x50,

    /// Fetch transaction state / outstanding request
    TxGetInfo = 0x51,

    /// Fetch a fragment of a chained response
    TxGetResponse = 0x52,
}

/// Helper macro for encoding `bitflags` types
#[macro_export]
macro_rules! encdec_bitflags {
    ($b:ty) => {
        impl encdec::Encode for $b {
            type Error = ApduError;

            fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
                let bits: u8 = self.bits();
                encdec::Encode::encode(&bits, buff).map_err(|e| e.into())
            }

            fn encode_len(&self) -> Result<usize, Self::Error> {
                let bits: u8 = self.bits();
                encdec::Encode::encode_len(&bits).map_err(|e| e.into())
            }
        }

        impl encdec::DecodeOwned for $b {
            type Output = $b;
            type Error = ApduError;

            fn decode_owned(buff: &[u8]) -> Result<(Self, usize), Self::Error> {
                if buff.is_empty() {
                    return Err(ApduError::InvalidLength);
                }
                let v = <$b>::from_bits_truncate(buff[0]);
                Ok((v, 1))
            }
        }
    };
}

/// Helper macro for encoding single-byte `#[repr(u8)]` enums
/// (requires a [`num_enum::TryFromPrimitive`] implementation)
#[macro_export]
macro_rules! encdec_enum {
    ($e:ty) => {
        impl encdec::Encode for $e {
            type Error = ApduError;

            fn encode_len(&self) -> Result<usize, ApduError> {
                Ok(1)
            }

            fn encode(&self, buff: &mut [u8]) -> Result<usize, ApduError> {
                if buff.is_empty() {
                    return Err(ApduError::InvalidLength);
                }
                buff[0] = *self as u8;
                Ok(1)
            }
        }

        impl encdec::DecodeOwned for $e {
            type Output = Self;
            type Error = ApduError;

            fn decode_owned(buff: &[u8]) -> Result<(<$e as encdec::DecodeOwned>::Output, usize), ApduError> {
                if buff.is_empty() {
                    return Err(ApduError::InvalidLength);
                }

                match <$e>::try_from(buff[0]) {
                    Ok(v) => Ok((v, 1)),
                    Err(_) => Err(ApduError::InvalidEncoding),
                }
            }
        }
    };
}
