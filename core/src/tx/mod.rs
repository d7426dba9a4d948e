// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Bitcoin transaction primitives used by the signing [Engine][crate::engine::Engine]
//!
//! These operate on a single transaction object at a time, serialized data is
//! written to a [`Sink`] (either a running [`Hasher`] or an outbound chunk).

mod serialize;
pub use serialize::{varint_len, write_bytes, write_output, write_varint, Sink, Stage, TxStream};

mod hash;
pub use hash::{
    hash160, hash_input_check, hash_output_check, sha256, CommitmentSet, Commitments, Hasher,
};

pub mod script;

mod multisig;
pub use multisig::{multisig_fingerprint, multisig_pubkey_index, multisig_validate};

mod address;
pub use address::{address_to_script, AddressKind};

mod weight;
pub use weight::TxWeight;
