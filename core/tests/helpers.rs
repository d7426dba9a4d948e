// Copyright (c) 2022-2023 The MobileCoin Foundation

#![allow(unused)]

use std::collections::HashMap;

use bip32::{ChildNumber, XPrv};
use bip39::{Language, Mnemonic, Seed};
use bitcoin::{
    absolute::LockTime,
    consensus::serialize,
    hashes::{hash160, sha256d, Hash},
    secp256k1::{ecdsa, Message, Secp256k1},
    transaction::Version,
    Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness,
};
use encdec::{DecodeOwned, Encode};
use k256::{ecdsa::SigningKey, elliptic_curve::sec1::ToEncodedPoint};
use ledger_proto::ApduStatic;
use log::{debug, trace};

use ledger_btc_core::{
    apdu::{
        chain::{
            fragments, ChainBuffer, ResponseChain, TxGetResponse, MAX_APDU_PAYLOAD,
            MAX_CHAINED_LEN,
        },
        state::TxState,
        tx::{
            PrevInput, PublicKey, RequestType, TxCancel, TxInfoReq, TxInit, TxInput, TxInputAck,
            TxOutput, TxOutputAck, TxOutputBin, TxPrevExtraData, TxPrevInputAck, TxPrevMeta,
            TxPrevOutputAck, TxRequest, TxResponse,
        },
        ApduError,
    },
    engine::{Driver, Engine, Error, Event, Prompt},
};

pub const MNEMONIC: &str = "duck deal pretty pen thunder economy wide common goose fit engine main aisle curtain choose cube claim snake enroll detect brief history float unit";

/// BIP84 testnet receive / change paths
pub const PATH: [u32; 5] = [0x8000_0054, 0x8000_0001, 0x8000_0000, 0, 0];
pub const PATH_1: [u32; 5] = [0x8000_0054, 0x8000_0001, 0x8000_0000, 0, 1];
pub const CHANGE: [u32; 5] = [0x8000_0054, 0x8000_0001, 0x8000_0000, 1, 0];
pub const CHANGE_1: [u32; 5] = [0x8000_0054, 0x8000_0001, 0x8000_0000, 1, 1];

/// BIP44 testnet receive / change paths
pub const LEGACY: [u32; 5] = [0x8000_002c, 0x8000_0001, 0x8000_0000, 0, 0];
pub const LEGACY_CHANGE: [u32; 5] = [0x8000_002c, 0x8000_0001, 0x8000_0000, 1, 0];

/// Path in another account, never change
pub const EXTERNAL: [u32; 5] = [0x8000_0054, 0x8000_0001, 0x8000_0007, 0, 3];

/// BIP173 testnet P2WPKH vector
pub const SEGWIT_ADDRESS: &str = "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx";

pub fn setup_logging() {
    let _ = simplelog::SimpleLogger::init(log::LevelFilter::Debug, Default::default());
}

/// Driver implementation for test use, BIP32 derivation from a BIP39 seed
pub struct TestDriver {
    seed: Seed,
}

impl TestDriver {
    pub fn new(seed: Seed) -> Self {
        Self { seed }
    }

    /// Create a test driver using the default test mnemonic
    pub fn from_mnemonic() -> anyhow::Result<Self> {
        let mnemonic = Mnemonic::from_phrase(MNEMONIC, Language::English)?;
        Ok(Self::new(Seed::new(&mnemonic, "")))
    }

    /// Fetch the compressed public key for a path
    pub fn public_key(&self, path: &[u32]) -> PublicKey {
        let k = self.bip32_derive_secp256k1(path).unwrap();
        let p = k.verifying_key().as_affine().to_encoded_point(true);
        p.as_bytes().try_into().unwrap()
    }
}

impl Driver for TestDriver {
    fn bip32_derive_secp256k1(&self, path: &[u32]) -> Result<SigningKey, Error> {
        let mut k = XPrv::new(self.seed.as_bytes()).map_err(|_| Error::DerivationFailed)?;

        for p in path {
            k = k
                .derive_child(ChildNumber(*p))
                .map_err(|_| Error::DerivationFailed)?;
        }

        Ok(k.private_key().clone())
    }
}

/// Hash a public key to a 20-byte key hash
pub fn key_hash(pk: &PublicKey) -> [u8; 20] {
    hash160::Hash::hash(pk).to_byte_array()
}

pub fn p2pkh_script(pk: &PublicKey) -> ScriptBuf {
    let mut s = vec![0x76, 0xa9, 0x14];
    s.extend_from_slice(&key_hash(pk));
    s.extend_from_slice(&[0x88, 0xac]);
    ScriptBuf::from_bytes(s)
}

pub fn p2wpkh_script(pk: &PublicKey) -> ScriptBuf {
    let mut s = vec![0x00, 0x14];
    s.extend_from_slice(&key_hash(pk));
    ScriptBuf::from_bytes(s)
}

/// Funding transaction, with any trailing extra data (Dash special transactions)
#[derive(Clone, Debug)]
pub struct PrevTx {
    pub tx: Transaction,
    pub extra_data: Vec<u8>,
}

impl PrevTx {
    /// Create a funding transaction paying `outputs`
    pub fn new(outputs: &[(u64, ScriptBuf)]) -> Self {
        let tx = Transaction {
            version: Version::ONE,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint {
                    txid: Txid::from_byte_array([0x5c; 32]),
                    vout: 3,
                },
                script_sig: ScriptBuf::from_bytes(vec![0x51, 0x52, 0x53]),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            }],
            output: outputs
                .iter()
                .map(|(v, s)| TxOut {
                    value: Amount::from_sat(*v),
                    script_pubkey: s.clone(),
                })
                .collect(),
        };

        Self {
            tx,
            extra_data: vec![],
        }
    }

    pub fn with_extra_data(mut self, d: &[u8]) -> Self {
        self.extra_data = d.to_vec();
        self
    }

    /// Transaction hash (display order)
    pub fn hash(&self) -> [u8; 32] {
        let mut b = serialize(&self.tx);
        b.extend_from_slice(&self.extra_data);

        let mut h = sha256d::Hash::hash(&b).to_byte_array();
        h.reverse();
        h
    }
}

/// Host side of a signing operation
#[derive(Clone)]
pub struct Host {
    pub coin: &'static str,
    pub version: u32,
    pub lock_time: u32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub prev: Vec<PrevTx>,

    /// Modify an input before it is supplied, called with the number
    /// of times the input has previously been requested
    pub tamper_input: Option<fn(usize, u32, &mut TxInput)>,
    /// Modify a previous transaction before it is replayed
    pub tamper_prev: Option<fn(&mut PrevTx)>,
}

impl Host {
    pub fn new(coin: &'static str, inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        Self {
            coin,
            version: 2,
            lock_time: 0,
            inputs,
            outputs,
            prev: vec![],
            tamper_input: None,
            tamper_prev: None,
        }
    }

    pub fn with_prev(mut self, p: PrevTx) -> Self {
        self.prev.push(p);
        self
    }

    fn prev(&self, hash: &[u8; 32]) -> PrevTx {
        let mut p = self
            .prev
            .iter()
            .find(|p| &p.hash() == hash)
            .cloned()
            .expect("unknown previous transaction");

        if let Some(t) = self.tamper_prev {
            t(&mut p);
        }

        p
    }
}

/// Completed signing operation
#[derive(Clone, Debug)]
pub struct Signed {
    /// Concatenated serialized chunks
    pub raw: Vec<u8>,
    /// DER signatures by input index
    pub signatures: Vec<(u32, Vec<u8>)>,
    /// Prompts shown to the user
    pub prompts: Vec<Prompt>,
}

impl Signed {
    pub fn tx(&self) -> Transaction {
        bitcoin::consensus::deserialize(&self.raw).expect("invalid transaction")
    }

    pub fn signature(&self, index: u32) -> ecdsa::Signature {
        let (_, s) = self
            .signatures
            .iter()
            .find(|(i, _)| *i == index)
            .expect("missing signature");

        ecdsa::Signature::from_der(s).expect("invalid signature encoding")
    }
}

/// Exchange an APDU with the engine, via the APDU encodings and
/// chaining of objects exceeding a single short APDU
pub fn exchange<A>(e: &mut Engine<TestDriver>, apdu: &A) -> Result<TxResponse, Error>
where
    A: Encode<Error = ApduError> + ApduStatic + core::fmt::Debug,
{
    let mut buff = [0u8; MAX_CHAINED_LEN];

    debug!("cmd: {:?}", apdu);

    let n = apdu.encode(&mut buff).unwrap();
    trace!("encoded: {:02x?}", &buff[..n]);

    // Device side reassembly of command fragments
    let mut chain = ChainBuffer::<MAX_CHAINED_LEN>::new();
    let mut cmd = None;
    for f in fragments(A::CLA, A::INS, &buff[..n]) {
        assert!(
            f.data.len() < MAX_APDU_PAYLOAD,
            "fragment length {} exceeds maximum APDU payload",
            f.data.len()
        );

        if let Some(d) = chain.push(&f.header, f.data).unwrap() {
            cmd = Some(d.to_vec());
        }
    }
    let cmd = cmd.expect("incomplete command chain");

    let evt = match Event::parse(A::INS, &cmd) {
        Ok(v) => v,
        Err(e) => panic!("Decode failed with {:?} for: {:02x?}", e, &cmd),
    };

    let r = e.update(&evt)?;

    // Device response frames, fetched by the host with `TxGetResponse`
    let mut resp = ResponseChain::<MAX_CHAINED_LEN>::new();
    resp.load(|b| r.encode(b)).unwrap();

    let mut host = ChainBuffer::<MAX_CHAINED_LEN>::new();
    let mut frame = [0u8; MAX_APDU_PAYLOAD];
    let mut seq = 0;

    let data = loop {
        let n = resp.frame(seq, &mut frame).unwrap();
        assert!(n < MAX_APDU_PAYLOAD);

        if let Some(d) = host.push_frame(&frame[..n]).unwrap() {
            break d.to_vec();
        }

        let mut b = [0u8; 1];
        let req = TxGetResponse { seq: seq + 1 };
        req.encode(&mut b).unwrap();
        let (req, _) = TxGetResponse::decode_owned(&b).unwrap();
        seq = req.seq;
    };

    let (a, _) = TxResponse::decode_owned(&data).unwrap();
    Ok(a)
}

/// Execute a signing operation, answering engine requests from the host
/// and approving prompts with `approve`
pub fn sign(
    e: &mut Engine<TestDriver>,
    host: &Host,
    mut approve: impl FnMut(&Prompt) -> bool,
) -> Result<Signed, Error> {
    let mut signed = Signed {
        raw: vec![],
        signatures: vec![],
        prompts: vec![],
    };
    let mut input_requests = HashMap::<u32, usize>::new();

    let init = TxInit::new(
        host.coin,
        host.inputs.len() as u32,
        host.outputs.len() as u32,
        host.version,
        host.lock_time,
    )
    .unwrap();
    let mut resp = exchange(e, &init)?;

    loop {
        let req: TxRequest = match resp {
            TxResponse::Info(i) if i.state == TxState::Pending => {
                let p = e.prompt().cloned().expect("pending without prompt");

                match approve(&p) {
                    true => e.approve(),
                    false => e.deny(),
                }
                signed.prompts.push(p);

                resp = exchange(e, &TxInfoReq)?;
                continue;
            }
            TxResponse::Info(i) => panic!("unexpected state: {:?}", i.state),
            TxResponse::Request(r) => r,
        };

        if let Some(c) = &req.serialized {
            signed.raw.extend_from_slice(&c.bytes);
            if let Some((i, s)) = &c.signature {
                signed.signatures.push((*i, s.to_vec()));
            }
        }

        let index = req.request.index;

        resp = match req.request.kind {
            RequestType::Input => {
                let mut i = host.inputs[index as usize].clone();

                let n = input_requests.entry(index).or_default();
                if let Some(t) = host.tamper_input {
                    t(*n, index, &mut i);
                }
                *n += 1;

                exchange(e, &TxInputAck::new(index, i))?
            }
            RequestType::Output => {
                let o = host.outputs[index as usize].clone();
                exchange(e, &TxOutputAck::new(index, o))?
            }
            RequestType::PrevMeta => {
                let p = host.prev(&req.request.prev_hash.unwrap());

                let mut m = TxPrevMeta::new(
                    p.tx.version.0 as u32,
                    p.tx.lock_time.to_consensus_u32(),
                    p.tx.input.len() as u32,
                    p.tx.output.len() as u32,
                );
                m.extra_data_len = p.extra_data.len() as u32;

                exchange(e, &m)?
            }
            RequestType::PrevInput => {
                let p = host.prev(&req.request.prev_hash.unwrap());
                let i = &p.tx.input[index as usize];

                let mut prev_hash = i.previous_output.txid.to_byte_array();
                prev_hash.reverse();

                let i = PrevInput {
                    prev_hash,
                    prev_index: i.previous_output.vout,
                    sequence: i.sequence.0,
                    script_sig: heapless::Vec::from_slice(i.script_sig.as_bytes()).unwrap(),
                };

                exchange(e, &TxPrevInputAck::new(index, i))?
            }
            RequestType::PrevOutput => {
                let p = host.prev(&req.request.prev_hash.unwrap());
                let o = &p.tx.output[index as usize];

                let o = TxOutputBin::new(o.value.to_sat(), o.script_pubkey.as_bytes()).unwrap();

                exchange(e, &TxPrevOutputAck::new(index, o))?
            }
            RequestType::PrevExtraData => {
                let p = host.prev(&req.request.prev_hash.unwrap());
                let (offset, len) = req.request.extra_data.unwrap();

                let d = &p.extra_data[offset as usize..][..len as usize];

                exchange(e, &TxPrevExtraData::new(offset, d))?
            }
            RequestType::Finished => break,
        };
    }

    Ok(signed)
}

/// Approve every prompt
pub fn approve_all(_p: &Prompt) -> bool {
    true
}

/// Verify an ECDSA signature against a sighash message
pub fn verify(msg: [u8; 32], sig: &ecdsa::Signature, pk: &PublicKey) {
    let secp = Secp256k1::verification_only();
    let pk = bitcoin::secp256k1::PublicKey::from_slice(pk).unwrap();

    secp.verify_ecdsa(&Message::from_digest(msg), sig, &pk)
        .expect("signature verification failed");
}
