// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Incremental transaction serialization

use heapless::Vec;

use super::Hasher;
use crate::{apdu::tx::TxOutputBin, engine::Error};

/// Destination for serialized transaction data
pub trait Sink {
    fn write(&mut self, d: &[u8]) -> Result<(), Error>;
}

impl Sink for Hasher {
    fn write(&mut self, d: &[u8]) -> Result<(), Error> {
        self.update(d);
        Ok(())
    }
}

impl<const N: usize> Sink for Vec<u8, N> {
    fn write(&mut self, d: &[u8]) -> Result<(), Error> {
        self.extend_from_slice(d).map_err(|_| Error::InvalidLength)
    }
}

/// Length of a compact-size encoded integer
pub const fn varint_len(n: u32) -> usize {
    match n {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        _ => 5,
    }
}

/// Write a compact-size encoded integer
pub fn write_varint(s: &mut impl Sink, n: u32) -> Result<(), Error> {
    match n {
        0..=0xfc => s.write(&[n as u8]),
        0xfd..=0xffff => {
            s.write(&[0xfd])?;
            s.write(&(n as u16).to_le_bytes())
        }
        _ => {
            s.write(&[0xfe])?;
            s.write(&n.to_le_bytes())
        }
    }
}

/// Write a length-prefixed byte string
pub fn write_bytes(s: &mut impl Sink, d: &[u8]) -> Result<(), Error> {
    write_varint(s, d.len() as u32)?;
    s.write(d)
}

/// Write a transaction output (amount and length-prefixed script)
pub fn write_output(s: &mut impl Sink, o: &TxOutputBin) -> Result<(), Error> {
    s.write(&o.amount.to_le_bytes())?;
    write_bytes(s, &o.script_pubkey)
}

/// Serialization stage, advanced by [`TxStream`] operations
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum Stage {
    Header,
    Inputs,
    Outputs,
    Witnesses,
    Footer,
    ExtraData,
    Done,
}

/// Serialization accumulator, tracks the serialization of a single
/// transaction and enforces item ordering and counts
#[derive(Clone, PartialEq, Debug)]
pub struct TxStream {
    inputs_count: u32,
    outputs_count: u32,
    extra_data_len: u32,
    segwit: bool,

    inputs: u32,
    outputs: u32,
    witnesses: u32,
    extra_data: u32,

    stage: Stage,
}

impl TxStream {
    /// Create a new serialization accumulator
    pub fn new(inputs_count: u32, outputs_count: u32, segwit: bool) -> Self {
        Self {
            inputs_count,
            outputs_count,
            extra_data_len: 0,
            segwit,
            inputs: 0,
            outputs: 0,
            witnesses: 0,
            extra_data: 0,
            stage: Stage::Header,
        }
    }

    /// Set length of trailing extra data
    pub fn with_extra_data(mut self, extra_data_len: u32) -> Self {
        self.extra_data_len = extra_data_len;
        self
    }

    /// Fetch current serialization stage
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Fetch number of extra data bytes serialized
    pub fn extra_data_written(&self) -> u32 {
        self.extra_data
    }

    fn check(&self, stage: Stage) -> Result<(), Error> {
        if self.stage != stage {
            #[cfg(feature = "log")]
            log::warn!("serialization stage {:?}, expected {:?}", self.stage, stage);

            return Err(Error::SerializationOrder);
        }
        Ok(())
    }

    /// Write transaction header (version, segwit marker, input count)
    pub fn header(&mut self, s: &mut impl Sink, version: u32) -> Result<(), Error> {
        self.check(Stage::Header)?;

        s.write(&version.to_le_bytes())?;
        if self.segwit {
            s.write(&[0x00, 0x01])?;
        }
        write_varint(s, self.inputs_count)?;

        self.stage = match self.inputs_count {
            0 => self.outputs_start(s)?,
            _ => Stage::Inputs,
        };

        Ok(())
    }

    /// Write an input, `prev_hash` is in display (big-endian) order
    pub fn input(
        &mut self,
        s: &mut impl Sink,
        prev_hash: &[u8; 32],
        prev_index: u32,
        script_sig: &[u8],
        sequence: u32,
    ) -> Result<(), Error> {
        self.check(Stage::Inputs)?;

        let mut h = *prev_hash;
        h.reverse();

        s.write(&h)?;
        s.write(&prev_index.to_le_bytes())?;
        write_bytes(s, script_sig)?;
        s.write(&sequence.to_le_bytes())?;

        self.inputs += 1;
        if self.inputs == self.inputs_count {
            self.stage = self.outputs_start(s)?;
        }

        Ok(())
    }

    /// Write an output, the output count is written prior to the first output
    pub fn output(&mut self, s: &mut impl Sink, o: &TxOutputBin) -> Result<(), Error> {
        self.check(Stage::Outputs)?;

        write_output(s, o)?;

        self.outputs += 1;
        if self.outputs == self.outputs_count {
            self.stage = self.outputs_end();
        }

        Ok(())
    }

    /// Write a serialized witness stack for the next input
    pub fn witness(&mut self, s: &mut impl Sink, witness: &[u8]) -> Result<(), Error> {
        self.check(Stage::Witnesses)?;

        s.write(witness)?;

        self.witnesses += 1;
        if self.witnesses == self.inputs_count {
            self.stage = Stage::Footer;
        }

        Ok(())
    }

    /// Write transaction footer (lock time)
    pub fn footer(&mut self, s: &mut impl Sink, lock_time: u32) -> Result<(), Error> {
        self.check(Stage::Footer)?;

        s.write(&lock_time.to_le_bytes())?;

        self.stage = match self.extra_data_len {
            0 => Stage::Done,
            _ => Stage::ExtraData,
        };

        Ok(())
    }

    /// Write a chunk of trailing extra data
    pub fn extra_data(&mut self, s: &mut impl Sink, d: &[u8]) -> Result<(), Error> {
        self.check(Stage::ExtraData)?;

        let end = self
            .extra_data
            .checked_add(d.len() as u32)
            .ok_or(Error::InvalidExtraData)?;
        if end > self.extra_data_len {
            return Err(Error::InvalidExtraData);
        }

        s.write(d)?;

        self.extra_data = end;
        if self.extra_data == self.extra_data_len {
            self.stage = Stage::Done;
        }

        Ok(())
    }

    fn outputs_start(&mut self, s: &mut impl Sink) -> Result<Stage, Error> {
        write_varint(s, self.outputs_count)?;

        match self.outputs_count {
            0 => Ok(self.outputs_end()),
            _ => Ok(Stage::Outputs),
        }
    }

    fn outputs_end(&self) -> Stage {
        match self.segwit {
            true => Stage::Witnesses,
            false => Stage::Footer,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    type Buff = Vec<u8, 512>;

    #[test]
    fn varints() {
        let tests: &[(u32, &[u8])] = &[
            (0, &[0x00]),
            (0xfc, &[0xfc]),
            (0xfd, &[0xfd, 0xfd, 0x00]),
            (0xffff, &[0xfd, 0xff, 0xff]),
            (0x1_0000, &[0xfe, 0x00, 0x00, 0x01, 0x00]),
        ];

        for (v, e) in tests {
            let mut b = Buff::new();
            write_varint(&mut b, *v).unwrap();

            assert_eq!(&b[..], *e, "varint {v:#x}");
            assert_eq!(varint_len(*v), e.len());
        }
    }

    #[test]
    fn legacy_layout() {
        let mut b = Buff::new();
        let mut t = TxStream::new(1, 1, false);

        let mut prev_hash = [0u8; 32];
        prev_hash[0] = 0xaa;
        prev_hash[31] = 0xbb;

        t.header(&mut b, 2).unwrap();
        t.input(&mut b, &prev_hash, 1, &[0x51], 0xffff_fffe)
            .unwrap();
        t.output(&mut b, &TxOutputBin::new(1000, &[0x6a]).unwrap())
            .unwrap();
        t.footer(&mut b, 100).unwrap();

        assert_eq!(t.stage(), Stage::Done);

        let mut e = Buff::new();
        e.extend_from_slice(&[2, 0, 0, 0, 1]).unwrap();
        e.push(0xbb).unwrap();
        e.extend_from_slice(&[0u8; 30]).unwrap();
        e.push(0xaa).unwrap();
        e.extend_from_slice(&[1, 0, 0, 0, 1, 0x51, 0xfe, 0xff, 0xff, 0xff])
            .unwrap();
        e.extend_from_slice(&[1, 0xe8, 0x03, 0, 0, 0, 0, 0, 0, 1, 0x6a])
            .unwrap();
        e.extend_from_slice(&[100, 0, 0, 0]).unwrap();

        assert_eq!(b, e);
    }

    #[test]
    fn segwit_layout() {
        let mut b = Buff::new();
        let mut t = TxStream::new(1, 1, true);

        t.header(&mut b, 1).unwrap();
        assert_eq!(&b[..], &[1, 0, 0, 0, 0x00, 0x01, 1]);

        t.input(&mut b, &[0u8; 32], 0, &[], 0).unwrap();
        t.output(&mut b, &TxOutputBin::new(1, &[]).unwrap()).unwrap();

        assert_eq!(t.stage(), Stage::Witnesses);
        assert_eq!(
            t.footer(&mut b, 0),
            Err(Error::SerializationOrder),
            "footer prior to witnesses"
        );

        t.witness(&mut b, &[0x00]).unwrap();
        t.footer(&mut b, 0).unwrap();

        assert_eq!(t.stage(), Stage::Done);
    }

    #[test]
    fn ordering() {
        let mut b = Buff::new();
        let mut t = TxStream::new(2, 1, false);

        let o = TxOutputBin::new(1, &[]).unwrap();

        assert_eq!(t.output(&mut b, &o), Err(Error::SerializationOrder));
        t.header(&mut b, 1).unwrap();
        assert_eq!(t.header(&mut b, 1), Err(Error::SerializationOrder));

        t.input(&mut b, &[0u8; 32], 0, &[], 0).unwrap();
        assert_eq!(t.output(&mut b, &o), Err(Error::SerializationOrder));
        t.input(&mut b, &[0u8; 32], 0, &[], 0).unwrap();

        assert_eq!(
            t.input(&mut b, &[0u8; 32], 0, &[], 0),
            Err(Error::SerializationOrder)
        );
        t.output(&mut b, &o).unwrap();
        assert_eq!(t.output(&mut b, &o), Err(Error::SerializationOrder));
    }

    #[test]
    fn extra_data() {
        let mut b = Buff::new();
        let mut t = TxStream::new(1, 1, false).with_extra_data(6);

        t.header(&mut b, 3).unwrap();
        t.input(&mut b, &[0u8; 32], 0, &[], 0).unwrap();
        t.output(&mut b, &TxOutputBin::new(1, &[]).unwrap()).unwrap();
        t.footer(&mut b, 0).unwrap();

        assert_eq!(t.stage(), Stage::ExtraData);

        t.extra_data(&mut b, &[1, 2, 3, 4]).unwrap();
        assert_eq!(
            t.extra_data(&mut b, &[5, 6, 7]),
            Err(Error::InvalidExtraData)
        );
        t.extra_data(&mut b, &[5, 6]).unwrap();

        assert_eq!(t.stage(), Stage::Done);
        assert_eq!(t.extra_data_written(), 6);
    }
}
