// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Cursor helpers for variable-length APDU encodings

use byteorder::{ByteOrder, LittleEndian};
use heapless::Vec;

use crate::ApduError;

/// Bounds-checked writer over an output buffer
pub(crate) struct Writer<'a> {
    buff: &'a mut [u8],
    index: usize,
}

impl<'a> Writer<'a> {
    pub fn new(buff: &'a mut [u8]) -> Self {
        Self { buff, index: 0 }
    }

    /// Reserve `n` bytes, returning the reserved slice
    fn reserve(&mut self, n: usize) -> Result<&mut [u8], ApduError> {
        if self.buff.len() < self.index + n {
            return Err(ApduError::InvalidLength);
        }

        let start = self.index;
        self.index += n;

        Ok(&mut self.buff[start..][..n])
    }

    pub fn put_u8(&mut self, v: u8) -> Result<(), ApduError> {
        self.reserve(1)?[0] = v;
        Ok(())
    }

    pub fn put_u16(&mut self, v: u16) -> Result<(), ApduError> {
        LittleEndian::write_u16(self.reserve(2)?, v);
        Ok(())
    }

    pub fn put_u32(&mut self, v: u32) -> Result<(), ApduError> {
        LittleEndian::write_u32(self.reserve(4)?, v);
        Ok(())
    }

    pub fn put_u64(&mut self, v: u64) -> Result<(), ApduError> {
        LittleEndian::write_u64(self.reserve(8)?, v);
        Ok(())
    }

    pub fn put_bytes(&mut self, d: &[u8]) -> Result<(), ApduError> {
        self.reserve(d.len())?.copy_from_slice(d);
        Ok(())
    }

    /// Write BIP32 path elements
    pub fn put_path(&mut self, p: &[u32]) -> Result<(), ApduError> {
        for v in p {
            self.put_u32(*v)?;
        }
        Ok(())
    }

    /// Number of bytes written
    pub fn len(&self) -> usize {
        self.index
    }
}

/// Bounds-checked reader over an input buffer
pub(crate) struct Reader<'a> {
    buff: &'a [u8],
    index: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buff: &'a [u8]) -> Self {
        Self { buff, index: 0 }
    }

    pub fn get_bytes(&mut self, n: usize) -> Result<&'a [u8], ApduError> {
        if self.buff.len() < self.index + n {
            return Err(ApduError::InvalidLength);
        }

        let d = &self.buff[self.index..][..n];
        self.index += n;

        Ok(d)
    }

    pub fn get_u8(&mut self) -> Result<u8, ApduError> {
        Ok(self.get_bytes(1)?[0])
    }

    pub fn get_u16(&mut self) -> Result<u16, ApduError> {
        Ok(LittleEndian::read_u16(self.get_bytes(2)?))
    }

    pub fn get_u32(&mut self) -> Result<u32, ApduError> {
        Ok(LittleEndian::read_u32(self.get_bytes(4)?))
    }

    pub fn get_u64(&mut self) -> Result<u64, ApduError> {
        Ok(LittleEndian::read_u64(self.get_bytes(8)?))
    }

    pub fn get_array<const N: usize>(&mut self) -> Result<[u8; N], ApduError> {
        let mut d = [0u8; N];
        d.copy_from_slice(self.get_bytes(N)?);
        Ok(d)
    }

    /// Read `n` bytes into a bounded vector, failing where `n` exceeds capacity `N`
    pub fn get_vec<const N: usize>(&mut self, n: usize) -> Result<Vec<u8, N>, ApduError> {
        if n > N {
            return Err(ApduError::InvalidLength);
        }
        Vec::from_slice(self.get_bytes(n)?).map_err(|_| ApduError::InvalidLength)
    }

    /// Read `n` BIP32 path elements into a bounded vector
    pub fn get_path<const N: usize>(&mut self, n: usize) -> Result<Vec<u32, N>, ApduError> {
        if n > N {
            return Err(ApduError::InvalidLength);
        }

        let mut p = Vec::new();
        for _ in 0..n {
            p.push(self.get_u32()?)
                .map_err(|_| ApduError::InvalidLength)?;
        }
        Ok(p)
    }

    /// Number of bytes consumed
    pub fn len(&self) -> usize {
        self.index
    }
}

/// Encoding helper for fixed arrays
pub(crate) mod arr {
    use encdec::Error;

    pub fn enc<const N: usize>(d: &[u8; N], buff: &mut [u8]) -> Result<usize, Error> {
        if buff.len() < d.len() {
            return Err(Error::Length);
        }

        buff[..d.len()].copy_from_slice(&d[..]);

        Ok(d.len())
    }

    pub fn enc_len<const N: usize>(d: &[u8; N]) -> Result<usize, Error> {
        Ok(d.len())
    }

    pub fn dec<const N: usize>(buff: &[u8]) -> Result<([u8; N], usize), Error> {
        if buff.len() < N {
            return Err(Error::Length);
        }

        let mut d = [0u8; N];
        d.copy_from_slice(&buff[..N]);

        Ok((d, N))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn writer_bounds() {
        let mut buff = [0u8; 6];
        let mut w = Writer::new(&mut buff);

        w.put_u32(0x0403_0201).unwrap();
        assert!(matches!(w.put_u32(1), Err(ApduError::InvalidLength)));
        w.put_u16(0x0605).unwrap();
        assert_eq!(w.len(), 6);

        assert_eq!(buff, [1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn reader_bounds() {
        let buff = [1u8, 2, 3, 4, 5];
        let mut r = Reader::new(&buff);

        assert_eq!(r.get_u32().unwrap(), 0x0403_0201);
        assert!(matches!(r.get_u16(), Err(ApduError::InvalidLength)));
        assert_eq!(r.get_vec::<4>(1).unwrap().as_slice(), &[5]);

        let mut r = Reader::new(&buff);
        assert!(matches!(r.get_vec::<2>(3), Err(ApduError::InvalidLength)));
    }
}
