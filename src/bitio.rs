//! Bit-addressable stream primitives (C1): the contract every unpacker and
//! the section/factory layer reads through, plus its write-side mirror.

use std::io::{Read, Write};

use bitstream_io::{BigEndian, BitRead, BitWrite};

use crate::Error;

pub const NBITS_PER_BYTE: u32 = 8;

/// A blob of bits too narrow or structurally meaningless to decode further
/// (local descriptors, padding, operator 206 skip payloads).
///
/// Stored big-endian: the first byte holds the leftmost (most significant) bits.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Binary {
    bytes: Vec<u8>,
    nbits: u32,
}

impl Binary {
    pub fn new(bytes: Vec<u8>, nbits: u32) -> Result<Self, Error> {
        let nbytes = nbits.div_ceil(NBITS_PER_BYTE) as usize;
        if bytes.len() != nbytes {
            return Err(Error::Fatal("number of bytes and bits mismatch".into()));
        }
        Ok(Self { bytes, nbits })
    }

    pub fn from_uint(mut value: u64, nbits: u32) -> Self {
        let nbytes = nbits.div_ceil(NBITS_PER_BYTE) as usize;
        let mut bytes = vec![0u8; nbytes];
        for i in (0..nbytes).rev() {
            bytes[i] = (value & 0xff) as u8;
            value >>= 8;
        }
        Self { bytes, nbits }
    }

    pub fn nbits(&self) -> u32 {
        self.nbits
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Reads the blob back as a big-endian unsigned integer (`nbits` must fit in 64).
    pub fn to_uint(&self) -> u64 {
        let mut value = 0u64;
        for i in 0..self.nbits {
            value = (value << 1) | self.bit(i) as u64;
        }
        value
    }

    /// Bit `n` (0 is the most significant bit of the whole blob).
    pub fn bit(&self, n: u32) -> bool {
        if n >= self.nbits {
            return false;
        }
        let ibyte = (n / NBITS_PER_BYTE) as usize;
        let ibit = n % NBITS_PER_BYTE;
        let padding = if ibyte == self.bytes.len() - 1 && self.nbits % NBITS_PER_BYTE != 0 {
            NBITS_PER_BYTE - (self.nbits % NBITS_PER_BYTE)
        } else {
            0
        };
        (self.bytes[ibyte] >> (NBITS_PER_BYTE - ibit - 1 - padding)) & 1 == 1
    }
}

impl std::fmt::Display for Binary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, b) in self.bytes.iter().enumerate() {
            let len = if i == self.bytes.len() - 1 && self.nbits % NBITS_PER_BYTE != 0 {
                self.nbits % NBITS_PER_BYTE
            } else {
                NBITS_PER_BYTE
            };
            write!(f, "{:0width$b}", b, width = len as usize)?;
        }
        Ok(())
    }
}

/// The basic operations needed to deserialize a value from a bit-addressable stream.
pub trait BufrRead {
    fn pos(&self) -> usize;
    fn read_uint(&mut self, nbits: u32) -> Result<u64, Error>;
    fn read_int(&mut self, nbits: u32) -> Result<i64, Error>;
    fn read_bool(&mut self) -> Result<bool, Error>;
    fn read_bytes(&mut self, nbytes: usize) -> Result<Vec<u8>, Error>;
    fn read_binary(&mut self, nbits: u32) -> Result<Binary, Error>;
    fn read_float32(&mut self) -> Result<f64, Error>;
    /// Same as `read_uint` but returned as a float, used by the JSON-input unpacker.
    fn read_number(&mut self, nbits: u32) -> Result<f64, Error> {
        Ok(self.read_uint(nbits)? as f64)
    }
}

/// An augmented [`BufrRead`] that can peek ahead at byte boundaries without
/// disturbing the read head. Used for section-boundary sniffing (edition
/// number, start-of-message signature, EOF detection).
pub trait PeekableBufrRead: BufrRead {
    fn peek_uint(&mut self, skip_bytes: usize, nbits: u32) -> Result<u64, Error>;
    fn peek_bytes(&mut self, skip_bytes: usize, nbytes: usize) -> Result<Vec<u8>, Error>;
}

/// Non-peekable big-endian bit reader over any [`Read`].
pub struct BitReader<R: Read> {
    inner: bitstream_io::BitReader<R, BigEndian>,
    pos: usize,
}

impl<R: Read> BitReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: bitstream_io::BitReader::new(reader),
            pos: 0,
        }
    }

    pub fn into_inner(self) -> R {
        self.inner.into_reader()
    }
}

impl<R: Read> BufrRead for BitReader<R> {
    fn pos(&self) -> usize {
        self.pos
    }

    fn read_uint(&mut self, nbits: u32) -> Result<u64, Error> {
        if nbits == 0 {
            return Ok(0);
        }
        self.pos += nbits as usize;
        Ok(self.inner.read::<u64>(nbits)?)
    }

    fn read_int(&mut self, nbits: u32) -> Result<i64, Error> {
        let negative = self.read_bool()?;
        if nbits == 0 {
            return Ok(0);
        }
        self.pos += (nbits - 1) as usize;
        let magnitude: u64 = self.inner.read(nbits - 1)?;
        Ok(if negative {
            -(magnitude as i64)
        } else {
            magnitude as i64
        })
    }

    fn read_bool(&mut self) -> Result<bool, Error> {
        self.pos += 1;
        Ok(self.inner.read_bit()?)
    }

    fn read_bytes(&mut self, nbytes: usize) -> Result<Vec<u8>, Error> {
        self.pos += nbytes * NBITS_PER_BYTE as usize;
        let mut buf = vec![0u8; nbytes];
        self.inner.read_bytes(&mut buf)?;
        Ok(buf)
    }

    fn read_binary(&mut self, nbits: u32) -> Result<Binary, Error> {
        self.pos += nbits as usize;
        let nbytes = nbits.div_ceil(NBITS_PER_BYTE) as usize;
        let mut bytes = Vec::with_capacity(nbytes);
        let mut remaining = nbits;
        while remaining > 0 {
            let take = remaining.min(NBITS_PER_BYTE);
            let v: u8 = self.inner.read(take)?;
            bytes.push(v << (NBITS_PER_BYTE - take));
            remaining -= take;
        }
        Binary::new(bytes, nbits)
    }

    fn read_float32(&mut self) -> Result<f64, Error> {
        let bits = self.read_uint(32)? as u32;
        Ok(f32::from_bits(bits) as f64)
    }
}

/// Wraps a [`BitReader`] over a [`std::io::BufRead`]-backed stream so callers
/// can peek ahead at byte boundaries (section framing, EOF detection).
pub struct PeekableBitReader<R: Read> {
    reader: BitReader<std::io::BufReader<R>>,
}

impl<R: Read> PeekableBitReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BitReader::new(std::io::BufReader::new(reader)),
        }
    }
}

impl<R: Read> BufrRead for PeekableBitReader<R> {
    fn pos(&self) -> usize {
        self.reader.pos()
    }
    fn read_uint(&mut self, nbits: u32) -> Result<u64, Error> {
        self.reader.read_uint(nbits)
    }
    fn read_int(&mut self, nbits: u32) -> Result<i64, Error> {
        self.reader.read_int(nbits)
    }
    fn read_bool(&mut self) -> Result<bool, Error> {
        self.reader.read_bool()
    }
    fn read_bytes(&mut self, nbytes: usize) -> Result<Vec<u8>, Error> {
        self.reader.read_bytes(nbytes)
    }
    fn read_binary(&mut self, nbits: u32) -> Result<Binary, Error> {
        self.reader.read_binary(nbits)
    }
    fn read_float32(&mut self) -> Result<f64, Error> {
        self.reader.read_float32()
    }
}

impl<R: Read> PeekableBufrRead for PeekableBitReader<R> {
    fn peek_uint(&mut self, skip_bytes: usize, nbits: u32) -> Result<u64, Error> {
        let nbytes = nbits.div_ceil(NBITS_PER_BYTE) as usize;
        let peeked = self.peek_bytes(skip_bytes, nbytes)?;
        let mut reader = BitReader::new(std::io::Cursor::new(peeked));
        reader.read_uint(nbits)
    }

    fn peek_bytes(&mut self, skip_bytes: usize, nbytes: usize) -> Result<Vec<u8>, Error> {
        if self.pos() % NBITS_PER_BYTE as usize != 0 {
            return Err(Error::Fatal(format!(
                "can only peek at complete byte boundary: ({}, {})",
                self.pos(),
                nbytes
            )));
        }
        use std::io::BufRead;
        let buf = self.reader.inner.reader_mut().fill_buf()?;
        let want = skip_bytes + nbytes;
        if buf.len() >= want {
            return Ok(buf[skip_bytes..want].to_vec());
        }
        Ok(buf.get(skip_bytes.min(buf.len())..).unwrap_or(&[]).to_vec())
    }
}

/// The write-side mirror of [`BufrRead`], implemented by [`BitWriter`].
pub trait BufrWrite {
    fn pos(&self) -> usize;
    fn write_uint(&mut self, value: u64, nbits: u32) -> Result<(), Error>;
    fn write_int(&mut self, value: i64, nbits: u32) -> Result<(), Error>;
    fn write_bool(&mut self, value: bool) -> Result<(), Error>;
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Error>;
    fn write_binary(&mut self, binary: &Binary) -> Result<(), Error>;
}

/// Big-endian bit writer, the packer's counterpart to [`BitReader`].
pub struct BitWriter<W: Write> {
    inner: bitstream_io::BitWriter<W, BigEndian>,
    pos: usize,
}

impl<W: Write> BitWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            inner: bitstream_io::BitWriter::new(writer),
            pos: 0,
        }
    }

    pub fn flush(&mut self) -> Result<(), Error> {
        self.inner.byte_align()?;
        Ok(self.inner.flush()?)
    }
}

impl<W: Write> BufrWrite for BitWriter<W> {
    fn pos(&self) -> usize {
        self.pos
    }

    fn write_uint(&mut self, value: u64, nbits: u32) -> Result<(), Error> {
        if nbits == 0 {
            return Ok(());
        }
        self.pos += nbits as usize;
        Ok(self.inner.write(nbits, value)?)
    }

    fn write_int(&mut self, value: i64, nbits: u32) -> Result<(), Error> {
        self.pos += 1;
        self.inner.write_bit(value < 0)?;
        if nbits > 0 {
            self.pos += (nbits - 1) as usize;
            self.inner.write(nbits - 1, value.unsigned_abs())?;
        }
        Ok(())
    }

    fn write_bool(&mut self, value: bool) -> Result<(), Error> {
        self.pos += 1;
        Ok(self.inner.write_bit(value)?)
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.pos += bytes.len() * NBITS_PER_BYTE as usize;
        Ok(self.inner.write_bytes(bytes)?)
    }

    fn write_binary(&mut self, binary: &Binary) -> Result<(), Error> {
        let mut remaining = binary.nbits();
        let mut idx = 0usize;
        while remaining > 0 {
            let take = remaining.min(NBITS_PER_BYTE);
            let byte = binary.bytes()[idx] >> (NBITS_PER_BYTE - take);
            self.inner.write(take, byte)?;
            remaining -= take;
            idx += 1;
        }
        self.pos += binary.nbits() as usize;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uint_round_trips_through_writer_and_reader() {
        let mut buf = Vec::new();
        let mut w = BitWriter::new(&mut buf);
        w.write_uint(0b101, 3).unwrap();
        w.write_uint(0, 0).unwrap();
        w.write_uint(0xabcd, 16).unwrap();
        assert_eq!(w.pos(), 19);
        w.flush().unwrap();

        let mut r = BitReader::new(std::io::Cursor::new(buf));
        assert_eq!(r.read_uint(3).unwrap(), 0b101);
        assert_eq!(r.read_uint(0).unwrap(), 0);
        assert_eq!(r.read_uint(16).unwrap(), 0xabcd);
    }

    #[test]
    fn signed_int_round_trips_negative_and_positive() {
        let mut buf = Vec::new();
        let mut w = BitWriter::new(&mut buf);
        w.write_int(-5, 8).unwrap();
        w.write_int(5, 8).unwrap();
        w.flush().unwrap();

        let mut r = BitReader::new(std::io::Cursor::new(buf));
        assert_eq!(r.read_int(8).unwrap(), -5);
        assert_eq!(r.read_int(8).unwrap(), 5);
    }

    #[test]
    fn binary_to_uint_matches_from_uint() {
        let b = Binary::from_uint(0b1011_0, 5);
        assert_eq!(b.to_uint(), 0b1011_0);
        assert!(b.bit(0));
        assert!(!b.bit(4));
    }

    #[test]
    fn binary_round_trips_through_writer_and_reader() {
        let b = Binary::from_uint(0b110_1010, 7);
        let mut buf = Vec::new();
        let mut w = BitWriter::new(&mut buf);
        w.write_binary(&b).unwrap();
        w.flush().unwrap();

        let mut r = BitReader::new(std::io::Cursor::new(buf));
        let read_back = r.read_binary(7).unwrap();
        assert_eq!(read_back, b);
    }
}
