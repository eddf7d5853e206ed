//! Bit-to-value unpacking (C5): turns a [`PackingInfo`]-described slot into a
//! decoded [`Value`], either from an uncompressed payload (one value) or a
//! compressed one (one value per subset, sharing a min-value/diff scheme).

use crate::bitio::{Binary, BufrRead};
use crate::model::{is_missing_uint, missing_value, PackingInfo, Value};
use crate::tables::Unit;
use crate::Error;

#[derive(Clone, Debug)]
pub struct CompressedVal {
    pub min_value: u64,
    pub nbits_diff: u32,
    pub values: Vec<Value>,
}

pub enum UnpackedValue {
    Single(Value),
    Compressed(CompressedVal),
}

pub trait Unpacker {
    fn unpack(&mut self, info: &PackingInfo) -> Result<UnpackedValue, Error>;
}

fn unpack_numeric_scalar(raw: u64, info: &PackingInfo) -> Value {
    if is_missing_uint(raw, info.nbits) {
        Value::UInt(raw)
    } else {
        Value::Float((raw as f64 + info.refval) / 10f64.powi(info.scale))
    }
}

/// Unpacks directly from an uncompressed Section 4 bitstream.
pub struct UncompressBitUnpacker<'a> {
    pub reader: &'a mut dyn BufrRead,
}

impl Unpacker for UncompressBitUnpacker<'_> {
    fn unpack(&mut self, info: &PackingInfo) -> Result<UnpackedValue, Error> {
        let value = match info.unit {
            Unit::String => {
                let bytes = self.reader.read_bytes((info.nbits / 8) as usize)?;
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            }
            Unit::Code => Value::Int(self.reader.read_int(info.nbits)?),
            Unit::NonNegCode | Unit::Flag => {
                if info.nbits == 0 {
                    Value::UInt(0)
                } else {
                    Value::UInt(self.reader.read_uint(info.nbits)?)
                }
            }
            Unit::Numeric => unpack_numeric_scalar(self.reader.read_uint(info.nbits)?, info),
            Unit::Binary => Value::Binary(self.reader.read_binary(info.nbits)?),
        };
        Ok(UnpackedValue::Single(value))
    }
}

/// Unpacks one node's worth of values across all subsets of a compressed
/// payload in a single pass: a shared minimum plus a per-subset diff.
pub struct CompressedBitUnpacker<'a> {
    pub reader: &'a mut dyn BufrRead,
    pub nsubsets: usize,
}

impl CompressedBitUnpacker<'_> {
    fn unpack_others(
        &mut self,
        info: &PackingInfo,
        conv: impl Fn(u64) -> Value,
    ) -> Result<CompressedVal, Error> {
        let min_value = self.reader.read_uint(info.nbits)?;
        let nbits_diff = self.reader.read_uint(6)? as u32;
        let mut values = Vec::with_capacity(self.nsubsets);
        if nbits_diff == 0 {
            let v = conv(min_value);
            values.extend(std::iter::repeat(v).take(self.nsubsets));
        } else {
            for _ in 0..self.nsubsets {
                let diff = self.reader.read_uint(nbits_diff)?;
                if is_missing_uint(diff, nbits_diff) {
                    values.push(Value::UInt(missing_value(info.nbits)));
                } else {
                    values.push(conv(min_value + diff));
                }
            }
        }
        Ok(CompressedVal {
            min_value,
            nbits_diff,
            values,
        })
    }

    fn unpack_numeric(&mut self, info: &PackingInfo) -> Result<CompressedVal, Error> {
        self.unpack_others(info, |raw| unpack_numeric_scalar(raw, info))
    }

    fn unpack_code(&mut self, info: &PackingInfo) -> Result<CompressedVal, Error> {
        let min_value = self.reader.read_int(info.nbits)?;
        let nbits_diff = self.reader.read_uint(6)? as u32;
        let mut values = Vec::with_capacity(self.nsubsets);
        if nbits_diff == 0 {
            let v = Value::Int(min_value);
            values.extend(std::iter::repeat(v).take(self.nsubsets));
        } else {
            for _ in 0..self.nsubsets {
                let diff = self.reader.read_uint(nbits_diff)?;
                values.push(Value::Int(min_value + diff as i64));
            }
        }
        Ok(CompressedVal {
            min_value: min_value as u64,
            nbits_diff,
            values,
        })
    }

    /// The 6-bit field here counts bytes of difference, not bits: string
    /// diffs are whole characters appended/overwritten, never sub-byte.
    fn unpack_string(&mut self, info: &PackingInfo) -> Result<CompressedVal, Error> {
        let nbytes = (info.nbits / 8) as usize;
        let min_bytes = self.reader.read_bytes(nbytes)?;
        let nbytes_diff = self.reader.read_uint(6)? as u32;
        let mut values = Vec::with_capacity(self.nsubsets);
        if nbytes_diff == 0 {
            let v = Value::String(String::from_utf8_lossy(&min_bytes).into_owned());
            values.extend(std::iter::repeat(v).take(self.nsubsets));
        } else {
            for _ in 0..self.nsubsets {
                let diff_bytes = self.reader.read_bytes(nbytes_diff as usize)?;
                values.push(Value::String(String::from_utf8_lossy(&diff_bytes).into_owned()));
            }
        }
        Ok(CompressedVal {
            min_value: 0,
            nbits_diff: nbytes_diff,
            values,
        })
    }
}

impl Unpacker for CompressedBitUnpacker<'_> {
    fn unpack(&mut self, info: &PackingInfo) -> Result<UnpackedValue, Error> {
        let cv = match info.unit {
            Unit::String => self.unpack_string(info)?,
            Unit::Code => self.unpack_code(info)?,
            Unit::NonNegCode | Unit::Flag => {
                if info.nbits == 0 {
                    CompressedVal {
                        min_value: 0,
                        nbits_diff: 0,
                        values: vec![Value::UInt(0); self.nsubsets],
                    }
                } else {
                    self.unpack_others(info, Value::UInt)?
                }
            }
            Unit::Numeric => self.unpack_numeric(info)?,
            Unit::Binary => {
                let nbits = info.nbits;
                self.unpack_others(info, move |raw| Value::Binary(Binary::from_uint(raw, nbits)))?
            }
        };
        Ok(UnpackedValue::Compressed(cv))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitio::BitReader;

    fn numeric_info(scale: i32, refval: f64, nbits: u32) -> PackingInfo {
        PackingInfo { unit: Unit::Numeric, scale, refval, nbits }
    }

    #[test]
    fn uncompress_numeric_applies_scale_and_refval() {
        // raw 123 at scale=1, refval=0.0 -> 12.3
        let mut buf = Vec::new();
        {
            use crate::bitio::BufrWrite;
            let mut w = crate::bitio::BitWriter::new(&mut buf);
            w.write_uint(123, 12).unwrap();
            w.flush().unwrap();
        }
        let mut reader = BitReader::new(std::io::Cursor::new(buf));
        let mut unpacker = UncompressBitUnpacker { reader: &mut reader };
        let info = numeric_info(1, 0.0, 12);
        match unpacker.unpack(&info).unwrap() {
            UnpackedValue::Single(Value::Float(v)) => assert!((v - 12.3).abs() < 1e-9),
            other => panic!("expected a scaled float, got {other:?}"),
        }
    }

    impl std::fmt::Debug for UnpackedValue {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                UnpackedValue::Single(v) => write!(f, "Single({v:?})"),
                UnpackedValue::Compressed(_) => write!(f, "Compressed(..)"),
            }
        }
    }

    #[test]
    fn uncompress_numeric_all_ones_is_missing() {
        let mut buf = Vec::new();
        {
            use crate::bitio::BufrWrite;
            let mut w = crate::bitio::BitWriter::new(&mut buf);
            w.write_uint(missing_value(12), 12).unwrap();
            w.flush().unwrap();
        }
        let mut reader = BitReader::new(std::io::Cursor::new(buf));
        let mut unpacker = UncompressBitUnpacker { reader: &mut reader };
        let info = numeric_info(1, 0.0, 12);
        match unpacker.unpack(&info).unwrap() {
            UnpackedValue::Single(Value::UInt(v)) => assert_eq!(v, missing_value(12)),
            other => panic!("expected a missing-value marker, got {other:?}"),
        }
    }

    #[test]
    fn compressed_code_uses_signed_min_plus_diff() {
        // min_value=10, nbits_diff=4, one subset with diff=3 -> 13
        let mut buf = Vec::new();
        {
            use crate::bitio::BufrWrite;
            let mut w = crate::bitio::BitWriter::new(&mut buf);
            w.write_uint(10, 8).unwrap();
            w.write_uint(4, 6).unwrap();
            w.write_uint(3, 4).unwrap();
            w.flush().unwrap();
        }
        let mut reader = BitReader::new(std::io::Cursor::new(buf));
        let mut unpacker = CompressedBitUnpacker { reader: &mut reader, nsubsets: 1 };
        let info = PackingInfo { unit: Unit::Code, scale: 0, refval: 0.0, nbits: 8 };
        match unpacker.unpack(&info).unwrap() {
            UnpackedValue::Compressed(cv) => {
                assert_eq!(cv.values.len(), 1);
                assert_eq!(cv.values[0].as_int(), Some(13));
            }
            _ => panic!("expected a compressed result"),
        }
    }

    #[test]
    fn compressed_code_reads_negative_min_as_sign_and_magnitude() {
        // min_value=-5 (sign-magnitude over 8 bits), nbits_diff=4, diff=3 -> -2
        let mut buf = Vec::new();
        {
            use crate::bitio::BufrWrite;
            let mut w = crate::bitio::BitWriter::new(&mut buf);
            w.write_int(-5, 8).unwrap();
            w.write_uint(4, 6).unwrap();
            w.write_uint(3, 4).unwrap();
            w.flush().unwrap();
        }
        let mut reader = BitReader::new(std::io::Cursor::new(buf));
        let mut unpacker = CompressedBitUnpacker { reader: &mut reader, nsubsets: 1 };
        let info = PackingInfo { unit: Unit::Code, scale: 0, refval: 0.0, nbits: 8 };
        match unpacker.unpack(&info).unwrap() {
            UnpackedValue::Compressed(cv) => {
                assert_eq!(cv.values.len(), 1);
                assert_eq!(cv.values[0].as_int(), Some(-2));
            }
            _ => panic!("expected a compressed result"),
        }
    }

    #[test]
    fn compressed_others_zero_nbits_diff_repeats_min_value() {
        let mut buf = Vec::new();
        {
            use crate::bitio::BufrWrite;
            let mut w = crate::bitio::BitWriter::new(&mut buf);
            w.write_uint(5, 8).unwrap();
            w.write_uint(0, 6).unwrap();
            w.flush().unwrap();
        }
        let mut reader = BitReader::new(std::io::Cursor::new(buf));
        let mut unpacker = CompressedBitUnpacker { reader: &mut reader, nsubsets: 3 };
        let info = PackingInfo { unit: Unit::NonNegCode, scale: 0, refval: 0.0, nbits: 8 };
        match unpacker.unpack(&info).unwrap() {
            UnpackedValue::Compressed(cv) => {
                assert_eq!(cv.nbits_diff, 0);
                assert!(cv.values.iter().all(|v| v.as_uint() == Some(5)));
            }
            _ => panic!("expected a compressed result"),
        }
    }
}
