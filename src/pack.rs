//! Value-to-bit packing (C9): the encoder's mirror of `unpack.rs`. Given the
//! same [`PackingInfo`] a node was decoded with, writes its value(s) back out
//! through a [`BufrWrite`].
//!
//! Unlike the reference decoder this crate was grounded on, the compressed
//! path here covers every unit including BINARY — there is no leftover
//! not-yet-implemented case.

use crate::bitio::{Binary, BufrWrite};
use crate::model::{is_missing_uint, missing_value, PackingInfo, Value};
use crate::tables::Unit;
use crate::Error;

pub enum PackInput<'a> {
    Single(&'a Value),
    Subsets(&'a [Value]),
}

pub trait Packer {
    fn pack(&mut self, info: &PackingInfo, input: PackInput) -> Result<(), Error>;
}

fn bits_needed(max: u64) -> u32 {
    if max == 0 {
        0
    } else {
        64 - max.leading_zeros()
    }
}

fn string_bytes(value: &Value, nbits: u32) -> Result<Vec<u8>, Error> {
    let nbytes = (nbits / 8) as usize;
    let s = value
        .as_str()
        .ok_or_else(|| Error::Fatal("expected a string value for a string unit".into()))?;
    let mut bytes = s.as_bytes().to_vec();
    bytes.resize(nbytes, b' ');
    Ok(bytes)
}

fn pack_numeric_scalar(value: &Value, info: &PackingInfo) -> Result<u64, Error> {
    let raw = match value {
        Value::Float(f) => *f * 10f64.powi(info.scale) - info.refval,
        Value::UInt(u) => *u as f64 * 10f64.powi(info.scale) - info.refval,
        Value::Int(i) => *i as f64 * 10f64.powi(info.scale) - info.refval,
        _ => return Err(Error::Fatal("expected a numeric value for a numeric unit".into())),
    };
    Ok(raw.round() as u64)
}

/// Writes directly into an uncompressed Section 4 bitstream.
pub struct UncompressBitPacker<'a> {
    pub writer: &'a mut dyn BufrWrite,
}

impl Packer for UncompressBitPacker<'_> {
    fn pack(&mut self, info: &PackingInfo, input: PackInput) -> Result<(), Error> {
        let PackInput::Single(value) = input else {
            return Err(Error::Fatal("uncompressed packer received a per-subset value set".into()));
        };
        match info.unit {
            Unit::String => self.writer.write_bytes(&string_bytes(value, info.nbits)?),
            Unit::Code => self.writer.write_int(
                value
                    .as_int()
                    .ok_or_else(|| Error::Fatal("expected a signed value for a code unit".into()))?,
                info.nbits,
            ),
            Unit::NonNegCode | Unit::Flag => {
                if info.nbits == 0 {
                    Ok(())
                } else {
                    self.writer.write_uint(
                        value
                            .as_uint()
                            .ok_or_else(|| Error::Fatal("expected an unsigned value".into()))?,
                        info.nbits,
                    )
                }
            }
            Unit::Numeric => self.writer.write_uint(pack_numeric_scalar(value, info)?, info.nbits),
            Unit::Binary => match value {
                Value::Binary(b) => self.writer.write_binary(b),
                _ => Err(Error::Fatal("expected a binary value for a binary unit".into())),
            },
        }
    }
}

/// Writes one node's worth of values across all subsets of a compressed
/// payload in a single pass: a shared minimum plus a per-subset diff.
pub struct CompressedBitPacker<'a> {
    pub writer: &'a mut dyn BufrWrite,
}

impl CompressedBitPacker<'_> {
    /// Shared logic for NON_NEG_CODE/FLAG/NUMERIC/BINARY: `raw_of` maps a
    /// subset's value to its raw unsigned encoding, or `None` for missing.
    fn pack_others(
        &mut self,
        info: &PackingInfo,
        values: &[Value],
        raw_of: impl Fn(&Value) -> Result<Option<u64>, Error>,
    ) -> Result<(), Error> {
        let raws = values.iter().map(raw_of).collect::<Result<Vec<_>, _>>()?;
        let min_value = raws.iter().filter_map(|r| *r).min().unwrap_or(0);
        let max_diff = raws
            .iter()
            .filter_map(|r| r.map(|v| v - min_value))
            .max()
            .unwrap_or(0);
        let any_missing = raws.iter().any(|r| r.is_none());
        let mut nbits_diff = bits_needed(max_diff);
        if any_missing && (nbits_diff == 0 || max_diff == missing_value(nbits_diff)) {
            nbits_diff += 1;
        }
        self.writer.write_uint(min_value, info.nbits)?;
        self.writer.write_uint(nbits_diff as u64, 6)?;
        if nbits_diff == 0 {
            return Ok(());
        }
        for raw in raws {
            match raw {
                Some(v) => self.writer.write_uint(v - min_value, nbits_diff)?,
                None => self.writer.write_uint(missing_value(nbits_diff), nbits_diff)?,
            }
        }
        Ok(())
    }

    fn pack_numeric(&mut self, info: &PackingInfo, values: &[Value]) -> Result<(), Error> {
        self.pack_others(info, values, |v| match v {
            Value::UInt(u) if is_missing_uint(*u, info.nbits) => Ok(None),
            other => pack_numeric_scalar(other, info).map(Some),
        })
    }

    fn pack_code(&mut self, info: &PackingInfo, values: &[Value]) -> Result<(), Error> {
        let raws = values
            .iter()
            .map(|v| {
                v.as_int()
                    .ok_or_else(|| Error::Fatal("expected a signed value for a code unit".into()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let min_value = *raws.iter().min().unwrap_or(&0);
        let max_diff = raws.iter().map(|v| (v - min_value) as u64).max().unwrap_or(0);
        let nbits_diff = bits_needed(max_diff);
        self.writer.write_uint(min_value as u64, info.nbits)?;
        self.writer.write_uint(nbits_diff as u64, 6)?;
        if nbits_diff == 0 {
            return Ok(());
        }
        for v in raws {
            self.writer.write_uint((v - min_value) as u64, nbits_diff)?;
        }
        Ok(())
    }

    /// Mirrors `unpack_string`'s byte-granularity diff: subsets that differ
    /// from the minimum string write out their full bytes again, not a delta.
    fn pack_string(&mut self, info: &PackingInfo, values: &[Value]) -> Result<(), Error> {
        let nbytes = (info.nbits / 8) as usize;
        let byte_values = values
            .iter()
            .map(|v| string_bytes(v, info.nbits))
            .collect::<Result<Vec<_>, _>>()?;
        let min_bytes = byte_values.first().cloned().unwrap_or_else(|| vec![b' '; nbytes]);
        let all_same = byte_values.iter().all(|b| *b == min_bytes);
        self.writer.write_bytes(&min_bytes)?;
        if all_same {
            self.writer.write_uint(0, 6)?;
            return Ok(());
        }
        self.writer.write_uint(nbytes as u64, 6)?;
        for b in byte_values {
            self.writer.write_bytes(&b)?;
        }
        Ok(())
    }
}

impl Packer for CompressedBitPacker<'_> {
    fn pack(&mut self, info: &PackingInfo, input: PackInput) -> Result<(), Error> {
        let PackInput::Subsets(values) = input else {
            return Err(Error::Fatal("compressed packer requires one value per subset".into()));
        };
        match info.unit {
            Unit::String => self.pack_string(info, values),
            Unit::Code => self.pack_code(info, values),
            Unit::NonNegCode | Unit::Flag => {
                if info.nbits == 0 {
                    self.writer.write_uint(0, 6)
                } else {
                    self.pack_others(info, values, |v| match v {
                        Value::UInt(u) if is_missing_uint(*u, info.nbits) => Ok(None),
                        Value::UInt(u) => Ok(Some(*u)),
                        _ => Err(Error::Fatal("expected an unsigned value".into())),
                    })
                }
            }
            Unit::Numeric => self.pack_numeric(info, values),
            Unit::Binary => self.pack_others(info, values, |v| match v {
                Value::Binary(b) => Ok(Some(b.to_uint())),
                _ => Err(Error::Fatal("expected a binary value for a binary unit".into())),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitio::{BitReader, BitWriter, BufrRead};

    fn info(unit: Unit, scale: i32, refval: f64, nbits: u32) -> PackingInfo {
        PackingInfo { unit, scale, refval, nbits }
    }

    #[test]
    fn numeric_scalar_round_trips() {
        let mut buf = Vec::new();
        {
            let mut writer = BitWriter::new(&mut buf);
            let mut packer = UncompressBitPacker { writer: &mut writer };
            packer
                .pack(&info(Unit::Numeric, 1, 0.0, 12), PackInput::Single(&Value::Float(12.3)))
                .unwrap();
            writer.flush().unwrap();
        }
        let mut reader = BitReader::new(std::io::Cursor::new(buf));
        let raw = reader.read_uint(12).unwrap();
        assert_eq!(raw, 123);
    }

    #[test]
    fn compressed_constant_column_skips_diffs() {
        let mut buf = Vec::new();
        {
            let mut writer = BitWriter::new(&mut buf);
            let mut packer = CompressedBitPacker { writer: &mut writer };
            let values = vec![Value::UInt(5), Value::UInt(5), Value::UInt(5)];
            packer
                .pack(&info(Unit::NonNegCode, 0, 0.0, 8), PackInput::Subsets(&values))
                .unwrap();
            writer.flush().unwrap();
        }
        let mut reader = BitReader::new(std::io::Cursor::new(buf));
        assert_eq!(reader.read_uint(8).unwrap(), 5);
        assert_eq!(reader.read_uint(6).unwrap(), 0);
    }
}
