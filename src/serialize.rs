//! Message-to-bytes encoder (C9 continued): walks a decoded [`Message`]
//! section by section and field by field, writing each field's raw bits back
//! out through a [`BufrWrite`], and for payload fields replaying the per-node
//! [`PackingInfo`] the deserializer recorded through `pack.rs`'s packers.
//!
//! Mirrors the original's `serialize/binary_visitor.go`: a visitor over the
//! same section/field/payload tree the decoder built, driving the packer
//! mirror instead of the unpacker.

use crate::bitio::{BitWriter, BufrWrite};
use crate::model::{BufrNode, Field, FieldValue, Message, Payload, PackingInfo, Value};
use crate::pack::{CompressedBitPacker, PackInput, Packer, UncompressBitPacker};
use crate::Error;

fn write_scalar(writer: &mut dyn BufrWrite, value: &Value, nbits: u32) -> Result<(), Error> {
    match value {
        Value::Int(v) => writer.write_int(*v, nbits),
        Value::UInt(v) => writer.write_uint(*v, nbits),
        Value::Bool(v) => writer.write_bool(*v),
        Value::Bytes(b) => writer.write_bytes(b),
        Value::Binary(b) => writer.write_binary(b),
        Value::Float(_) => Err(Error::unsupported("encoding a float-valued header field")),
        Value::String(_) => Err(Error::unsupported("encoding a string-valued header field")),
    }
}

fn packing_info_of(node: &BufrNode) -> Result<PackingInfo, Error> {
    match node {
        BufrNode::Valued { packing_info, .. } => Ok(*packing_info),
        BufrNode::Valueless { descriptor, .. } => Err(Error::Fatal(format!(
            "cell references a valueless node {descriptor}"
        ))),
    }
}

/// Re-packs one payload's subsets back into the bitstream, uncompressed
/// subsets independently and compressed ones a node at a time across all
/// subsets, mirroring how the deserializer produced them in the first place.
pub fn encode_payload(payload: &Payload, writer: &mut dyn BufrWrite) -> Result<(), Error> {
    let Some(first) = payload.subsets.first() else {
        return Ok(());
    };
    if payload.compressed {
        for i in 0..first.cells.len() {
            let info = packing_info_of(&first.cells[i].node)?;
            let values: Vec<Value> = payload
                .subsets
                .iter()
                .map(|s| {
                    s.cell(i)
                        .map(|c| c.value.clone())
                        .ok_or_else(|| Error::Fatal("subset is missing a cell all others have".into()))
                })
                .collect::<Result<_, _>>()?;
            let mut packer = CompressedBitPacker { writer: &mut *writer };
            packer.pack(&info, PackInput::Subsets(&values))?;
        }
    } else {
        for subset in &payload.subsets {
            for cell in &subset.cells {
                let info = packing_info_of(&cell.node)?;
                let mut packer = UncompressBitPacker { writer: &mut *writer };
                packer.pack(&info, PackInput::Single(&cell.value))?;
            }
        }
    }
    Ok(())
}

fn encode_field(field: &Field, writer: &mut dyn BufrWrite) -> Result<(), Error> {
    if field.r#virtual {
        return Ok(());
    }
    match &field.value {
        FieldValue::Scalar(v) => write_scalar(writer, v, field.nbits),
        FieldValue::Payload(p) => encode_payload(p, writer),
    }
}

/// Encodes a decoded [`Message`] back to its wire bytes. Derived fields (a
/// flag pulled out of an already-read flags byte, the synthetic descriptor
/// count) are skipped; they carry no bits of their own.
pub fn encode_message(message: &Message) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::new();
    {
        let mut writer = BitWriter::new(&mut buf);
        for section in &message.sections {
            for field in section.fields() {
                encode_field(field, &mut writer)?;
            }
        }
        writer.flush()?;
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Section;

    #[test]
    fn encode_message_reproduces_scalar_header_bytes() {
        let mut message = Message::new("<test>");
        let mut section = Section::new(0, "indicator section");
        section.add_field(Field::new("signature", Value::Bytes(b"BUFR".to_vec()), 32));
        section.add_field(Field::new("total_length", Value::UInt(12), 24));
        section.add_field(Field::new("edition_number", Value::UInt(4), 8));
        message.sections.push(section);

        let bytes = encode_message(&message).unwrap();
        assert_eq!(&bytes[0..4], b"BUFR");
        assert_eq!(bytes[4..7], [0x00, 0x00, 0x0c]);
        assert_eq!(bytes[7], 4);
    }

    #[test]
    fn encode_message_skips_derived_fields() {
        let mut message = Message::new("<test>");
        let mut section = Section::new(1, "identification section");
        section.add_field(Field::new("flags_byte", Value::UInt(0x80), 8));
        section.add_field(Field::derived("has_optional_section", Value::Bool(true)));
        message.sections.push(section);

        let bytes = encode_message(&message).unwrap();
        assert_eq!(bytes, vec![0x80]);
    }
}
