//! Top-level single-message decode (C10 continued): sequences [`Factory`]
//! calls section by section, the way a CLI or library caller would, mirroring
//! the original's top-level `Decode` entry point over `factory.go`.

use std::io::Read;

pub use crate::factory::Config;
use crate::factory::{DataType, Factory};
use crate::model::{Field, FieldValue, Message, Value};
use crate::Error;

fn uint_in_section<R: Read>(factory: &Factory<R>, section_index: usize, name: &str) -> Result<u64, Error> {
    factory
        .message()?
        .sections
        .get(section_index)
        .and_then(|s| s.field_by_name(name))
        .and_then(|f| match &f.value {
            FieldValue::Scalar(v) => v.as_uint(),
            _ => None,
        })
        .ok_or_else(|| Error::Fatal(format!("missing field {name} in section {section_index}")))
}

fn current_uint<R: Read>(factory: &Factory<R>, name: &str) -> Result<u64, Error> {
    let idx = factory.message()?.sections.len() - 1;
    uint_in_section(factory, idx, name)
}

/// Decodes one BUFR message from the start of `reader`. Scans forward past
/// any leading junk to find the `BUFR` signature first.
pub fn decode_message<R: Read>(reader: R, config: Config) -> Result<Message, Error> {
    let mut factory = Factory::new(reader, config);
    factory.new_message("<stream>");

    if !factory.seek_start_signature()? {
        return Err(Error::parse("no BUFR start signature found before EOF", 0));
    }

    // Section 0: indicator section.
    factory.new_section(0, "indicator section")?;
    factory.new_field("signature", DataType::Bytes, 32, false)?;
    factory.new_field("total_length", DataType::UInt, 24, false)?;
    factory.new_field("edition_number", DataType::UInt, 8, false)?;
    let edition = current_uint(&factory, "edition_number")? as u8;
    if edition != 3 && edition != 4 {
        return Err(Error::unsupported(format!("BUFR edition {edition}")));
    }

    // Section 1: identification section.
    factory.new_section(1, "identification section")?;
    factory.new_field("section_length", DataType::UInt, 24, false)?;
    let section1_length = current_uint(&factory, "section_length")?;
    factory.new_field("master_table_number", DataType::UInt, 8, false)?;
    if edition == 4 {
        factory.new_field("centre", DataType::UInt, 16, false)?;
        factory.new_field("sub_centre", DataType::UInt, 16, false)?;
    } else {
        factory.new_field("sub_centre", DataType::UInt, 8, false)?;
        factory.new_field("centre", DataType::UInt, 8, false)?;
    }
    factory.new_field("update_sequence_number", DataType::UInt, 8, false)?;
    factory.new_field("flags_byte", DataType::UInt, 8, false)?;
    let flags1 = current_uint(&factory, "flags_byte")?;
    let has_optional_section = flags1 & 0b1000_0000 != 0;
    factory.add_derived_field(Field::derived(
        "has_optional_section",
        Value::Bool(has_optional_section),
    ))?;
    factory.new_field("data_category", DataType::UInt, 8, false)?;
    if edition == 4 {
        factory.new_field("international_data_sub_category", DataType::UInt, 8, false)?;
        factory.new_field("local_data_sub_category", DataType::UInt, 8, false)?;
    } else {
        factory.new_field("data_sub_category", DataType::UInt, 8, false)?;
    }
    factory.new_field("master_table_version", DataType::UInt, 8, false)?;
    factory.new_field("local_tables_version", DataType::UInt, 8, false)?;
    factory.new_field("typical_year", DataType::UInt, if edition == 4 { 16 } else { 8 }, false)?;
    factory.new_field("typical_month", DataType::UInt, 8, false)?;
    factory.new_field("typical_day", DataType::UInt, 8, false)?;
    factory.new_field("typical_hour", DataType::UInt, 8, false)?;
    factory.new_field("typical_minute", DataType::UInt, 8, false)?;
    if edition == 4 {
        factory.new_field("typical_second", DataType::UInt, 8, false)?;
    }
    let bits_done = factory.bits_read_in_section()?;
    let total_bits = section1_length as usize * 8;
    if total_bits > bits_done {
        factory.new_field("local_use", DataType::Bytes, (total_bits - bits_done) as u32, false)?;
    }

    // Section 2: optional section, present only if flagged.
    if has_optional_section {
        factory.new_section(2, "optional section")?;
        factory.new_field("section_length", DataType::UInt, 24, false)?;
        let section2_length = current_uint(&factory, "section_length")?;
        factory.new_field("reserved", DataType::UInt, 8, false)?;
        let bits_done = factory.bits_read_in_section()?;
        let total_bits = section2_length as usize * 8;
        if total_bits > bits_done {
            factory.new_field("optional", DataType::Bytes, (total_bits - bits_done) as u32, false)?;
        }
    }

    // Section 3: data description section.
    factory.new_section(3, "data description section")?;
    factory.new_field("section_length", DataType::UInt, 24, false)?;
    let section3_length = current_uint(&factory, "section_length")?;
    factory.new_field("reserved", DataType::UInt, 8, false)?;
    factory.new_field("number_of_subsets", DataType::UInt, 16, true)?;
    let nsubsets = current_uint(&factory, "number_of_subsets")? as usize;
    factory.new_field("flags_byte", DataType::UInt, 8, false)?;
    let flags3 = current_uint(&factory, "flags_byte")?;
    let is_observed_data = flags3 & 0b1000_0000 != 0;
    let is_compressed = flags3 & 0b0100_0000 != 0;
    factory.add_derived_field(Field::derived("is_observed_data", Value::Bool(is_observed_data)))?;
    factory.add_derived_field(Field::derived("is_compressed", Value::Bool(is_compressed)))?;
    factory.new_template_field("descriptors", section3_length as usize)?;

    let master_table_number = uint_in_section(&factory, 1, "master_table_number")? as u32;
    let centre = uint_in_section(&factory, 1, "centre")? as u32;
    let sub_centre = uint_in_section(&factory, 1, "sub_centre")? as u32;
    let master_table_version = uint_in_section(&factory, 1, "master_table_version")? as u32;
    let local_tables_version = uint_in_section(&factory, 1, "local_tables_version")? as u32;
    factory.init_table_group(
        master_table_number,
        centre,
        sub_centre,
        master_table_version,
        local_tables_version,
    )?;

    // Section 4: data section.
    factory.new_section(4, "data section")?;
    factory.new_field("section_length", DataType::UInt, 24, false)?;
    let section4_length = current_uint(&factory, "section_length")?;
    factory.new_field("reserved", DataType::UInt, 8, false)?;
    factory.new_payload_field("data", nsubsets, is_compressed)?;
    factory.padding(section4_length as usize)?;

    // Section 5: end section.
    factory.new_section(5, "end section")?;
    factory.check_end_section(edition)?;

    factory.into_message()
}
