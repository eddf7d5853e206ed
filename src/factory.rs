//! Driver-facing decode API (C10), mirroring the original's `Factory`
//! interface: a thin sequencing layer over the bit reader, table groups,
//! parser and deserializer that a CLI or library caller drives section by
//! section.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use crate::bitio::{BufrRead, PeekableBitReader, PeekableBufrRead};
use crate::deserializer;
use crate::model::{Field, Message, Section, Value};
use crate::parser::{self, UnexpandedTemplate};
use crate::tables::{ChainingTableGroup, DescriptorId};
use crate::Error;

pub const DESCRIPTOR_FBITS: u32 = 2;
pub const DESCRIPTOR_XBITS: u32 = 6;
pub const DESCRIPTOR_YBITS: u32 = 8;

#[derive(Clone, Copy, Debug)]
pub enum DataType {
    Int,
    UInt,
    Float,
    Bool,
    Bytes,
    Binary,
}

/// Where to find `<master>/<centre>/<sub_centre>/<version>/Table{B,D}.csv`.
#[derive(Clone, Debug)]
pub struct Config {
    pub tables_path: PathBuf,
    /// Inserts placeholder zero-valued nodes at operator descriptor
    /// positions so the decoded tree shape matches legacy decoders.
    pub compatible: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tables_path: PathBuf::from("tables"),
            compatible: false,
        }
    }
}

pub struct Factory<R: Read> {
    config: Config,
    reader: PeekableBitReader<R>,
    message: Option<Message>,
    table_group: Option<ChainingTableGroup>,
    template: Option<UnexpandedTemplate>,
}

impl<R: Read> Factory<R> {
    pub fn new(reader: R, config: Config) -> Self {
        Self {
            config,
            reader: PeekableBitReader::new(reader),
            message: None,
            table_group: None,
            template: None,
        }
    }

    pub fn message(&self) -> Result<&Message, Error> {
        self.message.as_ref().ok_or_else(|| Error::Fatal("no active message".into()))
    }

    pub fn into_message(self) -> Result<Message, Error> {
        self.message.ok_or_else(|| Error::Fatal("no active message".into()))
    }

    pub fn new_message(&mut self, input_path: impl Into<String>) {
        self.message = Some(Message::new(input_path));
    }

    pub fn new_section(&mut self, number: u8, description: impl Into<String>) -> Result<(), Error> {
        let start_byte_index = self.reader.pos() / 8;
        let section = self
            .message
            .as_mut()
            .ok_or_else(|| Error::Fatal("no active message".into()))?
            .new_section(number, description);
        section.start_byte_index = start_byte_index;
        Ok(())
    }

    fn current_section_mut(&mut self) -> Result<&mut Section, Error> {
        self.message
            .as_mut()
            .ok_or_else(|| Error::Fatal("no active message".into()))?
            .sections
            .last_mut()
            .ok_or_else(|| Error::Fatal("no active section".into()))
    }

    pub fn init_table_group(
        &mut self,
        master_table_number: u32,
        centre_number: u32,
        sub_centre_number: u32,
        wmo_version_number: u32,
        local_version_number: u32,
    ) -> Result<(), Error> {
        let mut group = ChainingTableGroup::new(self.config.tables_path.clone());
        group.add_local_and_wmo_table_groups(
            master_table_number,
            centre_number,
            sub_centre_number,
            wmo_version_number,
            local_version_number,
        )?;
        self.table_group = Some(group);
        Ok(())
    }

    pub fn new_field(
        &mut self,
        name: impl Into<String>,
        data_type: DataType,
        nbits: u32,
        proxy: bool,
    ) -> Result<(), Error> {
        let name = name.into();
        let value = match data_type {
            DataType::Int => Value::Int(self.reader.read_int(nbits)?),
            DataType::UInt => Value::UInt(self.reader.read_uint(nbits)?),
            DataType::Float => Value::Float(self.reader.read_float32()?),
            DataType::Bool => Value::Bool(self.reader.read_bool()?),
            DataType::Bytes => Value::Bytes(self.reader.read_bytes((nbits / 8) as usize)?),
            DataType::Binary => Value::Binary(self.reader.read_binary(nbits)?),
        };
        let field = Field::new(name.clone(), value.clone(), nbits);
        self.current_section_mut()?.add_field(field);
        if proxy {
            let proxy_field = Field::new(name.clone(), value, nbits);
            self.message
                .as_mut()
                .ok_or_else(|| Error::Fatal("no active message".into()))?
                .set_proxy_field(name, proxy_field);
        }
        Ok(())
    }

    /// Reads `(F,X,Y)` descriptor triples until the enclosing section is
    /// exhausted, recording the unexpanded template for later parsing.
    pub fn new_template_field(
        &mut self,
        name: impl Into<String>,
        section_length_bytes: usize,
    ) -> Result<(), Error> {
        let section_start_bit = self.current_section_mut()?.start_byte_index * 8;
        let section_total_bits = section_length_bytes * 8;
        let mut ids = Vec::new();
        while self.reader.pos() - section_start_bit < section_total_bits {
            let f = self.reader.read_uint(DESCRIPTOR_FBITS)? as u32;
            let x = self.reader.read_uint(DESCRIPTOR_XBITS)? as u32;
            let y = self.reader.read_uint(DESCRIPTOR_YBITS)? as u32;
            ids.push(DescriptorId(f * 100_000 + x * 1_000 + y));
        }
        let template = UnexpandedTemplate {
            ids,
            fbits: DESCRIPTOR_FBITS,
            xbits: DESCRIPTOR_XBITS,
            ybits: DESCRIPTOR_YBITS,
        };
        let count = template.ids.len() as u64;
        self.template = Some(template);
        self.current_section_mut()?
            .add_field(Field::derived(name, Value::UInt(count)));
        Ok(())
    }

    pub fn new_payload_field(
        &mut self,
        name: impl Into<String>,
        nsubsets: usize,
        compressed: bool,
    ) -> Result<(), Error> {
        let template = self
            .template
            .clone()
            .ok_or_else(|| Error::Fatal("no template parsed before the payload field".into()))?;
        let table_group = self
            .table_group
            .as_ref()
            .ok_or_else(|| Error::Fatal("table group not initialised before the payload field".into()))?;
        let ast_root = parser::parse(table_group, &template)?;
        let payload = deserializer::decode_payload(
            &ast_root,
            &mut self.reader,
            nsubsets,
            compressed,
            self.config.compatible,
        )?;
        self.current_section_mut()?
            .add_field(Field::payload(name, Arc::new(payload)));
        Ok(())
    }

    pub fn padding(&mut self, section_length_bytes: usize) -> Result<(), Error> {
        let section_start_bit = self.current_section_mut()?.start_byte_index * 8;
        let bits_read = self.reader.pos() - section_start_bit;
        let total_bits = section_length_bytes * 8;
        if bits_read > total_bits {
            return Err(Error::OutOfSectionBoundary {
                overshoot_bits: (bits_read - total_bits) as i64,
            });
        }
        let padding_bits = (total_bits - bits_read) as u32;
        let binary = self.reader.read_binary(padding_bits)?;
        let section = self.current_section_mut()?;
        section.padding = Some(binary.clone());
        section.add_field(Field::hidden("padding", Value::Binary(binary), padding_bits));
        Ok(())
    }

    /// Bits consumed since the current section's `start_byte_index`.
    pub fn bits_read_in_section(&mut self) -> Result<usize, Error> {
        let start = self.current_section_mut()?.start_byte_index * 8;
        Ok(self.reader.pos() - start)
    }

    pub fn check_eof(&mut self) -> Result<bool, Error> {
        Ok(self.reader.peek_bytes(0, 1)?.is_empty())
    }

    /// Attaches a field that was derived from bits already consumed (e.g. the
    /// individual flags decoded out of a just-read flag byte) rather than
    /// read fresh from the stream.
    pub fn add_derived_field(&mut self, field: Field) -> Result<(), Error> {
        self.current_section_mut()?.add_field(field);
        Ok(())
    }

    /// Verifies the literal `7777` end signature (edition 3 tolerates a
    /// leading `\0` or a three-byte `777` in its place).
    pub fn check_end_section(&mut self, edition: u8) -> Result<(), Error> {
        if edition == 3 {
            let lead = self.reader.read_bytes(1)?;
            match lead[0] {
                0x0 => {}
                b'7' => {
                    let rest = self.reader.read_bytes(3)?;
                    if rest != b"777" {
                        return Err(Error::Fatal("invalid end section".into()));
                    }
                    return Ok(());
                }
                _ => return Err(Error::Fatal("invalid end section".into())),
            }
        }
        let buf = self.reader.read_bytes(4)?;
        if buf != b"7777" {
            return Err(Error::Fatal("invalid end section".into()));
        }
        Ok(())
    }

    pub fn peek_edition_number(&mut self) -> Result<u8, Error> {
        Ok(self.reader.peek_uint(7, 8)? as u8)
    }

    /// Scans forward byte by byte until the literal `BUFR` start signature is
    /// found, or EOF is reached first.
    pub fn seek_start_signature(&mut self) -> Result<bool, Error> {
        loop {
            let peeked = self.reader.peek_bytes(0, 4)?;
            if peeked.len() < 4 {
                return Ok(false);
            }
            if peeked == b"BUFR" {
                return Ok(true);
            }
            self.reader.read_bytes(1)?;
        }
    }
}
