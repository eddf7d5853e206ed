//! BUFR value model (C7): the decoded-message tree a caller actually reads —
//! `Message -> Section -> Field`, and within a payload field,
//! `Payload -> Subset -> Cell -> (tree Node, value)`.

use std::cell::{Cell as StdCell, RefCell};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::bitio::Binary;
use crate::tables::{Descriptor, Unit};
use crate::Error;

/// Scale/refval/nbits a value was actually decoded with (after 201/202/207
/// offsets and any 203YYY refval override have been folded in).
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PackingInfo {
    pub unit: Unit,
    pub scale: i32,
    pub refval: f64,
    pub nbits: u32,
}

pub type LookupFn = fn(u64) -> Option<&'static str>;

/// A decoded value, tagged by the representation its unit implies.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum Value {
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    String(String),
    Bytes(Vec<u8>),
    Binary(Binary),
}

impl Value {
    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Value::UInt(v) => Some(*v),
            Value::Int(v) if *v >= 0 => Some(*v as u64),
            Value::Float(v) if *v >= 0.0 => Some(*v as u64),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::UInt(v) => Some(*v as i64),
            Value::Float(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            Value::UInt(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

/// A node in the per-subset decoded tree: either a structural node carrying
/// no value of its own (sequences, replication blocks) or a valued leaf.
#[derive(Debug)]
pub enum BufrNode {
    Valueless {
        descriptor: Descriptor,
        members: RefCell<Vec<Arc<BufrNode>>>,
    },
    Valued {
        descriptor: Descriptor,
        /// Position of this node's cell within the owning subset.
        index: usize,
        packing_info: PackingInfo,
        /// Compressed-payload metadata (0 for uncompressed payloads).
        min_value: StdCell<u64>,
        nbits_diff: StdCell<u32>,
        members: RefCell<Vec<Arc<BufrNode>>>,
    },
}

impl BufrNode {
    pub fn descriptor(&self) -> &Descriptor {
        match self {
            BufrNode::Valueless { descriptor, .. } => descriptor,
            BufrNode::Valued { descriptor, .. } => descriptor,
        }
    }

    pub fn members(&self) -> &RefCell<Vec<Arc<BufrNode>>> {
        match self {
            BufrNode::Valueless { members, .. } => members,
            BufrNode::Valued { members, .. } => members,
        }
    }

    pub fn add_member(&self, node: Arc<BufrNode>) {
        self.members().borrow_mut().push(node);
    }
}

/// One decoded value, paired with the tree node it came from.
#[derive(Clone, Debug)]
pub struct Cell {
    pub node: Arc<BufrNode>,
    pub value: Value,
}

impl Cell {
    pub fn new(node: Arc<BufrNode>, value: Value) -> Self {
        Self { node, value }
    }

    pub fn string_value(&self) -> Option<&str> {
        self.value.as_str()
    }

    pub fn uint_value(&self) -> Option<u64> {
        self.value.as_uint()
    }

    pub fn int_value(&self) -> Option<i64> {
        self.value.as_int()
    }

    pub fn float_value(&self) -> Option<f64> {
        self.value.as_float()
    }
}

/// One subset of a (possibly compressed) payload field.
#[derive(Debug)]
pub struct Subset {
    pub index: usize,
    pub cells: Vec<Cell>,
    pub root: Arc<BufrNode>,
}

impl Subset {
    pub fn cell(&self, i: usize) -> Option<&Cell> {
        self.cells.get(i)
    }
}

/// All decoded subsets of a Section 4 payload field.
#[derive(Debug, Default)]
pub struct Payload {
    pub subsets: Vec<Subset>,
    pub compressed: bool,
}

impl Payload {
    pub fn add_subset(&mut self, root: Arc<BufrNode>, cells: Vec<Cell>) {
        let index = self.subsets.len();
        self.subsets.push(Subset { index, cells, root });
    }
}

/// Missing-value sentinel for an `nbits`-wide unsigned field: all-ones.
pub fn missing_value(nbits: u32) -> u64 {
    if nbits == 0 {
        0
    } else if nbits >= 64 {
        u64::MAX
    } else {
        (1u64 << nbits) - 1
    }
}

pub fn is_missing_uint(value: u64, nbits: u32) -> bool {
    nbits > 1 && value == missing_value(nbits)
}

/// A single decoded field within a section: a header value (centre number,
/// edition, ...) or an embedded payload/template field.
#[derive(Clone)]
pub struct Field {
    pub name: String,
    pub value: FieldValue,
    pub nbits: u32,
    pub lookup: Option<LookupFn>,
    pub hidden: bool,
    pub r#virtual: bool,
}

#[derive(Clone)]
pub enum FieldValue {
    Scalar(Value),
    Payload(Arc<Payload>),
}

impl Field {
    pub fn new(name: impl Into<String>, value: Value, nbits: u32) -> Self {
        Self {
            name: name.into(),
            value: FieldValue::Scalar(value),
            nbits,
            lookup: None,
            hidden: false,
            r#virtual: false,
        }
    }

    pub fn hidden(name: impl Into<String>, value: Value, nbits: u32) -> Self {
        let mut f = Self::new(name, value, nbits);
        f.hidden = true;
        f
    }

    /// A field derived from bits another field already consumed (e.g. a flag
    /// pulled out of an already-read flags byte). Carries no width of its
    /// own, so the encoder must skip it rather than re-emit its bits.
    pub fn derived(name: impl Into<String>, value: Value) -> Self {
        let mut f = Self::new(name, value, 0);
        f.hidden = true;
        f.r#virtual = true;
        f
    }

    pub fn payload(name: impl Into<String>, payload: Arc<Payload>) -> Self {
        Self {
            name: name.into(),
            value: FieldValue::Payload(payload),
            nbits: 0,
            lookup: None,
            hidden: false,
            r#virtual: false,
        }
    }

    pub fn is_missing(&self) -> bool {
        match &self.value {
            FieldValue::Scalar(Value::UInt(v)) => is_missing_uint(*v, self.nbits),
            _ => false,
        }
    }
}

/// One of Sections 0 through 5 of a message, holding its own metadata map
/// (e.g. `description`) plus the ordered fields decoded within it.
pub struct Section {
    pub start_byte_index: usize,
    pub padding: Option<Binary>,
    number: u8,
    metadata: IndexMap<String, String>,
    fields: Vec<Field>,
}

impl Section {
    pub fn new(number: u8, description: impl Into<String>) -> Self {
        let mut metadata = IndexMap::new();
        metadata.insert("description".to_string(), description.into());
        Self {
            start_byte_index: 0,
            padding: None,
            number,
            metadata,
            fields: Vec::new(),
        }
    }

    pub fn number(&self) -> u8 {
        self.number
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn metadata(&self, key: &str) -> Result<&str, Error> {
        self.metadata
            .get(key)
            .map(|s| s.as_str())
            .ok_or_else(|| Error::Fatal(format!("missing section metadata key {key}")))
    }

    pub fn add_field(&mut self, field: Field) {
        self.fields.push(field);
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field_by_name(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// The whole decoded message: its input path, and the ordered Section 0-5
/// structures the [`crate::factory::Factory`] populated.
pub struct Message {
    pub metadata: IndexMap<String, String>,
    pub sections: Vec<Section>,
    proxy_fields: IndexMap<String, Field>,
}

impl Message {
    pub fn new(input_path: impl Into<String>) -> Self {
        let mut metadata = IndexMap::new();
        metadata.insert("inputPath".to_string(), input_path.into());
        Self {
            metadata,
            sections: Vec::new(),
            proxy_fields: IndexMap::new(),
        }
    }

    pub fn new_section(&mut self, number: u8, description: impl Into<String>) -> &mut Section {
        self.sections.push(Section::new(number, description));
        self.sections.last_mut().unwrap()
    }

    /// Registers a field (typically a count like "number of subsets") for
    /// later lookup by name from elsewhere in the decoding pipeline.
    pub fn set_proxy_field(&mut self, name: impl Into<String>, field: Field) {
        self.proxy_fields.insert(name.into(), field);
    }

    pub fn proxy_field(&self, name: &str) -> Result<&Field, Error> {
        self.proxy_fields
            .get(name)
            .ok_or_else(|| Error::Fatal(format!("no proxy field named {name}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_value_is_all_ones_for_width() {
        assert_eq!(missing_value(8), 0xff);
        assert_eq!(missing_value(1), 1);
        assert_eq!(missing_value(0), 0);
    }

    #[test]
    fn is_missing_uint_excludes_single_bit_fields() {
        // a 1-bit field can't carry a missing-value sentinel distinct from
        // its only two legal values
        assert!(!is_missing_uint(1, 1));
        assert!(is_missing_uint(0xff, 8));
        assert!(!is_missing_uint(0xfe, 8));
    }

    #[test]
    fn value_as_uint_rejects_negative_int() {
        assert_eq!(Value::Int(-1).as_uint(), None);
        assert_eq!(Value::Int(5).as_uint(), Some(5));
        assert_eq!(Value::UInt(7).as_uint(), Some(7));
    }

    #[test]
    fn field_is_missing_only_for_sentinel_uint_scalars() {
        let missing = Field::new("x", Value::UInt(missing_value(8)), 8);
        assert!(missing.is_missing());

        let present = Field::new("x", Value::UInt(3), 8);
        assert!(!present.is_missing());

        let non_uint = Field::new("x", Value::Float(1.0), 8);
        assert!(!non_uint.is_missing());
    }

    #[test]
    fn section_field_by_name_finds_added_fields() {
        let mut section = Section::new(1, "identification section");
        section.add_field(Field::new("centre", Value::UInt(7), 16));
        assert_eq!(section.field_by_name("centre").unwrap().value.scalar_uint(), Some(7));
        assert!(section.field_by_name("missing").is_none());
    }

    impl FieldValue {
        fn scalar_uint(&self) -> Option<u64> {
            match self {
                FieldValue::Scalar(v) => v.as_uint(),
                FieldValue::Payload(_) => None,
            }
        }
    }

    #[test]
    fn message_proxy_field_round_trips() {
        let mut msg = Message::new("<test>");
        msg.set_proxy_field("number_of_subsets", Field::new("number_of_subsets", Value::UInt(3), 16));
        assert_eq!(msg.proxy_field("number_of_subsets").unwrap().value.scalar_uint(), Some(3));
        assert!(msg.proxy_field("nope").is_err());
    }
}
