//! Descriptor identity, BUFR Table B/D entries and the table-group lookup
//! chain (C2), plus the process-wide table cache (C8).

mod loader;
mod manager;
pub mod table_c;

pub use loader::{load_table_b, load_table_d};

/// One WMO Table C entry: a human-readable description of an operator
/// descriptor, keyed by its `X` class and (for variants) `Y` operand.
#[derive(Clone, Copy, Debug)]
pub struct TableCEntry {
    pub xy: (u32, Option<u16>),
    pub operator_name: &'static str,
    pub operation_definition: &'static str,
}

/// Looks up the WMO description of an operator descriptor, preferring the
/// operand-specific entry (e.g. `22,Some(0)`) over the general one.
pub fn describe_operator(id: DescriptorId) -> Option<&'static TableCEntry> {
    let x = id.x() as u32;
    let y = id.operand();
    table_c::TABLE_C
        .iter()
        .find(|e| e.xy == (x, Some(y)))
        .or_else(|| table_c::TABLE_C.iter().find(|e| e.xy == (x, None)))
}

use std::path::{Path, PathBuf};
use std::sync::Arc;

use binrw::BinRead;

use crate::Error;

pub const F_ELEMENT: u8 = 0;
pub const F_REPLICATION: u8 = 1;
pub const F_OPERATOR: u8 = 2;
pub const F_SEQUENCE: u8 = 3;

pub const OP_NBITS_OFFSET: u32 = 201;
pub const OP_SCALE_OFFSET: u32 = 202;
pub const OP_NEW_REFVAL: u32 = 203;
pub const OP_ASSOCIATE_FIELD: u32 = 204;
pub const OP_INSERT_STRING: u32 = 205;
pub const OP_SKIP_LOCAL: u32 = 206;
pub const OP_MODIFY_PACKING: u32 = 207;
pub const OP_SET_STRING_LENGTH: u32 = 208;
pub const OP_DATA_NOT_PRESENT: u32 = 221;
pub const OP_QUALITY_INFO: u32 = 222;
pub const OP_SUBSTITUTION: u32 = 223;
pub const OP_FIRST_ORDER_STATS: u32 = 224;
pub const OP_DIFFERENCE_STATS: u32 = 225;
pub const OP_REPLACEMENT: u32 = 232;
pub const OP_CANCEL_BACK_REFERENCE: u32 = 235;
pub const OP_DEFINE_BITMAP: u32 = 236;
pub const OP_RECALL_BITMAP: u32 = 237;
pub const OP_DEFINE_EVENT: u32 = 241;
pub const OP_DEFINE_CONDITIONING_EVENT: u32 = 242;
pub const OP_CATEGORICAL_VALUES: u32 = 243;

/// Six-digit descriptor identity (`FXXYYY`), e.g. `031021`. `BinRead` decodes
/// it straight off the wire's 16-bit `FXXXXXXYYYYYYYY` encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, BinRead)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[br(map = |x: u16| DescriptorId(
    ((x >> 14) as u32) * 100_000 + (((x >> 8) & 0x3f) as u32) * 1_000 + (x & 0xff) as u32
))]
pub struct DescriptorId(pub u32);

pub const ID_031021: DescriptorId = DescriptorId(31021);
pub const ID_031031: DescriptorId = DescriptorId(31031);
pub const ID_008023: DescriptorId = DescriptorId(8023);
pub const ID_008024: DescriptorId = DescriptorId(8024);
pub const ID_203255: DescriptorId = DescriptorId(203255);
pub const ID_222000: DescriptorId = DescriptorId(222000);
pub const ID_223000: DescriptorId = DescriptorId(223000);
pub const ID_223255: DescriptorId = DescriptorId(223255);
pub const ID_224000: DescriptorId = DescriptorId(224000);
pub const ID_224255: DescriptorId = DescriptorId(224255);
pub const ID_225000: DescriptorId = DescriptorId(225000);
pub const ID_225255: DescriptorId = DescriptorId(225255);
pub const ID_232000: DescriptorId = DescriptorId(232000);
pub const ID_232255: DescriptorId = DescriptorId(232255);
pub const ID_236000: DescriptorId = DescriptorId(236000);
pub const ID_237000: DescriptorId = DescriptorId(237000);
pub const ID_237255: DescriptorId = DescriptorId(237255);

impl DescriptorId {
    pub fn f(self) -> u8 {
        (self.0 / 100_000) as u8
    }

    pub fn x(self) -> u8 {
        ((self.0 / 1000) % 100) as u8
    }

    pub fn y(self) -> u16 {
        (self.0 % 1000) as u16
    }

    /// Operator code, i.e. `id / 1000` for an operator descriptor (201..243).
    pub fn operator_code(self) -> u32 {
        self.0 / 1000
    }

    pub fn operand(self) -> u16 {
        self.y()
    }
}

impl std::fmt::Display for DescriptorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:06}", self.0)
    }
}

/// Normalised BUFR unit, used to pick the right bit-unpacking strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Unit {
    Numeric,
    String,
    /// Non-negative code, covers all "CODE TABLE" descriptors.
    NonNegCode,
    /// Full range code (only used by the 203YYY new-refval session).
    Code,
    Flag,
    Binary,
}

pub(crate) fn unit_of(s: &str) -> Unit {
    if s == "CCITT IA5" || s == "Character" {
        Unit::String
    } else if s == "FLAG TABLE" {
        Unit::Flag
    } else if s == "CODE TABLE" || s.starts_with("Common CODE TABLE") {
        Unit::NonNegCode
    } else {
        Unit::Numeric
    }
}

/// Table B entry: packing info plus unit metadata for an element descriptor.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Bentry {
    pub name: String,
    pub unit_string: String,
    pub unit: Unit,
    pub scale: i32,
    pub refval: i64,
    pub nbits: u32,
    pub crex_unit_string: String,
    pub crex_unit: Unit,
    pub crex_scale: i32,
    pub crex_nchars: u32,
}

/// Table D entry: the expanded member descriptor IDs of a sequence.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Dentry {
    pub name: String,
    pub members: Vec<DescriptorId>,
}

/// Additional descriptor information, mirroring the union of entry types a
/// descriptor can carry depending on its class.
#[derive(Clone, Debug)]
pub enum Entry {
    Root,
    /// Unknown local descriptor appearing right after operator 206YYY.
    LocalDescriptor,
    Element(Arc<Bentry>),
    Sequence(Arc<Dentry>),
    /// Placeholder name for replication/operator descriptors that have no
    /// table-backed entry (mirrors Go's Rentry/Centry).
    Name(String),
}

impl Entry {
    pub fn name(&self) -> &str {
        match self {
            Entry::Root => "Root",
            Entry::LocalDescriptor => "LOCAL DESCRIPTOR",
            Entry::Element(b) => &b.name,
            Entry::Sequence(d) => &d.name,
            Entry::Name(n) => n,
        }
    }
}

/// A resolved descriptor: its ID plus whatever table information backs it.
#[derive(Clone, Debug)]
pub struct Descriptor {
    pub id: DescriptorId,
    pub entry: Entry,
}

pub const ROOT_ID: DescriptorId = DescriptorId(0);

impl Descriptor {
    pub fn root() -> Self {
        Descriptor {
            id: ROOT_ID,
            entry: Entry::Root,
        }
    }

    pub fn local(id: DescriptorId) -> Self {
        Descriptor {
            id,
            entry: Entry::LocalDescriptor,
        }
    }

    pub fn f(&self) -> u8 {
        self.id.f()
    }
    pub fn x(&self) -> u8 {
        self.id.x()
    }
    pub fn y(&self) -> u16 {
        self.id.y()
    }
    pub fn operator_code(&self) -> u32 {
        self.id.operator_code()
    }
    pub fn operand(&self) -> u16 {
        self.id.operand()
    }
    pub fn name(&self) -> &str {
        self.entry.name()
    }

    pub fn as_bentry(&self) -> Option<&Bentry> {
        match &self.entry {
            Entry::Element(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_dentry(&self) -> Option<&Dentry> {
        match &self.entry {
            Entry::Sequence(d) => Some(d),
            _ => None,
        }
    }

    /// Re-labels a descriptor for display as an associated-field attribute node
    /// (mirrors Go's DecorateDescriptor used only for naming purposes).
    pub fn decorate_assoc_field(&self) -> Descriptor {
        Descriptor {
            id: self.id,
            entry: Entry::Name("ASSOCIATED FIELD".to_string()),
        }
    }
}

impl std::fmt::Display for Descriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.id, self.name())
    }
}

/// A group of related tables (one master/centre/subcentre/version combination).
pub trait TableGroup: Send + Sync {
    fn lookup(&self, id: DescriptorId) -> Result<Descriptor, Error>;
}

pub struct TableB {
    #[allow(dead_code)]
    path: PathBuf,
    entries: hashbrown::HashMap<DescriptorId, Arc<Bentry>>,
}

impl TableB {
    pub fn lookup(&self, id: DescriptorId) -> Result<Descriptor, Error> {
        self.entries
            .get(&id)
            .map(|b| Descriptor {
                id,
                entry: Entry::Element(b.clone()),
            })
            .ok_or(Error::TableLookup { id: id.0 })
    }
}

pub struct TableD {
    #[allow(dead_code)]
    path: PathBuf,
    entries: hashbrown::HashMap<DescriptorId, Arc<Dentry>>,
}

impl TableD {
    pub fn lookup(&self, id: DescriptorId) -> Result<Descriptor, Error> {
        self.entries
            .get(&id)
            .map(|d| Descriptor {
                id,
                entry: Entry::Sequence(d.clone()),
            })
            .ok_or(Error::TableLookup { id: id.0 })
    }
}

/// A group of tables that belong to the same centre and version number.
pub struct SingleTableGroup {
    b: Arc<TableB>,
    d: Arc<TableD>,
}

impl SingleTableGroup {
    pub fn new(
        tables_base_path: &Path,
        master_table_number: u32,
        centre_number: u32,
        sub_centre_number: u32,
        version_number: u32,
    ) -> Result<Self, Error> {
        let b = manager::get_table_b(
            tables_base_path,
            master_table_number,
            centre_number,
            sub_centre_number,
            version_number,
        )?;
        let d = manager::get_table_d(
            tables_base_path,
            master_table_number,
            centre_number,
            sub_centre_number,
            version_number,
        )?;
        Ok(Self { b, d })
    }
}

impl TableGroup for SingleTableGroup {
    fn lookup(&self, id: DescriptorId) -> Result<Descriptor, Error> {
        match id.f() {
            F_ELEMENT => self.b.lookup(id),
            F_REPLICATION => Ok(Descriptor {
                id,
                entry: Entry::Name(id.to_string()),
            }),
            F_OPERATOR => Ok(Descriptor {
                id,
                entry: Entry::Name(id.to_string()),
            }),
            F_SEQUENCE => self.d.lookup(id),
            _ => Err(Error::TableLookup { id: id.0 }),
        }
    }
}

/// A meta table group backed by an ordered list of member groups: the first
/// group that resolves an ID wins (local table falling back to WMO table).
pub struct ChainingTableGroup {
    tables_base_path: PathBuf,
    groups: Vec<Box<dyn TableGroup>>,
}

impl ChainingTableGroup {
    pub fn new(tables_base_path: impl Into<PathBuf>) -> Self {
        Self {
            tables_base_path: tables_base_path.into(),
            groups: Vec::new(),
        }
    }

    pub fn reset_groups(&mut self) {
        self.groups.clear();
    }

    pub fn add_single_table_group(
        &mut self,
        master_table_number: u32,
        centre_number: u32,
        sub_centre_number: u32,
        version_number: u32,
    ) -> Result<(), Error> {
        let g = SingleTableGroup::new(
            &self.tables_base_path,
            master_table_number,
            centre_number,
            sub_centre_number,
            version_number,
        )?;
        self.groups.push(Box::new(g));
        Ok(())
    }

    /// Adds a local-table group and a WMO-table group that share the same
    /// master table number. Falls back to sub-centre 0 if the local group's
    /// table file is missing for the reporting sub-centre.
    pub fn add_local_and_wmo_table_groups(
        &mut self,
        master_table_number: u32,
        centre_number: u32,
        sub_centre_number: u32,
        wmo_version_number: u32,
        local_version_number: u32,
    ) -> Result<(), Error> {
        if local_version_number != 0 {
            match self.add_single_table_group(
                master_table_number,
                centre_number,
                sub_centre_number,
                local_version_number,
            ) {
                Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::warn!(
                        centre = centre_number,
                        sub_centre = sub_centre_number,
                        "local table not found, falling back to sub-centre 0"
                    );
                    self.add_single_table_group(
                        master_table_number,
                        centre_number,
                        0,
                        local_version_number,
                    )?;
                }
                Err(e) => return Err(e),
                Ok(()) => {}
            }
        }
        self.add_single_table_group(master_table_number, 0, 0, wmo_version_number)
    }
}

impl TableGroup for ChainingTableGroup {
    fn lookup(&self, id: DescriptorId) -> Result<Descriptor, Error> {
        for g in &self.groups {
            if let Ok(d) = g.lookup(id) {
                return Ok(d);
            }
        }
        Err(Error::TableLookup { id: id.0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_id_splits_into_f_x_y() {
        let id = DescriptorId(31021);
        assert_eq!(id.f(), 0);
        assert_eq!(id.x(), 31);
        assert_eq!(id.y(), 21);
    }

    #[test]
    fn descriptor_id_display_is_zero_padded() {
        assert_eq!(DescriptorId(1001).to_string(), "001001");
    }

    #[test]
    fn describe_operator_prefers_operand_specific_entry() {
        let general = describe_operator(DescriptorId(1001)).unwrap();
        assert_eq!(general.xy, (1, None));

        let specific = describe_operator(DescriptorId(22000)).unwrap();
        assert_eq!(specific.xy, (22, Some(0)));
    }

    #[test]
    fn unit_of_classifies_known_unit_strings() {
        assert_eq!(unit_of("CCITT IA5"), Unit::String);
        assert_eq!(unit_of("FLAG TABLE"), Unit::Flag);
        assert_eq!(unit_of("CODE TABLE"), Unit::NonNegCode);
        assert_eq!(unit_of("Common CODE TABLE C-1"), Unit::NonNegCode);
        assert_eq!(unit_of("m"), Unit::Numeric);
    }
}
