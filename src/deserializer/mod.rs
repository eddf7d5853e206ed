//! Deserializer engine (C6): walks the parsed template tree once per subset
//! (uncompressed) or once total (compressed, fanning each node's value out
//! across subsets), producing a fully decoded [`Payload`].
//!
//! The Go original dispatches through an `ast.Visitor` interface with one
//! `VisitXNode` method per node type (double dispatch, since Go has no sum
//! types). Here the [`ast::Node`] enum lets a single `match` do the same job
//! directly — no trait objects, no `Accept` boilerplate.
//!
//! The tree builder's ancestor stack and the associated-field operator stack
//! are both `SmallVec<[_; 8]>`, matching the teacher's own walk stack
//! (`reader.rs`'s `SmallVec<[StackEntry; 8]>`): template nesting is shallow
//! in practice, so most messages never spill either stack to the heap.

mod bitmap;
mod cells;

use std::cell::RefCell;
use std::sync::Arc;

use hashbrown::HashMap;

use crate::ast::Node;
use crate::model::{BufrNode, Cell, PackingInfo, Payload, Value};
use crate::tables::{Descriptor, DescriptorId, Entry, Unit, ID_236000, ID_237000, OP_DIFFERENCE_STATS};
use crate::unpack::{UnpackedValue, Unpacker};
use crate::Error;

use bitmap::BitmapManager;
use cells::{CellsBuilder, CompressedCellsBuilder, UncompressCellsBuilder};

/// Decodes one Section 4 payload given its already-parsed template tree.
pub fn decode_payload(
    root: &Node,
    reader: &mut dyn crate::bitio::BufrRead,
    nsubsets: usize,
    compressed: bool,
    compatible: bool,
) -> Result<Payload, Error> {
    let mut payload = Payload {
        subsets: Vec::new(),
        compressed,
    };
    let passes = if compressed { 1 } else { nsubsets.max(1) };
    for _ in 0..passes {
        let mut visitor = DesVisitor::new(compressed, compatible, nsubsets);
        if compressed {
            let mut unpacker = crate::unpack::CompressedBitUnpacker { reader, nsubsets };
            visitor.visit_root(root, &mut unpacker)?;
        } else {
            let mut unpacker = crate::unpack::UncompressBitUnpacker { reader };
            visitor.visit_root(root, &mut unpacker)?;
        }
        let root_node = visitor.tree.root()?;
        visitor.cells.produce(&mut payload, root_node)?;
    }
    Ok(payload)
}

struct AssocPair {
    nbits: u32,
    node: Option<Arc<BufrNode>>,
}

#[derive(Default)]
struct AssocPairs(smallvec::SmallVec<[AssocPair; 8]>);

impl AssocPairs {
    fn push(&mut self, nbits: u32) {
        self.0.push(AssocPair { nbits, node: None });
    }
    fn pop(&mut self) -> Option<AssocPair> {
        self.0.pop()
    }
    fn set_node(&mut self, node: Arc<BufrNode>) {
        if let Some(last) = self.0.last_mut() {
            last.node = Some(node);
        }
    }
}

struct TreeBuilder {
    node: Arc<BufrNode>,
    stack: smallvec::SmallVec<[Arc<BufrNode>; 8]>,
}

impl TreeBuilder {
    fn new(root: Arc<BufrNode>) -> Self {
        Self {
            node: root,
            stack: smallvec::SmallVec::new(),
        }
    }

    fn add(&mut self, node: Arc<BufrNode>) {
        self.node.add_member(node);
    }

    fn push(&mut self, node: Arc<BufrNode>) {
        self.node.add_member(node.clone());
        self.stack.push(self.node.clone());
        self.node = node;
    }

    fn pop(&mut self) -> Result<(), Error> {
        self.node = self
            .stack
            .pop()
            .ok_or_else(|| Error::Fatal("tree builder stack underflow".into()))?;
        Ok(())
    }

    fn root(self) -> Result<Arc<BufrNode>, Error> {
        if !self.stack.is_empty() {
            return Err(Error::Fatal("tree builder finished with an open block".into()));
        }
        Ok(self.node)
    }
}

fn new_root_node() -> Arc<BufrNode> {
    Arc::new(BufrNode::Valueless {
        descriptor: Descriptor::root(),
        members: RefCell::new(Vec::new()),
    })
}

fn new_block_node() -> Arc<BufrNode> {
    Arc::new(BufrNode::Valueless {
        descriptor: Descriptor {
            id: DescriptorId(0),
            entry: Entry::Name("Block".to_string()),
        },
        members: RefCell::new(Vec::new()),
    })
}

struct DesVisitor {
    compressed: bool,
    compatible: bool,
    nsubsets: usize,
    tree: TreeBuilder,
    cells: Box<dyn CellsBuilder>,
    nbits_offset: i32,
    scale_offset: i32,
    new_refval_values: HashMap<DescriptorId, f64>,
    assoc_pairs: AssocPairs,
    nbits_increment: u32,
    scale_increment: i32,
    refval_factor: i32,
    nbits_string: Option<u32>,
    bitmap: BitmapManager,
}

impl DesVisitor {
    fn new(compressed: bool, compatible: bool, nsubsets: usize) -> Self {
        let cells: Box<dyn CellsBuilder> = if compressed {
            Box::new(CompressedCellsBuilder::new(nsubsets))
        } else {
            Box::new(UncompressCellsBuilder::default())
        };
        Self {
            compressed,
            compatible,
            nsubsets,
            tree: TreeBuilder::new(new_root_node()),
            cells,
            nbits_offset: 0,
            scale_offset: 0,
            new_refval_values: HashMap::new(),
            assoc_pairs: AssocPairs::default(),
            nbits_increment: 0,
            scale_increment: 0,
            refval_factor: 0,
            nbits_string: None,
            bitmap: BitmapManager::default(),
        }
    }

    fn visit_root(&mut self, root: &Node, unpacker: &mut dyn Unpacker) -> Result<(), Error> {
        let Node::Root { members } = root else {
            return Err(Error::Fatal("expected a root node".into()));
        };
        for m in members {
            self.visit_node(m, unpacker)?;
        }
        Ok(())
    }

    fn visit_node(&mut self, node: &Node, unpacker: &mut dyn Unpacker) -> Result<(), Error> {
        match node {
            Node::Root { members } => {
                for m in members {
                    self.visit_node(m, unpacker)?;
                }
                Ok(())
            }
            Node::Element { descriptor, not_present } => self.visit_element(descriptor, *not_present, unpacker),
            Node::E031021 { descriptor } => self.visit_e031021(descriptor, unpacker),
            Node::Sequence { descriptor, members } => self.visit_sequence(descriptor, members, unpacker),
            Node::FixedReplication {
                descriptor: _,
                count,
                members,
            } => {
                for _ in 0..*count {
                    self.build_block(members, unpacker)?;
                }
                Ok(())
            }
            Node::DelayedReplication { descriptor: _, members } => self.visit_delayed_replication(members, unpacker),
            Node::OpNbitsOffset { descriptor } => {
                self.nbits_offset = offset_from_operand(descriptor.operand());
                Ok(())
            }
            Node::OpScaleOffset { descriptor } => {
                self.scale_offset = offset_from_operand(descriptor.operand());
                Ok(())
            }
            Node::OpNewRefval { descriptor, members } => self.visit_op_new_refval(descriptor, members, unpacker),
            Node::OpAssocField { descriptor, members } => self.visit_op_assoc_field(descriptor, members, unpacker),
            Node::OpInsertString { descriptor } => self.visit_op_insert_string(descriptor, unpacker),
            Node::OpSkipLocal { descriptor, members } => self.visit_op_skip_local(descriptor, members, unpacker),
            Node::OpModifyPacking { descriptor } => {
                self.visit_op_modify_packing(descriptor);
                Ok(())
            }
            Node::OpSetStringLength { descriptor } => {
                self.nbits_string = if descriptor.operand() == 0 {
                    None
                } else {
                    Some(descriptor.operand() as u32 * 8)
                };
                Ok(())
            }
            Node::OpDataNotPresent { descriptor: _, members } => {
                for m in members {
                    self.visit_node(m, unpacker)?;
                }
                Ok(())
            }
            Node::OpAssessment {
                descriptor,
                bitmap,
                attrs,
                members,
            } => self.visit_op_assessment(descriptor, bitmap, attrs, members, unpacker),
            Node::OpMarker { descriptor } => {
                let target = self.bitmap.next_target_node()?;
                let marker = self.build_marker_node(descriptor, &target, unpacker)?;
                target.add_member(marker);
                Ok(())
            }
            Node::OpCancelBackRef { descriptor: _ } => {
                self.bitmap.cancel_backref();
                Ok(())
            }
            Node::Bitmap { descriptor, members } => self.visit_bitmap(descriptor, members, unpacker),
            Node::OpCancelBitmap { descriptor: _ } => {
                self.bitmap.cancel_bitmap();
                Ok(())
            }
        }
    }

    fn build_block(&mut self, members: &[Node], unpacker: &mut dyn Unpacker) -> Result<(), Error> {
        self.tree.push(new_block_node());
        for m in members {
            self.visit_node(m, unpacker)?;
        }
        self.tree.pop()
    }

    fn build_assoc_nodes(&mut self, descriptor: &Descriptor, unpacker: &mut dyn Unpacker) -> Result<(), Error> {
        if descriptor.x() == 31 || self.assoc_pairs.0.is_empty() {
            return Ok(());
        }
        for pair in &self.assoc_pairs.0 {
            let info = PackingInfo {
                unit: Unit::NonNegCode,
                scale: 0,
                refval: 0.0,
                nbits: pair.nbits,
            };
            let decorated = descriptor.decorate_assoc_field();
            let node = self.build_valued_node_with_info(decorated, info, unpacker)?;
            if let Some(sig) = &pair.node {
                node.add_member(sig.clone());
            }
        }
        Ok(())
    }

    fn visit_element(&mut self, descriptor: &Descriptor, not_present: bool, unpacker: &mut dyn Unpacker) -> Result<(), Error> {
        if not_present {
            self.tree.add(Arc::new(BufrNode::Valueless {
                descriptor: descriptor.clone(),
                members: RefCell::new(Vec::new()),
            }));
            return Ok(());
        }
        self.build_assoc_nodes(descriptor, unpacker)?;
        self.build_valued_node(descriptor, unpacker)?;
        Ok(())
    }

    fn visit_e031021(&mut self, descriptor: &Descriptor, unpacker: &mut dyn Unpacker) -> Result<(), Error> {
        let node = self.build_valued_node(descriptor, unpacker)?;
        self.assoc_pairs.set_node(node);
        Ok(())
    }

    fn visit_sequence(&mut self, descriptor: &Descriptor, members: &[Node], unpacker: &mut dyn Unpacker) -> Result<(), Error> {
        let node = Arc::new(BufrNode::Valueless {
            descriptor: descriptor.clone(),
            members: RefCell::new(Vec::new()),
        });
        self.tree.push(node);
        for m in members {
            self.visit_node(m, unpacker)?;
        }
        self.tree.pop()
    }

    fn visit_delayed_replication(&mut self, members: &[Node], unpacker: &mut dyn Unpacker) -> Result<(), Error> {
        let (factor, rest) = members
            .split_first()
            .ok_or_else(|| Error::Fatal("delayed replication has no factor element".into()))?;
        let factor_index = self.cells.len();
        self.visit_node(factor, unpacker)?;
        if !self.cells.last_cell_equality() {
            return Err(Error::InconsistentCompression {
                which: "delayed replication factor".to_string(),
            });
        }
        let count = self
            .cells
            .cell(factor_index)
            .and_then(|c| c.uint_value())
            .ok_or_else(|| Error::Fatal("delayed replication factor is not numeric".into()))?;
        for _ in 0..count {
            self.build_block(rest, unpacker)?;
        }
        Ok(())
    }

    fn visit_op_new_refval(&mut self, descriptor: &Descriptor, members: &[Node], unpacker: &mut dyn Unpacker) -> Result<(), Error> {
        if members.is_empty() {
            self.new_refval_values.clear();
            return Ok(());
        }
        let nbits = descriptor.operand() as u32;
        for m in members {
            let Some(elem_descriptor) = m.descriptor() else { continue };
            let info = PackingInfo {
                unit: Unit::Code,
                scale: 0,
                refval: 0.0,
                nbits,
            };
            let elem_descriptor = elem_descriptor.clone();
            let value = self.unpack_scalar_or_agreeing(&info, unpacker)?;
            let node = Arc::new(BufrNode::Valued {
                descriptor: elem_descriptor.clone(),
                index: self.cells.len(),
                packing_info: info,
                min_value: std::cell::Cell::new(0),
                nbits_diff: std::cell::Cell::new(0),
                members: RefCell::new(Vec::new()),
            });
            self.cells.add(node.clone(), value.clone())?;
            self.tree.add(node);
            let fv = match &value {
                Value::Int(v) => *v as f64,
                Value::UInt(v) => *v as f64,
                Value::Float(v) => *v,
                _ => return Err(Error::Fatal("new reference value is not numeric".into())),
            };
            self.new_refval_values.insert(elem_descriptor.id, fv);
        }
        Ok(())
    }

    /// Unpacks one value, requiring all subsets to agree when compressed
    /// (used for control values like new reference values and
    /// delayed-replication factors, which cannot legally vary per subset).
    fn unpack_scalar_or_agreeing(&mut self, info: &PackingInfo, unpacker: &mut dyn Unpacker) -> Result<Value, Error> {
        match unpacker.unpack(info)? {
            UnpackedValue::Single(v) => Ok(v),
            UnpackedValue::Compressed(cv) => {
                if cv.nbits_diff != 0 {
                    return Err(Error::InconsistentCompression {
                        which: "control value must be identical across subsets".to_string(),
                    });
                }
                Ok(cv.values.first().cloned().unwrap_or(Value::UInt(0)))
            }
        }
    }

    fn visit_op_assoc_field(&mut self, descriptor: &Descriptor, members: &[Node], unpacker: &mut dyn Unpacker) -> Result<(), Error> {
        if descriptor.operand() == 0 {
            self.assoc_pairs.pop();
        } else {
            self.assoc_pairs.push(descriptor.operand() as u32);
            for m in members {
                self.visit_node(m, unpacker)?;
            }
        }
        Ok(())
    }

    fn visit_op_insert_string(&mut self, descriptor: &Descriptor, unpacker: &mut dyn Unpacker) -> Result<(), Error> {
        let info = PackingInfo {
            unit: Unit::String,
            scale: 0,
            refval: 0.0,
            nbits: descriptor.operand() as u32 * 8,
        };
        self.build_valued_node_with_info(descriptor.clone(), info, unpacker)?;
        Ok(())
    }

    fn visit_op_skip_local(&mut self, descriptor: &Descriptor, members: &[Node], unpacker: &mut dyn Unpacker) -> Result<(), Error> {
        let local_descriptor = members
            .first()
            .and_then(|m| m.descriptor())
            .cloned()
            .unwrap_or_else(|| descriptor.clone());
        let info = PackingInfo {
            unit: Unit::Binary,
            scale: 0,
            refval: 0.0,
            nbits: descriptor.operand() as u32,
        };
        self.build_valued_node_with_info(local_descriptor, info, unpacker)?;
        Ok(())
    }

    fn visit_op_modify_packing(&mut self, descriptor: &Descriptor) {
        let operand = descriptor.operand() as i32;
        if operand == 0 {
            self.nbits_increment = 0;
            self.scale_increment = 0;
            self.refval_factor = 0;
        } else {
            self.nbits_increment = ((10 * operand + 2) / 3) as u32;
            self.scale_increment = operand;
            self.refval_factor = operand;
        }
    }

    fn visit_bitmap(&mut self, descriptor: &Option<Descriptor>, members: &[Node], unpacker: &mut dyn Unpacker) -> Result<(), Error> {
        if let Some(d) = descriptor {
            if d.id == ID_237000 {
                self.bitmap.recall_bitmap()?;
                return Ok(());
            }
            if self.compatible {
                self.build_zero_node(d);
            }
        }
        let reusable = descriptor.as_ref().map(|d| d.id == ID_236000).unwrap_or(false);
        self.bitmap.new_bitmap(self.cells.len(), reusable);
        for m in members {
            self.visit_node(m, unpacker)?;
        }
        self.bitmap.end_bitmap(self.cells.len());
        Ok(())
    }

    fn visit_op_assessment(
        &mut self,
        descriptor: &Descriptor,
        bitmap: &Node,
        attrs: &[Node],
        members: &[Node],
        unpacker: &mut dyn Unpacker,
    ) -> Result<(), Error> {
        self.bitmap.new_assessment(self.cells.len());
        if self.compatible {
            self.build_zero_node(descriptor);
        }
        self.visit_node(bitmap, unpacker)?;

        let mut attr_nodes = Vec::with_capacity(attrs.len());
        for a in attrs {
            let start = self.cells.len();
            self.visit_node(a, unpacker)?;
            if let Some(cell) = self.cells.cell(start) {
                attr_nodes.push(cell.node.clone());
            }
        }

        self.bitmap.init_target_nodes(self.cells.as_ref())?;
        for m in members {
            let target = self.bitmap.next_target_node()?;
            let node = match m {
                Node::OpMarker { descriptor: marker } => self.build_marker_node(marker, &target, unpacker)?,
                _ => {
                    let start = self.cells.len();
                    self.visit_node(m, unpacker)?;
                    self.cells
                        .cell(start)
                        .map(|c| c.node.clone())
                        .ok_or_else(|| Error::Fatal("assessment member produced no cell".into()))?
                }
            };
            target.add_member(node.clone());
            for a in &attr_nodes {
                node.add_member(a.clone());
            }
        }
        Ok(())
    }

    fn build_marker_node(&mut self, marker_descriptor: &Descriptor, target: &Arc<BufrNode>, unpacker: &mut dyn Unpacker) -> Result<Arc<BufrNode>, Error> {
        let target_descriptor = target.descriptor().clone();
        let mut info = self.calc_packing_info(&target_descriptor)?;
        if marker_descriptor.operator_code() == OP_DIFFERENCE_STATS {
            info.refval = -((1i64 << info.nbits) as f64);
            info.nbits += 1;
        }
        self.build_valued_node_with_info(target_descriptor, info, unpacker)
    }

    /// Compatible-mode placeholder: legacy decoders insert a zero-valued node
    /// at the position of an operator descriptor so the output tree shape
    /// matches byte-for-byte. Only used when `compatible` is set.
    fn build_zero_node(&mut self, descriptor: &Descriptor) {
        self.tree.add(Arc::new(BufrNode::Valueless {
            descriptor: descriptor.clone(),
            members: RefCell::new(Vec::new()),
        }));
    }

    fn build_valued_node(&mut self, descriptor: &Descriptor, unpacker: &mut dyn Unpacker) -> Result<Arc<BufrNode>, Error> {
        let info = self.calc_packing_info(descriptor)?;
        self.build_valued_node_with_info(descriptor.clone(), info, unpacker)
    }

    fn build_valued_node_with_info(
        &mut self,
        descriptor: Descriptor,
        info: PackingInfo,
        unpacker: &mut dyn Unpacker,
    ) -> Result<Arc<BufrNode>, Error> {
        let index = self.cells.len();
        let node = Arc::new(BufrNode::Valued {
            descriptor,
            index,
            packing_info: info,
            min_value: std::cell::Cell::new(0),
            nbits_diff: std::cell::Cell::new(0),
            members: RefCell::new(Vec::new()),
        });
        let unpacked = unpacker.unpack(&info)?;
        self.cells.add(node.clone(), unpacked)?;
        self.tree.add(node.clone());
        Ok(node)
    }

    fn calc_packing_info(&self, descriptor: &Descriptor) -> Result<PackingInfo, Error> {
        let bentry = descriptor.as_bentry().ok_or(Error::TableLookup { id: descriptor.id.0 })?;
        let info = match bentry.unit {
            Unit::String => PackingInfo {
                unit: Unit::String,
                scale: 0,
                refval: 0.0,
                nbits: self.nbits_string.unwrap_or(bentry.nbits),
            },
            Unit::Numeric => {
                let scale = bentry.scale + self.scale_offset + self.scale_increment;
                let refval = match self.new_refval_values.get(&descriptor.id) {
                    Some(v) => *v,
                    None => bentry.refval as f64,
                } * 10f64.powi(self.refval_factor);
                let nbits = (bentry.nbits as i32 + self.nbits_offset + self.nbits_increment as i32).max(0) as u32;
                PackingInfo {
                    unit: Unit::Numeric,
                    scale,
                    refval,
                    nbits,
                }
            }
            other => PackingInfo {
                unit: other,
                scale: bentry.scale,
                refval: bentry.refval as f64,
                nbits: bentry.nbits,
            },
        };
        Ok(info)
    }
}

fn offset_from_operand(operand: u16) -> i32 {
    if operand == 0 {
        0
    } else {
        operand as i32 - 128
    }
}
