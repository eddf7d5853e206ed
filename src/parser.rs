//! Template parser (C4): turns an unexpanded list of descriptor IDs into the
//! [`crate::ast::Node`] tree the deserializer walks per subset.

use crate::ast::Node;
use crate::lint;
use crate::tables::{
    DescriptorId, Entry, TableGroup, F_ELEMENT, F_OPERATOR, F_REPLICATION, F_SEQUENCE, ID_031031,
    ID_223255, ID_224255, ID_225255, ID_232255, ID_236000, ID_237000, OP_ASSOCIATE_FIELD,
    OP_CANCEL_BACK_REFERENCE, OP_DATA_NOT_PRESENT, OP_DIFFERENCE_STATS, OP_FIRST_ORDER_STATS,
    OP_INSERT_STRING, OP_MODIFY_PACKING, OP_NBITS_OFFSET, OP_NEW_REFVAL, OP_QUALITY_INFO,
    OP_REPLACEMENT, OP_SCALE_OFFSET, OP_SET_STRING_LENGTH, OP_SKIP_LOCAL, OP_SUBSTITUTION,
};
use crate::{tables::ID_031021, tables::ID_203255, Error};

/// An undigested descriptor list plus the bit-widths used to (re-)encode the
/// `(F, X, Y)` triples this template was assembled from.
#[derive(Clone, Debug)]
pub struct UnexpandedTemplate {
    pub ids: Vec<DescriptorId>,
    pub fbits: u32,
    pub xbits: u32,
    pub ybits: u32,
}

/// Consumes descriptor IDs left-to-right, backtrackable by one step.
pub struct IdsKeeper {
    ids: Vec<DescriptorId>,
    index: usize,
}

impl IdsKeeper {
    pub fn new(ids: Vec<DescriptorId>) -> Self {
        Self { ids, index: 0 }
    }

    pub fn eof(&self) -> bool {
        self.index >= self.ids.len()
    }

    pub fn take(&mut self) -> Option<DescriptorId> {
        let id = self.peek()?;
        self.index += 1;
        Some(id)
    }

    pub fn back(&mut self) {
        if self.index > 0 {
            self.index -= 1;
        }
    }

    pub fn peek(&self) -> Option<DescriptorId> {
        self.ids.get(self.index).copied()
    }

    pub fn take_n(&mut self, n: usize) -> Result<Vec<DescriptorId>, Error> {
        if self.index + n > self.ids.len() {
            return Err(Error::parse(
                "not enough descriptors remaining for fixed take",
                self.index,
            ));
        }
        let out = self.ids[self.index..self.index + n].to_vec();
        self.index += n;
        Ok(out)
    }

    /// Collects consecutive ids matching `pred`, stopping (without consuming)
    /// at the first id that does not match.
    pub fn take_while(&mut self, pred: impl Fn(DescriptorId) -> bool) -> Vec<DescriptorId> {
        let mut out = Vec::new();
        while let Some(id) = self.peek() {
            if !pred(id) {
                break;
            }
            out.push(id);
            self.index += 1;
        }
        out
    }

    /// Collects ids up to (but not including/consuming) the first id matching
    /// `pred`. Errors if the stream runs out before the terminator is found.
    pub fn take_till(&mut self, pred: impl Fn(DescriptorId) -> bool) -> Result<Vec<DescriptorId>, Error> {
        let mut out = Vec::new();
        loop {
            match self.peek() {
                None => {
                    return Err(Error::parse(
                        "ran out of descriptors while seeking a terminator",
                        self.index,
                    ))
                }
                Some(id) if pred(id) => return Ok(out),
                Some(id) => {
                    out.push(id);
                    self.index += 1;
                }
            }
        }
    }
}

/// `X()` classes exempt from an enclosing operator-221 (data-not-present)
/// span: identification (01-09) and the delayed-replication factor (31).
fn is_exempt_from_data_not_present(x: u8) -> bool {
    (1..=9).contains(&x) || x == 31
}

pub struct Parser<'a> {
    table_group: &'a dyn TableGroup,
    in_data_not_present: bool,
    in_skip_local: bool,
}

pub fn parse(table_group: &dyn TableGroup, template: &UnexpandedTemplate) -> Result<Node, Error> {
    let mut parser = Parser {
        table_group,
        in_data_not_present: false,
        in_skip_local: false,
    };
    let mut keeper = IdsKeeper::new(template.ids.clone());
    let members = parser.populate_members(&mut keeper)?;
    let root = Node::Root { members };
    lint::lint(&root)?;
    Ok(root)
}

impl<'a> Parser<'a> {
    fn op_descriptor(&self, id: DescriptorId) -> crate::tables::Descriptor {
        self.table_group.lookup(id).unwrap_or(crate::tables::Descriptor {
            id,
            entry: Entry::Name(id.to_string()),
        })
    }

    fn populate_members(&mut self, keeper: &mut IdsKeeper) -> Result<Vec<Node>, Error> {
        let mut members = Vec::new();
        while let Some(id) = keeper.take() {
            members.push(self.parse_next(id, keeper)?);
        }
        Ok(members)
    }

    fn parse_next(&mut self, id: DescriptorId, keeper: &mut IdsKeeper) -> Result<Node, Error> {
        match id.f() {
            F_ELEMENT => self.parse_element_node(id),
            F_REPLICATION => {
                if id.y() == 0 {
                    self.parse_delayed_replication_node(id, keeper)
                } else {
                    self.parse_fixed_replication_node(id, keeper)
                }
            }
            F_OPERATOR => self.parse_operator_node(id, keeper),
            F_SEQUENCE => self.parse_sequence_node(id),
            f => Err(Error::unsupported(format!("descriptor class F={f}"))),
        }
    }

    fn parse_element_node(&mut self, id: DescriptorId) -> Result<Node, Error> {
        if id == ID_031021 {
            return Ok(Node::E031021 {
                descriptor: self.table_group.lookup(id)?,
            });
        }
        let descriptor = if self.in_skip_local {
            crate::tables::Descriptor::local(id)
        } else {
            self.table_group.lookup(id)?
        };
        let not_present = self.in_data_not_present && !is_exempt_from_data_not_present(id.x());
        Ok(Node::Element {
            descriptor,
            not_present,
        })
    }

    fn parse_sequence_node(&mut self, id: DescriptorId) -> Result<Node, Error> {
        let descriptor = self.table_group.lookup(id)?;
        let member_ids = descriptor
            .as_dentry()
            .ok_or(Error::TableLookup { id: id.0 })?
            .members
            .clone();
        let mut sub = IdsKeeper::new(member_ids);
        let members = self.populate_members(&mut sub)?;
        Ok(Node::Sequence { descriptor, members })
    }

    fn parse_fixed_replication_node(
        &mut self,
        id: DescriptorId,
        keeper: &mut IdsKeeper,
    ) -> Result<Node, Error> {
        let n = id.x() as usize;
        let count = id.y();
        let ids = keeper.take_n(n)?;
        let mut sub = IdsKeeper::new(ids);
        let members = self.populate_members(&mut sub)?;
        let descriptor = self.table_group.lookup(id)?;
        Ok(Node::FixedReplication {
            descriptor,
            count,
            members,
        })
    }

    fn parse_delayed_replication_node(
        &mut self,
        id: DescriptorId,
        keeper: &mut IdsKeeper,
    ) -> Result<Node, Error> {
        let n = id.x() as usize;
        let ids = keeper.take_n(n + 1)?;
        let factor_id = ids[0];
        let factor_node = self.parse_element_node(factor_id)?;
        let mut sub = IdsKeeper::new(ids[1..].to_vec());
        let mut members = vec![factor_node];
        members.extend(self.populate_members(&mut sub)?);
        let descriptor = self.table_group.lookup(id)?;
        Ok(Node::DelayedReplication { descriptor, members })
    }

    fn parse_operator_node(&mut self, id: DescriptorId, keeper: &mut IdsKeeper) -> Result<Node, Error> {
        match id.operator_code() {
            OP_NBITS_OFFSET => Ok(Node::OpNbitsOffset {
                descriptor: self.op_descriptor(id),
            }),
            OP_SCALE_OFFSET => Ok(Node::OpScaleOffset {
                descriptor: self.op_descriptor(id),
            }),
            OP_NEW_REFVAL => self.assemble_op_new_refval_node(id, keeper),
            OP_ASSOCIATE_FIELD => self.assemble_op_assoc_field_node(id, keeper),
            OP_INSERT_STRING => Ok(Node::OpInsertString {
                descriptor: self.op_descriptor(id),
            }),
            OP_SKIP_LOCAL => self.assemble_op_skip_local_node(id, keeper),
            OP_MODIFY_PACKING => Ok(Node::OpModifyPacking {
                descriptor: self.op_descriptor(id),
            }),
            OP_SET_STRING_LENGTH => Ok(Node::OpSetStringLength {
                descriptor: self.op_descriptor(id),
            }),
            OP_DATA_NOT_PRESENT => self.assemble_op_data_not_present_node(id, keeper),
            OP_QUALITY_INFO => self.assemble_op_quality_info_node(id, keeper),
            OP_SUBSTITUTION => self.assemble_op_substitution_node(id, keeper),
            OP_FIRST_ORDER_STATS => self.assemble_op_first_order_stats_node(id, keeper),
            OP_DIFFERENCE_STATS => self.assemble_op_difference_stats_node(id, keeper),
            OP_REPLACEMENT => self.assemble_op_replacement_node(id, keeper),
            OP_CANCEL_BACK_REFERENCE => Ok(Node::OpCancelBackRef {
                descriptor: self.op_descriptor(id),
            }),
            other => Err(Error::unsupported(format!("operator {}{:03}", other, id.operand()))),
        }
    }

    fn assemble_op_new_refval_node(&mut self, id: DescriptorId, keeper: &mut IdsKeeper) -> Result<Node, Error> {
        let descriptor = self.op_descriptor(id);
        if id == ID_203255 {
            return Ok(Node::OpNewRefval {
                descriptor,
                members: Vec::new(),
            });
        }
        let ids = keeper.take_till(|x| x == ID_203255)?;
        keeper.take();
        let mut sub = IdsKeeper::new(ids);
        let members = self.populate_members(&mut sub)?;
        Ok(Node::OpNewRefval { descriptor, members })
    }

    fn assemble_op_assoc_field_node(&mut self, id: DescriptorId, keeper: &mut IdsKeeper) -> Result<Node, Error> {
        let descriptor = self.op_descriptor(id);
        let members = if id.operand() != 0 {
            let ids = keeper.take_n(1)?;
            let mut sub = IdsKeeper::new(ids);
            self.populate_members(&mut sub)?
        } else {
            Vec::new()
        };
        Ok(Node::OpAssocField { descriptor, members })
    }

    fn assemble_op_skip_local_node(&mut self, id: DescriptorId, keeper: &mut IdsKeeper) -> Result<Node, Error> {
        let descriptor = self.op_descriptor(id);
        let ids = keeper.take_n(1)?;
        self.in_skip_local = true;
        let result = self.populate_members(&mut IdsKeeper::new(ids));
        self.in_skip_local = false;
        Ok(Node::OpSkipLocal {
            descriptor,
            members: result?,
        })
    }

    fn assemble_op_data_not_present_node(
        &mut self,
        id: DescriptorId,
        keeper: &mut IdsKeeper,
    ) -> Result<Node, Error> {
        let descriptor = self.op_descriptor(id);
        let ids = keeper.take_n(id.operand() as usize)?;
        self.in_data_not_present = true;
        let result = self.populate_members(&mut IdsKeeper::new(ids));
        self.in_data_not_present = false;
        Ok(Node::OpDataNotPresent {
            descriptor,
            members: result?,
        })
    }

    fn assemble_op_quality_info_node(&mut self, id: DescriptorId, keeper: &mut IdsKeeper) -> Result<Node, Error> {
        let descriptor = self.op_descriptor(id);
        let bitmap = self.parse_bitmap_node(keeper)?;
        let member_ids = keeper.take_while(|x| x.f() == F_ELEMENT);
        let members = self.populate_members(&mut IdsKeeper::new(member_ids))?;
        Ok(Node::OpAssessment {
            descriptor,
            bitmap: Box::new(bitmap),
            attrs: Vec::new(),
            members,
        })
    }

    fn assemble_assessment_node(
        &mut self,
        descriptor: crate::tables::Descriptor,
        keeper: &mut IdsKeeper,
        marker_id: DescriptorId,
    ) -> Result<Node, Error> {
        let bitmap = self.parse_bitmap_node(keeper)?;
        let attr_ids = keeper.take_till(|x| x == marker_id)?;
        let attrs = self.populate_members(&mut IdsKeeper::new(attr_ids))?;
        let member_ids = keeper.take_while(|x| x == marker_id);
        let members = member_ids
            .into_iter()
            .map(|m| Node::OpMarker {
                descriptor: self.op_descriptor(m),
            })
            .collect();
        Ok(Node::OpAssessment {
            descriptor,
            bitmap: Box::new(bitmap),
            attrs,
            members,
        })
    }

    fn assemble_op_substitution_node(&mut self, id: DescriptorId, keeper: &mut IdsKeeper) -> Result<Node, Error> {
        if id.operand() == 255 {
            return Ok(Node::OpMarker {
                descriptor: self.op_descriptor(id),
            });
        }
        let descriptor = self.op_descriptor(id);
        self.assemble_assessment_node(descriptor, keeper, ID_223255)
    }

    fn assemble_op_first_order_stats_node(
        &mut self,
        id: DescriptorId,
        keeper: &mut IdsKeeper,
    ) -> Result<Node, Error> {
        if id.operand() == 255 {
            return Ok(Node::OpMarker {
                descriptor: self.op_descriptor(id),
            });
        }
        let descriptor = self.op_descriptor(id);
        self.assemble_assessment_node(descriptor, keeper, ID_224255)
    }

    fn assemble_op_difference_stats_node(
        &mut self,
        id: DescriptorId,
        keeper: &mut IdsKeeper,
    ) -> Result<Node, Error> {
        if id.operand() == 255 {
            return Ok(Node::OpMarker {
                descriptor: self.op_descriptor(id),
            });
        }
        let descriptor = self.op_descriptor(id);
        self.assemble_assessment_node(descriptor, keeper, ID_225255)
    }

    fn assemble_op_replacement_node(&mut self, id: DescriptorId, keeper: &mut IdsKeeper) -> Result<Node, Error> {
        if id.operand() == 255 {
            return Ok(Node::OpMarker {
                descriptor: self.op_descriptor(id),
            });
        }
        let descriptor = self.op_descriptor(id);
        self.assemble_assessment_node(descriptor, keeper, ID_232255)
    }

    fn parse_bitmap_node(&mut self, keeper: &mut IdsKeeper) -> Result<Node, Error> {
        let id = keeper
            .peek()
            .ok_or_else(|| Error::parse("expected a bitmap definition, found end of template", 0))?;

        if id == ID_237000 {
            keeper.take();
            return Ok(Node::Bitmap {
                descriptor: Some(self.op_descriptor(id)),
                members: Vec::new(),
            });
        }

        if id == ID_236000 {
            keeper.take();
            let member_ids = keeper.take_while(|x| x == ID_031031);
            let members = self.populate_members(&mut IdsKeeper::new(member_ids))?;
            return Ok(Node::Bitmap {
                descriptor: Some(self.op_descriptor(id)),
                members,
            });
        }

        if id == ID_031031 || id.f() == F_REPLICATION {
            let member_ids = keeper.take_while(|x| x == ID_031031 || x.f() == F_REPLICATION);
            let members = self.populate_members(&mut IdsKeeper::new(member_ids))?;
            return Ok(Node::Bitmap {
                descriptor: None,
                members,
            });
        }

        Err(Error::parse(
            format!("expected a bitmap definition, found descriptor {id}"),
            0,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_present_exempts_identification_and_delayed_replication_factor() {
        assert!(!is_exempt_from_data_not_present(12));
        for x in 1..=9 {
            assert!(is_exempt_from_data_not_present(x));
        }
        assert!(is_exempt_from_data_not_present(31));
        assert!(!is_exempt_from_data_not_present(33));
    }

    #[test]
    fn ids_keeper_take_till_leaves_terminator_unconsumed() {
        let mut keeper = IdsKeeper::new(vec![DescriptorId(1), DescriptorId(2), ID_203255, DescriptorId(3)]);
        let collected = keeper.take_till(|x| x == ID_203255).unwrap();
        assert_eq!(collected, vec![DescriptorId(1), DescriptorId(2)]);
        assert_eq!(keeper.peek(), Some(ID_203255));
    }
}
