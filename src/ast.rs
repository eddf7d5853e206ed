//! Parsed template tree (C3): one node per descriptor the parser consumed,
//! tagged by what role it plays during deserialization.

use crate::tables::Descriptor;

#[derive(Debug)]
pub enum Node {
    Root {
        members: Vec<Node>,
    },
    Element {
        descriptor: Descriptor,
        not_present: bool,
    },
    /// 031021, the associated-field significance element — visited specially
    /// so it can feed the pending associated-field pair.
    E031021 {
        descriptor: Descriptor,
    },
    Sequence {
        descriptor: Descriptor,
        members: Vec<Node>,
    },
    FixedReplication {
        descriptor: Descriptor,
        count: u16,
        members: Vec<Node>,
    },
    DelayedReplication {
        descriptor: Descriptor,
        /// First member is the delayed-count element (e.g. 031001/031002).
        members: Vec<Node>,
    },
    OpNbitsOffset {
        descriptor: Descriptor,
    },
    OpScaleOffset {
        descriptor: Descriptor,
    },
    OpNewRefval {
        descriptor: Descriptor,
        members: Vec<Node>,
    },
    OpAssocField {
        descriptor: Descriptor,
        members: Vec<Node>,
    },
    OpInsertString {
        descriptor: Descriptor,
    },
    OpSkipLocal {
        descriptor: Descriptor,
        members: Vec<Node>,
    },
    OpModifyPacking {
        descriptor: Descriptor,
    },
    OpSetStringLength {
        descriptor: Descriptor,
    },
    OpDataNotPresent {
        descriptor: Descriptor,
        members: Vec<Node>,
    },
    /// 222/223/224/225/232YYY: a bitmap, a sandwich of attribute descriptors,
    /// and the target/marker members that carry the result.
    OpAssessment {
        descriptor: Descriptor,
        bitmap: Box<Node>,
        attrs: Vec<Node>,
        members: Vec<Node>,
    },
    /// The *255 descriptor that closes a 222/223/224/225/232 assessment.
    OpMarker {
        descriptor: Descriptor,
    },
    OpCancelBackRef {
        descriptor: Descriptor,
    },
    Bitmap {
        descriptor: Option<Descriptor>,
        members: Vec<Node>,
    },
    OpCancelBitmap {
        descriptor: Descriptor,
    },
}

impl Node {
    pub fn descriptor(&self) -> Option<&Descriptor> {
        match self {
            Node::Root { .. } => None,
            Node::Element { descriptor, .. }
            | Node::E031021 { descriptor }
            | Node::Sequence { descriptor, .. }
            | Node::FixedReplication { descriptor, .. }
            | Node::DelayedReplication { descriptor, .. }
            | Node::OpNbitsOffset { descriptor }
            | Node::OpScaleOffset { descriptor }
            | Node::OpNewRefval { descriptor, .. }
            | Node::OpAssocField { descriptor, .. }
            | Node::OpInsertString { descriptor }
            | Node::OpSkipLocal { descriptor, .. }
            | Node::OpModifyPacking { descriptor }
            | Node::OpSetStringLength { descriptor }
            | Node::OpDataNotPresent { descriptor, .. }
            | Node::OpAssessment { descriptor, .. }
            | Node::OpMarker { descriptor }
            | Node::OpCancelBackRef { descriptor }
            | Node::OpCancelBitmap { descriptor } => Some(descriptor),
            Node::Bitmap { descriptor, .. } => descriptor.as_ref(),
        }
    }

    pub fn members(&self) -> &[Node] {
        match self {
            Node::Root { members }
            | Node::Sequence { members, .. }
            | Node::FixedReplication { members, .. }
            | Node::DelayedReplication { members, .. }
            | Node::OpNewRefval { members, .. }
            | Node::OpAssocField { members, .. }
            | Node::OpSkipLocal { members, .. }
            | Node::OpDataNotPresent { members, .. }
            | Node::OpAssessment { members, .. }
            | Node::Bitmap { members, .. } => members,
            _ => &[],
        }
    }
}
