//! Template AST validation (C4 continued), grounded on the original's
//! `ast/lint.go`: a post-parse walk that catches malformed templates the
//! parser itself doesn't reject inline (a fixed replication whose declared
//! count doesn't match its member count, an associated-field operator not
//! immediately followed by its 031021 significance element).

use crate::ast::Node;
use crate::tables::{F_ELEMENT, ID_031021};
use crate::Error;

/// Walks `node` and everything beneath it, checking invariants the parser
/// itself doesn't enforce inline.
pub fn lint(node: &Node) -> Result<(), Error> {
    check_node(node)?;
    for member in node.members() {
        lint(member)?;
    }
    Ok(())
}

fn check_node(node: &Node) -> Result<(), Error> {
    match node {
        Node::Element { descriptor, .. } => {
            if descriptor.f() != F_ELEMENT {
                return Err(Error::lint(format!("not an element descriptor: {descriptor}")));
            }
            Ok(())
        }
        Node::FixedReplication { descriptor, count, members } => {
            if *count as usize != members.len() {
                return Err(Error::lint(format!(
                    "incorrect number of replicated members for {descriptor}: expected {count}, got {}",
                    members.len()
                )));
            }
            Ok(())
        }
        Node::OpNewRefval { members, .. } => {
            for m in members {
                if let Some(d) = m.descriptor() {
                    if d.f() != F_ELEMENT {
                        return Err(Error::lint(format!(
                            "non-element descriptor appears in a new refval definition session: {d}"
                        )));
                    }
                }
            }
            Ok(())
        }
        Node::OpAssocField { descriptor, members } => {
            if descriptor.operand() == 0 {
                return Ok(());
            }
            if members.len() != 1 {
                return Err(Error::lint(
                    "incorrect number of associated field significance descriptors".to_string(),
                ));
            }
            match members[0].descriptor() {
                Some(d) if d.id == ID_031021 => Ok(()),
                Some(d) => Err(Error::lint(format!(
                    "invalid associated field significance: expected 031021, got {}",
                    d.id
                ))),
                None => Err(Error::lint(
                    "invalid associated field significance: missing descriptor".to_string(),
                )),
            }
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::Descriptor;

    fn element(id: u32) -> Node {
        Node::Element {
            descriptor: Descriptor {
                id: crate::tables::DescriptorId(id),
                entry: crate::tables::Entry::Name(id.to_string()),
            },
            not_present: false,
        }
    }

    fn replication_descriptor(count: u16) -> Descriptor {
        Descriptor {
            id: crate::tables::DescriptorId(100_000 + count as u32),
            entry: crate::tables::Entry::Name("replication".to_string()),
        }
    }

    #[test]
    fn fixed_replication_count_must_match_member_count() {
        let node = Node::FixedReplication {
            descriptor: replication_descriptor(2),
            count: 2,
            members: vec![element(1001), element(1002)],
        };
        assert!(lint(&node).is_ok());

        let mismatched = Node::FixedReplication {
            descriptor: replication_descriptor(2),
            count: 2,
            members: vec![element(1001)],
        };
        assert!(lint(&mismatched).is_err());
    }

    #[test]
    fn assoc_field_with_operand_requires_one_031021_member() {
        let assoc_descriptor = Descriptor {
            id: crate::tables::DescriptorId(204001),
            entry: crate::tables::Entry::Name("204001".to_string()),
        };

        let missing = Node::OpAssocField {
            descriptor: assoc_descriptor.clone(),
            members: Vec::new(),
        };
        assert!(lint(&missing).is_err());

        let wrong_descriptor = Node::OpAssocField {
            descriptor: assoc_descriptor.clone(),
            members: vec![element(1)],
        };
        assert!(lint(&wrong_descriptor).is_err());

        let correct = Node::OpAssocField {
            descriptor: assoc_descriptor,
            members: vec![Node::E031021 {
                descriptor: Descriptor {
                    id: ID_031021,
                    entry: crate::tables::Entry::Name("031021".to_string()),
                },
            }],
        };
        assert!(lint(&correct).is_ok());
    }
}
