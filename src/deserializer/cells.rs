//! Per-pass value storage (C6): uncompressed payloads collect one flat list
//! of cells per subset pass; compressed payloads fan each node's unpacked
//! values out across all subsets in a single pass ("tissues").

use std::sync::Arc;

use crate::model::{BufrNode, Cell, Payload};
use crate::unpack::UnpackedValue;
use crate::Error;

pub(super) trait CellsBuilder {
    fn add(&mut self, node: Arc<BufrNode>, value: UnpackedValue) -> Result<(), Error>;
    fn len(&self) -> usize;
    fn cell(&self, index: usize) -> Option<&Cell>;
    /// True if the most recently added cell's value is the same across every
    /// subset (always true for uncompressed payloads).
    fn last_cell_equality(&self) -> bool;
    fn produce(&mut self, payload: &mut Payload, root: Arc<BufrNode>) -> Result<(), Error>;
}

#[derive(Default)]
pub(super) struct UncompressCellsBuilder {
    cells: Vec<Cell>,
}

impl CellsBuilder for UncompressCellsBuilder {
    fn add(&mut self, node: Arc<BufrNode>, value: UnpackedValue) -> Result<(), Error> {
        match value {
            UnpackedValue::Single(v) => {
                self.cells.push(Cell::new(node, v));
                Ok(())
            }
            UnpackedValue::Compressed(_) => Err(Error::Fatal(
                "uncompressed cells builder received a compressed value".into(),
            )),
        }
    }

    fn len(&self) -> usize {
        self.cells.len()
    }

    fn cell(&self, index: usize) -> Option<&Cell> {
        self.cells.get(index)
    }

    fn last_cell_equality(&self) -> bool {
        true
    }

    fn produce(&mut self, payload: &mut Payload, root: Arc<BufrNode>) -> Result<(), Error> {
        payload.add_subset(root, std::mem::take(&mut self.cells));
        Ok(())
    }
}

pub(super) struct CompressedCellsBuilder {
    tissues: Vec<Vec<Cell>>,
    /// Subset whose tissue `cell()`/`len()` currently reads from.
    current: usize,
}

impl CompressedCellsBuilder {
    pub(super) fn new(nsubsets: usize) -> Self {
        Self {
            tissues: vec![Vec::new(); nsubsets.max(1)],
            current: 0,
        }
    }
}

impl CellsBuilder for CompressedCellsBuilder {
    fn add(&mut self, node: Arc<BufrNode>, value: UnpackedValue) -> Result<(), Error> {
        let UnpackedValue::Compressed(cv) = value else {
            return Err(Error::Fatal("compressed cells builder received a scalar value".into()));
        };
        if let BufrNode::Valued {
            min_value, nbits_diff, ..
        } = node.as_ref()
        {
            min_value.set(cv.min_value);
            nbits_diff.set(cv.nbits_diff);
        }
        if cv.values.len() != self.tissues.len() {
            return Err(Error::Fatal(format!(
                "expected {} subset values, got {}",
                self.tissues.len(),
                cv.values.len()
            )));
        }
        for (tissue, value) in self.tissues.iter_mut().zip(cv.values.into_iter()) {
            tissue.push(Cell::new(node.clone(), value));
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.tissues[0].len()
    }

    fn cell(&self, index: usize) -> Option<&Cell> {
        self.tissues[self.current].get(index)
    }

    fn last_cell_equality(&self) -> bool {
        let Some(last) = self.tissues[0].len().checked_sub(1) else {
            return true;
        };
        let first = &self.tissues[0][last].value;
        self.tissues.iter().all(|t| values_equal(&t[last].value, first))
    }

    fn produce(&mut self, payload: &mut Payload, root: Arc<BufrNode>) -> Result<(), Error> {
        for tissue in std::mem::take(&mut self.tissues) {
            payload.add_subset(root.clone(), tissue);
        }
        Ok(())
    }
}

fn values_equal(a: &crate::model::Value, b: &crate::model::Value) -> bool {
    use crate::model::Value::*;
    match (a, b) {
        (Int(x), Int(y)) => x == y,
        (UInt(x), UInt(y)) => x == y,
        (Float(x), Float(y)) => x == y,
        (Bool(x), Bool(y)) => x == y,
        (String(x), String(y)) => x == y,
        (Bytes(x), Bytes(y)) => x == y,
        (Binary(x), Binary(y)) => x == y,
        _ => false,
    }
}
