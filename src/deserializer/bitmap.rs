//! Bitmap/back-reference bookkeeping (C6) for the 222/223/224/225/232YYY
//! quality-assessment operators: which earlier elements a bitmap's bits
//! describe, and which of them still need a value attached.

use std::sync::Arc;

use super::cells::CellsBuilder;
use crate::model::BufrNode;
use crate::Error;

#[derive(Clone, Copy)]
struct BitmapRange {
    index0: usize,
    index1: usize,
}

#[derive(Default)]
pub(super) struct BitmapManager {
    /// Cell index of the element immediately preceding the first bitmap
    /// definition in the current assessment span (`None` is Go's `refNotSet`).
    backref1: Option<usize>,
    target_nodes: Vec<Arc<BufrNode>>,
    reusable_bitmap: Option<BitmapRange>,
    current_bitmap: Option<BitmapRange>,
    pending_reusable: bool,
}

impl BitmapManager {
    /// Marks the back-reference point, unless one is already pinned for this
    /// span (a bitmap recalled mid-span keeps referring to the original).
    pub(super) fn new_assessment(&mut self, cells_len: usize) {
        if self.backref1.is_none() {
            self.backref1 = Some(cells_len.saturating_sub(1));
        }
    }

    pub(super) fn new_bitmap(&mut self, start: usize, reusable: bool) {
        self.current_bitmap = Some(BitmapRange {
            index0: start,
            index1: start,
        });
        self.pending_reusable = reusable;
    }

    pub(super) fn end_bitmap(&mut self, end: usize) {
        if let Some(range) = &mut self.current_bitmap {
            range.index1 = end;
            if self.pending_reusable {
                self.reusable_bitmap = Some(*range);
            }
        }
    }

    pub(super) fn recall_bitmap(&mut self) -> Result<(), Error> {
        self.current_bitmap = Some(
            self.reusable_bitmap
                .ok_or_else(|| Error::Fatal("no reusable bitmap to recall".into()))?,
        );
        Ok(())
    }

    pub(super) fn cancel_bitmap(&mut self) {
        self.current_bitmap = None;
        self.reusable_bitmap = None;
    }

    pub(super) fn cancel_backref(&mut self) {
        self.backref1 = None;
        self.cancel_bitmap();
    }

    fn bits(&self, cells: &dyn CellsBuilder) -> Result<Vec<u64>, Error> {
        let range = self
            .current_bitmap
            .ok_or_else(|| Error::Fatal("no bitmap defined for this assessment".into()))?;
        (range.index0..range.index1)
            .map(|i| {
                cells
                    .cell(i)
                    .and_then(|c| c.uint_value())
                    .ok_or_else(|| Error::Fatal("bitmap cell is not numeric".into()))
            })
            .collect()
    }

    /// Walks backward from the back-reference point, prepending each node so
    /// `candidates` ends up in chronological (ascending index) order like the
    /// bits themselves, then keeps only the ones whose bit is 0
    /// (present/selected).
    pub(super) fn init_target_nodes(&mut self, cells: &dyn CellsBuilder) -> Result<(), Error> {
        let bits = self.bits(cells)?;
        let backref1 = self
            .backref1
            .ok_or_else(|| Error::Fatal("no back-reference established before bitmap use".into()))?;

        let mut candidates: Vec<Arc<BufrNode>> = Vec::with_capacity(bits.len());
        let mut i = backref1;
        loop {
            let cell = cells
                .cell(i)
                .ok_or_else(|| Error::Fatal("back-reference walked past the start of the subset".into()))?;
            candidates.insert(0, cell.node.clone());
            if candidates.len() == bits.len() {
                break;
            }
            if i == 0 {
                return Err(Error::BitmapBitsMismatch {
                    bits: bits.len(),
                    candidates: candidates.len(),
                });
            }
            i -= 1;
        }

        self.target_nodes = candidates
            .into_iter()
            .zip(bits)
            .filter(|(_, bit)| *bit == 0)
            .map(|(node, _)| node)
            .collect();
        Ok(())
    }

    pub(super) fn next_target_node(&mut self) -> Result<Arc<BufrNode>, Error> {
        if self.target_nodes.is_empty() {
            return Err(Error::Fatal("no more target nodes available from the active bitmap".into()));
        }
        Ok(self.target_nodes.remove(0))
    }
}
