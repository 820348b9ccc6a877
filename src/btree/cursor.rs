//! # Cursor
//!
//! A cursor names a position in the table: `(page, cell)` plus an
//! end-of-table flag. Scans advance cell by cell within a leaf and hop to
//! the right sibling through the `next_leaf` chain; 0 terminates the chain
//! because page 0 is permanently the leftmost leaf and can never be
//! anyone's successor.

use eyre::Result;

use crate::storage::Pager;

use super::leaf::LeafNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub page: u32,
    pub cell: usize,
    pub end_of_table: bool,
}

impl Cursor {
    /// Steps to the next cell, following the sibling chain off the end of
    /// a leaf.
    pub fn advance(&mut self, pager: &mut Pager) -> Result<()> {
        let data = pager.page(self.page)?;
        let leaf = LeafNode::from_page(data)?;

        self.cell += 1;
        if self.cell >= leaf.num_cells() {
            let next = leaf.next_leaf();
            if next == 0 {
                self.end_of_table = true;
            } else {
                self.page = next;
                self.cell = 0;
            }
        }

        Ok(())
    }
}
