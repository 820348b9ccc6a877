//! # Leaf Nodes
//!
//! Leaf pages hold the actual records as an ordered array of fixed-size
//! cells. Because the row is constant-size (291 bytes), a cell is exactly
//! `key (4) | row (291)` and cell `i` lives at a computed offset; there is
//! no slot indirection.
//!
//! ## Page Layout
//!
//! ```text
//! Offset          Content
//! ------          -------
//! 0               LeafHeader (14 bytes)
//! 14 + i * 295    Cell i: key (u32 LE) | serialized row (291 bytes)
//! ```
//!
//! Thirteen cells fit; the tail past cell 12 is unused.
//!
//! ## View Types
//!
//! [`LeafNode`] borrows a page immutably, [`LeafNodeMut`] mutably. Both
//! validate the page size and node type at construction, so downstream
//! accessors can assume a well-formed leaf. Mutation is shift-based:
//! insert moves cells `[i..]` right by one slot, remove moves `[i+1..]`
//! left, exactly mirroring the array semantics of the file format.
//!
//! ## Search
//!
//! [`LeafNode::find`] binary-searches for the least index whose key is
//! `>=` the target and reports `Found` or `NotFound(insertion_point)`;
//! `NotFound(num_cells)` means the key is greater than everything present.

use eyre::{ensure, Result};
use zerocopy::{FromBytes, IntoBytes};

use crate::config::{
    LEAF_NODE_CELL_SIZE, LEAF_NODE_HEADER_SIZE, LEAF_NODE_KEY_SIZE, LEAF_NODE_MAX_CELLS,
    PAGE_SIZE,
};
use crate::row::RowImage;

use super::node::{LeafHeader, NodeType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchResult {
    Found(usize),
    NotFound(usize),
}

fn cell_offset(index: usize) -> usize {
    LEAF_NODE_HEADER_SIZE + index * LEAF_NODE_CELL_SIZE
}

fn check_leaf(data: &[u8]) -> Result<()> {
    ensure!(
        data.len() == PAGE_SIZE,
        "invalid page size: {} != {}",
        data.len(),
        PAGE_SIZE
    );
    let node_type = LeafHeader::from_bytes(data)?.common().node_type()?;
    ensure!(
        node_type == NodeType::Leaf,
        "expected leaf page, got {:?}",
        node_type
    );
    Ok(())
}

fn key_in(data: &[u8], index: usize) -> u32 {
    let offset = cell_offset(index);
    u32::from_le_bytes(data[offset..offset + LEAF_NODE_KEY_SIZE].try_into().unwrap())
}

fn find_in(data: &[u8], num_cells: usize, key: u32) -> SearchResult {
    let mut lo = 0usize;
    let mut hi = num_cells;

    while lo < hi {
        let mid = (lo + hi) / 2;
        if key_in(data, mid) < key {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }

    if lo < num_cells && key_in(data, lo) == key {
        SearchResult::Found(lo)
    } else {
        SearchResult::NotFound(lo)
    }
}

#[derive(Debug)]
pub struct LeafNode<'a> {
    data: &'a [u8],
}

impl<'a> LeafNode<'a> {
    pub fn from_page(data: &'a [u8]) -> Result<Self> {
        check_leaf(data)?;
        Ok(Self { data })
    }

    fn header(&self) -> &LeafHeader {
        // INVARIANT: size and type checked in from_page
        LeafHeader::from_bytes(self.data).unwrap()
    }

    pub fn num_cells(&self) -> usize {
        self.header().num_cells() as usize
    }

    pub fn next_leaf(&self) -> u32 {
        self.header().next_leaf()
    }

    pub fn is_root(&self) -> bool {
        self.header().common().is_root()
    }

    pub fn parent(&self) -> u32 {
        self.header().common().parent()
    }

    pub fn key_at(&self, index: usize) -> Result<u32> {
        ensure!(
            index < self.num_cells(),
            "leaf cell index {} out of bounds (num_cells={})",
            index,
            self.num_cells()
        );
        Ok(key_in(self.data, index))
    }

    pub fn row_at(&self, index: usize) -> Result<&'a RowImage> {
        ensure!(
            index < self.num_cells(),
            "leaf cell index {} out of bounds (num_cells={})",
            index,
            self.num_cells()
        );
        let offset = cell_offset(index) + LEAF_NODE_KEY_SIZE;
        RowImage::ref_from_bytes(&self.data[offset..offset + size_of::<RowImage>()])
            .map_err(|e| eyre::eyre!("failed to read row at cell {}: {:?}", index, e))
    }

    /// Least index whose key is `>=` the target; `NotFound(num_cells)` when
    /// every existing key is smaller.
    pub fn find(&self, key: u32) -> SearchResult {
        find_in(self.data, self.num_cells(), key)
    }

    /// Largest key in the leaf. Only meaningful for non-empty leaves.
    pub fn max_key(&self) -> Result<u32> {
        ensure!(self.num_cells() > 0, "max_key on empty leaf");
        self.key_at(self.num_cells() - 1)
    }
}

pub struct LeafNodeMut<'a> {
    data: &'a mut [u8],
}

impl<'a> LeafNodeMut<'a> {
    pub fn from_page(data: &'a mut [u8]) -> Result<Self> {
        check_leaf(data)?;
        Ok(Self { data })
    }

    /// Formats a page as an empty leaf. Root flag and parent default to
    /// unset; callers adjust them afterwards.
    pub fn init(data: &'a mut [u8]) -> Result<Self> {
        ensure!(
            data.len() == PAGE_SIZE,
            "invalid page size: {} != {}",
            data.len(),
            PAGE_SIZE
        );

        let header = LeafHeader::from_bytes_mut(data)?;
        header.common_mut().set_node_type(NodeType::Leaf);
        header.common_mut().set_root(false);
        header.common_mut().set_parent(0);
        header.set_num_cells(0);
        header.set_next_leaf(0);

        Ok(Self { data })
    }

    fn header(&self) -> &LeafHeader {
        // INVARIANT: size and type checked in from_page/init
        LeafHeader::from_bytes(self.data).unwrap()
    }

    fn header_mut(&mut self) -> &mut LeafHeader {
        LeafHeader::from_bytes_mut(self.data).unwrap()
    }

    pub fn num_cells(&self) -> usize {
        self.header().num_cells() as usize
    }

    pub fn next_leaf(&self) -> u32 {
        self.header().next_leaf()
    }

    pub fn set_next_leaf(&mut self, page_no: u32) {
        self.header_mut().set_next_leaf(page_no);
    }

    pub fn is_root(&self) -> bool {
        self.header().common().is_root()
    }

    pub fn set_root(&mut self, is_root: bool) {
        self.header_mut().common_mut().set_root(is_root);
    }

    pub fn parent(&self) -> u32 {
        self.header().common().parent()
    }

    pub fn set_parent(&mut self, page_no: u32) {
        self.header_mut().common_mut().set_parent(page_no);
    }

    pub fn key_at(&self, index: usize) -> Result<u32> {
        ensure!(
            index < self.num_cells(),
            "leaf cell index {} out of bounds (num_cells={})",
            index,
            self.num_cells()
        );
        Ok(key_in(self.data, index))
    }

    pub fn row_at(&self, index: usize) -> Result<RowImage> {
        ensure!(
            index < self.num_cells(),
            "leaf cell index {} out of bounds (num_cells={})",
            index,
            self.num_cells()
        );
        let offset = cell_offset(index) + LEAF_NODE_KEY_SIZE;
        RowImage::read_from_bytes(&self.data[offset..offset + size_of::<RowImage>()])
            .map_err(|e| eyre::eyre!("failed to read row at cell {}: {:?}", index, e))
    }

    pub fn find(&self, key: u32) -> SearchResult {
        find_in(self.data, self.num_cells(), key)
    }

    pub fn max_key(&self) -> Result<u32> {
        ensure!(self.num_cells() > 0, "max_key on empty leaf");
        self.key_at(self.num_cells() - 1)
    }

    /// Inserts a cell at `index`, shifting later cells right by one slot.
    pub fn insert_cell_at(&mut self, index: usize, key: u32, row: &RowImage) -> Result<()> {
        let num_cells = self.num_cells();
        ensure!(
            num_cells < LEAF_NODE_MAX_CELLS,
            "leaf is full ({} cells)",
            num_cells
        );
        ensure!(
            index <= num_cells,
            "leaf insert index {} out of bounds (num_cells={})",
            index,
            num_cells
        );

        if index < num_cells {
            let src = cell_offset(index);
            let end = cell_offset(num_cells);
            self.data.copy_within(src..end, src + LEAF_NODE_CELL_SIZE);
        }

        self.write_cell(index, key, row);
        self.header_mut().set_num_cells(num_cells as u32 + 1);

        Ok(())
    }

    /// Removes the cell at `index`, shifting later cells left by one slot.
    pub fn remove_cell_at(&mut self, index: usize) -> Result<()> {
        let num_cells = self.num_cells();
        ensure!(
            index < num_cells,
            "leaf remove index {} out of bounds (num_cells={})",
            index,
            num_cells
        );

        if index + 1 < num_cells {
            let src = cell_offset(index + 1);
            let end = cell_offset(num_cells);
            self.data.copy_within(src..end, cell_offset(index));
        }

        self.header_mut().set_num_cells(num_cells as u32 - 1);

        Ok(())
    }

    /// Overwrites the row of an existing cell without touching its key.
    pub fn overwrite_row_at(&mut self, index: usize, row: &RowImage) -> Result<()> {
        ensure!(
            index < self.num_cells(),
            "leaf cell index {} out of bounds (num_cells={})",
            index,
            self.num_cells()
        );
        let offset = cell_offset(index) + LEAF_NODE_KEY_SIZE;
        self.data[offset..offset + size_of::<RowImage>()].copy_from_slice(row.as_bytes());
        Ok(())
    }

    /// Appends a cell; the caller guarantees key order.
    pub fn push_cell(&mut self, key: u32, row: &RowImage) -> Result<()> {
        let num_cells = self.num_cells();
        self.insert_cell_at(num_cells, key, row)
    }

    fn write_cell(&mut self, index: usize, key: u32, row: &RowImage) {
        let offset = cell_offset(index);
        self.data[offset..offset + LEAF_NODE_KEY_SIZE].copy_from_slice(&key.to_le_bytes());
        let row_offset = offset + LEAF_NODE_KEY_SIZE;
        self.data[row_offset..row_offset + size_of::<RowImage>()]
            .copy_from_slice(row.as_bytes());
    }

    /// Truncates the cell array; used after moving cells to a sibling.
    pub fn set_num_cells(&mut self, count: usize) {
        self.header_mut().set_num_cells(count as u32);
    }
}
