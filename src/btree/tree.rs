//! # B+Tree Operations
//!
//! This module implements the tree algorithms over the pager: root-to-leaf
//! search, insertion with leaf and internal splits, deletion with
//! borrow/merge rebalancing, and root promotion/collapse.
//!
//! ## Borrow Discipline
//!
//! The pager hands out one page buffer at a time (`&mut Pager`), and a
//! cache miss may evict any unpinned page. Every operation here therefore
//! follows the same shape: fetch a page, copy out what later steps need,
//! release the borrow, fetch the next page. Splits and merges materialize
//! cells into scratch vectors rather than holding two pages at once.
//!
//! ## Separator Maintenance
//!
//! Separators store the *maximum key of the child subtree*, and the
//! validator checks that equality, so every structural change re-derives
//! the affected separators from the children rather than patching them
//! incrementally:
//!
//! - deleting a leaf's greatest key walks up the right spine until the
//!   subtree is a cell child and rewrites that one separator;
//! - borrows rewrite the separator of the node and, for a left borrow,
//!   the donor;
//! - merges re-derive every separator at or after the removed cell.
//!
//! The upward walk terminates at the first non-right-child position
//! because an inner separator change never alters its own node's maximum.
//!
//! ## Split Geometry
//!
//! A leaf split moves cells `[7..13)` to the new right sibling and then
//! places the incoming cell on the side its key belongs to, yielding a 7/7
//! split. An internal split materializes every `(child, key)` pair, giving
//! the right child its computed subtree maximum, inserts the new pair, and
//! cuts at `(num_keys + 1) / 2`; the pair at the cut becomes
//! the left node's right child and its key becomes the left node's
//! separator in the parent.

use eyre::{bail, ensure, Result};
use smallvec::SmallVec;

use crate::config::{
    INTERNAL_NODE_MAX_KEYS, INTERNAL_NODE_MIN_KEYS, LEAF_NODE_MAX_CELLS, LEAF_NODE_MIN_CELLS,
    LEAF_NODE_SPLIT_AT,
};
use crate::row::{Row, RowImage};
use crate::storage::Pager;

use super::cursor::Cursor;
use super::interior::{InternalNode, InternalNodeMut};
use super::leaf::{LeafNode, LeafNodeMut, SearchResult};
use super::node::{self, NodeHeader, NodeType};

/// Result of an insert attempt; duplicates are an outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    DuplicateKey,
}

pub struct BTree<'p> {
    pager: &'p mut Pager,
}

impl<'p> BTree<'p> {
    pub fn new(pager: &'p mut Pager) -> Self {
        Self { pager }
    }

    /// Formats `page_no` as an empty root leaf; used once, on database
    /// creation.
    pub fn init_root(pager: &mut Pager, page_no: u32) -> Result<()> {
        let data = pager.page_mut(page_no)?;
        let mut leaf = LeafNodeMut::init(data)?;
        leaf.set_root(true);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------

    /// Descends from the root to the leaf that owns `key`. The cursor
    /// points at the key if present, otherwise at its insertion point.
    pub fn find(&mut self, key: u32) -> Result<Cursor> {
        let mut current = self.pager.root_page();
        // Depth is bounded by the branching factor; the fuse catches
        // parent-pointer corruption before it becomes an infinite loop.
        let mut fuse = 64;

        loop {
            ensure!(fuse > 0, "tree descent exceeded maximum depth");
            fuse -= 1;

            let data = self.pager.page(current)?;
            match node::node_type(data)? {
                NodeType::Internal => {
                    let internal = InternalNode::from_page(data)?;
                    let index = internal.route(key);
                    current = internal
                        .child_at(index)
                        .ok_or_else(|| eyre::eyre!("no child at index {} in page {}", index, current))?;
                }
                NodeType::Leaf => {
                    let leaf = LeafNode::from_page(data)?;
                    let cell = match leaf.find(key) {
                        SearchResult::Found(cell) | SearchResult::NotFound(cell) => cell,
                    };
                    return Ok(Cursor {
                        page: current,
                        cell,
                        end_of_table: false,
                    });
                }
            }
        }
    }

    /// Cursor at the first cell of the table; `end_of_table` is set when
    /// the table is empty.
    pub fn start(&mut self) -> Result<Cursor> {
        let mut cursor = self.find(0)?;
        let data = self.pager.page(cursor.page)?;
        let leaf = LeafNode::from_page(data)?;
        cursor.end_of_table = leaf.num_cells() == 0;
        Ok(cursor)
    }

    /// Point lookup.
    pub fn get(&mut self, key: u32) -> Result<Option<Row>> {
        let cursor = self.find(key)?;
        let data = self.pager.page(cursor.page)?;
        let leaf = LeafNode::from_page(data)?;

        if cursor.cell < leaf.num_cells() && leaf.key_at(cursor.cell)? == key {
            Ok(Some(leaf.row_at(cursor.cell)?.to_row()))
        } else {
            Ok(None)
        }
    }

    /// All rows in ascending key order.
    pub fn scan_all(&mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        let mut cursor = self.start()?;

        while !cursor.end_of_table {
            let data = self.pager.page(cursor.page)?;
            let leaf = LeafNode::from_page(data)?;
            rows.push(leaf.row_at(cursor.cell)?.to_row());
            cursor.advance(self.pager)?;
        }

        Ok(rows)
    }

    /// Rows with `lo <= key <= hi` in ascending key order.
    pub fn scan_range(&mut self, lo: u32, hi: u32) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        if lo > hi {
            return Ok(rows);
        }

        let mut cursor = self.find(lo)?;
        {
            let data = self.pager.page(cursor.page)?;
            let leaf = LeafNode::from_page(data)?;
            // find() may land on the insertion point past the last cell.
            cursor.end_of_table = leaf.num_cells() == 0;
            if !cursor.end_of_table && cursor.cell >= leaf.num_cells() {
                cursor.cell = leaf.num_cells() - 1;
                cursor.advance(self.pager)?;
            }
        }

        while !cursor.end_of_table {
            let data = self.pager.page(cursor.page)?;
            let leaf = LeafNode::from_page(data)?;
            let key = leaf.key_at(cursor.cell)?;
            if key > hi {
                break;
            }
            rows.push(leaf.row_at(cursor.cell)?.to_row());
            cursor.advance(self.pager)?;
        }

        Ok(rows)
    }

    /// Maximum key of the subtree rooted at `page_no`: right-spine descent
    /// to the last cell of the rightmost leaf.
    fn max_key(&mut self, mut page_no: u32) -> Result<u32> {
        let mut fuse = 64;
        loop {
            ensure!(fuse > 0, "right-spine descent exceeded maximum depth");
            fuse -= 1;

            let data = self.pager.page(page_no)?;
            match node::node_type(data)? {
                NodeType::Leaf => return LeafNode::from_page(data)?.max_key(),
                NodeType::Internal => {
                    page_no = InternalNode::from_page(data)?.right_child();
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Insertion
    // ------------------------------------------------------------------

    pub fn insert(&mut self, key: u32, row: &RowImage) -> Result<InsertOutcome> {
        let cursor = self.find(key)?;

        let fits = {
            let data = self.pager.page(cursor.page)?;
            let leaf = LeafNode::from_page(data)?;
            if cursor.cell < leaf.num_cells() && leaf.key_at(cursor.cell)? == key {
                return Ok(InsertOutcome::DuplicateKey);
            }
            leaf.num_cells() < LEAF_NODE_MAX_CELLS
        };

        if fits {
            let was_last = {
                let data = self.pager.page_mut(cursor.page)?;
                let mut leaf = LeafNodeMut::from_page(data)?;
                leaf.insert_cell_at(cursor.cell, key, row)?;
                cursor.cell + 1 == leaf.num_cells() && !leaf.is_root()
            };
            // A new greatest key changes the subtree maximum seen by
            // ancestors.
            if was_last {
                self.refresh_max_upward(cursor.page)?;
            }
        } else {
            self.split_leaf_and_insert(cursor.page, key, row)?;
        }

        Ok(InsertOutcome::Inserted)
    }

    /// Overwrites the row stored under `key`; false when the key is absent.
    pub fn update(&mut self, key: u32, row: &RowImage) -> Result<bool> {
        let cursor = self.find(key)?;

        let data = self.pager.page(cursor.page)?;
        let leaf = LeafNode::from_page(data)?;
        if !(cursor.cell < leaf.num_cells() && leaf.key_at(cursor.cell)? == key) {
            return Ok(false);
        }

        let data = self.pager.page_mut(cursor.page)?;
        let mut leaf = LeafNodeMut::from_page(data)?;
        leaf.overwrite_row_at(cursor.cell, row)?;

        Ok(true)
    }

    fn split_leaf_and_insert(&mut self, page_no: u32, key: u32, row: &RowImage) -> Result<()> {
        let new_page = self.pager.allocate_page()?;

        // Copy out the upper half and the chain/flag state before any
        // mutation; the fetches below may evict this page.
        let (was_root, parent, old_next, upper) = {
            let data = self.pager.page(page_no)?;
            let leaf = LeafNode::from_page(data)?;
            let mut upper: Vec<(u32, RowImage)> =
                Vec::with_capacity(leaf.num_cells() - LEAF_NODE_SPLIT_AT);
            for index in LEAF_NODE_SPLIT_AT..leaf.num_cells() {
                upper.push((leaf.key_at(index)?, *leaf.row_at(index)?));
            }
            (leaf.is_root(), leaf.parent(), leaf.next_leaf(), upper)
        };

        {
            let data = self.pager.page_mut(new_page)?;
            let mut new_leaf = LeafNodeMut::init(data)?;
            for (cell_key, cell_row) in &upper {
                new_leaf.push_cell(*cell_key, cell_row)?;
            }
            new_leaf.set_next_leaf(old_next);
            new_leaf.set_parent(parent);
        }

        // Truncate the old leaf and splice the new sibling into the chain.
        let split_key = {
            let data = self.pager.page_mut(page_no)?;
            let mut leaf = LeafNodeMut::from_page(data)?;
            leaf.set_num_cells(LEAF_NODE_SPLIT_AT);
            leaf.set_next_leaf(new_page);
            leaf.max_key()?
        };

        // The incoming cell lands on whichever half owns its key.
        let target = if key <= split_key { page_no } else { new_page };
        {
            let data = self.pager.page_mut(target)?;
            let mut leaf = LeafNodeMut::from_page(data)?;
            let at = match leaf.find(key) {
                SearchResult::NotFound(at) => at,
                SearchResult::Found(_) => bail!("duplicate key {} surfaced during split", key),
            };
            leaf.insert_cell_at(at, key, row)?;
        }

        if was_root {
            self.create_new_root(new_page)
        } else {
            let left_max = self.max_key(page_no)?;
            self.update_parent_separator(parent, page_no, left_max)?;
            self.insert_into_internal(parent, new_page)
        }
    }

    /// Hoists the current root's contents under a freshly allocated root
    /// page with exactly one separator.
    fn create_new_root(&mut self, right_page: u32) -> Result<()> {
        let old_root = self.pager.root_page();
        let old_root_max = self.max_key(old_root)?;
        let new_root = self.pager.allocate_page()?;

        {
            let data = self.pager.page_mut(new_root)?;
            let mut root = InternalNodeMut::init(data, right_page)?;
            root.push_cell(old_root, old_root_max)?;
            root.set_root(true);
            root.set_parent(0);
        }

        for child in [old_root, right_page] {
            let data = self.pager.page_mut(child)?;
            let header = NodeHeader::from_bytes_mut(data)?;
            header.set_root(false);
            header.set_parent(new_root);
        }

        self.pager.set_root_page(new_root);
        Ok(())
    }

    /// Adds `new_child` (and its subtree-max separator) to `parent`,
    /// splitting the parent if it is full.
    fn insert_into_internal(&mut self, parent_page: u32, new_child: u32) -> Result<()> {
        let new_key = self.max_key(new_child)?;

        let (num_keys, right_child) = {
            let data = self.pager.page(parent_page)?;
            let internal = InternalNode::from_page(data)?;
            (internal.num_keys(), internal.right_child())
        };

        if num_keys >= INTERNAL_NODE_MAX_KEYS {
            return self.split_internal_and_insert(parent_page, new_child, new_key);
        }

        let right_max = self.max_key(right_child)?;

        {
            let data = self.pager.page_mut(parent_page)?;
            let mut internal = InternalNodeMut::from_page(data)?;
            if new_key > right_max {
                // The new child holds the greatest keys: demote the old
                // right child into the cell array and take its place.
                internal.push_cell(right_child, right_max)?;
                internal.set_right_child(new_child);
            } else {
                let at = internal.route(new_key);
                internal.insert_cell_at(at, new_child, new_key)?;
            }
        }

        self.set_node_parent(new_child, parent_page)
    }

    fn split_internal_and_insert(
        &mut self,
        page_no: u32,
        new_child: u32,
        new_key: u32,
    ) -> Result<()> {
        // Materialize every (child, key) pair, giving the right child its
        // computed subtree maximum so all pairs are uniform.
        let (was_root, parent, right_child) = {
            let data = self.pager.page(page_no)?;
            let internal = InternalNode::from_page(data)?;
            (
                internal.is_root(),
                internal.parent(),
                internal.right_child(),
            )
        };
        let right_max = self.max_key(right_child)?;

        let mut pairs: Vec<(u32, u32)> = {
            let data = self.pager.page(page_no)?;
            let internal = InternalNode::from_page(data)?;
            let mut pairs = Vec::with_capacity(internal.num_keys() + 2);
            for index in 0..internal.num_keys() {
                pairs.push((
                    internal
                        .child_at(index)
                        .ok_or_else(|| eyre::eyre!("missing child {} in page {}", index, page_no))?,
                    internal.key_at(index)?,
                ));
            }
            pairs.push((right_child, right_max));
            pairs
        };

        let old_num_keys = pairs.len() - 1;
        let at = pairs
            .iter()
            .position(|&(_, key)| key > new_key)
            .unwrap_or(pairs.len());
        pairs.insert(at, (new_child, new_key));

        // One pair was inserted before splitting, so the right node takes
        // (old_num_keys + 1) - split_at children.
        let split_at = (old_num_keys + 1) / 2;
        let new_page = self.pager.allocate_page()?;

        {
            let data = self.pager.page_mut(page_no)?;
            let mut left = InternalNodeMut::init(data, pairs[split_at].0)?;
            for &(child, key) in &pairs[..split_at] {
                left.push_cell(child, key)?;
            }
            left.set_root(false);
            left.set_parent(parent);
        }

        let right_pairs = &pairs[split_at + 1..];
        {
            let data = self.pager.page_mut(new_page)?;
            let (right_tail, cells) = right_pairs
                .split_last()
                .ok_or_else(|| eyre::eyre!("internal split produced an empty right node"))?;
            let mut right = InternalNodeMut::init(data, right_tail.0)?;
            for &(child, key) in cells {
                right.push_cell(child, key)?;
            }
            right.set_parent(parent);
        }

        // Children that moved to the new node must learn their new parent;
        // the inserted child needs one either way.
        let moved: Vec<u32> = right_pairs.iter().map(|&(child, _)| child).collect();
        for child in moved {
            self.set_node_parent(child, new_page)?;
        }
        if at <= split_at {
            self.set_node_parent(new_child, page_no)?;
        }

        let left_separator = pairs[split_at].1;
        if was_root {
            self.create_new_root(new_page)
        } else {
            self.update_parent_separator(parent, page_no, left_separator)?;
            self.insert_into_internal(parent, new_page)
        }
    }

    // ------------------------------------------------------------------
    // Deletion
    // ------------------------------------------------------------------

    pub fn remove(&mut self, key: u32) -> Result<bool> {
        let cursor = self.find(key)?;

        {
            let data = self.pager.page(cursor.page)?;
            let leaf = LeafNode::from_page(data)?;
            if !(cursor.cell < leaf.num_cells() && leaf.key_at(cursor.cell)? == key) {
                return Ok(false);
            }
        }

        let (num_cells, is_root, removed_last) = {
            let data = self.pager.page_mut(cursor.page)?;
            let mut leaf = LeafNodeMut::from_page(data)?;
            leaf.remove_cell_at(cursor.cell)?;
            (
                leaf.num_cells(),
                leaf.is_root(),
                cursor.cell == leaf.num_cells(),
            )
        };

        if is_root {
            // An empty root leaf is permitted.
            return Ok(true);
        }

        if num_cells < LEAF_NODE_MIN_CELLS {
            self.handle_leaf_underflow(cursor.page)?;
        } else if removed_last {
            // The leaf's maximum changed; ancestors referencing it as a
            // subtree max must follow.
            self.refresh_max_upward(cursor.page)?;
        }

        Ok(true)
    }

    fn handle_leaf_underflow(&mut self, page_no: u32) -> Result<()> {
        let parent = self.parent_of(page_no)?;
        let (position, parent_keys) = {
            let data = self.pager.page(parent)?;
            let internal = InternalNode::from_page(data)?;
            let position = internal.position_of_child(page_no).ok_or_else(|| {
                eyre::eyre!("page {} not found among children of page {}", page_no, parent)
            })?;
            (position, internal.num_keys())
        };

        // Borrow from the right sibling.
        if position < parent_keys {
            let right = self.child_of(parent, position + 1)?;
            let right_cells = {
                let data = self.pager.page(right)?;
                LeafNode::from_page(data)?.num_cells()
            };
            if right_cells > LEAF_NODE_MIN_CELLS {
                let (borrowed_key, borrowed_row) = {
                    let data = self.pager.page_mut(right)?;
                    let mut leaf = LeafNodeMut::from_page(data)?;
                    let cell = (leaf.key_at(0)?, leaf.row_at(0)?);
                    leaf.remove_cell_at(0)?;
                    cell
                };
                {
                    let data = self.pager.page_mut(page_no)?;
                    let mut leaf = LeafNodeMut::from_page(data)?;
                    leaf.push_cell(borrowed_key, &borrowed_row)?;
                }
                // The borrowed key is now this node's subtree maximum.
                self.set_parent_key_at(parent, position, borrowed_key)?;
                return Ok(());
            }
        }

        // Borrow from the left sibling.
        if position > 0 {
            let left = self.child_of(parent, position - 1)?;
            let left_cells = {
                let data = self.pager.page(left)?;
                LeafNode::from_page(data)?.num_cells()
            };
            if left_cells > LEAF_NODE_MIN_CELLS {
                let (borrowed_key, borrowed_row, left_max) = {
                    let data = self.pager.page_mut(left)?;
                    let mut leaf = LeafNodeMut::from_page(data)?;
                    let last = leaf.num_cells() - 1;
                    let cell = (leaf.key_at(last)?, leaf.row_at(last)?);
                    leaf.remove_cell_at(last)?;
                    (cell.0, cell.1, leaf.max_key()?)
                };
                {
                    let data = self.pager.page_mut(page_no)?;
                    let mut leaf = LeafNodeMut::from_page(data)?;
                    leaf.insert_cell_at(0, borrowed_key, &borrowed_row)?;
                }
                self.set_parent_key_at(parent, position - 1, left_max)?;
                // This node's own maximum may have been the deleted key.
                self.refresh_max_upward(page_no)?;
                return Ok(());
            }
        }

        // Merge, preferring the left sibling as the survivor.
        let (survivor, absorbed, absorbed_position) = if position > 0 {
            (self.child_of(parent, position - 1)?, page_no, position)
        } else {
            ensure!(
                parent_keys > 0,
                "leaf {} underflowed with no sibling to merge into",
                page_no
            );
            (page_no, self.child_of(parent, 1)?, 1)
        };

        let (cells, absorbed_next) = {
            let data = self.pager.page(absorbed)?;
            let leaf = LeafNode::from_page(data)?;
            let mut cells: Vec<(u32, RowImage)> = Vec::with_capacity(leaf.num_cells());
            for index in 0..leaf.num_cells() {
                cells.push((leaf.key_at(index)?, *leaf.row_at(index)?));
            }
            (cells, leaf.next_leaf())
        };

        {
            let data = self.pager.page_mut(survivor)?;
            let mut leaf = LeafNodeMut::from_page(data)?;
            for (cell_key, cell_row) in &cells {
                leaf.push_cell(*cell_key, cell_row)?;
            }
            leaf.set_next_leaf(absorbed_next);
        }

        self.detach_absorbed_child(parent, survivor, absorbed, absorbed_position)
    }

    fn handle_internal_underflow(&mut self, page_no: u32) -> Result<()> {
        let parent = self.parent_of(page_no)?;
        let (position, parent_keys) = {
            let data = self.pager.page(parent)?;
            let internal = InternalNode::from_page(data)?;
            let position = internal.position_of_child(page_no).ok_or_else(|| {
                eyre::eyre!("page {} not found among children of page {}", page_no, parent)
            })?;
            (position, internal.num_keys())
        };

        // Borrow from the right sibling: our right child is demoted into
        // the cell array and the sibling's first child takes its place.
        if position < parent_keys {
            let right = self.child_of(parent, position + 1)?;
            let right_keys = {
                let data = self.pager.page(right)?;
                InternalNode::from_page(data)?.num_keys()
            };
            if right_keys > INTERNAL_NODE_MIN_KEYS {
                let own_right = {
                    let data = self.pager.page(page_no)?;
                    InternalNode::from_page(data)?.right_child()
                };
                let own_right_max = self.max_key(own_right)?;

                let (moved_child, moved_key) = {
                    let data = self.pager.page_mut(right)?;
                    let mut sibling = InternalNodeMut::from_page(data)?;
                    let moved = (
                        sibling.child_at(0).ok_or_else(|| {
                            eyre::eyre!("right sibling {} has no children", right)
                        })?,
                        sibling.key_at(0)?,
                    );
                    sibling.remove_cell_at(0)?;
                    moved
                };

                {
                    let data = self.pager.page_mut(page_no)?;
                    let mut internal = InternalNodeMut::from_page(data)?;
                    internal.push_cell(own_right, own_right_max)?;
                    internal.set_right_child(moved_child);
                }
                self.set_node_parent(moved_child, page_no)?;
                // New maximum of this node is the moved child's maximum,
                // which the sibling stored as its separator.
                self.set_parent_key_at(parent, position, moved_key)?;
                return Ok(());
            }
        }

        // Borrow from the left sibling: its right child moves in front of
        // our cells.
        if position > 0 {
            let left = self.child_of(parent, position - 1)?;
            let left_keys = {
                let data = self.pager.page(left)?;
                InternalNode::from_page(data)?.num_keys()
            };
            if left_keys > INTERNAL_NODE_MIN_KEYS {
                let (donated_child, new_left_right, new_left_max) = {
                    let data = self.pager.page(left)?;
                    let internal = InternalNode::from_page(data)?;
                    let last = internal.num_keys() - 1;
                    (
                        internal.right_child(),
                        internal.child_at(last).ok_or_else(|| {
                            eyre::eyre!("left sibling {} has no children", left)
                        })?,
                        internal.key_at(last)?,
                    )
                };
                let donated_max = self.max_key(donated_child)?;

                {
                    let data = self.pager.page_mut(left)?;
                    let mut sibling = InternalNodeMut::from_page(data)?;
                    let last = sibling.num_keys() - 1;
                    sibling.set_right_child(new_left_right);
                    sibling.remove_cell_at(last)?;
                }
                {
                    let data = self.pager.page_mut(page_no)?;
                    let mut internal = InternalNodeMut::from_page(data)?;
                    internal.insert_cell_at(0, donated_child, donated_max)?;
                }
                self.set_node_parent(donated_child, page_no)?;
                self.set_parent_key_at(parent, position - 1, new_left_max)?;
                // This node's own maximum may be stale from the deletion.
                self.refresh_max_upward(page_no)?;
                return Ok(());
            }
        }

        // Merge, preferring the left sibling as the survivor.
        let (survivor, absorbed, absorbed_position) = if position > 0 {
            (self.child_of(parent, position - 1)?, page_no, position)
        } else {
            ensure!(
                parent_keys > 0,
                "internal node {} underflowed with no sibling to merge into",
                page_no
            );
            (page_no, self.child_of(parent, 1)?, 1)
        };

        let survivor_right = {
            let data = self.pager.page(survivor)?;
            InternalNode::from_page(data)?.right_child()
        };
        let survivor_right_max = self.max_key(survivor_right)?;

        let (absorbed_cells, absorbed_right) = {
            let data = self.pager.page(absorbed)?;
            let internal = InternalNode::from_page(data)?;
            let mut cells: Vec<(u32, u32)> = Vec::with_capacity(internal.num_keys());
            for index in 0..internal.num_keys() {
                cells.push((
                    internal.child_at(index).ok_or_else(|| {
                        eyre::eyre!("missing child {} in page {}", index, absorbed)
                    })?,
                    internal.key_at(index)?,
                ));
            }
            (cells, internal.right_child())
        };

        {
            let data = self.pager.page_mut(survivor)?;
            let mut internal = InternalNodeMut::from_page(data)?;
            internal.push_cell(survivor_right, survivor_right_max)?;
            for &(child, key) in &absorbed_cells {
                internal.push_cell(child, key)?;
            }
            internal.set_right_child(absorbed_right);
        }

        for &(child, _) in &absorbed_cells {
            self.set_node_parent(child, survivor)?;
        }
        self.set_node_parent(absorbed_right, survivor)?;

        self.detach_absorbed_child(parent, survivor, absorbed, absorbed_position)
    }

    /// Removes the absorbed child's cell from the parent, re-derives the
    /// separators disturbed by the shift, frees the absorbed page, and
    /// recurses into the parent if it underflowed (or collapses an empty
    /// root).
    fn detach_absorbed_child(
        &mut self,
        parent: u32,
        survivor: u32,
        absorbed: u32,
        absorbed_position: usize,
    ) -> Result<()> {
        let parent_keys = {
            let data = self.pager.page(parent)?;
            InternalNode::from_page(data)?.num_keys()
        };

        {
            let data = self.pager.page_mut(parent)?;
            let mut internal = InternalNodeMut::from_page(data)?;
            if absorbed_position == parent_keys {
                // The absorbed node was the right child; the survivor (its
                // left neighbour) takes over and loses its cell.
                internal.set_right_child(survivor);
                internal.remove_cell_at(parent_keys - 1)?;
            } else {
                internal.remove_cell_at(absorbed_position)?;
            }
        }

        self.rederive_separators_from(parent, absorbed_position.saturating_sub(1))?;
        self.refresh_max_upward(survivor)?;

        // The page must return to the free chain before the recursive
        // rebalance so a cascading merge can reuse it.
        self.pager.free_page(absorbed)?;

        let (parent_is_root, parent_keys) = {
            let data = self.pager.page(parent)?;
            let internal = InternalNode::from_page(data)?;
            (internal.is_root(), internal.num_keys())
        };

        if parent_is_root && parent_keys == 0 {
            self.collapse_root(parent)
        } else if !parent_is_root && parent_keys < INTERNAL_NODE_MIN_KEYS {
            self.handle_internal_underflow(parent)
        } else {
            Ok(())
        }
    }

    /// Replaces an empty internal root with its sole remaining child.
    fn collapse_root(&mut self, old_root: u32) -> Result<()> {
        let child = {
            let data = self.pager.page(old_root)?;
            let internal = InternalNode::from_page(data)?;
            ensure!(
                internal.num_keys() == 0,
                "collapse of root {} with {} keys",
                old_root,
                internal.num_keys()
            );
            internal.right_child()
        };

        {
            let data = self.pager.page_mut(child)?;
            let header = NodeHeader::from_bytes_mut(data)?;
            header.set_root(true);
            header.set_parent(0);
        }

        self.pager.set_root_page(child);
        self.pager.free_page(old_root)
    }

    // ------------------------------------------------------------------
    // Separator maintenance
    // ------------------------------------------------------------------

    /// Walks up from `page_no` through right-child links and rewrites the
    /// first cell separator that references this subtree's maximum.
    fn refresh_max_upward(&mut self, start: u32) -> Result<()> {
        let mut current = start;
        let mut fuse = 64;

        loop {
            ensure!(fuse > 0, "separator refresh exceeded maximum depth");
            fuse -= 1;

            let (is_root, parent) = {
                let data = self.pager.page(current)?;
                let header = NodeHeader::from_bytes(data)?;
                (header.is_root(), header.parent())
            };
            if is_root {
                return Ok(());
            }

            let position = {
                let data = self.pager.page(parent)?;
                let internal = InternalNode::from_page(data)?;
                internal.position_of_child(current).ok_or_else(|| {
                    eyre::eyre!("page {} not found among children of page {}", current, parent)
                })?
            };
            let parent_keys = {
                let data = self.pager.page(parent)?;
                InternalNode::from_page(data)?.num_keys()
            };

            if position < parent_keys {
                let new_max = self.max_key(current)?;
                self.set_parent_key_at(parent, position, new_max)?;
                return Ok(());
            }

            // A right child has no separator of its own; the change
            // surfaces one level higher.
            current = parent;
        }
    }

    /// Re-derives `key[i] := max(child[i])` for every cell at or after
    /// `from`, restoring the separator invariant after a shift.
    fn rederive_separators_from(&mut self, parent: u32, from: usize) -> Result<()> {
        let children: Vec<(usize, u32)> = {
            let data = self.pager.page(parent)?;
            let internal = InternalNode::from_page(data)?;
            let mut children = Vec::with_capacity(internal.num_keys().saturating_sub(from));
            for index in from..internal.num_keys() {
                let child = internal.child_at(index).ok_or_else(|| {
                    eyre::eyre!("missing child {} in page {}", index, parent)
                })?;
                children.push((index, child));
            }
            children
        };

        for (index, child) in children {
            let max = self.max_key(child)?;
            self.set_parent_key_at(parent, index, max)?;
        }

        Ok(())
    }

    fn update_parent_separator(
        &mut self,
        parent: u32,
        child: u32,
        new_key: u32,
    ) -> Result<()> {
        let data = self.pager.page_mut(parent)?;
        let mut internal = InternalNodeMut::from_page(data)?;
        match internal.position_of_child(child) {
            Some(position) if position < internal.num_keys() => {
                internal.set_key_at(position, new_key)
            }
            // The right child carries no separator.
            Some(_) => Ok(()),
            None => bail!("page {} not found among children of page {}", child, parent),
        }
    }

    fn set_parent_key_at(&mut self, parent: u32, index: usize, key: u32) -> Result<()> {
        let data = self.pager.page_mut(parent)?;
        let mut internal = InternalNodeMut::from_page(data)?;
        internal.set_key_at(index, key)
    }

    // ------------------------------------------------------------------
    // Small page helpers
    // ------------------------------------------------------------------

    fn set_node_parent(&mut self, page_no: u32, parent: u32) -> Result<()> {
        let data = self.pager.page_mut(page_no)?;
        NodeHeader::from_bytes_mut(data)?.set_parent(parent);
        Ok(())
    }

    fn parent_of(&mut self, page_no: u32) -> Result<u32> {
        let data = self.pager.page(page_no)?;
        Ok(NodeHeader::from_bytes(data)?.parent())
    }

    fn child_of(&mut self, parent: u32, index: usize) -> Result<u32> {
        let data = self.pager.page(parent)?;
        let internal = InternalNode::from_page(data)?;
        internal
            .child_at(index)
            .ok_or_else(|| eyre::eyre!("no child at index {} in page {}", index, parent))
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Renders the tree with one indented line per node, guarding against
    /// cycles so a corrupt file cannot hang the caller.
    pub fn render(&mut self) -> Result<String> {
        let mut out = String::new();
        let mut visited: SmallVec<[u32; 16]> = SmallVec::new();
        let root = self.pager.root_page();
        self.render_node(root, 0, &mut visited, &mut out)?;
        Ok(out)
    }

    fn render_node(
        &mut self,
        page_no: u32,
        depth: usize,
        visited: &mut SmallVec<[u32; 16]>,
        out: &mut String,
    ) -> Result<()> {
        use std::fmt::Write;

        if visited.contains(&page_no) {
            writeln!(out, "{}- cycle! page {} revisited", "  ".repeat(depth), page_no).ok();
            return Ok(());
        }
        visited.push(page_no);

        let data = self.pager.page(page_no)?;
        match node::node_type(data)? {
            NodeType::Leaf => {
                let leaf = LeafNode::from_page(data)?;
                let num_cells = leaf.num_cells();
                let mut keys = Vec::with_capacity(num_cells);
                for index in 0..num_cells {
                    keys.push(leaf.key_at(index)?);
                }
                let indent = "  ".repeat(depth);
                writeln!(out, "{}- leaf (page {}, size {})", indent, page_no, num_cells).ok();
                for key in keys {
                    writeln!(out, "{}  - {}", indent, key).ok();
                }
            }
            NodeType::Internal => {
                let internal = InternalNode::from_page(data)?;
                let num_keys = internal.num_keys();
                let mut entries = Vec::with_capacity(num_keys + 1);
                for index in 0..num_keys {
                    entries.push((internal.child_at(index), Some(internal.key_at(index)?)));
                }
                entries.push((internal.child_at(num_keys), None));

                let indent = "  ".repeat(depth);
                writeln!(
                    out,
                    "{}- internal (page {}, size {})",
                    indent, page_no, num_keys
                )
                .ok();
                for (child, key) in entries {
                    if let Some(child) = child {
                        self.render_node(child, depth + 1, visited, out)?;
                    }
                    if let Some(key) = key {
                        writeln!(out, "{}- key {}", indent, key).ok();
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::validate::validate_tree;
    use tempfile::tempdir;

    fn scratch_tree() -> (tempfile::TempDir, Pager) {
        let dir = tempdir().unwrap();
        let mut pager = Pager::open(dir.path().join("test.rdb")).unwrap();
        BTree::init_root(&mut pager, 0).unwrap();
        (dir, pager)
    }

    fn image(id: u32) -> RowImage {
        Row::new(id, format!("user{}", id), format!("user{}@example.com", id))
            .unwrap()
            .to_image()
    }

    fn insert_all(pager: &mut Pager, keys: impl IntoIterator<Item = u32>) {
        for key in keys {
            let outcome = BTree::new(pager).insert(key, &image(key)).unwrap();
            assert_eq!(outcome, InsertOutcome::Inserted, "insert {}", key);
            validate_tree(pager).unwrap();
        }
    }

    fn delete_all(pager: &mut Pager, keys: impl IntoIterator<Item = u32>) {
        for key in keys {
            assert!(BTree::new(pager).remove(key).unwrap(), "delete {}", key);
            validate_tree(pager).unwrap();
        }
    }

    fn collect_keys(pager: &mut Pager) -> Vec<u32> {
        BTree::new(pager)
            .scan_all()
            .unwrap()
            .into_iter()
            .map(|row| row.id)
            .collect()
    }

    #[test]
    fn insert_and_get_single_key() {
        let (_dir, mut pager) = scratch_tree();

        insert_all(&mut pager, [5]);

        let row = BTree::new(&mut pager).get(5).unwrap().unwrap();
        assert_eq!(row.username, "user5");
        assert!(BTree::new(&mut pager).get(6).unwrap().is_none());
    }

    #[test]
    fn duplicate_insert_is_reported_and_ignored() {
        let (_dir, mut pager) = scratch_tree();
        insert_all(&mut pager, [5]);

        let other = Row::new(5, "bob", "b@x").unwrap().to_image();
        let outcome = BTree::new(&mut pager).insert(5, &other).unwrap();

        assert_eq!(outcome, InsertOutcome::DuplicateKey);
        let row = BTree::new(&mut pager).get(5).unwrap().unwrap();
        assert_eq!(row.username, "user5");
    }

    #[test]
    fn fourteenth_insert_splits_the_root_seven_seven() {
        let (_dir, mut pager) = scratch_tree();

        insert_all(&mut pager, 1..=14);

        let root = pager.root_page();
        let data = pager.page(root).unwrap();
        let internal = InternalNode::from_page(data).unwrap();
        assert_eq!(internal.num_keys(), 1);
        assert_eq!(internal.key_at(0).unwrap(), 7);

        let left = internal.child_at(0).unwrap();
        let right = internal.child_at(1).unwrap();
        let left_cells = LeafNode::from_page(pager.page(left).unwrap())
            .unwrap()
            .num_cells();
        let right_cells = LeafNode::from_page(pager.page(right).unwrap())
            .unwrap()
            .num_cells();
        assert_eq!(left_cells, 7);
        assert_eq!(right_cells, 7);

        assert_eq!(collect_keys(&mut pager), (1..=14).collect::<Vec<_>>());
    }

    #[test]
    fn reverse_insertion_keeps_order() {
        let (_dir, mut pager) = scratch_tree();

        insert_all(&mut pager, (1..=100).rev());

        assert_eq!(collect_keys(&mut pager), (1..=100).collect::<Vec<_>>());
    }

    #[test]
    fn interleaved_insertion_keeps_order() {
        let (_dir, mut pager) = scratch_tree();

        insert_all(&mut pager, (1..=200).filter(|k| k % 2 == 0));
        insert_all(&mut pager, (1..=200).filter(|k| k % 2 == 1));

        assert_eq!(collect_keys(&mut pager), (1..=200).collect::<Vec<_>>());
    }

    #[test]
    fn update_overwrites_in_place() {
        let (_dir, mut pager) = scratch_tree();
        insert_all(&mut pager, 1..=20);

        let replacement = Row::new(7, "renamed", "renamed@example.com")
            .unwrap()
            .to_image();
        assert!(BTree::new(&mut pager).update(7, &replacement).unwrap());
        assert!(!BTree::new(&mut pager).update(999, &replacement).unwrap());

        let row = BTree::new(&mut pager).get(7).unwrap().unwrap();
        assert_eq!(row.username, "renamed");
        assert_eq!(collect_keys(&mut pager).len(), 20);
    }

    #[test]
    fn remove_missing_key_returns_false() {
        let (_dir, mut pager) = scratch_tree();
        insert_all(&mut pager, 1..=5);

        assert!(!BTree::new(&mut pager).remove(99).unwrap());
        assert_eq!(collect_keys(&mut pager).len(), 5);
    }

    #[test]
    fn removing_everything_leaves_valid_empty_root() {
        let (_dir, mut pager) = scratch_tree();
        insert_all(&mut pager, 1..=14);

        delete_all(&mut pager, 8..=14);
        delete_all(&mut pager, 1..=7);

        assert!(collect_keys(&mut pager).is_empty());
        assert!(pager.free_head() != 0);

        let root = pager.root_page();
        let data = pager.page(root).unwrap();
        let leaf = LeafNode::from_page(data).unwrap();
        assert_eq!(leaf.num_cells(), 0);
        assert!(leaf.is_root());
    }

    #[test]
    fn underflow_borrows_from_right_sibling() {
        let (_dir, mut pager) = scratch_tree();
        // Two leaves: left 1..=7, right 8..=15 (sizes 7 and 8).
        insert_all(&mut pager, 1..=15);

        // Two deletions on the 7-side trigger a borrow from the 8-side.
        delete_all(&mut pager, [1, 2]);

        let root = pager.root_page();
        let data = pager.page(root).unwrap();
        let internal = InternalNode::from_page(data).unwrap();
        // Key 8 moved left; the separator is the left leaf's new maximum.
        assert_eq!(internal.key_at(0).unwrap(), 8);

        let left = internal.child_at(0).unwrap();
        let left_leaf = LeafNode::from_page(pager.page(left).unwrap()).unwrap();
        assert_eq!(left_leaf.num_cells(), 6);
        assert_eq!(left_leaf.max_key().unwrap(), 8);

        assert_eq!(collect_keys(&mut pager), (3..=15).collect::<Vec<_>>());
    }

    #[test]
    fn underflow_borrows_from_left_sibling() {
        let (_dir, mut pager) = scratch_tree();
        // Left leaf 1..=7 (7 cells), right leaf 8..=15 (8 cells).
        insert_all(&mut pager, 1..=15);

        // Three deletions drop the right leaf to 5 cells; its only sibling
        // is on the left, which can spare its maximum.
        delete_all(&mut pager, [13, 14, 15]);

        let root = pager.root_page();
        let data = pager.page(root).unwrap();
        let internal = InternalNode::from_page(data).unwrap();
        // The left leaf donated key 7; the separator follows its new max.
        assert_eq!(internal.key_at(0).unwrap(), 6);

        assert_eq!(collect_keys(&mut pager), (1..=12).collect::<Vec<_>>());
    }

    #[test]
    fn deleting_a_leaf_maximum_updates_ancestors() {
        let (_dir, mut pager) = scratch_tree();
        insert_all(&mut pager, 1..=21);

        // 7 is the first leaf's maximum and a separator in the root.
        delete_all(&mut pager, [7]);

        assert_eq!(
            collect_keys(&mut pager),
            (1..=21).filter(|&k| k != 7).collect::<Vec<_>>()
        );
        assert!(BTree::new(&mut pager).get(7).unwrap().is_none());
    }

    #[test]
    fn freed_pages_are_reused_after_mass_delete() {
        let (_dir, mut pager) = scratch_tree();

        insert_all(&mut pager, 1..=30);
        let pages_after_first_fill = pager.num_pages();

        delete_all(&mut pager, 1..=30);
        assert!(pager.free_head() != 0);

        insert_all(&mut pager, 1..=30);
        assert!(pager.num_pages() <= pages_after_first_fill);
        assert_eq!(collect_keys(&mut pager), (1..=30).collect::<Vec<_>>());
    }

    #[test]
    fn range_scan_clips_to_bounds() {
        let (_dir, mut pager) = scratch_tree();
        insert_all(&mut pager, (10..=100).step_by(10));

        let rows = BTree::new(&mut pager).scan_range(25, 75).unwrap();
        let keys: Vec<u32> = rows.iter().map(|row| row.id).collect();

        assert_eq!(keys, vec![30, 40, 50, 60, 70]);
    }

    #[test]
    fn range_scan_of_empty_interval_is_empty() {
        let (_dir, mut pager) = scratch_tree();
        insert_all(&mut pager, 1..=5);

        assert!(BTree::new(&mut pager).scan_range(7, 9).unwrap().is_empty());
        assert!(BTree::new(&mut pager).scan_range(9, 7).unwrap().is_empty());
    }

    #[test]
    fn deep_churn_stays_valid() {
        let (_dir, mut pager) = scratch_tree();

        insert_all(&mut pager, 1..=300);
        delete_all(&mut pager, (1..=300).filter(|k| k % 3 == 0));
        insert_all(&mut pager, 301..=400);
        delete_all(&mut pager, 350..=400);

        let expected: Vec<u32> = (1..=300)
            .filter(|k| k % 3 != 0)
            .chain(301..=349)
            .collect();
        assert_eq!(collect_keys(&mut pager), expected);
    }

    #[test]
    fn render_shows_leaf_keys() {
        let (_dir, mut pager) = scratch_tree();
        insert_all(&mut pager, 1..=3);

        let rendered = BTree::new(&mut pager).render().unwrap();

        assert!(rendered.contains("leaf (page 0, size 3)"));
        assert!(rendered.contains("- 2"));
    }
}
