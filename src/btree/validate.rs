//! # Structural Validator
//!
//! A recursive post-order walk over the whole tree that checks every
//! structural invariant the engine is supposed to maintain, returning an
//! error that names the offending page:
//!
//! 1. keys within a leaf are strictly increasing;
//! 2. every separator equals the maximum key of its child subtree, and
//!    sibling subtrees are disjoint and ordered;
//! 3. all leaves lie at the same depth;
//! 4. every non-root node meets its minimum occupancy;
//! 5. every non-root node's parent pointer names its actual parent;
//! 6. the `next_leaf` chain visits every leaf exactly once in key order;
//! 7. the free chain is acyclic, in-range, and disjoint from the tree.
//!
//! The walk carries a visited set so reference cycles in a corrupt file
//! are reported rather than looped on.

use eyre::{bail, ensure, Result};
use hashbrown::HashSet;

use crate::config::{INTERNAL_NODE_MIN_KEYS, LEAF_NODE_MIN_CELLS};
use crate::storage::Pager;

use super::interior::InternalNode;
use super::leaf::LeafNode;
use super::node::{self, NodeType};

/// Summary of a successful validation, surfaced by the `.validate`
/// command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeInfo {
    pub depth: u32,
    pub row_count: u64,
    pub reachable_pages: u32,
    pub free_pages: u32,
}

#[derive(Debug, Clone, Copy)]
struct Subtree {
    min: u32,
    max: u32,
    leaf_depth: u32,
    rows: u64,
}

struct WalkState {
    visited: HashSet<u32>,
    leaves_in_order: Vec<u32>,
}

/// Validates the whole tree plus the free chain. Any violated invariant
/// is an error naming the page where it was observed.
pub fn validate_tree(pager: &mut Pager) -> Result<TreeInfo> {
    let root = pager.root_page();
    let mut state = WalkState {
        visited: HashSet::new(),
        leaves_in_order: Vec::new(),
    };

    let summary = validate_node(pager, root, None, &mut state)?;
    validate_leaf_chain(pager, &state.leaves_in_order)?;

    let free_pages = pager.validate_free_chain()?;
    validate_free_disjointness(pager, &state.visited)?;

    Ok(TreeInfo {
        depth: summary.map(|s| s.leaf_depth).unwrap_or(0),
        row_count: summary.map(|s| s.rows).unwrap_or(0),
        reachable_pages: state.visited.len() as u32,
        free_pages,
    })
}

/// Post-order walk. Returns `None` only for an empty root leaf.
fn validate_node(
    pager: &mut Pager,
    page_no: u32,
    expected_parent: Option<u32>,
    state: &mut WalkState,
) -> Result<Option<Subtree>> {
    ensure!(
        state.visited.insert(page_no),
        "page {} is reachable twice (cycle or shared child)",
        page_no
    );

    let node_type = {
        let data = pager.page(page_no)?;
        node::node_type(data)?
    };

    match node_type {
        NodeType::Leaf => validate_leaf(pager, page_no, expected_parent, state),
        NodeType::Internal => validate_internal(pager, page_no, expected_parent, state),
    }
}

fn validate_leaf(
    pager: &mut Pager,
    page_no: u32,
    expected_parent: Option<u32>,
    state: &mut WalkState,
) -> Result<Option<Subtree>> {
    let (num_cells, is_root, parent, keys) = {
        let data = pager.page(page_no)?;
        let leaf = LeafNode::from_page(data)?;
        let mut keys = Vec::with_capacity(leaf.num_cells());
        for index in 0..leaf.num_cells() {
            keys.push(leaf.key_at(index)?);
        }
        (leaf.num_cells(), leaf.is_root(), leaf.parent(), keys)
    };

    check_parent_link(page_no, is_root, parent, expected_parent)?;
    state.leaves_in_order.push(page_no);

    if let Some(parent) = expected_parent {
        ensure!(
            num_cells >= LEAF_NODE_MIN_CELLS,
            "leaf page {} holds {} cells, below the minimum {} (parent {})",
            page_no,
            num_cells,
            LEAF_NODE_MIN_CELLS,
            parent
        );
    }

    for window in keys.windows(2) {
        ensure!(
            window[0] < window[1],
            "leaf page {} keys are not strictly increasing ({} >= {})",
            page_no,
            window[0],
            window[1]
        );
    }

    Ok(keys.first().map(|&min| Subtree {
        min,
        max: *keys.last().unwrap(),
        leaf_depth: 0,
        rows: num_cells as u64,
    }))
}

fn validate_internal(
    pager: &mut Pager,
    page_no: u32,
    expected_parent: Option<u32>,
    state: &mut WalkState,
) -> Result<Option<Subtree>> {
    let (num_keys, is_root, parent, cells, right_child) = {
        let data = pager.page(page_no)?;
        let internal = InternalNode::from_page(data)?;
        let mut cells = Vec::with_capacity(internal.num_keys());
        for index in 0..internal.num_keys() {
            let child = internal.child_at(index).ok_or_else(|| {
                eyre::eyre!("internal page {} is missing child {}", page_no, index)
            })?;
            cells.push((child, internal.key_at(index)?));
        }
        (
            internal.num_keys(),
            internal.is_root(),
            internal.parent(),
            cells,
            internal.right_child(),
        )
    };

    check_parent_link(page_no, is_root, parent, expected_parent)?;

    if expected_parent.is_some() {
        ensure!(
            num_keys >= INTERNAL_NODE_MIN_KEYS,
            "internal page {} holds {} keys, below the minimum {}",
            page_no,
            num_keys,
            INTERNAL_NODE_MIN_KEYS
        );
    } else {
        // A root that outlived its last separator should have collapsed.
        ensure!(
            num_keys >= 1,
            "internal root page {} has no separator keys",
            page_no
        );
    }

    let mut rows = 0u64;
    let mut depth: Option<u32> = None;
    let mut previous_max: Option<u32> = None;
    let mut node_min: Option<u32> = None;

    for (child, key) in &cells {
        let subtree = validate_node(pager, *child, Some(page_no), state)?
            .ok_or_else(|| eyre::eyre!("internal page {} has an empty child {}", page_no, child))?;

        ensure!(
            subtree.max == *key,
            "internal page {} separator {} does not match child {} max {}",
            page_no,
            key,
            child,
            subtree.max
        );
        if let Some(previous) = previous_max {
            ensure!(
                previous < subtree.min,
                "internal page {} child {} overlaps its left sibling ({} >= {})",
                page_no,
                child,
                previous,
                subtree.min
            );
        }

        check_depth(page_no, &mut depth, subtree.leaf_depth)?;
        rows += subtree.rows;
        previous_max = Some(subtree.max);
        node_min.get_or_insert(subtree.min);
    }

    let right = validate_node(pager, right_child, Some(page_no), state)?.ok_or_else(|| {
        eyre::eyre!(
            "internal page {} has an empty right child {}",
            page_no,
            right_child
        )
    })?;
    if let Some(previous) = previous_max {
        ensure!(
            previous < right.min,
            "internal page {} right child {} overlaps its left sibling ({} >= {})",
            page_no,
            right_child,
            previous,
            right.min
        );
    }
    check_depth(page_no, &mut depth, right.leaf_depth)?;
    rows += right.rows;
    node_min.get_or_insert(right.min);

    Ok(Some(Subtree {
        min: node_min.unwrap_or(right.min),
        max: right.max,
        leaf_depth: depth.unwrap_or(right.leaf_depth) + 1,
        rows,
    }))
}

fn check_parent_link(
    page_no: u32,
    is_root: bool,
    parent: u32,
    expected_parent: Option<u32>,
) -> Result<()> {
    match expected_parent {
        None => ensure!(
            is_root,
            "page {} is the tree root but its root flag is unset",
            page_no
        ),
        Some(expected) => {
            ensure!(
                !is_root,
                "page {} carries the root flag but has parent {}",
                page_no,
                expected
            );
            ensure!(
                parent == expected,
                "page {} records parent {} but is a child of {}",
                page_no,
                parent,
                expected
            );
        }
    }
    Ok(())
}

fn check_depth(page_no: u32, depth: &mut Option<u32>, observed: u32) -> Result<()> {
    match depth {
        None => *depth = Some(observed),
        Some(expected) => ensure!(
            *expected == observed,
            "internal page {} has children at unequal depths ({} vs {})",
            page_no,
            expected,
            observed
        ),
    }
    Ok(())
}

/// The sibling chain must visit exactly the leaves the tree reaches, in
/// the same left-to-right order, and terminate at 0.
fn validate_leaf_chain(pager: &mut Pager, leaves_in_order: &[u32]) -> Result<()> {
    let mut current = match leaves_in_order.first() {
        Some(&first) => first,
        None => return Ok(()),
    };

    for (index, &expected) in leaves_in_order.iter().enumerate() {
        ensure!(
            current == expected,
            "leaf chain visits page {} where the tree order expects page {}",
            current,
            expected
        );
        let data = pager.page(current)?;
        let leaf = LeafNode::from_page(data)?;
        let next = leaf.next_leaf();

        if index + 1 == leaves_in_order.len() {
            ensure!(
                next == 0,
                "last leaf page {} points to page {} instead of terminating",
                current,
                next
            );
        } else {
            ensure!(
                next != 0,
                "leaf chain terminates early at page {}",
                current
            );
            current = next;
        }
    }

    Ok(())
}

/// A page must never be both reachable from the root and on the free
/// chain.
fn validate_free_disjointness(pager: &mut Pager, reachable: &HashSet<u32>) -> Result<()> {
    let mut current = pager.free_head();
    let mut fuse = pager.num_pages();

    while current != 0 {
        if reachable.contains(&current) {
            bail!(
                "page {} is on the free chain but still reachable from the root",
                current
            );
        }
        ensure!(fuse > 0, "free chain walk exceeded the page count");
        fuse -= 1;

        let data = pager.page(current)?;
        current = crate::storage::FreeLink::read(data)?;
    }

    Ok(())
}
