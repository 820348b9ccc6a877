//! # B+Tree Module
//!
//! The index structure of the database: leaves hold `(key, row)` cells in
//! key order and are chained for scans; internal nodes hold
//! `(child, separator)` cells where the separator is the maximum key of
//! the child's subtree. All nodes occupy one 4096-byte page addressed by
//! page number; there are no in-memory node objects, only borrowed views
//! over page buffers.
//!
//! ```text
//!                 [ internal (root) ]
//!                /         |         \
//!        [ leaf ] ──> [ leaf ] ──> [ leaf ]        (next_leaf chain)
//! ```
//!
//! ## Module Organization
//!
//! - `node`: the 6/14-byte on-page headers shared by both node kinds
//! - `leaf`: leaf views with binary search and shift-based cell editing
//! - `interior`: internal-node views with child routing
//! - `tree`: search, insert (with splits), delete (with borrow/merge)
//! - `cursor`: `(page, cell)` positions and sibling-chain traversal
//! - `validate`: whole-tree structural invariant checking

mod cursor;
mod interior;
mod leaf;
mod node;
mod tree;
mod validate;

pub use cursor::Cursor;
pub use interior::{InternalNode, InternalNodeMut};
pub use leaf::{LeafNode, LeafNodeMut, SearchResult};
pub use node::{node_type, InternalHeader, LeafHeader, NodeHeader, NodeType};
pub use tree::{BTree, InsertOutcome};
pub use validate::{validate_tree, TreeInfo};
