//! # Node Headers
//!
//! Every B+Tree page begins with a 6-byte common header, extended to 14
//! bytes by the leaf- or internal-specific fields. These structs are the
//! only place in the crate that knows the header byte offsets; everything
//! else goes through the typed accessors.
//!
//! ## Common Header (6 bytes, offset 0)
//!
//! ```text
//! Offset  Size  Field        Description
//! ------  ----  -----------  ----------------------------------------
//! 0       1     node_type    0x01 internal, 0x02 leaf
//! 1       1     is_root      0 or 1
//! 2       4     parent_page  Page number of the parent (root: unused, 0)
//! ```
//!
//! ## Leaf Extension (offsets 6..14)
//!
//! ```text
//! 6       4     num_cells    Number of (key, row) cells in this leaf
//! 10      4     next_leaf    Right sibling page (0 = no successor)
//! ```
//!
//! ## Internal Extension (offsets 6..14)
//!
//! ```text
//! 6       4     num_keys     Number of (child, key) cells
//! 10      4     right_child  Child for keys greater than every separator
//! ```
//!
//! A freshly allocated page is all zeroes, which no valid node type byte
//! matches; initialization is always explicit.

use eyre::{ensure, Result};
use zerocopy::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{COMMON_NODE_HEADER_SIZE, INTERNAL_NODE_HEADER_SIZE, LEAF_NODE_HEADER_SIZE};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Internal = 0x01,
    Leaf = 0x02,
}

impl NodeType {
    pub fn from_byte(b: u8) -> Result<Self> {
        match b {
            0x01 => Ok(NodeType::Internal),
            0x02 => Ok(NodeType::Leaf),
            other => eyre::bail!("invalid node type byte: {:#04x}", other),
        }
    }
}

/// Reads the node type of a page without committing to a view type.
pub fn node_type(page: &[u8]) -> Result<NodeType> {
    ensure!(!page.is_empty(), "empty page buffer");
    NodeType::from_byte(page[0])
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct NodeHeader {
    node_type: u8,
    is_root: u8,
    parent: U32,
}

const _: () = assert!(size_of::<NodeHeader>() == COMMON_NODE_HEADER_SIZE);

impl NodeHeader {
    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        ensure!(
            data.len() >= size_of::<Self>(),
            "buffer too small for NodeHeader: {} < {}",
            data.len(),
            size_of::<Self>()
        );
        Self::ref_from_bytes(&data[..size_of::<Self>()])
            .map_err(|e| eyre::eyre!("failed to read NodeHeader: {:?}", e))
    }

    pub fn from_bytes_mut(data: &mut [u8]) -> Result<&mut Self> {
        ensure!(
            data.len() >= size_of::<Self>(),
            "buffer too small for NodeHeader: {} < {}",
            data.len(),
            size_of::<Self>()
        );
        Self::mut_from_bytes(&mut data[..size_of::<Self>()])
            .map_err(|e| eyre::eyre!("failed to read NodeHeader: {:?}", e))
    }

    pub fn node_type(&self) -> Result<NodeType> {
        NodeType::from_byte(self.node_type)
    }

    pub fn set_node_type(&mut self, node_type: NodeType) {
        self.node_type = node_type as u8;
    }

    pub fn is_root(&self) -> bool {
        self.is_root != 0
    }

    pub fn set_root(&mut self, is_root: bool) {
        self.is_root = is_root as u8;
    }

    pub fn parent(&self) -> u32 {
        self.parent.get()
    }

    pub fn set_parent(&mut self, page_no: u32) {
        self.parent = U32::new(page_no);
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct LeafHeader {
    common: NodeHeader,
    num_cells: U32,
    next_leaf: U32,
}

const _: () = assert!(size_of::<LeafHeader>() == LEAF_NODE_HEADER_SIZE);

impl LeafHeader {
    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        ensure!(
            data.len() >= size_of::<Self>(),
            "buffer too small for LeafHeader: {} < {}",
            data.len(),
            size_of::<Self>()
        );
        Self::ref_from_bytes(&data[..size_of::<Self>()])
            .map_err(|e| eyre::eyre!("failed to read LeafHeader: {:?}", e))
    }

    pub fn from_bytes_mut(data: &mut [u8]) -> Result<&mut Self> {
        ensure!(
            data.len() >= size_of::<Self>(),
            "buffer too small for LeafHeader: {} < {}",
            data.len(),
            size_of::<Self>()
        );
        Self::mut_from_bytes(&mut data[..size_of::<Self>()])
            .map_err(|e| eyre::eyre!("failed to read LeafHeader: {:?}", e))
    }

    pub fn common(&self) -> &NodeHeader {
        &self.common
    }

    pub fn common_mut(&mut self) -> &mut NodeHeader {
        &mut self.common
    }

    pub fn num_cells(&self) -> u32 {
        self.num_cells.get()
    }

    pub fn set_num_cells(&mut self, count: u32) {
        self.num_cells = U32::new(count);
    }

    pub fn next_leaf(&self) -> u32 {
        self.next_leaf.get()
    }

    pub fn set_next_leaf(&mut self, page_no: u32) {
        self.next_leaf = U32::new(page_no);
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct InternalHeader {
    common: NodeHeader,
    num_keys: U32,
    right_child: U32,
}

const _: () = assert!(size_of::<InternalHeader>() == INTERNAL_NODE_HEADER_SIZE);

impl InternalHeader {
    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        ensure!(
            data.len() >= size_of::<Self>(),
            "buffer too small for InternalHeader: {} < {}",
            data.len(),
            size_of::<Self>()
        );
        Self::ref_from_bytes(&data[..size_of::<Self>()])
            .map_err(|e| eyre::eyre!("failed to read InternalHeader: {:?}", e))
    }

    pub fn from_bytes_mut(data: &mut [u8]) -> Result<&mut Self> {
        ensure!(
            data.len() >= size_of::<Self>(),
            "buffer too small for InternalHeader: {} < {}",
            data.len(),
            size_of::<Self>()
        );
        Self::mut_from_bytes(&mut data[..size_of::<Self>()])
            .map_err(|e| eyre::eyre!("failed to read InternalHeader: {:?}", e))
    }

    pub fn common(&self) -> &NodeHeader {
        &self.common
    }

    pub fn common_mut(&mut self) -> &mut NodeHeader {
        &mut self.common
    }

    pub fn num_keys(&self) -> u32 {
        self.num_keys.get()
    }

    pub fn set_num_keys(&mut self, count: u32) {
        self.num_keys = U32::new(count);
    }

    pub fn right_child(&self) -> u32 {
        self.right_child.get()
    }

    pub fn set_right_child(&mut self, page_no: u32) {
        self.right_child = U32::new(page_no);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_sizes_match_the_file_format() {
        assert_eq!(size_of::<NodeHeader>(), 6);
        assert_eq!(size_of::<LeafHeader>(), 14);
        assert_eq!(size_of::<InternalHeader>(), 14);
    }

    #[test]
    fn node_type_round_trips_through_byte() {
        assert_eq!(NodeType::from_byte(0x01).unwrap(), NodeType::Internal);
        assert_eq!(NodeType::from_byte(0x02).unwrap(), NodeType::Leaf);
        assert!(NodeType::from_byte(0x00).is_err());
        assert!(NodeType::from_byte(0xFF).is_err());
    }

    #[test]
    fn leaf_header_fields_land_at_format_offsets() {
        let mut buf = [0u8; 32];

        {
            let header = LeafHeader::from_bytes_mut(&mut buf).unwrap();
            header.common_mut().set_node_type(NodeType::Leaf);
            header.common_mut().set_root(true);
            header.common_mut().set_parent(0xAABBCCDD);
            header.set_num_cells(5);
            header.set_next_leaf(9);
        }

        assert_eq!(buf[0], 0x02);
        assert_eq!(buf[1], 1);
        assert_eq!(&buf[2..6], &0xAABBCCDDu32.to_le_bytes());
        assert_eq!(&buf[6..10], &5u32.to_le_bytes());
        assert_eq!(&buf[10..14], &9u32.to_le_bytes());
    }

    #[test]
    fn internal_header_fields_land_at_format_offsets() {
        let mut buf = [0u8; 32];

        {
            let header = InternalHeader::from_bytes_mut(&mut buf).unwrap();
            header.common_mut().set_node_type(NodeType::Internal);
            header.set_num_keys(3);
            header.set_right_child(12);
        }

        assert_eq!(buf[0], 0x01);
        assert_eq!(buf[1], 0);
        assert_eq!(&buf[6..10], &3u32.to_le_bytes());
        assert_eq!(&buf[10..14], &12u32.to_le_bytes());
    }

    #[test]
    fn zeroed_page_has_no_valid_node_type() {
        let buf = [0u8; 16];
        assert!(node_type(&buf).is_err());
    }
}
