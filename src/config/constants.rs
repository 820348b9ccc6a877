//! # RowanDB Configuration Constants
//!
//! This module centralizes the on-disk geometry of the database. Every
//! constant below is part of the file format: a change here changes what
//! bytes mean on disk, so derived values are pinned with compile-time
//! assertions.
//!
//! ## Dependency Graph
//!
//! ```text
//! PAGE_SIZE (4096 bytes)
//!       │
//!       ├─> LEAF_NODE_SPACE_FOR_CELLS (PAGE_SIZE - LEAF_NODE_HEADER_SIZE)
//!       │         │
//!       │         └─> LEAF_NODE_MAX_CELLS (13 with the 295-byte cell)
//!       │                   │
//!       │                   └─> LEAF_NODE_MIN_CELLS (half, rounded down)
//!       │
//!       └─> INTERNAL_NODE_SPACE_FOR_CELLS (PAGE_SIZE - INTERNAL_NODE_HEADER_SIZE)
//!                 │
//!                 └─> INTERNAL_NODE_MAX_KEYS (510 with the 8-byte cell)
//!                           │
//!                           └─> INTERNAL_NODE_MIN_KEYS (half, rounded down)
//!
//! ROW_SIZE (291 bytes)
//!       │
//!       └─> LEAF_NODE_CELL_SIZE (key + row = 295 bytes)
//! ```
//!
//! ## File Layout
//!
//! ```text
//! Offset            Content
//! ------            -------
//! 0                 File header (8 bytes: root_page, free_head)
//! 8 + p * 4096      Page p (4096 bytes)
//! ```
//!
//! The file length is always exactly `8 + 4096 * num_pages`; anything else
//! is treated as corruption at open time.

// ============================================================================
// PAGE AND FILE GEOMETRY
// ============================================================================

/// Size of each database page in bytes. The unit of I/O and caching.
pub const PAGE_SIZE: usize = 4096;

/// Size of the file header preceding page 0: root page number plus
/// freelist head, both little-endian u32.
pub const FILE_HEADER_SIZE: usize = 8;

/// Upper bound on page numbers the pager will address (~400MB of data).
pub const TABLE_MAX_PAGES: u32 = 100_000;

/// Number of pages the cache holds in memory (400KB of buffers).
pub const PAGER_CACHE_CAPACITY: usize = 100;

// ============================================================================
// ROW GEOMETRY
// Fixed schema: id + username + email, serialized at fixed offsets
// ============================================================================

/// Maximum username length in bytes. Shorter values are NUL-padded.
pub const COLUMN_USERNAME_SIZE: usize = 32;

/// Maximum email length in bytes. Shorter values are NUL-padded.
pub const COLUMN_EMAIL_SIZE: usize = 255;

pub const ID_SIZE: usize = size_of::<u32>();
pub const ID_OFFSET: usize = 0;
pub const USERNAME_OFFSET: usize = ID_OFFSET + ID_SIZE;
pub const EMAIL_OFFSET: usize = USERNAME_OFFSET + COLUMN_USERNAME_SIZE;

/// Serialized row size: 4 + 32 + 255 = 291 bytes.
pub const ROW_SIZE: usize = ID_SIZE + COLUMN_USERNAME_SIZE + COLUMN_EMAIL_SIZE;

const _: () = assert!(ROW_SIZE == 291, "row layout drifted from the file format");

// ============================================================================
// COMMON NODE HEADER
// Present at offset 0 of every leaf and internal page
// ============================================================================

pub const NODE_TYPE_SIZE: usize = size_of::<u8>();
pub const NODE_TYPE_OFFSET: usize = 0;
pub const IS_ROOT_SIZE: usize = size_of::<u8>();
pub const IS_ROOT_OFFSET: usize = NODE_TYPE_OFFSET + NODE_TYPE_SIZE;
pub const PARENT_POINTER_SIZE: usize = size_of::<u32>();
pub const PARENT_POINTER_OFFSET: usize = IS_ROOT_OFFSET + IS_ROOT_SIZE;

/// node_type (1) | is_root (1) | parent_page (4) = 6 bytes.
pub const COMMON_NODE_HEADER_SIZE: usize =
    NODE_TYPE_SIZE + IS_ROOT_SIZE + PARENT_POINTER_SIZE;

// ============================================================================
// LEAF NODE LAYOUT
// ============================================================================

pub const LEAF_NODE_NUM_CELLS_SIZE: usize = size_of::<u32>();
pub const LEAF_NODE_NUM_CELLS_OFFSET: usize = COMMON_NODE_HEADER_SIZE;
pub const LEAF_NODE_NEXT_LEAF_SIZE: usize = size_of::<u32>();
pub const LEAF_NODE_NEXT_LEAF_OFFSET: usize =
    LEAF_NODE_NUM_CELLS_OFFSET + LEAF_NODE_NUM_CELLS_SIZE;

/// Common header + num_cells + next_leaf = 14 bytes.
pub const LEAF_NODE_HEADER_SIZE: usize =
    COMMON_NODE_HEADER_SIZE + LEAF_NODE_NUM_CELLS_SIZE + LEAF_NODE_NEXT_LEAF_SIZE;

pub const LEAF_NODE_KEY_SIZE: usize = size_of::<u32>();
pub const LEAF_NODE_VALUE_SIZE: usize = ROW_SIZE;

/// One leaf cell: key (4) | row (291) = 295 bytes.
pub const LEAF_NODE_CELL_SIZE: usize = LEAF_NODE_KEY_SIZE + LEAF_NODE_VALUE_SIZE;

pub const LEAF_NODE_SPACE_FOR_CELLS: usize = PAGE_SIZE - LEAF_NODE_HEADER_SIZE;

/// Cells per leaf: 4082 / 295 = 13.
pub const LEAF_NODE_MAX_CELLS: usize = LEAF_NODE_SPACE_FOR_CELLS / LEAF_NODE_CELL_SIZE;

/// Minimum occupancy of a non-root leaf (50% fill factor).
pub const LEAF_NODE_MIN_CELLS: usize = LEAF_NODE_MAX_CELLS / 2;

/// On split, the lower half keeps this many cells; the rest move to the
/// new right sibling before the incoming cell is placed.
pub const LEAF_NODE_SPLIT_AT: usize = (LEAF_NODE_MAX_CELLS + 1) / 2;

const _: () = assert!(LEAF_NODE_MAX_CELLS == 13, "leaf capacity drifted from the file format");
const _: () = assert!(LEAF_NODE_MIN_CELLS == 6);
const _: () = assert!(LEAF_NODE_SPLIT_AT == 7);

// ============================================================================
// INTERNAL NODE LAYOUT
// ============================================================================

pub const INTERNAL_NODE_NUM_KEYS_SIZE: usize = size_of::<u32>();
pub const INTERNAL_NODE_NUM_KEYS_OFFSET: usize = COMMON_NODE_HEADER_SIZE;
pub const INTERNAL_NODE_RIGHT_CHILD_SIZE: usize = size_of::<u32>();
pub const INTERNAL_NODE_RIGHT_CHILD_OFFSET: usize =
    INTERNAL_NODE_NUM_KEYS_OFFSET + INTERNAL_NODE_NUM_KEYS_SIZE;

/// Common header + num_keys + right_child = 14 bytes.
pub const INTERNAL_NODE_HEADER_SIZE: usize =
    COMMON_NODE_HEADER_SIZE + INTERNAL_NODE_NUM_KEYS_SIZE + INTERNAL_NODE_RIGHT_CHILD_SIZE;

pub const INTERNAL_NODE_KEY_SIZE: usize = size_of::<u32>();
pub const INTERNAL_NODE_CHILD_SIZE: usize = size_of::<u32>();

/// One internal cell: child pointer (4) | separator key (4) = 8 bytes.
pub const INTERNAL_NODE_CELL_SIZE: usize =
    INTERNAL_NODE_CHILD_SIZE + INTERNAL_NODE_KEY_SIZE;

pub const INTERNAL_NODE_SPACE_FOR_CELLS: usize = PAGE_SIZE - INTERNAL_NODE_HEADER_SIZE;

/// Keys per internal node: 4082 / 8 = 510.
pub const INTERNAL_NODE_MAX_KEYS: usize =
    INTERNAL_NODE_SPACE_FOR_CELLS / INTERNAL_NODE_CELL_SIZE;

/// Minimum occupancy of a non-root internal node (50% fill factor).
pub const INTERNAL_NODE_MIN_KEYS: usize = INTERNAL_NODE_MAX_KEYS / 2;

const _: () = assert!(
    INTERNAL_NODE_MAX_KEYS == 510,
    "internal capacity drifted from the file format"
);
const _: () = assert!(INTERNAL_NODE_MIN_KEYS == 255);

// A merged internal node absorbs its sibling's cells plus one cell for the
// survivor's former right child; the result must still fit in one page.
const _: () = assert!(
    INTERNAL_NODE_MIN_KEYS + (INTERNAL_NODE_MIN_KEYS - 1) + 1 <= INTERNAL_NODE_MAX_KEYS
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_are_fourteen_bytes() {
        assert_eq!(COMMON_NODE_HEADER_SIZE, 6);
        assert_eq!(LEAF_NODE_HEADER_SIZE, 14);
        assert_eq!(INTERNAL_NODE_HEADER_SIZE, 14);
    }

    #[test]
    fn leaf_cells_fit_in_one_page() {
        assert!(LEAF_NODE_HEADER_SIZE + LEAF_NODE_MAX_CELLS * LEAF_NODE_CELL_SIZE <= PAGE_SIZE);
    }

    #[test]
    fn internal_cells_fit_in_one_page() {
        assert!(
            INTERNAL_NODE_HEADER_SIZE + INTERNAL_NODE_MAX_KEYS * INTERNAL_NODE_CELL_SIZE
                <= PAGE_SIZE
        );
    }

    #[test]
    fn merged_leaves_fit_in_one_page() {
        // Merge fires when one leaf is below minimum and its sibling sits at
        // exactly the minimum.
        assert!(LEAF_NODE_MIN_CELLS + (LEAF_NODE_MIN_CELLS - 1) <= LEAF_NODE_MAX_CELLS);
    }
}
