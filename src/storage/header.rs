//! # File Header
//!
//! The first 8 bytes of a RowanDB file hold the only metadata the engine
//! needs to find everything else: the root page of the B+Tree and the head
//! of the free-page chain.
//!
//! ## Layout (8 bytes at offset 0)
//!
//! ```text
//! Offset  Size  Field       Description
//! ------  ----  ----------  ---------------------------------------
//! 0       4     root_page   Page number of the B+Tree root
//! 4       4     free_head   First free page (0 = chain is empty)
//! ```
//!
//! Both fields are little-endian u32. There is no magic number or version
//! field; the format is closed and the length check at open time is the
//! corruption guard. The header is rewritten once, at close, after all
//! dirty pages have been flushed.

use eyre::{ensure, Result};
use zerocopy::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::FILE_HEADER_SIZE;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct FileHeader {
    root_page: U32,
    free_head: U32,
}

const _: () = assert!(size_of::<FileHeader>() == FILE_HEADER_SIZE);

impl FileHeader {
    pub fn new(root_page: u32, free_head: u32) -> Self {
        Self {
            root_page: U32::new(root_page),
            free_head: U32::new(free_head),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        ensure!(
            bytes.len() >= FILE_HEADER_SIZE,
            "buffer too small for FileHeader: {} < {}",
            bytes.len(),
            FILE_HEADER_SIZE
        );

        Self::ref_from_bytes(&bytes[..FILE_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to read FileHeader: {:?}", e))
    }

    pub fn write_to(&self, bytes: &mut [u8]) -> Result<()> {
        ensure!(
            bytes.len() >= FILE_HEADER_SIZE,
            "buffer too small for FileHeader: {} < {}",
            bytes.len(),
            FILE_HEADER_SIZE
        );

        bytes[..FILE_HEADER_SIZE].copy_from_slice(self.as_bytes());
        Ok(())
    }

    pub fn root_page(&self) -> u32 {
        self.root_page.get()
    }

    pub fn free_head(&self) -> u32 {
        self.free_head.get()
    }
}
