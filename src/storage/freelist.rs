//! # Free-Page Chain
//!
//! Freed pages form a singly linked list threaded through the pages
//! themselves: the first 4 bytes of a free page hold the number of the next
//! free page, and 0 terminates the chain. The head lives in the file header.
//! The remaining 4092 bytes of a free page are undefined.
//!
//! ## Chain Operations
//!
//! Push and pop are performed by the pager (it owns the buffers); this
//! module defines the on-page link format and the structural validator.
//!
//! ```text
//! free_head ──> page 9 ──> page 4 ──> page 12 ──> 0
//!               [next=4]   [next=12]  [next=0]
//! ```
//!
//! ## Validation
//!
//! [`validate_chain`] walks the chain with a visited set and fails on a
//! repeated page (cycle), a page number outside the addressable range, or a
//! chain longer than the file has pages. It takes the next-pointer lookup
//! as a closure so the walk can be tested against an in-memory chain and
//! reused by the pager against cached pages.

use eyre::{bail, Result};
use hashbrown::HashSet;
use zerocopy::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::TABLE_MAX_PAGES;

/// The link stored in the first 4 bytes of every free page.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct FreeLink {
    next: U32,
}

const _: () = assert!(size_of::<FreeLink>() == 4);

impl FreeLink {
    /// Reads the next-pointer from a free page's buffer.
    pub fn read(page: &[u8]) -> Result<u32> {
        let link = Self::ref_from_bytes(&page[..size_of::<Self>()])
            .map_err(|e| eyre::eyre!("failed to read free-page link: {:?}", e))?;
        Ok(link.next.get())
    }

    /// Writes the next-pointer into a free page's buffer.
    pub fn write(page: &mut [u8], next: u32) -> Result<()> {
        let link = Self::mut_from_bytes(&mut page[..size_of::<Self>()])
            .map_err(|e| eyre::eyre!("failed to write free-page link: {:?}", e))?;
        link.next = U32::new(next);
        Ok(())
    }
}

/// Walks the free chain from `head`, returning its length. `fetch` resolves
/// a free page number to its next-pointer.
pub fn validate_chain<F>(head: u32, num_pages: u32, mut fetch: F) -> Result<u32>
where
    F: FnMut(u32) -> Result<u32>,
{
    let mut visited: HashSet<u32> = HashSet::new();
    let mut current = head;
    let mut length = 0u32;

    while current != 0 {
        if current >= TABLE_MAX_PAGES {
            bail!(
                "free chain references page {} beyond the addressable range",
                current
            );
        }
        if !visited.insert(current) {
            bail!("free chain cycles back to page {}", current);
        }
        length += 1;
        if length > num_pages {
            bail!(
                "free chain is longer than the file ({} pages)",
                num_pages
            );
        }
        current = fetch(current)?;
    }

    Ok(length)
}
