//! # Pager
//!
//! The pager is the sole owner of the database file and of every in-memory
//! page buffer. All reads and writes of tree nodes go through
//! [`Pager::page`] / [`Pager::page_mut`]; all page lifecycle (allocation,
//! freeing, flushing) is decided here.
//!
//! ## Operations
//!
//! | Operation             | Effect                                          |
//! |-----------------------|-------------------------------------------------|
//! | `open`                | Open or create the file, load the header        |
//! | `page` / `page_mut`   | Cached access; miss faults the page in,         |
//! |                       | evicting (and writing back) the LRU if full     |
//! | `allocate_page`       | Pop the free chain, else extend the file        |
//! | `free_page`           | Push a page onto the free chain                 |
//! | `flush_page`          | Write one resident page through to disk         |
//! | `validate_free_chain` | Structural check of the free list               |
//! | `close`               | Flush dirty pages, rewrite header, fsync        |
//!
//! ## Growth
//!
//! Fetching a page at or past `num_pages` yields a zeroed buffer and
//! advances `num_pages`; the file itself grows when that page is first
//! written back. `allocate_page` therefore just returns `num_pages` when
//! the free chain is empty and lets the caller's first fetch do the bump.
//!
//! ## Borrow Discipline
//!
//! `page`/`page_mut` take `&mut self`, so at most one page buffer can be
//! borrowed at a time. Tree operations that need data from two pages at
//! once copy what they need out of the first before fetching the second.
//! Eviction on a cache miss is exactly why: the second fetch may steal the
//! first page's buffer.

use std::path::Path;

use eyre::{ensure, Result};

use crate::config::{PAGER_CACHE_CAPACITY, TABLE_MAX_PAGES};

use super::cache::zeroed_page;
use super::{DbFile, FileHeader, FreeLink, PageCache};

#[derive(Debug)]
pub struct Pager {
    file: DbFile,
    cache: PageCache,
    root_page: u32,
    free_head: u32,
    /// Logical page count; advances as soon as a page past the end is
    /// fetched.
    num_pages: u32,
    /// Pages actually present in the file; reads beyond this are
    /// zero-fills, and write-back advances it.
    file_pages: u32,
    created: bool,
}

impl Pager {
    /// Opens the database file at `path`, creating it if absent, with the
    /// default cache capacity.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_capacity(path, PAGER_CACHE_CAPACITY)
    }

    pub fn open_with_capacity<P: AsRef<Path>>(path: P, cache_pages: usize) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let mut file = DbFile::open(path)?;
            let num_pages = file.page_count()?;
            let header = file.read_header()?;

            Ok(Self {
                file,
                cache: PageCache::new(cache_pages),
                root_page: header.root_page(),
                free_head: header.free_head(),
                num_pages,
                file_pages: num_pages,
                created: false,
            })
        } else {
            let mut file = DbFile::create(path)?;
            file.write_header(&FileHeader::new(0, 0))?;
            file.write_page(0, zeroed_page().as_slice())?;

            Ok(Self {
                file,
                cache: PageCache::new(cache_pages),
                root_page: 0,
                free_head: 0,
                num_pages: 1,
                file_pages: 1,
                created: true,
            })
        }
    }

    /// True when this open created the file; the caller must initialize
    /// page 0 as the root node.
    pub fn created(&self) -> bool {
        self.created
    }

    pub fn root_page(&self) -> u32 {
        self.root_page
    }

    pub fn set_root_page(&mut self, page_no: u32) {
        self.root_page = page_no;
    }

    pub fn free_head(&self) -> u32 {
        self.free_head
    }

    pub fn num_pages(&self) -> u32 {
        self.num_pages
    }

    pub fn cached_pages(&self) -> usize {
        self.cache.len()
    }

    pub fn dirty_pages(&self) -> usize {
        self.cache.dirty_count()
    }

    /// Faults `page_no` into the cache if needed, evicting the LRU entry
    /// (with write-back if dirty) when at capacity.
    fn ensure_cached(&mut self, page_no: u32) -> Result<()> {
        ensure!(
            page_no < TABLE_MAX_PAGES,
            "page {} out of bounds (limit {})",
            page_no,
            TABLE_MAX_PAGES
        );

        if self.cache.contains(page_no) {
            return Ok(());
        }

        if self.cache.is_full() {
            if let Some((victim, buf, dirty)) = self.cache.evict_victim() {
                if dirty {
                    self.file.write_page(victim, buf.as_slice())?;
                    self.file_pages = self.file_pages.max(victim + 1);
                }
            }
        }

        // Pages past the on-disk end stay zeroed; the file grows when they
        // are first written back.
        let mut buf = zeroed_page();
        if page_no < self.file_pages {
            self.file.read_page(page_no, buf.as_mut_slice())?;
        }
        self.cache.insert(page_no, buf);

        if page_no >= self.num_pages {
            self.num_pages = page_no + 1;
        }

        Ok(())
    }

    pub fn page(&mut self, page_no: u32) -> Result<&[u8]> {
        self.ensure_cached(page_no)?;
        self.cache
            .get(page_no)
            .ok_or_else(|| eyre::eyre!("page {} vanished from cache", page_no))
    }

    /// Mutable access; the page is marked dirty as a side effect.
    pub fn page_mut(&mut self, page_no: u32) -> Result<&mut [u8]> {
        self.ensure_cached(page_no)?;
        self.cache
            .get_mut(page_no)
            .ok_or_else(|| eyre::eyre!("page {} vanished from cache", page_no))
    }

    pub fn mark_dirty(&mut self, page_no: u32) {
        self.cache.mark_dirty(page_no);
    }

    /// Writes one page through to disk. Flushing a page that is not
    /// resident is a programming error and is reported as such.
    pub fn flush_page(&mut self, page_no: u32) -> Result<()> {
        let Self {
            ref mut file,
            ref cache,
            ..
        } = *self;

        let data = cache.peek(page_no).ok_or_else(|| {
            eyre::eyre!("cannot flush page {}: not resident in cache", page_no)
        })?;
        file.write_page(page_no, data)?;
        self.file_pages = self.file_pages.max(page_no + 1);
        self.cache.clear_dirty(page_no);

        Ok(())
    }

    /// Returns a reusable page number: the head of the free chain when one
    /// exists (its buffer is zeroed and marked dirty), otherwise the next
    /// page past the end of the file.
    pub fn allocate_page(&mut self) -> Result<u32> {
        if self.free_head == 0 {
            return Ok(self.num_pages);
        }

        let page_no = self.free_head;
        let next = FreeLink::read(self.page(page_no)?)?;
        self.free_head = next;

        self.page_mut(page_no)?.fill(0);

        Ok(page_no)
    }

    /// Pushes `page_no` onto the free chain.
    pub fn free_page(&mut self, page_no: u32) -> Result<()> {
        let head = self.free_head;
        FreeLink::write(self.page_mut(page_no)?, head)?;
        self.free_head = page_no;
        Ok(())
    }

    /// Walks the free chain, failing on a cycle, an out-of-range page, or
    /// a chain longer than the file. Returns the chain length.
    pub fn validate_free_chain(&mut self) -> Result<u32> {
        let head = self.free_head;
        let num_pages = self.num_pages;

        super::validate_chain(head, num_pages, |page_no| {
            FreeLink::read(self.page(page_no)?)
        })
    }

    /// Flushes every dirty page, rewrites the file header, and syncs.
    /// Changes are durable exactly when this returns `Ok`.
    pub fn close(mut self) -> Result<()> {
        let Self {
            ref mut file,
            ref mut cache,
            root_page,
            free_head,
            ..
        } = self;

        cache.flush_dirty(|page_no, data| file.write_page(page_no, data))?;
        file.write_header(&FileHeader::new(root_page, free_head))?;
        file.sync()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PAGE_SIZE;
    use tempfile::tempdir;

    fn scratch_pager(cache_pages: usize) -> (tempfile::TempDir, Pager) {
        let dir = tempdir().unwrap();
        let pager =
            Pager::open_with_capacity(dir.path().join("test.rdb"), cache_pages).unwrap();
        (dir, pager)
    }

    #[test]
    fn open_creates_file_with_one_zeroed_page() {
        let (_dir, mut pager) = scratch_pager(4);

        assert!(pager.created());
        assert_eq!(pager.num_pages(), 1);
        assert_eq!(pager.root_page(), 0);
        assert_eq!(pager.free_head(), 0);
        assert!(pager.page(0).unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn reopen_loads_persisted_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.rdb");

        let mut pager = Pager::open(&path).unwrap();
        pager.page_mut(0).unwrap()[100] = 7;
        pager.set_root_page(0);
        pager.close().unwrap();

        let mut pager = Pager::open(&path).unwrap();
        assert!(!pager.created());
        assert_eq!(pager.num_pages(), 1);
        assert_eq!(pager.page(0).unwrap()[100], 7);
    }

    #[test]
    fn fetch_past_end_zero_fills_and_grows() {
        let (_dir, mut pager) = scratch_pager(4);

        let data = pager.page(2).unwrap();
        assert!(data.iter().all(|&b| b == 0));
        assert_eq!(pager.num_pages(), 3);
    }

    #[test]
    fn page_out_of_bounds_is_rejected() {
        let (_dir, mut pager) = scratch_pager(4);

        let result = pager.page(TABLE_MAX_PAGES);

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("out of bounds"));
    }

    #[test]
    fn eviction_writes_back_dirty_pages() {
        let (_dir, mut pager) = scratch_pager(2);

        pager.page_mut(0).unwrap()[0] = 0xAA;

        // Two more fetches with capacity 2 force page 0 out of the cache.
        pager.page(1).unwrap();
        pager.page(2).unwrap();
        assert_eq!(pager.cached_pages(), 2);

        // Reading it back must observe the evicted write.
        assert_eq!(pager.page(0).unwrap()[0], 0xAA);
    }

    #[test]
    fn allocate_extends_file_when_chain_empty() {
        let (_dir, mut pager) = scratch_pager(4);

        let page_no = pager.allocate_page().unwrap();
        assert_eq!(page_no, 1);

        // The bump happens on first fetch.
        pager.page_mut(page_no).unwrap();
        assert_eq!(pager.num_pages(), 2);
    }

    #[test]
    fn freed_pages_are_reused_in_lifo_order() {
        let (_dir, mut pager) = scratch_pager(8);

        for page_no in 1..=3 {
            pager.page_mut(page_no).unwrap();
        }
        pager.free_page(1).unwrap();
        pager.free_page(2).unwrap();
        assert_eq!(pager.free_head(), 2);

        assert_eq!(pager.allocate_page().unwrap(), 2);
        assert_eq!(pager.allocate_page().unwrap(), 1);
        assert_eq!(pager.free_head(), 0);
        assert_eq!(pager.allocate_page().unwrap(), 4);
    }

    #[test]
    fn allocate_from_chain_zeroes_the_buffer() {
        let (_dir, mut pager) = scratch_pager(4);

        pager.page_mut(1).unwrap().fill(0xFF);
        pager.free_page(1).unwrap();

        let page_no = pager.allocate_page().unwrap();
        assert_eq!(page_no, 1);
        assert!(pager.page(1).unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn validate_free_chain_accepts_straight_chain() {
        let (_dir, mut pager) = scratch_pager(8);

        for page_no in 1..=3 {
            pager.page_mut(page_no).unwrap();
            pager.free_page(page_no).unwrap();
        }

        assert_eq!(pager.validate_free_chain().unwrap(), 3);
    }

    #[test]
    fn validate_free_chain_detects_cycle() {
        let (_dir, mut pager) = scratch_pager(8);

        pager.page_mut(1).unwrap();
        pager.page_mut(2).unwrap();
        pager.free_page(1).unwrap();
        pager.free_page(2).unwrap();

        // Corrupt the tail to point back at the head.
        FreeLink::write(pager.page_mut(1).unwrap(), 2).unwrap();

        let result = pager.validate_free_chain();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("cycle"));
    }

    #[test]
    fn flush_of_uncached_page_is_an_error() {
        let (_dir, mut pager) = scratch_pager(2);

        let result = pager.flush_page(50);

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("not resident"));
    }

    #[test]
    fn close_persists_dirty_pages_and_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.rdb");

        let mut pager = Pager::open(&path).unwrap();
        pager.page_mut(3).unwrap()[10] = 0x5A;
        pager.free_page(2).unwrap();
        pager.set_root_page(1);
        pager.close().unwrap();

        let mut pager = Pager::open(&path).unwrap();
        assert_eq!(pager.root_page(), 1);
        assert_eq!(pager.free_head(), 2);
        assert_eq!(pager.num_pages(), 4);
        assert_eq!(pager.page(3).unwrap()[10], 0x5A);
    }

    #[test]
    fn reopen_rejects_torn_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.rdb");

        let pager = Pager::open(&path).unwrap();
        pager.close().unwrap();

        // Append garbage that is not a whole page.
        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len((8 + PAGE_SIZE + 17) as u64).unwrap();

        let result = Pager::open(&path);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("not a whole number of pages"));
    }
}
