//! # LRU Page Cache
//!
//! A fixed-capacity cache of page buffers with least-recently-used
//! eviction and per-page dirty tracking. The cache is pure bookkeeping: it
//! never touches the file. When an insert would exceed capacity, the caller
//! asks for the eviction victim and is responsible for writing it back if
//! it is dirty.
//!
//! ## Recency Tracking
//!
//! Every access stamps the entry with a monotonically increasing counter;
//! the eviction victim is the entry with the smallest stamp. A hit is O(1)
//! and victim selection is a linear scan, which at the fixed capacity of
//! 100 entries is cheaper and simpler than maintaining an intrusive list.
//!
//! ## Dirty Tracking
//!
//! `get_mut` marks the page dirty as a side effect, so every mutation path
//! through the pager is covered without the tree code having to remember a
//! separate call. Eviction and flush report and clear the flag.
//!
//! ## Interaction with the Pager
//!
//! ```text
//! pager.page_mut(p)
//!   ├── hit  → touch, mark dirty, return buffer
//!   └── miss → if full: evict_victim() ──(dirty?)──> pager writes back
//!              read or zero-fill buffer, insert at most-recent
//! ```

use hashbrown::HashMap;

use crate::config::PAGE_SIZE;

/// An owned 4096-byte page buffer.
pub type PageBuf = Box<[u8; PAGE_SIZE]>;

pub fn zeroed_page() -> PageBuf {
    Box::new([0u8; PAGE_SIZE])
}

#[derive(Debug)]
struct CacheEntry {
    data: PageBuf,
    dirty: bool,
    stamp: u64,
}

#[derive(Debug)]
pub struct PageCache {
    entries: HashMap<u32, CacheEntry>,
    capacity: usize,
    tick: u64,
}

impl PageCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            capacity: capacity.max(1),
            tick: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn contains(&self, page_no: u32) -> bool {
        self.entries.contains_key(&page_no)
    }

    fn next_stamp(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Returns the cached page and promotes it to most-recently-used.
    pub fn get(&mut self, page_no: u32) -> Option<&[u8]> {
        let stamp = self.next_stamp();
        let entry = self.entries.get_mut(&page_no)?;
        entry.stamp = stamp;
        Some(entry.data.as_slice())
    }

    /// Returns the cached page mutably, promoting it and marking it dirty.
    pub fn get_mut(&mut self, page_no: u32) -> Option<&mut [u8]> {
        let stamp = self.next_stamp();
        let entry = self.entries.get_mut(&page_no)?;
        entry.stamp = stamp;
        entry.dirty = true;
        Some(entry.data.as_mut_slice())
    }

    /// Inserts a freshly loaded buffer at most-recently-used. The caller
    /// must have evicted first if the cache was full.
    pub fn insert(&mut self, page_no: u32, data: PageBuf) {
        debug_assert!(
            self.entries.len() < self.capacity,
            "insert into full cache"
        );
        let stamp = self.next_stamp();
        self.entries.insert(
            page_no,
            CacheEntry {
                data,
                dirty: false,
                stamp,
            },
        );
    }

    /// Removes and returns the least-recently-used entry:
    /// `(page_no, buffer, was_dirty)`.
    pub fn evict_victim(&mut self) -> Option<(u32, PageBuf, bool)> {
        let victim = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.stamp)
            .map(|(&page_no, _)| page_no)?;

        let entry = self.entries.remove(&victim)?;
        Some((victim, entry.data, entry.dirty))
    }

    pub fn mark_dirty(&mut self, page_no: u32) {
        if let Some(entry) = self.entries.get_mut(&page_no) {
            entry.dirty = true;
        }
    }

    pub fn is_dirty(&self, page_no: u32) -> bool {
        self.entries
            .get(&page_no)
            .map(|entry| entry.dirty)
            .unwrap_or(false)
    }

    pub fn clear_dirty(&mut self, page_no: u32) {
        if let Some(entry) = self.entries.get_mut(&page_no) {
            entry.dirty = false;
        }
    }

    pub fn dirty_count(&self) -> usize {
        self.entries.values().filter(|entry| entry.dirty).count()
    }

    /// Reads a page without promoting it; used by flush paths.
    pub fn peek(&self, page_no: u32) -> Option<&[u8]> {
        self.entries.get(&page_no).map(|entry| entry.data.as_slice())
    }

    /// Writes every dirty page through `flush_fn` in page order and clears
    /// the flags. Page order keeps flushes deterministic.
    pub fn flush_dirty<F>(&mut self, mut flush_fn: F) -> eyre::Result<usize>
    where
        F: FnMut(u32, &[u8]) -> eyre::Result<()>,
    {
        let mut dirty: Vec<u32> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.dirty)
            .map(|(&page_no, _)| page_no)
            .collect();
        dirty.sort_unstable();

        for page_no in &dirty {
            let entry = self
                .entries
                .get_mut(page_no)
                .ok_or_else(|| eyre::eyre!("dirty page {} vanished from cache", page_no))?;
            flush_fn(*page_no, entry.data.as_slice())?;
            entry.dirty = false;
        }

        Ok(dirty.len())
    }
}
