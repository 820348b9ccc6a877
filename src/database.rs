//! # Database API
//!
//! [`Database`] is the public face of the engine: it owns the pager and
//! exposes the typed operations the command surface needs. One `Database`
//! value corresponds to one open file; dropping it without [`Database::close`]
//! abandons unflushed changes, which is exactly the durability contract:
//! changes are durable iff close completed.
//!
//! ## Outcome Types
//!
//! Input-level conditions are results, not errors: inserting an existing
//! key yields [`InsertOutcome::DuplicateKey`], lookups return `Option`,
//! update/delete return whether the key existed. `eyre` errors are
//! reserved for I/O failures, corruption, and internal invariant
//! violations.
//!
//! ## Construction
//!
//! ```ignore
//! let mut db = Database::builder()
//!     .path("./users.rdb")
//!     .cache_pages(64)
//!     .open()?;
//!
//! db.insert(&Row::new(1, "alice", "alice@example.com")?)?;
//! let rows = db.select()?;
//! db.close()?;
//! ```

use std::path::{Path, PathBuf};

use eyre::Result;

use crate::btree::{validate_tree, BTree, InsertOutcome, TreeInfo};
use crate::config::PAGER_CACHE_CAPACITY;
use crate::row::Row;
use crate::storage::Pager;

pub struct Database {
    pager: Pager,
}

/// Pager and cache snapshot surfaced by the `.debug` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugStats {
    pub num_pages: u32,
    pub root_page: u32,
    pub free_head: u32,
    pub cached_pages: usize,
    pub dirty_pages: usize,
}

#[derive(Debug, Default)]
pub struct DatabaseBuilder {
    path: Option<PathBuf>,
    cache_pages: Option<usize>,
}

impl DatabaseBuilder {
    pub fn path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Overrides the page-cache capacity (default 100 pages). Rebalancing
    /// needs a handful of pages resident at once, so tiny values are
    /// clamped.
    pub fn cache_pages(mut self, pages: usize) -> Self {
        self.cache_pages = Some(pages.max(8));
        self
    }

    pub fn open(self) -> Result<Database> {
        let path = self
            .path
            .ok_or_else(|| eyre::eyre!("no database path configured"))?;
        let cache_pages = self.cache_pages.unwrap_or(PAGER_CACHE_CAPACITY);

        let mut pager = Pager::open_with_capacity(&path, cache_pages)?;
        if pager.created() {
            BTree::init_root(&mut pager, 0)?;
        }

        Ok(Database { pager })
    }
}

impl Database {
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::default()
    }

    /// Opens (or creates) the database at `path` with default settings.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::builder().path(path).open()
    }

    pub fn insert(&mut self, row: &Row) -> Result<InsertOutcome> {
        let image = row.to_image();
        BTree::new(&mut self.pager).insert(row.id, &image)
    }

    pub fn find(&mut self, id: u32) -> Result<Option<Row>> {
        BTree::new(&mut self.pager).get(id)
    }

    /// Replaces the payload stored under `row.id`; false when absent.
    pub fn update(&mut self, row: &Row) -> Result<bool> {
        let image = row.to_image();
        BTree::new(&mut self.pager).update(row.id, &image)
    }

    pub fn delete(&mut self, id: u32) -> Result<bool> {
        BTree::new(&mut self.pager).remove(id)
    }

    /// Every row in ascending key order.
    pub fn select(&mut self) -> Result<Vec<Row>> {
        BTree::new(&mut self.pager).scan_all()
    }

    /// Rows with `lo <= id <= hi` in ascending key order. An empty
    /// interval yields no rows.
    pub fn range(&mut self, lo: u32, hi: u32) -> Result<Vec<Row>> {
        BTree::new(&mut self.pager).scan_range(lo, hi)
    }

    /// Full structural check: tree invariants plus the free chain.
    pub fn validate(&mut self) -> Result<TreeInfo> {
        validate_tree(&mut self.pager)
    }

    /// Indented dump of the tree for the `.btree` command.
    pub fn render_tree(&mut self) -> Result<String> {
        BTree::new(&mut self.pager).render()
    }

    pub fn stats(&self) -> DebugStats {
        DebugStats {
            num_pages: self.pager.num_pages(),
            root_page: self.pager.root_page(),
            free_head: self.pager.free_head(),
            cached_pages: self.pager.cached_pages(),
            dirty_pages: self.pager.dirty_pages(),
        }
    }

    pub fn num_pages(&self) -> u32 {
        self.pager.num_pages()
    }

    /// Flushes every dirty page, rewrites the file header, and syncs.
    pub fn close(self) -> Result<()> {
        self.pager.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn row(id: u32) -> Row {
        Row::new(id, format!("user{}", id), format!("user{}@example.com", id)).unwrap()
    }

    #[test]
    fn fresh_database_is_empty_and_valid() {
        let dir = tempdir().unwrap();
        let mut db = Database::open(dir.path().join("test.rdb")).unwrap();

        assert!(db.select().unwrap().is_empty());
        let info = db.validate().unwrap();
        assert_eq!(info.row_count, 0);
    }

    #[test]
    fn insert_find_update_delete_cycle() {
        let dir = tempdir().unwrap();
        let mut db = Database::open(dir.path().join("test.rdb")).unwrap();

        assert_eq!(db.insert(&row(1)).unwrap(), InsertOutcome::Inserted);
        assert_eq!(db.insert(&row(1)).unwrap(), InsertOutcome::DuplicateKey);

        assert_eq!(db.find(1).unwrap().unwrap().username, "user1");

        let renamed = Row::new(1, "renamed", "r@x").unwrap();
        assert!(db.update(&renamed).unwrap());
        assert_eq!(db.find(1).unwrap().unwrap().username, "renamed");

        assert!(db.delete(1).unwrap());
        assert!(!db.delete(1).unwrap());
        assert!(db.find(1).unwrap().is_none());
    }

    #[test]
    fn select_and_range_return_sorted_rows() {
        let dir = tempdir().unwrap();
        let mut db = Database::open(dir.path().join("test.rdb")).unwrap();

        for id in [5u32, 1, 9, 3, 7] {
            db.insert(&row(id)).unwrap();
        }

        let all: Vec<u32> = db.select().unwrap().iter().map(|r| r.id).collect();
        assert_eq!(all, vec![1, 3, 5, 7, 9]);

        let mid: Vec<u32> = db.range(3, 7).unwrap().iter().map(|r| r.id).collect();
        assert_eq!(mid, vec![3, 5, 7]);
    }

    #[test]
    fn close_and_reopen_preserves_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.rdb");

        let mut db = Database::open(&path).unwrap();
        for id in 1..=50 {
            db.insert(&row(id)).unwrap();
        }
        db.close().unwrap();

        let mut db = Database::open(&path).unwrap();
        let all: Vec<u32> = db.select().unwrap().iter().map(|r| r.id).collect();
        assert_eq!(all, (1..=50).collect::<Vec<_>>());
        db.validate().unwrap();
    }

    #[test]
    fn builder_respects_cache_capacity() {
        let dir = tempdir().unwrap();
        let mut db = Database::builder()
            .path(dir.path().join("test.rdb"))
            .cache_pages(16)
            .open()
            .unwrap();

        for id in 1..=200 {
            db.insert(&row(id)).unwrap();
        }
        assert!(db.stats().cached_pages <= 16);
        db.validate().unwrap();
    }

    #[test]
    fn debug_stats_reflect_pager_state() {
        let dir = tempdir().unwrap();
        let mut db = Database::open(dir.path().join("test.rdb")).unwrap();

        for id in 1..=20 {
            db.insert(&row(id)).unwrap();
        }

        let stats = db.stats();
        assert!(stats.num_pages >= 3);
        assert!(stats.dirty_pages > 0);
        assert_eq!(stats.free_head, 0);
    }
}
