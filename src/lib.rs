//! # RowanDB - Single-File B+Tree Row Store
//!
//! RowanDB is a small persistent key-value store: one file, fixed
//! 4096-byte pages organized as a B+Tree, an in-memory LRU page cache
//! with write-back, and a persistent free-page chain. Records carry a
//! `u32` primary key and a fixed text payload.
//!
//! ## Quick Start
//!
//! ```ignore
//! use rowandb::{Database, Row};
//!
//! let mut db = Database::open("./users.rdb")?;
//! db.insert(&Row::new(1, "alice", "alice@example.com")?)?;
//!
//! for row in db.select()? {
//!     println!("{}", row);
//! }
//! db.close()?; // durability is defined by this completing
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │        Public API (Database)         │
//! ├─────────────────────────────────────┤
//! │   B+Tree (search/split/rebalance)    │
//! ├─────────────────────────────────────┤
//! │  Pager (LRU cache · free chain ·     │
//! │         dirty tracking)              │
//! ├─────────────────────────────────────┤
//! │        Page file I/O (DbFile)        │
//! └─────────────────────────────────────┘
//! ```
//!
//! Single-writer, single-reader: no locks, no WAL. Changes become durable
//! exactly when [`Database::close`] completes.
//!
//! ## Module Overview
//!
//! - [`storage`]: the pager stack (file I/O, page cache, free chain)
//! - [`btree`]: node formats and the tree algorithms
//! - [`row`]: the fixed 291-byte record and its validation
//! - [`cli`]: the interactive shell
//! - [`config`]: every on-disk layout constant

pub mod btree;
pub mod cli;
pub mod config;
pub mod row;
pub mod storage;

mod database;

pub use btree::{InsertOutcome, TreeInfo};
pub use database::{Database, DatabaseBuilder, DebugStats};
pub use row::{Row, RowError};
