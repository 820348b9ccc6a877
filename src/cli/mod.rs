//! # RowanDB CLI Module
//!
//! The interactive shell around the engine, kept strictly outside the
//! storage and tree layers: it parses lines into typed statements, runs
//! them through the [`Database`](crate::Database) API, and formats typed
//! outcomes back to text.
//!
//! ```text
//! ┌────────────────────────────────────────────────┐
//! │              CLI Entry Point                    │
//! │              (bin/rowandb.rs)                   │
//! ├────────────────────────────────────────────────┤
//! │                 REPL Loop                       │
//! │  rustyline input · dispatch · result printing   │
//! ├───────────────┬───────────────┬────────────────┤
//! │  Statements   │  Dot commands │    History      │
//! │  insert/find/ │  .btree       │  ~/.rowandb_*   │
//! │  update/...   │  .validate    │                 │
//! └───────────────┴───────────────┴────────────────┘
//! ```

mod commands;
mod history;
mod repl;
mod statement;

pub use commands::{CommandHandler, CommandResult};
pub use repl::Repl;
pub use statement::{prepare, Statement, StatementError};
