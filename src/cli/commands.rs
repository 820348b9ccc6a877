//! # Dot Command Handler
//!
//! Parses and executes the SQLite-style dot commands for introspection and
//! CLI control. Dot commands bypass the statement parser entirely.
//!
//! ## Supported Commands
//!
//! | Command            | Description                                   |
//! |--------------------|-----------------------------------------------|
//! | `.exit` / `.quit`  | Flush, close the database, leave the REPL     |
//! | `.btree`           | Print the tree, one indented line per node    |
//! | `.validate`        | Run the structural validator                  |
//! | `.constants`       | Print the row/node geometry                   |
//! | `.debug`           | Print pager state                             |
//! | `.help`            | Show available commands                       |
//!
//! Unrecognized commands report an error but keep the REPL alive.

use std::fmt::Write;

use crate::config::{
    COMMON_NODE_HEADER_SIZE, INTERNAL_NODE_HEADER_SIZE, INTERNAL_NODE_MAX_KEYS,
    LEAF_NODE_CELL_SIZE, LEAF_NODE_HEADER_SIZE, LEAF_NODE_MAX_CELLS, LEAF_NODE_SPACE_FOR_CELLS,
    ROW_SIZE,
};
use crate::Database;

#[derive(Debug, PartialEq, Eq)]
pub enum CommandResult {
    Output(String),
    Exit,
    Error(String),
}

pub struct CommandHandler;

impl CommandHandler {
    pub fn is_command(input: &str) -> bool {
        input.trim().starts_with('.')
    }

    pub fn execute(input: &str, db: &mut Database) -> CommandResult {
        let mut parts = input.trim().split_whitespace();
        let command = match parts.next() {
            Some(command) => command.to_lowercase(),
            None => return CommandResult::Error("empty command".to_string()),
        };

        match command.as_str() {
            ".exit" | ".quit" => CommandResult::Exit,
            ".help" => CommandResult::Output(help_text()),
            ".btree" => render_tree(db),
            ".validate" => validate(db),
            ".constants" => CommandResult::Output(constants_text()),
            ".debug" => CommandResult::Output(debug_text(db)),
            other => CommandResult::Error(format!(
                "Unrecognized command '{}'. Type .help for available commands.",
                other
            )),
        }
    }
}

fn help_text() -> String {
    r#"RowanDB commands:

  .exit, .quit     Flush all changes and leave
  .btree           Print the B+Tree structure
  .validate        Check every structural invariant
  .constants       Print the on-disk layout constants
  .debug           Print pager and cache state
  .help            Show this help message

Statements:
  insert <id> <username> <email>
  select
  find <id>
  update <id> <username> <email>
  delete <id>
  range <lo> <hi>"#
        .to_string()
}

fn render_tree(db: &mut Database) -> CommandResult {
    match db.render_tree() {
        Ok(rendered) => CommandResult::Output(format!("Tree:\n{}", rendered.trim_end())),
        Err(e) => CommandResult::Error(format!("could not render tree: {}", e)),
    }
}

fn validate(db: &mut Database) -> CommandResult {
    match db.validate() {
        Ok(info) => CommandResult::Output(format!(
            "Tree structure is valid!\nDepth: {}\nRows: {}\nReachable pages: {}\nFree pages: {}",
            info.depth, info.row_count, info.reachable_pages, info.free_pages
        )),
        Err(e) => CommandResult::Error(format!("Tree validation FAILED: {}", e)),
    }
}

fn constants_text() -> String {
    let mut out = String::from("Constants:\n");
    writeln!(out, "ROW_SIZE: {}", ROW_SIZE).ok();
    writeln!(out, "COMMON_NODE_HEADER_SIZE: {}", COMMON_NODE_HEADER_SIZE).ok();
    writeln!(out, "LEAF_NODE_HEADER_SIZE: {}", LEAF_NODE_HEADER_SIZE).ok();
    writeln!(out, "LEAF_NODE_CELL_SIZE: {}", LEAF_NODE_CELL_SIZE).ok();
    writeln!(out, "LEAF_NODE_SPACE_FOR_CELLS: {}", LEAF_NODE_SPACE_FOR_CELLS).ok();
    writeln!(out, "LEAF_NODE_MAX_CELLS: {}", LEAF_NODE_MAX_CELLS).ok();
    writeln!(out, "INTERNAL_NODE_HEADER_SIZE: {}", INTERNAL_NODE_HEADER_SIZE).ok();
    writeln!(out, "INTERNAL_NODE_MAX_KEYS: {}", INTERNAL_NODE_MAX_KEYS).ok();
    out.trim_end().to_string()
}

fn debug_text(db: &Database) -> String {
    let stats = db.stats();
    let mut out = String::from("Pager:\n");
    writeln!(out, "num_pages: {}", stats.num_pages).ok();
    writeln!(out, "root_page: {}", stats.root_page).ok();
    writeln!(out, "free_head: {}", stats.free_head).ok();
    writeln!(out, "cached_pages: {}", stats.cached_pages).ok();
    writeln!(out, "dirty_pages: {}", stats.dirty_pages).ok();
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::Row;
    use tempfile::tempdir;

    fn scratch_db() -> (tempfile::TempDir, Database) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("test.rdb")).unwrap();
        (dir, db)
    }

    #[test]
    fn detects_dot_commands() {
        assert!(CommandHandler::is_command(".exit"));
        assert!(CommandHandler::is_command("  .btree"));
        assert!(!CommandHandler::is_command("select"));
    }

    #[test]
    fn exit_and_quit_terminate() {
        let (_dir, mut db) = scratch_db();

        assert_eq!(CommandHandler::execute(".exit", &mut db), CommandResult::Exit);
        assert_eq!(CommandHandler::execute(".quit", &mut db), CommandResult::Exit);
        assert_eq!(CommandHandler::execute(".EXIT", &mut db), CommandResult::Exit);
    }

    #[test]
    fn validate_reports_success_on_healthy_tree() {
        let (_dir, mut db) = scratch_db();
        for id in 1..=20 {
            db.insert(&Row::new(id, "u", "e@x").unwrap()).unwrap();
        }

        match CommandHandler::execute(".validate", &mut db) {
            CommandResult::Output(text) => {
                assert!(text.contains("Tree structure is valid!"));
                assert!(text.contains("Rows: 20"));
            }
            other => panic!("expected output, got {:?}", other),
        }
    }

    #[test]
    fn constants_lists_the_layout() {
        let (_dir, mut db) = scratch_db();

        match CommandHandler::execute(".constants", &mut db) {
            CommandResult::Output(text) => {
                assert!(text.contains("ROW_SIZE: 291"));
                assert!(text.contains("LEAF_NODE_MAX_CELLS: 13"));
                assert!(text.contains("INTERNAL_NODE_MAX_KEYS: 510"));
            }
            other => panic!("expected output, got {:?}", other),
        }
    }

    #[test]
    fn unknown_command_is_an_error() {
        let (_dir, mut db) = scratch_db();

        match CommandHandler::execute(".bogus", &mut db) {
            CommandResult::Error(message) => assert!(message.contains(".bogus")),
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn btree_renders_empty_root() {
        let (_dir, mut db) = scratch_db();

        match CommandHandler::execute(".btree", &mut db) {
            CommandResult::Output(text) => assert!(text.contains("leaf (page 0, size 0)")),
            other => panic!("expected output, got {:?}", other),
        }
    }
}
