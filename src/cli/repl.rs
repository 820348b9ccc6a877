//! # REPL - Read-Eval-Print Loop
//!
//! The interactive loop for the RowanDB CLI:
//!
//! - reads input with rustyline (history, line editing)
//! - dispatches dot commands vs statements
//! - executes statements against the [`Database`] and prints typed
//!   outcomes
//!
//! ## Output Contract
//!
//! Rows print as `(id, username, email)`. Statement outcomes print
//! exactly one status line (`Executed.`, `Error: Duplicate key.`,
//! `Error: Record not found.`) and scans append a row-count trailer
//! (`Total rows: N` / `Total rows in range: N`). Parse failures print
//! their own message and never reach the engine.
//!
//! ## Exit
//!
//! `.exit`, `.quit`, and end-of-input all flush and close the database;
//! durability is defined by that close completing. Ctrl+C clears the line
//! and continues.

use eyre::{Result, WrapErr};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::btree::InsertOutcome;
use crate::cli::commands::{CommandHandler, CommandResult};
use crate::cli::history::HistoryMode;
use crate::cli::statement::{self, Statement};
use crate::row::Row;
use crate::Database;

const PROMPT: &str = "db > ";

pub struct Repl {
    db: Database,
    editor: DefaultEditor,
    history: HistoryMode,
}

impl Repl {
    pub fn new(db: Database) -> Result<Self> {
        let mut editor = DefaultEditor::new().wrap_err("failed to initialize line editor")?;

        let history = HistoryMode::resolve();
        if let Some(file) = history.file() {
            let _ = editor.load_history(file);
        }

        Ok(Self {
            db,
            editor,
            history,
        })
    }

    /// Runs until `.exit` or end-of-input, then closes the database.
    pub fn run(mut self) -> Result<()> {
        loop {
            match self.editor.readline(PROMPT) {
                Ok(line) => {
                    if !self.handle_line(&line)? {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                }
                Err(ReadlineError::Eof) => {
                    break;
                }
                Err(err) => {
                    eprintln!("Error reading input: {}", err);
                    break;
                }
            }
        }

        self.save_history();
        self.db.close().wrap_err("failed to close database")
    }

    fn handle_line(&mut self, line: &str) -> Result<bool> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(true);
        }

        self.editor.add_history_entry(trimmed).ok();

        if CommandHandler::is_command(trimmed) {
            return Ok(self.execute_command(trimmed));
        }

        match statement::prepare(trimmed) {
            Ok(statement) => self.execute_statement(statement)?,
            Err(e) => println!("{}", e),
        }

        Ok(true)
    }

    fn execute_command(&mut self, input: &str) -> bool {
        match CommandHandler::execute(input, &mut self.db) {
            CommandResult::Exit => false,
            CommandResult::Output(text) => {
                println!("{}", text);
                true
            }
            CommandResult::Error(message) => {
                eprintln!("Error: {}", message);
                true
            }
        }
    }

    fn execute_statement(&mut self, statement: Statement) -> Result<()> {
        match statement {
            Statement::Insert(row) => match self.db.insert(&row)? {
                InsertOutcome::Inserted => println!("Executed."),
                InsertOutcome::DuplicateKey => println!("Error: Duplicate key."),
            },
            Statement::Select => {
                let rows = self.db.select()?;
                print_rows(&rows);
                println!("Total rows: {}", rows.len());
                println!("Executed.");
            }
            Statement::Find(id) => match self.db.find(id)? {
                Some(row) => {
                    println!("{}", row);
                    println!("Executed.");
                }
                None => println!("Error: Record not found."),
            },
            Statement::Update(row) => {
                if self.db.update(&row)? {
                    println!("Executed.");
                } else {
                    println!("Error: Record not found.");
                }
            }
            Statement::Delete(id) => {
                if self.db.delete(id)? {
                    println!("Executed.");
                } else {
                    println!("Error: Record not found.");
                }
            }
            Statement::Range(lo, hi) => {
                let rows = self.db.range(lo, hi)?;
                print_rows(&rows);
                println!("Total rows in range: {}", rows.len());
                println!("Executed.");
            }
        }

        Ok(())
    }

    fn save_history(&mut self) {
        if let Some(file) = self.history.file() {
            if let Err(e) = self.editor.save_history(file) {
                eprintln!("Warning: could not save history: {}", e);
            }
        }
    }
}

fn print_rows(rows: &[Row]) {
    for row in rows {
        println!("{}", row);
    }
}
