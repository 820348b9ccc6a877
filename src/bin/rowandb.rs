//! # RowanDB CLI Entry Point
//!
//! ```bash
//! # Open or create a database file
//! rowandb ./users.rdb
//!
//! # Show version / help
//! rowandb --version
//! rowandb --help
//! ```
//!
//! Exits 0 on a clean `.exit` (or end of input) and 1 on fatal pager
//! errors such as an unopenable or corrupt file.

use std::env;
use std::path::PathBuf;

use eyre::{bail, Result};
use rowandb::cli::Repl;
use rowandb::Database;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    let mut db_path: Option<PathBuf> = None;
    for arg in &args[1..] {
        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                return Ok(());
            }
            "--version" | "-v" => {
                println!("rowandb {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            flag if flag.starts_with('-') => {
                bail!("Unknown option: {}", flag);
            }
            path => {
                if db_path.is_some() {
                    bail!("Multiple database paths specified");
                }
                db_path = Some(PathBuf::from(path));
            }
        }
    }

    let db_path = match db_path {
        Some(path) => path,
        None => {
            bail!("Must supply a database filename.");
        }
    };

    let db = Database::open(&db_path)?;
    Repl::new(db)?.run()
}

fn print_usage() {
    println!("RowanDB - single-file B+Tree row store");
    println!();
    println!("USAGE:");
    println!("    rowandb [OPTIONS] <DATABASE_PATH>");
    println!();
    println!("ARGS:");
    println!("    <DATABASE_PATH>    Path to the database file (created if absent)");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help         Print help information");
    println!("    -v, --version      Print version information");
}
