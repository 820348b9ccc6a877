//! # Statement Parser
//!
//! Turns one input line into a typed [`Statement`]. The grammar is
//! whitespace-separated and deliberately small:
//!
//! ```text
//! insert <id> <username> <email>
//! select
//! find <id>
//! update <id> <username> <email>
//! delete <id>
//! range <lo> <hi>
//! ```
//!
//! Parse failures are typed so the REPL can print the exact message each
//! deserves; none of them touch the engine.

use std::fmt;

use crate::row::{Row, RowError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Insert(Row),
    Select,
    Find(u32),
    Update(Row),
    Delete(u32),
    Range(u32, u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementError {
    /// Wrong shape: missing arguments, unparsable numbers.
    Syntax,
    /// A field exceeds its fixed slot.
    StringTooLong,
    /// The line does not begin with a known keyword.
    Unrecognized(String),
    /// `range` with start greater than end.
    InvertedRange,
}

impl fmt::Display for StatementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatementError::Syntax => write!(f, "Syntax error. Could not parse statement."),
            StatementError::StringTooLong => write!(f, "Error: String is too long."),
            StatementError::Unrecognized(line) => {
                write!(f, "Unrecognized keyword at start of '{}'.", line)
            }
            StatementError::InvertedRange => {
                write!(f, "Error: Range start must not exceed range end.")
            }
        }
    }
}

pub fn prepare(input: &str) -> Result<Statement, StatementError> {
    let tokens: Vec<&str> = input.split_whitespace().collect();

    match tokens.as_slice() {
        ["insert", id, username, email] => {
            Ok(Statement::Insert(parse_row(id, username, email)?))
        }
        ["insert", ..] => Err(StatementError::Syntax),

        ["select"] => Ok(Statement::Select),
        ["select", ..] => Err(StatementError::Syntax),

        ["find", id] => Ok(Statement::Find(parse_id(id)?)),
        ["find", ..] => Err(StatementError::Syntax),

        ["update", id, username, email] => {
            Ok(Statement::Update(parse_row(id, username, email)?))
        }
        ["update", ..] => Err(StatementError::Syntax),

        ["delete", id] => Ok(Statement::Delete(parse_id(id)?)),
        ["delete", ..] => Err(StatementError::Syntax),

        ["range", lo, hi] => {
            let lo = parse_id(lo)?;
            let hi = parse_id(hi)?;
            if lo > hi {
                return Err(StatementError::InvertedRange);
            }
            Ok(Statement::Range(lo, hi))
        }
        ["range", ..] => Err(StatementError::Syntax),

        _ => Err(StatementError::Unrecognized(input.trim().to_string())),
    }
}

fn parse_id(token: &str) -> Result<u32, StatementError> {
    token.parse::<u32>().map_err(|_| StatementError::Syntax)
}

fn parse_row(id: &str, username: &str, email: &str) -> Result<Row, StatementError> {
    let id = parse_id(id)?;
    Row::new(id, username, email).map_err(|e| match e {
        RowError::UsernameTooLong { .. } | RowError::EmailTooLong { .. } => {
            StatementError::StringTooLong
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_insert() {
        let statement = prepare("insert 1 alice alice@example.com").unwrap();

        match statement {
            Statement::Insert(row) => {
                assert_eq!(row.id, 1);
                assert_eq!(row.username, "alice");
                assert_eq!(row.email, "alice@example.com");
            }
            other => panic!("expected insert, got {:?}", other),
        }
    }

    #[test]
    fn parses_simple_statements() {
        assert_eq!(prepare("select").unwrap(), Statement::Select);
        assert_eq!(prepare("find 7").unwrap(), Statement::Find(7));
        assert_eq!(prepare("delete 9").unwrap(), Statement::Delete(9));
        assert_eq!(prepare("range 3 12").unwrap(), Statement::Range(3, 12));
    }

    #[test]
    fn tolerates_extra_whitespace() {
        assert_eq!(prepare("  find   42  ").unwrap(), Statement::Find(42));
    }

    #[test]
    fn missing_arguments_are_syntax_errors() {
        assert_eq!(prepare("insert 1 alice"), Err(StatementError::Syntax));
        assert_eq!(prepare("find"), Err(StatementError::Syntax));
        assert_eq!(prepare("range 3"), Err(StatementError::Syntax));
        assert_eq!(prepare("select now"), Err(StatementError::Syntax));
    }

    #[test]
    fn non_numeric_id_is_a_syntax_error() {
        assert_eq!(prepare("find abc"), Err(StatementError::Syntax));
        assert_eq!(
            prepare("insert x alice a@x"),
            Err(StatementError::Syntax)
        );
    }

    #[test]
    fn negative_id_is_a_syntax_error() {
        assert_eq!(prepare("find -1"), Err(StatementError::Syntax));
    }

    #[test]
    fn oversized_strings_are_reported() {
        let long_name = "u".repeat(33);
        assert_eq!(
            prepare(&format!("insert 1 {} a@x", long_name)),
            Err(StatementError::StringTooLong)
        );

        let long_email = "e".repeat(256);
        assert_eq!(
            prepare(&format!("update 1 bob {}", long_email)),
            Err(StatementError::StringTooLong)
        );
    }

    #[test]
    fn inverted_range_is_rejected() {
        assert_eq!(prepare("range 9 3"), Err(StatementError::InvertedRange));
        assert_eq!(prepare("range 5 5").unwrap(), Statement::Range(5, 5));
    }

    #[test]
    fn unknown_keyword_echoes_the_line() {
        assert_eq!(
            prepare("upsert 1 a b"),
            Err(StatementError::Unrecognized("upsert 1 a b".to_string()))
        );
    }
}
