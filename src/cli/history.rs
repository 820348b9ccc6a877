//! # Command History Persistence
//!
//! Decides whether the REPL keeps its command history across sessions and
//! where the file lives. Resolution happens once at startup and the result
//! is carried as a [`HistoryMode`]; rustyline performs the actual file
//! I/O against the resolved path.
//!
//! ## Resolution Order
//!
//! 1. `ROWANDB_HISTORY` set to a path: use that file.
//! 2. `ROWANDB_HISTORY` set but empty: persistence off.
//! 3. Otherwise `$HOME/.rowandb_history`, or off when `$HOME` is unset
//!    (headless and containerized runs commonly have no home).

use std::env;
use std::path::{Path, PathBuf};

const HISTORY_FILE_NAME: &str = ".rowandb_history";
const HISTORY_ENV_VAR: &str = "ROWANDB_HISTORY";

/// Whether, and where, REPL history persists between sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryMode {
    Disabled,
    File(PathBuf),
}

impl HistoryMode {
    /// Resolves the mode from the process environment.
    pub fn resolve() -> Self {
        Self::from_settings(env::var(HISTORY_ENV_VAR).ok(), env::var("HOME").ok())
    }

    /// The file to load and save, when persistence is on.
    pub fn file(&self) -> Option<&Path> {
        match self {
            HistoryMode::Disabled => None,
            HistoryMode::File(path) => Some(path),
        }
    }

    fn from_settings(override_path: Option<String>, home: Option<String>) -> Self {
        if let Some(path) = override_path {
            return if path.is_empty() {
                HistoryMode::Disabled
            } else {
                HistoryMode::File(PathBuf::from(path))
            };
        }

        match home {
            Some(home) => HistoryMode::File(PathBuf::from(home).join(HISTORY_FILE_NAME)),
            None => HistoryMode::Disabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_wins_over_home_directory() {
        let mode = HistoryMode::from_settings(
            Some("/var/lib/rowan/history".to_string()),
            Some("/home/alice".to_string()),
        );

        assert_eq!(mode, HistoryMode::File(PathBuf::from("/var/lib/rowan/history")));
    }

    #[test]
    fn empty_override_turns_persistence_off() {
        let mode = HistoryMode::from_settings(Some(String::new()), Some("/home/alice".to_string()));

        assert_eq!(mode, HistoryMode::Disabled);
        assert_eq!(mode.file(), None);
    }

    #[test]
    fn home_directory_is_the_fallback() {
        let mode = HistoryMode::from_settings(None, Some("/home/bob".to_string()));

        assert_eq!(
            mode.file(),
            Some(Path::new("/home/bob/.rowandb_history"))
        );
    }

    #[test]
    fn no_override_and_no_home_means_disabled() {
        let mode = HistoryMode::from_settings(None, None);

        assert_eq!(mode, HistoryMode::Disabled);
    }
}
