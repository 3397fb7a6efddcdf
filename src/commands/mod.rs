/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint:

- `capture` - convert, capture, dispatch and sync (the add-on side)
- `library` - browsing and editing the web-app store
- `remote`  - token handling and remote backup sync

Handlers open the two SQLite stores named by the configuration and print
either tables or, with `--json`, machine-readable output.
*/

use crate::config::Config;
use crate::error::{AgregError, Result};
use crate::storage::LocalStore;
use crate::sync::Synchronizer;
use anyhow::Context;
use serde::Serialize;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

pub mod capture;
pub mod library;
pub mod remote;

/// The add-on store and the web-app store opened from configuration
#[derive(Debug, Clone)]
pub struct Stores {
    pub source: LocalStore,
    pub target: LocalStore,
}

impl Stores {
    /// Opens both stores, creating the database files when needed
    pub fn open(config: &Config) -> Result<Self> {
        let source_path = config.storage.source_path()?;
        let target_path = config.storage.target_path()?;
        tracing::debug!(
            source = %source_path.display(),
            target = %target_path.display(),
            "Opening stores"
        );

        let attempts = config.storage.max_write_attempts;
        Ok(Self {
            source: LocalStore::open_sqlite(source_path, "addon")?.with_max_write_attempts(attempts),
            target: LocalStore::open_sqlite(target_path, "webapp")?.with_max_write_attempts(attempts),
        })
    }

    pub fn synchronizer(&self) -> Arc<Synchronizer> {
        Arc::new(Synchronizer::new(self.source.clone(), self.target.clone()))
    }
}

/// Reads a whole file, or stdin when no path is given
pub(crate) fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .map_err(AgregError::from)?;
            Ok(buf)
        }
    }
}

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Shortens `text` to at most `max` characters, marking the cut with `...`
pub(crate) fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}

/// First eight characters of an id, for tables
pub(crate) fn short_id(id: &str) -> &str {
    id.char_indices().nth(8).map_or(id, |(i, _)| &id[..i])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééééééééééé", 6), "ééé...");
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("0123456789abcdef"), "01234567");
        assert_eq!(short_id("abc"), "abc");
    }

    #[test]
    fn test_read_input_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("in.html");
        std::fs::write(&path, "<p>x</p>").unwrap();
        assert_eq!(read_input(Some(&path)).unwrap(), "<p>x</p>");
        assert!(read_input(Some(&dir.path().join("missing"))).is_err());
    }

    #[tokio::test]
    async fn test_open_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.source_db = Some(dir.path().join("a/addon.db"));
        config.storage.target_db = Some(dir.path().join("b/webapp.db"));

        let stores = Stores::open(&config).unwrap();
        assert!(dir.path().join("a").is_dir());
        assert!(stores.target.get_all().await.unwrap().is_empty());
    }
}
