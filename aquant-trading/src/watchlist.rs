//! User watchlist persisted as a flat JSON file.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::data::bare_code;

/// A watched stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchlistItem {
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    /// Why it is on the list
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "Utc::now")]
    pub added_at: DateTime<Utc>,
}

impl WatchlistItem {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            name: String::new(),
            reason: String::new(),
            tags: Vec::new(),
            added_at: Utc::now(),
        }
    }
}

/// Ordered list of watched stocks bound to a file.
#[derive(Debug, Clone)]
pub struct Watchlist {
    path: PathBuf,
    items: Vec<WatchlistItem>,
}

impl Watchlist {
    /// Load from `path`; a missing file is an empty list.
    pub fn load(path: &Path) -> Result<Self> {
        let items = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read watchlist {}", path.display()))?;
            if content.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse watchlist {}", path.display()))?
            }
        } else {
            debug!(path = %path.display(), "No watchlist file, starting empty");
            Vec::new()
        };

        info!(path = %path.display(), count = items.len(), "Watchlist loaded");

        Ok(Self {
            path: path.to_path_buf(),
            items,
        })
    }

    /// Write atomically: temp file in the same directory, then rename.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(&self.items)?;
        std::fs::write(&tmp, content)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        debug!(path = %self.path.display(), count = self.items.len(), "Watchlist saved");
        Ok(())
    }

    /// Add an item, replacing any existing entry for the same symbol.
    ///
    /// Symbols match on their bare code, so `600519` and `600519.SH` are
    /// the same entry.
    pub fn add(&mut self, item: WatchlistItem) {
        let code = bare_code(&item.symbol).to_string();
        match self.items.iter_mut().find(|i| bare_code(&i.symbol) == code) {
            Some(existing) => *existing = item,
            None => self.items.push(item),
        }
    }

    /// Remove a symbol; returns whether it was present.
    pub fn remove(&mut self, symbol: &str) -> bool {
        let before = self.items.len();
        let code = bare_code(symbol);
        self.items.retain(|i| bare_code(&i.symbol) != code);
        self.items.len() != before
    }

    pub fn contains(&self, symbol: &str) -> bool {
        let code = bare_code(symbol);
        self.items.iter().any(|i| bare_code(&i.symbol) == code)
    }

    pub fn symbols(&self) -> Vec<String> {
        self.items.iter().map(|i| i.symbol.clone()).collect()
    }

    pub fn items(&self) -> &[WatchlistItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let list = Watchlist::load(&dir.path().join("watchlist.json")).unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn test_add_replace_remove_and_persist() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data").join("watchlist.json");

        let mut list = Watchlist::load(&path).unwrap();
        list.add(WatchlistItem::new("600000.SH"));
        let mut item = WatchlistItem::new("300750.SZ");
        item.reason = "锂电龙头".into();
        item.tags = vec!["新能源".into()];
        list.add(item);

        let mut replacement = WatchlistItem::new("600000.SH");
        replacement.name = "浦发银行".into();
        list.add(replacement);
        assert_eq!(list.len(), 2);
        assert_eq!(list.items()[0].name, "浦发银行");

        list.save().unwrap();
        assert!(!path.with_extension("json.tmp").exists());

        let mut reloaded = Watchlist::load(&path).unwrap();
        assert_eq!(reloaded.symbols(), vec!["600000.SH".to_string(), "300750.SZ".to_string()]);
        assert_eq!(reloaded.items()[1].tags, vec!["新能源".to_string()]);

        assert!(reloaded.remove("600000.SH"));
        assert!(!reloaded.remove("600000.SH"));
        assert!(!reloaded.contains("600000.SH"));
        assert!(reloaded.contains("300750.SZ"));
    }

    #[test]
    fn test_symbols_match_on_bare_code() {
        let dir = tempdir().unwrap();
        let mut list = Watchlist::load(&dir.path().join("watchlist.json")).unwrap();

        list.add(WatchlistItem::new("000003"));
        list.add(WatchlistItem::new("000003.SZ"));
        assert_eq!(list.len(), 1);
        assert_eq!(list.symbols(), vec!["000003.SZ".to_string()]);

        assert!(list.contains("sz000003"));
        assert!(list.remove("000003"));
        assert!(list.is_empty());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("watchlist.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(Watchlist::load(&path).is_err());
    }

    #[test]
    fn test_minimal_items_parse() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("watchlist.json");
        std::fs::write(&path, r#"[{"symbol": "000001.SZ"}]"#).unwrap();
        let list = Watchlist::load(&path).unwrap();
        assert_eq!(list.symbols(), vec!["000001.SZ".to_string()]);
    }
}
