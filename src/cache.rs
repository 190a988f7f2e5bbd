//! Persistent cache for listing-detail lookups.
//!
//! Stores raw detail payloads in a JSON file keyed by listing id, so a
//! listing already fetched in an earlier run never hits the network again.
//! Entries are kept until the file is cleared externally.

use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::Result;

#[derive(Debug)]
pub struct ListingCache {
    path: PathBuf,
    entries: HashMap<String, Value>,
}

impl ListingCache {
    /// Default cache file location
    pub fn default_path() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wantlist_analyzer")
            .join("listing_cache.json")
    }

    /// Empty cache bound to the given file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: HashMap::new(),
        }
    }

    /// Load the cache from disk. Best-effort: a missing or corrupt file
    /// yields an empty cache, never a startup failure.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(content) => match serde_json::from_str::<HashMap<String, Value>>(&content) {
                    Ok(entries) => {
                        log::info!("Loaded listing cache with {} entries", entries.len());
                        return Self { path, entries };
                    }
                    Err(e) => {
                        log::warn!("Failed to parse cache file, starting fresh: {}", e);
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read cache file, starting fresh: {}", e);
                }
            }
        } else {
            log::info!("Starting with empty listing cache");
        }
        Self {
            path,
            entries: HashMap::new(),
        }
    }

    /// Write the full map to disk
    pub fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(&self.path, content)?;

        log::debug!("Saved listing cache with {} entries", self.entries.len());
        Ok(())
    }

    pub fn get(&self, listing_id: &str) -> Option<&Value> {
        self.entries.get(listing_id)
    }

    pub fn put(&mut self, listing_id: impl Into<String>, detail: Value) {
        self.entries.insert(listing_id.into(), detail);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
