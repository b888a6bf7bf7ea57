//! Shared result cache
//!
//! Holds the last output of each stage, keyed by task type. Writes are
//! last-writer-wins without versioning. A missing key is an ordinary outcome
//! that consuming stages must handle themselves.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

/// One cached value with its write time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
    pub value: Value,
    pub written_at: DateTime<Utc>,
}

/// Cache section of the health report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheSummary {
    pub entries: usize,
    pub keys: Vec<String>,
    pub last_write: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct ResultCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, replacing any previous value
    pub fn set(&self, key: &str, value: Value) {
        let entry = CacheEntry {
            value,
            written_at: Utc::now(),
        };
        // A poisoned lock still holds a consistent map: every write is a single insert.
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let replaced = entries.insert(key.to_string(), entry).is_some();
        debug!(key = %key, replaced, "Cached stage result");
    }

    /// Value stored under `key`, or `None` when absent
    pub fn get(&self, key: &str) -> Option<Value> {
        self.entry(key).map(|entry| entry.value)
    }

    pub fn entry(&self, key: &str) -> Option<CacheEntry> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.contains_key(key)
    }

    /// Values for the given keys, skipping absent ones
    pub fn collect<'a, I>(&self, keys: I) -> Map<String, Value>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        keys.into_iter()
            .filter_map(|key| {
                entries
                    .get(key)
                    .map(|entry| (key.to_string(), entry.value.clone()))
            })
            .collect()
    }

    /// Copy of every entry
    pub fn snapshot(&self) -> HashMap<String, CacheEntry> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn summary(&self) -> CacheSummary {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut keys: Vec<String> = entries.keys().cloned().collect();
        keys.sort();

        CacheSummary {
            entries: entries.len(),
            keys,
            last_write: entries.values().map(|e| e.written_at).max(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every entry
    pub fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let dropped = entries.len();
        entries.clear();
        debug!(dropped, "Cleared result cache");
    }
}
