//! Key Index implementation
//!
//! BTreeMap-based index with RwLock for concurrency.

use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};

use parking_lot::RwLock;

use crate::allocator::Extent;
use crate::error::{LkvsError, Result};

use super::KeyEntry;

/// Index of live keys
pub struct KeyIndex {
    entries: RwLock<BTreeMap<String, KeyEntry>>,
}

impl KeyIndex {
    /// Create a new empty index
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Rebuild an index from persisted entries
    pub fn from_entries(entries: Vec<KeyEntry>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for entry in entries {
            if entry.length as u64 > entry.extent.length {
                return Err(LkvsError::Corrupt(format!(
                    "entry for {:?} is longer than its extent",
                    entry.key
                )));
            }
            let key = entry.key.clone();
            if map.insert(key, entry).is_some() {
                return Err(LkvsError::Corrupt("duplicate key in index".to_string()));
            }
        }
        Ok(Self {
            entries: RwLock::new(map),
        })
    }

    /// Current entry for `key`, if any
    pub fn lookup(&self, key: &str) -> Option<KeyEntry> {
        self.entries.read().get(key).cloned()
    }

    /// Point `key` at `extent`, returning the entry it replaced
    ///
    /// The generation continues from the replaced entry.
    pub fn insert_or_update(&self, key: &str, extent: Extent, length: u32) -> Option<KeyEntry> {
        let mut entries = self.entries.write();

        let generation = entries
            .get(key)
            .map(|prev| prev.generation.wrapping_add(1))
            .unwrap_or(1);

        entries.insert(
            key.to_string(),
            KeyEntry {
                key: key.to_string(),
                extent,
                length,
                generation,
            },
        )
    }

    /// Put back an entry exactly as it was (used to undo a failed commit)
    pub fn reinstate(&self, entry: KeyEntry) {
        self.entries.write().insert(entry.key.clone(), entry);
    }

    /// Delete `key`, returning its entry
    pub fn remove(&self, key: &str) -> Option<KeyEntry> {
        self.entries.write().remove(key)
    }

    /// True if `key` has a live entry
    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Lazy sequence over all keys in sorted order
    pub fn all_keys(&self) -> AllKeys<'_> {
        AllKeys {
            index: self,
            cursor: None,
            finished: false,
        }
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Snapshot of every entry (for persistence)
    pub fn entries(&self) -> Vec<KeyEntry> {
        self.entries.read().values().cloned().collect()
    }

    /// Extents owned by live keys
    pub fn extents(&self) -> Vec<Extent> {
        self.entries.read().values().map(|e| e.extent).collect()
    }

    /// Sum of stored value lengths
    pub fn live_bytes(&self) -> u64 {
        self.entries
            .read()
            .values()
            .map(|e| e.length as u64)
            .sum()
    }

    /// First key strictly after `cursor`
    fn key_after(&self, cursor: Option<&str>) -> Option<String> {
        let entries = self.entries.read();
        match cursor {
            None => entries.keys().next().cloned(),
            Some(after) => entries
                .range::<str, _>((Excluded(after), Unbounded))
                .next()
                .map(|(k, _)| k.clone()),
        }
    }
}

impl Default for KeyIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over index keys
///
/// Holds a key cursor rather than a lock: each step briefly takes the read
/// lock and moves to the next key in order. Keys inserted behind the cursor
/// are not revisited, so the sequence always ends. `restart` rewinds it.
pub struct AllKeys<'a> {
    index: &'a KeyIndex,
    cursor: Option<String>,
    finished: bool,
}

impl AllKeys<'_> {
    /// Rewind to the first key
    pub fn restart(&mut self) {
        self.cursor = None;
        self.finished = false;
    }
}

impl Iterator for AllKeys<'_> {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.index.key_after(self.cursor.as_deref()) {
            Some(key) => {
                self.cursor = Some(key.clone());
                Some(key)
            }
            None => {
                self.finished = true;
                None
            }
        }
    }
}
