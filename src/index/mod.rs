//! Key Index Module
//!
//! In-memory map from keys to the extents holding their values.
//!
//! ## Responsibilities
//! - Exactly one live entry per key
//! - Hand back the previous entry on overwrite/remove so its extent can be freed
//! - Lazy, restartable key listing
//! - Snapshot of all entries for persistence
//!
//! ## Data Structure Choice
//! Using BTreeMap wrapped in RwLock:
//! - Ordered keys give a stable listing order and a cheap cursor
//! - Many concurrent lookups, short exclusive sections for mutation

mod key_index;

pub use key_index::{AllKeys, KeyIndex};

use serde::{Deserialize, Serialize};

use crate::allocator::Extent;

/// Location and length of one stored value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEntry {
    /// The user key
    pub key: String,

    /// Block-aligned extent owned by this key
    pub extent: Extent,

    /// Value length in bytes (`<= extent.length`)
    pub length: u32,

    /// Starts at 1, incremented on every overwrite
    pub generation: u32,
}

impl KeyEntry {
    /// Device offset of the value
    pub fn offset(&self) -> u64 {
        self.extent.offset
    }
}
