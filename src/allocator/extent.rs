//! Extent
//!
//! A contiguous byte range on the device.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Contiguous region of device space: `[offset, offset + length)`
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Extent {
    /// Byte offset of the first byte
    pub offset: u64,
    /// Length in bytes
    pub length: u64,
}

impl Extent {
    pub fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    /// One past the last byte
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }

    /// True if the two ranges share at least one byte
    pub fn overlaps(&self, other: &Extent) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }

    /// True if `other` lies entirely inside `self`
    pub fn contains(&self, other: &Extent) -> bool {
        other.offset >= self.offset && other.end() <= self.end()
    }

    /// True if one range ends exactly where the other begins
    pub fn is_adjacent(&self, other: &Extent) -> bool {
        self.end() == other.offset || other.end() == self.offset
    }
}

impl fmt::Debug for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}, {:#x})", self.offset, self.end())
    }
}
