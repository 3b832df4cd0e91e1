//! On-Device Layout
//!
//! Where the superblock, metadata slots and data region live on the device.
//!
//! ## Format (little-endian)
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Superblock (one block)                                       │
//! │   Magic "LKVS" (4) | Version u16 | Reserved u16              │
//! │   BlockSize u32 | DeviceSize u64 | SlotSize u64 | CRC32 (4)  │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Metadata slot A (SlotSize bytes)                             │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Metadata slot B (SlotSize bytes)                             │
//! │   Magic "META" (4) | Version u16 | Reserved u16              │
//! │   Generation u64 | PayloadLen u32 | PayloadCRC u32           │
//! │   HeaderCRC u32 | Payload (bincode: entries + free list)     │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Data region (block aligned, up to the last whole block)      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Commits alternate between the two slots; open takes the valid slot with
//! the highest generation, so a torn metadata write falls back to the
//! previous snapshot.

mod metadata;
mod superblock;

pub use metadata::{MetaSnapshot, MetaStore, META_HEADER_SIZE, META_VERSION};
pub use superblock::{Superblock, SUPERBLOCK_SIZE, SUPERBLOCK_VERSION};

use crate::allocator::Extent;
use crate::config::Config;
use crate::device::DeviceAdapter;
use crate::error::{LkvsError, Result};

/// Geometry of an LKVS device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    /// Allocation and alignment unit
    pub block_size: u32,
    /// Device size in bytes
    pub device_size: u64,
    /// Size of each metadata slot
    pub meta_slot_size: u64,
}

impl Layout {
    /// Layout for a device of `device_size` bytes using `config`'s geometry
    pub fn for_device(config: &Config, device_size: u64) -> Result<Self> {
        let layout = Self {
            block_size: config.block_size,
            device_size,
            meta_slot_size: config.meta_slot_size,
        };
        layout.check()?;
        Ok(layout)
    }

    /// Verify the data region holds at least one block
    pub fn check(&self) -> Result<()> {
        let region = self.data_region();
        if region.length < self.block_size as u64 {
            return Err(LkvsError::InvalidArgument(format!(
                "device of {} bytes is too small: {} bytes are reserved for metadata",
                self.device_size,
                self.reserved_bytes()
            )));
        }
        Ok(())
    }

    /// Bytes before the data region (saturates for absurd slot sizes)
    pub fn reserved_bytes(&self) -> u64 {
        (self.block_size as u64).saturating_add(self.meta_slot_size.saturating_mul(2))
    }

    /// Offset of metadata slot `slot` (0 or 1)
    pub fn slot_offset(&self, slot: usize) -> u64 {
        self.block_size as u64 + slot as u64 * self.meta_slot_size
    }

    /// Region available for values
    pub fn data_region(&self) -> Extent {
        let block = self.block_size as u64;
        let start = self.reserved_bytes().div_ceil(block).saturating_mul(block);
        let end = self.device_size / block * block;
        Extent::new(start, end.saturating_sub(start))
    }

    /// True if the superblock and both metadata slots hold only zeros
    ///
    /// Anything else means the device carries data of its own (another
    /// filesystem, or a store whose superblock was lost) and must not be
    /// formatted without being asked to.
    pub fn reserved_is_blank(&self, device: &DeviceAdapter) -> Result<bool> {
        const CHUNK: u64 = 64 * 1024;

        let end = self.reserved_bytes();
        let mut offset = 0;
        while offset < end {
            let len = CHUNK.min(end - offset);
            if !Superblock::is_blank(&device.read(offset, len as usize)?) {
                return Ok(false);
            }
            offset += len;
        }
        Ok(true)
    }
}
