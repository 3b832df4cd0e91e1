//! Metadata slots
//!
//! Two fixed-size slots hold alternating snapshots of the key index and the
//! free list. A commit always overwrites the older slot, so the newer one is
//! intact if the write is torn.

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::allocator::Extent;
use crate::device::DeviceAdapter;
use crate::error::{LkvsError, Result};
use crate::index::KeyEntry;

use super::Layout;

/// Magic bytes identifying a metadata slot
const MAGIC: &[u8; 4] = b"META";

/// Current metadata slot format version
pub const META_VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2) + Reserved (2) + Generation (8)
/// + PayloadLen (4) + PayloadCRC (4) + HeaderCRC (4) = 28 bytes
pub const META_HEADER_SIZE: usize = 28;

/// Persisted state of the store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaSnapshot {
    /// Live key entries
    pub entries: Vec<KeyEntry>,
    /// Free extents of the data region
    pub free: Vec<Extent>,
}

/// Reader/writer for the two metadata slots
#[derive(Debug)]
pub struct MetaStore {
    layout: Layout,
    /// Slot holding the newest valid snapshot
    current_slot: usize,
    /// Generation of the newest valid snapshot
    generation: u64,
}

impl MetaStore {
    /// Initialize both slots: slot A gets `snapshot` at generation 1,
    /// slot B is invalidated
    pub fn format(device: &DeviceAdapter, layout: Layout, snapshot: &MetaSnapshot) -> Result<Self> {
        device.write(layout.slot_offset(1), &[0u8; META_HEADER_SIZE])?;

        let mut store = Self {
            layout,
            current_slot: 1,
            generation: 0,
        };
        store.commit(device, snapshot)?;
        Ok(store)
    }

    /// Load the newest valid snapshot
    pub fn load(device: &DeviceAdapter, layout: Layout) -> Result<(Self, MetaSnapshot)> {
        let slots = [
            Self::read_slot(device, &layout, 0)?,
            Self::read_slot(device, &layout, 1)?,
        ];

        let newest = slots
            .into_iter()
            .enumerate()
            .filter_map(|(slot, read)| read.map(|(generation, snap)| (slot, generation, snap)))
            .max_by_key(|(_, generation, _)| *generation);

        match newest {
            Some((slot, generation, snapshot)) => {
                debug!(
                    slot,
                    generation,
                    keys = snapshot.entries.len(),
                    "Loaded metadata snapshot"
                );
                Ok((
                    Self {
                        layout,
                        current_slot: slot,
                        generation,
                    },
                    snapshot,
                ))
            }
            None => Err(LkvsError::Corrupt(
                "no valid metadata slot found".to_string(),
            )),
        }
    }

    /// Write `snapshot` to the older slot and sync it
    pub fn commit(&mut self, device: &DeviceAdapter, snapshot: &MetaSnapshot) -> Result<()> {
        let payload = bincode::serialize(snapshot)?;
        let total = META_HEADER_SIZE + payload.len();
        if total as u64 > self.layout.meta_slot_size {
            return Err(LkvsError::OutOfSpace {
                requested: total as u64,
            });
        }

        let slot = 1 - self.current_slot;
        let generation = self.generation + 1;

        let mut buf = BytesMut::with_capacity(total);
        buf.put_slice(MAGIC);
        buf.put_u16_le(META_VERSION);
        buf.put_u16_le(0);
        buf.put_u64_le(generation);
        buf.put_u32_le(payload.len() as u32);
        buf.put_u32_le(crc32fast::hash(&payload));
        let header_crc = crc32fast::hash(&buf);
        buf.put_u32_le(header_crc);
        buf.put_slice(&payload);

        device.write(self.layout.slot_offset(slot), &buf)?;
        device.sync()?;

        self.current_slot = slot;
        self.generation = generation;
        debug!(slot, generation, bytes = total, "Committed metadata");
        Ok(())
    }

    /// Generation of the newest committed snapshot
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Slot holding the newest committed snapshot
    pub fn current_slot(&self) -> usize {
        self.current_slot
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Read and validate one slot; `None` if it holds no valid snapshot
    fn read_slot(
        device: &DeviceAdapter,
        layout: &Layout,
        slot: usize,
    ) -> Result<Option<(u64, MetaSnapshot)>> {
        let offset = layout.slot_offset(slot);
        let header = device.read(offset, META_HEADER_SIZE)?;

        if &header[0..4] != MAGIC {
            debug!(slot, "Metadata slot is empty");
            return Ok(None);
        }

        let stored_header_crc = (&header[META_HEADER_SIZE - 4..]).get_u32_le();
        if crc32fast::hash(&header[..META_HEADER_SIZE - 4]) != stored_header_crc {
            warn!(slot, "Metadata slot header checksum mismatch: ignoring slot");
            return Ok(None);
        }

        let mut buf = &header[4..META_HEADER_SIZE - 4];
        let version = buf.get_u16_le();
        let _reserved = buf.get_u16_le();
        let generation = buf.get_u64_le();
        let payload_len = buf.get_u32_le() as u64;
        let payload_crc = buf.get_u32_le();

        if version > META_VERSION {
            return Err(LkvsError::Corrupt(format!(
                "unsupported metadata version {} in slot {}",
                version, slot
            )));
        }
        if META_HEADER_SIZE as u64 + payload_len > layout.meta_slot_size {
            warn!(slot, payload_len, "Metadata payload exceeds slot: ignoring slot");
            return Ok(None);
        }

        let payload = device.read(offset + META_HEADER_SIZE as u64, payload_len as usize)?;
        if crc32fast::hash(&payload) != payload_crc {
            warn!(slot, generation, "Metadata payload checksum mismatch: ignoring slot");
            return Ok(None);
        }

        let snapshot: MetaSnapshot = bincode::deserialize(&payload)?;
        Ok(Some((generation, snapshot)))
    }
}
