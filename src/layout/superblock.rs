//! Superblock
//!
//! First block of the device. Written once at format time and used on open
//! to recognise an LKVS device and recover its geometry.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{LkvsError, Result};

use super::Layout;

/// Magic bytes identifying an LKVS device
const MAGIC: &[u8; 4] = b"LKVS";

/// Current superblock format version
pub const SUPERBLOCK_VERSION: u16 = 1;

/// Encoded size: Magic (4) + Version (2) + Reserved (2) + BlockSize (4)
/// + DeviceSize (8) + SlotSize (8) + CRC (4) = 32 bytes
pub const SUPERBLOCK_SIZE: usize = 32;

/// Decoded superblock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Superblock {
    /// Format version the device was written with
    pub version: u16,
    /// Device geometry
    pub layout: Layout,
}

impl Superblock {
    pub fn new(layout: Layout) -> Self {
        Self {
            version: SUPERBLOCK_VERSION,
            layout,
        }
    }

    /// Encode into `SUPERBLOCK_SIZE` bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(SUPERBLOCK_SIZE);
        buf.put_slice(MAGIC);
        buf.put_u16_le(self.version);
        buf.put_u16_le(0);
        buf.put_u32_le(self.layout.block_size);
        buf.put_u64_le(self.layout.device_size);
        buf.put_u64_le(self.layout.meta_slot_size);
        let crc = crc32fast::hash(&buf);
        buf.put_u32_le(crc);
        buf.to_vec()
    }

    /// Decode a superblock
    ///
    /// Returns:
    /// - `Err(NotFormatted)`: magic missing
    /// - `Err(Corrupt)`: checksum mismatch, newer version or bad geometry
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < SUPERBLOCK_SIZE || &bytes[0..4] != MAGIC {
            return Err(LkvsError::NotFormatted);
        }

        let body = &bytes[..SUPERBLOCK_SIZE - 4];
        let stored_crc = (&bytes[SUPERBLOCK_SIZE - 4..SUPERBLOCK_SIZE]).get_u32_le();
        let computed_crc = crc32fast::hash(body);
        if stored_crc != computed_crc {
            return Err(LkvsError::Corrupt(format!(
                "superblock checksum mismatch: stored {:#x}, computed {:#x}",
                stored_crc, computed_crc
            )));
        }

        let mut buf = &body[4..];
        let version = buf.get_u16_le();
        if version > SUPERBLOCK_VERSION {
            return Err(LkvsError::Corrupt(format!(
                "unsupported superblock version {} (newest known {})",
                version, SUPERBLOCK_VERSION
            )));
        }
        let _reserved = buf.get_u16_le();
        let block_size = buf.get_u32_le();
        let device_size = buf.get_u64_le();
        let meta_slot_size = buf.get_u64_le();

        if block_size == 0 || !block_size.is_power_of_two() {
            return Err(LkvsError::Corrupt(format!(
                "superblock block size {} is not a power of two",
                block_size
            )));
        }
        if meta_slot_size < block_size as u64 || meta_slot_size % block_size as u64 != 0 {
            return Err(LkvsError::Corrupt(format!(
                "superblock slot size {} is not block aligned",
                meta_slot_size
            )));
        }

        let layout = Layout {
            block_size,
            device_size,
            meta_slot_size,
        };
        if layout.check().is_err() {
            return Err(LkvsError::Corrupt(format!(
                "superblock geometry leaves no data region: {} byte device, {} byte slots",
                device_size, meta_slot_size
            )));
        }

        Ok(Self { version, layout })
    }

    /// True if the bytes look like never-written space
    pub fn is_blank(bytes: &[u8]) -> bool {
        bytes.iter().all(|&b| b == 0)
    }
}
