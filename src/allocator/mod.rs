//! Allocator Module
//!
//! Tracks free and used space in the data region of the device.
//!
//! ## Responsibilities
//! - Hand out block-aligned extents for new values
//! - Reclaim extents on overwrite and delete
//! - Coalesce neighbouring free extents to limit fragmentation
//! - Rebuild the free list from persisted metadata on open
//!
//! ## Data Structure Choice
//! A `BTreeMap<offset, length>` behind a Mutex:
//! - Ordered by offset, so first-fit and neighbour lookup are natural
//! - The lock is held only for the in-memory mutation, never across I/O

mod extent;
mod free_list;

pub use extent::Extent;
pub use free_list::FreeList;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::AllocationPolicy;
use crate::error::{LkvsError, Result};

/// Thread-safe block allocator over one device region
pub struct Allocator {
    /// Allocation granularity in bytes
    block_size: u64,

    /// Free extent selection policy
    policy: AllocationPolicy,

    /// Free list (internal Mutex)
    free: Mutex<FreeList>,
}

impl Allocator {
    /// Allocator with the whole region free
    pub fn new(region: Extent, block_size: u32, policy: AllocationPolicy) -> Self {
        Self {
            block_size: block_size as u64,
            policy,
            free: Mutex::new(FreeList::new(region)),
        }
    }

    /// Rebuild an allocator from persisted state
    ///
    /// `free` is the persisted free list and `used` the extents owned by live
    /// keys. Used extents must be disjoint from each other and from the free
    /// extents; any bytes covered by neither (a crash between allocation and
    /// commit) are reclaimed as free.
    pub fn restore(
        region: Extent,
        block_size: u32,
        policy: AllocationPolicy,
        free: &[Extent],
        used: &[Extent],
    ) -> Result<Self> {
        let mut list = FreeList::new(region);

        for extent in used {
            list.reserve(*extent).map_err(|_| {
                LkvsError::Corrupt(format!("key extent {:?} overlaps another key", extent))
            })?;
        }

        // Every persisted free extent must still be free after reserving keys
        let mut check = list.clone();
        for extent in free {
            check.reserve(*extent).map_err(|_| {
                LkvsError::Corrupt(format!("free extent {:?} overlaps a key", extent))
            })?;
        }

        let persisted: u64 = free.iter().map(|e| e.length).sum();
        if persisted != list.free_bytes() {
            warn!(
                persisted,
                reclaimed = list.free_bytes() - persisted,
                "Reclaiming space not owned by any key"
            );
        }

        Ok(Self {
            block_size: block_size as u64,
            policy,
            free: Mutex::new(list),
        })
    }

    /// Allocate an extent of at least `size` bytes
    pub fn allocate(&self, size: u64) -> Result<Extent> {
        if size == 0 {
            return Err(LkvsError::InvalidArgument(
                "allocation size must be positive".to_string(),
            ));
        }
        let aligned = self.aligned_len(size);

        let extent = self
            .free
            .lock()
            .allocate(aligned, self.policy)
            .ok_or(LkvsError::OutOfSpace { requested: aligned })?;

        debug!(size, extent = ?extent, "Allocated extent");
        Ok(extent)
    }

    /// Return an extent to the free list
    pub fn free(&self, extent: Extent) -> Result<()> {
        self.free.lock().free(extent)?;
        debug!(extent = ?extent, "Freed extent");
        Ok(())
    }

    /// Round `size` up to the allocation block size
    pub fn aligned_len(&self, size: u64) -> u64 {
        size.div_ceil(self.block_size) * self.block_size
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Bytes in the managed region
    pub fn capacity(&self) -> u64 {
        self.free.lock().region().length
    }

    /// Total free bytes
    pub fn free_bytes(&self) -> u64 {
        self.free.lock().free_bytes()
    }

    /// Largest single allocation that can currently succeed
    pub fn largest_free(&self) -> u64 {
        self.free.lock().largest()
    }

    /// Snapshot of the free extents in offset order
    pub fn extents(&self) -> Vec<Extent> {
        self.free.lock().extents()
    }

    /// True if the free list invariants hold
    pub fn is_well_formed(&self) -> bool {
        self.free.lock().is_well_formed()
    }
}
