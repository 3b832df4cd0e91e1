//! Free List
//!
//! Ordered, coalesced set of free extents inside one managed region.

use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Included, Unbounded};

use crate::config::AllocationPolicy;
use crate::error::{LkvsError, Result};

use super::Extent;

/// Free extents keyed by offset
///
/// Invariants (checked by `is_well_formed`):
/// - every extent is non-empty and inside `region`
/// - extents are disjoint
/// - no two extents are adjacent (frees always coalesce)
#[derive(Debug, Clone)]
pub struct FreeList {
    /// The region this list manages
    region: Extent,
    /// offset → length
    extents: BTreeMap<u64, u64>,
    /// Running total of free bytes
    free_bytes: u64,
}

impl FreeList {
    /// A free list where the whole region is free
    pub fn new(region: Extent) -> Self {
        let mut extents = BTreeMap::new();
        if region.length > 0 {
            extents.insert(region.offset, region.length);
        }
        Self {
            region,
            extents,
            free_bytes: region.length,
        }
    }

    /// A free list with nothing free
    pub fn empty(region: Extent) -> Self {
        Self {
            region,
            extents: BTreeMap::new(),
            free_bytes: 0,
        }
    }

    /// Take the first extent (per `policy`) of at least `size` bytes,
    /// splitting off the remainder
    pub fn allocate(&mut self, size: u64, policy: AllocationPolicy) -> Option<Extent> {
        if size == 0 {
            return None;
        }

        let (offset, length) = match policy {
            AllocationPolicy::FirstFit => self
                .extents
                .iter()
                .find(|(_, len)| **len >= size)
                .map(|(&off, &len)| (off, len))?,
            AllocationPolicy::BestFit => self
                .extents
                .iter()
                .filter(|(_, len)| **len >= size)
                .min_by_key(|(off, len)| (**len, **off))
                .map(|(&off, &len)| (off, len))?,
        };

        self.extents.remove(&offset);
        if length > size {
            self.extents.insert(offset + size, length - size);
        }
        self.free_bytes -= size;

        Some(Extent::new(offset, size))
    }

    /// Return an extent, merging it with free neighbours
    ///
    /// Fails if the extent is empty, leaves the region, or overlaps space
    /// that is already free (double free).
    pub fn free(&mut self, extent: Extent) -> Result<()> {
        self.check_bounds(&extent)?;

        let prev = self.prev_extent(extent.offset);
        let next = self.next_extent(extent.offset);

        if let Some(p) = prev {
            if p.overlaps(&extent) {
                return Err(Self::double_free(extent, p));
            }
        }
        if let Some(n) = next {
            if n.overlaps(&extent) {
                return Err(Self::double_free(extent, n));
            }
        }

        let mut merged = extent;

        if let Some(p) = prev {
            if p.is_adjacent(&merged) {
                self.extents.remove(&p.offset);
                merged = Extent::new(p.offset, p.length + merged.length);
            }
        }
        if let Some(n) = next {
            if merged.is_adjacent(&n) {
                self.extents.remove(&n.offset);
                merged = Extent::new(merged.offset, merged.length + n.length);
            }
        }

        self.extents.insert(merged.offset, merged.length);
        self.free_bytes += extent.length;
        Ok(())
    }

    /// Remove a specific range from the free list
    ///
    /// The range must lie entirely inside one free extent.
    pub fn reserve(&mut self, extent: Extent) -> Result<()> {
        self.check_bounds(&extent)?;

        let holder = self
            .prev_extent(extent.offset)
            .filter(|p| p.contains(&extent))
            .ok_or_else(|| {
                LkvsError::InvalidArgument(format!("extent {:?} is not free", extent))
            })?;

        self.extents.remove(&holder.offset);
        if extent.offset > holder.offset {
            self.extents
                .insert(holder.offset, extent.offset - holder.offset);
        }
        if holder.end() > extent.end() {
            self.extents.insert(extent.end(), holder.end() - extent.end());
        }
        self.free_bytes -= extent.length;
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// The managed region
    pub fn region(&self) -> Extent {
        self.region
    }

    /// Total free bytes
    pub fn free_bytes(&self) -> u64 {
        self.free_bytes
    }

    /// Length of the largest free extent
    pub fn largest(&self) -> u64 {
        self.extents.values().copied().max().unwrap_or(0)
    }

    /// Number of free extents
    pub fn len(&self) -> usize {
        self.extents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extents.is_empty()
    }

    /// Free extents in offset order
    pub fn extents(&self) -> Vec<Extent> {
        self.extents
            .iter()
            .map(|(&off, &len)| Extent::new(off, len))
            .collect()
    }

    /// True if the free list invariants hold
    pub fn is_well_formed(&self) -> bool {
        let mut prev_end: Option<u64> = None;
        let mut total = 0u64;
        for (&off, &len) in &self.extents {
            let extent = Extent::new(off, len);
            if len == 0 || !self.region.contains(&extent) {
                return false;
            }
            // Strictly greater: equal would be an unmerged neighbour
            if let Some(end) = prev_end {
                if off <= end {
                    return false;
                }
            }
            prev_end = Some(extent.end());
            total += len;
        }
        total == self.free_bytes
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Free extent starting at or before `offset`
    fn prev_extent(&self, offset: u64) -> Option<Extent> {
        self.extents
            .range((Unbounded, Included(offset)))
            .next_back()
            .map(|(&off, &len)| Extent::new(off, len))
    }

    /// Free extent starting after `offset`
    fn next_extent(&self, offset: u64) -> Option<Extent> {
        self.extents
            .range((Excluded(offset), Unbounded))
            .next()
            .map(|(&off, &len)| Extent::new(off, len))
    }

    fn check_bounds(&self, extent: &Extent) -> Result<()> {
        if extent.length == 0 {
            return Err(LkvsError::InvalidArgument(
                "extent length must be positive".to_string(),
            ));
        }
        if !self.region.contains(extent) {
            return Err(LkvsError::InvalidArgument(format!(
                "extent {:?} lies outside managed region {:?}",
                extent, self.region
            )));
        }
        Ok(())
    }

    fn double_free(extent: Extent, free: Extent) -> LkvsError {
        LkvsError::InvalidArgument(format!(
            "extent {:?} overlaps free extent {:?}",
            extent, free
        ))
    }
}
