//! Configuration for LKVS
//!
//! Centralized configuration with sensible defaults.

use crate::error::{LkvsError, Result};

/// Main configuration for an LKVS store
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Device Layout
    // -------------------------------------------------------------------------
    /// Allocation and alignment unit in bytes (power of two)
    pub block_size: u32,

    /// Size given to a fresh regular-file device (empty or newly created)
    pub device_size: u64,

    /// Size of each of the two metadata slots
    /// Layout:
    ///   [superblock][slot A][slot B][data region ...]
    pub meta_slot_size: u64,

    // -------------------------------------------------------------------------
    // Store Behaviour
    // -------------------------------------------------------------------------
    /// Longest accepted key, in bytes
    pub max_key_len: usize,

    /// How the allocator picks among free extents
    pub allocation_policy: AllocationPolicy,

    /// When index and free list metadata are written to the device
    pub sync_strategy: SyncStrategy,

    /// Overwrite a value in place when its block-aligned size is unchanged
    pub reuse_extents: bool,

    /// Number of per-key lock stripes
    pub lock_stripes: usize,
}

/// Free-extent selection policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationPolicy {
    /// Lowest-offset extent that fits
    FirstFit,

    /// Smallest extent that fits (ties broken by offset)
    BestFit,
}

/// Metadata sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// Persist metadata after every put/delete (safest, slowest)
    EveryWrite,

    /// Persist metadata only on explicit flush and on destroy
    OnClose,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            block_size: 4096,
            device_size: 64 * 1024 * 1024, // 64 MB
            meta_slot_size: 1024 * 1024,   // 1 MB
            max_key_len: 4096,
            allocation_policy: AllocationPolicy::FirstFit,
            sync_strategy: SyncStrategy::EveryWrite,
            reuse_extents: true,
            lock_stripes: 64,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check that the layout parameters are usable
    pub fn validate(&self) -> Result<()> {
        if self.block_size < 512 || !self.block_size.is_power_of_two() {
            return Err(LkvsError::InvalidArgument(format!(
                "block size must be a power of two >= 512, got {}",
                self.block_size
            )));
        }
        let block = self.block_size as u64;
        if self.meta_slot_size < block || self.meta_slot_size % block != 0 {
            return Err(LkvsError::InvalidArgument(format!(
                "metadata slot size {} must be a non-zero multiple of the block size {}",
                self.meta_slot_size, block
            )));
        }
        if self.max_key_len == 0 {
            return Err(LkvsError::InvalidArgument(
                "max key length must be positive".to_string(),
            ));
        }
        if self.lock_stripes == 0 {
            return Err(LkvsError::InvalidArgument(
                "lock stripe count must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the allocation block size (in bytes)
    pub fn block_size(mut self, size: u32) -> Self {
        self.config.block_size = size;
        self
    }

    /// Set the size used when initializing a fresh file device (in bytes)
    pub fn device_size(mut self, size: u64) -> Self {
        self.config.device_size = size;
        self
    }

    /// Set the size of each metadata slot (in bytes)
    pub fn meta_slot_size(mut self, size: u64) -> Self {
        self.config.meta_slot_size = size;
        self
    }

    /// Set the maximum key length (in bytes)
    pub fn max_key_len(mut self, len: usize) -> Self {
        self.config.max_key_len = len;
        self
    }

    /// Set the allocation policy
    pub fn allocation_policy(mut self, policy: AllocationPolicy) -> Self {
        self.config.allocation_policy = policy;
        self
    }

    /// Set the metadata sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Enable or disable in-place overwrites
    pub fn reuse_extents(mut self, reuse: bool) -> Self {
        self.config.reuse_extents = reuse;
        self
    }

    /// Set the number of per-key lock stripes
    pub fn lock_stripes(mut self, stripes: usize) -> Self {
        self.config.lock_stripes = stripes;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
