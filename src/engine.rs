//! Engine Module
//!
//! The store engine that coordinates the device, allocator and key index.
//!
//! ## Responsibilities
//! - Drive the `Created → Opened → Closed` lifecycle
//! - Format fresh devices and load existing ones
//! - Place values, reclaim overwritten/deleted space
//! - Persist index and free list snapshots
//! - Serialize same-key operations, let different keys run concurrently

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::allocator::{Allocator, Extent};
use crate::config::{Config, SyncStrategy};
use crate::device::{DeviceAdapter, OpenFlags};
use crate::error::{LkvsError, Result};
use crate::index::KeyIndex;
use crate::layout::{Layout, MetaSnapshot, MetaStore, Superblock, SUPERBLOCK_SIZE};

/// Public view of the engine lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Handle allocated, no device bound
    Created,
    /// Device bound, index loaded
    Opened,
    /// Torn down; every operation fails with `InvalidState`
    Closed,
}

/// Space and key accounting for an open store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    /// Device size in bytes
    pub device_size: u64,
    /// Bytes in the data region
    pub capacity: u64,
    /// Free bytes in the data region
    pub free_bytes: u64,
    /// Bytes held by live extents (block aligned)
    pub used_bytes: u64,
    /// Sum of stored value lengths
    pub live_bytes: u64,
    /// Number of live keys
    pub keys: usize,
    /// Largest value placement currently possible
    pub largest_free: u64,
    /// Number of free extents (fragmentation indicator)
    pub free_extents: usize,
    /// Generation of the newest committed metadata snapshot
    pub generation: u64,
}

/// The main storage engine
///
/// ## Concurrency Model
///
/// - **Lifecycle** (`state`): RwLock. Every operation holds the read lock
///   for its whole duration; `open` and `destroy` take the write lock, so
///   `destroy` waits for in-flight operations to drain.
///
/// - **Same key**: striped RwLock. `get` holds its stripe shared,
///   `put`/`delete` exclusive, across device I/O, so a reader never sees
///   a half-written value or an extent that was already freed.
///
/// - **Different keys**: run concurrently. The index and allocator each
///   lock internally, only for the in-memory mutation.
///
/// - **Commits**: the metadata store Mutex orders index/allocator updates
///   with snapshot writes.
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Lifecycle state, owns the open store
    state: RwLock<Lifecycle>,
}

enum Lifecycle {
    Created,
    Opened(Box<OpenStore>),
    Closed,
}

impl Engine {
    /// Allocate an engine with the default configuration (no device I/O)
    pub fn create() -> Self {
        Self::with_config(Config::default())
    }

    /// Allocate an engine with the given configuration (no device I/O)
    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            state: RwLock::new(Lifecycle::Created),
        }
    }

    /// Bind the engine to a device
    ///
    /// Valid only from `Created`. On failure the engine stays `Created`.
    pub fn open(&self, path: impl AsRef<Path>, flags: OpenFlags) -> Result<()> {
        let path = path.as_ref();
        let mut state = self.state.write();

        match &*state {
            Lifecycle::Created => {}
            Lifecycle::Opened(_) => return Err(LkvsError::AlreadyOpen),
            Lifecycle::Closed => return Err(Self::closed_error()),
        }

        let store = OpenStore::open(&self.config, path, flags)?;
        info!(
            path = %path.display(),
            keys = store.index.len(),
            free_bytes = store.allocator.free_bytes(),
            "Store opened"
        );

        *state = Lifecycle::Opened(Box::new(store));
        Ok(())
    }

    /// Store `value` under `key`, replacing any previous value
    pub fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.with_store(|store| store.put(key, value))
    }

    /// Read the value of `key` into `buf`, returning its length
    ///
    /// Fails with `BufferTooSmall` (copying nothing) if `buf` is shorter
    /// than the stored value.
    pub fn get(&self, key: &str, buf: &mut [u8]) -> Result<usize> {
        self.with_store(|store| store.get(key, buf))
    }

    /// Read the value of `key` into a new buffer
    pub fn get_vec(&self, key: &str) -> Result<Vec<u8>> {
        self.with_store(|store| store.get_vec(key))
    }

    /// Remove `key` and reclaim its space
    pub fn delete(&self, key: &str) -> Result<()> {
        self.with_store(|store| store.delete(key))
    }

    /// True if `key` has a value
    pub fn contains(&self, key: &str) -> Result<bool> {
        self.with_store(|store| Ok(store.index.contains(key)))
    }

    /// Stored length of `key`'s value
    pub fn value_len(&self, key: &str) -> Result<usize> {
        self.with_store(|store| {
            store
                .index
                .lookup(key)
                .map(|entry| entry.length as usize)
                .ok_or(LkvsError::KeyNotFound)
        })
    }

    /// All keys in sorted order
    pub fn keys(&self) -> Result<Vec<String>> {
        self.with_store(|store| Ok(store.index.all_keys().collect()))
    }

    /// Number of live keys
    pub fn len(&self) -> Result<usize> {
        self.with_store(|store| Ok(store.index.len()))
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.with_store(|store| Ok(store.index.is_empty()))
    }

    /// Space and key accounting
    pub fn stats(&self) -> Result<StoreStats> {
        self.with_store(|store| Ok(store.stats()))
    }

    /// Persist index and free list metadata now
    pub fn flush(&self) -> Result<()> {
        self.with_store(|store| store.flush())
    }

    /// Flush metadata, release the device and move to `Closed`
    ///
    /// Waits for in-flight operations to finish. Never fails: flush errors
    /// are logged. Calling it again is a no-op.
    pub fn destroy(&self) {
        let mut state = self.state.write();

        let previous = std::mem::replace(&mut *state, Lifecycle::Closed);
        match previous {
            Lifecycle::Opened(store) => {
                store.shutdown();
                info!("Store destroyed");
            }
            Lifecycle::Created => debug!("Destroyed engine that was never opened"),
            Lifecycle::Closed => {}
        }
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Current lifecycle state
    pub fn state(&self) -> EngineState {
        match &*self.state.read() {
            Lifecycle::Created => EngineState::Created,
            Lifecycle::Opened(_) => EngineState::Opened,
            Lifecycle::Closed => EngineState::Closed,
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Geometry of the open device
    pub fn layout(&self) -> Result<Layout> {
        self.with_store(|store| Ok(store.layout))
    }

    /// Snapshot of the allocator's free extents
    pub fn free_extents(&self) -> Result<Vec<Extent>> {
        self.with_store(|store| Ok(store.allocator.extents()))
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Run `op` against the open store, holding the lifecycle read lock
    fn with_store<T>(&self, op: impl FnOnce(&OpenStore) -> Result<T>) -> Result<T> {
        let state = self.state.read();
        match &*state {
            Lifecycle::Opened(store) => op(store),
            Lifecycle::Created => Err(LkvsError::InvalidState(
                "engine has not been opened".to_string(),
            )),
            Lifecycle::Closed => Err(Self::closed_error()),
        }
    }

    fn closed_error() -> LkvsError {
        LkvsError::InvalidState("engine has been destroyed".to_string())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.destroy();
    }
}

// =============================================================================
// Open Store
// =============================================================================

/// Everything owned while the engine is `Opened`
struct OpenStore {
    device: DeviceAdapter,
    layout: Layout,
    index: KeyIndex,
    allocator: Allocator,

    /// Metadata slots; the lock orders commits
    meta: Mutex<MetaStore>,

    /// Per-key lock stripes
    stripes: Vec<RwLock<()>>,

    /// Mutations not yet persisted (`SyncStrategy::OnClose`)
    dirty: AtomicBool,

    sync_strategy: SyncStrategy,
    reuse_extents: bool,
    max_key_len: usize,
}

impl OpenStore {
    /// Open a device and load (or initialize) its metadata
    ///
    /// Steps:
    /// 1. Open the device (advisory lock, fresh file sizing)
    /// 2. Format if asked to, or if the whole reserved area is blank
    /// 3. Otherwise validate the superblock and load the newest snapshot
    /// 4. Rebuild the key index and the allocator
    fn open(config: &Config, path: &Path, flags: OpenFlags) -> Result<Self> {
        config.validate()?;
        let flags = flags.normalized();

        // Step 1: Bind the device
        let device = DeviceAdapter::open(path, flags, config.device_size)?;

        // Step 2/3: Format or load
        let head = if device.size() >= SUPERBLOCK_SIZE as u64 {
            device.read(0, SUPERBLOCK_SIZE)?
        } else {
            vec![0u8; SUPERBLOCK_SIZE]
        };

        let (layout, meta, snapshot) = if flags.contains(OpenFlags::FORMAT) {
            Self::format(config, &device)?
        } else if Superblock::is_blank(&head) {
            if !device.is_writable() {
                return Err(LkvsError::NotFormatted);
            }
            let layout = Layout::for_device(config, device.size())?;
            if !layout.reserved_is_blank(&device)? {
                warn!(
                    path = %path.display(),
                    "Superblock is blank but the metadata area is not: refusing to format"
                );
                return Err(LkvsError::NotFormatted);
            }
            Self::format(config, &device)?
        } else {
            let superblock = Superblock::decode(&head)?;
            let layout = superblock.layout;
            if layout.device_size != device.size() {
                return Err(LkvsError::Corrupt(format!(
                    "superblock records {} bytes but device has {}",
                    layout.device_size,
                    device.size()
                )));
            }
            if layout.block_size != config.block_size
                || layout.meta_slot_size != config.meta_slot_size
            {
                info!(
                    block_size = layout.block_size,
                    meta_slot_size = layout.meta_slot_size,
                    "Using on-device geometry"
                );
            }
            let (meta, snapshot) = MetaStore::load(&device, layout)?;
            (layout, meta, snapshot)
        };

        // Step 4: Rebuild in-memory state
        let index = KeyIndex::from_entries(snapshot.entries)?;
        let allocator = Allocator::restore(
            layout.data_region(),
            layout.block_size,
            config.allocation_policy,
            &snapshot.free,
            &index.extents(),
        )?;

        let stripes = (0..config.lock_stripes).map(|_| RwLock::new(())).collect();

        Ok(Self {
            device,
            layout,
            index,
            allocator,
            meta: Mutex::new(meta),
            stripes,
            dirty: AtomicBool::new(false),
            sync_strategy: config.sync_strategy,
            reuse_extents: config.reuse_extents,
            max_key_len: config.max_key_len,
        })
    }

    /// Write an empty store: metadata slots first, superblock last
    fn format(config: &Config, device: &DeviceAdapter) -> Result<(Layout, MetaStore, MetaSnapshot)> {
        let layout = Layout::for_device(config, device.size())?;

        let snapshot = MetaSnapshot {
            entries: Vec::new(),
            free: vec![layout.data_region()],
        };
        let meta = MetaStore::format(device, layout, &snapshot)?;

        let mut block = vec![0u8; layout.block_size as usize];
        block[..SUPERBLOCK_SIZE].copy_from_slice(&Superblock::new(layout).encode());
        device.write(0, &block)?;
        device.sync()?;

        info!(
            path = %device.path().display(),
            device_size = layout.device_size,
            block_size = layout.block_size,
            capacity = layout.data_region().length,
            "Formatted device"
        );
        Ok((layout, meta, snapshot))
    }

    /// Put steps:
    /// 1. Validate, take the key's stripe exclusively
    /// 2. Reuse the old extent if the aligned size matches, else allocate
    /// 3. Write the value
    /// 4. Commit: update the index, persist, then free the old extent
    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        // Step 1: Validate
        self.check_key(key)?;
        self.check_writable()?;
        if value.is_empty() {
            return Err(LkvsError::InvalidArgument(
                "value size must be positive".to_string(),
            ));
        }
        let length = u32::try_from(value.len()).map_err(|_| {
            LkvsError::InvalidArgument(format!("value of {} bytes is too large", value.len()))
        })?;

        let _key_guard = self.stripe(key).write();

        // Step 2: Place
        let previous = self.index.lookup(key);
        let aligned = self.allocator.aligned_len(value.len() as u64);
        let reused = match &previous {
            Some(prev) if self.reuse_extents && prev.extent.length == aligned => Some(prev.extent),
            _ => None,
        };
        let extent = match reused {
            Some(extent) => extent,
            None => self.allocator.allocate(value.len() as u64)?,
        };

        // Step 3: Write
        if let Err(e) = self.device.write(extent.offset, value) {
            if reused.is_none() {
                self.release(extent);
            }
            return Err(e);
        }

        // Step 4: Commit
        let mut meta = self.meta.lock();
        let replaced = self.index.insert_or_update(key, extent, length);

        if let Err(e) = self.persist(&mut meta) {
            // An in-place overwrite cannot be undone: keep the new entry
            if reused.is_none() {
                match replaced {
                    Some(prev) => self.index.reinstate(prev),
                    None => {
                        self.index.remove(key);
                    }
                }
                self.release(extent);
            }
            return Err(e);
        }

        if let Some(prev) = replaced {
            if prev.extent != extent {
                self.allocator.free(prev.extent)?;
            }
        }

        debug!(key, size = value.len(), extent = ?extent, reused = reused.is_some(), "Put");
        Ok(())
    }

    fn get(&self, key: &str, buf: &mut [u8]) -> Result<usize> {
        self.check_key(key)?;
        let _key_guard = self.stripe(key).read();

        let entry = self.index.lookup(key).ok_or(LkvsError::KeyNotFound)?;
        let length = entry.length as usize;
        if buf.len() < length {
            return Err(LkvsError::BufferTooSmall {
                required: length,
                capacity: buf.len(),
            });
        }

        self.device.read_into(entry.offset(), &mut buf[..length])?;
        debug!(key, size = length, "Get");
        Ok(length)
    }

    fn get_vec(&self, key: &str) -> Result<Vec<u8>> {
        self.check_key(key)?;
        let _key_guard = self.stripe(key).read();

        let entry = self.index.lookup(key).ok_or(LkvsError::KeyNotFound)?;
        self.device.read(entry.offset(), entry.length as usize)
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.check_key(key)?;
        self.check_writable()?;
        let _key_guard = self.stripe(key).write();

        let mut meta = self.meta.lock();
        let removed = self.index.remove(key).ok_or(LkvsError::KeyNotFound)?;

        if let Err(e) = self.persist(&mut meta) {
            self.index.reinstate(removed);
            return Err(e);
        }
        self.allocator.free(removed.extent)?;

        debug!(key, extent = ?removed.extent, "Delete");
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        if !self.device.is_writable() {
            return Ok(());
        }
        let mut meta = self.meta.lock();
        meta.commit(&self.device, &self.snapshot())?;
        self.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn stats(&self) -> StoreStats {
        let capacity = self.allocator.capacity();
        let free_bytes = self.allocator.free_bytes();
        StoreStats {
            device_size: self.layout.device_size,
            capacity,
            free_bytes,
            used_bytes: capacity - free_bytes,
            live_bytes: self.index.live_bytes(),
            keys: self.index.len(),
            largest_free: self.allocator.largest_free(),
            free_extents: self.allocator.extents().len(),
            generation: self.meta.lock().generation(),
        }
    }

    /// Best-effort final flush and device release
    fn shutdown(&self) {
        if self.device.is_writable() && self.dirty.load(Ordering::SeqCst) {
            if let Err(e) = self.flush() {
                warn!(error = %e, "Metadata flush failed during destroy");
            }
        }
        if let Err(e) = self.device.sync() {
            warn!(error = %e, "Device sync failed during destroy");
        }
        self.device.close();
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Persist after a mutation (caller holds the metadata lock)
    fn persist(&self, meta: &mut MetaStore) -> Result<()> {
        match self.sync_strategy {
            SyncStrategy::EveryWrite => meta.commit(&self.device, &self.snapshot()),
            SyncStrategy::OnClose => {
                self.dirty.store(true, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    fn snapshot(&self) -> MetaSnapshot {
        MetaSnapshot {
            entries: self.index.entries(),
            free: self.allocator.extents(),
        }
    }

    /// Return an extent after a failed put
    fn release(&self, extent: Extent) {
        if let Err(e) = self.allocator.free(extent) {
            warn!(extent = ?extent, error = %e, "Failed to release extent");
        }
    }

    fn stripe(&self, key: &str) -> &RwLock<()> {
        let slot = crc32fast::hash(key.as_bytes()) as usize % self.stripes.len();
        &self.stripes[slot]
    }

    fn check_key(&self, key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(LkvsError::InvalidArgument("key must not be empty".to_string()));
        }
        if key.len() > self.max_key_len {
            return Err(LkvsError::InvalidArgument(format!(
                "key of {} bytes exceeds the {} byte limit",
                key.len(),
                self.max_key_len
            )));
        }
        Ok(())
    }

    fn check_writable(&self) -> Result<()> {
        if self.device.is_writable() {
            Ok(())
        } else {
            Err(LkvsError::PermissionDenied(format!(
                "{} is open read-only",
                self.device.path().display()
            )))
        }
    }
}
