//! Handle API
//!
//! The five-call surface (`create`, `open`, `put`, `get`, `destroy`) over an
//! arena of engines keyed by opaque handle ids, reporting integer status
//! codes instead of `Result`s.
//!
//! ## Status Codes
//! `0` is success, negative values identify the failure kind
//! (see [`LkvsError::status_code`]).
//!
//! The table is an ordinary value owned by the caller; there is no
//! process-wide registry.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::config::Config;
use crate::device::OpenFlags;
use crate::engine::Engine;
use crate::error::{LkvsError, Result, STATUS_OK};

/// Opaque reference to one engine in a [`HandleTable`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u64);

impl Handle {
    /// Raw handle id
    pub fn id(self) -> u64 {
        self.0
    }

    /// Rebuild a handle from a raw id
    pub fn from_id(id: u64) -> Self {
        Handle(id)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lkvsdev#{}", self.0)
    }
}

/// Arena of engines addressed by handle
///
/// ## Concurrency:
/// - `engines`: RwLock held only to look up or insert an engine
/// - Engines are shared as `Arc`, calls run outside the table lock
pub struct HandleTable {
    /// Configuration given to every engine created here
    config: Config,

    /// Next handle id (ids are never reused)
    next_id: AtomicU64,

    /// Live engines
    engines: RwLock<HashMap<u64, Arc<Engine>>>,
}

impl HandleTable {
    /// Table whose engines use the default configuration
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Table whose engines use `config`
    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            next_id: AtomicU64::new(1),
            engines: RwLock::new(HashMap::new()),
        }
    }

    /// Allocate an engine in the `Created` state
    pub fn create(&self) -> Handle {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let engine = Arc::new(Engine::with_config(self.config.clone()));
        self.engines.write().insert(id, engine);
        debug!(handle = id, "Created engine handle");
        Handle(id)
    }

    /// Bind the engine to a device; `flags` is the raw open bitmask
    pub fn open(&self, handle: Handle, path: impl AsRef<Path>, flags: u32) -> i32 {
        Self::status(
            "open",
            self.engine(handle)
                .and_then(|engine| engine.open(path, OpenFlags::from_bits_truncate(flags))),
        )
    }

    /// Store `buf[..size]` under `key`
    pub fn put(&self, handle: Handle, key: &str, buf: &[u8], size: usize) -> i32 {
        let result = self.engine(handle).and_then(|engine| {
            if size == 0 {
                return Err(LkvsError::InvalidArgument(
                    "size must be positive".to_string(),
                ));
            }
            let value = buf.get(..size).ok_or_else(|| {
                LkvsError::InvalidArgument(format!(
                    "size {} exceeds buffer of {} bytes",
                    size,
                    buf.len()
                ))
            })?;
            engine.put(key, value)
        });
        Self::status("put", result)
    }

    /// Read `key` into `buf`, whose usable capacity is `size`
    ///
    /// Returns `(status, bytes_written)`; `bytes_written` is 0 on failure.
    pub fn get(&self, handle: Handle, key: &str, buf: &mut [u8], size: usize) -> (i32, usize) {
        let result = self.engine(handle).and_then(|engine| {
            let capacity = buf.len();
            let window = buf.get_mut(..size).ok_or_else(|| {
                LkvsError::InvalidArgument(format!(
                    "size {} exceeds buffer of {} bytes",
                    size, capacity
                ))
            })?;
            engine.get(key, window)
        });
        match result {
            Ok(len) => (STATUS_OK, len),
            Err(e) => (Self::status::<()>("get", Err(e)), 0),
        }
    }

    /// Tear the engine down; unknown or already destroyed handles are ignored
    ///
    /// The handle stays in the table so later calls report `InvalidState`.
    pub fn destroy(&self, handle: Handle) {
        if let Ok(engine) = self.engine(handle) {
            engine.destroy();
        }
    }

    /// Destroy the engine and forget the handle
    pub fn release(&self, handle: Handle) -> bool {
        match self.engines.write().remove(&handle.0) {
            Some(engine) => {
                engine.destroy();
                true
            }
            None => false,
        }
    }

    /// The engine behind `handle`
    pub fn engine(&self, handle: Handle) -> Result<Arc<Engine>> {
        self.engines
            .read()
            .get(&handle.0)
            .cloned()
            .ok_or(LkvsError::UnknownHandle(handle.0))
    }

    /// Number of handles in the table
    pub fn len(&self) -> usize {
        self.engines.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.read().is_empty()
    }

    fn status<T>(call: &str, result: Result<T>) -> i32 {
        match result {
            Ok(_) => STATUS_OK,
            Err(e) => {
                debug!(call, error = %e, code = e.status_code(), "Call failed");
                e.status_code()
            }
        }
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}
