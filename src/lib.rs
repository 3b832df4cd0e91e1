//! # LKVS
//!
//! A linear key/value store that lives directly on a block device or file:
//! - Block-aligned value placement with a coalescing free-extent allocator
//! - In-memory key index persisted as checksummed, alternating snapshots
//! - Exclusive device ownership through an advisory lock
//! - Per-key serialization, concurrent access to different keys
//! - A five-call handle API with integer status codes
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Handle Table                             │
//! │        create / open / put / get / destroy → status          │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                    Store Engine                              │
//! │       Created → Opened → Closed, striped key locks           │
//! └──────┬──────────────────┬──────────────────┬────────────────┘
//!        │                  │                  │
//!        ▼                  ▼                  ▼
//!  ┌───────────┐     ┌─────────────┐    ┌─────────────┐
//!  │ Key Index │     │  Allocator  │    │   Layout    │
//!  │ (RwLock)  │     │  (Mutex)    │    │ superblock, │
//!  └───────────┘     └─────────────┘    │ meta slots  │
//!                                       └──────┬──────┘
//!                                              ▼
//!                                      ┌─────────────┐
//!                                      │   Device    │
//!                                      │ (pread/     │
//!                                      │  pwrite)    │
//!                                      └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod device;
pub mod allocator;
pub mod index;
pub mod layout;
pub mod engine;
pub mod handle;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{LkvsError, Result, STATUS_OK};
pub use config::{AllocationPolicy, Config, SyncStrategy};
pub use device::OpenFlags;
pub use engine::{Engine, EngineState, StoreStats};
pub use handle::{Handle, HandleTable};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of LKVS
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
