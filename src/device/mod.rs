//! Device Module
//!
//! Bounded byte-offset access to a block device or a regular file.
//!
//! ## Responsibilities
//! - Open a device path with the requested access mode
//! - Take an exclusive advisory lock so only one store owns the device
//! - Positional reads and writes checked against the device size
//! - Release the descriptor exactly once
//!
//! ## Concurrency
//! All I/O goes through `pread`/`pwrite` style calls on `&self`, so reads
//! and writes at different offsets never contend on a file cursor.

mod adapter;
mod flags;
mod lock;

pub use adapter::DeviceAdapter;
pub use flags::OpenFlags;
