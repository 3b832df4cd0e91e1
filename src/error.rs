//! Error types for LKVS
//!
//! Provides a unified error type for all operations, plus the mapping onto
//! the negative status codes returned by the handle API.

use std::io;

use thiserror::Error;

/// Result type alias using LkvsError
pub type Result<T> = std::result::Result<T, LkvsError>;

/// Unified error type for LKVS operations
#[derive(Debug, Error)]
pub enum LkvsError {
    // -------------------------------------------------------------------------
    // Caller Errors
    // -------------------------------------------------------------------------
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Device already open")]
    AlreadyOpen,

    #[error("Unknown handle: {0}")]
    UnknownHandle(u64),

    // -------------------------------------------------------------------------
    // Device Errors
    // -------------------------------------------------------------------------
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Device busy: {0}")]
    DeviceBusy(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Access out of range: offset {offset} + length {length} exceeds device size {size}")]
    OutOfRange { offset: u64, length: u64, size: u64 },

    // -------------------------------------------------------------------------
    // Store Errors
    // -------------------------------------------------------------------------
    #[error("Out of space: no free extent of {requested} bytes")]
    OutOfSpace { requested: u64 },

    #[error("Key not found")]
    KeyNotFound,

    #[error("Buffer too small: value is {required} bytes, buffer holds {capacity}")]
    BufferTooSmall { required: usize, capacity: usize },

    // -------------------------------------------------------------------------
    // On-Device Metadata Errors
    // -------------------------------------------------------------------------
    #[error("Device is not formatted as an LKVS store")]
    NotFormatted,

    #[error("Metadata corruption detected: {0}")]
    Corrupt(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<bincode::Error> for LkvsError {
    fn from(err: bincode::Error) -> Self {
        LkvsError::Serialization(err.to_string())
    }
}

// =============================================================================
// Status Codes
// =============================================================================

/// Status code for a successful call
pub const STATUS_OK: i32 = 0;

impl LkvsError {
    /// Negative status code reported through the handle API
    ///
    /// | Code | Kind |
    /// |------|------|
    /// | -1   | InvalidArgument |
    /// | -2   | InvalidState |
    /// | -3   | DeviceNotFound |
    /// | -4   | DeviceBusy |
    /// | -5   | PermissionDenied |
    /// | -6   | IoError / OutOfRange |
    /// | -7   | OutOfSpace |
    /// | -8   | KeyNotFound |
    /// | -9   | BufferTooSmall |
    /// | -10  | AlreadyOpen |
    /// | -11  | Corrupt / NotFormatted / Serialization |
    /// | -12  | UnknownHandle |
    pub fn status_code(&self) -> i32 {
        match self {
            LkvsError::InvalidArgument(_) => -1,
            LkvsError::InvalidState(_) => -2,
            LkvsError::DeviceNotFound(_) => -3,
            LkvsError::DeviceBusy(_) => -4,
            LkvsError::PermissionDenied(_) => -5,
            LkvsError::Io(_) | LkvsError::OutOfRange { .. } => -6,
            LkvsError::OutOfSpace { .. } => -7,
            LkvsError::KeyNotFound => -8,
            LkvsError::BufferTooSmall { .. } => -9,
            LkvsError::AlreadyOpen => -10,
            LkvsError::NotFormatted | LkvsError::Corrupt(_) | LkvsError::Serialization(_) => -11,
            LkvsError::UnknownHandle(_) => -12,
        }
    }
}
