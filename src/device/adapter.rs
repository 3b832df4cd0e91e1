//! Device Adapter
//!
//! Owns the open descriptor of one device and performs bounds-checked
//! positional I/O against it.

use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::{LkvsError, Result};

use super::flags::OpenFlags;
use super::lock;

/// Handle to an open block device or device file
///
/// ## Concurrency:
/// - `file`: RwLock so I/O (read lock) runs concurrently while `close`
///   (write lock) waits for in-flight I/O before dropping the descriptor
/// - All I/O is positional, no shared cursor
pub struct DeviceAdapter {
    /// Path the device was opened from
    path: PathBuf,

    /// Open descriptor, `None` once closed
    file: RwLock<Option<File>>,

    /// Usable device size in bytes
    size: u64,

    /// Whether writes are permitted
    writable: bool,
}

impl DeviceAdapter {
    /// Open a device
    ///
    /// Steps:
    /// 1. Open the path with the access mode from `flags`
    /// 2. Take the exclusive advisory lock (`DeviceBusy` on collision)
    /// 3. Size an empty regular file to `fresh_size` when writable
    /// 4. Determine the device size
    pub fn open(path: &Path, flags: OpenFlags, fresh_size: u64) -> Result<Self> {
        let flags = flags.normalized();
        let writable = flags.contains(OpenFlags::WRITE);

        // Step 1: Open with the requested access mode
        let file = OpenOptions::new()
            .read(true)
            .write(writable)
            .create(writable && flags.contains(OpenFlags::CREATE))
            .open(path)
            .map_err(|e| Self::classify_open_error(path, e))?;

        // Step 2: One owner per device
        lock::lock_exclusive(&file).map_err(|e| match e.kind() {
            io::ErrorKind::WouldBlock => LkvsError::DeviceBusy(path.display().to_string()),
            _ => LkvsError::from(e),
        })?;

        // Step 3: Give a fresh file device its capacity
        let metadata = file.metadata()?;
        if metadata.is_file() && metadata.len() == 0 && writable {
            file.set_len(fresh_size)?;
            info!(path = %path.display(), size = fresh_size, "Initialized device file");
        }

        // Step 4: Seeking to the end works for files and block devices alike
        let size = (&file).seek(SeekFrom::End(0))?;

        debug!(path = %path.display(), size, writable, "Device opened");

        Ok(Self {
            path: path.to_path_buf(),
            file: RwLock::new(Some(file)),
            size,
            writable,
        })
    }

    /// Read `length` bytes starting at `offset`
    pub fn read(&self, offset: u64, length: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; length];
        self.read_into(offset, &mut buf)?;
        Ok(buf)
    }

    /// Fill `buf` from the device starting at `offset`
    pub fn read_into(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.check_range(offset, buf.len() as u64)?;

        let guard = self.file.read();
        let file = guard.as_ref().ok_or_else(Self::closed_error)?;
        positional::read_exact_at(file, buf, offset).map_err(LkvsError::Io)
    }

    /// Write `data` to the device starting at `offset`
    pub fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        if !self.writable {
            return Err(LkvsError::PermissionDenied(format!(
                "{} is open read-only",
                self.path.display()
            )));
        }
        self.check_range(offset, data.len() as u64)?;

        let guard = self.file.read();
        let file = guard.as_ref().ok_or_else(Self::closed_error)?;
        positional::write_all_at(file, data, offset).map_err(LkvsError::Io)
    }

    /// Flush written data to stable storage
    pub fn sync(&self) -> Result<()> {
        let guard = self.file.read();
        let file = guard.as_ref().ok_or_else(Self::closed_error)?;
        if self.writable {
            file.sync_data().map_err(LkvsError::Io)?;
        }
        Ok(())
    }

    /// Release the descriptor and the advisory lock
    ///
    /// Closing an already closed adapter is a no-op.
    pub fn close(&self) {
        let mut guard = self.file.write();
        if let Some(file) = guard.take() {
            if let Err(e) = lock::unlock(&file) {
                debug!(path = %self.path.display(), error = %e, "Device unlock failed");
            }
            drop(file);
            debug!(path = %self.path.display(), "Device closed");
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Device size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Path the device was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the device accepts writes
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Whether `close` has run
    pub fn is_closed(&self) -> bool {
        self.file.read().is_none()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn check_range(&self, offset: u64, length: u64) -> Result<()> {
        match offset.checked_add(length) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(LkvsError::OutOfRange {
                offset,
                length,
                size: self.size,
            }),
        }
    }

    fn classify_open_error(path: &Path, err: io::Error) -> LkvsError {
        match err.kind() {
            io::ErrorKind::NotFound => LkvsError::DeviceNotFound(path.display().to_string()),
            io::ErrorKind::PermissionDenied => {
                LkvsError::PermissionDenied(path.display().to_string())
            }
            _ => LkvsError::Io(err),
        }
    }

    fn closed_error() -> LkvsError {
        LkvsError::InvalidState("device is closed".to_string())
    }
}

impl Drop for DeviceAdapter {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(unix)]
mod positional {
    use std::fs::File;
    use std::io;
    use std::os::unix::fs::FileExt;

    pub(super) fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
        file.read_exact_at(buf, offset)
    }

    pub(super) fn write_all_at(file: &File, data: &[u8], offset: u64) -> io::Result<()> {
        file.write_all_at(data, offset)
    }
}

#[cfg(windows)]
mod positional {
    use std::fs::File;
    use std::io;
    use std::os::windows::fs::FileExt;

    pub(super) fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
        while !buf.is_empty() {
            match file.seek_read(buf, offset)? {
                0 => return Err(io::ErrorKind::UnexpectedEof.into()),
                n => {
                    buf = &mut buf[n..];
                    offset += n as u64;
                }
            }
        }
        Ok(())
    }

    pub(super) fn write_all_at(file: &File, mut data: &[u8], mut offset: u64) -> io::Result<()> {
        while !data.is_empty() {
            match file.seek_write(data, offset)? {
                0 => return Err(io::ErrorKind::WriteZero.into()),
                n => {
                    data = &data[n..];
                    offset += n as u64;
                }
            }
        }
        Ok(())
    }
}
