//! Advisory device lock
//!
//! `flock(2)` locks belong to the open file description, so a second open of
//! the same path (even from this process) fails with `EWOULDBLOCK` while the
//! first descriptor is alive.

use std::fs::File;
use std::io;

/// Take an exclusive, non-blocking lock on the whole file
#[cfg(unix)]
pub(super) fn lock_exclusive(file: &File) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if result == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Drop the lock early (closing the descriptor drops it as well)
#[cfg(unix)]
pub(super) fn unlock(file: &File) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_UN) };
    if result == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
pub(super) fn lock_exclusive(_file: &File) -> io::Result<()> {
    Ok(())
}

#[cfg(not(unix))]
pub(super) fn unlock(_file: &File) -> io::Result<()> {
    Ok(())
}
