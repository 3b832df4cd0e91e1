//! Open flags
//!
//! Bitmask passed to `open`. `FORMAT` is `0x1`, so callers that pass a bare
//! `0x1` get a freshly formatted read/write store.

bitflags::bitflags! {
    /// Device open mode bitmask
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OpenFlags: u32 {
        /// Discard any existing store and write a fresh superblock
        const FORMAT = 0x1;
        /// Read access
        const READ = 0x2;
        /// Write access
        const WRITE = 0x4;
        /// Create a regular file device if the path does not exist
        const CREATE = 0x8;
        /// Read/write access
        const RW = Self::READ.bits() | Self::WRITE.bits();
    }
}

impl OpenFlags {
    /// Normalize the mode: no access bits means read/write, and
    /// `FORMAT`/`CREATE` imply write access.
    pub fn normalized(self) -> Self {
        let mut flags = self;
        if !flags.intersects(Self::RW) {
            flags |= Self::RW;
        }
        if flags.intersects(Self::FORMAT | Self::CREATE) {
            flags |= Self::RW;
        }
        flags
    }

    /// True if the device is opened for writing
    pub fn writable(self) -> bool {
        self.normalized().contains(Self::WRITE)
    }
}
