//! Backing files: anonymous, resizable memfds.
//!
//! A backing file is the storage behind exactly one buffer. It is never
//! mapped in full: the buffer maps a `size`-byte window at some offset, and
//! the scroll engine moves that window around, growing and shrinking the file
//! and punching holes behind it so the kernel can reclaim the pages.

use crate::error::{Error, Result};
use rustix::fd::{AsFd, BorrowedFd, OwnedFd};
use rustix::fs::{FallocateFlags, MemfdFlags};
use std::ffi::CString;
use std::os::unix::io::{AsRawFd, RawFd};

/// An anonymous memory file (memfd) with a tracked logical length.
pub struct BackingFile {
    /// The memfd file descriptor. Closed on drop.
    fd: OwnedFd,
    /// Logical file size as last set by `ftruncate`.
    len: usize,
}

impl BackingFile {
    /// Create a new backing file of `len` bytes.
    ///
    /// # Arguments
    ///
    /// * `name` - Debug name (visible in `/proc/self/fd/`).
    /// * `len` - Initial size in bytes. Must be greater than 0.
    ///
    /// # Errors
    ///
    /// Returns an error if `len` is 0, or if `memfd_create` or `ftruncate`
    /// fails.
    pub fn create(name: &str, len: usize) -> Result<Self> {
        if len == 0 {
            return Err(Error::AllocationFailed(
                "size must be greater than 0".into(),
            ));
        }

        let cname = CString::new(name).map_err(|e| Error::AllocationFailed(e.to_string()))?;
        let fd = rustix::fs::memfd_create(&cname, MemfdFlags::CLOEXEC).map_err(|e| {
            tracing::error!("failed to create backing memory file: {}", e);
            e
        })?;

        let mut file = Self { fd, len: 0 };
        file.set_len(len)?;
        Ok(file)
    }

    /// Logical size in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if the file is zero bytes long.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Grow or shrink the file to `len` bytes.
    ///
    /// Growing never allocates pages; shrinking frees everything past `len`.
    pub fn set_len(&mut self, len: usize) -> Result<()> {
        rustix::fs::ftruncate(&self.fd, len as u64).map_err(|e| {
            tracing::error!(
                "failed to resize backing file from {} -> {}: {}",
                self.len,
                len,
                e
            );
            e
        })?;
        self.len = len;
        Ok(())
    }

    /// Release the pages backing `[offset, offset + len)` without changing
    /// the logical size. Reads from the range return zeros afterwards.
    pub fn punch_hole(&self, offset: usize, len: usize) -> Result<()> {
        rustix::fs::fallocate(
            &self.fd,
            FallocateFlags::PUNCH_HOLE | FallocateFlags::KEEP_SIZE,
            offset as u64,
            len as u64,
        )?;
        Ok(())
    }

    /// Bytes of physical storage currently allocated to the file.
    pub fn allocated_bytes(&self) -> Result<u64> {
        let stat = rustix::fs::fstat(&self.fd)?;
        Ok(stat.st_blocks as u64 * 512)
    }

    /// Get the raw file descriptor.
    pub fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl AsFd for BackingFile {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl std::fmt::Debug for BackingFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackingFile")
            .field("fd", &self.fd.as_raw_fd())
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backing_creation() {
        let file = BackingFile::create("test-backing", 4096).unwrap();
        assert_eq!(file.len(), 4096);
        assert!(!file.is_empty());
        assert!(file.as_raw_fd() >= 0);

        let stat = rustix::fs::fstat(&file).unwrap();
        assert_eq!(stat.st_size, 4096);
    }

    #[test]
    fn test_backing_zero_size_fails() {
        assert!(BackingFile::create("test-zero", 0).is_err());
    }

    #[test]
    fn test_backing_nul_name_fails() {
        assert!(BackingFile::create("bad\0name", 16).is_err());
    }

    #[test]
    fn test_backing_resize() {
        let mut file = BackingFile::create("test-resize", 100).unwrap();
        file.set_len(1 << 20).unwrap();
        assert_eq!(file.len(), 1 << 20);
        assert_eq!(rustix::fs::fstat(&file).unwrap().st_size, 1 << 20);

        file.set_len(300).unwrap();
        assert_eq!(file.len(), 300);
        assert_eq!(rustix::fs::fstat(&file).unwrap().st_size, 300);
    }

    #[test]
    fn test_punch_hole_keeps_size() {
        let file = BackingFile::create("test-punch", 8192).unwrap();
        if file.punch_hole(0, 4096).is_ok() {
            assert_eq!(rustix::fs::fstat(&file).unwrap().st_size, 8192);
        }
    }
}
