//! Shared mappings of a window inside a backing file.

use super::page;
use crate::error::{Error, Result};
use rustix::fd::AsFd;
use rustix::mm::{MapFlags, ProtFlags};
use std::ptr::NonNull;

/// A `MAP_SHARED`, read/write mapping of `[offset, offset + len)` of a file.
///
/// `mmap` only accepts page-aligned file offsets, so the mapping starts at the
/// page boundary at or below `offset` and is `page_skew` bytes longer than
/// requested. [`data`](Self::data) exposes only the requested window.
///
/// The mapping is unmapped on drop.
pub struct Mapping {
    /// Start of the kernel mapping (page aligned).
    ptr: NonNull<u8>,
    /// Length of the kernel mapping (`len + page_skew`).
    mapped_len: usize,
    /// Requested file offset.
    offset: usize,
    /// Bytes between the aligned start and `offset`.
    page_skew: usize,
    /// Requested length.
    len: usize,
}

impl Mapping {
    /// Map `len` bytes of `fd` starting at byte `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if `len` is 0 or `mmap` fails.
    pub fn map(fd: impl AsFd, offset: usize, len: usize) -> Result<Self> {
        if len == 0 {
            return Err(Error::AllocationFailed(
                "mapping length must be greater than 0".into(),
            ));
        }

        let aligned_offset = page::align_down(offset);
        let page_skew = page::page_skew(offset);
        let mapped_len = len + page_skew;

        debug_assert!(aligned_offset <= offset);
        debug_assert!(mapped_len >= len);

        tracing::trace!(
            "mmap: size={:#x}, offset={:#x}, size-aligned={:#x}, offset-aligned={:#x}",
            len,
            offset,
            mapped_len,
            aligned_offset
        );

        let ptr = unsafe {
            rustix::mm::mmap(
                std::ptr::null_mut(),
                mapped_len,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                fd,
                aligned_offset as u64,
            )
        }
        .map_err(|e| {
            tracing::error!("failed to mmap backing memory file: {}", e);
            e
        })?;

        let ptr = NonNull::new(ptr.cast::<u8>())
            .ok_or_else(|| Error::AllocationFailed("mmap returned null".into()))?;

        Ok(Self {
            ptr,
            mapped_len,
            offset,
            page_skew,
            len,
        })
    }

    /// Start of the kernel mapping (page aligned, before the skew).
    #[inline]
    pub fn base_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Start of the requested window.
    #[inline]
    pub fn data_ptr(&self) -> *mut u8 {
        // SAFETY: page_skew < mapped_len, so the result stays inside the mapping.
        unsafe { self.ptr.as_ptr().add(self.page_skew) }
    }

    /// Requested file offset.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Page-aligned file offset actually mapped.
    #[inline]
    pub fn aligned_offset(&self) -> usize {
        self.offset - self.page_skew
    }

    /// Bytes between the mapping start and the requested window.
    #[inline]
    pub fn page_skew(&self) -> usize {
        self.page_skew
    }

    /// Length of the requested window.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false; zero-length mappings cannot be created.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Length of the kernel mapping including the skew.
    #[inline]
    pub fn mapped_len(&self) -> usize {
        self.mapped_len
    }

    /// The requested window as bytes.
    pub fn data(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.data_ptr(), self.len) }
    }

    /// The requested window as mutable bytes.
    pub fn data_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.data_ptr(), self.len) }
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        unsafe {
            let _ = rustix::mm::munmap(self.ptr.as_ptr().cast(), self.mapped_len);
        }
    }
}

impl std::fmt::Debug for Mapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mapping")
            .field("offset", &self.offset)
            .field("aligned_offset", &self.aligned_offset())
            .field("page_skew", &self.page_skew)
            .field("len", &self.len)
            .finish()
    }
}

// SAFETY: the mapping is plain shared memory owned by this value; moving it to
// another thread moves the only handle that unmaps it.
unsafe impl Send for Mapping {}
