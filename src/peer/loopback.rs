//! In-process display peer.

use super::{DisplayPeer, ReleaseListener};
use crate::error::{Error, Result};
use crate::format::PixelFormat;
use rustix::fd::{BorrowedFd, OwnedFd};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Pool descriptor handle minted by [`LoopbackPeer`].
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct LoopbackPool {
    id: u64,
}

/// Buffer handle minted by [`LoopbackPeer`].
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct LoopbackBuffer {
    id: u64,
}

impl LoopbackBuffer {
    /// Peer-side id, used to address the buffer in [`LoopbackPeer::release`].
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// What the peer knows about one live buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferInfo {
    /// Length of the pool descriptor the buffer was created from.
    pub pool_len: usize,
    /// Byte offset of the buffer inside the pool.
    pub offset: usize,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Bytes per row.
    pub stride: usize,
    /// Pixel format.
    pub format: PixelFormat,
}

/// Request that the next call of a given kind fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    /// Fail the next `create_pool`.
    Pool,
    /// Fail the next `create_buffer`.
    Buffer,
}

struct PoolRecord {
    fd: Arc<OwnedFd>,
    len: usize,
}

struct BufferRecord {
    info: BufferInfo,
    fd: Arc<OwnedFd>,
    listener: Option<ReleaseListener>,
}

#[derive(Default)]
struct State {
    next_id: u64,
    pools: HashMap<u64, PoolRecord>,
    buffers: HashMap<u64, BufferRecord>,
    pools_created: u64,
    buffers_created: u64,
    fail_next: Option<FailPoint>,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn should_fail(&mut self, point: FailPoint) -> bool {
        if self.fail_next == Some(point) {
            self.fail_next = None;
            true
        } else {
            false
        }
    }
}

/// A display peer living in this process.
///
/// Behaves like a compositor would: it duplicates the descriptor handed to
/// `create_pool` and keeps it for as long as any buffer from that pool
/// exists, validates buffer ranges against the pool, and can read back the
/// bytes it would display. Release events are delivered explicitly through
/// [`release`](Self::release).
#[derive(Default)]
pub struct LoopbackPeer {
    state: Mutex<State>,
}

impl LoopbackPeer {
    /// Create a peer with no pools or buffers.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Signal that the peer is done reading buffer `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownBuffer`] if no such buffer is alive.
    pub fn release(&self, id: u64) -> Result<()> {
        let listener = {
            let mut state = self.state();
            let record = state.buffers.get_mut(&id).ok_or(Error::UnknownBuffer)?;
            record.listener.take()
        };

        tracing::trace!("loopback peer: release buffer {}", id);

        if let Some(mut listener) = listener {
            listener();
            if let Some(record) = self.state().buffers.get_mut(&id) {
                record.listener = Some(listener);
            }
        }
        Ok(())
    }

    /// Release every live buffer.
    pub fn release_all(&self) -> Result<()> {
        for id in self.live_buffer_ids() {
            self.release(id)?;
        }
        Ok(())
    }

    /// Read the bytes of buffer `id` as the peer would see them.
    pub fn read_buffer(&self, id: u64) -> Result<Vec<u8>> {
        let (fd, info) = {
            let state = self.state();
            let record = state.buffers.get(&id).ok_or(Error::UnknownBuffer)?;
            (Arc::clone(&record.fd), record.info)
        };

        let mut bytes = vec![0u8; info.stride * info.height as usize];
        let mut filled = 0;
        while filled < bytes.len() {
            let n = rustix::io::pread(&*fd, &mut bytes[filled..], (info.offset + filled) as u64)?;
            if n == 0 {
                return Err(Error::Peer(format!(
                    "buffer {id}: backing file ends after {filled} bytes"
                )));
            }
            filled += n;
        }
        Ok(bytes)
    }

    /// Info for buffer `id`, if alive.
    pub fn buffer_info(&self, id: u64) -> Option<BufferInfo> {
        self.state().buffers.get(&id).map(|record| record.info)
    }

    /// Ids of all live buffers, in ascending order.
    pub fn live_buffer_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.state().buffers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of live buffer handles.
    pub fn live_buffers(&self) -> usize {
        self.state().buffers.len()
    }

    /// Number of live pool descriptors.
    pub fn live_pools(&self) -> usize {
        self.state().pools.len()
    }

    /// Total pool descriptors ever created.
    pub fn pools_created(&self) -> u64 {
        self.state().pools_created
    }

    /// Total buffer handles ever created.
    pub fn buffers_created(&self) -> u64 {
        self.state().buffers_created
    }

    /// Make the next call matching `point` fail.
    pub fn fail_next(&self, point: FailPoint) {
        self.state().fail_next = Some(point);
    }
}

impl DisplayPeer for LoopbackPeer {
    type Pool = LoopbackPool;
    type Buffer = LoopbackBuffer;

    fn create_pool(&self, fd: BorrowedFd<'_>, len: usize) -> Result<LoopbackPool> {
        let mut state = self.state();
        if state.should_fail(FailPoint::Pool) {
            return Err(Error::Peer("injected pool failure".into()));
        }

        let file_len = rustix::fs::fstat(fd)?.st_size as usize;
        if len > file_len {
            return Err(Error::Peer(format!(
                "pool of {len} bytes exceeds backing file of {file_len} bytes"
            )));
        }

        let fd = rustix::io::fcntl_dupfd_cloexec(fd, 0)?;
        let id = state.next_id();
        state.pools.insert(
            id,
            PoolRecord {
                fd: Arc::new(fd),
                len,
            },
        );
        state.pools_created += 1;
        Ok(LoopbackPool { id })
    }

    fn create_buffer(
        &self,
        pool: &LoopbackPool,
        offset: usize,
        width: u32,
        height: u32,
        stride: usize,
        format: PixelFormat,
    ) -> Result<LoopbackBuffer> {
        let mut state = self.state();
        if state.should_fail(FailPoint::Buffer) {
            return Err(Error::Peer("injected buffer failure".into()));
        }

        let (fd, pool_len) = {
            let record = state
                .pools
                .get(&pool.id)
                .ok_or_else(|| Error::Peer(format!("unknown pool {}", pool.id)))?;
            (Arc::clone(&record.fd), record.len)
        };

        if stride < width as usize * format.bytes_per_pixel() {
            return Err(Error::Peer(format!(
                "stride {stride} too small for width {width}"
            )));
        }
        let end = offset + stride * height as usize;
        if end > pool_len {
            return Err(Error::Peer(format!(
                "buffer ends at {end}, pool is {pool_len} bytes"
            )));
        }

        let id = state.next_id();
        state.buffers.insert(
            id,
            BufferRecord {
                info: BufferInfo {
                    pool_len,
                    offset,
                    width,
                    height,
                    stride,
                    format,
                },
                fd,
                listener: None,
            },
        );
        state.buffers_created += 1;
        Ok(LoopbackBuffer { id })
    }

    fn destroy_pool(&self, pool: LoopbackPool) {
        self.state().pools.remove(&pool.id);
    }

    fn destroy_buffer(&self, buffer: LoopbackBuffer) {
        self.state().buffers.remove(&buffer.id);
    }

    fn on_released(&self, buffer: &LoopbackBuffer, listener: ReleaseListener) {
        if let Some(record) = self.state().buffers.get_mut(&buffer.id) {
            record.listener = Some(listener);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::BackingFile;
    use rustix::fd::AsFd;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_pool_and_buffer_lifecycle() {
        let peer = LoopbackPeer::new();
        let file = BackingFile::create("test-peer", 4096).unwrap();

        let pool = peer.create_pool(file.as_fd(), 4096).unwrap();
        let buffer = peer
            .create_buffer(&pool, 0, 16, 16, 64, PixelFormat::Argb8888)
            .unwrap();
        peer.destroy_pool(pool);

        assert_eq!(peer.live_pools(), 0);
        assert_eq!(peer.live_buffers(), 1);
        assert_eq!(peer.buffer_info(buffer.id()).unwrap().stride, 64);

        peer.destroy_buffer(buffer);
        assert_eq!(peer.live_buffers(), 0);
        assert_eq!(peer.pools_created(), 1);
        assert_eq!(peer.buffers_created(), 1);
    }

    #[test]
    fn test_pool_longer_than_file_rejected() {
        let peer = LoopbackPeer::new();
        let file = BackingFile::create("test-peer-long", 100).unwrap();
        assert!(peer.create_pool(file.as_fd(), 101).is_err());
    }

    #[test]
    fn test_buffer_outside_pool_rejected() {
        let peer = LoopbackPeer::new();
        let file = BackingFile::create("test-peer-range", 1000).unwrap();
        let pool = peer.create_pool(file.as_fd(), 1000).unwrap();

        assert!(
            peer.create_buffer(&pool, 800, 25, 3, 100, PixelFormat::Argb8888)
                .is_err()
        );
        assert!(
            peer.create_buffer(&pool, 0, 25, 3, 96, PixelFormat::Argb8888)
                .is_err()
        );
        assert!(
            peer.create_buffer(&pool, 700, 25, 3, 100, PixelFormat::Argb8888)
                .is_ok()
        );
    }

    #[test]
    fn test_release_invokes_listener_each_time() {
        let peer = LoopbackPeer::new();
        let file = BackingFile::create("test-peer-release", 400).unwrap();
        let pool = peer.create_pool(file.as_fd(), 400).unwrap();
        let buffer = peer
            .create_buffer(&pool, 0, 25, 4, 100, PixelFormat::Argb8888)
            .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        peer.on_released(
            &buffer,
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        peer.release(buffer.id()).unwrap();
        peer.release(buffer.id()).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let id = buffer.id();
        peer.destroy_buffer(buffer);
        assert!(matches!(peer.release(id), Err(Error::UnknownBuffer)));
    }

    #[test]
    fn test_read_buffer_sees_file_bytes() {
        let peer = LoopbackPeer::new();
        let file = BackingFile::create("test-peer-read", 1000).unwrap();
        rustix::io::pwrite(&file, &[7u8; 100], 600).unwrap();

        let pool = peer.create_pool(file.as_fd(), 1000).unwrap();
        let buffer = peer
            .create_buffer(&pool, 600, 25, 1, 100, PixelFormat::Argb8888)
            .unwrap();

        // The peer keeps its own descriptor.
        drop(file);

        let bytes = peer.read_buffer(buffer.id()).unwrap();
        assert_eq!(bytes, vec![7u8; 100]);
    }

    #[test]
    fn test_injected_failures_fire_once() {
        let peer = LoopbackPeer::new();
        let file = BackingFile::create("test-peer-fail", 400).unwrap();

        peer.fail_next(FailPoint::Pool);
        assert!(peer.create_pool(file.as_fd(), 400).is_err());
        let pool = peer.create_pool(file.as_fd(), 400).unwrap();

        peer.fail_next(FailPoint::Buffer);
        assert!(
            peer.create_buffer(&pool, 0, 25, 4, 100, PixelFormat::Argb8888)
                .is_err()
        );
        assert!(
            peer.create_buffer(&pool, 0, 25, 4, 100, PixelFormat::Argb8888)
                .is_ok()
        );
    }
}
