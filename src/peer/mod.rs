//! The display peer: the compositing process that reads our buffers.
//!
//! The peer is opaque to this crate. It accepts a pool descriptor (a file
//! descriptor plus a length), mints buffer handles at byte offsets inside
//! that pool, and later tells us, asynchronously, when it no longer reads a
//! buffer. [`DisplayPeer`] is that contract; an implementation typically wraps
//! a `wl_shm` global and routes `wl_buffer.release` events into the listener
//! registered with [`DisplayPeer::on_released`].
//!
//! [`LoopbackPeer`] is an in-process implementation used for tests, benches
//! and demos.

mod loopback;

pub use loopback::{BufferInfo, FailPoint, LoopbackBuffer, LoopbackPeer, LoopbackPool};

use crate::error::Result;
use crate::format::PixelFormat;
use rustix::fd::BorrowedFd;

/// Callback invoked when the peer releases a buffer.
///
/// Release events arrive on the control thread's event turn; the listener
/// installed by the pool only flips the buffer's busy flag.
pub type ReleaseListener = Box<dyn FnMut() + Send + 'static>;

/// Shared-memory buffer protocol as seen from the client side.
pub trait DisplayPeer {
    /// Peer-side pool descriptor handle.
    type Pool;
    /// Peer-side buffer handle.
    type Buffer;

    /// Create a pool descriptor over the first `len` bytes of `fd`.
    fn create_pool(&self, fd: BorrowedFd<'_>, len: usize) -> Result<Self::Pool>;

    /// Create a buffer handle inside `pool`.
    fn create_buffer(
        &self,
        pool: &Self::Pool,
        offset: usize,
        width: u32,
        height: u32,
        stride: usize,
        format: PixelFormat,
    ) -> Result<Self::Buffer>;

    /// Destroy a pool descriptor. Buffers created from it stay valid.
    fn destroy_pool(&self, pool: Self::Pool);

    /// Destroy a buffer handle.
    fn destroy_buffer(&self, buffer: Self::Buffer);

    /// Register the listener to run when the peer releases `buffer`.
    fn on_released(&self, buffer: &Self::Buffer, listener: ReleaseListener);
}
