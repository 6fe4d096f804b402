//! The mapping, pixel view and peer buffer of one instantiated buffer.

use crate::buffer::PixelView;
use crate::error::{Error, Result};
use crate::format::BufferGeometry;
use crate::memory::Mapping;
use crate::peer::DisplayPeer;
use rustix::fd::BorrowedFd;
use std::mem::ManuallyDrop;
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Peer buffer handle, destroyed on drop.
struct PeerBuffer<P: DisplayPeer> {
    peer: Arc<P>,
    buffer: ManuallyDrop<P::Buffer>,
}

impl<P: DisplayPeer> Drop for PeerBuffer<P> {
    fn drop(&mut self) {
        // SAFETY: `buffer` is never touched again after this.
        let buffer = unsafe { ManuallyDrop::take(&mut self.buffer) };
        self.peer.destroy_buffer(buffer);
    }
}

/// A live mapping plus everything derived from it.
///
/// Fields drop in declaration order: the view goes first, then the peer
/// handle, then the mapping itself.
pub(crate) struct Instance<P: DisplayPeer> {
    view: PixelView,
    peer_buffer: PeerBuffer<P>,
    mapping: Mapping,
}

impl<P: DisplayPeer> Instance<P> {
    /// Map `geometry.size()` bytes of `fd` at `offset` and mint a peer buffer
    /// over the same bytes.
    ///
    /// On error every partially created resource has already been released.
    pub(crate) fn new(
        peer: &Arc<P>,
        fd: BorrowedFd<'_>,
        geometry: BufferGeometry,
        offset: usize,
        busy: &Arc<AtomicBool>,
    ) -> Result<Self> {
        let size = geometry.size();
        let mapping = Mapping::map(fd, offset, size)?;

        let pool = peer.create_pool(fd, offset + size).map_err(|e| {
            tracing::error!("failed to create SHM pool: {}", e);
            e
        })?;

        let buffer = peer.create_buffer(
            &pool,
            offset,
            geometry.width(),
            geometry.height(),
            geometry.stride(),
            geometry.format(),
        );

        // The buffer keeps its own reference to the backing memory.
        peer.destroy_pool(pool);

        let buffer = buffer.map_err(|e| {
            tracing::error!("failed to create SHM buffer: {}", e);
            e
        })?;
        let peer_buffer = PeerBuffer {
            peer: Arc::clone(peer),
            buffer: ManuallyDrop::new(buffer),
        };

        let busy = Arc::clone(busy);
        peer.on_released(
            &peer_buffer.buffer,
            Box::new(move || {
                let was_busy = busy.swap(false, Ordering::AcqRel);
                assert!(was_busy, "release event for a buffer that is not busy");
            }),
        );

        let data = NonNull::new(mapping.data_ptr())
            .ok_or_else(|| Error::AllocationFailed("mapping has a null data pointer".into()))?;
        // SAFETY: `data` points at `size` mapped bytes that stay mapped for as
        // long as `mapping` lives, which outlives `view` by field order. Offsets
        // are multiples of 4 and mappings start page aligned.
        let view = unsafe { PixelView::new(data, geometry) };

        Ok(Self {
            view,
            peer_buffer,
            mapping,
        })
    }

    pub(crate) fn view(&self) -> &PixelView {
        &self.view
    }

    pub(crate) fn view_mut(&mut self) -> &mut PixelView {
        &mut self.view
    }

    pub(crate) fn peer_buffer(&self) -> &P::Buffer {
        &self.peer_buffer.buffer
    }

    pub(crate) fn mapping(&self) -> &Mapping {
        &self.mapping
    }
}
