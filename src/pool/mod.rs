//! Buffer pool: keyed caching of shared-memory buffers.
//!
//! A [`BufferPool`] hands out [`ShmBuffer`]s keyed by `(tag, width, height)`.
//! Each buffer owns a [`BackingFile`] and, while instantiated, a mapping of
//! it, a [`PixelView`] over that mapping and a peer buffer handle over the
//! same bytes.
//!
//! # Lifecycle
//!
//! - A buffer is **busy** from acquisition until the display peer releases it.
//!   Busy buffers are never reused, purged or destroyed.
//! - When a tag asks for a new size, its idle buffers of other sizes are
//!   marked for **purging**. They are destroyed at the start of that tag's
//!   next acquisition.
//! - [`BufferPool::scroll`] re-bases a busy buffer inside its backing file
//!   instead of redrawing it (see [`ScrollRegion`]).
//!
//! # Example
//!
//! ```rust,ignore
//! use shmbuf::{BufferPool, PoolConfig, Tag};
//! use shmbuf::peer::LoopbackPeer;
//! use std::sync::Arc;
//!
//! let peer = Arc::new(LoopbackPeer::new());
//! let mut pool = BufferPool::new(Arc::clone(&peer), PoolConfig::default())?;
//!
//! let buffer = pool.acquire(Tag::new(1), 800, 600)?;
//! buffer.pixels_mut()?.fill(0xff20_2020);
//! let handle = buffer.peer_buffer()?.id();
//!
//! // ... attach and commit `handle`; later the peer releases it
//! peer.release(handle)?;
//! ```

mod instance;
mod scroll;
mod stats;

pub use scroll::ScrollRegion;
pub use stats::PoolStats;

use crate::buffer::PixelView;
use crate::config::{FailurePolicy, PoolConfig};
use crate::error::{Error, Result};
use crate::format::BufferGeometry;
use crate::memory::{BackingFile, Mapping, scrolling_possible};
use crate::observability::{PoolMetrics, span_acquire, span_pool};
use crate::peer::DisplayPeer;
use instance::Instance;
use rustix::fd::AsFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::Span;

// ============================================================================
// Identifiers
// ============================================================================

/// Opaque identifier grouping the buffers of one logical consumer.
///
/// Distinct tags never share buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(u64);

impl Tag {
    /// Create a tag.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The raw tag value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for Tag {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Handle to a buffer owned by a [`BufferPool`].
///
/// Ids are generation checked: once the buffer is destroyed its id never
/// resolves again, even if the slot is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId {
    slot: u32,
    generation: u32,
}

// ============================================================================
// ShmBuffer
// ============================================================================

/// One rendering surface backed by its own memory file.
pub struct ShmBuffer<P: DisplayPeer> {
    id: BufferId,
    tag: Tag,
    geometry: BufferGeometry,
    /// Byte offset of the buffer inside `backing`.
    offset: usize,
    /// Dropped before `backing`, so the descriptor outlives every mapping.
    instance: Option<Instance<P>>,
    backing: BackingFile,
    /// Shared with the release listener registered on the peer buffer.
    busy: Arc<AtomicBool>,
    purge: bool,
}

impl<P: DisplayPeer> ShmBuffer<P> {
    fn new(id: BufferId, tag: Tag, geometry: BufferGeometry, backing: BackingFile) -> Self {
        Self {
            id,
            tag,
            geometry,
            offset: 0,
            instance: None,
            backing,
            busy: Arc::new(AtomicBool::new(true)),
            purge: false,
        }
    }

    /// Pool handle of this buffer.
    pub fn id(&self) -> BufferId {
        self.id
    }

    /// Consumer tag.
    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.geometry.width()
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.geometry.height()
    }

    /// Bytes per row.
    pub fn stride(&self) -> usize {
        self.geometry.stride()
    }

    /// `stride * height`.
    pub fn size(&self) -> usize {
        self.geometry.size()
    }

    /// Full geometry.
    pub fn geometry(&self) -> BufferGeometry {
        self.geometry
    }

    /// Current byte offset inside the backing file.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The backing memory file.
    pub fn backing(&self) -> &BackingFile {
        &self.backing
    }

    /// True until the display peer releases the buffer.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// True if the buffer will be destroyed on its tag's next acquisition.
    pub fn is_purge_pending(&self) -> bool {
        self.purge
    }

    /// True while the mapping, pixel view and peer buffer exist.
    pub fn is_instantiated(&self) -> bool {
        self.instance.is_some()
    }

    /// Pixel access.
    pub fn pixels(&self) -> Result<&PixelView> {
        self.instance
            .as_ref()
            .map(Instance::view)
            .ok_or(Error::NotInstantiated)
    }

    /// Mutable pixel access.
    pub fn pixels_mut(&mut self) -> Result<&mut PixelView> {
        self.instance
            .as_mut()
            .map(Instance::view_mut)
            .ok_or(Error::NotInstantiated)
    }

    /// The handle to attach to a surface.
    pub fn peer_buffer(&self) -> Result<&P::Buffer> {
        self.instance
            .as_ref()
            .map(Instance::peer_buffer)
            .ok_or(Error::NotInstantiated)
    }

    /// The kernel mapping the pixel view points into.
    pub fn mapping(&self) -> Result<&Mapping> {
        self.instance
            .as_ref()
            .map(Instance::mapping)
            .ok_or(Error::NotInstantiated)
    }

    /// Map the buffer at `offset` and mint its peer handle.
    fn instantiate(&mut self, peer: &Arc<P>, offset: usize, max_pool_size: usize) -> Result<()> {
        debug_assert!(self.instance.is_none());

        let end = offset + self.size();
        if end > max_pool_size {
            return Err(Error::PoolBoundExceeded {
                end,
                bound: max_pool_size,
            });
        }

        let instance = Instance::new(
            peer,
            self.backing.as_fd(),
            self.geometry,
            offset,
            &self.busy,
        )?;
        self.instance = Some(instance);
        self.offset = offset;
        Ok(())
    }

    /// Tear down the mapping, pixel view and peer buffer, keeping the
    /// backing file. Does nothing if already torn down.
    fn destroy_mapping_keep_fd(&mut self) {
        self.instance = None;
    }
}

impl<P: DisplayPeer> std::fmt::Debug for ShmBuffer<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShmBuffer")
            .field("id", &self.id)
            .field("tag", &self.tag)
            .field("geometry", &self.geometry)
            .field("offset", &self.offset)
            .field("backing", &self.backing)
            .field("busy", &self.is_busy())
            .field("purge", &self.purge)
            .field("instantiated", &self.is_instantiated())
            .finish()
    }
}

// ============================================================================
// BufferPool
// ============================================================================

struct Slot<P: DisplayPeer> {
    generation: u32,
    entry: Option<ShmBuffer<P>>,
}

#[derive(Debug, Default)]
struct Counters {
    allocations: u64,
    cache_hits: u64,
    purged: u64,
    scrolls: u64,
    wraps: u64,
}

/// Cache of shared-memory buffers for one display connection.
///
/// All mutation happens on the thread that owns the pool. Release events
/// from the peer only clear a buffer's busy flag.
pub struct BufferPool<P: DisplayPeer> {
    peer: Arc<P>,
    config: PoolConfig,
    slots: Vec<Slot<P>>,
    free: Vec<u32>,
    counters: Counters,
    metrics: PoolMetrics,
}

impl<P: DisplayPeer> BufferPool<P> {
    /// Create an empty pool talking to `peer`.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` does not validate.
    pub fn new(peer: Arc<P>, config: PoolConfig) -> Result<Self> {
        config.validate()?;
        let metrics = PoolMetrics::new(&config.backing_name);

        Ok(Self {
            peer,
            config,
            slots: Vec::new(),
            free: Vec::new(),
            counters: Counters::default(),
            metrics,
        })
    }

    /// Get a busy buffer of `width` x `height` for `tag`.
    ///
    /// Returns an idle cached buffer of the same size if there is one,
    /// otherwise allocates a new one. Stale buffers of `tag` marked by an
    /// earlier call are destroyed first.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid dimensions or a buffer larger than the
    /// pool bound. Allocation failures abort the process under
    /// [`FailurePolicy::Abort`] and are returned under
    /// [`FailurePolicy::Propagate`].
    pub fn acquire(&mut self, tag: Tag, width: u32, height: u32) -> Result<&mut ShmBuffer<P>> {
        let span = if self.config.tracing.acquire_spans {
            span_acquire(&self.config.backing_name, tag, width, height)
        } else {
            Span::none()
        };
        let _enter = span.enter();

        let geometry = BufferGeometry::new(width, height)?;
        if geometry.size() > self.config.max_pool_size {
            return Err(Error::PoolBoundExceeded {
                end: geometry.size(),
                bound: self.config.max_pool_size,
            });
        }

        // Destroy buffers marked on an earlier call and released since.
        let stale: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| {
                slot.entry
                    .as_ref()
                    .is_some_and(|e| e.tag == tag && e.purge && !e.is_busy())
            })
            .map(|(index, _)| index)
            .collect();
        for index in stale {
            if let Some(entry) = self.remove(index) {
                tracing::debug!(
                    "tag={:#x}: purging buffer {}x{} (offset={:#x})",
                    tag.get(),
                    entry.width(),
                    entry.height(),
                    entry.offset
                );
            }
        }

        let hit = self.slots.iter().position(|slot| {
            slot.entry
                .as_ref()
                .is_some_and(|e| e.tag == tag && e.geometry.matches(width, height) && !e.is_busy())
        });
        if let Some(index) = hit {
            self.counters.cache_hits += 1;
            self.metrics.record_cache_hit();
            tracing::debug!("tag={:#x}: re-using buffer from cache", tag.get());

            let entry = self.slots[index]
                .entry
                .as_mut()
                .ok_or(Error::UnknownBuffer)?;
            entry.purge = false;
            entry.busy.store(true, Ordering::Release);
            return Ok(entry);
        }

        // Idle buffers of another size will not be asked for again.
        for entry in self.slots.iter_mut().filter_map(|slot| slot.entry.as_mut()) {
            if entry.tag == tag && !entry.is_busy() && !entry.geometry.matches(width, height) {
                tracing::debug!(
                    "tag={:#x}: marking {}x{} buffer for purging",
                    tag.get(),
                    entry.width(),
                    entry.height()
                );
                entry.purge = true;
            }
        }

        let index = match self.allocate(tag, geometry) {
            Ok(index) => index,
            Err(e) => return Err(self.fail("failed to allocate buffer", e)),
        };

        self.counters.allocations += 1;
        self.metrics.record_allocation();
        self.publish_footprint();

        self.slots[index]
            .entry
            .as_mut()
            .ok_or(Error::UnknownBuffer)
    }

    /// Create, instantiate and insert a new busy buffer. Returns its slot.
    fn allocate(&mut self, tag: Tag, geometry: BufferGeometry) -> Result<usize> {
        let backing = BackingFile::create(&self.config.backing_name, geometry.size())?;

        let id = self.next_id();
        let mut entry = ShmBuffer::new(id, tag, geometry, backing);
        entry.instantiate(&self.peer, 0, self.config.max_pool_size)?;

        tracing::debug!(
            "tag={:#x}: allocated new buffer: {}x{}, stride={}, size={}",
            tag.get(),
            geometry.width(),
            geometry.height(),
            geometry.stride(),
            geometry.size()
        );

        let index = id.slot as usize;
        if index == self.slots.len() {
            self.slots.push(Slot {
                generation: id.generation,
                entry: Some(entry),
            });
        } else {
            self.free.pop();
            self.slots[index].entry = Some(entry);
        }
        Ok(index)
    }

    /// Id the next inserted buffer will get.
    fn next_id(&self) -> BufferId {
        match self.free.last() {
            Some(&slot) => BufferId {
                slot,
                generation: self.slots[slot as usize].generation,
            },
            None => BufferId {
                slot: self.slots.len() as u32,
                generation: 0,
            },
        }
    }

    /// Take the buffer out of slot `index` and retire the slot's id.
    fn remove(&mut self, index: usize) -> Option<ShmBuffer<P>> {
        let slot = self.slots.get_mut(index)?;
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index as u32);

        self.counters.purged += 1;
        self.metrics.record_purge();
        Some(entry)
    }

    /// Look up a buffer.
    pub fn get(&self, id: BufferId) -> Option<&ShmBuffer<P>> {
        self.slots
            .get(id.slot as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_ref())
    }

    /// Look up a buffer for mutation.
    pub fn get_mut(&mut self, id: BufferId) -> Option<&mut ShmBuffer<P>> {
        lookup_mut(&mut self.slots, id)
    }

    /// Destroy every buffer of `tag`, stale or not.
    ///
    /// # Panics
    ///
    /// Panics if one of them is still busy.
    pub fn release_all_for(&mut self, tag: Tag) {
        tracing::debug!("tag={:#x}: purging all buffers", tag.get());

        for index in 0..self.slots.len() {
            let matches = self.slots[index].entry.as_ref().is_some_and(|e| {
                assert!(
                    e.tag != tag || !e.is_busy(),
                    "tag={:#x}: purging a busy buffer",
                    tag.get()
                );
                e.tag == tag
            });
            if matches {
                self.remove(index);
            }
        }
        self.publish_footprint();
    }

    /// Destroy every buffer. Call once, when the display connection goes away.
    pub fn shutdown(&mut self) {
        let span = span_pool(&self.config.backing_name, "shutdown");
        let _enter = span.enter();

        let mut destroyed = 0;
        for index in 0..self.slots.len() {
            if self.remove(index).is_some() {
                destroyed += 1;
            }
        }
        tracing::debug!("destroyed {} buffers", destroyed);
        self.publish_footprint();
    }

    /// Whether [`scroll`](Self::scroll) can be used.
    ///
    /// False when the backing store cannot punch holes, on 32-bit targets, or
    /// when disabled in the configuration.
    pub fn scrolling_supported(&self) -> bool {
        self.config.allow_scrolling && scrolling_possible()
    }

    /// Snapshot of the pool's state and counters.
    pub fn stats(&self) -> PoolStats {
        let mut stats = PoolStats {
            allocations: self.counters.allocations,
            cache_hits: self.counters.cache_hits,
            purged: self.counters.purged,
            scrolls: self.counters.scrolls,
            wraps: self.counters.wraps,
            ..Default::default()
        };
        for entry in self.entries() {
            stats.entries += 1;
            if entry.is_busy() {
                stats.busy += 1;
            }
            if entry.purge {
                stats.purge_pending += 1;
            }
            stats.backing_bytes += entry.backing.len();
        }
        stats
    }

    /// Number of buffers owned by the pool.
    pub fn len(&self) -> usize {
        self.entries().count()
    }

    /// True if the pool owns no buffers.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over all buffers.
    pub fn entries(&self) -> impl Iterator<Item = &ShmBuffer<P>> {
        self.slots.iter().filter_map(|slot| slot.entry.as_ref())
    }

    /// The display peer.
    pub fn peer(&self) -> &Arc<P> {
        &self.peer
    }

    /// The pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    fn publish_footprint(&self) {
        let backing: usize = self.entries().map(|e| e.backing.len()).sum();
        self.metrics.record_footprint(self.len(), backing);
    }

    /// Apply the failure policy to an allocation or mid-scroll error.
    fn fail(&self, what: &str, err: Error) -> Error {
        tracing::error!("{}: {}", what, err);
        match self.config.failure_policy {
            FailurePolicy::Abort => std::process::abort(),
            FailurePolicy::Propagate => err,
        }
    }
}

impl<P: DisplayPeer> std::fmt::Debug for BufferPool<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

fn lookup_mut<P: DisplayPeer>(slots: &mut [Slot<P>], id: BufferId) -> Option<&mut ShmBuffer<P>> {
    slots
        .get_mut(id.slot as usize)
        .filter(|slot| slot.generation == id.generation)
        .and_then(|slot| slot.entry.as_mut())
}
