//! Scrolling by moving a buffer inside its backing file.
//!
//! Scrolling a buffer up by `n` rows without redrawing it amounts to mapping
//! it `n * stride` bytes further into the file: the rows the consumer wants
//! to keep are already there. The file grows at the end and the pages left
//! behind are punched out so memory use stays at roughly one buffer.
//!
//! ```text
//!  file:  |<-- punched -->|<----------- buffer ----------->|
//!         0            offset                       offset + size
//!
//!  after scrolling 2 rows forward:
//!         |<----- punched ----->|<----------- buffer ----------->|
//!         0              offset + 2*stride
//! ```
//!
//! Rows that must stay put (margins such as a status line) are moved
//! against the scroll direction before or after re-basing. When the offset
//! would run past the pool bound the buffer is first copied back to the other
//! end of the file ("wraparound").

use super::{BufferId, BufferPool, ShmBuffer, lookup_mut};
use crate::error::{Error, Result};
use crate::memory::{Mapping, align_down};
use crate::observability::span_scroll;
use crate::peer::DisplayPeer;
use std::sync::Arc;
use tracing::Span;

/// Rows preserved across a scroll.
///
/// Rows `[top_margin, top_margin + top_keep)` and the `bottom_keep` rows that
/// end `bottom_margin` rows above the bottom stay where they are on screen.
/// Everything else shifts by the scroll amount; rows scrolled into view have
/// undefined content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrollRegion {
    /// Rows above the top kept range.
    pub top_margin: u32,
    /// Height of the top kept range.
    pub top_keep: u32,
    /// Rows below the bottom kept range.
    pub bottom_margin: u32,
    /// Height of the bottom kept range.
    pub bottom_keep: u32,
}

impl ScrollRegion {
    /// Keep nothing: a plain shift of the whole buffer.
    pub fn none() -> Self {
        Self::default()
    }

    /// Keep `rows` rows starting `margin` rows from the top.
    pub fn with_top(mut self, margin: u32, rows: u32) -> Self {
        self.top_margin = margin;
        self.top_keep = rows;
        self
    }

    /// Keep `rows` rows ending `margin` rows from the bottom.
    pub fn with_bottom(mut self, margin: u32, rows: u32) -> Self {
        self.bottom_margin = margin;
        self.bottom_keep = rows;
        self
    }

    fn validate(&self, rows: u32, height: u32) -> Result<()> {
        let fits = |margin: u32, keep: u32| {
            keep == 0 || margin as u64 + rows as u64 + keep as u64 <= height as u64
        };

        if !fits(self.top_margin, self.top_keep) {
            return Err(Error::InvalidGeometry(format!(
                "top kept rows {}+{} do not survive a {} row scroll of {} rows",
                self.top_margin, self.top_keep, rows, height
            )));
        }
        if !fits(self.bottom_margin, self.bottom_keep) {
            return Err(Error::InvalidGeometry(format!(
                "bottom kept rows {}+{} do not survive a {} row scroll of {} rows",
                self.bottom_margin, self.bottom_keep, rows, height
            )));
        }
        Ok(())
    }
}

/// Offsets of one scroll, computed and checked before anything is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScrollPlan {
    /// Scroll amount in rows.
    rows: u32,
    /// Where the buffer is copied to first, if it has to wrap.
    wrap_to: Option<usize>,
    /// Final offset.
    new_offset: usize,
}

impl ScrollPlan {
    fn forward(offset: usize, size: usize, delta: usize, max: usize) -> Result<(Option<usize>, usize)> {
        let (wrap_to, start) = if offset + delta + size > max {
            (Some(0), 0)
        } else {
            (None, offset)
        };

        let end = start + delta + size;
        if end > max {
            return Err(Error::PoolBoundExceeded { end, bound: max });
        }
        Ok((wrap_to, start + delta))
    }

    fn reverse(offset: usize, size: usize, delta: usize, max: usize) -> Result<(Option<usize>, usize)> {
        let (wrap_to, start) = if delta > offset {
            let target = align_down(max - size);
            (Some(target), target)
        } else {
            (None, offset)
        };

        if delta > start {
            return Err(Error::PoolBoundExceeded {
                end: delta + size,
                bound: max,
            });
        }
        Ok((wrap_to, start - delta))
    }

    fn new<P: DisplayPeer>(
        entry: &ShmBuffer<P>,
        rows: i32,
        region: &ScrollRegion,
        max: usize,
    ) -> Result<Self> {
        let abs = rows.unsigned_abs();
        region.validate(abs, entry.height())?;

        let delta = abs as usize * entry.stride();
        let (wrap_to, new_offset) = if rows > 0 {
            Self::forward(entry.offset, entry.size(), delta, max)?
        } else {
            Self::reverse(entry.offset, entry.size(), delta, max)?
        };

        Ok(Self {
            rows: abs,
            wrap_to,
            new_offset,
        })
    }
}

impl<P: DisplayPeer> BufferPool<P> {
    /// Scroll buffer `id` by `rows` rows without redrawing it.
    ///
    /// Positive `rows` move content up (towards row 0), negative move it
    /// down. Rows inside `region`'s kept ranges stay where they are.
    ///
    /// # Errors
    ///
    /// Returns an error, with the buffer untouched, if scrolling is not
    /// supported, `id` is unknown, the buffer is not busy and instantiated,
    /// or `region` and `rows` do not fit the buffer. Failures after the
    /// buffer has been modified abort the process under
    /// [`FailurePolicy::Abort`](crate::FailurePolicy::Abort); under
    /// `Propagate` the buffer is destroyed and the error returned.
    pub fn scroll(&mut self, id: BufferId, rows: i32, region: ScrollRegion) -> Result<()> {
        if !self.scrolling_supported() {
            return Err(Error::ScrollUnsupported);
        }

        let max = self.config.max_pool_size;
        let peer = Arc::clone(&self.peer);
        let entry = lookup_mut(&mut self.slots, id).ok_or(Error::UnknownBuffer)?;

        if !entry.is_busy() {
            return Err(Error::NotBusy);
        }
        if !entry.is_instantiated() {
            return Err(Error::NotInstantiated);
        }
        if rows == 0 {
            return Ok(());
        }

        let plan = ScrollPlan::new(entry, rows, &region, max)?;

        let span = if self.config.tracing.scroll_spans {
            span_scroll(&self.config.backing_name, rows, entry.offset)
        } else {
            Span::none()
        };
        let _enter = span.enter();
        let timer = self.metrics.start_scroll_timer();

        let result = if rows > 0 {
            scroll_forward(entry, &peer, &plan, &region, max)
        } else {
            scroll_reverse(entry, &peer, &plan, &region, max)
        };

        match result {
            Ok(()) => {
                tracing::trace!(
                    "scrolled {} rows in {:?}, offset now {:#x}",
                    rows,
                    timer.elapsed(),
                    plan.new_offset
                );
                self.counters.scrolls += 1;
                self.metrics.record_scroll();
                if plan.wrap_to.is_some() {
                    self.counters.wraps += 1;
                    self.metrics.record_wrap();
                }
                self.publish_footprint();
                Ok(())
            }
            Err(e) => {
                drop(timer);
                let err = self.fail("failed to scroll buffer", e);
                self.remove(id.slot as usize);
                self.publish_footprint();
                Err(err)
            }
        }
    }
}

fn scroll_forward<P: DisplayPeer>(
    entry: &mut ShmBuffer<P>,
    peer: &Arc<P>,
    plan: &ScrollPlan,
    region: &ScrollRegion,
    max: usize,
) -> Result<()> {
    let rows = plan.rows;
    let height = entry.height();
    let size = entry.size();

    if let Some(target) = plan.wrap_to {
        tracing::info!(
            "scroll: wrapping buffer: offset={:#x} -> {:#x}",
            entry.offset,
            target
        );
        wrap(entry, peer, target, max)?;
    }

    let new_offset = plan.new_offset;
    debug_assert_eq!(new_offset, entry.offset + rows as usize * entry.stride());

    tracing::trace!("scroll: truncating to {:#x}", new_offset + size);
    entry.backing.set_len(new_offset + size)?;

    if region.top_keep > 0 {
        let view = entry.pixels_mut()?;
        view.copy_rows(region.top_margin, region.top_margin + rows, region.top_keep)?;
    }

    entry.destroy_mapping_keep_fd();

    tracing::trace!("scroll: punching hole [0, {:#x})", new_offset);
    entry.backing.punch_hole(0, new_offset).map_err(|e| {
        tracing::error!("failed to trim backing memory file: {}", e);
        e
    })?;

    entry.instantiate(peer, new_offset, max)?;

    if region.bottom_keep > 0 {
        let kept = region.bottom_margin + region.bottom_keep;
        let view = entry.pixels_mut()?;
        view.copy_rows(height - kept - rows, height - kept, region.bottom_keep)?;
    }

    Ok(())
}

fn scroll_reverse<P: DisplayPeer>(
    entry: &mut ShmBuffer<P>,
    peer: &Arc<P>,
    plan: &ScrollPlan,
    region: &ScrollRegion,
    max: usize,
) -> Result<()> {
    let rows = plan.rows;
    let height = entry.height();
    let size = entry.size();

    if let Some(target) = plan.wrap_to {
        tracing::info!(
            "scroll: wrapping buffer: offset={:#x} -> {:#x}",
            entry.offset,
            target
        );
        tracing::trace!("scroll: truncating to {:#x}", max);
        entry.backing.set_len(max)?;
        wrap(entry, peer, target, max)?;
    }

    let new_offset = plan.new_offset;
    debug_assert_eq!(new_offset + rows as usize * entry.stride(), entry.offset);

    if region.bottom_keep > 0 {
        let kept = region.bottom_margin + region.bottom_keep;
        let view = entry.pixels_mut()?;
        view.copy_rows(height - kept, height - kept - rows, region.bottom_keep)?;
    }

    entry.destroy_mapping_keep_fd();

    tracing::trace!("scroll: truncating to {:#x}", new_offset + size);
    entry.backing.set_len(new_offset + size)?;

    entry.instantiate(peer, new_offset, max)?;

    if region.top_keep > 0 {
        let view = entry.pixels_mut()?;
        view.copy_rows(region.top_margin + rows, region.top_margin, region.top_keep)?;
    }

    Ok(())
}

/// Copy the buffer to `new_offset` and re-instantiate it there.
///
/// The backing file must already extend past `new_offset + size`.
fn wrap<P: DisplayPeer>(
    entry: &mut ShmBuffer<P>,
    peer: &Arc<P>,
    new_offset: usize,
    max: usize,
) -> Result<()> {
    let size = entry.size();
    let mut target = Mapping::map(&entry.backing, new_offset, size)?;

    let source = entry.pixels()?.as_bytes();
    let overlaps = new_offset < entry.offset + size && entry.offset < new_offset + size;
    if overlaps {
        // Both windows alias the same file pages.
        let staged = source.to_vec();
        target.data_mut().copy_from_slice(&staged);
    } else {
        target.data_mut().copy_from_slice(source);
    }
    drop(target);

    entry.destroy_mapping_keep_fd();
    entry.instantiate(peer, new_offset, max)
}
