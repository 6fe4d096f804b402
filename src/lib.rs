//! # shmbuf
//!
//! Shared-memory pixel buffers for a display client.
//!
//! Every buffer lives in its own anonymous memory file (memfd). The client
//! draws through a [`PixelView`](buffer::PixelView) over a shared mapping of
//! that file, and the display peer reads the same bytes through a buffer
//! handle minted from a pool descriptor over the file.
//!
//! ## Features
//!
//! - **Keyed caching**: buffers are recycled per `(tag, width, height)`;
//!   stale sizes are purged lazily
//! - **Busy tracking**: a buffer stays reserved until the peer releases it
//! - **Scrolling without redraw**: a buffer is re-based inside its backing
//!   file and the pages behind it are punched out
//! - **Linux-native**: memfd_create, mmap, fallocate(PUNCH_HOLE) via rustix
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use shmbuf::prelude::*;
//! use std::sync::Arc;
//!
//! let peer = Arc::new(LoopbackPeer::new());
//! let mut pool = BufferPool::new(Arc::clone(&peer), PoolConfig::default())?;
//!
//! let buffer = pool.acquire(Tag::new(1), 640, 480)?;
//! let id = buffer.id();
//! buffer.pixels_mut()?.fill(0xff00_0000);
//!
//! if pool.scrolling_supported() {
//!     pool.scroll(id, 16, ScrollRegion::none().with_bottom(0, 1))?;
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod buffer;
pub mod config;
pub mod error;
pub mod format;
pub mod memory;
pub mod observability;
pub mod peer;
pub mod pool;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::buffer::PixelView;
    pub use crate::config::{FailurePolicy, PoolConfig};
    pub use crate::error::{Error, Result};
    pub use crate::format::{BufferGeometry, PixelFormat};
    pub use crate::peer::{DisplayPeer, LoopbackPeer};
    pub use crate::pool::{BufferId, BufferPool, ScrollRegion, ShmBuffer, Tag};
}

pub use config::{FailurePolicy, PoolConfig};
pub use error::{Error, Result};
pub use pool::{BufferId, BufferPool, PoolStats, ScrollRegion, ShmBuffer, Tag};
