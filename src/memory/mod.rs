//! Kernel memory primitives behind every buffer.
//!
//! # Architecture
//!
//! - [`BackingFile`]: anonymous memfd that stores one buffer's bytes
//! - [`Mapping`]: `MAP_SHARED` window into a backing file at any byte offset
//! - [`can_punch_hole`]: process-wide probe gating the scroll engine
//! - [`page_size`]: cached page size and offset alignment helpers
//!
//! # Example
//!
//! ```rust,ignore
//! use shmbuf::memory::{BackingFile, Mapping};
//!
//! let file = BackingFile::create("example", 64 * 1024)?;
//!
//! // Map 1000 bytes starting at an unaligned offset
//! let mut window = Mapping::map(&file, 4096 + 300, 1000)?;
//! window.data_mut()[..5].copy_from_slice(b"hello");
//! ```

mod backing;
mod capability;
pub mod defaults;
mod mapping;
mod page;

pub use backing::BackingFile;
pub use capability::{can_punch_hole, scrolling_possible};
pub use mapping::Mapping;
pub use page::{align_down, page_size, page_skew};
