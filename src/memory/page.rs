//! Page size query and offset alignment.

use super::defaults::FALLBACK_PAGE_SIZE;
use std::sync::OnceLock;

static PAGE_SIZE: OnceLock<usize> = OnceLock::new();

/// System page size, queried once and cached for the process lifetime.
pub fn page_size() -> usize {
    *PAGE_SIZE.get_or_init(|| {
        let size = rustix::param::page_size();
        if size == 0 || !size.is_power_of_two() {
            tracing::error!(
                "failed to get page size (got {}), assuming {}",
                size,
                FALLBACK_PAGE_SIZE
            );
            FALLBACK_PAGE_SIZE
        } else {
            size
        }
    })
}

/// Round `offset` down to a page boundary.
#[inline]
pub fn align_down(offset: usize) -> usize {
    offset & !(page_size() - 1)
}

/// Distance from the page boundary below `offset` to `offset`.
#[inline]
pub fn page_skew(offset: usize) -> usize {
    offset & (page_size() - 1)
}
