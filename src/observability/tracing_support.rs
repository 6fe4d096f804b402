//! Tracing integration for structured logging and spans.

use crate::pool::Tag;
use tracing::{Level, Span, span};

/// Configuration for tracing behavior.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Whether to create spans around `acquire`.
    pub acquire_spans: bool,
    /// Whether to create spans around `scroll`.
    pub scroll_spans: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            acquire_spans: false, // One per frame, can be noisy
            scroll_spans: true,
        }
    }
}

impl TracingConfig {
    /// Create a config with all spans enabled.
    pub fn all() -> Self {
        Self {
            acquire_spans: true,
            scroll_spans: true,
        }
    }

    /// Disable all spans.
    pub fn none() -> Self {
        Self {
            acquire_spans: false,
            scroll_spans: false,
        }
    }
}

/// Create a span for one pool-level operation.
///
/// # Example
///
/// ```rust,ignore
/// use shmbuf::observability::span_pool;
///
/// let span = span_pool("shmbuf-buffer-pool", "shutdown");
/// let _guard = span.enter();
/// ```
#[inline]
pub fn span_pool(pool: &str, operation: &'static str) -> Span {
    span!(Level::DEBUG, "pool", pool = %pool, operation = operation)
}

/// Create a span for one acquisition.
#[inline]
pub fn span_acquire(pool: &str, tag: Tag, width: u32, height: u32) -> Span {
    span!(
        Level::DEBUG,
        "acquire",
        pool = %pool,
        tag = tag.get(),
        width = width,
        height = height
    )
}

/// Create a span for one scroll.
#[inline]
pub fn span_scroll(pool: &str, rows: i32, offset: usize) -> Span {
    span!(
        Level::DEBUG,
        "scroll",
        pool = %pool,
        rows = rows,
        offset = offset
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_config_default() {
        let config = TracingConfig::default();
        assert!(!config.acquire_spans);
        assert!(config.scroll_spans);
    }

    #[test]
    fn test_tracing_config_all() {
        let config = TracingConfig::all();
        assert!(config.acquire_spans);
        assert!(config.scroll_spans);
    }

    #[test]
    fn test_tracing_config_none() {
        let config = TracingConfig::none();
        assert!(!config.acquire_spans);
        assert!(!config.scroll_spans);
    }

    #[test]
    fn test_span_creation() {
        // These should not panic even without a subscriber
        let _span = span_pool("test-pool", "shutdown");
        let _span = span_acquire("test-pool", Tag::new(1), 80, 24);
        let _guard = span_scroll("test-pool", 3, 4096).entered();
    }
}
