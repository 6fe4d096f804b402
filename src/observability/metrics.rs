//! Metrics collection using metrics-rs.

use metrics::{Counter, Gauge, Histogram, Unit, counter, gauge, histogram};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Whether metrics have been initialized.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

// Metric names as constants for consistency
const BUFFERS_ALLOCATED: &str = "shmbuf_buffers_allocated";
const CACHE_HITS: &str = "shmbuf_cache_hits";
const BUFFERS_PURGED: &str = "shmbuf_buffers_purged";
const SCROLLS: &str = "shmbuf_scrolls";
const WRAPAROUNDS: &str = "shmbuf_wraparounds";
const SCROLL_TIME_NS: &str = "shmbuf_scroll_time_ns";
const BACKING_BYTES: &str = "shmbuf_backing_bytes";
const LIVE_ENTRIES: &str = "shmbuf_live_entries";

/// Initialize metrics descriptions.
///
/// Call this once at application startup before using any metrics.
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    metrics::describe_counter!(
        BUFFERS_ALLOCATED,
        Unit::Count,
        "Buffers created on a pool miss"
    );
    metrics::describe_counter!(
        CACHE_HITS,
        Unit::Count,
        "Acquisitions served by an idle cached buffer"
    );
    metrics::describe_counter!(
        BUFFERS_PURGED,
        Unit::Count,
        "Buffers destroyed because their geometry went stale"
    );
    metrics::describe_counter!(SCROLLS, Unit::Count, "Scrolls performed by offset shifting");
    metrics::describe_counter!(
        WRAPAROUNDS,
        Unit::Count,
        "Scrolls that had to re-base the buffer inside its backing file"
    );
    metrics::describe_histogram!(
        SCROLL_TIME_NS,
        Unit::Nanoseconds,
        "Time to perform one scroll"
    );
    metrics::describe_gauge!(
        BACKING_BYTES,
        Unit::Bytes,
        "Logical size of all backing files owned by the pool"
    );
    metrics::describe_gauge!(LIVE_ENTRIES, Unit::Count, "Buffer entries owned by the pool");
}

/// Metrics collector for one buffer pool.
///
/// Handles are created once with the pool's label so the hot paths only
/// touch pre-registered counters.
#[derive(Clone)]
pub struct PoolMetrics {
    pool: String,
    allocated: Counter,
    cache_hits: Counter,
    purged: Counter,
    scrolls: Counter,
    wraps: Counter,
    scroll_time: Histogram,
    backing_bytes: Gauge,
    live_entries: Gauge,
}

impl PoolMetrics {
    /// Create a collector labelled with `pool`.
    pub fn new(pool: &str) -> Self {
        Self {
            pool: pool.to_string(),
            allocated: counter!(BUFFERS_ALLOCATED, "pool" => pool.to_string()),
            cache_hits: counter!(CACHE_HITS, "pool" => pool.to_string()),
            purged: counter!(BUFFERS_PURGED, "pool" => pool.to_string()),
            scrolls: counter!(SCROLLS, "pool" => pool.to_string()),
            wraps: counter!(WRAPAROUNDS, "pool" => pool.to_string()),
            scroll_time: histogram!(SCROLL_TIME_NS, "pool" => pool.to_string()),
            backing_bytes: gauge!(BACKING_BYTES, "pool" => pool.to_string()),
            live_entries: gauge!(LIVE_ENTRIES, "pool" => pool.to_string()),
        }
    }

    /// Record a newly allocated buffer.
    #[inline]
    pub fn record_allocation(&self) {
        self.allocated.increment(1);
    }

    /// Record a cache hit.
    #[inline]
    pub fn record_cache_hit(&self) {
        self.cache_hits.increment(1);
    }

    /// Record a destroyed entry.
    #[inline]
    pub fn record_purge(&self) {
        self.purged.increment(1);
    }

    /// Record a completed scroll. Its duration comes from
    /// [`start_scroll_timer`](Self::start_scroll_timer).
    #[inline]
    pub fn record_scroll(&self) {
        self.scrolls.increment(1);
    }

    /// Record a wraparound.
    #[inline]
    pub fn record_wrap(&self) {
        self.wraps.increment(1);
    }

    /// Publish the current pool footprint.
    #[inline]
    pub fn record_footprint(&self, entries: usize, backing_bytes: usize) {
        self.live_entries.set(entries as f64);
        self.backing_bytes.set(backing_bytes as f64);
    }

    /// Start a timer that records into the scroll histogram on drop.
    pub fn start_scroll_timer(&self) -> TimerGuard {
        TimerGuard {
            start: Instant::now(),
            histogram: self.scroll_time.clone(),
        }
    }

    /// Get the pool label.
    pub fn pool(&self) -> &str {
        &self.pool
    }
}

impl std::fmt::Debug for PoolMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolMetrics")
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

/// Guard that records elapsed time when dropped.
pub struct TimerGuard {
    start: Instant,
    histogram: Histogram,
}

impl TimerGuard {
    /// Time since the guard was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        self.histogram.record(self.start.elapsed().as_nanos() as f64);
    }
}
