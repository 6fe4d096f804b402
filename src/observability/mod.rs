//! Observability features: metrics and tracing.
//!
//! - **Metrics**: Counters, gauges, and histograms via `metrics-rs`
//! - **Tracing**: Structured logging and spans via `tracing`
//!
//! ## Metrics
//!
//! Every [`BufferPool`](crate::pool::BufferPool) records the following,
//! labelled with its `backing_name`:
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `shmbuf_buffers_allocated` | Counter | Buffers created on a pool miss |
//! | `shmbuf_cache_hits` | Counter | Acquisitions served from the cache |
//! | `shmbuf_buffers_purged` | Counter | Entries destroyed |
//! | `shmbuf_scrolls` | Counter | Scrolls performed |
//! | `shmbuf_wraparounds` | Counter | Scrolls that re-based the buffer |
//! | `shmbuf_scroll_time_ns` | Histogram | Duration of one scroll |
//! | `shmbuf_backing_bytes` | Gauge | Logical size of all backing files |
//! | `shmbuf_live_entries` | Gauge | Entries owned by the pool |
//!
//! ## Tracing
//!
//! Spans are emitted for acquisitions, scrolls and shutdown, as selected by
//! [`TracingConfig`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use shmbuf::observability::init_metrics;
//!
//! // Initialize metrics (call once at startup)
//! init_metrics();
//!
//! // Install an exporter (prometheus, statsd, etc.) to collect them
//! ```

mod metrics;
mod tracing_support;

pub use metrics::{PoolMetrics, TimerGuard, init_metrics};
pub use tracing_support::{TracingConfig, span_acquire, span_pool, span_scroll};
