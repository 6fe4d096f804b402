//! Pool statistics.

/// Snapshot of a pool's state and lifetime counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Entries currently owned by the pool.
    pub entries: usize,
    /// Entries waiting for a release from the peer.
    pub busy: usize,
    /// Idle entries marked for purging on the next acquisition.
    pub purge_pending: usize,
    /// Entries created on a pool miss.
    pub allocations: u64,
    /// Acquisitions served from the cache.
    pub cache_hits: u64,
    /// Entries destroyed, for any reason.
    pub purged: u64,
    /// Scrolls completed.
    pub scrolls: u64,
    /// Scrolls that re-based the buffer inside its backing file.
    pub wraps: u64,
    /// Logical size of all backing files, in bytes.
    pub backing_bytes: usize,
}

impl PoolStats {
    /// Fraction of acquisitions served from the cache.
    pub fn hit_rate(&self) -> f64 {
        let total = self.allocations + self.cache_hits;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}
