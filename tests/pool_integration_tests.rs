//! Integration tests for buffer caching, purging and the release protocol.
//!
//! These run against real memfds and the in-process loopback peer.

use shmbuf::peer::{FailPoint, LoopbackPeer};
use shmbuf::{BufferId, BufferPool, Error, FailurePolicy, PoolConfig, Tag};
use std::sync::Arc;

fn new_pool() -> (Arc<LoopbackPeer>, BufferPool<LoopbackPeer>) {
    let peer = Arc::new(LoopbackPeer::new());
    let config = PoolConfig::default()
        .with_backing_name("pool-integration")
        .with_failure_policy(FailurePolicy::Propagate);
    let pool = BufferPool::new(Arc::clone(&peer), config).unwrap();
    (peer, pool)
}

fn release(pool: &BufferPool<LoopbackPeer>, id: BufferId) {
    let handle = pool.get(id).unwrap().peer_buffer().unwrap().id();
    pool.peer().release(handle).unwrap();
}

// ============================================================================
// Caching
// ============================================================================

/// A released buffer is handed out again for the same tag and size.
#[test]
fn test_released_buffer_is_reused() {
    let (peer, mut pool) = new_pool();
    let tag = Tag::new(0xc0ffee);

    let first = pool.acquire(tag, 80, 24).unwrap().id();
    release(&pool, first);

    let second = pool.acquire(tag, 80, 24).unwrap();
    assert_eq!(second.id(), first);
    assert!(second.is_busy());

    let stats = pool.stats();
    assert_eq!(stats.allocations, 1);
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(stats.entries, 1);

    // No new backing file, no new peer buffer.
    assert_eq!(peer.buffers_created(), 1);
}

/// Content drawn into a reused buffer survives the round trip.
#[test]
fn test_reused_buffer_keeps_content() {
    let (_peer, mut pool) = new_pool();
    let tag = Tag::new(1);

    let buffer = pool.acquire(tag, 16, 16).unwrap();
    let id = buffer.id();
    buffer.pixels_mut().unwrap().put_pixel(3, 7, 0xff11_2233);
    release(&pool, id);

    let buffer = pool.acquire(tag, 16, 16).unwrap();
    assert_eq!(buffer.pixels().unwrap().pixel(3, 7), 0xff11_2233);
}

/// Stale sizes are marked on one acquisition and destroyed on the next.
#[test]
fn test_resize_purge_lifecycle() {
    let (peer, mut pool) = new_pool();
    let tag = Tag::new(7);

    let small = pool.acquire(tag, 80, 24).unwrap().id();
    release(&pool, small);

    let large = pool.acquire(tag, 120, 40).unwrap().id();
    assert_ne!(large, small);
    assert!(pool.get(small).unwrap().is_purge_pending());
    assert!(!pool.get(large).unwrap().is_purge_pending());
    assert_eq!(pool.stats().purge_pending, 1);
    release(&pool, large);

    let again = pool.acquire(tag, 80, 24).unwrap().id();
    assert_ne!(again, small);
    assert!(pool.get(small).is_none());
    assert!(pool.get(large).unwrap().is_purge_pending());

    let stats = pool.stats();
    assert_eq!(stats.allocations, 3);
    assert_eq!(stats.purged, 1);
    assert_eq!(stats.entries, 2);
    assert_eq!(peer.live_buffers(), 2);
}

/// Busy buffers of a stale size are left alone.
#[test]
fn test_busy_buffer_never_marked() {
    let (_peer, mut pool) = new_pool();
    let tag = Tag::new(7);

    let busy = pool.acquire(tag, 80, 24).unwrap().id();
    pool.acquire(tag, 120, 40).unwrap();

    let entry = pool.get(busy).unwrap();
    assert!(entry.is_busy());
    assert!(!entry.is_purge_pending());
}

/// Purging one tag never touches another.
#[test]
fn test_purge_is_per_tag() {
    let (_peer, mut pool) = new_pool();

    let a = pool.acquire(Tag::new(1), 80, 24).unwrap().id();
    release(&pool, a);
    pool.acquire(Tag::new(2), 120, 40).unwrap();

    assert!(!pool.get(a).unwrap().is_purge_pending());
}

// ============================================================================
// Release protocol
// ============================================================================

/// The peer's release event clears the busy flag.
#[test]
fn test_release_clears_busy() {
    let (_peer, mut pool) = new_pool();
    let id = pool.acquire(Tag::new(1), 10, 10).unwrap().id();

    assert_eq!(pool.stats().busy, 1);
    release(&pool, id);
    assert!(!pool.get(id).unwrap().is_busy());
    assert_eq!(pool.stats().busy, 0);
}

/// A second release without a new acquisition is a protocol violation.
#[test]
#[should_panic(expected = "release event for a buffer that is not busy")]
fn test_double_release_panics() {
    let (_peer, mut pool) = new_pool();
    let id = pool.acquire(Tag::new(1), 10, 10).unwrap().id();

    release(&pool, id);
    release(&pool, id);
}

// ============================================================================
// Teardown
// ============================================================================

/// `release_all_for` destroys every buffer of the tag and nothing else.
#[test]
fn test_release_all_for_tag() {
    let (peer, mut pool) = new_pool();
    let a1 = pool.acquire(Tag::new(1), 10, 10).unwrap().id();
    let a2 = pool.acquire(Tag::new(1), 20, 10).unwrap().id();
    let b = pool.acquire(Tag::new(2), 10, 10).unwrap().id();
    release(&pool, a1);
    release(&pool, a2);

    pool.release_all_for(Tag::new(1));

    assert!(pool.get(a1).is_none());
    assert!(pool.get(a2).is_none());
    assert!(pool.get(b).is_some());
    assert_eq!(pool.len(), 1);
    assert_eq!(peer.live_buffers(), 1);
}

/// Destroying a tag while the peer still reads one of its buffers is a bug.
#[test]
#[should_panic(expected = "purging a busy buffer")]
fn test_release_all_for_busy_panics() {
    let (_peer, mut pool) = new_pool();
    pool.acquire(Tag::new(1), 10, 10).unwrap();
    pool.release_all_for(Tag::new(1));
}

/// Shutdown destroys busy and idle buffers alike.
#[test]
fn test_shutdown() {
    let (peer, mut pool) = new_pool();
    let idle = pool.acquire(Tag::new(1), 10, 10).unwrap().id();
    release(&pool, idle);
    pool.acquire(Tag::new(2), 10, 10).unwrap();

    pool.shutdown();

    assert!(pool.is_empty());
    assert_eq!(pool.stats().backing_bytes, 0);
    assert_eq!(peer.live_buffers(), 0);
    assert_eq!(peer.live_pools(), 0);
}

// ============================================================================
// Failure handling
// ============================================================================

/// A peer failure during allocation leaves nothing behind.
#[test]
fn test_pool_failure_unwinds() {
    let (peer, mut pool) = new_pool();

    peer.fail_next(FailPoint::Pool);
    let result = pool.acquire(Tag::new(1), 10, 10);
    assert!(matches!(result, Err(Error::Peer(_))));

    assert!(pool.is_empty());
    assert_eq!(pool.stats().allocations, 0);
    assert_eq!(peer.live_buffers(), 0);

    // The pool stays usable.
    assert!(pool.acquire(Tag::new(1), 10, 10).is_ok());
}

// ============================================================================
// Layout
// ============================================================================

/// Row `r` of the pixel view starts `page_skew + r * stride` bytes into the
/// mapping, and the peer sees exactly the bytes drawn.
#[test]
fn test_view_layout_and_peer_visibility() {
    let (peer, mut pool) = new_pool();
    let buffer = pool.acquire(Tag::new(1), 25, 3).unwrap();

    let mapping = buffer.mapping().unwrap();
    let base = mapping.base_ptr() as usize;
    let skew = mapping.page_skew();
    let view = buffer.pixels().unwrap();
    for row in 0..3 {
        assert_eq!(view.row(row).as_ptr() as usize - base, skew + row as usize * 100);
    }

    let view = buffer.pixels_mut().unwrap();
    for row in 0..3 {
        view.pixels_mut(row).fill(0x0100_0000 * (row + 1));
    }

    let handle = buffer.peer_buffer().unwrap().id();
    let bytes = peer.read_buffer(handle).unwrap();
    assert_eq!(bytes.len(), 300);
    for row in 0..3u32 {
        let expected = (0x0100_0000 * (row + 1)).to_ne_bytes();
        assert_eq!(&bytes[row as usize * 100..row as usize * 100 + 4], &expected);
    }

    let info = peer.buffer_info(handle).unwrap();
    assert_eq!(info.offset, 0);
    assert_eq!(info.pool_len, 300);
    assert_eq!(info.stride, 100);
}
