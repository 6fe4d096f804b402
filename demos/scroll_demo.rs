//! # Scroll Demo
//!
//! Acquire a buffer, draw numbered rows into it, scroll it a few times with a
//! status line kept at the bottom, and show what the display peer sees.
//!
//! ```text
//! [BufferPool] --acquire--> [ShmBuffer] --attach--> [LoopbackPeer]
//!                               ^                        |
//!                               +-------- release -------+
//! ```
//!
//! Run: `cargo run --example scroll_demo`
//! More output: `RUST_LOG=shmbuf=trace cargo run --example scroll_demo`

use shmbuf::observability::init_metrics;
use shmbuf::prelude::*;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const WIDTH: u32 = 80;
const HEIGHT: u32 = 24;
const STATUS: u32 = 0xffff_0000;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("shmbuf=debug")),
        )
        .init();
    init_metrics();

    println!("=== Scroll Demo ===\n");

    let peer = Arc::new(LoopbackPeer::new());
    let config = PoolConfig::default()
        .with_backing_name("scroll-demo")
        .with_max_pool_size(32 * 1024);
    let mut pool = BufferPool::new(Arc::clone(&peer), config)?;
    let tag = Tag::new(1);

    // 1. Draw a frame
    let buffer = pool.acquire(tag, WIDTH, HEIGHT)?;
    let id = buffer.id();
    let size = buffer.size();
    let view = buffer.pixels_mut()?;
    for row in 0..HEIGHT - 1 {
        view.pixels_mut(row).fill(row);
    }
    view.pixels_mut(HEIGHT - 1).fill(STATUS);
    println!(
        "1. Drew {}x{} buffer (stride {}, {} bytes)",
        WIDTH,
        HEIGHT,
        view.stride(),
        size
    );

    if !pool.scrolling_supported() {
        println!("\nScrolling not supported on this system, nothing more to show.");
        pool.shutdown();
        return Ok(());
    }

    // 2. Scroll, keeping the status line, until the buffer wraps
    println!("\n2. Scrolling 8 rows at a time");
    let status_line = ScrollRegion::none().with_bottom(0, 1);
    while pool.stats().wraps == 0 {
        pool.scroll(id, 8, status_line)?;

        let buffer = pool.get(id).ok_or(Error::UnknownBuffer)?;
        let view = buffer.pixels()?;
        println!(
            "   offset={:#07x} file={:#07x} top row={:2} status={:#010x}",
            buffer.offset(),
            buffer.backing().len(),
            view.pixel(0, 0),
            view.pixel(0, HEIGHT - 1)
        );
    }

    // 3. The peer reads the same bytes
    let handle = pool
        .get(id)
        .ok_or(Error::UnknownBuffer)?
        .peer_buffer()?
        .id();
    let bytes = peer.read_buffer(handle)?;
    let first = u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    println!("\n3. Peer sees top row value {}", first);

    // 4. Release and reuse
    peer.release(handle)?;
    let reused = pool.acquire(tag, WIDTH, HEIGHT)?.id() == id;
    println!("\n4. Released and re-acquired, reused: {}", reused);

    let stats = pool.stats();
    println!(
        "\nStats: {} allocations, {} cache hits, {} scrolls, {} wraps",
        stats.allocations, stats.cache_hits, stats.scrolls, stats.wraps
    );

    pool.shutdown();
    println!("\n=== Done ===");
    Ok(())
}
