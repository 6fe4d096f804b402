//! Buffer pool benchmarks: cache hits, fresh allocations and scrolling.
//!
//! Run with:
//!   cargo bench -- buffer_pool

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use shmbuf::peer::LoopbackPeer;
use shmbuf::{BufferPool, PoolConfig, ScrollRegion, Tag};
use std::sync::Arc;

/// Common window sizes to benchmark
const RESOLUTIONS: &[(u32, u32, &str)] = &[
    (640, 480, "VGA"),
    (1280, 720, "720p"),
    (1920, 1080, "1080p"),
];

fn new_pool() -> (Arc<LoopbackPeer>, BufferPool<LoopbackPeer>) {
    let peer = Arc::new(LoopbackPeer::new());
    let pool = BufferPool::new(Arc::clone(&peer), PoolConfig::default()).unwrap();
    (peer, pool)
}

fn bench_cache_hit(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_pool_cache_hit");
    let tag = Tag::new(1);

    for &(width, height, name) in RESOLUTIONS {
        let (peer, mut pool) = new_pool();
        let handle = pool
            .acquire(tag, width, height)
            .unwrap()
            .peer_buffer()
            .unwrap()
            .id();
        peer.release(handle).unwrap();

        group.throughput(Throughput::Elements(1));
        group.bench_function(BenchmarkId::from_parameter(name), |b| {
            b.iter(|| {
                let buffer = pool.acquire(tag, width, height).unwrap();
                let handle = buffer.peer_buffer().unwrap().id();
                peer.release(handle).unwrap();
            });
        });
    }

    group.finish();
}

fn bench_allocate(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_pool_allocate");
    let tag = Tag::new(1);

    for &(width, height, name) in RESOLUTIONS {
        let (peer, mut pool) = new_pool();

        group.throughput(Throughput::Elements(1));
        group.bench_function(BenchmarkId::from_parameter(name), |b| {
            b.iter(|| {
                let buffer = pool.acquire(tag, width, height).unwrap();
                let handle = buffer.peer_buffer().unwrap().id();
                peer.release(handle).unwrap();
                pool.release_all_for(tag);
            });
        });
    }

    group.finish();
}

fn bench_scroll(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_pool_scroll");
    let tag = Tag::new(1);
    let region = ScrollRegion::none().with_bottom(0, 16);

    for &(width, height, name) in RESOLUTIONS {
        let (_peer, mut pool) = new_pool();
        if !pool.scrolling_supported() {
            eprintln!("scrolling not supported, skipping {}", name);
            continue;
        }

        let buffer = pool.acquire(tag, width, height).unwrap();
        let id = buffer.id();
        buffer.pixels_mut().unwrap().fill(0xff40_4040);

        group.throughput(Throughput::Bytes(
            (height as usize * width as usize * 4) as u64,
        ));
        group.bench_function(BenchmarkId::new("16_rows", name), |b| {
            b.iter(|| {
                pool.scroll(id, 16, region).unwrap();
            });
        });
    }

    group.finish();
}

fn bench_redraw(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_pool_redraw");
    let tag = Tag::new(1);

    // Baseline for scrolling: moving every row by hand.
    for &(width, height, name) in RESOLUTIONS {
        let (_peer, mut pool) = new_pool();
        let buffer = pool.acquire(tag, width, height).unwrap();
        let view = buffer.pixels_mut().unwrap();
        view.fill(0xff40_4040);

        group.throughput(Throughput::Bytes(
            (height as usize * width as usize * 4) as u64,
        ));
        group.bench_function(BenchmarkId::new("16_rows", name), |b| {
            b.iter(|| {
                view.copy_rows(16, 0, height - 16).unwrap();
                std::hint::black_box(view.as_ptr());
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_cache_hit,
    bench_allocate,
    bench_scroll,
    bench_redraw
);
criterion_main!(benches);
