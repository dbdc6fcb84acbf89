use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use std::thread;
use framepipe::core::frames::{HostPlanes, PixelFormat};
use framepipe::core::pool::{PoolConfig, ResourcePool};
use framepipe::core::FormatConverter;

fn buffer_pool(config: PoolConfig, len: usize) -> ResourcePool<Vec<u8>> {
    ResourcePool::new(config, move || -> framepipe::core::Result<Vec<u8>> { Ok(vec![0u8; len]) })
        .unwrap()
}

// Single thread: acquire and immediately release
fn bench_acquire_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("acquire_release");
    group.throughput(Throughput::Elements(1));

    for size in [1usize, 4, 16] {
        let pool = buffer_pool(PoolConfig::fixed(size), 1920 * 1080 * 4);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let buffer = pool.try_acquire().unwrap();
                black_box(buffer);
            });
        });
    }

    group.finish();
}

// Several threads cycling through a pool smaller than the thread count
fn bench_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended");

    for threads in [2usize, 4, 8] {
        let iterations = 1000;
        group.throughput(Throughput::Elements((threads * iterations) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            let pool = Arc::new(buffer_pool(PoolConfig::fixed(2), 4096));
            b.iter(|| {
                let handles: Vec<_> = (0..threads)
                    .map(|_| {
                        let pool = Arc::clone(&pool);
                        thread::spawn(move || {
                            for _ in 0..iterations {
                                let buffer = pool.acquire(None).unwrap();
                                black_box(&buffer);
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.join().unwrap();
                }
            });
        });
    }

    group.finish();
}

// Host frame to BGRA, the per-frame cost of the image path
fn bench_conversion(c: &mut Criterion) {
    let mut group = c.benchmark_group("convert_to_bgra");
    let (width, height) = (1280u32, 720u32);
    group.throughput(Throughput::Elements((width * height) as u64));

    for format in [PixelFormat::Nv12, PixelFormat::P010, PixelFormat::Yuv420p, PixelFormat::Rgba] {
        let planes = HostPlanes::allocate(format, width, height);
        let converter = FormatConverter::new(format, width, height, PixelFormat::Bgra).unwrap();
        let mut out = vec![0u8; converter.output_len()];
        group.bench_with_input(BenchmarkId::from_parameter(format), &format, |b, _| {
            b.iter(|| {
                converter.convert(black_box(&planes), &mut out).unwrap();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_acquire_release, bench_contended, bench_conversion);
criterion_main!(benches);
