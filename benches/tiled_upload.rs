// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//
// Upload throughput through region locks, and the cost of gutter replication on unlock.

use std::hint::black_box;
use std::time::Duration;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use tiles_and_gutters::pixel_formats::Bgra8Pixel;
use tiles_and_gutters::{
    ManagerConfig, MemoryDevice, PixelFormat, Rect, SoftwareSurface, Texel, TextureFlags,
    TextureManager,
};

fn criterion_config() -> Criterion {
    match std::env::var("BENCH_PROFILE").as_deref() {
        Ok("ci") => Criterion::default()
            .warm_up_time(Duration::from_millis(150))
            .measurement_time(Duration::from_millis(400))
            .sample_size(10),
        _ => Criterion::default()
            .warm_up_time(Duration::from_secs(1))
            .measurement_time(Duration::from_secs(2))
            .sample_size(30),
    }
}

fn bench_virtual_upload(c: &mut Criterion) {
    const EDGE: u32 = 2048;
    let device = MemoryDevice::new();
    let mut group = c.benchmark_group("virtual_upload");
    group.throughput(Throughput::Bytes(EDGE as u64 * EDGE as u64 * 4));

    let source = SoftwareSurface::filled(EDGE, EDGE, Bgra8Pixel::from_floats(0.2, 0.4, 0.6, 1.0));
    for tile_size in [256u32, 512, 1024] {
        let config = ManagerConfig::default().with_tile_size(tile_size);
        let manager = TextureManager::with_config(device.context(), config);
        let texture = manager
            .create_texture(PixelFormat::Bgra32, EDGE, EDGE, TextureFlags::IS_VIRTUAL)
            .expect("virtual texture");
        group.bench_with_input(BenchmarkId::from_parameter(tile_size), &texture, |b, texture| {
            b.iter(|| {
                texture
                    .update_from_software(black_box(&source), Texel::ZERO)
                    .expect("upload");
                manager.submit_texture_updates().expect("submit");
            });
        });
    }
    group.finish();
}

fn bench_gutter_unlock(c: &mut Criterion) {
    let device = MemoryDevice::new();
    let manager = TextureManager::new(device.context());
    let mut group = c.benchmark_group("gutter_unlock");

    for edge in [16u32, 128, 512] {
        let texture = manager
            .create_texture(PixelFormat::Bgra32, edge, edge, TextureFlags::empty())
            .expect("atlas texture");
        group.bench_with_input(BenchmarkId::from_parameter(edge), &texture, |b, texture| {
            b.iter(|| {
                let mut lock = texture.region_lock(Rect::full(edge, edge)).expect("lock");
                lock.fill(black_box(&[1, 2, 3, 255]));
                lock.unlock().expect("unlock");
            });
        });
        manager.submit_texture_updates().expect("submit");
    }
    group.finish();
}

criterion_group! {
    name = benches;
    config = criterion_config();
    targets = bench_virtual_upload, bench_gutter_unlock
}
criterion_main!(benches);
