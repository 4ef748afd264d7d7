// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Gutters around atlas-backed textures follow what was written.

use tiles_and_gutters::imp::SurfaceProbe;
use tiles_and_gutters::pixel_formats::{Bgra8Pixel, Rgba16FloatPixel};
use tiles_and_gutters::{
    MemoryDevice, PixelFormat, Rect, SoftwareSurface, Texel, TextureFlags, TextureManager,
};

const RED: [u8; 4] = [0, 0, 255, 255];
const BLUE: [u8; 4] = [255, 0, 0, 255];

fn every_padded_pixel(probe: &SurfaceProbe) -> impl Iterator<Item = (u32, u32, Vec<u8>)> + '_ {
    let w = probe.width_with_gutters();
    let h = probe.height_with_gutters();
    (0..h).flat_map(move |y| (0..w).map(move |x| (x, y, probe.padded_pixel(x, y))))
}

#[test]
fn whole_write_fills_every_gutter_pixel() {
    let device = MemoryDevice::new();
    let manager = TextureManager::new(device.context());
    let texture = manager
        .create_texture(PixelFormat::Bgra32, 10, 10, TextureFlags::empty())
        .unwrap();
    assert!(texture.includes_gutters());

    let mut lock = texture.whole_lock().unwrap();
    lock.fill(&RED);
    lock.unlock().unwrap();

    let probe = device.last_surface().unwrap();
    assert_eq!((probe.width_with_gutters(), probe.height_with_gutters()), (12, 12));
    for (x, y, pixel) in every_padded_pixel(&probe) {
        assert_eq!(pixel, RED, "padded ({x}, {y})");
    }
}

#[test]
fn deferred_writes_are_covered_by_the_next_unlock() {
    let device = MemoryDevice::new();
    let manager = TextureManager::new(device.context());
    let texture = manager
        .create_texture(PixelFormat::Bgra32, 10, 10, TextureFlags::empty())
        .unwrap();

    let mut left = texture.region_lock(Rect::new(0, 0, 5, 10)).unwrap();
    left.fill(&RED);
    left.unlock_deferred().unwrap();
    assert_eq!(manager.pending_len(), 0);

    let probe = device.last_surface().unwrap();
    assert_eq!(probe.padded_pixel(0, 5), vec![0; 4]);

    let mut right = texture.region_lock(Rect::new(5, 0, 5, 10)).unwrap();
    right.fill(&BLUE);
    right.unlock().unwrap();
    assert_eq!(manager.pending_len(), 1);

    for y in 0..12 {
        assert_eq!(probe.padded_pixel(0, y), RED, "left gutter row {y}");
        assert_eq!(probe.padded_pixel(11, y), BLUE, "right gutter row {y}");
    }
    assert_eq!(probe.padded_pixel(3, 0), RED);
    assert_eq!(probe.padded_pixel(8, 11), BLUE);
}

#[test]
fn interior_write_leaves_gutters_alone() {
    let device = MemoryDevice::new();
    let manager = TextureManager::new(device.context());
    let texture = manager
        .create_texture(PixelFormat::Gray8, 8, 8, TextureFlags::empty())
        .unwrap();
    let mut lock = texture.region_lock(Rect::new(2, 2, 3, 3)).unwrap();
    lock.fill(&[7]);
    lock.unlock().unwrap();

    let probe = device.last_surface().unwrap();
    assert_eq!(probe.pixel(2, 2), vec![7]);
    for (x, y, pixel) in every_padded_pixel(&probe) {
        let gutter = x == 0 || y == 0 || x == 9 || y == 9;
        if gutter {
            assert_eq!(pixel, vec![0], "padded ({x}, {y})");
        }
    }
}

#[test]
fn partial_edge_write_fills_only_its_extent() {
    let device = MemoryDevice::new();
    let manager = TextureManager::new(device.context());
    let texture = manager
        .create_texture(PixelFormat::Gray8, 8, 8, TextureFlags::empty())
        .unwrap();
    let mut lock = texture.region_lock(Rect::new(0, 3, 2, 2)).unwrap();
    lock.fill(&[5]);
    lock.unlock().unwrap();

    let probe = device.last_surface().unwrap();
    // logical rows 3 and 4 are padded rows 4 and 5
    assert_eq!(probe.padded_pixel(0, 3), vec![0]);
    assert_eq!(probe.padded_pixel(0, 4), vec![5]);
    assert_eq!(probe.padded_pixel(0, 5), vec![5]);
    assert_eq!(probe.padded_pixel(0, 6), vec![0]);
    assert_eq!(probe.padded_pixel(1, 0), vec![0]);
}

#[test]
fn half_float_gutters() {
    let device = MemoryDevice::new();
    let manager = TextureManager::new(device.context());
    let texture = manager
        .create_texture(PixelFormat::Rgba64Float, 3, 3, TextureFlags::empty())
        .unwrap();
    let color = Rgba16FloatPixel::from_f32(0.25, 0.5, 1.0, 1.0).to_bytes();
    let mut lock = texture.whole_lock().unwrap();
    lock.fill(&color);
    lock.unlock().unwrap();

    let probe = device.last_surface().unwrap();
    for (x, y, pixel) in every_padded_pixel(&probe) {
        assert_eq!(pixel, color, "padded ({x}, {y})");
    }
}

#[test]
fn software_upload_fills_gutters() {
    let device = MemoryDevice::new();
    let manager = TextureManager::new(device.context());
    let texture = manager
        .create_texture(PixelFormat::Bgra32, 4, 4, TextureFlags::empty())
        .unwrap();
    let source = SoftwareSurface::new_with(6, 6, |texel: Texel| Bgra8Pixel {
        b: texel.x as u8,
        g: texel.y as u8,
        r: 0,
        a: 255,
    });
    texture.update_from_software(&source, Texel::new(1, 1)).unwrap();

    let probe = device.last_surface().unwrap();
    // logical (0, 0) is source (1, 1); the top-left corner gutter replicates it
    assert_eq!(probe.pixel(0, 0), vec![1, 1, 0, 255]);
    assert_eq!(probe.padded_pixel(0, 0), vec![1, 1, 0, 255]);
    assert_eq!(probe.padded_pixel(5, 5), vec![4, 4, 0, 255]);
}

#[test]
fn surfaces_without_gutters_are_untouched_outside_the_write() {
    let device = MemoryDevice::new();
    device.set_atlas_threshold(0);
    let manager = TextureManager::new(device.context());
    let texture = manager
        .create_texture(PixelFormat::Gray8, 4, 4, TextureFlags::empty())
        .unwrap();
    assert!(!texture.includes_gutters());
    let mut lock = texture.region_lock(Rect::new(0, 0, 1, 1)).unwrap();
    lock.fill(&[3]);
    lock.unlock().unwrap();

    let probe = device.last_surface().unwrap();
    assert_eq!(probe.padded_pixel(0, 0), vec![3]);
    assert_eq!(probe.padded_pixel(1, 0), vec![0]);
    assert_eq!(probe.padded_pixel(0, 1), vec![0]);
}
