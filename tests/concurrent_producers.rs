// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Producers on many threads, one submitting thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use tiles_and_gutters::{MemoryDevice, PixelFormat, Rect, TextureFlags, TextureManager};

const PRODUCERS: usize = 4;
const ROUNDS: u32 = 50;

#[test]
fn producers_and_submitter_do_not_deadlock() {
    let device = MemoryDevice::new();
    let manager = TextureManager::new(device.context());
    let shared: Vec<_> = (0..PRODUCERS)
        .map(|_| {
            manager
                .create_texture(PixelFormat::Gray8, 16, 16, TextureFlags::empty())
                .unwrap()
        })
        .collect();
    let done = Arc::new(AtomicBool::new(false));

    thread::scope(|scope| {
        let submitter = {
            let manager = manager.clone();
            let done = done.clone();
            scope.spawn(move || {
                let mut frames = 0;
                while !done.load(Ordering::Acquire) {
                    manager.submit_texture_updates().unwrap();
                    frames += 1;
                    thread::yield_now();
                }
                frames
            })
        };

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let texture = shared[p].clone();
                let manager = manager.clone();
                scope.spawn(move || {
                    for round in 0..ROUNDS {
                        let row = round % 16;
                        let mut lock = texture.region_lock(Rect::new(0, row, 16, 1)).unwrap();
                        lock.fill(&[p as u8 + 1]);
                        lock.unlock().unwrap();

                        // short-lived textures are dropped while frames are submitted
                        let scratch = manager
                            .create_texture(PixelFormat::Bgra32, 8, 8, TextureFlags::empty())
                            .unwrap();
                        let mut lock = scratch.whole_lock().unwrap();
                        lock.fill(&[1, 2, 3, 4]);
                        lock.unlock().unwrap();
                        drop(scratch);
                    }
                })
            })
            .collect();

        for producer in producers {
            producer.join().unwrap();
        }
        done.store(true, Ordering::Release);
        assert!(submitter.join().unwrap() > 0);
    });

    manager.submit_texture_updates().unwrap();
    assert_eq!(manager.pending_len(), 0);

    for (p, texture) in shared.iter().enumerate() {
        let lock = texture.region_lock(Rect::new(0, 0, 16, 16)).unwrap();
        for row in 0..16 {
            assert!(lock.row(row).iter().all(|v| *v == p as u8 + 1), "texture {p} row {row}");
        }
        lock.unlock_deferred().unwrap();
    }
}

#[test]
fn the_same_texture_from_many_threads() {
    let device = MemoryDevice::new();
    let manager = TextureManager::new(device.context());
    let texture = manager
        .create_texture(PixelFormat::Gray8, 8, 8, TextureFlags::empty())
        .unwrap();

    thread::scope(|scope| {
        for column in 0..8u32 {
            let texture = texture.clone();
            scope.spawn(move || {
                let mut lock = texture.region_lock(Rect::new(column, 0, 1, 8)).unwrap();
                lock.fill(&[column as u8 + 10]);
                lock.unlock().unwrap();
            });
        }
    });

    assert_eq!(manager.pending_len(), 1);
    manager.submit_texture_updates().unwrap();

    let probe = device.surfaces().into_iter().next().unwrap();
    for column in 0..8 {
        assert_eq!(probe.pixel(column, 4), vec![column as u8 + 10]);
    }
    // both side gutters were filled by whichever thread wrote the edge column
    assert_eq!(probe.padded_pixel(0, 4), vec![10]);
    assert_eq!(probe.padded_pixel(9, 4), vec![17]);
}
