// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Lockable color and alpha textures.

An [`RgbTexture`] wraps one [`DeviceSurface`].  Content is written through a [`TextureLock`]
permit:

```
use tiles_and_gutters::geometry::Rect;
use tiles_and_gutters::imp::MemoryDevice;
use tiles_and_gutters::manager::{TextureFlags, TextureManager};
use tiles_and_gutters::pixel_formats::PixelFormat;

let device = MemoryDevice::new();
let manager = TextureManager::new(device.context());
let texture = manager
    .create_texture(PixelFormat::Gray8, 4, 4, TextureFlags::empty())
    .unwrap();

let mut lock = texture.region_lock(Rect::new(0, 0, 4, 1)).unwrap();
lock.row_mut(0).copy_from_slice(&[1, 2, 3, 4]);
lock.unlock().unwrap();

// the write reached the top edge, so the gutter above it was filled
let probe = device.last_surface().unwrap();
assert_eq!(probe.padded_pixel(1, 0), vec![1]);
assert_eq!(manager.pending_len(), 1);
```

# Locking

[`whole_lock`](RgbTexture::whole_lock) and [`region_lock`](RgbTexture::region_lock) take the
texture's mutex and keep it inside the returned permit.  The mutex is released only by
[`TextureLock::unlock`] or [`TextureLock::unlock_deferred`].  A thread must not lock the same
texture twice, and must not submit frames while it holds a permit.

`unlock` fills the gutter around everything written since the last fill, marks the surface dirty
and enqueues the texture with its manager.  The manager is always called after the texture's
mutex has been released.

Virtual textures may exceed the device's maximum texture size and are only ever region-locked.
*/

use std::fmt::Debug;
use std::ptr::NonNull;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::device::{BILINEAR_FILTER_EDGE, DeviceSurface, LockedBits, SourceBits, SourceSurface};
use crate::error::{Error, Violation, violation};
use crate::geometry::{Rect, Texel, Tiles};
use crate::gutters;
use crate::manager::ManagerShared;
use crate::pixel_formats::{CompositionFormat, PixelFormat};
use crate::texture::{TextureBase, TextureId};

struct TextureState {
    surface: Box<dyn DeviceSurface>,
    hold_flush: bool,
    /// Logical area written since the gutters were last filled.
    unfilled: Rect,
}

/// Everything about the surface that never changes after creation.
#[derive(Debug, Clone, Copy)]
struct SurfaceInfo {
    width: u32,
    height: u32,
    width_with_gutters: u32,
    height_with_gutters: u32,
    pixel_format: PixelFormat,
    composition_format: CompositionFormat,
    is_virtual: bool,
    includes_gutters: bool,
}

impl SurfaceInfo {
    fn of(surface: &dyn DeviceSurface) -> Self {
        SurfaceInfo {
            width: surface.width_without_gutters(),
            height: surface.height_without_gutters(),
            width_with_gutters: surface.width_with_gutters(),
            height_with_gutters: surface.height_with_gutters(),
            pixel_format: surface.pixel_format(),
            composition_format: surface.composition_format(),
            is_virtual: surface.is_virtual(),
            includes_gutters: surface.includes_gutters(),
        }
    }

    fn half_edge(&self) -> u32 {
        if self.includes_gutters {
            BILINEAR_FILTER_EDGE / 2
        } else {
            0
        }
    }
}

/// A managed, lockable texture.
///
/// Handles are `Arc<RgbTexture>`; the surface is released when the last handle is dropped.
pub struct RgbTexture {
    base: TextureBase,
    this: Weak<RgbTexture>,
    manager: Weak<ManagerShared>,
    info: SurfaceInfo,
    is_opaque: bool,
    producer_fills_gutters: bool,
    tile_size: u32,
    state: Mutex<TextureState>,
}

impl Debug for RgbTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RgbTexture")
            .field("id", &self.base.id())
            .field("info", &self.info)
            .field("is_opaque", &self.is_opaque)
            .finish_non_exhaustive()
    }
}

pub(crate) struct TextureParts {
    pub surface: Box<dyn DeviceSurface>,
    pub is_opaque: bool,
    pub producer_fills_gutters: bool,
    pub manager: Weak<ManagerShared>,
    pub tile_size: u32,
}

impl RgbTexture {
    pub(crate) fn new(parts: TextureParts) -> Arc<Self> {
        let info = SurfaceInfo::of(parts.surface.as_ref());
        Arc::new_cyclic(|this| RgbTexture {
            base: TextureBase::new(),
            this: this.clone(),
            manager: parts.manager,
            info,
            is_opaque: parts.is_opaque,
            producer_fills_gutters: parts.producer_fills_gutters,
            tile_size: parts.tile_size,
            state: Mutex::new(TextureState {
                surface: parts.surface,
                hold_flush: false,
                unfilled: Rect::default(),
            }),
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, TextureState> {
        // a panic while a permit was held leaves the state consistent enough to keep going
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks the whole texture for writing.
    ///
    /// Forbidden on virtual textures; use [`region_lock`](Self::region_lock).
    pub fn whole_lock(&self) -> Result<TextureLock<'_>, Error> {
        if self.info.is_virtual {
            return Err(violation(Violation::WholeLockOnVirtual));
        }
        let mut state = self.lock_state();
        let bits = state.surface.lock()?;
        debug_assert_eq!(bits.width, self.info.width_with_gutters);
        debug_assert_eq!(bits.height, self.info.height_with_gutters);
        let half_edge = self.info.half_edge();
        let address = self.offset_address(&bits, half_edge, half_edge);
        logwise::trace_sync!("whole_lock {id}", id = self.id().get());
        Ok(TextureLock {
            texture: self,
            state: Some(state),
            address,
            stride: bits.stride,
            region: Rect::full(self.info.width, self.info.height),
        })
    }

    /// Locks `region` (logical coordinates) for writing.
    pub fn region_lock(&self, region: Rect) -> Result<TextureLock<'_>, Error> {
        if region.is_empty() || !Rect::full(self.info.width, self.info.height).contains_rect(&region)
        {
            return Err(violation(Violation::RegionOutOfBounds {
                region,
                width: self.info.width,
                height: self.info.height,
            }));
        }
        let mut state = self.lock_state();
        let (address, stride) = if self.info.includes_gutters {
            let bits = state.surface.lock()?;
            let half_edge = self.info.half_edge();
            let address = self.offset_address(&bits, half_edge + region.x, half_edge + region.y);
            (address, bits.stride)
        } else {
            let bits = state.surface.lock_rect(region)?;
            debug_assert_eq!((bits.width, bits.height), (region.width, region.height));
            (bits.address, bits.stride)
        };
        logwise::trace_sync!(
            "region_lock {id} {region}",
            id = self.id().get(),
            region = logwise::privacy::LogIt(&region)
        );
        Ok(TextureLock {
            texture: self,
            state: Some(state),
            address,
            stride,
            region,
        })
    }

    fn offset_address(&self, bits: &LockedBits, x: u32, y: u32) -> NonNull<u8> {
        let offset =
            y as usize * bits.stride + x as usize * self.info.pixel_format.bytes_per_pixel();
        // SAFETY: (x, y) lies inside the locked surface, whose memory the surface guarantees.
        unsafe { bits.address.add(offset) }
    }

    fn release(
        &self,
        mut state: MutexGuard<'_, TextureState>,
        written: Rect,
        update: bool,
    ) -> Result<(), Error> {
        state.unfilled = state.unfilled.union(written);
        let unlocked = state.surface.unlock();
        drop(state);
        unlocked?;
        if update {
            self.queue_update()?;
        }
        Ok(())
    }

    /// Fills gutters around everything written since the last fill, marks the surface dirty and
    /// enqueues the texture for the next frame.
    ///
    /// Called by [`TextureLock::unlock`]; call it directly after a series of
    /// [`TextureLock::unlock_deferred`].
    pub fn queue_update(&self) -> Result<(), Error> {
        let mut state = self.lock_state();
        let written = std::mem::take(&mut state.unfilled);
        if self.info.includes_gutters && !self.producer_fills_gutters && !written.is_empty() {
            // nested lock: returns the same memory as any outstanding lock
            let bits = state.surface.lock()?;
            self.fill_gutters(&bits, written);
            state.surface.unlock()?;
        }
        state.surface.queue_update()?;
        drop(state);

        if let Some(manager) = self.manager.upgrade() {
            manager.enqueue(
                self.id(),
                self.this.clone(),
                self.info.composition_format,
                self.info.width_with_gutters,
                self.info.height_with_gutters,
            );
        }
        Ok(())
    }

    fn fill_gutters(&self, bits: &LockedBits, written: Rect) {
        let bytes_per_pixel = self.info.pixel_format.bytes_per_pixel();
        if bits.height == 0 {
            return;
        }
        let len = (bits.height as usize - 1) * bits.stride + bits.width as usize * bytes_per_pixel;
        // SAFETY: the surface guarantees `height` rows of `width` pixels, `stride` apart, while
        // locked, and we hold the texture mutex.
        let pixels = unsafe { std::slice::from_raw_parts_mut(bits.address.as_ptr(), len) };
        let half_edge = self.info.half_edge();
        // a violation has already been reported; the gutter is left as it was
        let _ = gutters::copy_gutters(
            pixels,
            bits.stride,
            bytes_per_pixel,
            written.offset(half_edge, half_edge),
            Rect::full(bits.width, bits.height),
        );
    }

    /// Pushes queued surface updates to the compositor.
    ///
    /// Returns `false` without flushing while [`hold_flush`](Self::set_hold_flush) is set.
    pub fn flush_updates(&self) -> Result<bool, Error> {
        let mut state = self.lock_state();
        if state.hold_flush {
            return Ok(false);
        }
        state.surface.flush_updates()?;
        Ok(true)
    }

    /// While set, [`flush_updates`](Self::flush_updates) reports "not flushed" and the texture
    /// stays pending.
    pub fn set_hold_flush(&self, hold_flush: bool) {
        self.lock_state().hold_flush = hold_flush;
    }

    pub fn hold_flush(&self) -> bool {
        self.lock_state().hold_flush
    }

    /// Whether the platform discarded the surface.
    ///
    /// A snapshot: the surface may be discarded right after this returns `false`.
    pub fn is_surface_lost(&self) -> bool {
        self.lock_state().surface.is_discarded()
    }

    /// Fills the texture with transparent black and queues the update.
    pub fn clear(&self) -> Result<(), Error> {
        if self.info.is_virtual {
            for tile in Tiles::new(self.info.width, self.info.height, self.tile_size) {
                let mut lock = self.region_lock(tile)?;
                lock.zero();
                lock.unlock()?;
            }
            return Ok(());
        }
        let mut lock = self.whole_lock()?;
        lock.zero();
        lock.unlock()
    }

    /// Copies a `width` × `height` area of `source`, starting at `source_origin`, into the
    /// texture.
    ///
    /// Virtual textures are written one tile at a time, so no single lock exceeds the tile size.
    /// Broken preconditions (format mismatch, a source too small, an oversized non-virtual
    /// texture) are contract violations; release builds skip the upload.
    pub fn update_from_software(
        &self,
        source: &dyn SourceSurface,
        source_origin: Texel,
    ) -> Result<(), Error> {
        let info = &self.info;
        if source.pixel_format() != info.pixel_format {
            let _ = violation(Violation::PixelFormatMismatch {
                source_format: source.pixel_format(),
                texture_format: info.pixel_format,
            });
            return Ok(());
        }
        if source_origin.x as u64 + info.width as u64 > source.width() as u64
            || source_origin.y as u64 + info.height as u64 > source.height() as u64
        {
            let _ = violation(Violation::SourceTooSmall {
                width: info.width,
                height: info.height,
            });
            return Ok(());
        }
        let tile_size = if info.is_virtual {
            self.tile_size
        } else {
            let max = self
                .manager
                .upgrade()
                .map_or(u32::MAX, |manager| manager.max_texture_size());
            if info.width > max || info.height > max {
                let _ = violation(Violation::OversizedNotVirtual {
                    width: info.width,
                    height: info.height,
                    max,
                });
                return Ok(());
            }
            info.width.max(info.height).max(1)
        };

        let _perf = logwise::perfwarn_begin!("update_from_software");
        let bits = source.lock_read()?;
        let result = self.upload_tiles(&bits, source_origin, tile_size);
        source.unlock_read();
        result
    }

    fn upload_tiles(
        &self,
        source: &SourceBits<'_>,
        origin: Texel,
        tile_size: u32,
    ) -> Result<(), Error> {
        let bytes_per_pixel = self.info.pixel_format.bytes_per_pixel();
        for tile in Tiles::new(self.info.width, self.info.height, tile_size) {
            let mut lock = self.region_lock(tile)?;
            let row_bytes = tile.width as usize * bytes_per_pixel;
            for row in 0..tile.height {
                let start = (origin.y + tile.y + row) as usize * source.stride
                    + (origin.x + tile.x) as usize * bytes_per_pixel;
                lock.row_mut(row)
                    .copy_from_slice(&source.bytes[start..start + row_bytes]);
            }
            lock.unlock()?;
        }
        Ok(())
    }

    pub fn id(&self) -> TextureId {
        self.base.id()
    }

    /// Identity, persistence and delete observers.
    pub fn base(&self) -> &TextureBase {
        &self.base
    }

    pub fn is_persistent(&self) -> bool {
        self.base.is_persistent()
    }

    pub fn set_persistent(&self, persistent: bool) {
        self.base.set_persistent(persistent);
    }

    /// Logical width, gutters excluded.
    pub fn width(&self) -> u32 {
        self.info.width
    }

    /// Logical height, gutters excluded.
    pub fn height(&self) -> u32 {
        self.info.height
    }

    pub fn width_with_gutters(&self) -> u32 {
        self.info.width_with_gutters
    }

    pub fn height_with_gutters(&self) -> u32 {
        self.info.height_with_gutters
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.info.pixel_format
    }

    pub fn composition_format(&self) -> CompositionFormat {
        self.info.composition_format
    }

    pub fn is_virtual(&self) -> bool {
        self.info.is_virtual
    }

    pub fn is_opaque(&self) -> bool {
        self.is_opaque
    }

    pub fn includes_gutters(&self) -> bool {
        self.info.includes_gutters
    }

    /// Whether the producer writes the gutters itself.
    pub fn producer_fills_gutters(&self) -> bool {
        self.producer_fills_gutters
    }

    /// Edge length of the tiles virtual textures are written in.
    pub(crate) fn tile_size(&self) -> u32 {
        self.tile_size
    }
}

impl Drop for RgbTexture {
    fn drop(&mut self) {
        if let Some(manager) = self.manager.upgrade() {
            manager.forget(self.base.id());
        }
        self.base.notify_deleted();
        logwise::trace_sync!("dropped texture {id}", id = self.base.id().get());
    }
}

/**
Write access to a locked area of an [`RgbTexture`].

Coordinates are relative to the locked area.  The permit holds the texture's mutex; release it
with [`unlock`](Self::unlock) or [`unlock_deferred`](Self::unlock_deferred).  Dropping a permit
without either is a bug: debug builds panic, release builds log it and unlock without queueing
an update.
*/
#[must_use = "release the lock with unlock() or unlock_deferred()"]
pub struct TextureLock<'a> {
    texture: &'a RgbTexture,
    state: Option<MutexGuard<'a, TextureState>>,
    address: NonNull<u8>,
    stride: usize,
    region: Rect,
}

impl Debug for TextureLock<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureLock")
            .field("texture", &self.texture.id())
            .field("region", &self.region)
            .field("stride", &self.stride)
            .finish_non_exhaustive()
    }
}

impl<'a> TextureLock<'a> {
    /// First byte of the locked area.
    ///
    /// Valid for `height` rows of `width * bytes_per_pixel` bytes, `stride` apart, until the
    /// permit is released.
    pub fn address(&self) -> NonNull<u8> {
        self.address
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn width(&self) -> u32 {
        self.region.width
    }

    pub fn height(&self) -> u32 {
        self.region.height
    }

    /// The locked area in logical texture coordinates.
    pub fn region(&self) -> Rect {
        self.region
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.texture.pixel_format()
    }

    fn row_bytes(&self) -> usize {
        self.region.width as usize * self.texture.pixel_format().bytes_per_pixel()
    }

    /// Bytes of row `y`.
    ///
    /// # Panics
    /// Panics if `y` is outside the locked area.
    pub fn row(&self, y: u32) -> &[u8] {
        assert!(y < self.region.height, "row {y} outside the locked area");
        // SAFETY: row `y` of the locked area, valid while the permit exists.
        unsafe {
            std::slice::from_raw_parts(
                self.address.as_ptr().add(y as usize * self.stride),
                self.row_bytes(),
            )
        }
    }

    /// Mutable bytes of row `y`.
    ///
    /// # Panics
    /// Panics if `y` is outside the locked area.
    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        assert!(y < self.region.height, "row {y} outside the locked area");
        // SAFETY: row `y` of the locked area; `&mut self` makes the borrow exclusive.
        unsafe {
            std::slice::from_raw_parts_mut(
                self.address.as_ptr().add(y as usize * self.stride),
                self.row_bytes(),
            )
        }
    }

    /// Bytes of the pixel at `texel`.
    pub fn pixel(&self, texel: Texel) -> &[u8] {
        assert!(texel.x < self.region.width, "{texel:?} outside the locked area");
        let bytes_per_pixel = self.texture.pixel_format().bytes_per_pixel();
        let start = texel.x as usize * bytes_per_pixel;
        &self.row(texel.y)[start..start + bytes_per_pixel]
    }

    /// Writes `pixel` (one pixel's bytes) at `texel`.
    pub fn set_pixel(&mut self, texel: Texel, pixel: &[u8]) {
        assert!(texel.x < self.region.width, "{texel:?} outside the locked area");
        let bytes_per_pixel = self.texture.pixel_format().bytes_per_pixel();
        let start = texel.x as usize * bytes_per_pixel;
        self.row_mut(texel.y)[start..start + bytes_per_pixel].copy_from_slice(pixel);
    }

    /// Sets every pixel of the locked area to `pixel`.
    ///
    /// # Panics
    /// Panics if `pixel` is not exactly one pixel long.
    pub fn fill(&mut self, pixel: &[u8]) {
        assert_eq!(pixel.len(), self.texture.pixel_format().bytes_per_pixel());
        for y in 0..self.region.height {
            for chunk in self.row_mut(y).chunks_exact_mut(pixel.len()) {
                chunk.copy_from_slice(pixel);
            }
        }
    }

    fn zero(&mut self) {
        for y in 0..self.region.height {
            self.row_mut(y).fill(0);
        }
    }

    /// Releases the lock, fills gutters and enqueues the texture for the next frame.
    pub fn unlock(mut self) -> Result<(), Error> {
        match self.state.take() {
            Some(state) => self.texture.release(state, self.region, true),
            None => Ok(()),
        }
    }

    /// Releases the lock without queueing an update.
    ///
    /// The written area is remembered; the next [`unlock`](Self::unlock) (or
    /// [`RgbTexture::queue_update`]) fills gutters around it.
    pub fn unlock_deferred(mut self) -> Result<(), Error> {
        match self.state.take() {
            Some(state) => self.texture.release(state, self.region, false),
            None => Ok(()),
        }
    }
}

impl TextureLock<'_> {
    /// Releases a lock that was only read through.
    pub(crate) fn unlock_unmodified(mut self) -> Result<(), Error> {
        match self.state.take() {
            Some(mut state) => state.surface.unlock(),
            None => Ok(()),
        }
    }
}

impl Drop for TextureLock<'_> {
    fn drop(&mut self) {
        let Some(mut state) = self.state.take() else {
            return;
        };
        let _ = state.surface.unlock();
        drop(state);
        if std::thread::panicking() {
            return;
        }
        logwise::warn_sync!(
            "texture lock on {id} dropped without unlock",
            id = self.texture.id().get()
        );
        if cfg!(debug_assertions) {
            panic!("TextureLock dropped without unlock() or unlock_deferred()");
        }
    }
}
