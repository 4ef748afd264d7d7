// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
A device whose surfaces live in process memory.

[`MemoryDevice`] implements every collaborator trait from [`crate::device`], so a
[`TextureManager`](crate::manager::TextureManager) can run headless:

```
use tiles_and_gutters::imp::MemoryDevice;
use tiles_and_gutters::manager::{TextureFlags, TextureManager};
use tiles_and_gutters::pixel_formats::PixelFormat;

let device = MemoryDevice::new();
let manager = TextureManager::new(device.context());
let texture = manager
    .create_texture(PixelFormat::Bgra32, 64, 64, TextureFlags::empty())
    .unwrap();
assert!(texture.includes_gutters());
assert_eq!(device.last_surface().unwrap().width_with_gutters(), 66);
```

Surfaces behave like atlas-backed compositor surfaces:

- a surface gets a one pixel gutter when it is not virtual and was either requested into an
  atlas or will have its padding filled by the producer,
- rows are padded to [`ROW_ALIGNMENT`] bytes, so the stride is rarely `width * bytes_per_pixel`,
- a surface can be discarded at any time through its [`SurfaceProbe`], after which every lock
  fails with [`Error::DeviceLost`].

Probes also expose the gutter-inclusive pixels and a log of lock calls, which is what the
crate's tests inspect.
*/

use std::fmt::Debug;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::device::{
    AtlasRequestProvider, BILINEAR_FILTER_EDGE, DeviceContext, DeviceSurface, FrameStatsSink,
    LockedBits, MaxTextureSizeProvider, SurfaceFactory, SurfaceRequest,
};
use crate::error::{Error, Violation, violation};
use crate::geometry::Rect;
use crate::pixel_formats::{CompositionFormat, PixelFormat};

/// Row pitch alignment, matching the copy alignment GPU APIs require of staging buffers.
pub const ROW_ALIGNMENT: usize = 256;

pub const DEFAULT_MAX_TEXTURE_SIZE: u32 = 4096;

/// Surfaces at most this large in both dimensions are placed in an atlas.
pub const DEFAULT_ATLAS_THRESHOLD: u32 = 512;

/// One call to [`DeviceSurface::lock`] or [`DeviceSurface::lock_rect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockRecord {
    Whole,
    /// Gutter-exclusive region.
    Rect(Rect),
}

/// The most recent report received through [`FrameStatsSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    pub format: CompositionFormat,
    pub width: u32,
    pub height: u32,
}

fn lock_ignoring_poison<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A leaked boxed slice, reclaimed on drop.
///
/// Held as a raw pointer so that lock holders can write through it while probes hold a shared
/// reference to the surface.
struct Pixels {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: the bytes are only touched through the lock protocol of `MemorySurface` and by
// probes, which refuse to read while a lock is outstanding.
unsafe impl Send for Pixels {}
unsafe impl Sync for Pixels {}

impl Pixels {
    fn zeroed(len: usize) -> Self {
        let leaked: &mut [u8] = Box::leak(vec![0u8; len].into_boxed_slice());
        Pixels {
            ptr: NonNull::from(leaked).cast::<u8>(),
            len,
        }
    }
}

impl Drop for Pixels {
    fn drop(&mut self) {
        // SAFETY: ptr and len came from the boxed slice leaked in `zeroed`.
        unsafe {
            drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                self.ptr.as_ptr(),
                self.len,
            )));
        }
    }
}

#[derive(Debug, Default)]
struct SurfaceStats {
    locks: Vec<LockRecord>,
    queued: usize,
    pending: usize,
    flushes: usize,
}

struct SurfaceShared {
    pixels: Pixels,
    stride: usize,
    width: u32,
    height: u32,
    gutters: bool,
    pixel_format: PixelFormat,
    is_virtual: bool,
    lock_depth: AtomicU32,
    discarded: AtomicBool,
    released: AtomicBool,
    stats: Mutex<SurfaceStats>,
}

impl Debug for SurfaceShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceShared")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("gutters", &self.gutters)
            .field("pixel_format", &self.pixel_format)
            .field("is_virtual", &self.is_virtual)
            .field("discarded", &self.discarded.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl SurfaceShared {
    fn edge(&self) -> u32 {
        if self.gutters { BILINEAR_FILTER_EDGE } else { 0 }
    }

    fn padded_width(&self) -> u32 {
        self.width + self.edge()
    }

    fn padded_height(&self) -> u32 {
        self.height + self.edge()
    }

    fn stats(&self) -> MutexGuard<'_, SurfaceStats> {
        lock_ignoring_poison(&self.stats)
    }
}

/// A [`DeviceSurface`] backed by a heap buffer.
#[derive(Debug)]
pub struct MemorySurface {
    shared: Arc<SurfaceShared>,
}

impl MemorySurface {
    fn allocate(request: &SurfaceRequest) -> Result<Self, Error> {
        let gutters =
            (request.request_atlas || request.producer_fills_padding) && !request.is_virtual;
        let edge = if gutters { BILINEAR_FILTER_EDGE } else { 0 };
        let failed = |reason| Error::AllocationFailed {
            width: request.width,
            height: request.height,
            reason,
        };
        let padded_width = request.width.checked_add(edge).ok_or(failed("size overflow"))?;
        let padded_height = request.height.checked_add(edge).ok_or(failed("size overflow"))?;
        let row_bytes = (padded_width as usize)
            .checked_mul(request.pixel_format.bytes_per_pixel())
            .ok_or(failed("size overflow"))?;
        let stride = row_bytes
            .checked_next_multiple_of(ROW_ALIGNMENT)
            .ok_or(failed("size overflow"))?;
        let len = stride
            .checked_mul(padded_height as usize)
            .ok_or(failed("size overflow"))?;
        Ok(MemorySurface::from_parts(
            Pixels::zeroed(len),
            stride,
            request,
            gutters,
            false,
        ))
    }

    fn without_hardware(is_virtual: bool) -> Self {
        let mut request = SurfaceRequest::new(PixelFormat::Bgra32, 0, 0);
        request.is_virtual = is_virtual;
        MemorySurface::from_parts(Pixels::zeroed(0), 0, &request, false, true)
    }

    fn from_parts(
        pixels: Pixels,
        stride: usize,
        request: &SurfaceRequest,
        gutters: bool,
        discarded: bool,
    ) -> Self {
        MemorySurface {
            shared: Arc::new(SurfaceShared {
                pixels,
                stride,
                width: request.width,
                height: request.height,
                gutters,
                pixel_format: request.pixel_format,
                is_virtual: request.is_virtual,
                lock_depth: AtomicU32::new(0),
                discarded: AtomicBool::new(discarded),
                released: AtomicBool::new(false),
                stats: Mutex::new(SurfaceStats::default()),
            }),
        }
    }

    /// A probe observing this surface.
    pub fn probe(&self) -> SurfaceProbe {
        SurfaceProbe {
            shared: self.shared.clone(),
        }
    }

    fn check_live(&self) -> Result<(), Error> {
        if self.shared.discarded.load(Ordering::Acquire) {
            Err(Error::DeviceLost)
        } else {
            Ok(())
        }
    }
}

impl Drop for MemorySurface {
    fn drop(&mut self) {
        self.shared.released.store(true, Ordering::Release);
    }
}

// SAFETY: `lock` hands out the start of the allocation with its full padded extent, and
// `lock_rect` an in-bounds offset into it.  Exclusive access while locked is provided by the
// owner of the `&mut self` (the texture's mutex); probes never read while `lock_depth > 0`.
unsafe impl DeviceSurface for MemorySurface {
    fn lock(&mut self) -> Result<LockedBits, Error> {
        self.check_live()?;
        self.shared.lock_depth.fetch_add(1, Ordering::AcqRel);
        self.shared.stats().locks.push(LockRecord::Whole);
        Ok(LockedBits {
            address: self.shared.pixels.ptr,
            stride: self.shared.stride,
            width: self.shared.padded_width(),
            height: self.shared.padded_height(),
        })
    }

    fn lock_rect(&mut self, region: Rect) -> Result<LockedBits, Error> {
        self.check_live()?;
        let shared = &self.shared;
        if region.is_empty() || !Rect::full(shared.width, shared.height).contains_rect(&region) {
            return Err(violation(Violation::RegionOutOfBounds {
                region,
                width: shared.width,
                height: shared.height,
            }));
        }
        let half_edge = shared.edge() / 2;
        let offset = (region.y + half_edge) as usize * shared.stride
            + (region.x + half_edge) as usize * shared.pixel_format.bytes_per_pixel();
        // SAFETY: region lies inside the logical bounds, so offset is inside the allocation.
        let address = unsafe { shared.pixels.ptr.add(offset) };
        shared.lock_depth.fetch_add(1, Ordering::AcqRel);
        shared.stats().locks.push(LockRecord::Rect(region));
        Ok(LockedBits {
            address,
            stride: shared.stride,
            width: region.width,
            height: region.height,
        })
    }

    fn unlock(&mut self) -> Result<(), Error> {
        let previous =
            self.shared
                .lock_depth
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |depth| {
                    depth.checked_sub(1)
                });
        debug_assert!(previous.is_ok(), "unlock without a matching lock");
        Ok(())
    }

    fn queue_update(&mut self) -> Result<(), Error> {
        self.check_live()?;
        let mut stats = self.shared.stats();
        stats.queued += 1;
        stats.pending += 1;
        Ok(())
    }

    fn flush_updates(&mut self) -> Result<bool, Error> {
        self.check_live()?;
        let mut stats = self.shared.stats();
        stats.flushes += 1;
        let had_pending = stats.pending > 0;
        stats.pending = 0;
        Ok(had_pending)
    }

    fn width_with_gutters(&self) -> u32 {
        self.shared.padded_width()
    }

    fn height_with_gutters(&self) -> u32 {
        self.shared.padded_height()
    }

    fn width_without_gutters(&self) -> u32 {
        self.shared.width
    }

    fn height_without_gutters(&self) -> u32 {
        self.shared.height
    }

    fn includes_gutters(&self) -> bool {
        self.shared.gutters
    }

    fn is_virtual(&self) -> bool {
        self.shared.is_virtual
    }

    fn is_discarded(&self) -> bool {
        self.shared.discarded.load(Ordering::Acquire)
    }

    fn pixel_format(&self) -> PixelFormat {
        self.shared.pixel_format
    }

    fn composition_format(&self) -> CompositionFormat {
        self.shared.pixel_format.composition_format()
    }
}

/// Test-side view of a [`MemorySurface`].
///
/// Outlives the surface; after the owning texture is destroyed the probe still reads the last
/// contents and reports [`is_released`](Self::is_released).
#[derive(Debug, Clone)]
pub struct SurfaceProbe {
    shared: Arc<SurfaceShared>,
}

impl SurfaceProbe {
    pub fn width_with_gutters(&self) -> u32 {
        self.shared.padded_width()
    }

    pub fn height_with_gutters(&self) -> u32 {
        self.shared.padded_height()
    }

    pub fn includes_gutters(&self) -> bool {
        self.shared.gutters
    }

    pub fn is_virtual(&self) -> bool {
        self.shared.is_virtual
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.shared.pixel_format
    }

    pub fn stride(&self) -> usize {
        self.shared.stride
    }

    pub fn lock_depth(&self) -> u32 {
        self.shared.lock_depth.load(Ordering::Acquire)
    }

    /// Bytes of the pixel at `(x, y)` in gutter-inclusive coordinates.
    ///
    /// # Panics
    /// Panics if the surface is locked or the coordinates are outside the padded buffer.
    pub fn padded_pixel(&self, x: u32, y: u32) -> Vec<u8> {
        let shared = &self.shared;
        assert!(
            x < shared.padded_width() && y < shared.padded_height(),
            "({x}, {y}) is outside the padded surface"
        );
        let bpp = shared.pixel_format.bytes_per_pixel();
        let start = y as usize * shared.stride + x as usize * bpp;
        self.read(start, bpp)
    }

    /// Bytes of the pixel at `(x, y)` in logical coordinates.
    pub fn pixel(&self, x: u32, y: u32) -> Vec<u8> {
        let half_edge = self.shared.edge() / 2;
        self.padded_pixel(x + half_edge, y + half_edge)
    }

    /// The gutter-inclusive buffer, rows packed without stride padding.
    pub fn padded_pixels(&self) -> Vec<u8> {
        let shared = &self.shared;
        let row_bytes = shared.padded_width() as usize * shared.pixel_format.bytes_per_pixel();
        let mut out = Vec::with_capacity(row_bytes * shared.padded_height() as usize);
        for y in 0..shared.padded_height() as usize {
            out.extend_from_slice(&self.read(y * shared.stride, row_bytes));
        }
        out
    }

    fn read(&self, start: usize, len: usize) -> Vec<u8> {
        assert_eq!(self.lock_depth(), 0, "surface is locked");
        let pixels = &self.shared.pixels;
        assert!(start + len <= pixels.len);
        // SAFETY: in bounds, and no lock holder is writing.
        unsafe { std::slice::from_raw_parts(pixels.ptr.as_ptr().add(start), len).to_vec() }
    }

    /// Every lock taken since creation (or the last [`clear_lock_log`](Self::clear_lock_log)).
    pub fn lock_log(&self) -> Vec<LockRecord> {
        self.shared.stats().locks.clone()
    }

    pub fn clear_lock_log(&self) {
        self.shared.stats().locks.clear();
    }

    /// Calls to [`DeviceSurface::queue_update`].
    pub fn queue_count(&self) -> usize {
        self.shared.stats().queued
    }

    /// Calls to [`DeviceSurface::flush_updates`].
    pub fn flush_count(&self) -> usize {
        self.shared.stats().flushes
    }

    /// Updates queued since the last flush.
    pub fn pending_updates(&self) -> usize {
        self.shared.stats().pending
    }

    /// Simulates the platform discarding the allocation.
    pub fn discard(&self) {
        self.shared.discarded.store(true, Ordering::Release);
    }

    /// Whether the owning [`MemorySurface`] has been dropped.
    pub fn is_released(&self) -> bool {
        self.shared.released.load(Ordering::Acquire)
    }
}

/// An in-memory device: surface factory, policy provider and frame-stats sink in one.
#[derive(Debug)]
pub struct MemoryDevice {
    max_texture_size: AtomicU32,
    atlas_threshold: AtomicU32,
    fail_allocations: AtomicBool,
    surfaces: Mutex<Vec<Weak<SurfaceShared>>>,
    last_frame_report: Mutex<Option<FrameReport>>,
    frame_reports: AtomicUsize,
}

impl MemoryDevice {
    pub fn new() -> Arc<Self> {
        MemoryDevice::with_max_texture_size(DEFAULT_MAX_TEXTURE_SIZE)
    }

    pub fn with_max_texture_size(max_texture_size: u32) -> Arc<Self> {
        Arc::new(MemoryDevice {
            max_texture_size: AtomicU32::new(max_texture_size),
            atlas_threshold: AtomicU32::new(DEFAULT_ATLAS_THRESHOLD),
            fail_allocations: AtomicBool::new(false),
            surfaces: Mutex::new(Vec::new()),
            last_frame_report: Mutex::new(None),
            frame_reports: AtomicUsize::new(0),
        })
    }

    /// Collaborators for a [`TextureManager`](crate::manager::TextureManager), all backed by
    /// this device.
    pub fn context(self: &Arc<Self>) -> DeviceContext {
        DeviceContext {
            surfaces: self.clone(),
            max_texture_size: self.clone(),
            atlas: self.clone(),
            frame_stats: self.clone(),
        }
    }

    pub fn set_max_texture_size(&self, max_texture_size: u32) {
        self.max_texture_size
            .store(max_texture_size, Ordering::Relaxed);
    }

    /// Surfaces at most `threshold` in both dimensions are atlas requests.  Zero disables atlasing.
    pub fn set_atlas_threshold(&self, threshold: u32) {
        self.atlas_threshold.store(threshold, Ordering::Relaxed);
    }

    /// While set, every [`SurfaceFactory::create_surface`] call fails.
    pub fn set_fail_allocations(&self, fail: bool) {
        self.fail_allocations.store(fail, Ordering::Relaxed);
    }

    /// Probes for every surface that has not been released, in creation order.
    pub fn surfaces(&self) -> Vec<SurfaceProbe> {
        lock_ignoring_poison(&self.surfaces)
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|shared| !shared.released.load(Ordering::Acquire))
            .map(|shared| SurfaceProbe { shared })
            .collect()
    }

    /// The most recently created surface that is still alive.
    pub fn last_surface(&self) -> Option<SurfaceProbe> {
        self.surfaces().pop()
    }

    /// Discards every live surface, as a device reset would.
    pub fn discard_all(&self) {
        for probe in self.surfaces() {
            probe.discard();
        }
    }

    pub fn last_frame_report(&self) -> Option<FrameReport> {
        *lock_ignoring_poison(&self.last_frame_report)
    }

    pub fn frame_report_count(&self) -> usize {
        self.frame_reports.load(Ordering::Relaxed)
    }

    fn track(&self, surface: &MemorySurface) {
        let mut surfaces = lock_ignoring_poison(&self.surfaces);
        surfaces.retain(|weak| weak.strong_count() > 0);
        surfaces.push(Arc::downgrade(&surface.shared));
    }
}

impl SurfaceFactory for MemoryDevice {
    fn create_surface(&self, request: &SurfaceRequest) -> Result<Box<dyn DeviceSurface>, Error> {
        if self.fail_allocations.load(Ordering::Relaxed) {
            return Err(Error::AllocationFailed {
                width: request.width,
                height: request.height,
                reason: "allocation failure injected",
            });
        }
        let surface = MemorySurface::allocate(request)?;
        let max = self.max_texture_size();
        if !request.is_virtual
            && (surface.width_with_gutters() > max || surface.height_with_gutters() > max)
        {
            return Err(Error::AllocationFailed {
                width: request.width,
                height: request.height,
                reason: "exceeds the maximum texture size",
            });
        }
        logwise::trace_sync!(
            "memory surface {w}x{h} gutters={gutters}",
            w = request.width,
            h = request.height,
            gutters = logwise::privacy::LogIt(&surface.includes_gutters())
        );
        self.track(&surface);
        Ok(Box::new(surface))
    }

    fn create_surface_with_no_hardware(&self, is_virtual: bool) -> Box<dyn DeviceSurface> {
        let surface = MemorySurface::without_hardware(is_virtual);
        self.track(&surface);
        Box::new(surface)
    }
}

impl MaxTextureSizeProvider for MemoryDevice {
    fn max_texture_size(&self) -> u32 {
        self.max_texture_size.load(Ordering::Relaxed)
    }
}

impl AtlasRequestProvider for MemoryDevice {
    fn atlas_request(&self, width: u32, height: u32, _pixel_format: PixelFormat) -> bool {
        let threshold = self.atlas_threshold.load(Ordering::Relaxed);
        width <= threshold && height <= threshold
    }
}

impl FrameStatsSink for MemoryDevice {
    fn largest_texture_in_frame(&self, format: CompositionFormat, width: u32, height: u32) {
        *lock_ignoring_poison(&self.last_frame_report) = Some(FrameReport {
            format,
            width,
            height,
        });
        self.frame_reports.fetch_add(1, Ordering::Relaxed);
    }
}
