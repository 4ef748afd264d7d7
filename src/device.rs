// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The boundary between the texture manager and the platform.

The manager never allocates pixel memory itself.  It talks to:

- a [`SurfaceFactory`] that allocates [`DeviceSurface`]s,
- a [`MaxTextureSizeProvider`] and an [`AtlasRequestProvider`] that decide allocation policy,
- a [`FrameStatsSink`] that receives per-frame sizing hints.

All of them are injected through a [`DeviceContext`] at construction time.

An in-memory implementation of every trait lives in [`crate::imp::memory`].
*/

use std::fmt::Debug;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::error::Error;
use crate::geometry::Rect;
use crate::pixel_formats::{CompositionFormat, PixelFormat};

/// Number of gutter pixels a surface reserves across each axis (one on each side).
pub const BILINEAR_FILTER_EDGE: u32 = 2;

/// Memory handed out by a successful surface lock.
#[derive(Debug, Clone, Copy)]
pub struct LockedBits {
    /// First byte of the locked area.
    pub address: NonNull<u8>,
    /// Distance in bytes between the starts of two consecutive rows.
    pub stride: usize,
    /// Width of the locked area in pixels.
    pub width: u32,
    /// Height of the locked area in pixels.
    pub height: u32,
}

/// A platform-owned pixel buffer, optionally surrounded by a one pixel gutter.
///
/// # Safety
///
/// Implementors guarantee that every [`LockedBits`] returned from [`lock`](Self::lock) or
/// [`lock_rect`](Self::lock_rect) addresses `height` rows of `width` pixels, `stride` bytes
/// apart, that are valid for reads and writes and not accessed by anyone else until the
/// matching [`unlock`](Self::unlock).  Locks may nest; a nested `lock` returns the same memory.
pub unsafe trait DeviceSurface: Send + Debug {
    /// Locks the whole gutter-inclusive buffer.
    fn lock(&mut self) -> Result<LockedBits, Error>;
    /// Locks `region`, given in gutter-exclusive coordinates.
    fn lock_rect(&mut self, region: Rect) -> Result<LockedBits, Error>;
    fn unlock(&mut self) -> Result<(), Error>;
    /// Marks the most recently locked area dirty.
    fn queue_update(&mut self) -> Result<(), Error>;
    /// Pushes queued updates to the compositor.  Returns whether anything was pending.
    fn flush_updates(&mut self) -> Result<bool, Error>;

    fn width_with_gutters(&self) -> u32;
    fn height_with_gutters(&self) -> u32;
    fn width_without_gutters(&self) -> u32;
    fn height_without_gutters(&self) -> u32;
    fn includes_gutters(&self) -> bool;
    fn is_virtual(&self) -> bool;
    fn is_discarded(&self) -> bool;
    fn pixel_format(&self) -> PixelFormat;
    fn composition_format(&self) -> CompositionFormat;
}

/// Everything a [`SurfaceFactory`] needs to allocate a surface.
///
/// Sizes exclude gutters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceRequest {
    pub pixel_format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub is_opaque: bool,
    pub is_virtual: bool,
    pub request_atlas: bool,
    /// The producer writes its own padding; the surface is still allocated with gutters.
    pub producer_fills_padding: bool,
}

impl SurfaceRequest {
    pub fn new(pixel_format: PixelFormat, width: u32, height: u32) -> Self {
        SurfaceRequest {
            pixel_format,
            width,
            height,
            is_opaque: false,
            is_virtual: false,
            request_atlas: false,
            producer_fills_padding: false,
        }
    }
}

/// Allocates device surfaces.
pub trait SurfaceFactory: Send + Sync {
    fn create_surface(&self, request: &SurfaceRequest) -> Result<Box<dyn DeviceSurface>, Error>;
    /// A surface wrapper with no backing allocation, for deferred-allocation scenarios.
    fn create_surface_with_no_hardware(&self, is_virtual: bool) -> Box<dyn DeviceSurface>;
}

pub trait MaxTextureSizeProvider: Send + Sync {
    fn max_texture_size(&self) -> u32;
}

pub trait AtlasRequestProvider: Send + Sync {
    /// Whether a surface of this size and format should be packed into a shared atlas.
    fn atlas_request(&self, width: u32, height: u32, pixel_format: PixelFormat) -> bool;
}

/// Receives the largest texture dimensions updated during a frame.
///
/// A resource-sizing hint; implementations may ignore it.
pub trait FrameStatsSink: Send + Sync {
    fn largest_texture_in_frame(&self, format: CompositionFormat, width: u32, height: u32);
}

/// Read-only pixels of a [`SourceSurface`].
#[derive(Debug, Clone, Copy)]
pub struct SourceBits<'a> {
    pub bytes: &'a [u8],
    pub stride: usize,
    pub width: u32,
    pub height: u32,
}

/// A CPU-readable surface that can be uploaded into a texture.
///
/// Readers call [`lock_read`](Self::lock_read), copy out of the returned bits, drop them, then
/// call [`unlock_read`](Self::unlock_read).
pub trait SourceSurface {
    fn pixel_format(&self) -> PixelFormat;
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    /// Borrows the pixels for reading.
    fn lock_read(&self) -> Result<SourceBits<'_>, Error>;
    fn unlock_read(&self) {}
}

/// The collaborators a [`TextureManager`](crate::manager::TextureManager) is constructed with.
#[derive(Clone)]
pub struct DeviceContext {
    pub surfaces: Arc<dyn SurfaceFactory>,
    pub max_texture_size: Arc<dyn MaxTextureSizeProvider>,
    pub atlas: Arc<dyn AtlasRequestProvider>,
    pub frame_stats: Arc<dyn FrameStatsSink>,
}

impl Debug for DeviceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceContext")
            .field("max_texture_size", &self.max_texture_size.max_texture_size())
            .finish_non_exhaustive()
    }
}
