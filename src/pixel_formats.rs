// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Pixel format definitions for managed textures.
//!
//! Textures in this crate are filled through raw, stride-addressed memory handed out by a
//! device surface, so the format is a runtime value ([`PixelFormat`]) rather than a type
//! parameter. Each format encodes:
//!
//! - the number of bytes per pixel (1, 4 or 8)
//! - the format the compositor sees for the surface ([`CompositionFormat`])
//!
//! # Available formats
//!
//! - [`PixelFormat::Gray8`] - 8-bit alpha-only masks
//! - [`PixelFormat::Bgra32`] - 32-bit premultiplied BGRA color, the common case
//! - [`PixelFormat::Rgba64Float`] - 64-bit half-float RGBA for high dynamic range content
//!
//! Typed pixel structs ([`Bgra8Pixel`], [`Rgba16FloatPixel`]) are provided for callers that
//! want to write whole pixels instead of bytes.
//!
//! # Examples
//!
//! ```
//! use tiles_and_gutters::pixel_formats::{Bgra8Pixel, PixelFormat};
//!
//! assert_eq!(PixelFormat::Bgra32.bytes_per_pixel(), 4);
//! let red = Bgra8Pixel { b: 0, g: 0, r: 255, a: 255 };
//! assert_eq!(red.to_bytes(), [0, 0, 255, 255]);
//! ```

use std::fmt::Debug;

pub use half::f16;

/// Sealed traits for pixel memory layouts.
///
/// Only the layouts defined in this crate may be used with the raw copy routines, which
/// reinterpret surface memory as slices of these types.
pub(crate) mod sealed {
    /// Marker trait indicating C-compatible memory layout.
    ///
    /// Types implementing this trait have predictable memory layout with:
    /// - No padding between fields
    /// - No uninitialized bytes
    /// - Every bit pattern is a valid value
    ///
    /// # Safety
    ///
    /// This trait is unsafe to implement because incorrect implementation
    /// could lead to undefined behavior when casting to/from byte slices.
    pub unsafe trait ReprC: Copy {}

    /// A pixel-sized unit the gutter copy moves as a whole.
    ///
    /// Implemented for the 1, 4 and 8 byte integer types; the copy never looks inside a pixel.
    pub trait GutterPixel: ReprC {
        const SIZE: usize;
    }
}

use sealed::{GutterPixel, ReprC};

unsafe impl ReprC for u8 {}
unsafe impl ReprC for u32 {}
unsafe impl ReprC for u64 {}

impl GutterPixel for u8 {
    const SIZE: usize = 1;
}
impl GutterPixel for u32 {
    const SIZE: usize = 4;
}
impl GutterPixel for u64 {
    const SIZE: usize = 8;
}

/// Convert a slice of C-compatible pixels to raw bytes.
///
/// # Safety
///
/// This function is safe because it requires `T: ReprC`, which guarantees
/// C-compatible memory layout with no padding or uninitialized bytes.
pub(crate) fn pixel_as_bytes<T: ReprC>(t: &[T]) -> &[u8] {
    //safe because we know that T is repr(C)
    //(we offloaded the safety check to the ReprC trait)
    unsafe { std::slice::from_raw_parts(t.as_ptr() as *const u8, std::mem::size_of_val(t)) }
}

/// Pixel formats a managed texture can be created with.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 8-bit alpha-only mask.
    Gray8,
    /// 32-bit premultiplied BGRA, 8 bits per channel.
    Bgra32,
    /// 64-bit RGBA, one IEEE half float per channel.
    Rgba64Float,
}

impl PixelFormat {
    /// Number of bytes per pixel for this format.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Bgra32 => 4,
            PixelFormat::Rgba64Float => 8,
        }
    }

    /// The format a compositor surface natively backing this format would have.
    pub const fn composition_format(self) -> CompositionFormat {
        match self {
            PixelFormat::Gray8 => CompositionFormat::A8Unorm,
            PixelFormat::Bgra32 => CompositionFormat::B8G8R8A8Unorm,
            PixelFormat::Rgba64Float => CompositionFormat::R16G16B16A16Float,
        }
    }
}

/// Surface formats as seen by the compositor.
///
/// This can differ from the [`PixelFormat`] a texture was created with, e.g. when a device
/// has no native 8-bit surface support and widens alpha masks to BGRA.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CompositionFormat {
    A8Unorm,
    B8G8R8A8Unorm,
    R16G16B16A16Float,
}

/// Pixel type for [`PixelFormat::Bgra32`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(C)]
pub struct Bgra8Pixel {
    pub b: u8,
    pub g: u8,
    pub r: u8,
    pub a: u8,
}
unsafe impl ReprC for Bgra8Pixel {}

impl Bgra8Pixel {
    /// Transparent black constant.
    pub const ZERO: Bgra8Pixel = Bgra8Pixel {
        b: 0,
        g: 0,
        r: 0,
        a: 0,
    };

    /// Create from float values (0.0-1.0), scaled to 0-255 and clamped.
    #[inline]
    pub fn from_floats(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self {
            r: (255.0 * r).round().clamp(0.0, 255.0) as u8,
            g: (255.0 * g).round().clamp(0.0, 255.0) as u8,
            b: (255.0 * b).round().clamp(0.0, 255.0) as u8,
            a: (255.0 * a).round().clamp(0.0, 255.0) as u8,
        }
    }

    /// Memory order bytes.
    pub const fn to_bytes(self) -> [u8; 4] {
        [self.b, self.g, self.r, self.a]
    }

    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Bgra8Pixel {
            b: bytes[0],
            g: bytes[1],
            r: bytes[2],
            a: bytes[3],
        }
    }
}

/// Pixel type for [`PixelFormat::Rgba64Float`].
///
/// Contains four IEEE half-precision values with C-compatible memory layout.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[repr(C)]
pub struct Rgba16FloatPixel {
    pub r: f16,
    pub g: f16,
    pub b: f16,
    pub a: f16,
}
unsafe impl ReprC for Rgba16FloatPixel {}

impl Rgba16FloatPixel {
    pub fn from_f32(r: f32, g: f32, b: f32, a: f32) -> Self {
        Rgba16FloatPixel {
            r: f16::from_f32(r),
            g: f16::from_f32(g),
            b: f16::from_f32(b),
            a: f16::from_f32(a),
        }
    }

    /// Memory order bytes: each channel in native byte order, as the surfaces store them.
    pub fn to_bytes(self) -> [u8; 8] {
        let mut out = [0u8; 8];
        out.copy_from_slice(pixel_as_bytes(std::slice::from_ref(&self)));
        out
    }
}

/// Bytes of a typed pixel slice, for writing into locked texture memory.
///
/// ```
/// use tiles_and_gutters::pixel_formats::{pixels_as_bytes, Bgra8Pixel};
///
/// let row = [Bgra8Pixel::ZERO; 3];
/// assert_eq!(pixels_as_bytes(&row).len(), 12);
/// ```
pub fn pixels_as_bytes<T: Pixel>(pixels: &[T]) -> &[u8] {
    pixel_as_bytes(pixels)
}

/// Typed pixels that can be written into a texture of a given format.
pub trait Pixel: sealed::ReprC + Debug {
    const FORMAT: PixelFormat;
}

impl Pixel for u8 {
    const FORMAT: PixelFormat = PixelFormat::Gray8;
}
impl Pixel for Bgra8Pixel {
    const FORMAT: PixelFormat = PixelFormat::Bgra32;
}
impl Pixel for Rgba16FloatPixel {
    const FORMAT: PixelFormat = PixelFormat::Rgba64Float;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_sizes_match_formats() {
        assert_eq!(std::mem::size_of::<Bgra8Pixel>(), PixelFormat::Bgra32.bytes_per_pixel());
        assert_eq!(
            std::mem::size_of::<Rgba16FloatPixel>(),
            PixelFormat::Rgba64Float.bytes_per_pixel()
        );
        assert_eq!(<u64 as GutterPixel>::SIZE, 8);
    }

    #[test]
    fn half_pixel_bytes() {
        let p = Rgba16FloatPixel::from_f32(1.0, 0.0, 0.0, 1.0);
        let bytes = p.to_bytes();
        assert_eq!(&bytes[0..2], &f16::from_f32(1.0).to_ne_bytes());
        assert_eq!(&bytes[2..4], &f16::from_f32(0.0).to_ne_bytes());
        assert_eq!(&bytes[6..8], &f16::from_f32(1.0).to_ne_bytes());
    }
}
