// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! CPU-side pixel buffers.

A [`SoftwareSurface`] is what software rasterizers and decoders produce before the pixels are
uploaded with [`RgbTexture::update_from_software`](crate::rgb_texture::RgbTexture::update_from_software).
It stores rows top to bottom; the row stride may be wider than the pixel data.

# Example

```
use tiles_and_gutters::geometry::Texel;
use tiles_and_gutters::pixel_formats::{Bgra8Pixel, PixelFormat};
use tiles_and_gutters::software::SoftwareSurface;

// A 4x4 horizontal gradient
let surface = SoftwareSurface::new_with(4, 4, |texel| Bgra8Pixel {
    b: 0,
    g: 0,
    r: texel.x as u8 * 64,
    a: 255,
});
assert_eq!(surface.pixel_format(), PixelFormat::Bgra32);
assert_eq!(&surface[Texel { x: 2, y: 1 }], &[0, 0, 128, 255]);
```
*/

use std::ops::{Index, IndexMut};

use crate::device::{SourceBits, SourceSurface};
use crate::error::Error;
use crate::geometry::Texel;
use crate::pixel_formats::{Pixel, PixelFormat, pixels_as_bytes};

/// A CPU pixel buffer in one of the crate's [`PixelFormat`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftwareSurface {
    pixel_format: PixelFormat,
    width: u32,
    height: u32,
    stride: usize,
    data: Vec<u8>,
}

impl SoftwareSurface {
    /// A zero-filled surface with tightly packed rows.
    pub fn new(pixel_format: PixelFormat, width: u32, height: u32) -> Self {
        let stride = width as usize * pixel_format.bytes_per_pixel();
        SoftwareSurface::with_stride(pixel_format, width, height, stride)
    }

    /// A zero-filled surface whose rows are `stride` bytes apart.
    ///
    /// # Panics
    /// Panics if `stride` is smaller than a row of pixels.
    pub fn with_stride(pixel_format: PixelFormat, width: u32, height: u32, stride: usize) -> Self {
        let row_bytes = width as usize * pixel_format.bytes_per_pixel();
        assert!(
            stride >= row_bytes,
            "stride {stride} is smaller than a {row_bytes} byte row"
        );
        SoftwareSurface {
            pixel_format,
            width,
            height,
            stride,
            data: vec![0; stride * height as usize],
        }
    }

    /// A surface with every pixel set to `pixel`.
    pub fn filled<P: Pixel>(width: u32, height: u32, pixel: P) -> Self {
        let mut surface = SoftwareSurface::new(P::FORMAT, width, height);
        surface.fill(pixel);
        surface
    }

    /// Creates a surface by calling `initializer` for each texel.
    pub fn new_with<P: Pixel, F: FnMut(Texel) -> P>(
        width: u32,
        height: u32,
        mut initializer: F,
    ) -> Self {
        let mut surface = SoftwareSurface::new(P::FORMAT, width, height);
        for y in 0..height {
            for x in 0..width {
                let texel = Texel { x, y };
                let pixel = initializer(texel);
                surface[texel].copy_from_slice(pixels_as_bytes(std::slice::from_ref(&pixel)));
            }
        }
        surface
    }

    /// Sets every pixel to `pixel`.
    ///
    /// # Panics
    /// Panics if `P` does not match the surface format.
    pub fn fill<P: Pixel>(&mut self, pixel: P) {
        assert_eq!(P::FORMAT, self.pixel_format, "pixel type does not match surface format");
        let bytes = pixels_as_bytes(std::slice::from_ref(&pixel));
        let row_bytes = self.row_bytes();
        for row in self.data.chunks_mut(self.stride.max(1)) {
            for chunk in row[..row_bytes].chunks_exact_mut(bytes.len()) {
                chunk.copy_from_slice(bytes);
            }
        }
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Bytes of row `y`, stride padding excluded.
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.row_bytes()]
    }

    fn row_bytes(&self) -> usize {
        self.width as usize * self.pixel_format.bytes_per_pixel()
    }

    fn offset(&self, texel: Texel) -> usize {
        assert!(
            texel.x < self.width && texel.y < self.height,
            "texel {texel:?} is outside the {}x{} surface",
            self.width,
            self.height
        );
        texel.y as usize * self.stride + texel.x as usize * self.pixel_format.bytes_per_pixel()
    }
}

impl Index<Texel> for SoftwareSurface {
    type Output = [u8];

    fn index(&self, texel: Texel) -> &[u8] {
        let start = self.offset(texel);
        &self.data[start..start + self.pixel_format.bytes_per_pixel()]
    }
}

impl IndexMut<Texel> for SoftwareSurface {
    fn index_mut(&mut self, texel: Texel) -> &mut [u8] {
        let start = self.offset(texel);
        let bpp = self.pixel_format.bytes_per_pixel();
        &mut self.data[start..start + bpp]
    }
}

impl SourceSurface for SoftwareSurface {
    fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn lock_read(&self) -> Result<SourceBits<'_>, Error> {
        Ok(SourceBits {
            bytes: &self.data,
            stride: self.stride,
            width: self.width,
            height: self.height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel_formats::Bgra8Pixel;

    #[test]
    fn fill_leaves_stride_padding() {
        let mut surface = SoftwareSurface::with_stride(PixelFormat::Gray8, 3, 2, 5);
        surface.fill(7u8);
        assert_eq!(surface.row(0), &[7, 7, 7]);
        assert_eq!(surface.row(1), &[7, 7, 7]);
        let bits = surface.lock_read().unwrap();
        assert_eq!(&bits.bytes[3..5], &[0, 0]);
    }

    #[test]
    fn new_with_places_pixels() {
        let surface = SoftwareSurface::new_with(3, 2, |t| (t.y * 3 + t.x) as u8);
        assert_eq!(surface.row(1), &[3, 4, 5]);
    }

    #[test]
    fn index_mut_writes_one_pixel() {
        let mut surface = SoftwareSurface::filled(2, 2, Bgra8Pixel::ZERO);
        surface[Texel::new(1, 1)].copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(surface.row(1), &[0, 0, 0, 0, 1, 2, 3, 4]);
    }

    #[test]
    #[should_panic]
    fn fill_with_wrong_type_panics() {
        let mut surface = SoftwareSurface::new(PixelFormat::Bgra32, 1, 1);
        surface.fill(1u8);
    }
}
