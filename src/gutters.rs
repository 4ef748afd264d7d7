// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Gutter replication.

A surface packed into an atlas is surrounded by a one pixel gutter so that bilinear sampling
across its edge reads a continuation of the edge instead of the neighbouring atlas entry.
After content is written, [`copy_gutters`] replicates the written edge pixels outward:

```text
 padded ┌──┬────────┬──┐
        │TL│  top   │TR│
        ├──┼────────┼──┤
        │ L│content │R │
        ├──┼────────┼──┤
        │BL│ bottom │BR│
        └──┴────────┴──┘
```

Only sides the written rectangle actually reaches are replicated, and only along the extent
that was written.  Corners are replicated when both adjacent sides are reached.
*/

use crate::error::{Error, Violation, violation};
use crate::geometry::{Rect, Texel};
use crate::pixel_formats::sealed::GutterPixel;

/// Copies `src` to the same-sized rectangle at `dst`, one `P` at a time.
///
/// Coordinates are in pixels of `P`; rows are `stride` bytes apart.
///
/// # Panics
/// Panics if either rectangle extends past the end of `pixels`.
pub(crate) fn copy_rect<P: GutterPixel>(pixels: &mut [u8], stride: usize, dst: Texel, src: Rect) {
    for row in 0..src.height as usize {
        let src_row = (src.y as usize + row) * stride;
        let dst_row = (dst.y as usize + row) * stride;
        for column in 0..src.width as usize {
            let from = src_row + (src.x as usize + column) * P::SIZE;
            let to = dst_row + (dst.x as usize + column) * P::SIZE;
            let source = &pixels[from..from + P::SIZE];
            // SAFETY: `source` is exactly `size_of::<P>()` initialized bytes and every bit
            // pattern is a valid `P` (`ReprC`).  Surface memory carries no alignment guarantee.
            let value: P = unsafe { std::ptr::read_unaligned(source.as_ptr().cast::<P>()) };
            let target = &mut pixels[to..to + P::SIZE];
            // SAFETY: `target` is exactly `size_of::<P>()` bytes of the same buffer.
            unsafe { std::ptr::write_unaligned(target.as_mut_ptr().cast::<P>(), value) };
        }
    }
}

struct GutterRegion {
    touches: bool,
    dst: Texel,
    src: Rect,
}

/// Replicates the edges of `locked` into the gutter of `padded`.
///
/// Both rectangles are in gutter-inclusive surface coordinates, `padded` includes the gutter
/// and `locked` lies inside it.  `pixels` starts at the surface origin.
///
/// Pixel sizes other than 1, 4 and 8 bytes are a contract violation: fatal in debug builds,
/// otherwise nothing is copied and the violation is returned.
pub fn copy_gutters(
    pixels: &mut [u8],
    stride: usize,
    pixel_size: usize,
    locked: Rect,
    padded: Rect,
) -> Result<(), Error> {
    debug_assert!(padded.right() as usize * pixel_size <= stride);
    debug_assert!(padded.contains_rect(&locked));
    if locked.is_empty() {
        return Ok(());
    }

    let left = locked.x == padded.x + 1;
    let right = locked.right() + 1 == padded.right();
    let top = locked.y == padded.y + 1;
    let bottom = locked.bottom() + 1 == padded.bottom();

    let last_column = padded.right() - 1;
    let last_row = padded.bottom() - 1;
    let locked_last_column = locked.right() - 1;
    let locked_last_row = locked.bottom() - 1;

    let regions = [
        GutterRegion {
            touches: left,
            dst: Texel::new(padded.x, locked.y),
            src: Rect::new(locked.x, locked.y, 1, locked.height),
        },
        GutterRegion {
            touches: left && top,
            dst: Texel::new(padded.x, padded.y),
            src: Rect::new(locked.x, locked.y, 1, 1),
        },
        GutterRegion {
            touches: top,
            dst: Texel::new(locked.x, padded.y),
            src: Rect::new(locked.x, locked.y, locked.width, 1),
        },
        GutterRegion {
            touches: top && right,
            dst: Texel::new(last_column, padded.y),
            src: Rect::new(locked_last_column, locked.y, 1, 1),
        },
        GutterRegion {
            touches: right,
            dst: Texel::new(last_column, locked.y),
            src: Rect::new(locked_last_column, locked.y, 1, locked.height),
        },
        GutterRegion {
            touches: bottom && right,
            dst: Texel::new(last_column, last_row),
            src: Rect::new(locked_last_column, locked_last_row, 1, 1),
        },
        GutterRegion {
            touches: bottom,
            dst: Texel::new(locked.x, last_row),
            src: Rect::new(locked.x, locked_last_row, locked.width, 1),
        },
        GutterRegion {
            touches: bottom && left,
            dst: Texel::new(padded.x, last_row),
            src: Rect::new(locked.x, locked_last_row, 1, 1),
        },
    ];

    let copy: fn(&mut [u8], usize, Texel, Rect) = match pixel_size {
        1 => copy_rect::<u8>,
        4 => copy_rect::<u32>,
        8 => copy_rect::<u64>,
        other => return Err(violation(Violation::UnsupportedPixelSize(other))),
    };
    for region in regions.iter().filter(|r| r.touches) {
        copy(pixels, stride, region.dst, region.src);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A `w`x`h` one-byte-per-pixel buffer whose content area (inset by one) is numbered from 1.
    fn numbered(w: u32, h: u32, stride: usize) -> Vec<u8> {
        let mut pixels = vec![0u8; stride * h as usize];
        let mut n = 1u8;
        for y in 1..h - 1 {
            for x in 1..w - 1 {
                pixels[y as usize * stride + x as usize] = n;
                n += 1;
            }
        }
        pixels
    }

    fn at(pixels: &[u8], stride: usize, x: u32, y: u32) -> u8 {
        pixels[y as usize * stride + x as usize]
    }

    #[test]
    fn full_write_fills_all_eight_regions() {
        // content 3x3 numbered 1..=9, padded 5x5
        let stride = 8;
        let mut pixels = numbered(5, 5, stride);
        copy_gutters(&mut pixels, stride, 1, Rect::new(1, 1, 3, 3), Rect::full(5, 5)).unwrap();

        let expected: [[u8; 5]; 5] = [
            [1, 1, 2, 3, 3],
            [1, 1, 2, 3, 3],
            [4, 4, 5, 6, 6],
            [7, 7, 8, 9, 9],
            [7, 7, 8, 9, 9],
        ];
        for (y, row) in expected.iter().enumerate() {
            for (x, value) in row.iter().enumerate() {
                assert_eq!(at(&pixels, stride, x as u32, y as u32), *value, "({x}, {y})");
            }
        }
    }

    #[test]
    fn interior_write_touches_nothing() {
        let stride = 6;
        let mut pixels = numbered(6, 6, stride);
        let before = pixels.clone();
        copy_gutters(&mut pixels, stride, 1, Rect::new(2, 2, 2, 2), Rect::full(6, 6)).unwrap();
        assert_eq!(pixels, before);
    }

    #[test]
    fn partial_left_edge_copies_written_extent_only() {
        // content 4x4 in a 6x6 padded buffer; write covers x=1..3, y=2..4
        let stride = 6;
        let mut pixels = numbered(6, 6, stride);
        copy_gutters(&mut pixels, stride, 1, Rect::new(1, 2, 2, 2), Rect::full(6, 6)).unwrap();
        assert_eq!(at(&pixels, stride, 0, 1), 0);
        assert_eq!(at(&pixels, stride, 0, 2), at(&pixels, stride, 1, 2));
        assert_eq!(at(&pixels, stride, 0, 3), at(&pixels, stride, 1, 3));
        assert_eq!(at(&pixels, stride, 0, 4), 0);
        // no other gutter cell was written
        assert_eq!(at(&pixels, stride, 5, 2), 0);
        assert_eq!(at(&pixels, stride, 1, 0), 0);
        assert_eq!(at(&pixels, stride, 1, 5), 0);
    }

    #[test]
    fn padded_rect_with_offset_origin() {
        // a 4x4 atlas entry (2x2 content) at (2, 1) inside a larger buffer
        let stride = 8;
        let mut pixels = vec![0xEEu8; stride * 6];
        let padded = Rect::new(2, 1, 4, 4);
        for (i, (x, y)) in [(3, 2), (4, 2), (3, 3), (4, 3)].into_iter().enumerate() {
            pixels[y * stride + x] = i as u8 + 1;
        }
        copy_gutters(&mut pixels, stride, 1, Rect::new(3, 2, 2, 2), padded).unwrap();
        assert_eq!(at(&pixels, stride, 2, 1), 1);
        assert_eq!(at(&pixels, stride, 5, 1), 2);
        assert_eq!(at(&pixels, stride, 2, 4), 3);
        assert_eq!(at(&pixels, stride, 5, 4), 4);
        // outside the padded rectangle is untouched
        assert_eq!(at(&pixels, stride, 1, 1), 0xEE);
        assert_eq!(at(&pixels, stride, 6, 4), 0xEE);
        assert_eq!(at(&pixels, stride, 3, 5), 0xEE);
    }

    #[test]
    fn eight_byte_pixels() {
        let stride = 3 * 8;
        let mut pixels = vec![0u8; stride * 3];
        let content = 0x0102_0304_0506_0708u64.to_ne_bytes();
        pixels[stride + 8..stride + 16].copy_from_slice(&content);
        copy_gutters(&mut pixels, stride, 8, Rect::new(1, 1, 1, 1), Rect::full(3, 3)).unwrap();
        for chunk in pixels.chunks_exact(8) {
            assert_eq!(chunk, &content[..]);
        }
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "contract violation")]
    fn unsupported_pixel_size() {
        let mut pixels = vec![0u8; 9 * 3];
        let _ = copy_gutters(&mut pixels, 9, 3, Rect::new(1, 1, 1, 1), Rect::full(3, 3));
    }
}
