// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Integer geometry used by the texture manager.

The coordinate system matches the rest of the crate:

```text
           x
      0 ────────▶
      │ ┌───────┐
    y │ │       │
      │ │       │
      │ │       │
      ▼ └───────┘
 ```

Rectangles are half-open: a [`Rect`] covers `x..x+width` and `y..y+height`.
*/

/// Integer texture coordinates representing a specific pixel location.
///
/// # Examples
///
/// ```
/// use tiles_and_gutters::geometry::Texel;
///
/// let texel = Texel { x: 10, y: 20 };
/// assert_eq!(texel.offset(2, 3), Texel { x: 12, y: 23 });
/// assert_eq!(Texel::ZERO.x, 0);
/// ```
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct Texel {
    /// X coordinate (horizontal position)
    pub x: u32,
    /// Y coordinate (vertical position)
    pub y: u32,
}

impl Texel {
    /// The origin texel at coordinates (0, 0).
    pub const ZERO: Texel = Texel { x: 0, y: 0 };

    /// Creates a new texel.
    pub const fn new(x: u32, y: u32) -> Self {
        Texel { x, y }
    }

    /// Returns this texel moved by `(dx, dy)`.
    pub const fn offset(self, dx: u32, dy: u32) -> Self {
        Texel {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

/// An axis-aligned, half-open rectangle in pixel units.
///
/// # Examples
///
/// ```
/// use tiles_and_gutters::geometry::Rect;
///
/// let a = Rect::new(0, 0, 4, 4);
/// let b = Rect::new(2, 2, 4, 4);
/// assert!(a.intersects(&b));
/// assert_eq!(a.union(b), Rect::new(0, 0, 6, 6));
/// assert!(Rect::full(10, 10).contains_rect(&a));
/// ```
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }

    /// A rectangle at the origin covering `width` × `height`.
    pub const fn full(width: u32, height: u32) -> Self {
        Rect::new(0, 0, width, height)
    }

    /// One past the last column.
    pub const fn right(&self) -> u32 {
        self.x + self.width
    }

    /// One past the last row.
    pub const fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Returns this rectangle moved by `(dx, dy)`.
    pub const fn offset(self, dx: u32, dy: u32) -> Self {
        Rect::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// True when `other` lies entirely inside `self`.
    ///
    /// Empty rectangles are contained as long as their origin is inside or on the edge.
    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && (other.x as u64 + other.width as u64) <= self.right() as u64
            && (other.y as u64 + other.height as u64) <= self.bottom() as u64
    }

    pub fn contains(&self, texel: Texel) -> bool {
        texel.x >= self.x && texel.y >= self.y && texel.x < self.right() && texel.y < self.bottom()
    }

    /// True when the two rectangles share at least one pixel.
    pub fn intersects(&self, other: &Rect) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// Smallest rectangle covering both. An empty operand does not contribute.
    pub fn union(self, other: Rect) -> Rect {
        if self.is_empty() {
            return other;
        }
        if other.is_empty() {
            return self;
        }
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect::new(x, y, right - x, bottom - y)
    }
}

/**
Iterates over a `width` × `height` area in a grid of at most `tile_size` × `tile_size`
rectangles, row-major.

Edge tiles are clipped to the area.

```
use tiles_and_gutters::geometry::{Rect, Tiles};

let tiles: Vec<Rect> = Tiles::new(1000, 600, 512).collect();
assert_eq!(tiles.len(), 4);
assert_eq!(tiles[1], Rect::new(512, 0, 488, 512));
assert_eq!(tiles[3], Rect::new(512, 512, 488, 88));
```
*/
#[derive(Debug, Clone)]
pub struct Tiles {
    width: u32,
    height: u32,
    tile_size: u32,
    next_x: u32,
    next_y: u32,
}

impl Tiles {
    /// # Panics
    /// Panics if `tile_size` is zero.
    pub fn new(width: u32, height: u32, tile_size: u32) -> Self {
        assert!(tile_size > 0, "tile size must be non-zero");
        Tiles {
            width,
            height,
            tile_size,
            next_x: 0,
            next_y: 0,
        }
    }
}

impl Iterator for Tiles {
    type Item = Rect;

    fn next(&mut self) -> Option<Rect> {
        if self.width == 0 || self.next_y >= self.height {
            return None;
        }
        let tile_width = self.tile_size.min(self.width - self.next_x);
        let tile_height = self.tile_size.min(self.height - self.next_y);
        let tile = Rect::new(self.next_x, self.next_y, tile_width, tile_height);

        self.next_x += tile_width;
        if self.next_x >= self.width {
            self.next_x = 0;
            self.next_y += tile_height;
        }
        Some(tile)
    }
}
