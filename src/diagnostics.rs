// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Debugging aids.

- A registry of live textures, kept by a [`TextureManager`](crate::manager::TextureManager)
  created with [`ManagerConfig::with_diagnostics`](crate::config::ManagerConfig::with_diagnostics).
  Leaked textures show up in
  [`TextureManager::live_textures`](crate::manager::TextureManager::live_textures).
- [`write_png`], which dumps the logical content of a texture.
*/

use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::error::Error;
use crate::geometry::Tiles;
use crate::pixel_formats::{Bgra8Pixel, PixelFormat};
use crate::rgb_texture::RgbTexture;

#[derive(Debug, Default)]
pub(crate) struct LiveRegistry {
    textures: Mutex<Vec<Weak<RgbTexture>>>,
}

impl LiveRegistry {
    pub(crate) fn register(&self, texture: &Arc<RgbTexture>) {
        let mut textures = self.textures.lock().unwrap_or_else(PoisonError::into_inner);
        textures.retain(|weak| weak.strong_count() > 0);
        textures.push(Arc::downgrade(texture));
    }

    pub(crate) fn live(&self) -> Vec<Arc<RgbTexture>> {
        let textures = self.textures.lock().unwrap_or_else(PoisonError::into_inner);
        textures.iter().filter_map(Weak::upgrade).collect()
    }

    /// Logs every live texture that is not persistent.  Returns how many there were.
    pub(crate) fn report_transient_survivors(&self) -> usize {
        let survivors: Vec<_> = self
            .live()
            .into_iter()
            .filter(|texture| !texture.is_persistent())
            .collect();
        for texture in &survivors {
            logwise::warn_sync!(
                "non-persistent texture {id} ({w}x{h}) survived device cleanup",
                id = texture.id().get(),
                w = texture.width(),
                h = texture.height()
            );
        }
        survivors.len()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DumpError {
    #[error(transparent)]
    Texture(#[from] Error),
    #[error("png encoding failed: {0}")]
    Png(#[from] png::EncodingError),
    #[error("{0:?} textures cannot be written as png")]
    UnsupportedFormat(PixelFormat),
}

/// Writes the logical content of `texture` (gutters excluded) to `out` as a PNG.
///
/// [`PixelFormat::Bgra32`] becomes 8-bit RGBA, [`PixelFormat::Gray8`] 8-bit grayscale.  Virtual
/// textures are read a tile at a time.  Reading does not queue an update.
pub fn write_png<W: Write>(texture: &RgbTexture, out: W) -> Result<(), DumpError> {
    let (color, bytes_per_pixel) = match texture.pixel_format() {
        PixelFormat::Bgra32 => (png::ColorType::Rgba, 4),
        PixelFormat::Gray8 => (png::ColorType::Grayscale, 1),
        other => return Err(DumpError::UnsupportedFormat(other)),
    };
    let width = texture.width();
    let height = texture.height();
    let row_bytes = width as usize * bytes_per_pixel;
    let mut data = vec![0u8; row_bytes * height as usize];

    for tile in Tiles::new(width, height, texture.tile_size()) {
        let lock = texture.region_lock(tile)?;
        for row in 0..tile.height {
            let start = (tile.y + row) as usize * row_bytes + tile.x as usize * bytes_per_pixel;
            let target = &mut data[start..start + tile.width as usize * bytes_per_pixel];
            target.copy_from_slice(lock.row(row));
        }
        lock.unlock_unmodified()?;
    }

    if color == png::ColorType::Rgba {
        for pixel in data.chunks_exact_mut(4) {
            let bgra = Bgra8Pixel::from_bytes([pixel[0], pixel[1], pixel[2], pixel[3]]);
            pixel.copy_from_slice(&[bgra.r, bgra.g, bgra.b, bgra.a]);
        }
    }

    let mut encoder = png::Encoder::new(out, width, height);
    encoder.set_color(color);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(&data)?;
    writer.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::imp::MemoryDevice;
    use crate::manager::{TextureFlags, TextureManager};

    #[test]
    fn png_roundtrip_swaps_channels() {
        let device = MemoryDevice::new();
        let manager = TextureManager::new(device.context());
        let texture = manager
            .create_texture(PixelFormat::Bgra32, 3, 2, TextureFlags::empty())
            .unwrap();
        let mut lock = texture.region_lock(Rect::full(3, 2)).unwrap();
        lock.fill(&[10, 20, 30, 255]);
        lock.unlock().unwrap();

        let mut encoded = Vec::new();
        write_png(&texture, &mut encoded).unwrap();

        let decoder = png::Decoder::new(std::io::Cursor::new(encoded));
        let mut reader = decoder.read_info().unwrap();
        let mut buf = vec![0u8; 3 * 2 * 4];
        let info = reader.next_frame(&mut buf).unwrap();
        assert_eq!((info.width, info.height), (3, 2));
        assert_eq!(&buf[..4], &[30, 20, 10, 255]);
    }

    #[test]
    fn hdr_is_unsupported() {
        let device = MemoryDevice::new();
        let manager = TextureManager::new(device.context());
        let texture = manager
            .create_texture(PixelFormat::Rgba64Float, 2, 2, TextureFlags::empty())
            .unwrap();
        let err = write_png(&texture, Vec::new()).unwrap_err();
        assert!(matches!(err, DumpError::UnsupportedFormat(PixelFormat::Rgba64Float)));
    }

    #[test]
    fn registry_forgets_dropped_textures() {
        let device = MemoryDevice::new();
        let config = crate::config::ManagerConfig::default().with_diagnostics(true);
        let manager = TextureManager::with_config(device.context(), config);
        let kept = manager
            .create_texture(PixelFormat::Gray8, 2, 2, TextureFlags::empty())
            .unwrap();
        let dropped = manager
            .create_texture(PixelFormat::Gray8, 2, 2, TextureFlags::empty())
            .unwrap();
        drop(dropped);
        let live = manager.live_textures();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id(), kept.id());
    }
}
