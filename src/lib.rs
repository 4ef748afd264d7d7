// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! tiles_and_gutters is the texture layer between a renderer's rasterizers and its compositor.

Rasterizers produce pixels on any thread.  The compositor wants them in device surfaces, once per
frame, in a shape the GPU can sample without seams.  This crate sits in between:

| Concern           | Type                                        | What it does                                                         |
|-------------------|---------------------------------------------|----------------------------------------------------------------------|
| Creation policy   | [`TextureManager`]                          | Asks the device for atlas placement; sizes hardware textures         |
| Write access      | [`RgbTexture`], [`TextureLock`]             | Whole or region locks, translating logical coordinates past gutters  |
| Seams             | [`gutters::copy_gutters`]                   | Replicates written edges into the one pixel gutter around atlas entries |
| Oversized content | virtual textures                            | Uploads in tiles so no single lock exceeds the device's texture size |
| Frame batching    | [`TextureManager::submit_texture_updates`]  | Flushes every texture written since the last frame                   |

# Devices

The crate does not talk to a GPU.  It talks to the traits in [`device`]: a surface factory,
a maximum-size provider, an atlas policy and a frame-statistics sink.  [`imp::MemoryDevice`]
implements all of them in process memory, which is what the tests and benchmarks run on.

# A frame

```
use tiles_and_gutters::{MemoryDevice, PixelFormat, Rect, TextureFlags, TextureManager};

let device = MemoryDevice::new();
let manager = TextureManager::new(device.context());

let glyphs = manager
    .create_texture(PixelFormat::Gray8, 8, 8, TextureFlags::empty())
    .unwrap();
let mut lock = glyphs.region_lock(Rect::new(0, 0, 8, 8)).unwrap();
lock.fill(&[0xFF]);
lock.unlock().unwrap();

manager.submit_texture_updates().unwrap();
assert_eq!(manager.pending_len(), 0);
```

# Failure

Device loss and allocation failure are ordinary [`Error`]s.  Broken preconditions, like a whole
lock on a virtual texture, are contract violations: logged, fatal in debug builds, and returned
as [`Error::ContractViolation`] in release builds.

Logging goes through [logwise](https://docs.rs/logwise).
*/

pub mod config;
pub mod device;
pub mod diagnostics;
pub mod error;
pub mod geometry;
pub mod gutters;
pub mod imp;
pub mod manager;
pub mod pixel_formats;
pub mod rgb_texture;
pub mod software;
pub mod texture;

pub use config::ManagerConfig;
pub use device::{DeviceContext, DeviceSurface, SourceSurface};
pub use error::{Error, Violation};
pub use geometry::{Rect, Texel};
pub use imp::MemoryDevice;
pub use manager::{TextureFlags, TextureManager};
pub use pixel_formats::{CompositionFormat, PixelFormat};
pub use rgb_texture::{RgbTexture, TextureLock};
pub use software::SoftwareSurface;
pub use texture::{TextureBase, TextureId};
