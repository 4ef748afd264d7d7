// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Texture creation and per-frame update batching.

A [`TextureManager`] is created once per device.  It

- creates [`RgbTexture`]s, asking the device's providers whether a surface belongs in an atlas,
- collects textures that were written since the last frame (the pending set),
- flushes every pending texture once per frame in [`submit_texture_updates`](TextureManager::submit_texture_updates).

# Threads and lock order

Any thread may write textures.  Exactly one thread submits frames.

Producers release a texture's mutex before they take the manager's; submission takes the
manager's mutex and then, per texture, the texture's.  Textures dropped while a submission is
running are released after the manager's mutex is.

```
use tiles_and_gutters::imp::MemoryDevice;
use tiles_and_gutters::manager::{TextureFlags, TextureManager};
use tiles_and_gutters::pixel_formats::PixelFormat;

let device = MemoryDevice::new();
let manager = TextureManager::new(device.context());
let texture = manager
    .create_texture(PixelFormat::Bgra32, 16, 16, TextureFlags::IS_OPAQUE)
    .unwrap();

let producer = {
    let texture = texture.clone();
    std::thread::spawn(move || {
        let mut lock = texture.whole_lock().unwrap();
        lock.fill(&[0, 0, 255, 255]);
        lock.unlock().unwrap();
    })
};
producer.join().unwrap();

assert_eq!(manager.pending_len(), 1);
manager.submit_texture_updates().unwrap();
assert_eq!(manager.pending_len(), 0);
```
*/

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::config::ManagerConfig;
use crate::device::{BILINEAR_FILTER_EDGE, DeviceContext, SurfaceRequest};
use crate::diagnostics::LiveRegistry;
use crate::error::{Error, Violation, violation};
use crate::pixel_formats::{CompositionFormat, PixelFormat};
use crate::rgb_texture::{RgbTexture, TextureParts};
use crate::texture::TextureId;

bitflags::bitflags! {
    /// Options for [`TextureManager::create_texture`].
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct TextureFlags: u32 {
        /// Tiled surface; may exceed the maximum texture size and is only region-locked.
        const IS_VIRTUAL = 1 << 0;
        const IS_OPAQUE = 1 << 1;
        /// The producer writes the gutter itself; the manager never fills it.
        const PRODUCER_FILLS_PADDING = 1 << 2;
    }
}

/// Tombstones tolerated before [`PendingSet::remove`] compacts the entry list.
const MIN_TOMBSTONES_BEFORE_COMPACTION: usize = 64;

/// Textures awaiting a flush, in the order they were first queued.
///
/// Removal only forgets the id; the entry stays behind as a tombstone until the next
/// [`take`](Self::take) or compaction.  An entry is live while `ids` maps its id to the entry's
/// generation.
#[derive(Debug, Default)]
struct PendingSet {
    entries: Vec<(TextureId, u64, Weak<RgbTexture>)>,
    ids: HashMap<TextureId, u64>,
    next_generation: u64,
}

impl PendingSet {
    /// Returns whether the texture was newly inserted.
    fn insert(&mut self, id: TextureId, texture: Weak<RgbTexture>) -> bool {
        if self.ids.contains_key(&id) {
            return false;
        }
        let generation = self.next_generation;
        self.next_generation += 1;
        self.ids.insert(id, generation);
        self.entries.push((id, generation, texture));
        true
    }

    fn remove(&mut self, id: TextureId) {
        if self.ids.remove(&id).is_none() {
            return;
        }
        let tombstones = self.entries.len() - self.ids.len();
        if tombstones >= MIN_TOMBSTONES_BEFORE_COMPACTION && tombstones > self.ids.len() {
            let ids = &self.ids;
            self.entries
                .retain(|(entry, generation, _)| ids.get(entry) == Some(generation));
        }
    }

    /// Removes and returns the live entries in queue order.
    fn take(&mut self) -> Vec<(TextureId, Weak<RgbTexture>)> {
        let ids = std::mem::take(&mut self.ids);
        std::mem::take(&mut self.entries)
            .into_iter()
            .filter(|(id, generation, _)| ids.get(id) == Some(generation))
            .map(|(id, _, texture)| (id, texture))
            .collect()
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.ids.clear();
    }
}

#[derive(Debug, Default)]
struct FrameState {
    pending: PendingSet,
    max_width_seen_this_frame: u32,
    max_height_seen_this_frame: u32,
    suspended: bool,
    runaway_reported: bool,
    hit_test: Option<Arc<RgbTexture>>,
}

impl FrameState {
    fn reset_accumulators(&mut self) {
        self.max_width_seen_this_frame = 0;
        self.max_height_seen_this_frame = 0;
    }
}

/// State shared between a [`TextureManager`] and the textures it created.
///
/// Textures hold it weakly.
pub(crate) struct ManagerShared {
    device: DeviceContext,
    config: ManagerConfig,
    state: Mutex<FrameState>,
    registry: Option<LiveRegistry>,
}

impl ManagerShared {
    fn lock_state(&self) -> MutexGuard<'_, FrameState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn max_texture_size(&self) -> u32 {
        self.device.max_texture_size.max_texture_size()
    }

    /// Adds a texture to the pending set.  Must not be called with the texture's mutex held.
    pub(crate) fn enqueue(
        &self,
        id: TextureId,
        texture: Weak<RgbTexture>,
        format: CompositionFormat,
        width_with_gutters: u32,
        height_with_gutters: u32,
    ) {
        let mut state = self.lock_state();
        let inserted = state.pending.insert(id, texture);
        if format == CompositionFormat::B8G8R8A8Unorm {
            state.max_width_seen_this_frame = state.max_width_seen_this_frame.max(width_with_gutters);
            state.max_height_seen_this_frame =
                state.max_height_seen_this_frame.max(height_with_gutters);
        }
        if inserted
            && !state.runaway_reported
            && state.pending.len() >= self.config.runaway_queue_threshold()
        {
            state.runaway_reported = true;
            logwise::error_sync!(
                "{len} textures are queued for update without a frame being submitted",
                len = state.pending.len()
            );
        }
    }

    /// Drops a destroyed texture from the pending set.
    pub(crate) fn forget(&self, id: TextureId) {
        self.lock_state().pending.remove(id);
    }
}

/// Creates textures and batches their updates into frames.
///
/// Cheap to clone; clones share the same pending set.
#[derive(Clone)]
pub struct TextureManager {
    shared: Arc<ManagerShared>,
}

impl std::fmt::Debug for TextureManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureManager")
            .field("device", &self.shared.device)
            .field("config", &self.shared.config)
            .field("pending", &self.pending_len())
            .finish_non_exhaustive()
    }
}

impl TextureManager {
    pub fn new(device: DeviceContext) -> Self {
        TextureManager::with_config(device, ManagerConfig::default())
    }

    pub fn with_config(device: DeviceContext, config: ManagerConfig) -> Self {
        logwise::info_sync!(
            "texture manager created, tile size {tile}",
            tile = config.tile_size()
        );
        TextureManager {
            shared: Arc::new(ManagerShared {
                device,
                registry: config.diagnostics().then(LiveRegistry::default),
                config,
                state: Mutex::new(FrameState::default()),
            }),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.shared.config
    }

    /// The device's current maximum texture size.
    pub fn max_texture_size(&self) -> u32 {
        self.shared.max_texture_size()
    }

    /**
    Creates a texture of `width` × `height` logical pixels.

    A request larger than [`max_texture_size`](Self::max_texture_size) should be
    [`IS_VIRTUAL`](TextureFlags::IS_VIRTUAL); the manager does not upgrade it and the device
    may refuse the allocation.

    # Errors
    [`Error::AllocationFailed`] for a zero-sized non-virtual texture, or when the device cannot
    satisfy the request.
    */
    pub fn create_texture(
        &self,
        pixel_format: PixelFormat,
        width: u32,
        height: u32,
        flags: TextureFlags,
    ) -> Result<Arc<RgbTexture>, Error> {
        let is_virtual = flags.contains(TextureFlags::IS_VIRTUAL);
        if !is_virtual && (width == 0 || height == 0) {
            return Err(Error::AllocationFailed {
                width,
                height,
                reason: "zero-sized texture",
            });
        }
        let max = self.max_texture_size();
        if !is_virtual && (width > max || height > max) {
            logwise::warn_sync!(
                "{w}x{h} texture exceeds max texture size {max} but is not virtual",
                w = width,
                h = height,
                max = max
            );
        }
        let request_atlas =
            is_virtual || self.shared.device.atlas.atlas_request(width, height, pixel_format);
        let request = SurfaceRequest {
            pixel_format,
            width,
            height,
            is_opaque: flags.contains(TextureFlags::IS_OPAQUE),
            is_virtual,
            request_atlas,
            producer_fills_padding: flags.contains(TextureFlags::PRODUCER_FILLS_PADDING),
        };
        let surface = self.shared.device.surfaces.create_surface(&request)?;
        let texture = RgbTexture::new(TextureParts {
            surface,
            is_opaque: request.is_opaque,
            producer_fills_gutters: request.producer_fills_padding,
            manager: Arc::downgrade(&self.shared),
            tile_size: self.shared.config.tile_size(),
        });
        if let Some(registry) = &self.shared.registry {
            registry.register(&texture);
        }
        logwise::info_sync!(
            "created texture {id}: {w}x{h} {format}",
            id = texture.id().get(),
            w = width,
            h = height,
            format = logwise::privacy::LogIt(&pixel_format)
        );
        Ok(texture)
    }

    /**
    Creates a texture for content a hardware rasterizer draws, padding included.

    The surface is `width_with_padding - 2` × `height_with_padding - 2` logical pixels plus its
    gutter, and the producer fills that gutter.

    # Errors
    A padded size above [`max_texture_size`](Self::max_texture_size) is a contract violation;
    sizes below the padding are [`Error::AllocationFailed`].
    */
    pub fn create_texture_for_hardware(
        &self,
        width_with_padding: u32,
        height_with_padding: u32,
    ) -> Result<Arc<RgbTexture>, Error> {
        let max = self.max_texture_size();
        if width_with_padding > max || height_with_padding > max {
            return Err(violation(Violation::OversizedHardwareTexture {
                width: width_with_padding,
                height: height_with_padding,
                max,
            }));
        }
        if width_with_padding < BILINEAR_FILTER_EDGE || height_with_padding < BILINEAR_FILTER_EDGE {
            return Err(Error::AllocationFailed {
                width: width_with_padding,
                height: height_with_padding,
                reason: "smaller than its padding",
            });
        }
        self.create_texture(
            PixelFormat::Bgra32,
            width_with_padding - BILINEAR_FILTER_EDGE,
            height_with_padding - BILINEAR_FILTER_EDGE,
            TextureFlags::PRODUCER_FILLS_PADDING,
        )
    }

    /// A persistent texture whose surface has no backing allocation yet.
    pub fn create_texture_with_no_hardware(&self, is_virtual: bool) -> Arc<RgbTexture> {
        let surface = self
            .shared
            .device
            .surfaces
            .create_surface_with_no_hardware(is_virtual);
        let texture = RgbTexture::new(TextureParts {
            surface,
            is_opaque: false,
            producer_fills_gutters: false,
            manager: Arc::downgrade(&self.shared),
            tile_size: self.shared.config.tile_size(),
        });
        texture.set_persistent(true);
        if let Some(registry) = &self.shared.registry {
            registry.register(&texture);
        }
        texture
    }

    /// The 1×1 virtual texture used to make primitives hit-testable without rendering them.
    ///
    /// Created on first use; the same texture is returned until
    /// [`cleanup_device_related_resources`](Self::cleanup_device_related_resources).
    pub fn hit_test_texture(&self) -> Result<Arc<RgbTexture>, Error> {
        if let Some(existing) = &self.shared.lock_state().hit_test {
            return Ok(existing.clone());
        }
        let created = self.create_texture(PixelFormat::Bgra32, 1, 1, TextureFlags::IS_VIRTUAL)?;
        created.set_persistent(true);

        let mut state = self.shared.lock_state();
        if let Some(existing) = &state.hit_test {
            // another thread won; ours must be dropped outside the lock
            let existing = existing.clone();
            drop(state);
            drop(created);
            return Ok(existing);
        }
        state.hit_test = Some(created.clone());
        Ok(created)
    }

    /// Adds `texture` to the pending set, updating the frame's size accumulators.
    ///
    /// Idempotent until the next submission.  Textures call this themselves on
    /// [`TextureLock::unlock`](crate::rgb_texture::TextureLock::unlock).  Must not be called
    /// while holding a lock on `texture`.
    pub fn queue_texture_update(
        &self,
        texture: &Arc<RgbTexture>,
        format: CompositionFormat,
        width_with_gutters: u32,
        height_with_gutters: u32,
    ) {
        self.shared.enqueue(
            texture.id(),
            Arc::downgrade(texture),
            format,
            width_with_gutters,
            height_with_gutters,
        );
    }

    /**
    Flushes every pending texture.  Call once per frame, from one thread.

    Textures holding their flush stay pending; the rest leave the set.  When the set ends up
    empty (or already was) the frame's size accumulators reset.  Nothing happens while updates
    are suspended.

    # Errors
    The first flush error ends the pass; textures not yet visited stay pending.
    */
    pub fn submit_texture_updates(&self) -> Result<(), Error> {
        // declared first so the textures are released after the state guard
        let mut visited: Vec<Arc<RgbTexture>> = Vec::new();
        let mut state = self.shared.lock_state();
        if state.suspended {
            return Ok(());
        }
        if state.pending.is_empty() {
            // queued textures may have been destroyed since they were counted
            state.reset_accumulators();
            return Ok(());
        }
        let _perf = logwise::perfwarn_begin!("submit_texture_updates");
        self.shared.device.frame_stats.largest_texture_in_frame(
            CompositionFormat::B8G8R8A8Unorm,
            state.max_width_seen_this_frame,
            state.max_height_seen_this_frame,
        );

        let mut entries = state.pending.take().into_iter();
        let mut retained = Vec::new();
        let mut result = Ok(());
        for (id, weak) in entries.by_ref() {
            let Some(texture) = weak.upgrade() else {
                continue;
            };
            match texture.flush_updates() {
                Ok(true) => {}
                Ok(false) => retained.push((id, weak)),
                Err(error) => {
                    retained.push((id, weak));
                    visited.push(texture);
                    result = Err(error);
                    break;
                }
            }
            visited.push(texture);
        }
        for (id, weak) in retained.into_iter().chain(entries) {
            state.pending.insert(id, weak);
        }
        if state.pending.is_empty() {
            state.reset_accumulators();
        }
        if state.pending.len() < self.shared.config.runaway_queue_threshold() {
            state.runaway_reported = false;
        }
        drop(state);
        if let Err(error) = &result {
            logwise::error_sync!(
                "texture flush failed: {error}",
                error = logwise::privacy::LogIt(error)
            );
        }
        result
    }

    /// While suspended, [`submit_texture_updates`](Self::submit_texture_updates) does nothing.
    pub fn set_suspend_surface_updates(&self, suspended: bool) {
        self.shared.lock_state().suspended = suspended;
    }

    pub fn is_suspended(&self) -> bool {
        self.shared.lock_state().suspended
    }

    /**
    Releases device resources after device loss or before shutdown.

    Drops the hit-test texture and clears the pending set.  With `keep_persistent` the caller
    keeps its persistent textures alive across the reset; when diagnostics are enabled, any
    live texture that is not persistent is reported.
    */
    pub fn cleanup_device_related_resources(&self, keep_persistent: bool) {
        let hit_test = {
            let mut state = self.shared.lock_state();
            state.pending.clear();
            state.reset_accumulators();
            state.runaway_reported = false;
            state.hit_test.take()
        };
        drop(hit_test);
        let survivors = match &self.shared.registry {
            Some(registry) if keep_persistent => registry.report_transient_survivors(),
            _ => 0,
        };
        logwise::info_sync!(
            "device resources cleaned up, {survivors} transient textures alive",
            survivors = survivors
        );
    }

    /// Number of textures awaiting a flush.
    pub fn pending_len(&self) -> usize {
        self.shared.lock_state().pending.len()
    }

    /// Largest `B8G8R8A8Unorm` width and height (gutters included) queued this frame.
    pub fn frame_max_dimensions(&self) -> (u32, u32) {
        let state = self.shared.lock_state();
        (state.max_width_seen_this_frame, state.max_height_seen_this_frame)
    }

    /// Live textures created by this manager.  Empty unless diagnostics are enabled.
    pub fn live_textures(&self) -> Vec<Arc<RgbTexture>> {
        self.shared
            .registry
            .as_ref()
            .map(LiveRegistry::live)
            .unwrap_or_default()
    }
}
