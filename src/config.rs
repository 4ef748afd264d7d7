// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Tunables for a [`TextureManager`](crate::manager::TextureManager).

/// Default edge length of the tiles virtual textures are uploaded in.
///
/// Small enough to stay well under any hardware maximum texture size, large enough that the
/// per-tile lock overhead is negligible.
pub const DEFAULT_TILE_SIZE: u32 = 1024;

/// Pending-set size at which the manager reports a runaway queue.
pub const DEFAULT_RUNAWAY_QUEUE_THRESHOLD: usize = 20_000;

/// Configuration for a texture manager.
///
/// Built with [`ManagerConfig::default`] and the `with_*` methods:
///
/// ```
/// use tiles_and_gutters::config::ManagerConfig;
///
/// let config = ManagerConfig::default()
///     .with_tile_size(512)
///     .with_diagnostics(true);
/// assert_eq!(config.tile_size(), 512);
/// assert!(config.diagnostics());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerConfig {
    tile_size: u32,
    runaway_queue_threshold: usize,
    diagnostics: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        ManagerConfig {
            tile_size: DEFAULT_TILE_SIZE,
            runaway_queue_threshold: DEFAULT_RUNAWAY_QUEUE_THRESHOLD,
            diagnostics: false,
        }
    }
}

impl ManagerConfig {
    /// Set the tile edge used by tiled uploads.
    ///
    /// # Panics
    /// Panics if `tile_size` is zero.
    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        assert!(tile_size > 0, "tile size must be non-zero");
        self.tile_size = tile_size;
        self
    }

    /// Set the pending-set size that triggers the runaway-queue report.
    pub fn with_runaway_queue_threshold(mut self, threshold: usize) -> Self {
        self.runaway_queue_threshold = threshold;
        self
    }

    /// Enable the live-texture registry.
    pub fn with_diagnostics(mut self, diagnostics: bool) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn runaway_queue_threshold(&self) -> usize {
        self.runaway_queue_threshold
    }

    pub fn diagnostics(&self) -> bool {
        self.diagnostics
    }
}
